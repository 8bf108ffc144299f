//! # catalystkit
//!
//! Blocking HTTPS client for the Cisco Catalyst Center REST API.
//!
//! [`CatalystClient`] implements [`declarative::Transport`], so it plugs
//! straight into a reconciliation [`declarative::Engine`]:
//!
//! ```no_run
//! use catalystkit::{CatalystClient, ConnectionConfig};
//! use declarative::{Engine, Registry};
//! use std::sync::Arc;
//!
//! let config = ConnectionConfig::new("dnac.example.com").credentials("admin", "secret");
//! let client = CatalystClient::new(config).expect("invalid connection settings");
//! let engine = Engine::new(Arc::new(client), Arc::new(Registry::new()));
//! ```
//!
//! The HTTP round trip sits behind the [`Exchange`] trait; tests drive the
//! token and retry logic with [`MockExchange`].
//!
//! Every response status is classified into a [`declarative::TransportErrorKind`]:
//! `401`/`403` are `Auth`, `404` is `NotFound`, `409` is `Conflict`, other
//! `4xx` are `Validation` and `5xx` are `Server`. Connection failures are
//! `Network`.

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod exchange;

pub use client::{CatalystClient, TOKEN_HEADER, TOKEN_PATH};
pub use config::ConnectionConfig;
pub use error::{Error, ErrorCategory, Result};
pub use exchange::{Exchange, MockExchange, Reply};
