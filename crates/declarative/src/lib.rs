//! # Declarative
//!
//! A reconciliation core for controller REST APIs.
//!
//! Given a desired-state document for one resource, the engine reads the
//! current remote object, decides the minimal write, dispatches it, waits for
//! the controller's asynchronous task to finish and verifies the result.
//!
//! ## Core Concepts
//!
//! - **ResourceDescriptor**: static data describing one resource kind
//!   (identity, endpoints, field policy, completion signal, workflow steps)
//! - **Registry**: kind names and aliases mapped to shared descriptors
//! - **Engine**: the reconciler state machine, one `reconcile` entry point
//! - **ReconcileReport**: the result record, with secrets redacted
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     DesiredState, Endpoint, Engine, FieldPolicy, MockTransport, NoLog, ReconcileRequest,
//!     Registry, ResourceDescriptor,
//! };
//! use declarative::transport::Method;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     ResourceDescriptor::new("ssid")
//!         .identity(&["name"])
//!         .list(Endpoint::get("/ssids"))
//!         .update(Endpoint::put("/ssids/{id}").path_remote("id", "id"))
//!         .field(FieldPolicy::new("name").wire("ssid")),
//! )?;
//!
//! let transport = Arc::new(MockTransport::new());
//! transport.ok(Method::Get, "/ssids", json!({"response": [{"id": "1", "ssid": "corp"}]}));
//!
//! let engine = Engine::new(transport.clone(), Arc::new(registry)).with_sink(Arc::new(NoLog));
//! let report = engine.reconcile(ReconcileRequest::from_value(
//!     "ssid",
//!     DesiredState::Present,
//!     json!({"name": "corp"}),
//! ));
//! assert!(!report.changed);
//! assert!(transport.writes().is_empty());
//! # Ok::<(), declarative::ReconcileError>(())
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Transport`]: issues HTTP requests to the controller
//! - [`LogSink`]: receives every log line the core emits
//! - [`Clock`]: time source and cancellable sleep for the poller
//!
//! This keeps the core free of network code, global loggers and wall-clock
//! sleeps, so tests run against [`MockTransport`], [`MemorySink`] and
//! [`ManualClock`].

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod lock;
pub mod planner;
pub mod poller;
pub mod registry;
pub mod report;
pub mod resource;
pub mod transport;
pub mod types;
mod workflow;

// Re-export main types at crate root
pub use context::{
    CancelToken, Clock, LogCrateSink, LogSink, ManualClock, MemorySink, NoLog, SystemClock,
};
pub use diff::{Diff, DiffOutcome, FieldChange, Patch};
pub use error::{ErrorKind, ReconcileError, Result};
pub use executor::Engine;
pub use fetch::RemoteObject;
pub use lock::IdentityLocks;
pub use poller::{PollerConfig, TaskHandle};
pub use registry::Registry;
pub use report::{DiffRecord, ErrorRecord, REDACTED, ReconcileReport, StepReport};
pub use resource::{
    BodyShape, Compare, Completion, Endpoint, FieldPolicy, Pagination, ResourceDescriptor,
    StepState, UpdateBody, UrlPollSpec, WorkflowStep, WriteOp,
};
pub use transport::{
    Method, MockTransport, Request, Response, Transport, TransportError, TransportErrorKind,
};
pub use types::{
    Action, BatchSummary, DesiredState, Document, FORCE_ROTATE_KEY, Phase, ReconcileOptions,
    ReconcileRequest,
};
