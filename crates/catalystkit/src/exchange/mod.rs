//! The HTTP exchange underneath [`CatalystClient`](crate::CatalystClient).
//!
//! The client owns the token cache and the re-authentication rule; an
//! [`Exchange`] only moves bytes. [`http::UreqExchange`] talks to a real
//! controller.
//!
//! # Testing
//!
//! Use [`MockExchange`] to drive the client without network access. It
//! answers `401` to any token it has not been told to accept:
//!
//! ```
//! use catalystkit::exchange::{Exchange, MockExchange};
//! use catalystkit::ConnectionConfig;
//! use declarative::{Method, Request};
//!
//! let mock = MockExchange::new();
//! mock.issue("t1");
//! let config = ConnectionConfig::new("dnac.lab").credentials("admin", "pw");
//! let token = mock.fetch_token(&config).unwrap();
//! assert_eq!(token, "t1");
//!
//! let request = Request::new(Method::Get, "/dna/intent/api/v1/site");
//! assert_eq!(mock.send(&request, &token).unwrap().status, 401);
//! mock.accept("t1");
//! assert_eq!(mock.send(&request, &token).unwrap().status, 200);
//! ```

pub mod http;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use declarative::Request;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Status, `Location` header and body text of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP status code
    pub status: u16,
    /// `Location` header, if any
    pub location: Option<String>,
    /// Raw body text
    pub text: String,
}

impl Reply {
    /// A reply with a status and body text and no `Location`.
    pub fn new(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            location: None,
            text: text.into(),
        }
    }
}

/// One round trip to the controller.
pub trait Exchange: Send + Sync {
    /// Request a fresh session token with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns `Error::Auth` when the controller rejects the credentials.
    fn fetch_token(&self, config: &ConnectionConfig) -> Result<String>;

    /// Send a request carrying `token`. Every HTTP status is a `Reply`;
    /// only connection-level failures are errors.
    fn send(&self, request: &Request, token: &str) -> Result<Reply>;
}

/// In-memory controller for testing the client.
#[derive(Debug, Default)]
pub struct MockExchange {
    issued: Mutex<VecDeque<String>>,
    accepted: Mutex<HashSet<String>>,
    reply: Mutex<Option<Reply>>,
    fetches: Mutex<usize>,
    sent: Mutex<Vec<(String, String)>>,
}

impl MockExchange {
    /// Create an exchange that accepts no token yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next token handed out by `fetch_token`.
    pub fn issue(&self, token: &str) {
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(token.to_string());
    }

    /// Treat `token` as valid from now on.
    pub fn accept(&self, token: &str) {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.to_string());
    }

    /// Stop accepting `token`, as the controller does when a session expires.
    pub fn expire(&self, token: &str) {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }

    /// Reply sent for requests carrying a valid token (default `200 {}`).
    pub fn respond(&self, reply: Reply) {
        *self.reply.lock().unwrap_or_else(PoisonError::into_inner) = Some(reply);
    }

    /// Number of token requests so far.
    pub fn token_fetches(&self) -> usize {
        *self.fetches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `(path, token)` of every request sent so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Exchange for MockExchange {
    fn fetch_token(&self, config: &ConnectionConfig) -> Result<String> {
        *self.fetches.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| {
                Error::Auth(format!(
                    "token request rejected for user {} (HTTP 401)",
                    config.username
                ))
            })
    }

    fn send(&self, request: &Request, token: &str) -> Result<Reply> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request.path.clone(), token.to_string()));
        let valid = self
            .accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(token);
        if !valid {
            return Ok(Reply::new(401, r#"{"message": "token expired"}"#));
        }
        Ok(self
            .reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| Reply::new(200, "{}")))
    }
}
