//! Blocking HTTPS client for the Catalyst Center REST API.
//!
//! Authentication uses the controller's token endpoint: one `POST` with HTTP
//! basic credentials returns a token that is sent as `X-Auth-Token` on every
//! later request. A `401` triggers exactly one silent re-authentication and
//! retry of the request that failed.

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::exchange::http::{UreqExchange, join_url};
use crate::exchange::Exchange;
use declarative::{Request, Response, Transport, TransportError, TransportErrorKind};
use log::debug;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};

pub use crate::exchange::http::{TOKEN_HEADER, TOKEN_PATH};

/// A connection to one controller.
///
/// Safe to share across threads. Token refresh is serialized by an internal
/// mutex, so concurrent requests that all hit an expired token trigger a
/// single re-authentication.
pub struct CatalystClient {
    exchange: Box<dyn Exchange>,
    config: ConnectionConfig,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl CatalystClient {
    /// Create a client. No request is made until the first call.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let exchange = UreqExchange::new(&config);
        if !config.verify {
            log::warn!("TLS certificate verification disabled for {}", config.host);
        }
        Self::with_exchange(config, Box::new(exchange))
    }

    /// Create a client over a custom exchange, e.g. a
    /// [`MockExchange`](crate::exchange::MockExchange).
    pub fn with_exchange(config: ConnectionConfig, exchange: Box<dyn Exchange>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            exchange,
            base_url: config.base_url(),
            config,
            token: Mutex::new(None),
        })
    }

    /// Connection parameters this client was built from.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Absolute URL for a request path. Absolute URLs pass through unchanged.
    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Request a fresh token from the controller.
    pub fn authenticate(&self) -> Result<String> {
        self.exchange.fetch_token(&self.config)
    }

    /// Current token, authenticating first if there is none.
    fn token(&self) -> Result<String> {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = token.as_ref() {
            return Ok(current.clone());
        }
        let fresh = self.authenticate()?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    /// Replace a rejected token, unless another thread already did.
    fn refresh(&self, rejected: &str) -> Result<String> {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = token.as_ref()
            && current != rejected
        {
            return Ok(current.clone());
        }
        *token = None;
        let fresh = self.authenticate()?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }
}

impl Transport for CatalystClient {
    fn request(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        let token = self.token()?;
        debug!("{} {}", request.method, request.path);
        let mut reply = self.exchange.send(request, &token)?;
        if reply.status == 401 {
            debug!("token rejected on {} {}, re-authenticating", request.method, request.path);
            let token = self.refresh(&token)?;
            reply = self.exchange.send(request, &token)?;
        }
        into_response(reply.status, reply.location.as_deref(), &reply.text)
    }
}

/// Body text as JSON. Empty bodies are null, non-JSON text is kept as a string.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Turn a raw reply into a response or a classified error.
fn into_response(
    status: u16,
    location: Option<&str>,
    text: &str,
) -> std::result::Result<Response, TransportError> {
    let body = parse_body(text);
    if TransportErrorKind::from_status(status).is_some() {
        return Err(TransportError::from_status(status, body));
    }
    let response = Response::json(status, body);
    Ok(match location {
        Some(location) => response.with_location(location),
        None => response,
    })
}
