//! Transport seam between the reconciliation core and the controller.
//!
//! The core never opens sockets itself. It hands a [`Request`] to a
//! [`Transport`] and gets back a decoded [`Response`] or a classified
//! [`TransportError`]. Production code plugs in an HTTPS client; tests use
//! [`MockTransport`].
//!
//! # Testing
//!
//! ```
//! use declarative::transport::{Method, MockTransport, Request, Transport};
//! use serde_json::json;
//!
//! let mock = MockTransport::new();
//! mock.ok(Method::Get, "/dna/intent/api/v1/site", json!({"response": []}));
//!
//! let resp = mock.request(&Request::new(Method::Get, "/dna/intent/api/v1/site")).unwrap();
//! assert_eq!(resp.status, 200);
//! assert_eq!(mock.calls().len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Whether this method only reads remote state.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Get)
    }

    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to the controller.
///
/// `path` is either an API path (`/dna/intent/api/v1/...`) or, for opaque
/// poll URLs, an absolute URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Look up a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Identifiers the controller assigned to an accepted write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIds {
    pub task_id: Option<String>,
    pub execution_id: Option<String>,
    pub status_url: Option<String>,
    pub location: Option<String>,
}

impl ServerIds {
    /// Extract identifiers from a response envelope and its `Location` header.
    ///
    /// Catalyst Center answers writes with either `{"response": {"taskId", "url"}}`
    /// or `{"executionId", "executionStatusUrl"}`.
    pub fn extract(body: &Value, location: Option<&str>) -> Self {
        let text = |pointer: &str| {
            body.pointer(pointer).and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };
        Self {
            task_id: text("/response/taskId").or_else(|| text("/taskId")),
            execution_id: text("/executionId").or_else(|| text("/response/executionId")),
            status_url: text("/executionStatusUrl")
                .or_else(|| text("/response/url"))
                .or_else(|| text("/url")),
            location: location.map(ToString::to_string),
        }
    }
}

/// A decoded controller response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
    pub ids: ServerIds,
}

impl Response {
    /// Build a response from a status and JSON body, extracting server ids.
    pub fn json(status: u16, body: Value) -> Self {
        let ids = ServerIds::extract(&body, None);
        Self { status, body, ids }
    }

    /// Attach a `Location` header value.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.ids.location = Some(location.into());
        self
    }
}

/// Classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// Unreachable host, connection reset, timeout
    Network,
    /// 401/403
    Auth,
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 400/422 and other client errors
    Validation,
    /// 5xx
    Server,
}

impl TransportErrorKind {
    /// Classify an HTTP status code. Returns `None` for success codes.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=399 => None,
            401 | 403 => Some(Self::Auth),
            404 => Some(Self::NotFound),
            409 => Some(Self::Conflict),
            500..=599 => Some(Self::Server),
            _ => Some(Self::Validation),
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A classified transport failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub status: Option<u16>,
    pub message: String,
    /// Structured error details returned by the controller, if any
    pub details: Option<Value>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            details: None,
        }
    }

    /// Build an error from a non-success HTTP status and its body.
    pub fn from_status(status: u16, body: Value) -> Self {
        let kind = TransportErrorKind::from_status(status).unwrap_or(TransportErrorKind::Server);
        let detail = ["/response/detail", "/response/errorCode", "/message", "/detail", "/error"]
            .iter()
            .find_map(|p| body.pointer(p).and_then(Value::as_str))
            .map(|s| format!(": {s}"))
            .unwrap_or_default();
        Self {
            kind,
            status: Some(status),
            message: format!("HTTP {status}{detail}"),
            details: (!body.is_null()).then_some(body),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == TransportErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == TransportErrorKind::Conflict
    }

    pub fn is_auth(&self) -> bool {
        self.kind == TransportErrorKind::Auth
    }
}

/// Client for the controller API.
///
/// Implementations must be safe for concurrent use; the engine shares one
/// transport across every reconciliation in the process.
pub trait Transport: Send + Sync {
    /// Issue a request and decode the JSON response.
    fn request(&self, request: &Request) -> Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn request(&self, request: &Request) -> Result<Response, TransportError> {
        (**self).request(request)
    }
}

type Handler = Arc<dyn Fn(&Request) -> Result<Response, TransportError> + Send + Sync>;

#[derive(Clone)]
enum Reply {
    Fixed(Result<Response, TransportError>),
    Handler(Handler),
}

impl Reply {
    fn produce(&self, request: &Request) -> Result<Response, TransportError> {
        match self {
            Self::Fixed(result) => result.clone(),
            Self::Handler(handler) => handler(request),
        }
    }
}

struct Route {
    method: Method,
    path: String,
    replies: VecDeque<Reply>,
}

/// Scripted in-memory transport for tests.
///
/// Replies are queued per `(method, path)`; the last queued reply for a route
/// repeats forever. Every request is recorded for later assertions.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(route) = routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            route.replies.push_back(reply);
        } else {
            routes.push(Route {
                method,
                path: path.to_string(),
                replies: VecDeque::from([reply]),
            });
        }
        self
    }

    /// Queue a reply for a route.
    pub fn on(
        &self,
        method: Method,
        path: &str,
        reply: Result<Response, TransportError>,
    ) -> &Self {
        self.push(method, path, Reply::Fixed(reply))
    }

    /// Queue a 200 response with the given body.
    pub fn ok(&self, method: Method, path: &str, body: Value) -> &Self {
        self.on(method, path, Ok(Response::json(200, body)))
    }

    /// Queue a failure.
    pub fn fail(&self, method: Method, path: &str, error: TransportError) -> &Self {
        self.on(method, path, Err(error))
    }

    /// Queue a closure that computes the reply from the request.
    pub fn handle<F>(&self, method: Method, path: &str, handler: F) -> &Self
    where
        F: Fn(&Request) -> Result<Response, TransportError> + Send + Sync + 'static,
    {
        self.push(method, path, Reply::Handler(Arc::new(handler)))
    }

    /// Every request issued so far, in order.
    pub fn calls(&self) -> Vec<Request> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests issued to a route.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    /// Requests that were not reads.
    pub fn writes(&self) -> Vec<Request> {
        self.calls()
            .into_iter()
            .filter(|c| !c.method.is_read())
            .collect()
    }
}

impl Transport for MockTransport {
    fn request(&self, request: &Request) -> Result<Response, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let reply = {
            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            let route = routes
                .iter_mut()
                .find(|r| r.method == request.method && r.path == request.path);
            match route {
                Some(route) if route.replies.len() > 1 => route.replies.pop_front(),
                Some(route) => route.replies.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(reply) => reply.produce(request),
            None => Err(TransportError::new(
                TransportErrorKind::NotFound,
                format!("no mock route for {} {}", request.method, request.path),
            )),
        }
    }
}
