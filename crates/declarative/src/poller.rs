//! Task poller
//!
//! Waits for an accepted write to reach a terminal state. Polling uses
//! exponential backoff with jitter; intervals never shrink and never exceed
//! the configured maximum. The last sleep is cut to the remaining time so the
//! poller gives up at the deadline rather than one full interval after it.

use crate::context::{CancelToken, Clock, LogSink};
use crate::error::{ReconcileError, Result};
use crate::resource::{Completion, UrlPollSpec, lookup, value_text};
use crate::transport::{Method, Request, Response, Transport, TransportErrorKind};
use crate::types::ReconcileOptions;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Reference to a remote operation in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskHandle {
    TaskId(String),
    ExecutionId(String),
    UrlPoll { url: String, spec: UrlPollSpec },
    /// The call was synchronous
    None,
}

impl TaskHandle {
    /// Derive the handle from a write response.
    ///
    /// When a response carries both a task id and an execution id, the task
    /// id wins regardless of the declared completion.
    pub fn from_response(completion: &Completion, response: &Response) -> Self {
        let ids = &response.ids;
        match completion {
            Completion::Synchronous => Self::None,
            Completion::TaskId | Completion::ExecutionId => {
                if let Some(id) = &ids.task_id {
                    Self::TaskId(id.clone())
                } else if let Some(id) = &ids.execution_id {
                    Self::ExecutionId(id.clone())
                } else {
                    Self::None
                }
            }
            Completion::UrlPoll(spec) => {
                let url = lookup(&response.body, &spec.url_key)
                    .and_then(value_text)
                    .or_else(|| ids.status_url.clone())
                    .or_else(|| ids.location.clone());
                match url {
                    Some(url) => Self::UrlPoll {
                        url,
                        spec: spec.clone(),
                    },
                    None => Self::None,
                }
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TaskId(id) => write!(f, "task {id}"),
            Self::ExecutionId(id) => write!(f, "execution {id}"),
            Self::UrlPoll { url, .. } => write!(f, "status url {url}"),
            Self::None => f.write_str("synchronous call"),
        }
    }
}

/// Longest wait honoured; larger timeouts are clamped to it
pub const MAX_WAIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Poller tunables
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Relative jitter applied to each interval (0.1 = ±10%)
    pub jitter: f64,
    /// Path template of the task endpoint, `{id}` is replaced
    pub task_path: String,
    /// Path template of the execution-status endpoint
    pub execution_path: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1200),
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            jitter: 0.1,
            task_path: "/dna/intent/api/v1/task/{id}".to_string(),
            execution_path: "/dna/intent/api/v1/dnacaap/management/execution-status/{id}"
                .to_string(),
        }
    }
}

impl PollerConfig {
    /// Apply descriptor and per-call overrides. Per-call wins.
    pub fn resolve(&self, descriptor_timeout: Option<Duration>, options: &ReconcileOptions) -> Self {
        let mut config = self.clone();
        if let Some(timeout) = options.timeout.or(descriptor_timeout) {
            config.timeout = timeout;
        }
        if let Some(initial) = options.poll_interval {
            config.initial_interval = initial;
        }
        if let Some(max) = options.max_poll_interval {
            config.max_interval = max;
        }
        if config.max_interval < config.initial_interval {
            config.max_interval = config.initial_interval;
        }
        config
    }
}

/// Exponential backoff with jitter and a non-decreasing guarantee
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    last: Duration,
    rng: StdRng,
}

impl Backoff {
    pub fn new(config: &PollerConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: &PollerConfig, rng: StdRng) -> Self {
        Self {
            base: config.initial_interval,
            max: config.max_interval,
            jitter: config.jitter.clamp(0.0, 1.0),
            last: Duration::ZERO,
            rng,
        }
    }

    /// Next sleep interval.
    pub fn next_delay(&mut self) -> Duration {
        let factor = if self.jitter > 0.0 {
            1.0 + self.rng.gen_range(-self.jitter..=self.jitter)
        } else {
            1.0
        };
        let jittered = Duration::try_from_secs_f64(self.base.as_secs_f64() * factor).unwrap_or(self.max);
        let delay = jittered.max(self.last).min(self.max);
        self.last = delay;
        self.base = self.base.saturating_mul(2).min(self.max);
        delay
    }
}

enum Poll {
    Pending,
    Succeeded(Value),
    Failed(String),
}

/// Drives a [`TaskHandle`] to a terminal state.
pub struct Poller<'a> {
    transport: &'a dyn Transport,
    clock: &'a dyn Clock,
    sink: &'a dyn LogSink,
    config: PollerConfig,
}

impl<'a> Poller<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        clock: &'a dyn Clock,
        sink: &'a dyn LogSink,
        config: PollerConfig,
    ) -> Self {
        Self {
            transport,
            clock,
            sink,
            config,
        }
    }

    /// Poll until success, failure, timeout or cancellation.
    ///
    /// Returns the terminal status document. The remote operation is never
    /// cancelled; on `TimedOut` or `Cancelled` it keeps running.
    pub fn wait(&self, handle: &TaskHandle, cancel: &CancelToken) -> Result<Value> {
        self.wait_with(handle, cancel, Backoff::new(&self.config))
    }

    pub(crate) fn wait_with(
        &self,
        handle: &TaskHandle,
        cancel: &CancelToken,
        mut backoff: Backoff,
    ) -> Result<Value> {
        if handle.is_none() {
            return Ok(Value::Null);
        }
        let timeout = self.config.timeout.min(MAX_WAIT);
        let start = self.clock.now();
        let deadline = start.checked_add(timeout).unwrap_or(start);
        let cancelled = || ReconcileError::Cancelled {
            handle: handle.to_string(),
        };

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            match self.poll_once(handle)? {
                Poll::Succeeded(status) => {
                    self.sink.debug(&format!("{handle} succeeded"));
                    return Ok(status);
                }
                Poll::Failed(reason) => return Err(ReconcileError::TaskFailed { reason }),
                Poll::Pending => {}
            }

            let now = self.clock.now();
            if now >= deadline {
                return Err(ReconcileError::TimedOut {
                    handle: handle.to_string(),
                    timeout,
                });
            }
            let delay = backoff.next_delay().min(deadline - now);
            self.sink
                .debug(&format!("{handle} pending, next poll in {:.1}s", delay.as_secs_f64()));
            if !self.clock.sleep(delay, cancel) {
                return Err(cancelled());
            }
        }
    }

    fn poll_once(&self, handle: &TaskHandle) -> Result<Poll> {
        let path = match handle {
            TaskHandle::TaskId(id) => self.config.task_path.replace("{id}", id),
            TaskHandle::ExecutionId(id) => self.config.execution_path.replace("{id}", id),
            TaskHandle::UrlPoll { url, .. } => url.clone(),
            TaskHandle::None => return Ok(Poll::Succeeded(Value::Null)),
        };

        let body = match self.transport.request(&Request::new(Method::Get, path)) {
            Ok(response) => response.body,
            Err(e) if matches!(e.kind, TransportErrorKind::Network | TransportErrorKind::Server) => {
                self.sink.warn(&format!("polling {handle} failed, will retry: {e}"));
                return Ok(Poll::Pending);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(match handle {
            TaskHandle::TaskId(_) => classify_task(body),
            TaskHandle::ExecutionId(_) => classify_execution(body),
            TaskHandle::UrlPoll { spec, .. } => classify_url(spec, body),
            TaskHandle::None => Poll::Succeeded(Value::Null),
        })
    }
}

fn classify_task(body: Value) -> Poll {
    let task = body.get("response").cloned().unwrap_or(body);
    let finished = task
        .get("endTime")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .is_some_and(|end| end > 0.0);
    if !finished {
        return Poll::Pending;
    }
    if task.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        let reason = ["failureReason", "progress"]
            .iter()
            .find_map(|k| task.get(*k).and_then(value_text))
            .unwrap_or_else(|| "task reported an error".to_string());
        Poll::Failed(reason)
    } else {
        Poll::Succeeded(task)
    }
}

fn classify_execution(body: Value) -> Poll {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_ascii_uppercase);
    match status.as_deref() {
        Some("SUCCESS") => Poll::Succeeded(body),
        Some("FAILURE") => {
            let reason = ["/bapiError", "/bapiSyncResponse", "/bapiExecutionDetail"]
                .iter()
                .find_map(|p| body.pointer(p).and_then(value_text))
                .unwrap_or_else(|| "execution reported FAILURE".to_string());
            Poll::Failed(reason)
        }
        _ => Poll::Pending,
    }
}

fn classify_url(spec: &UrlPollSpec, body: Value) -> Poll {
    let Some(status) = lookup(&body, &spec.status_key).and_then(value_text) else {
        return Poll::Pending;
    };
    let matches = |list: &[String]| list.iter().any(|s| s.eq_ignore_ascii_case(&status));
    if matches(&spec.success) {
        Poll::Succeeded(body)
    } else if matches(&spec.failure) {
        let reason = spec
            .reason_key
            .as_deref()
            .and_then(|k| lookup(&body, k))
            .and_then(value_text)
            .unwrap_or_else(|| format!("status {status}"));
        Poll::Failed(reason)
    } else {
        Poll::Pending
    }
}
