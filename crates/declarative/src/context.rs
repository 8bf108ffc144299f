//! Provider traits injected into the engine
//!
//! These traits allow the declarative crate to be used without
//! depending on a specific logger, wall clock or cancellation source.

use log::Level;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Sink for every log line the core emits.
///
/// The core never calls a logging macro on its own behalf; everything goes
/// through the sink handed to the engine, so tests can assert on output.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }
}

/// Forwards to the `log` facade under the `declarative` target.
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: "declarative", level, "{message}");
    }
}

/// Discards everything.
pub struct NoLog;

impl LogSink for NoLog {
    fn log(&self, _level: Level, _message: &str) {}
}

/// Captures log lines in memory.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured messages, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Whether any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}

/// Cooperative cancellation flag shared between the host and the poller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Time source for the poller.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Sleep for `duration`, waking early if `cancel` fires.
    ///
    /// Returns `false` when the sleep was cut short by cancellation.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Wall clock that sleeps the current thread.
pub struct SystemClock;

/// Granularity at which a sleeping poller notices cancellation.
const CANCEL_SLICE: Duration = Duration::from_millis(100);

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(CANCEL_SLICE));
        }
    }
}

/// Virtual clock for tests: sleeping advances time instantly.
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Total virtual time elapsed.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every sleep requested, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner) += duration;
        true
    }
}

/// Sink wrapper that masks known secret values before forwarding.
pub(crate) struct ScrubbingSink<'a> {
    inner: &'a dyn LogSink,
    secrets: Vec<String>,
}

impl<'a> ScrubbingSink<'a> {
    pub(crate) fn new(inner: &'a dyn LogSink, secrets: Vec<String>) -> Self {
        Self { inner, secrets }
    }
}

impl LogSink for ScrubbingSink<'_> {
    fn log(&self, level: Level, message: &str) {
        let scrubbed = crate::report::scrub(message, &self.secrets);
        self.inner.log(level, &scrubbed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert!(clock.sleep(Duration::from_secs(2), &CancelToken::new()));
        assert!(clock.sleep(Duration::from_secs(4), &CancelToken::new()));
        assert_eq!(clock.now() - start, Duration::from_secs(6));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[test]
    fn test_sleep_honors_cancel() {
        let token = CancelToken::new();
        token.cancel();
        assert!(!ManualClock::new().sleep(Duration::from_secs(1), &token));
        assert!(!SystemClock.sleep(Duration::from_secs(5), &token));
    }

    #[test]
    fn test_memory_sink_captures() {
        let sink = MemorySink::new();
        sink.info("fetched cli_credential");
        sink.warn("field x differs");
        assert_eq!(sink.lines().len(), 2);
        assert!(sink.contains("cli_credential"));
        assert!(!sink.contains("password"));
    }

    #[test]
    fn test_scrubbing_sink_masks_values() {
        let sink = MemorySink::new();
        let scrubbing = ScrubbingSink::new(&sink, vec!["s3cr3t!".to_string()]);
        scrubbing.warn("remote said: bad password s3cr3t!");
        assert!(!sink.contains("s3cr3t!"));
        assert!(sink.contains("********"));
    }
}
