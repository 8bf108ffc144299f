//! Core types for declarative reconciliation

use crate::context::CancelToken;
use crate::error::ReconcileError;
use crate::report::ReconcileReport;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A desired-state document: recognized field names mapped to values.
pub type Document = Map<String, Value>;

/// Reserved document key requesting rotation of secret fields.
///
/// `true` rotates every secret the document supplies; an array of names
/// rotates only those.
pub const FORCE_ROTATE_KEY: &str = "force_rotate";

/// Target state selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// Resource must exist and match the document
    Present,
    /// Resource must not exist
    Absent,
    /// Read-only lookup
    Query,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesiredState {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "query" => Ok(Self::Query),
            other => Err(ReconcileError::validation(format!(
                "state must be one of present, absent, query (got '{other}')"
            ))),
        }
    }
}

/// The write the reconciler decided on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    None,
    Create,
    Update,
    Delete,
}

impl Action {
    /// Past-tense verb for messages.
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::None => "unchanged",
            Self::Create => "created",
            Self::Update => "updated",
            Self::Delete => "deleted",
        }
    }

    /// Conditional verb for check-mode messages.
    pub fn conditional(&self) -> &'static str {
        match self {
            Self::None => "be left unchanged",
            Self::Create => "be created",
            Self::Update => "be updated",
            Self::Delete => "be deleted",
        }
    }
}

/// Reconciler state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Start,
    Validated,
    Fetched,
    Decided,
    Dispatched,
    Awaiting,
    Verified,
    Reported,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-call tuning from the host.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Overrides the descriptor/poller timeout
    pub timeout: Option<Duration>,
    /// Overrides the initial poll interval
    pub poll_interval: Option<Duration>,
    /// Overrides the maximum poll interval
    pub max_poll_interval: Option<Duration>,
    /// Secret fields to rotate even though they cannot be compared
    pub force_rotate: BTreeSet<String>,
    /// Cancels any in-flight polling
    pub cancel: CancelToken,
}

impl ReconcileOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn rotate(mut self, field: impl Into<String>) -> Self {
        self.force_rotate.insert(field.into());
        self
    }
}

/// One reconcile call from the host.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub kind: String,
    pub state: DesiredState,
    pub desired: Document,
    pub check_mode: bool,
    pub options: ReconcileOptions,
}

impl ReconcileRequest {
    pub fn new(kind: impl Into<String>, state: DesiredState, desired: Document) -> Self {
        Self {
            kind: kind.into(),
            state,
            desired,
            check_mode: false,
            options: ReconcileOptions::default(),
        }
    }

    /// Build a request from a JSON object literal.
    ///
    /// Non-object values yield an empty document.
    pub fn from_value(kind: impl Into<String>, state: DesiredState, desired: Value) -> Self {
        let desired = match desired {
            Value::Object(map) => map,
            _ => Document::new(),
        };
        Self::new(kind, state, desired)
    }

    pub fn check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }
}

/// Summary of a batch of reconciliations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl BatchSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Check if the batch was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of reconciliations counted
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.unchanged + self.failed
    }

    /// Add a report to the summary
    pub fn add_report(&mut self, report: &ReconcileReport) {
        if report.failed {
            self.failed += 1;
            return;
        }
        match (report.changed, report.action) {
            (true, Action::Create) => self.created += 1,
            (true, Action::Update) => self.updated += 1,
            (true, Action::Delete) => self.deleted += 1,
            _ => self.unchanged += 1,
        }
    }

    /// Build a summary from a slice of reports
    pub fn from_reports(reports: &[ReconcileReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            summary.add_report(report);
        }
        summary
    }
}
