//! Error types for reconciliation.
//!
//! Every component returns a [`ReconcileError`] to the reconciler, which is
//! the only place errors are turned into a user-visible report. Each error
//! carries an [`ErrorKind`] tag; the tag name is the prefix of the rendered
//! message so hosts and tests can match on it.

use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Kinds of reconciliation errors surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The desired document is internally inconsistent
    Validation,
    /// Network, auth or server failure talking to the controller
    Transport,
    /// The resource does not exist (internal; surfaced only for lookups)
    NotFound,
    /// Create raced another actor and could not converge
    Conflict,
    /// More than one remote object matched the identity
    AmbiguousIdentity,
    /// The remote task reached a terminal failure
    TaskFailed,
    /// The remote task did not finish in time
    TimedOut,
    /// Polling was cancelled by the caller
    Cancelled,
    /// The write succeeded but the resource still differs
    PostconditionMismatch,
    /// A workflow step failed
    WorkflowFailed,
    /// No descriptor is registered under the requested name
    UnknownKind,
}

impl ErrorKind {
    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid desired state",
            Self::Transport => "Controller unreachable or rejected the request",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Resource created concurrently",
            Self::AmbiguousIdentity => "Identity matches several resources",
            Self::TaskFailed => "Remote task failed",
            Self::TimedOut => "Remote task timed out",
            Self::Cancelled => "Polling cancelled",
            Self::PostconditionMismatch => "Write did not take effect",
            Self::WorkflowFailed => "Workflow step failed",
            Self::UnknownKind => "Unknown resource kind",
        }
    }

    /// Whether the remote operation may still be running when this error is reported.
    pub fn leaves_outcome_unknown(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Cancelled)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors produced while reconciling a resource.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// The desired document is internally inconsistent
    #[error("Validation: {0}")]
    Validation(String),

    /// The transport client failed
    #[error("Transport: {0}")]
    Transport(#[from] TransportError),

    /// Nothing matched the identity
    #[error("NotFound: no {kind} matches {identity}")]
    NotFound {
        /// Descriptor kind
        kind: String,
        /// Rendered identity tuple
        identity: String,
    },

    /// Create hit a conflict and the follow-up re-fetch could not converge
    #[error("Conflict: {kind} {identity} exists remotely but could not be read back")]
    Conflict {
        /// Descriptor kind
        kind: String,
        /// Rendered identity tuple
        identity: String,
    },

    /// The list endpoint returned more than one match
    #[error("AmbiguousIdentity: {count} {kind} objects match {identity}")]
    AmbiguousIdentity {
        /// Descriptor kind
        kind: String,
        /// Rendered identity tuple
        identity: String,
        /// Number of matching objects
        count: usize,
    },

    /// The poller saw a terminal failure
    #[error("TaskFailed: {reason}")]
    TaskFailed {
        /// Remote failure reason, verbatim
        reason: String,
    },

    /// The poller gave up waiting
    #[error("TimedOut: {handle} did not finish within {}s", .timeout.as_secs())]
    TimedOut {
        /// Task handle label
        handle: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// The poller was cancelled
    #[error("Cancelled: stopped watching {handle}")]
    Cancelled {
        /// Task handle label
        handle: String,
    },

    /// Cancelled before the write was sent; nothing changed remotely
    #[error("Cancelled: {label} stopped before any write was sent")]
    CancelledBeforeWrite {
        /// Kind and identity of the resource
        label: String,
    },

    /// Re-fetch after a successful write still differs
    #[error("PostconditionMismatch: {kind} {identity} still differs after write ({})", .fields.join(", "))]
    PostconditionMismatch {
        /// Descriptor kind
        kind: String,
        /// Rendered identity tuple
        identity: String,
        /// Fields that still differ
        fields: Vec<String>,
    },

    /// A workflow step failed
    #[error("WorkflowFailed: step {step} failed after [{}]: {source}", .completed.join(", "))]
    WorkflowFailed {
        /// Name of the failing step
        step: String,
        /// Steps that completed before the failure
        completed: Vec<String>,
        /// The step's own error
        source: Box<ReconcileError>,
    },

    /// No descriptor under this name
    #[error("UnknownKind: no descriptor named '{0}'")]
    UnknownKind(String),
}

impl ReconcileError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Get the kind tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Transport,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::AmbiguousIdentity { .. } => ErrorKind::AmbiguousIdentity,
            Self::TaskFailed { .. } => ErrorKind::TaskFailed,
            Self::TimedOut { .. } => ErrorKind::TimedOut,
            Self::Cancelled { .. } | Self::CancelledBeforeWrite { .. } => ErrorKind::Cancelled,
            Self::PostconditionMismatch { .. } => ErrorKind::PostconditionMismatch,
            Self::WorkflowFailed { .. } => ErrorKind::WorkflowFailed,
            Self::UnknownKind(_) => ErrorKind::UnknownKind,
        }
    }

    /// The innermost error, looking through workflow wrappers.
    pub fn root_cause(&self) -> &ReconcileError {
        match self {
            Self::WorkflowFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportErrorKind;

    #[test]
    fn test_message_starts_with_kind() {
        let err = ReconcileError::TimedOut {
            handle: "task t1".to_string(),
            timeout: Duration::from_secs(1200),
        };
        assert!(err.to_string().starts_with("TimedOut"));
        assert!(err.to_string().contains("1200s"));
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn test_workflow_failed_lists_completed_steps() {
        let err = ReconcileError::WorkflowFailed {
            step: "tagGolden".to_string(),
            completed: vec!["resolveImage".to_string(), "resolveSite".to_string()],
            source: Box::new(ReconcileError::TaskFailed {
                reason: "image not compatible".to_string(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("tagGolden"));
        assert!(msg.contains("resolveImage, resolveSite"));
        assert!(msg.contains("image not compatible"));
        assert_eq!(err.root_cause().kind(), ErrorKind::TaskFailed);
    }

    #[test]
    fn test_transport_conversion() {
        let err: ReconcileError =
            TransportError::new(TransportErrorKind::Server, "HTTP 503").into();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_outcome_unknown_kinds() {
        assert!(ErrorKind::TimedOut.leaves_outcome_unknown());
        assert!(ErrorKind::Cancelled.leaves_outcome_unknown());
        assert!(!ErrorKind::TaskFailed.leaves_outcome_unknown());
        assert!(!ErrorKind::Validation.description().is_empty());
    }
}
