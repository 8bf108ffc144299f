//! Result reporter
//!
//! Builds the record handed back to the host. This is the only place secret
//! redaction happens: every diff, response body, message and step entry goes
//! through a [`Redactor`] before it leaves the crate.

use crate::diff::FieldChange;
use crate::error::{ErrorKind, ReconcileError};
use crate::resource::ResourceDescriptor;
use crate::types::{Action, DesiredState, Document, FORCE_ROTATE_KEY, Phase};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Replacement text for secret values
pub const REDACTED: &str = "********";

/// Message suffix when the engine stopped watching a dispatched write
pub const OUTCOME_UNKNOWN: &str = "Dispatched, Outcome Unknown";

/// Before/after view of the fields that changed, sorted by key
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffRecord {
    pub before: BTreeMap<String, Value>,
    pub after: BTreeMap<String, Value>,
}

impl DiffRecord {
    /// Diff for a create: everything supplied is new.
    pub fn created(desired: &Document) -> Self {
        Self {
            before: BTreeMap::new(),
            after: desired
                .iter()
                .filter(|(k, _)| k.as_str() != FORCE_ROTATE_KEY)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Diff for a delete: everything remote goes away.
    pub fn deleted(remote: &Document) -> Self {
        Self {
            before: remote.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            after: BTreeMap::new(),
        }
    }

    /// Diff for an update.
    pub fn updated(changes: &[FieldChange]) -> Self {
        let mut record = Self::default();
        for change in changes {
            if let Some(before) = &change.before {
                record.before.insert(change.field.clone(), before.clone());
            }
            record.after.insert(change.field.clone(), change.after.clone());
        }
        record
    }

    /// Fold a step's diff in under `step.field` keys.
    pub fn absorb(&mut self, step: &str, other: DiffRecord) {
        for (k, v) in other.before {
            self.before.insert(format!("{step}.{k}"), v);
        }
        for (k, v) in other.after {
            self.after.insert(format!("{step}.{k}"), v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// Error details in machine-readable form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<Vec<String>>,
}

impl From<&ReconcileError> for ErrorRecord {
    fn from(error: &ReconcileError) -> Self {
        match error {
            ReconcileError::WorkflowFailed {
                step, completed, ..
            } => Self {
                kind: ErrorKind::WorkflowFailed,
                step: Some(step.clone()),
                completed: Some(completed.clone()),
            },
            other => Self {
                kind: other.kind(),
                step: None,
                completed: None,
            },
        }
    }
}

/// Outcome of one workflow step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub name: String,
    pub kind: String,
    pub state: DesiredState,
    pub changed: bool,
    pub failed: bool,
    pub skipped: bool,
    pub msg: String,
}

impl StepReport {
    pub fn skipped(name: &str, kind: &str, state: DesiredState, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            state,
            changed: false,
            failed: false,
            skipped: true,
            msg: reason.to_string(),
        }
    }
}

/// The record returned for every reconcile call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub changed: bool,
    pub failed: bool,
    pub msg: String,
    pub kind: String,
    pub state: DesiredState,
    pub check_mode: bool,
    pub phase: Phase,
    pub action: Action,
    pub outcome_unknown: bool,
    pub diff: Option<DiffRecord>,
    pub response: Option<Value>,
    pub error: Option<ErrorRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReport>,
}

impl ReconcileReport {
    pub fn new(kind: &str, state: DesiredState, check_mode: bool) -> Self {
        Self {
            changed: false,
            failed: false,
            msg: String::new(),
            kind: kind.to_string(),
            state,
            check_mode,
            phase: Phase::Start,
            action: Action::None,
            outcome_unknown: false,
            diff: None,
            response: None,
            error: None,
            steps: Vec::new(),
        }
    }

    /// Mark the report failed with `error`.
    pub fn fail(&mut self, error: &ReconcileError) {
        self.failed = true;
        self.phase = Phase::Failed;
        self.error = Some(ErrorRecord::from(error));
        self.msg = if self.outcome_unknown {
            format!("{error}; {OUTCOME_UNKNOWN}")
        } else {
            error.to_string()
        };
    }

    /// Kind of the failure, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Apply redaction to every user-visible part of the report.
    pub fn redact(mut self, redactor: &Redactor) -> Self {
        self.msg = redactor.text(&self.msg);
        if let Some(diff) = self.diff.as_mut() {
            redactor.map(&mut diff.before);
            redactor.map(&mut diff.after);
        }
        self.response = self.response.as_ref().map(|r| redactor.value(r));
        for step in &mut self.steps {
            step.msg = redactor.text(&step.msg);
        }
        self
    }
}

/// Knows which keys and which literal values must never be shown
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    keys: BTreeSet<String>,
    values: Vec<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect secret field names (document and wire) and the secret values
    /// supplied in `desired`.
    pub fn for_descriptor(descriptor: &ResourceDescriptor, desired: &Document) -> Self {
        let mut redactor = Self::new();
        redactor.extend(descriptor, desired);
        redactor
    }

    /// Add another descriptor's secrets (workflow steps).
    pub fn extend(&mut self, descriptor: &ResourceDescriptor, desired: &Document) {
        for policy in descriptor.fields.iter().filter(|f| f.secret) {
            self.keys.insert(policy.name.clone());
            self.keys.insert(policy.wire_name().to_string());
            if let Some(value) = desired.get(&policy.name) {
                collect_strings(value, &mut self.values);
            }
        }
        self.values.sort_unstable();
        self.values.dedup();
    }

    /// Literal secret values, for scrubbing free text.
    pub fn secret_values(&self) -> Vec<String> {
        self.values.clone()
    }

    pub fn is_secret_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Redact secret keys anywhere in a JSON value and scrub strings.
    pub fn value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let v = if self.is_secret_key(k) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.value(v)
                        };
                        (k.clone(), v)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.value(v)).collect()),
            Value::String(s) => Value::String(self.text(s)),
            other => other.clone(),
        }
    }

    fn map(&self, map: &mut BTreeMap<String, Value>) {
        for (key, value) in map.iter_mut() {
            let bare = key.rsplit('.').next().unwrap_or(key);
            *value = if self.is_secret_key(bare) {
                Value::String(REDACTED.to_string())
            } else {
                self.value(value)
            };
        }
    }

    /// Replace literal secret values in free text.
    pub fn text(&self, message: &str) -> String {
        scrub(message, &self.values)
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.is_empty() => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

/// Replace every occurrence of each secret in `message`.
pub(crate) fn scrub(message: &str, secrets: &[String]) -> String {
    let mut longest_first: Vec<&String> = secrets.iter().filter(|s| !s.is_empty()).collect();
    longest_first.sort_by_key(|s| std::cmp::Reverse(s.len()));
    longest_first
        .into_iter()
        .fold(message.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
}
