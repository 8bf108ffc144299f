//! Diff engine
//!
//! Compares a desired document with the canonical remote object under the
//! descriptor's field policy and decides which write, if any, is needed.
//!
//! Only fields the caller supplied are compared. Identity fields are never
//! part of a patch: a different identity is a different object. Secrets are
//! never compared by value; they differ only when rotation is requested.

use crate::resource::{Compare, FieldPolicy, ResourceDescriptor, WriteOp};
use crate::types::{DesiredState, Document, FORCE_ROTATE_KEY};
use serde_json::Value;
use std::collections::BTreeSet;

/// One field that differs
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    /// Remote value, `None` when the remote omits the field
    pub before: Option<Value>,
    pub after: Value,
    pub secret: bool,
}

/// Minimal update: only differing fields that are writable on update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub changes: Vec<FieldChange>,
}

impl Patch {
    /// The patch as a document keyed by field name.
    pub fn body(&self) -> Document {
        self.changes
            .iter()
            .map(|c| (c.field.clone(), c.after.clone()))
            .collect()
    }

    pub fn fields(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.field.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// What the reconciler must do
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOutcome {
    Equal,
    CreateRequired,
    DeleteRequired,
    UpdateRequired(Patch),
}

/// Diff result plus fields that differ but cannot be written on update
#[derive(Debug, Clone, PartialEq)]
pub struct Diff {
    pub outcome: DiffOutcome,
    pub unwritable: Vec<String>,
}

impl Diff {
    fn of(outcome: DiffOutcome) -> Self {
        Self {
            outcome,
            unwritable: Vec::new(),
        }
    }
}

/// Decide the write needed to move `remote` to `desired` under `state`.
///
/// `Query` never requires a write.
pub fn compute(
    descriptor: &ResourceDescriptor,
    state: DesiredState,
    desired: &Document,
    remote: Option<&Document>,
    rotate: &BTreeSet<String>,
) -> Diff {
    match (state, remote) {
        (DesiredState::Query, _) | (DesiredState::Absent, None) => Diff::of(DiffOutcome::Equal),
        (DesiredState::Absent, Some(_)) => Diff::of(DiffOutcome::DeleteRequired),
        (DesiredState::Present, None) => Diff::of(DiffOutcome::CreateRequired),
        (DesiredState::Present, Some(remote)) => {
            let (writable, unwritable): (Vec<FieldChange>, Vec<FieldChange>) =
                changed_fields(descriptor, desired, remote, rotate)
                    .into_iter()
                    .partition(|c| {
                        descriptor
                            .policy(&c.field)
                            .is_none_or(|p| p.is_writable(WriteOp::Update))
                    });
            let unwritable = unwritable.into_iter().map(|c| c.field).collect();
            let outcome = if writable.is_empty() {
                DiffOutcome::Equal
            } else {
                DiffOutcome::UpdateRequired(Patch { changes: writable })
            };
            Diff {
                outcome,
                unwritable,
            }
        }
    }
}

/// Every supplied, non-identity field whose value differs from the remote.
pub fn changed_fields(
    descriptor: &ResourceDescriptor,
    desired: &Document,
    remote: &Document,
    rotate: &BTreeSet<String>,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    for (field, wanted) in desired {
        let default_policy;
        if field == FORCE_ROTATE_KEY || descriptor.is_identity(field) {
            continue;
        }
        let policy = match descriptor.policy(field) {
            Some(policy) => policy,
            None => {
                default_policy = FieldPolicy::new(field.as_str());
                &default_policy
            }
        };
        if policy.compare == Compare::Ignore {
            continue;
        }
        let current = remote.get(field);
        let differs = if policy.secret {
            rotate.contains(field)
        } else {
            !field_equal(policy, wanted, current)
        };
        if differs {
            changes.push(FieldChange {
                field: field.clone(),
                before: if policy.secret { None } else { current.cloned() },
                after: wanted.clone(),
                secret: policy.secret,
            });
        }
    }
    changes
}

/// Compare one field under its policy, honoring the declared default.
pub fn field_equal(policy: &FieldPolicy, desired: &Value, remote: Option<&Value>) -> bool {
    let remote = match remote {
        Some(Value::Null) | None => {
            return desired.is_null() || policy.default.as_ref().is_some_and(|d| values_equal(d, desired));
        }
        Some(remote) => remote,
    };
    compare_values(policy.compare, desired, remote)
}

/// Compare two present values under a comparison rule.
pub fn compare_values(compare: Compare, desired: &Value, remote: &Value) -> bool {
    match compare {
        Compare::Ignore => true,
        Compare::Exact => values_equal(desired, remote),
        Compare::CaseInsensitive => match (desired, remote) {
            (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| compare_values(Compare::CaseInsensitive, x, y))
            }
            _ => values_equal(desired, remote),
        },
        Compare::Set => match (desired, remote) {
            (Value::Array(a), Value::Array(b)) => a.len() == b.len() && contains_all(b, a),
            _ => values_equal(desired, remote),
        },
        Compare::Subset => match (desired, remote) {
            (Value::Array(a), Value::Array(b)) => contains_all(b, a),
            _ => values_equal(desired, remote),
        },
    }
}

/// Multiset containment: every element of `needles` pairs with a distinct
/// element of `haystack`.
fn contains_all(haystack: &[Value], needles: &[Value]) -> bool {
    let mut used = vec![false; haystack.len()];
    needles.iter().all(|needle| {
        let slot = haystack
            .iter()
            .enumerate()
            .position(|(i, candidate)| !used[i] && values_equal(needle, candidate));
        slot.map(|i| used[i] = true).is_some()
    })
}

/// Structural equality with two relaxations:
/// - numbers compare by value (`1` equals `1.0`)
/// - for objects only the desired keys are compared
pub fn values_equal(desired: &Value, remote: &Value) -> bool {
    match (desired, remote) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::Object(a), Value::Object(b)) => a.iter().all(|(key, wanted)| match b.get(key) {
            Some(have) => values_equal(wanted, have),
            None => wanted.is_null(),
        }),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => desired == remote,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Endpoint;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn ssid() -> ResourceDescriptor {
        ResourceDescriptor::new("wireless_ssid")
            .identity(&["name"])
            .list(Endpoint::get("/ssids"))
            .field(FieldPolicy::new("passphrase").secret())
            .field(FieldPolicy::new("authType").create_only())
            .field(FieldPolicy::new("tags").compare(Compare::Subset))
            .field(FieldPolicy::new("vlans").compare(Compare::Set))
            .field(FieldPolicy::new("profileName").case_insensitive())
            .field(FieldPolicy::new("sessionTimeout").default_value(json!(1800)))
    }

    fn remote() -> Document {
        doc(json!({
            "name": "corp",
            "radioPolicy": "Dual band operation",
            "fastTransition": "Adaptive",
            "authType": "WPA2_PERSONAL",
            "tags": ["a", "b", "server-added"],
            "vlans": [10, 20],
            "profileName": "Corp-Profile",
        }))
    }

    fn run(desired: Value) -> Diff {
        compute(
            &ssid(),
            DesiredState::Present,
            &doc(desired),
            Some(&remote()),
            &BTreeSet::new(),
        )
    }

    #[test]
    fn test_partial_update_patch_has_only_changed_fields() {
        let diff = run(json!({"name": "corp", "fastTransition": "Enable"}));
        let DiffOutcome::UpdateRequired(patch) = diff.outcome else {
            panic!("expected update");
        };
        assert_eq!(patch.fields(), vec!["fastTransition"]);
        assert_eq!(patch.body(), doc(json!({"fastTransition": "Enable"})));
        assert_eq!(patch.changes[0].before, Some(json!("Adaptive")));
    }

    #[test]
    fn test_unchanged_is_equal() {
        let diff = run(json!({
            "name": "corp",
            "fastTransition": "Adaptive",
            "tags": ["b"],
            "vlans": [20, 10],
            "profileName": "corp-profile",
            "sessionTimeout": 1800,
        }));
        assert_eq!(diff.outcome, DiffOutcome::Equal);
        assert!(diff.unwritable.is_empty());
    }

    #[test]
    fn test_set_and_subset() {
        assert!(matches!(
            run(json!({"vlans": [10]})).outcome,
            DiffOutcome::UpdateRequired(_)
        ));
        assert!(matches!(
            run(json!({"tags": ["a", "c"]})).outcome,
            DiffOutcome::UpdateRequired(_)
        ));
    }

    #[test]
    fn test_default_equals_absent() {
        assert_eq!(run(json!({"sessionTimeout": 1800})).outcome, DiffOutcome::Equal);
        assert!(matches!(
            run(json!({"sessionTimeout": 3600})).outcome,
            DiffOutcome::UpdateRequired(_)
        ));
    }

    #[test]
    fn test_secret_only_on_rotate() {
        let desired = doc(json!({"name": "corp", "passphrase": "hunter2"}));
        let plain = compute(
            &ssid(),
            DesiredState::Present,
            &desired,
            Some(&remote()),
            &BTreeSet::new(),
        );
        assert_eq!(plain.outcome, DiffOutcome::Equal);

        let rotate = BTreeSet::from(["passphrase".to_string()]);
        let rotated = compute(&ssid(), DesiredState::Present, &desired, Some(&remote()), &rotate);
        let DiffOutcome::UpdateRequired(patch) = rotated.outcome else {
            panic!("expected update");
        };
        assert!(patch.changes[0].secret);
        assert_eq!(patch.changes[0].before, None);
    }

    #[test]
    fn test_create_only_field_is_not_patched() {
        let diff = run(json!({"authType": "OPEN"}));
        assert_eq!(diff.outcome, DiffOutcome::Equal);
        assert_eq!(diff.unwritable, vec!["authType"]);
    }

    #[test]
    fn test_state_decisions() {
        let desc = ssid();
        let desired = doc(json!({"name": "corp"}));
        let none = BTreeSet::new();
        assert_eq!(
            compute(&desc, DesiredState::Present, &desired, None, &none).outcome,
            DiffOutcome::CreateRequired
        );
        assert_eq!(
            compute(&desc, DesiredState::Absent, &desired, None, &none).outcome,
            DiffOutcome::Equal
        );
        assert_eq!(
            compute(&desc, DesiredState::Absent, &desired, Some(&remote()), &none).outcome,
            DiffOutcome::DeleteRequired
        );
        assert_eq!(
            compute(&desc, DesiredState::Query, &desired, None, &none).outcome,
            DiffOutcome::Equal
        );
    }

    #[test]
    fn test_values_equal_relaxations() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(
            &json!({"a": 1}),
            &json!({"a": 1, "serverOnly": true})
        ));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 2})));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
    }
}
