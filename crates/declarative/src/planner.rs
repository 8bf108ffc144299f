//! Request planner - validates desired documents and builds write requests

use crate::diff::Patch;
use crate::error::{ReconcileError, Result};
use crate::resource::{Compare, ResourceDescriptor, UpdateBody, WriteOp};
use crate::transport::Request;
use crate::types::{DesiredState, Document, FORCE_ROTATE_KEY};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

/// Check identity completeness, state legality and bulk-key uniqueness.
pub fn validate(descriptor: &ResourceDescriptor, state: DesiredState, desired: &Document) -> Result<()> {
    let missing: Vec<&str> = descriptor
        .identity
        .iter()
        .filter(|field| !is_supplied(desired.get(field.as_str())))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(ReconcileError::validation(format!(
            "state={state} for {} requires identity field(s): {}",
            descriptor.kind,
            missing.join(", ")
        )));
    }

    if !descriptor.is_workflow() {
        let endpoints = &descriptor.endpoints;
        let legal = match state {
            DesiredState::Present => endpoints.create.is_some() || endpoints.update.is_some(),
            DesiredState::Absent => endpoints.delete.is_some(),
            DesiredState::Query => true,
        };
        if !legal {
            return Err(ReconcileError::validation(format!(
                "{} does not support state={state}",
                descriptor.kind
            )));
        }
    }

    for policy in descriptor.fields.iter().filter(|f| f.unique_by.is_some()) {
        let (Some(key), Some(Value::Array(items))) = (&policy.unique_by, desired.get(&policy.name)) else {
            continue;
        };
        let mut seen = HashSet::new();
        for item in items {
            let Some(value) = item.get(key) else { continue };
            if !seen.insert(value.to_string()) {
                return Err(ReconcileError::validation(format!(
                    "{}: duplicate {key} {value} in {}",
                    descriptor.kind, policy.name
                )));
            }
        }
    }

    Ok(())
}

fn is_supplied(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Resolve the set of secret fields to rotate.
///
/// `force_rotate: true` rotates every secret the document supplies; an array
/// names specific fields. The caller's options are added on top.
pub fn rotation(
    descriptor: &ResourceDescriptor,
    desired: &Document,
    requested: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    let secrets = descriptor.secret_fields();
    let mut rotate: BTreeSet<String> = requested.clone();
    match desired.get(FORCE_ROTATE_KEY) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => {}
        Some(Value::Bool(true)) => {
            rotate.extend(
                secrets
                    .iter()
                    .filter(|s| desired.contains_key(**s))
                    .map(ToString::to_string),
            );
        }
        Some(Value::Array(names)) => {
            for name in names {
                let Some(name) = name.as_str() else {
                    return Err(ReconcileError::validation(format!(
                        "{FORCE_ROTATE_KEY} entries must be field names"
                    )));
                };
                rotate.insert(name.to_string());
            }
        }
        Some(_) => {
            return Err(ReconcileError::validation(format!(
                "{FORCE_ROTATE_KEY} must be a boolean or a list of field names"
            )));
        }
    }
    if let Some(unknown) = rotate.iter().find(|r| !secrets.contains(&r.as_str())) {
        return Err(ReconcileError::validation(format!(
            "{FORCE_ROTATE_KEY}: '{unknown}' is not a secret field of {}",
            descriptor.kind
        )));
    }
    Ok(rotate)
}

/// The desired document without control keys.
pub fn fields_of(desired: &Document) -> Document {
    desired
        .iter()
        .filter(|(k, _)| k.as_str() != FORCE_ROTATE_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Build the create request from the supplied create-writable fields.
pub fn create_request(descriptor: &ResourceDescriptor, desired: &Document) -> Result<Request> {
    let endpoint = descriptor
        .endpoints
        .create
        .as_ref()
        .ok_or_else(|| missing_endpoint(descriptor, "create"))?;
    let payload: Document = fields_of(desired)
        .into_iter()
        .filter(|(field, _)| {
            descriptor
                .policy(field)
                .is_none_or(|p| p.compare != Compare::Ignore && p.is_writable(WriteOp::Create))
        })
        .collect();
    let (request, params) = endpoint.render(desired, None)?;
    let mut body = descriptor.to_wire(&payload);
    body.extend(params);
    Ok(request.with_body(endpoint.body.wrap(body)))
}

/// Build the update request for `patch` against the fetched object.
pub fn update_request(
    descriptor: &ResourceDescriptor,
    desired: &Document,
    patch: &Patch,
    remote: &Value,
) -> Result<Request> {
    let endpoint = descriptor
        .endpoints
        .update
        .as_ref()
        .ok_or_else(|| missing_endpoint(descriptor, "update"))?;
    let (request, params) = endpoint.render(desired, Some(remote))?;
    let wire_patch = descriptor.to_wire(&patch.body());

    let mut body = match (descriptor.update_body, remote) {
        (UpdateBody::Merged, Value::Object(current)) => {
            let secrets: Vec<&str> = descriptor
                .fields
                .iter()
                .filter(|f| f.secret)
                .map(|f| f.wire_name())
                .collect();
            let mut merged: Document = current
                .iter()
                .filter(|(k, _)| !secrets.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            merged.extend(wire_patch);
            merged
        }
        _ => wire_patch,
    };
    body.extend(params);
    Ok(request.with_body(endpoint.body.wrap(body)))
}

/// Build the delete request for the fetched object.
pub fn delete_request(descriptor: &ResourceDescriptor, desired: &Document, remote: &Value) -> Result<Request> {
    let endpoint = descriptor
        .endpoints
        .delete
        .as_ref()
        .ok_or_else(|| missing_endpoint(descriptor, "delete"))?;
    let (request, params) = endpoint.render(desired, Some(remote))?;
    if params.is_empty() {
        Ok(request)
    } else {
        Ok(request.with_body(endpoint.body.wrap(params)))
    }
}

fn missing_endpoint(descriptor: &ResourceDescriptor, name: &str) -> ReconcileError {
    ReconcileError::validation(format!("{} has no {name} endpoint", descriptor.kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::FieldChange;
    use crate::error::ErrorKind;
    use crate::resource::{BodyShape, Endpoint, FieldPolicy};
    use crate::transport::Method;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn credential() -> ResourceDescriptor {
        ResourceDescriptor::new("cli_credential")
            .identity(&["description", "username"])
            .list(Endpoint::get("/cred"))
            .create(Endpoint::post("/cred/cli").shape(BodyShape::Array))
            .update(
                Endpoint::put("/cred/cli")
                    .shape(BodyShape::Object)
                    .body_remote("id", "id"),
            )
            .delete(Endpoint::delete("/cred/{id}").path_remote("id", "id"))
            .field(FieldPolicy::new("password").secret())
            .field(FieldPolicy::new("enable_password").wire("enablePassword").secret())
            .field(FieldPolicy::new("comments").create_only())
    }

    #[test]
    fn test_identity_completeness() {
        let err = validate(
            &credential(),
            DesiredState::Absent,
            &doc(json!({"description": "lab", "username": ""})),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn test_state_legality() {
        let read_only = ResourceDescriptor::new("site_info")
            .identity(&["name"])
            .list(Endpoint::get("/site"));
        let desired = doc(json!({"name": "Global"}));
        assert!(validate(&read_only, DesiredState::Query, &desired).is_ok());
        assert!(validate(&read_only, DesiredState::Present, &desired).is_err());
        assert!(validate(&read_only, DesiredState::Absent, &desired).is_err());
    }

    #[test]
    fn test_duplicate_bulk_keys_rejected() {
        let desc = ResourceDescriptor::new("site_tags")
            .identity(&["site_id"])
            .list(Endpoint::get("/tags"))
            .create(Endpoint::post("/tags"))
            .field(FieldPolicy::new("siteTags").unique_by("siteTagName"));
        let desired = doc(json!({
            "site_id": "S1",
            "siteTags": [{"siteTagName": "a"}, {"siteTagName": "b"}, {"siteTagName": "a"}]
        }));
        let err = validate(&desc, DesiredState::Present, &desired).unwrap_err();
        assert!(err.to_string().contains("duplicate siteTagName"));
    }

    #[test]
    fn test_rotation_forms() {
        let desc = credential();
        let none = BTreeSet::new();
        let all = rotation(
            &desc,
            &doc(json!({"password": "x", "force_rotate": true})),
            &none,
        )
        .unwrap();
        assert_eq!(all, BTreeSet::from(["password".to_string()]));

        let named = rotation(
            &desc,
            &doc(json!({"force_rotate": ["enable_password"]})),
            &none,
        )
        .unwrap();
        assert_eq!(named, BTreeSet::from(["enable_password".to_string()]));

        assert!(rotation(&desc, &doc(json!({"force_rotate": ["username"]})), &none).is_err());
        assert!(rotation(&desc, &doc(json!({"force_rotate": "yes"})), &none).is_err());
    }

    #[test]
    fn test_create_body_uses_wire_names_and_shape() {
        let request = create_request(
            &credential(),
            &doc(json!({
                "username": "netops",
                "description": "lab",
                "enable_password": "e",
                "force_rotate": true
            })),
        )
        .unwrap();
        assert_eq!(request.method, Method::Post);
        let body = request.body.unwrap();
        assert_eq!(body[0]["enablePassword"], json!("e"));
        assert_eq!(body[0]["username"], json!("netops"));
        assert!(body[0].get("force_rotate").is_none());
    }

    #[test]
    fn test_update_patch_body_with_remote_param() {
        let patch = Patch {
            changes: vec![FieldChange {
                field: "password".into(),
                before: None,
                after: json!("new"),
                secret: true,
            }],
        };
        let remote = json!({"id": "c1", "username": "netops", "description": "lab"});
        let request = update_request(
            &credential(),
            &doc(json!({"username": "netops"})),
            &patch,
            &remote,
        )
        .unwrap();
        assert_eq!(request.body.unwrap(), json!({"password": "new", "id": "c1"}));
    }

    #[test]
    fn test_merged_update_drops_remote_secrets() {
        let desc = credential().update_body(UpdateBody::Merged);
        let patch = Patch {
            changes: vec![FieldChange {
                field: "description".into(),
                before: Some(json!("old")),
                after: json!("lab"),
                secret: false,
            }],
        };
        let remote = json!({"id": "c1", "username": "netops", "description": "old", "enablePassword": "****"});
        let body = update_request(&desc, &Document::new(), &patch, &remote)
            .unwrap()
            .body
            .unwrap();
        assert_eq!(body["description"], json!("lab"));
        assert_eq!(body["username"], json!("netops"));
        assert!(body.get("enablePassword").is_none());
    }

    #[test]
    fn test_delete_renders_remote_id() {
        let request =
            delete_request(&credential(), &Document::new(), &json!({"id": "c 9"})).unwrap();
        assert_eq!(request.path, "/cred/c%209");
        assert!(request.body.is_none());
    }

    #[test]
    fn test_create_only_field_kept_on_create() {
        let request = create_request(
            &credential(),
            &doc(json!({"username": "u", "description": "d", "comments": "c"})),
        )
        .unwrap();
        assert_eq!(request.body.unwrap()[0]["comments"], json!("c"));
    }
}
