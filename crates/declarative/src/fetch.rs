//! State fetcher
//!
//! Reads the remote object a desired document refers to. A keyed `get` is
//! preferred when the document supplies every path parameter; otherwise the
//! `list` endpoint is walked page by page and filtered on identity.

use crate::context::LogSink;
use crate::diff::compare_values;
use crate::error::{ReconcileError, Result};
use crate::resource::{Compare, Endpoint, Pagination, ResourceDescriptor, lookup, value_text};
use crate::transport::{Request, Transport};
use crate::types::Document;
use serde_json::Value;

/// Upper bound on list pages walked for one lookup
const MAX_PAGES: u32 = 1_000;

/// A remote object as read and in canonical (document-named) form
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub raw: Value,
    pub canonical: Document,
}

impl RemoteObject {
    pub fn new(descriptor: &ResourceDescriptor, raw: Value) -> Self {
        let canonical = descriptor.canonicalize(&raw);
        Self { raw, canonical }
    }
}

/// Fetch the object identified by `desired`, or `None` when it does not exist.
pub fn fetch(
    transport: &dyn Transport,
    descriptor: &ResourceDescriptor,
    desired: &Document,
    sink: &dyn LogSink,
) -> Result<Option<RemoteObject>> {
    let found = match (&descriptor.endpoints.get, &descriptor.endpoints.list) {
        (Some(get), _) if get.is_bound_by(desired) => fetch_one(transport, descriptor, get, desired, sink)?,
        (_, Some(list)) => fetch_from_list(transport, descriptor, list, desired, sink)?,
        (Some(_), None) => {
            return Err(ReconcileError::validation(format!(
                "{} needs every get parameter to look up an object",
                descriptor.kind
            )));
        }
        (None, None) => {
            return Err(ReconcileError::validation(format!(
                "{} has no read endpoint",
                descriptor.kind
            )));
        }
    };
    Ok(found
        .filter(|raw| descriptor.exists(raw))
        .map(|raw| RemoteObject::new(descriptor, raw)))
}

fn fetch_one(
    transport: &dyn Transport,
    descriptor: &ResourceDescriptor,
    endpoint: &Endpoint,
    desired: &Document,
    sink: &dyn LogSink,
) -> Result<Option<Value>> {
    let (request, _) = endpoint.render(desired, None)?;
    sink.debug(&format!("fetching {} via {}", descriptor.kind, request.path));
    let response = match transport.request(&request) {
        Ok(response) => response,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let items = items_of(endpoint.extract(&response.body));
    match items.len() {
        0 => Ok(None),
        1 => Ok(items.into_iter().next()),
        _ => single_match(descriptor, desired, items),
    }
}

fn fetch_from_list(
    transport: &dyn Transport,
    descriptor: &ResourceDescriptor,
    endpoint: &Endpoint,
    desired: &Document,
    sink: &dyn LogSink,
) -> Result<Option<Value>> {
    let (base, _) = endpoint.render(desired, None)?;
    let mut cursor: Option<String> = None;
    let mut offset = match &descriptor.pagination {
        Pagination::OffsetLimit { first_offset, .. } => *first_offset,
        _ => 0,
    };

    for page in 1..=MAX_PAGES {
        let request = page_request(&base, &descriptor.pagination, offset, cursor.as_deref());
        sink.debug(&format!(
            "listing {} via {} (page {page})",
            descriptor.kind, request.path
        ));
        let response = match transport.request(&request) {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let items = items_of(endpoint.extract(&response.body));
        let page_len = items.len();

        let found = single_match(descriptor, desired, items)?;
        if found.is_some() {
            return Ok(found);
        }

        match &descriptor.pagination {
            Pagination::None => return Ok(None),
            Pagination::OffsetLimit { limit, .. } => {
                if page_len == 0 || page_len < *limit as usize {
                    return Ok(None);
                }
                offset += limit;
            }
            Pagination::Cursor { next, .. } => {
                cursor = response.body.pointer(next).and_then(value_text);
                if cursor.is_none() || page_len == 0 {
                    return Ok(None);
                }
            }
        }
    }

    sink.warn(&format!(
        "{}: stopped listing after {MAX_PAGES} pages without a match",
        descriptor.kind
    ));
    Ok(None)
}

fn page_request(base: &Request, pagination: &Pagination, offset: u32, cursor: Option<&str>) -> Request {
    let mut request = base.clone();
    match pagination {
        Pagination::None => {}
        Pagination::OffsetLimit {
            offset_param,
            limit_param,
            limit,
            ..
        } => {
            request.query.push((offset_param.clone(), offset.to_string()));
            request.query.push((limit_param.clone(), limit.to_string()));
        }
        Pagination::Cursor { param, .. } => {
            if let Some(cursor) = cursor {
                request.query.push((param.clone(), cursor.to_string()));
            }
        }
    }
    request
}

/// Normalize an extracted payload into a list of candidate objects.
fn items_of(payload: &Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items.clone(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        Value::Object(_) => vec![payload.clone()],
        _ => Vec::new(),
    }
}

/// Keep the one item matching the identity; several matches are ambiguous.
fn single_match(
    descriptor: &ResourceDescriptor,
    desired: &Document,
    items: Vec<Value>,
) -> Result<Option<Value>> {
    let mut matches: Vec<Value> = items
        .into_iter()
        .filter(|item| identity_matches(descriptor, desired, item))
        .collect();
    match matches.len() {
        0 | 1 => Ok(matches.pop()),
        count => Err(ReconcileError::AmbiguousIdentity {
            kind: descriptor.kind.clone(),
            identity: descriptor.identity_label(desired),
            count,
        }),
    }
}

/// Compare identity fields only, using each field's comparison rule.
pub fn identity_matches(descriptor: &ResourceDescriptor, desired: &Document, raw: &Value) -> bool {
    descriptor.identity.iter().all(|field| {
        let Some(wanted) = desired.get(field) else {
            return false;
        };
        let compare = match descriptor.policy(field).map(|p| p.compare) {
            Some(Compare::Ignore) | None => Compare::Exact,
            Some(compare) => compare,
        };
        lookup(raw, descriptor.wire_name(field)).is_some_and(|have| compare_values(compare, wanted, have))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MemorySink;
    use crate::error::ErrorKind;
    use crate::resource::FieldPolicy;
    use crate::transport::{Method, MockTransport, TransportError, TransportErrorKind};
    use serde_json::json;

    const CREDS: &str = "/dna/intent/api/v1/global-credential";

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn credential() -> ResourceDescriptor {
        ResourceDescriptor::new("cli_credential")
            .identity(&["description", "username"])
            .list(Endpoint::get(CREDS).query_literal("credentialSubType", "CLI"))
            .field(FieldPolicy::new("description").case_insensitive())
            .field(FieldPolicy::new("password").secret())
            .field(FieldPolicy::new("instanceUuid").ignore())
    }

    #[test]
    fn test_list_match_is_case_insensitive_on_identity() {
        let mock = MockTransport::new();
        mock.ok(
            Method::Get,
            CREDS,
            json!({"response": [
                {"description": "other", "username": "netops", "id": "1"},
                {"description": "LAB", "username": "netops", "id": "2", "instanceUuid": "u"}
            ]}),
        );
        let desired = doc(json!({"description": "lab", "username": "netops"}));
        let found = fetch(&mock, &credential(), &desired, &MemorySink::new())
            .unwrap()
            .unwrap();
        assert_eq!(found.raw["id"], json!("2"));
        assert!(!found.canonical.contains_key("instanceUuid"));
        assert_eq!(mock.calls()[0].query_value("credentialSubType"), Some("CLI"));
    }

    #[test]
    fn test_empty_list_is_absent() {
        let mock = MockTransport::new();
        mock.ok(Method::Get, CREDS, json!({"response": []}));
        let desired = doc(json!({"description": "lab", "username": "netops"}));
        assert!(fetch(&mock, &credential(), &desired, &MemorySink::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_duplicates_are_ambiguous() {
        let mock = MockTransport::new();
        mock.ok(
            Method::Get,
            CREDS,
            json!({"response": [
                {"description": "lab", "username": "netops", "id": "1"},
                {"description": "lab", "username": "netops", "id": "2"}
            ]}),
        );
        let desired = doc(json!({"description": "lab", "username": "netops"}));
        let err = fetch(&mock, &credential(), &desired, &MemorySink::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousIdentity);
    }

    #[test]
    fn test_offset_pagination_walks_until_match() {
        let desc = ResourceDescriptor::new("site")
            .identity(&["name"])
            .list(Endpoint::get("/site"))
            .paginate(Pagination::offset_limit(2));
        let mock = MockTransport::new();
        mock.ok(Method::Get, "/site", json!({"response": [{"name": "a"}, {"name": "b"}]}))
            .ok(Method::Get, "/site", json!({"response": [{"name": "c"}, {"name": "d"}]}))
            .ok(Method::Get, "/site", json!({"response": [{"name": "e"}]}));

        let found = fetch(&mock, &desc, &doc(json!({"name": "d"})), &MemorySink::new())
            .unwrap()
            .unwrap();
        assert_eq!(found.raw["name"], json!("d"));

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].query_value("offset"), Some("1"));
        assert_eq!(calls[1].query_value("offset"), Some("3"));
        assert_eq!(calls[1].query_value("limit"), Some("2"));
    }

    #[test]
    fn test_offset_pagination_stops_on_short_page() {
        let desc = ResourceDescriptor::new("site")
            .identity(&["name"])
            .list(Endpoint::get("/site"))
            .paginate(Pagination::offset_limit(2));
        let mock = MockTransport::new();
        mock.ok(Method::Get, "/site", json!({"response": [{"name": "a"}, {"name": "b"}]}))
            .ok(Method::Get, "/site", json!({"response": [{"name": "c"}]}));
        assert!(fetch(&mock, &desc, &doc(json!({"name": "z"})), &MemorySink::new())
            .unwrap()
            .is_none());
        assert_eq!(mock.calls().len(), 2);
    }

    #[test]
    fn test_cursor_pagination() {
        let desc = ResourceDescriptor::new("device")
            .identity(&["serial"])
            .list(Endpoint::get("/devices").items("/items"))
            .paginate(Pagination::Cursor {
                param: "cursor".into(),
                next: "/next".into(),
            });
        let mock = MockTransport::new();
        mock.ok(Method::Get, "/devices", json!({"items": [{"serial": "A"}], "next": "c2"}))
            .ok(Method::Get, "/devices", json!({"items": [{"serial": "B"}]}));
        let found = fetch(&mock, &desc, &doc(json!({"serial": "B"})), &MemorySink::new())
            .unwrap()
            .unwrap();
        assert_eq!(found.raw["serial"], json!("B"));
        assert_eq!(mock.calls()[1].query_value("cursor"), Some("c2"));
    }

    #[test]
    fn test_get_not_found_is_absent() {
        let desc = ResourceDescriptor::new("image")
            .identity(&["image_id"])
            .get(Endpoint::get("/images/{id}").path_desired("id", "image_id"));
        let mock = MockTransport::new();
        mock.fail(
            Method::Get,
            "/images/i1",
            TransportError::new(TransportErrorKind::NotFound, "HTTP 404"),
        );
        assert!(fetch(&mock, &desc, &doc(json!({"image_id": "i1"})), &MemorySink::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_exists_when_filters_object() {
        let desc = ResourceDescriptor::new("golden")
            .identity(&["image_id"])
            .get(Endpoint::get("/golden/{id}").path_desired("id", "image_id"))
            .exists_when("taggedGolden", json!(true));
        let mock = MockTransport::new();
        mock.ok(Method::Get, "/golden/i1", json!({"response": {"taggedGolden": false}}));
        assert!(fetch(&mock, &desc, &doc(json!({"image_id": "i1"})), &MemorySink::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_server_error_propagates() {
        let mock = MockTransport::new();
        mock.fail(
            Method::Get,
            CREDS,
            TransportError::new(TransportErrorKind::Server, "HTTP 503"),
        );
        let desired = doc(json!({"description": "lab", "username": "netops"}));
        let err = fetch(&mock, &credential(), &desired, &MemorySink::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
