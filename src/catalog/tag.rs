//! Device tags (`/dna/intent/api/v1/tag`)

use declarative::{
    Completion, Endpoint, FieldPolicy, Pagination, ResourceDescriptor, UpdateBody,
};
use serde_json::json;

const BASE: &str = "/dna/intent/api/v1/tag";

/// A tag, identified by name. Updates replace the whole object.
pub fn tag() -> ResourceDescriptor {
    ResourceDescriptor::new("tag")
        .identity(&["name"])
        .list(Endpoint::get(BASE).query_desired("name", "name"))
        .create(Endpoint::post(BASE))
        .update(Endpoint::put(BASE).body_remote("id", "id"))
        .delete(Endpoint::delete(format!("{BASE}/{{id}}")).path_remote("id", "id"))
        .paginate(Pagination::offset_limit(500))
        .update_body(UpdateBody::Merged)
        .field(FieldPolicy::new("system_tag").wire("systemTag").create_only().default_value(json!(false)))
        .field(FieldPolicy::new("dynamic_rules").wire("dynamicRules").compare(declarative::Compare::Set))
        .field(FieldPolicy::new("instance_tenant_id").wire("instanceTenantId").ignore())
        .completion(Completion::TaskId)
}
