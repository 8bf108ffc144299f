//! SD-Access fabric sites and zones (`/dna/intent/api/v1/sda/...`)
//!
//! Both resources are keyed by the site they cover. Writes take arrays and
//! answer with a task id.

use declarative::{
    BodyShape, Completion, Endpoint, FieldPolicy, Pagination, ResourceDescriptor,
};
use serde_json::json;

fn fabric_resource(kind: &str, path: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(kind)
        .identity(&["site_id"])
        .list(Endpoint::get(path).query_desired("siteId", "site_id"))
        .create(Endpoint::post(path).shape(BodyShape::Array))
        .update(
            Endpoint::put(path)
                .shape(BodyShape::Array)
                .body_remote("id", "id"),
        )
        .delete(Endpoint::delete(format!("{path}/{{id}}")).path_remote("id", "id"))
        .paginate(Pagination::offset_limit(500))
        .field(FieldPolicy::new("site_id").wire("siteId"))
        .field(
            FieldPolicy::new("authentication_profile_name").wire("authenticationProfileName"),
        )
        .completion(Completion::TaskId)
}

/// A site added to the SD-Access fabric.
pub fn sda_fabric_site() -> ResourceDescriptor {
    fabric_resource("sda_fabric_site", "/dna/intent/api/v1/sda/fabricSites")
        .alias("sda_fabric_sites")
        .field(
            FieldPolicy::new("is_pub_sub_enabled")
                .wire("isPubSubEnabled")
                .default_value(json!(false)),
        )
}

/// A fabric zone under an existing fabric site.
pub fn sda_fabric_zone() -> ResourceDescriptor {
    fabric_resource("sda_fabric_zone", "/dna/intent/api/v1/sda/fabricZones")
        .alias("sda_fabric_zones")
}
