//! Enterprise wireless SSIDs (`/dna/intent/api/v1/enterprise-ssid`)

use declarative::{Completion, Endpoint, FieldPolicy, ResourceDescriptor};
use serde_json::json;

const BASE: &str = "/dna/intent/api/v1/enterprise-ssid";

/// Enterprise SSID, identified by name.
///
/// The list call answers with SSID groups; the first group's `ssidDetails`
/// holds the SSIDs. Unset optional fields compare equal to the controller's
/// defaults so a partial document never triggers a spurious update.
pub fn wireless_ssid() -> ResourceDescriptor {
    ResourceDescriptor::new("wireless_ssid")
        .alias("enterprise_ssid")
        .identity(&["name"])
        .list(
            Endpoint::get(BASE)
                .query_desired("ssidName", "name")
                .items("/0/ssidDetails"),
        )
        .create(Endpoint::post(BASE))
        .update(Endpoint::put(BASE).body_desired("name", "name"))
        .delete(Endpoint::delete(format!("{BASE}/{{ssidName}}")).path_desired("ssidName", "name"))
        .field(FieldPolicy::new("securityLevel").case_insensitive())
        .field(FieldPolicy::new("passphrase").secret())
        .field(FieldPolicy::new("radioPolicy").default_value(json!("Dual band operation")))
        .field(FieldPolicy::new("fastTransition").default_value(json!("Adaptive")))
        .field(FieldPolicy::new("enableFastLane").default_value(json!(false)))
        .field(FieldPolicy::new("enableBroadcastSSID").default_value(json!(true)))
        .field(FieldPolicy::new("trafficType").default_value(json!("voicedata")))
        .field(FieldPolicy::new("wlanType").ignore())
        .completion(Completion::ExecutionId)
}
