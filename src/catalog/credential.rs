//! Global device credentials (`/dna/intent/api/v2/global-credential`)
//!
//! All credential types share one endpoint family. The list call returns every
//! type at once, keyed by type; writes wrap the object under the same key.

use declarative::{BodyShape, Completion, Endpoint, FieldPolicy, ResourceDescriptor};

const BASE: &str = "/dna/intent/api/v2/global-credential";

/// Descriptor for one credential type stored under `key`.
fn global_credential(kind: &str, key: &str, identity: &[&str]) -> ResourceDescriptor {
    ResourceDescriptor::new(kind)
        .identity(identity)
        .list(Endpoint::get(BASE).items(&format!("/response/{key}")))
        .create(Endpoint::post(BASE).shape(BodyShape::WrappedArray(key.to_string())))
        .update(
            Endpoint::put(BASE)
                .shape(BodyShape::Wrapped(key.to_string()))
                .body_remote("id", "id"),
        )
        .delete(Endpoint::delete(format!("{BASE}/{{id}}")).path_remote("id", "id"))
        .field(FieldPolicy::new("id").read_only())
        .field(FieldPolicy::new("credential_type").wire("credentialType").read_only())
        .completion(Completion::TaskId)
}

/// CLI (SSH/telnet) credential, identified by description and username.
pub fn cli_credential() -> ResourceDescriptor {
    global_credential("cli_credential", "cliCredential", &["description", "username"])
        .alias("cli_credential_v2")
        .field(FieldPolicy::new("password").secret())
        .field(
            FieldPolicy::new("enable_password")
                .wire("enablePassword")
                .secret(),
        )
}

/// SNMPv2c read community.
pub fn snmp_v2c_read_credential() -> ResourceDescriptor {
    global_credential("snmp_v2c_read_credential", "snmpV2cRead", &["description"])
        .alias("snmp_v2c_read_credential_v2")
        .field(
            FieldPolicy::new("read_community")
                .wire("readCommunity")
                .secret(),
        )
}
