//! Built-in resource descriptors
//!
//! Every Catalyst Center resource the CLI knows is described here as data.
//! One generic engine reconciles all of them; adding a resource means adding
//! a descriptor, not code. Older or versioned names are aliases of the newest
//! descriptor.

pub mod credential;
pub mod sda;
pub mod site;
pub mod swim;
pub mod tag;
pub mod wireless;

use anyhow::{Context, Result};
use declarative::{Registry, ResourceDescriptor};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Every built-in descriptor, resolve-only kinds first.
pub fn builtin() -> Vec<ResourceDescriptor> {
    vec![
        site::site(),
        site::product_name(),
        swim::swim_image(),
        swim::golden_tag(),
        swim::image_golden_tag(),
        credential::cli_credential(),
        credential::snmp_v2c_read_credential(),
        wireless::wireless_ssid(),
        sda::sda_fabric_site(),
        sda::sda_fabric_zone(),
        tag::tag(),
    ]
}

/// Build the registry from the built-ins plus user descriptors.
///
/// The registry is read-only once this returns.
pub fn registry(extra: Vec<ResourceDescriptor>) -> declarative::Result<Registry> {
    let mut registry = Registry::new();
    registry.register_all(builtin())?;
    registry.register_all(extra)?;
    registry.verify_workflows()?;
    Ok(registry)
}

#[derive(Deserialize)]
struct DescriptorFile {
    #[serde(default, rename = "descriptor")]
    descriptors: Vec<ResourceDescriptor>,
}

/// Load `[[descriptor]]` tables from a TOML file.
pub fn load_descriptors(path: &Path) -> Result<Vec<ResourceDescriptor>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let file: DescriptorFile = toml::from_str(&content)
        .with_context(|| format!("Invalid descriptor file {}", path.display()))?;
    Ok(file.descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_registry_is_consistent() {
        let registry = registry(Vec::new()).unwrap();
        assert_eq!(registry.len(), builtin().len());
        for kind in registry.kinds() {
            assert!(registry.get(kind).is_ok());
        }
    }

    #[test]
    fn test_aliases_share_descriptor() {
        let registry = registry(Vec::new()).unwrap();
        let latest = registry.get("cli_credential").unwrap();
        let alias = registry.get("cli_credential_v2").unwrap();
        assert!(std::sync::Arc::ptr_eq(&latest, &alias));
        assert_eq!(registry.aliases_of("wireless_ssid"), vec!["enterprise_ssid"]);
    }

    #[test]
    fn test_no_secret_identity_fields() {
        for descriptor in builtin() {
            for field in descriptor.secret_fields() {
                assert!(!descriptor.is_identity(field), "{}: {field}", descriptor.kind);
            }
        }
    }

    #[test]
    fn test_load_descriptor_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("extra.toml");
        fs::write(
            &path,
            r#"
[[descriptor]]
kind = "network_profile"
aliases = ["network_profile_v1"]
identity = ["name"]
completion = "task-id"

[descriptor.endpoints.list]
method = "GET"
path = "/dna/intent/api/v1/networkprofile"

[descriptor.endpoints.create]
method = "POST"
path = "/dna/intent/api/v1/networkprofile"

[[descriptor.fields]]
name = "profile_type"
remote = "namespace"
"#,
        )
        .unwrap();

        let extra = load_descriptors(&path).unwrap();
        assert_eq!(extra.len(), 1);
        let registry = registry(extra).unwrap();
        let profile = registry.get("network_profile_v1").unwrap();
        assert_eq!(profile.wire_name("profile_type"), "namespace");
    }

    #[test]
    fn test_duplicate_user_descriptor_rejected() {
        let dup = ResourceDescriptor::new("tag")
            .identity(&["name"])
            .list(declarative::Endpoint::get("/x"));
        assert!(registry(vec![dup]).is_err());
    }
}
