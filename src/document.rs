//! Desired-state documents and batch files

use anyhow::{Context, Result, bail};
use declarative::{DesiredState, Document, ReconcileRequest};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// One entry of a batch file
#[derive(Debug, Clone, Deserialize)]
pub struct BatchEntry {
    pub kind: String,
    #[serde(default = "present")]
    pub state: DesiredState,
    #[serde(default)]
    pub desired: Document,
}

fn present() -> DesiredState {
    DesiredState::Present
}

impl BatchEntry {
    pub fn into_request(self) -> ReconcileRequest {
        ReconcileRequest::new(self.kind, self.state, self.desired)
    }
}

#[derive(Deserialize)]
struct BatchFile {
    #[serde(default, rename = "resource")]
    resources: Vec<BatchEntry>,
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

/// Parse a document from JSON or TOML text.
pub fn parse_document(content: &str, toml_format: bool) -> Result<Document> {
    let value: Value = if toml_format {
        toml::from_str(content).context("Invalid TOML document")?
    } else {
        serde_json::from_str(content).context("Invalid JSON document")?
    };
    match value {
        Value::Object(doc) => Ok(doc),
        other => bail!("A desired document must be an object, got {other}"),
    }
}

/// Read a document from a file, or JSON from stdin for `-`.
pub fn read_document(path: &str) -> Result<Document> {
    if path == "-" {
        let mut content = String::new();
        io::stdin()
            .read_to_string(&mut content)
            .context("Could not read stdin")?;
        return parse_document(&content, false);
    }
    let path = crate::config::expand_path(path);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    parse_document(&content, is_toml(&path))
        .with_context(|| format!("In {}", path.display()))
}

/// Apply `key=value` assignments. Values that parse as JSON keep their type.
pub fn apply_assignments(doc: &mut Document, assignments: &[String]) -> Result<()> {
    for assignment in assignments {
        let Some((key, raw)) = assignment.split_once('=') else {
            bail!("Expected KEY=VALUE, got '{assignment}'");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Empty key in '{assignment}'");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        doc.insert(key.to_string(), value);
    }
    Ok(())
}

/// Parse a batch file of `resource` entries.
pub fn parse_batch(content: &str, toml_format: bool) -> Result<Vec<BatchEntry>> {
    let file: BatchFile = if toml_format {
        toml::from_str(content).context("Invalid TOML batch file")?
    } else {
        serde_json::from_str(content).context("Invalid JSON batch file")?
    };
    Ok(file.resources)
}

/// Read a batch file from disk.
pub fn read_batch(path: &str) -> Result<Vec<BatchEntry>> {
    let path = crate::config::expand_path(path);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    parse_batch(&content, is_toml(&path)).with_context(|| format!("In {}", path.display()))
}
