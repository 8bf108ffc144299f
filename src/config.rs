//! Configuration file loading
//!
//! Settings are layered: the TOML file, then `CATALYST_*` environment
//! variables and command-line flags (both resolved by clap).

use crate::cli::ConnectionArgs;
use anyhow::{Context, Result, bail};
use catalystkit::ConnectionConfig;
use declarative::PollerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("catalyst"))
}

/// Default config file path
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Expand `~` and `$VAR` in a user-supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).map_or_else(
        |_| shellexpand::tilde(path).into_owned(),
        std::borrow::Cow::into_owned,
    );
    PathBuf::from(expanded)
}

/// Overrides for the task poller, all optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub timeout_secs: Option<u64>,
    pub initial_interval_secs: Option<u64>,
    pub max_interval_secs: Option<u64>,
    pub jitter: Option<f64>,
}

impl PollerSettings {
    /// Apply these overrides to `config`.
    pub fn apply(&self, mut config: PollerConfig) -> PollerConfig {
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.initial_interval_secs {
            config.initial_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.max_interval_secs {
            config.max_interval = Duration::from_secs(secs);
        }
        if let Some(jitter) = self.jitter {
            config.jitter = jitter.clamp(0.0, 0.5);
        }
        config
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub poller: PollerSettings,
    /// Extra descriptor files loaded at startup
    pub descriptors: Vec<String>,
}

impl AppConfig {
    /// Load from an explicit path, or the default path when it exists.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file yields the defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                let path = expand_path(path);
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                Self::from_file(&path)
            }
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    log::debug!("no config file at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Layer command-line and environment values over the file.
    pub fn with_overrides(mut self, args: &ConnectionArgs) -> Self {
        let connection = &mut self.connection;
        if let Some(host) = &args.host {
            connection.host.clone_from(host);
        }
        if let Some(port) = args.port {
            connection.port = port;
        }
        if let Some(username) = &args.username {
            connection.username.clone_from(username);
        }
        if let Some(password) = &args.password {
            connection.password.clone_from(password);
        }
        if args.insecure {
            connection.verify = false;
        }
        self.descriptors.extend(args.descriptors.iter().cloned());
        self
    }

    /// Descriptor file paths with `~` expanded.
    pub fn descriptor_paths(&self) -> Vec<PathBuf> {
        self.descriptors.iter().map(|p| expand_path(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
descriptors = ["~/descriptors/extra.toml"]

[connection]
host = "dnac.lab"
username = "admin"
password = "pw"
verify = false

[poller]
timeout_secs = 600
"#,
        )
        .unwrap();

        let config = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(config.connection.host, "dnac.lab");
        assert_eq!(config.connection.port, 443);
        assert!(!config.connection.verify);
        assert_eq!(config.poller.timeout_secs, Some(600));
        assert!(!config.descriptor_paths()[0].starts_with("~"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(AppConfig::load(path.to_str()).is_err());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "connection = 3").unwrap();
        assert!(AppConfig::load(path.to_str()).is_err());
    }

    #[test]
    fn test_overrides_win() {
        let config = AppConfig {
            connection: ConnectionConfig::new("file-host").credentials("file", "pw"),
            ..AppConfig::default()
        };
        let args = ConnectionArgs {
            host: Some("flag-host".into()),
            insecure: true,
            descriptors: vec!["extra.toml".into()],
            ..ConnectionArgs::default()
        };
        let config = config.with_overrides(&args);
        assert_eq!(config.connection.host, "flag-host");
        assert_eq!(config.connection.username, "file");
        assert!(!config.connection.verify);
        assert_eq!(config.descriptors, vec!["extra.toml"]);
    }

    #[test]
    fn test_poller_settings_apply() {
        let settings = PollerSettings {
            timeout_secs: Some(60),
            jitter: Some(2.0),
            ..PollerSettings::default()
        };
        let config = settings.apply(PollerConfig::default());
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.initial_interval, Duration::from_secs(2));
        assert!((config.jitter - 0.5).abs() < f64::EPSILON);
    }
}
