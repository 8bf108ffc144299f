//! Connection parameters for one Catalyst Center cluster.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default HTTPS port.
pub const DEFAULT_PORT: u16 = 443;

/// Default API version the built-in descriptors target.
pub const DEFAULT_VERSION: &str = "2.3.7.6";

/// How to reach and authenticate against the controller.
///
/// Passed explicitly to [`crate::CatalystClient::new`]; nothing here is read
/// from process-wide state.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Hostname or IP address, without scheme.
    pub host: String,
    /// HTTPS port.
    pub port: u16,
    /// Verify the controller's TLS certificate.
    pub verify: bool,
    /// Controller software version.
    pub version: String,
    /// Account used for the token request.
    pub username: String,
    /// Never serialized.
    #[serde(skip_serializing)]
    pub password: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            verify: true,
            version: DEFAULT_VERSION.to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: 60,
        }
    }
}

// Password stays out of debug output.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("verify", &self.verify)
            .field("version", &self.version)
            .field("username", &self.username)
            .field("password", &"********")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ConnectionConfig {
    /// Settings for `host` with every other field at its default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Set the username and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the HTTPS port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable certificate verification.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// `https://host[:port]`, with the default port left out.
    pub fn base_url(&self) -> String {
        let host = self
            .host
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        if self.port == DEFAULT_PORT {
            format!("https://{host}")
        } else {
            format!("https://{host}:{}", self.port)
        }
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check that the parameters are usable before connecting.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host is required".into()));
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(Error::InvalidConfig(
                "username and password are required".into(),
            ));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must be non-zero".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::InvalidConfig("timeout_secs must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.port, 443);
        assert!(config.verify);
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_base_url() {
        assert_eq!(
            ConnectionConfig::new("dnac.example.com").base_url(),
            "https://dnac.example.com"
        );
        assert_eq!(
            ConnectionConfig::new("https://10.0.0.1/").port(8443).base_url(),
            "https://10.0.0.1:8443"
        );
    }

    #[test]
    fn test_validate() {
        assert!(ConnectionConfig::new("").credentials("a", "b").validate().is_err());
        assert!(ConnectionConfig::new("h").validate().is_err());
        assert!(ConnectionConfig::new("h").credentials("a", "b").validate().is_ok());
    }

    #[test]
    fn test_password_hidden() {
        let config = ConnectionConfig::new("h").credentials("admin", "s3cret!");
        assert!(!format!("{config:?}").contains("s3cret!"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("s3cret!"));
    }

    #[test]
    fn test_partial_deserialize() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"host": "h", "verify": false}"#).unwrap();
        assert_eq!(config.port, 443);
        assert!(!config.verify);
    }
}
