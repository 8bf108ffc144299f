//! Exchange over HTTPS with ureq.

use super::{Exchange, Reply};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use declarative::{Method, Request};
use log::debug;
use serde_json::Value;

/// Token endpoint, relative to the controller base URL.
pub const TOKEN_PATH: &str = "/dna/system/api/v1/auth/token";

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "X-Auth-Token";

/// A ureq agent bound to one controller.
pub struct UreqExchange {
    agent: ureq::Agent,
    base_url: String,
}

impl UreqExchange {
    /// Build the agent from the connection settings.
    pub fn new(config: &ConnectionConfig) -> Self {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(!config.verify)
            .build();
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout()))
            .tls_config(tls)
            .user_agent(format!("catalystkit/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .into();
        Self {
            agent,
            base_url: config.base_url(),
        }
    }

    /// Absolute URL for a request path.
    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn prepare<B>(
        &self,
        builder: ureq::RequestBuilder<B>,
        request: &Request,
        token: &str,
    ) -> ureq::RequestBuilder<B> {
        let mut builder = builder
            .header(TOKEN_HEADER, token)
            .header("Accept", "application/json");
        if request.body.is_some() {
            builder = builder.header("Content-Type", "application/json");
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        for (key, value) in &request.query {
            builder = builder.query(key.as_str(), value.as_str());
        }
        builder
    }
}

impl Exchange for UreqExchange {
    fn fetch_token(&self, config: &ConnectionConfig) -> Result<String> {
        debug!(
            "POST {TOKEN_PATH} (user {}, controller version {})",
            config.username, config.version
        );
        let mut response = self
            .agent
            .post(&self.url_for(TOKEN_PATH))
            .header("Authorization", basic_auth(&config.username, &config.password))
            .header("Content-Type", "application/json")
            .send_empty()?;
        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string()?;
        match status {
            200..=299 => token_from(&text),
            401 | 403 => Err(Error::Auth(format!(
                "token request rejected for user {} (HTTP {status})",
                config.username
            ))),
            _ => Err(Error::http(
                format!("token request failed: HTTP {status}"),
                Some(status),
            )),
        }
    }

    fn send(&self, request: &Request, token: &str) -> Result<Reply> {
        let url = self.url_for(&request.path);
        let result = match request.method {
            Method::Get => self.prepare(self.agent.get(&url), request, token).call(),
            Method::Delete => {
                let builder = self.prepare(self.agent.delete(&url), request, token);
                match &request.body {
                    Some(body) => builder.force_send_body().send_json(body),
                    None => builder.call(),
                }
            }
            Method::Post => {
                let builder = self.prepare(self.agent.post(&url), request, token);
                match &request.body {
                    Some(body) => builder.send_json(body),
                    None => builder.send_empty(),
                }
            }
            Method::Put => {
                let builder = self.prepare(self.agent.put(&url), request, token);
                match &request.body {
                    Some(body) => builder.send_json(body),
                    None => builder.send_empty(),
                }
            }
            Method::Patch => {
                let builder = self.prepare(self.agent.patch(&url), request, token);
                match &request.body {
                    Some(body) => builder.send_json(body),
                    None => builder.send_empty(),
                }
            }
        };
        let mut response = result?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let text = response.body_mut().read_to_string()?;
        Ok(Reply {
            status,
            location,
            text,
        })
    }
}

/// Join a base URL and a request path. Absolute URLs pass through unchanged.
pub fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("https://") || path.starts_with("http://") {
        path.to_string()
    } else if path.starts_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

/// `Authorization` header value for HTTP basic auth.
fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Read the token out of the token endpoint's JSON reply.
fn token_from(text: &str) -> Result<String> {
    let body: Value = serde_json::from_str(text)?;
    body.get("Token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| Error::InvalidResponse("token response has no Token field".into()))
}
