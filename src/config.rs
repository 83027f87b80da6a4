//! Application configuration loaded from `warden.yaml`.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use route_gate::{TokenSources, DEFAULT_AUTH_PLUGIN};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Overrides `auth.secret` when set.
pub const AUTH_SECRET_ENV: &str = "WARDEN_AUTH_SECRET";

const DEFAULT_TOKEN_FIELD: &str = "access_token";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("no auth secret configured; set auth.secret or {AUTH_SECRET_ENV}")]
    MissingSecret,
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub listen: SocketAddr,
    pub auth: AuthConfig,
    /// Grants file; the built-in demo grants apply when unset.
    pub grants: Option<PathBuf>,
    /// Declarative route table bound to the built-in handlers.
    pub routes: Value,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            auth: AuthConfig::default(),
            grants: None,
            routes: default_routes(),
        }
    }
}

impl WardenConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, SettingsError> {
        Ok(serde_yaml::from_str(raw)?)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub secret: Option<String>,
    /// Kind the HMAC verifier registers under; routes name it in `auth.plugin`.
    pub plugin: String,
    pub fallbacks: TokenFallbacks,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            plugin: DEFAULT_AUTH_PLUGIN.to_string(),
            fallbacks: TokenFallbacks::default(),
        }
    }
}

impl AuthConfig {
    /// `WARDEN_AUTH_SECRET` wins over the file value. Empty values count as unset.
    pub fn resolve_secret(&self) -> Result<String, SettingsError> {
        env::var(AUTH_SECRET_ENV)
            .ok()
            .or_else(|| self.secret.clone())
            .filter(|secret| !secret.trim().is_empty())
            .ok_or(SettingsError::MissingSecret)
    }
}

/// Token locations consulted when the `Authorization` header is absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenFallbacks {
    pub query: bool,
    pub body: bool,
    pub field: String,
}

impl Default for TokenFallbacks {
    fn default() -> Self {
        Self {
            query: false,
            body: false,
            field: DEFAULT_TOKEN_FIELD.to_string(),
        }
    }
}

impl TokenFallbacks {
    pub fn token_sources(&self) -> TokenSources {
        let mut sources = TokenSources::default();
        if self.query {
            sources = sources.with_query_field(self.field.clone());
        }
        if self.body {
            sources = sources.with_body_field(self.field.clone());
        }
        sources
    }
}

/// Demo table served when the config file declares no routes.
pub fn default_routes() -> Value {
    json!([
        {
            "method": "GET",
            "path": "/open",
            "handler": "ok"
        },
        {
            "method": "GET",
            "path": "/me",
            "handler": "whoami",
            "auth": {"plugin": DEFAULT_AUTH_PLUGIN}
        },
        {
            "method": "GET",
            "path": "/profile",
            "handler": {
                "profileFullAccess": "ok",
                "profileLimitedReadOnlyAccess": ["audit", "scoped"]
            }
        },
        {
            "method": "POST",
            "path": "/profile",
            "handler": {"profileFullAccess": "accepted"},
            "validate": {
                "fields": [
                    {"name": "email", "in": "body", "rules": [
                        {"rule": "required"},
                        {"rule": "email", "message": "Invalid email."}
                    ]}
                ]
            }
        },
        {
            "method": "GET",
            "path": "/restricted/:id",
            "handler": "echo",
            "auth": {"permissions": ["profileFullAccess", "profileLimitedReadOnlyAccess"]},
            "validate": {
                "fields": [
                    {"name": "id", "in": "params", "rules": [{"rule": "number"}]}
                ]
            }
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn yaml_overrides_defaults() {
        let config = WardenConfig::from_yaml(
            r#"
listen: 0.0.0.0:9000
auth:
  secret: from-file
  fallbacks:
    query: true
routes:
  - method: GET
    path: /ping
    handler: ok
"#,
        )
        .unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.auth.plugin, "bearer");
        let sources = config.auth.fallbacks.token_sources();
        assert_eq!(sources.query_field.as_deref(), Some("access_token"));
        assert!(sources.body_field.is_none());
        assert_eq!(config.routes[0]["path"], "/ping");
    }

    #[test]
    fn defaults_carry_demo_routes() {
        let config = WardenConfig::default();
        assert!(config.routes.as_array().map(|r| !r.is_empty()).unwrap_or(false));
        assert!(config.grants.is_none());
    }

    #[test]
    #[serial]
    fn env_secret_wins() {
        let auth = AuthConfig {
            secret: Some("from-file".into()),
            ..AuthConfig::default()
        };
        env::set_var(AUTH_SECRET_ENV, "from-env");
        assert_eq!(auth.resolve_secret().unwrap(), "from-env");
        env::remove_var(AUTH_SECRET_ENV);
        assert_eq!(auth.resolve_secret().unwrap(), "from-file");
    }

    #[test]
    #[serial]
    fn missing_secret_is_an_error() {
        env::remove_var(AUTH_SECRET_ENV);
        let auth = AuthConfig::default();
        assert!(matches!(
            auth.resolve_secret(),
            Err(SettingsError::MissingSecret)
        ));
    }
}
