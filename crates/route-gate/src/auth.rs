use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use warden_core_types::{Credential, GateError, GateResult, IdentityId};

use crate::context::RequestContext;

/// Plugin kind used when a route is permission-gated without naming one.
pub const DEFAULT_AUTH_PLUGIN: &str = "bearer";

const BEARER_SCHEME: &str = "Bearer";
const MALFORMED_MESSAGE: &str = "Malformed authorization token.";

/// Verified token contents handed back by an [`AuthPlugin`].
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedToken {
    pub subject: String,
    pub roles: Vec<String>,
    pub claims: Value,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthRejection {
    #[error("Malformed authorization token.")]
    Malformed,
    #[error("Authorization token expired.")]
    Expired,
    #[error("Invalid authorization token signature.")]
    BadSignature,
    #[error("{0}")]
    Rejected(String),
}

/// Token verifier keyed by plugin kind.
#[async_trait]
pub trait AuthPlugin: Send + Sync {
    fn kind(&self) -> &str;

    async fn verify(&self, token: &str) -> Result<DecodedToken, AuthRejection>;
}

/// Fallback token locations consulted only when the `Authorization` header is
/// absent.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenSources {
    #[serde(default)]
    pub query_field: Option<String>,
    #[serde(default)]
    pub body_field: Option<String>,
}

impl TokenSources {
    pub fn with_query_field(mut self, field: impl Into<String>) -> Self {
        self.query_field = Some(field.into());
        self
    }

    pub fn with_body_field(mut self, field: impl Into<String>) -> Self {
        self.body_field = Some(field.into());
        self
    }
}

pub fn extract_token(ctx: &RequestContext, sources: &TokenSources) -> GateResult<String> {
    if let Some(value) = ctx.headers.get(header::AUTHORIZATION) {
        return value
            .to_str()
            .ok()
            .and_then(|value| value.trim_start().split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case(BEARER_SCHEME))
            .map(|(_, token)| token.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| GateError::unauthenticated(MALFORMED_MESSAGE));
    }

    let from_query = sources
        .query_field
        .as_deref()
        .and_then(|field| ctx.query.get(field))
        .filter(|token| !token.is_empty())
        .cloned();
    if let Some(token) = from_query {
        return Ok(token);
    }

    let from_body = sources
        .body_field
        .as_deref()
        .and_then(|field| ctx.body.get(field))
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);
    from_body.ok_or_else(GateError::missing_token)
}

/// Extracts the caller's token and verifies it with the route's plugin.
#[derive(Clone, Default)]
pub struct CredentialResolver {
    plugins: HashMap<String, Arc<dyn AuthPlugin>>,
    sources: TokenSources,
}

impl CredentialResolver {
    pub fn new(sources: TokenSources) -> Self {
        Self {
            plugins: HashMap::new(),
            sources,
        }
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn AuthPlugin>) -> Self {
        self.register(plugin);
        self
    }

    pub fn register(&mut self, plugin: Arc<dyn AuthPlugin>) {
        self.plugins.insert(plugin.kind().to_string(), plugin);
    }

    pub fn has_plugin(&self, kind: &str) -> bool {
        self.plugins.contains_key(kind)
    }

    pub fn sources(&self) -> &TokenSources {
        &self.sources
    }

    pub async fn authenticate(&self, ctx: &RequestContext, kind: &str) -> GateResult<Credential> {
        let plugin = self
            .plugins
            .get(kind)
            .ok_or_else(|| GateError::internal(format!("auth plugin '{kind}' not registered")))?;
        let token = extract_token(ctx, &self.sources)?;
        let decoded = plugin.verify(&token).await.map_err(|rejection| {
            debug!(plugin = kind, reason = %rejection, "token rejected");
            GateError::unauthenticated(rejection.to_string())
        })?;
        Ok(Credential::new(IdentityId::new(decoded.subject), decoded.roles)
            .with_claims(decoded.claims))
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.plugins.keys().collect();
        kinds.sort();
        f.debug_struct("CredentialResolver")
            .field("plugins", &kinds)
            .field("sources", &self.sources)
            .finish()
    }
}
