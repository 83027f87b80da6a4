//! Built-in [`AuthPlugin`] implementations.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::auth::{AuthPlugin, AuthRejection, DecodedToken, DEFAULT_AUTH_PLUGIN};

type HmacSha256 = Hmac<Sha256>;

/// Claims carried in an HMAC bearer token.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Expiry as unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            roles: Vec::new(),
            exp: None,
            extra: Map::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn expires_at(mut self, unix_seconds: i64) -> Self {
        self.exp = Some(unix_seconds);
        self
    }

    pub fn expires_in(self, ttl: std::time::Duration) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.expires_at(now.saturating_add(ttl.as_secs() as i64))
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// `<base64url(claims json)>.<hex hmac-sha256(payload segment)>`
pub struct HmacBearerPlugin {
    kind: String,
    secret: Vec<u8>,
}

impl HmacBearerPlugin {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            kind: DEFAULT_AUTH_PLUGIN.to_string(),
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Register under a kind other than `bearer`.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn mint(&self, claims: &TokenClaims) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(claims)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = hex::encode(self.sign(payload.as_bytes()));
        Ok(format!("{payload}.{signature}"))
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    fn decode(&self, token: &str) -> Result<TokenClaims, AuthRejection> {
        let (payload, signature) = token.split_once('.').ok_or(AuthRejection::Malformed)?;
        let provided = hex::decode(signature).map_err(|_| AuthRejection::Malformed)?;
        let expected = self.sign(payload.as_bytes());
        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            return Err(AuthRejection::BadSignature);
        }

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthRejection::Malformed)?;
        let claims: TokenClaims =
            serde_json::from_slice(&raw).map_err(|_| AuthRejection::Malformed)?;

        if let Some(exp) = claims.exp {
            if OffsetDateTime::now_utc().unix_timestamp() >= exp {
                return Err(AuthRejection::Expired);
            }
        }
        Ok(claims)
    }
}

#[async_trait]
impl AuthPlugin for HmacBearerPlugin {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn verify(&self, token: &str) -> Result<DecodedToken, AuthRejection> {
        let claims = self.decode(token)?;
        if claims.sub.is_empty() {
            return Err(AuthRejection::Rejected("Token subject missing.".into()));
        }
        Ok(DecodedToken {
            subject: claims.sub,
            roles: claims.roles,
            claims: Value::Object(claims.extra),
        })
    }
}
