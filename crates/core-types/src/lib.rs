//! Shared primitives for the Warden request gate.
//!
//! Everything here is plain data: identities, permissions and the failure
//! taxonomy every gate stage translates its errors into.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Message returned when a request carries no credential at all.
pub const MISSING_TOKEN_MESSAGE: &str = "Missing authorization token.";

/// Failure kinds surfaced by gate stages.
///
/// Every stage maps its own internal failure into exactly one of these before
/// handing off to the error translator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    ValidationFailed(String),
    #[error("{0}")]
    Internal(String),
}

impl GateError {
    pub fn missing_token() -> Self {
        Self::Unauthenticated(MISSING_TOKEN_MESSAGE.to_string())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            GateError::Unauthenticated(_) => FailureKind::Unauthenticated,
            GateError::Forbidden(_) => FailureKind::Forbidden,
            GateError::ValidationFailed(_) => FailureKind::ValidationFailed,
            GateError::Internal(_) => FailureKind::Internal,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            GateError::Unauthenticated(msg)
            | GateError::Forbidden(msg)
            | GateError::ValidationFailed(msg)
            | GateError::Internal(msg) => msg,
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unauthenticated,
    Forbidden,
    ValidationFailed,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Unauthenticated => "unauthenticated",
            FailureKind::Forbidden => "forbidden",
            FailureKind::ValidationFailed => "validation_failed",
            FailureKind::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Opaque caller identity as issued by the credential verifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub String);

impl IdentityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request correlation id used in spans and failure records.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access level a permission grants over its resource kind.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[default]
    Full,
    ReadOnly,
}

/// Narrowing rule applied when producing a data-access handle.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DataScope {
    pub resource_kind: String,
    pub scope_name: String,
    /// Dotted path into the credential supplying the scope value, e.g. `identity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_value_source_path: Option<String>,
}

impl DataScope {
    pub fn new(resource_kind: impl Into<String>, scope_name: impl Into<String>) -> Self {
        Self {
            resource_kind: resource_kind.into(),
            scope_name: scope_name.into(),
            scope_value_source_path: None,
        }
    }

    pub fn with_value_from(mut self, path: impl Into<String>) -> Self {
        self.scope_value_source_path = Some(path.into());
        self
    }
}

/// A named grant, optionally scoped to a subset of a resource kind.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    #[serde(default)]
    pub access: Access,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_scope: Option<DataScope>,
}

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access: Access::Full,
            data_scope: None,
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn with_scope(mut self, scope: DataScope) -> Self {
        self.data_scope = Some(scope);
        self
    }
}

/// Verified identity plus granted roles and permissions for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct Credential {
    pub identity: IdentityId,
    pub roles: Vec<String>,
    pub claims: Value,
    permissions: Option<Vec<Permission>>,
}

impl Credential {
    pub fn new(identity: IdentityId, roles: Vec<String>) -> Self {
        Self {
            identity,
            roles,
            claims: Value::Null,
            permissions: None,
        }
    }

    pub fn with_claims(mut self, claims: Value) -> Self {
        self.claims = claims;
        self
    }

    /// Granted permissions; empty until the permission loader has run.
    pub fn permissions(&self) -> &[Permission] {
        self.permissions.as_deref().unwrap_or(&[])
    }

    pub fn permissions_loaded(&self) -> bool {
        self.permissions.is_some()
    }

    /// Populate the granted permission set. Allowed exactly once per request.
    pub fn set_permissions(&mut self, permissions: Vec<Permission>) -> GateResult<()> {
        if self.permissions.is_some() {
            return Err(GateError::internal("credential permissions already loaded"));
        }
        self.permissions = Some(permissions);
        Ok(())
    }

    pub fn permission(&self, name: &str) -> Option<&Permission> {
        self.permissions().iter().find(|perm| perm.name == name)
    }

    /// Read a value by dotted path: `identity`, `roles`, or `claims.<key>...`.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.').filter(|segment| !segment.is_empty());
        let head = segments.next()?;
        let root = match head {
            "identity" => Value::String(self.identity.0.clone()),
            "roles" => Value::from(self.roles.clone()),
            "claims" => self.claims.clone(),
            _ => return None,
        };

        let mut current = root;
        for segment in segments {
            current = match current {
                Value::Object(mut map) => map.remove(segment)?,
                Value::Array(items) => {
                    let idx: usize = segment.parse().ok()?;
                    items.into_iter().nth(idx)?
                }
                _ => return None,
            };
        }

        match current {
            Value::Null => None,
            other => Some(other),
        }
    }

    /// Identity and roles only; safe to attach to diagnostic records.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "identity": self.identity.0,
            "roles": self.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn permissions_can_only_be_set_once() {
        let mut cred = Credential::new(IdentityId::new("u-1"), vec!["user".into()]);
        assert!(!cred.permissions_loaded());
        cred.set_permissions(vec![Permission::new("profileFullAccess")])
            .unwrap();
        assert!(cred.permission("profileFullAccess").is_some());

        let err = cred.set_permissions(Vec::new()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Internal);
        assert_eq!(cred.permissions().len(), 1);
    }

    #[test]
    fn lookup_walks_claims() {
        let cred = Credential::new(IdentityId::new("u-7"), vec!["user".into()])
            .with_claims(json!({"profile": {"id": 42}, "tags": ["a", "b"]}));

        assert_eq!(cred.lookup("identity"), Some(json!("u-7")));
        assert_eq!(cred.lookup("claims.profile.id"), Some(json!(42)));
        assert_eq!(cred.lookup("claims.tags.1"), Some(json!("b")));
        assert_eq!(cred.lookup("claims.missing"), None);
        assert_eq!(cred.lookup("unknown"), None);
    }

    #[test]
    fn permission_deserializes_with_defaults() {
        let perm: Permission = serde_json::from_value(json!({
            "name": "profileLimitedReadOnlyAccess",
            "data_scope": {"resource_kind": "profile", "scope_name": "limited"}
        }))
        .unwrap();
        assert_eq!(perm.access, Access::Full);
        let scope = perm.data_scope.unwrap();
        assert_eq!(scope.resource_kind, "profile");
        assert!(scope.scope_value_source_path.is_none());
    }

    #[test]
    fn missing_token_message_is_stable() {
        let err = GateError::missing_token();
        assert_eq!(err.message(), "Missing authorization token.");
        assert_eq!(err.kind(), FailureKind::Unauthenticated);
    }
}
