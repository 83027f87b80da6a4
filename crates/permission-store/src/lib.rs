pub mod config;

pub use crate::config::{
    default_grants_file, load_grants_from_path, load_grants_from_reader, parse_grants_str,
    ConfigError, GrantsFile,
};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use warden_core_types::{Credential, GateError, GateResult, IdentityId, Permission};

/// Errors produced by a permission store backend.
#[derive(Clone, Debug, Error)]
pub enum StoreError {
    #[error("permission store unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Identity-to-permission lookup consumed by the permission loader.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Permissions reachable through `roles`, followed by direct identity grants.
    async fn find_permissions(
        &self,
        roles: &[String],
        identity: &IdentityId,
    ) -> Result<Vec<Permission>, StoreError>;
}

#[derive(Default)]
struct GrantIndex {
    catalogue: HashMap<String, Permission>,
    roles: HashMap<String, Vec<String>>,
    identities: HashMap<String, Vec<String>>,
}

impl GrantIndex {
    fn from_file(file: GrantsFile) -> Self {
        let catalogue = file
            .permissions
            .into_iter()
            .map(|perm| (perm.name.clone(), perm))
            .collect();
        Self {
            catalogue,
            roles: file.roles.into_iter().collect(),
            identities: file.identities.into_iter().collect(),
        }
    }

    fn resolve(&self, roles: &[String], identity: &IdentityId) -> Vec<Permission> {
        let role_grants = roles
            .iter()
            .filter_map(|role| self.roles.get(role))
            .flatten();
        let direct_grants = self.identities.get(identity.as_str()).into_iter().flatten();

        let mut seen: HashSet<&String> = HashSet::new();
        role_grants
            .chain(direct_grants)
            .filter(|name| seen.insert(*name))
            .filter_map(|name| self.catalogue.get(name).cloned())
            .collect()
    }
}

/// In-memory store backed by a [`GrantsFile`].
pub struct InMemoryPermissionStore {
    index: RwLock<Option<GrantIndex>>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(None),
        }
    }

    pub async fn with_grants(file: GrantsFile) -> Result<Self, ConfigError> {
        let store = Self::new();
        store.load_grants(file).await?;
        Ok(store)
    }

    /// Validate and swap in a new grant set.
    pub async fn load_grants(&self, file: GrantsFile) -> Result<(), ConfigError> {
        file.validate()?;
        let index = GrantIndex::from_file(file);
        debug!(
            target = "permission-store",
            permissions = index.catalogue.len(),
            roles = index.roles.len(),
            "grants loaded"
        );
        *self.index.write().await = Some(index);
        Ok(())
    }
}

impl Default for InMemoryPermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn find_permissions(
        &self,
        roles: &[String],
        identity: &IdentityId,
    ) -> Result<Vec<Permission>, StoreError> {
        let guard = self.index.read().await;
        let index = guard
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("no grants loaded".into()))?;
        Ok(index.resolve(roles, identity))
    }
}

/// Loads a credential's granted permission set from a [`PermissionStore`].
#[derive(Clone)]
pub struct PermissionLoader {
    store: Arc<dyn PermissionStore>,
}

impl PermissionLoader {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self { store }
    }

    /// An empty result is valid; only store failures are errors.
    pub async fn load(&self, credential: &Credential) -> GateResult<Vec<Permission>> {
        self.store
            .find_permissions(&credential.roles, &credential.identity)
            .await
            .map_err(|err| {
                warn!(
                    target = "permission-store",
                    identity = %credential.identity,
                    error = %err,
                    "permission lookup failed"
                );
                GateError::internal(err.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn role_grants_precede_direct_grants_without_duplicates() {
        let mut file = default_grants_file();
        file.identities.insert(
            "u-1".into(),
            vec![
                "profileFullAccess".into(),
                "profileLimitedReadOnlyAccess".into(),
            ],
        );
        let store = InMemoryPermissionStore::with_grants(file).await.unwrap();

        let perms = store
            .find_permissions(&["user".to_string()], &IdentityId::new("u-1"))
            .await
            .unwrap();
        let names: Vec<_> = perms.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["profileLimitedReadOnlyAccess", "profileFullAccess"]
        );
    }

    #[tokio::test]
    async fn unloaded_store_is_unavailable() {
        let store = InMemoryPermissionStore::new();
        let result = store
            .find_permissions(&[], &IdentityId::new("u-1"))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
