//! Grant definitions for the permission store.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_core_types::{Access, DataScope, Permission};

/// Static grants file: the permission catalogue plus who holds what.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GrantsFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Role name -> permission names, in grant order.
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,
    /// Identity -> permission names granted directly to that identity.
    #[serde(default)]
    pub identities: BTreeMap<String, Vec<String>>,
}

fn default_version() -> u32 {
    1
}

impl GrantsFile {
    /// Reject grants that name permissions missing from the catalogue.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let known: HashSet<&str> = self.permissions.iter().map(|p| p.name.as_str()).collect();

        let mut seen = HashSet::new();
        for perm in &self.permissions {
            if !seen.insert(perm.name.as_str()) {
                return Err(ConfigError::DuplicatePermission(perm.name.clone()));
            }
        }

        let mut unknown: Vec<String> = self
            .roles
            .values()
            .chain(self.identities.values())
            .flatten()
            .filter(|name| !known.contains(name.as_str()))
            .cloned()
            .collect();

        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort();
        unknown.dedup();
        Err(ConfigError::UnknownPermissions(unknown.join(", ")))
    }
}

/// Errors surfaced while loading grant configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize grants: {0}")]
    Deserialize(String),
    #[error("unknown permissions in grants: {0}")]
    UnknownPermissions(String),
    #[error("permission defined twice: {0}")]
    DuplicatePermission(String),
}

pub fn load_grants_from_reader<R: Read>(mut reader: R) -> Result<GrantsFile, ConfigError> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    parse_grants_str(&buf)
}

pub fn load_grants_from_path(path: impl AsRef<Path>) -> Result<GrantsFile, ConfigError> {
    let file = File::open(path.as_ref())?;
    load_grants_from_reader(file)
}

pub fn parse_grants_str(raw: &str) -> Result<GrantsFile, ConfigError> {
    match serde_json::from_str(raw) {
        Ok(grants) => Ok(grants),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            ConfigError::Deserialize(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        }),
    }
}

/// Grants used when no grants file is configured.
pub fn default_grants_file() -> GrantsFile {
    let mut roles = BTreeMap::new();
    roles.insert(
        "user".to_string(),
        vec!["profileLimitedReadOnlyAccess".to_string()],
    );
    roles.insert("admin".to_string(), vec!["profileFullAccess".to_string()]);

    GrantsFile {
        version: 1,
        permissions: vec![
            Permission::new("profileLimitedReadOnlyAccess")
                .with_access(Access::ReadOnly)
                .with_scope(DataScope::new("profile", "limited").with_value_from("identity")),
            Permission::new("profileFullAccess"),
        ],
        roles,
        identities: BTreeMap::new(),
    }
}
