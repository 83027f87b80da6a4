use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use permission_store::{
    default_grants_file, load_grants_from_path, GrantsFile, InMemoryPermissionStore,
};
use route_gate::{GateBootstrap, GateRouter, HmacBearerPlugin};
use tracing::info;

use crate::config::WardenConfig;
use crate::handlers::builtin_registry;

pub fn load_grants(config: &WardenConfig) -> Result<GrantsFile> {
    match &config.grants {
        Some(path) => {
            let grants = load_grants_from_path(path)
                .with_context(|| format!("failed to load grants from {}", path.display()))?;
            info!(path = %path.display(), "loaded grants file");
            Ok(grants)
        }
        None => {
            info!("no grants file configured; using built-in grants");
            Ok(default_grants_file())
        }
    }
}

/// Wire the gate from configuration and register the configured route table.
pub async fn build_gate(config: &WardenConfig) -> Result<GateRouter> {
    let secret = config.auth.resolve_secret()?;
    let store = InMemoryPermissionStore::with_grants(load_grants(config)?)
        .await
        .context("invalid grants")?;

    let mut gate = GateBootstrap::new(Arc::new(store))
        .with_plugin(Arc::new(
            HmacBearerPlugin::new(secret).with_kind(config.auth.plugin.clone()),
        ))
        .with_token_sources(config.auth.fallbacks.token_sources())
        .build_router();
    gate.configure_value(&config.routes, &builtin_registry())
        .context("invalid route table")?;
    Ok(gate)
}

pub async fn build_app(config: &WardenConfig) -> Result<Router> {
    Ok(build_gate(config).await?.into_router())
}
