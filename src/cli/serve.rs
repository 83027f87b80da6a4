use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::app::build_gate;
use crate::config::WardenConfig;

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides `listen` from the config file)
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

pub async fn cmd_serve(args: ServeArgs, config: &WardenConfig) -> Result<()> {
    let gate = build_gate(config).await?;
    info!(routes = gate.len(), "route table registered");
    let app = gate.into_router();

    let addr = args.listen.unwrap_or(config.listen);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "warden listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
