use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::WardenConfig;

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    Ok(())
}

pub struct LoadedConfig {
    pub config: WardenConfig,
    pub path: PathBuf,
    pub from_file: bool,
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => {
            // Priority: ./config/warden.yaml > ~/.config/warden/warden.yaml
            let local_config = PathBuf::from("config/warden.yaml");
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("warden");
                path.push("warden.yaml");
                path
            }
        }
    };

    if config_path.exists() {
        let config = read_config(&config_path).await?;
        info!("Loaded configuration from: {}", config_path.display());
        Ok(LoadedConfig {
            config,
            path: config_path,
            from_file: true,
        })
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        Ok(LoadedConfig {
            config: WardenConfig::default(),
            path: config_path,
            from_file: false,
        })
    }
}

async fn read_config(path: &Path) -> Result<WardenConfig> {
    let content = fs::read_to_string(path)
        .await
        .context("Failed to read config file")?;
    WardenConfig::from_yaml(&content).context("Failed to parse config file")
}
