use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use warden_cli::cli::{
    cmd_check_config, cmd_mint_token, cmd_serve, init_logging, load_config, CheckConfigArgs,
    MintTokenArgs, ServeArgs,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug mode
    #[arg(short, long)]
    debug: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the configured route table
    Serve(ServeArgs),

    /// Mint a signed bearer token for local testing
    MintToken(MintTokenArgs),

    /// Compile the route table and print each route's stages
    CheckConfig(CheckConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.debug, cli.log_format == LogFormat::Json)?;

    info!("Starting warden v{}", env!("CARGO_PKG_VERSION"));

    let loaded = load_config(cli.config.as_ref()).await?;
    let config = loaded.config;

    let result = match cli.command {
        Commands::Serve(args) => cmd_serve(args, &config).await,
        Commands::MintToken(args) => cmd_mint_token(args, &config),
        Commands::CheckConfig(args) => cmd_check_config(args, &config).await,
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Command failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
