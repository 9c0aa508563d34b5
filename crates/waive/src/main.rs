//! waive - sample server gateway
//!
//! Subcommands:
//! - `waive serve` - Run the HTTP gateway and the sample library worker
//! - `waive resolve <group> <category> <folder> <filename>` - Print where an asset lives
//! - `waive config` - Print the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use waive::assets::{AssetRef, AssetResolver};
use waive::{serve, telemetry};
use waiveconf::WaiveConfig;

#[derive(Parser)]
#[command(name = "waive")]
#[command(about = "HTTP gateway for the Waive sample server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Config file (replaces ./waive.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// HTTP port to bind
        #[arg(short, long)]
        port: Option<u16>,

        /// Root directory of the sample library
        #[arg(long)]
        assets_root: Option<PathBuf>,

        /// OTLP gRPC endpoint for OpenTelemetry (e.g., "localhost:4317")
        #[arg(long)]
        otlp_endpoint: Option<String>,
    },

    /// Print the file an asset reference resolves to
    Resolve {
        group: String,
        category: String,
        folder: String,
        filename: String,

        /// Config file (replaces ./waive.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration and where it came from
    Config {
        /// Config file (replaces ./waive.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            assets_root,
            otlp_endpoint,
        } => {
            let mut config = WaiveConfig::load_from(config.as_deref())
                .context("Failed to load configuration")?;
            if let Some(port) = port {
                config.bind.http_port = port;
            }
            if let Some(root) = assets_root {
                config.paths.assets_root = root;
            }
            if let Some(endpoint) = otlp_endpoint {
                config.telemetry.otlp_endpoint = endpoint;
            }

            let telemetry = telemetry::init(&config.telemetry)?;
            let result = serve::run(config).await;
            telemetry.shutdown();
            result?;
        }
        Commands::Resolve {
            group,
            category,
            folder,
            filename,
            config,
        } => {
            let config = WaiveConfig::load_from(config.as_deref())
                .context("Failed to load configuration")?;
            telemetry::init_local(&config.telemetry.log_level);

            let resolver = AssetResolver::from_config(&config);
            let resolved = resolver
                .resolve(&AssetRef::new(group, category, folder, filename))
                .context("Cannot resolve asset")?;
            let path = resolved.full_path();

            println!("{}", path.display());
            if !path.is_file() {
                tracing::warn!("{} does not exist", path.display());
            }
        }
        Commands::Config { config } => {
            let (config, sources) = WaiveConfig::load_with_sources_from(config.as_deref())
                .context("Failed to load configuration")?;

            if sources.files.is_empty() {
                println!("# Sources: defaults only");
            } else {
                for file in &sources.files {
                    println!("# Source: {}", file.display());
                }
            }
            for var in &sources.env_overrides {
                println!("# Env: {}", var);
            }
            println!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
