//! shutter-ai entry point
//!
//! `shutter-ai analyze` runs one analysis and prints the result as JSON.
//! `shutter-ai serve` exposes the pipeline over HTTP.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shutter_ai::{AnalysisOrchestrator, AppState};
use shutter_common::config::{load_toml_config, resolve_config_path, resolve_model_api_key, TomlConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "shutter-ai", version, about = "Photo post analysis pipeline")]
struct Cli {
    /// Config file (overrides SHUTTER_CONFIG and the default location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one post and print the result as JSON
    Analyze {
        /// HTTP(S) URL or data: URI of the photo
        #[arg(long)]
        image_url: String,

        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value = "")]
        comment: String,

        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:5750", env = "SHUTTER_AI_BIND")]
        bind: SocketAddr,
    },
}

fn load_config(cli_path: Option<&PathBuf>) -> Result<TomlConfig> {
    match resolve_config_path(cli_path.map(PathBuf::as_path)) {
        Some(path) => load_toml_config(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(TomlConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    shutter_common::logging::init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!(
        "shutter-ai {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let api_key = resolve_model_api_key(&config).context("Model API key not configured")?;
    let orchestrator = Arc::new(
        AnalysisOrchestrator::from_config(&config, api_key)
            .context("Failed to initialize analysis pipeline")?,
    );

    match cli.command {
        Command::Analyze {
            image_url,
            title,
            comment,
            pretty,
        } => {
            let result = orchestrator
                .analyze(&image_url, &title, &comment)
                .await
                .context("Analysis failed")?;
            let json = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            println!("{}", json);
        }
        Command::Serve { bind } => {
            let app = shutter_ai::build_router(AppState::new(orchestrator));

            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("Failed to bind {}", bind))?;
            info!("Listening on http://{}", bind);
            info!("Health check: http://{}/health", bind);

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
