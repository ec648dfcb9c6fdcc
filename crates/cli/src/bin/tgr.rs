//! Temporal Graph Retrieval administrative CLI
//!
//! Thin caller over the engine: fuse ranked lists, replay facts through the
//! contradiction engine, and list the accepted strategy names.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tgr_cli::{run_fuse, run_ingest, strategy_listing, FuseRequest, IngestRequest};
use tgr_core::ResolutionStrategy;
use tgr_manager::EngineConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Temporal Graph Retrieval administrative CLI
#[derive(Parser, Debug)]
#[command(
    name = "tgr",
    about = "Administrative CLI for Temporal Graph Retrieval",
    version
)]
struct Args {
    /// Engine configuration file (TOML)
    #[arg(short, long, env = "TGR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Logging level
    #[arg(
        short,
        long,
        default_value = "warn",
        env = "RUST_LOG",
        global = true,
        help = "Logging level (trace, debug, info, warn, error)"
    )]
    log_level: String,

    /// Enable JSON formatted logs
    #[arg(long, env = "TGR_JSON_LOGS", global = true, help = "Output logs in JSON format")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fuse named ranked lists (JSON) and print the fused ranking
    Fuse {
        /// JSON file with `lists`, in priority order
        file: PathBuf,
    },

    /// Replay facts (JSON) into an in-memory graph and print the outcome
    Ingest {
        /// JSON file with `facts`, in arrival order
        file: PathBuf,

        /// Resolve every contradiction raised with this strategy
        #[arg(short, long)]
        resolve: Option<String>,
    },

    /// List accepted resolution and rerank strategy names
    Strategies,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(&args);

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match args.command {
        Command::Fuse { file } => {
            let request: FuseRequest = read_json(&file)?;
            info!("Fusing {} ranked lists", request.lists.len());
            print_json(&run_fuse(&config, request)?)?;
        }
        Command::Ingest { file, resolve } => {
            let strategy = resolve
                .map(|name| name.parse::<ResolutionStrategy>())
                .transpose()?;
            let request: IngestRequest = read_json(&file)?;
            info!("Replaying {} facts", request.facts.len());
            print_json(&run_ingest(config, request, strategy).await?)?;
        }
        Command::Strategies => print_json(&strategy_listing())?,
    }

    Ok(())
}

/// Initialize tracing subscriber; logs go to stderr so stdout stays JSON
fn init_tracing(args: &Args) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
