use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidrelay::config::Config;
use vidrelay::portal::Portal;

mod commands;

#[derive(Parser)]
#[command(
    name = "vidrelay",
    version,
    about = "Resolve playable video streams across federated mirrors and local extractors",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configuration file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve playable streams for one or more content ids
    Resolve {
        /// Content ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show metadata for a video
    Info {
        id: String,
    },

    /// Search videos
    Search {
        /// Search query
        query: String,

        /// Result page (1-based)
        #[arg(short, long, default_value = "1")]
        page: u32,
    },

    /// List trending videos
    Trending {
        /// Region code, defaults to the configured region
        #[arg(short, long)]
        region: Option<String>,
    },

    /// Fetch one page of comments
    Comments {
        id: String,

        /// Continuation token from a previous page
        #[arg(long)]
        continuation: Option<String>,
    },

    /// Show a channel and its videos
    Channel {
        id: String,

        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Sort order (newest, oldest, popular)
        #[arg(short, long, default_value = "newest")]
        sort: String,
    },

    /// Show endpoint health and cache statistics
    Instances,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env()?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    let portal = Portal::new(config)?;

    match cli.command {
        Commands::Resolve { ids } => {
            tracing::info!(count = ids.len(), "Starting resolve command");
            commands::resolve(&portal, ids).await?;
        }

        Commands::Info { id } => {
            tracing::info!(id = %id, "Starting info command");
            commands::info(&portal, &id).await?;
        }

        Commands::Search { query, page } => {
            tracing::info!(query = %query, page = %page, "Starting search command");
            commands::search(&portal, &query, page).await?;
        }

        Commands::Trending { region } => {
            tracing::info!(region = ?region, "Starting trending command");
            commands::trending(&portal, region.as_deref()).await?;
        }

        Commands::Comments { id, continuation } => {
            tracing::info!(id = %id, continuation = ?continuation, "Starting comments command");
            commands::comments(&portal, &id, continuation.as_deref()).await?;
        }

        Commands::Channel { id, page, sort } => {
            tracing::info!(id = %id, page = %page, sort = %sort, "Starting channel command");
            commands::channel(&portal, &id, page, &sort).await?;
        }

        Commands::Instances => {
            commands::instances(&portal).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("vidrelay=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("vidrelay={level},warn"))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vidrelay=info,warn"))
    };

    // stdout carries the JSON results
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
