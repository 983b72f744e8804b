//! query-collapse CLI entry point

use clap::{Parser, Subcommand};
use query_collapse::{
    commands::{cmd_init, cmd_run, cmd_status, print_run_stats, print_status, RunOptions},
    config::Config,
    error::Result,
    store::{QueryStore, SqliteQueryStore},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "query-collapse")]
#[command(version, about = "Flag typing-burst duplicates in search query logs", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "QUERY_COLLAPSE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the database schema
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Collapse new queries in every dataset (default)
    Run {
        /// Only process this dataset (repeatable)
        #[arg(short, long = "dataset")]
        datasets: Vec<Uuid>,

        /// Report duplicates without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Burst window in seconds
        #[arg(long)]
        window: Option<f64>,

        /// Queries fetched per iteration
        #[arg(long)]
        batch_size: Option<usize>,

        /// Datasets processed in parallel
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Show per-dataset watermarks and row counts
    Status {
        /// Only show this dataset (repeatable)
        #[arg(short, long = "dataset")]
        datasets: Vec<Uuid>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let command = cli.command.unwrap_or(Commands::Run {
        datasets: Vec::new(),
        dry_run: false,
        window: None,
        batch_size: None,
        concurrency: None,
    });

    dispatch(command, cli.config.as_deref(), cli.json).await
}

async fn dispatch(command: Commands, config_path: Option<&Path>, json: bool) -> Result<()> {
    match command {
        // Init doesn't need an existing config
        Commands::Init { force } => {
            let path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::default_config_path);
            let config = cmd_init(&path, force).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Initialized config at {}", path.display());
                println!("Database: {}", config.database.url);
            }
        }

        Commands::Run {
            datasets,
            dry_run,
            window,
            batch_size,
            concurrency,
        } => {
            let options = RunOptions {
                dataset_ids: datasets,
                dry_run,
                time_window_secs: window,
                batch_size,
                concurrency,
            };

            let (config, sqlite) = open_store(config_path).await?;
            let store: Arc<dyn QueryStore> = Arc::new(sqlite.clone());
            let stats = cmd_run(&config, store, options).await;
            sqlite.close().await;
            let stats = stats?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_run_stats(&stats);
            }
        }

        Commands::Status { datasets } => {
            let (config, sqlite) = open_store(config_path).await?;
            let status = cmd_status(&config, &sqlite, &datasets).await;
            sqlite.close().await;
            let status = status?;

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

/// Load configuration and connect to the store it names
async fn open_store(config_path: Option<&Path>) -> Result<(Config, SqliteQueryStore)> {
    let config = Config::load_or_default(config_path)?;
    let store = SqliteQueryStore::connect(&config.database).await?;
    Ok((config, store))
}
