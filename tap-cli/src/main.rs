//! Tap game command line interface
//!
//! Usage:
//!   tap start         - Start the API server
//!   tap status        - Query a running server's health
//!   tap rank          - Print the leaderboard from a data directory

use clap::{Parser, Subcommand};
use tap_api::{run_server, ServerConfig};
use tap_db::{open_store, OperationTimeout, RankingService, StoreConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "tap")]
#[command(about = "Tap game backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server (settings come from the environment)
    Start {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// sled data directory, or mem:// for an in-memory store
        #[arg(short, long)]
        data_dir: Option<String>,
    },

    /// Show server status
    Status {
        /// API server URL
        #[arg(short, long, default_value = "http://localhost:3000")]
        api_url: String,
    },

    /// Print the leaderboard straight from the store
    Rank {
        /// Number of entries
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// sled data directory
        #[arg(short, long, env = "DATA_DIR", default_value = "./tap_data")]
        data_dir: String,
    },
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = Cli::parse();

    if let Err(e) = run_command(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize logging with tracing
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tap_cli=info,tap_api=info,tap_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run_command(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Start {
            host,
            port,
            data_dir,
        } => {
            let mut config = ServerConfig::try_from_env()?;
            if let Some(host) = host {
                config.bind_addr = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }

            tracing::info!(address = %config.bind_address(), "Starting tap API server");
            run_server(config).await
        }

        Commands::Status { api_url } => {
            println!("Checking server status at {}...", api_url);

            let response = reqwest::Client::new()
                .get(format!("{}/health", api_url.trim_end_matches('/')))
                .send()
                .await?
                .json::<serde_json::Value>()
                .await?;

            println!("Status: {}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }

        Commands::Rank { limit, data_dir } => {
            let store = open_store(&StoreConfig::with_data_dir(data_dir))?;
            let ranking = RankingService::new(store, OperationTimeout::default());
            let entries = ranking
                .top(RankingService::normalize_limit(Some(limit)))
                .await?;

            if entries.is_empty() {
                println!("No players yet.");
                return Ok(());
            }

            println!("{:>5}  {:<24}  {:>14}  {:>10}", "RANK", "PLAYER", "TOTAL EARNED", "TAPS");
            for entry in entries {
                let name = entry
                    .display_name
                    .unwrap_or_else(|| entry.platform_id.clone());
                println!(
                    "{:>5}  {:<24}  {:>14}  {:>10}",
                    entry.rank, name, entry.total_earned, entry.total_taps
                );
            }
            Ok(())
        }
    }
}
