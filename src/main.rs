use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scoutei_backend::{api, cli, config::Config, db};

#[derive(Parser)]
#[command(name = "scoutei")]
#[command(about = "Football betting-insight backend: fixtures, statistics, odds and AI analyses")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Overrides PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Initialize the database
    InitDb,
    /// Warm the fixture cache for a date and list playable matches
    Fixtures {
        /// YYYY-MM-DD, defaults to today (UTC)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Clear every cached fixture listing
    ResetFixtures,
    /// Show cached analyses for a match
    Predictions {
        #[arg(short, long)]
        match_id: i64,
    },
    /// Drop cached analyses for a match so they are regenerated
    Invalidate {
        #[arg(short, long)]
        match_id: i64,
        /// Only this analysis type
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                config.port = port;
            }
            tracing::info!("Starting Scoutei API server on port {}", config.port);
            api::serve(config).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            let pool = db::create_pool(&config.database_url).await?;
            db::init_database_with_pool(&pool).await?;
        }
        Some(Commands::Fixtures { date }) => {
            cli::warm_fixtures(config, date).await?;
        }
        Some(Commands::ResetFixtures) => {
            cli::reset_fixtures(&config).await?;
        }
        Some(Commands::Predictions { match_id }) => {
            cli::show_predictions(&config, match_id).await?;
        }
        Some(Commands::Invalidate { match_id, kind }) => {
            cli::invalidate(&config, match_id, kind.as_deref()).await?;
        }
        None => {
            // Default to serving
            tracing::info!("Starting Scoutei API server on port {}", config.port);
            api::serve(config).await?;
        }
    }

    Ok(())
}
