use anyhow::Result;
use clap::{Parser, Subcommand};
use hmerge_storage::{HotelFilter, HotelStore};
use hmerge_sync::{open_store, SyncConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "hmerge-cli")]
#[command(about = "Hotel feed merge command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch every enabled supplier feed, ingest and merge.
    Sync,
    /// Create the SQLite schema.
    Migrate,
    /// Print merged hotels as JSON.
    Hotels {
        /// Comma-separated hotel ids.
        #[arg(long, value_delimiter = ',')]
        hotels: Vec<String>,
        #[arg(long)]
        destination: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = hmerge_sync::run_sync_once_from_env().await?;
            println!(
                "sync complete: run_id={} probed={} ingested={} records={} hotels={}",
                summary.run_id,
                summary.probed_sources,
                summary.ingested_sources.join(","),
                summary.attribute_records,
                summary.merged_hotels
            );
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            open_store(&config).await?;
            tracing::info!(database_url = %config.database_url, "schema applied");
        }
        Commands::Hotels {
            hotels,
            destination,
        } => {
            let store = open_store(&SyncConfig::from_env()).await?;
            let filter = HotelFilter {
                ids: hotels.into_iter().filter(|id| !id.is_empty()).collect(),
                destination_id: destination,
            };
            let found = store.list_hotels(&filter).await?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
    }

    Ok(())
}
