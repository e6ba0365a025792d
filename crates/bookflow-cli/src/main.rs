use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::{Context, Result};
use bookflow_catalog::CatalogClient;
use bookflow_storage::{BookStore, MemoryBookStore, PgBookStore};
use bookflow_sync::{build_scheduler, normalize, PipelineConfig, SyncPipeline};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "bookflow")]
#[command(about = "Fetch catalog books and upsert them into the book table")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the pipeline once.
    Run {
        /// Persist into an in-memory table instead of postgres.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the pipeline on the configured cron until interrupted.
    Schedule {
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch and normalize, printing the books as JSON without persisting.
    Fetch {
        #[arg(long)]
        count: Option<NonZeroUsize>,
    },
    /// Create the book table and its indexes.
    Bootstrap {
        /// Drop an existing book table first.
        #[arg(long)]
        reset: bool,
    },
}

fn build_pipeline(config: PipelineConfig, dry_run: bool) -> Result<SyncPipeline> {
    let pipeline = SyncPipeline::new(config)?;
    Ok(if dry_run {
        pipeline.with_connector(Box::new(MemoryBookStore::new()))
    } else {
        pipeline
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env()?;

    match cli.command.unwrap_or(Commands::Run { dry_run: false }) {
        Commands::Run { dry_run } => {
            let summary = build_pipeline(config, dry_run)?.run_once().await?;
            println!(
                "sync complete: run_id={} fetched={} degraded={} normalized={} upserted={} failed={} table_rows={}",
                summary.run_id,
                summary.fetched,
                summary
                    .degraded
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "no".to_string()),
                summary.normalized,
                summary.persisted.inserted_or_updated,
                summary.persisted.failed,
                summary
                    .table_rows
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            );
        }
        Commands::Schedule { dry_run } => {
            let cron = config.sync_cron.clone();
            let pipeline = Arc::new(build_pipeline(config, dry_run)?);
            let mut sched = build_scheduler(pipeline).await?;
            sched.start().await.context("starting scheduler")?;
            info!(%cron, "scheduler started; waiting for ctrl-c");
            tokio::signal::ctrl_c()
                .await
                .context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
        Commands::Fetch { count } => {
            let count = count.unwrap_or(config.book_count);
            let client = CatalogClient::new(config.catalog_config())?;
            let books = normalize(client.fetch(count).await, count);
            println!(
                "{}",
                serde_json::to_string_pretty(&books).context("serializing books")?
            );
        }
        Commands::Bootstrap { reset } => {
            let mut store = PgBookStore::connect(&config.database_url).await?;
            store
                .bootstrap(reset)
                .await
                .context("creating book table")?;
            info!(reset, "book table ready");
        }
    }

    Ok(())
}
