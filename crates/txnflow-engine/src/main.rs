//! txnflow - batch ingestion and aggregation jobs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use txnflow_common::logging::{init_logging, LogConfig, LogLevel};

use txnflow_engine::{
    aggregate::{AggregationEngine, PgAggregationStore},
    config::Config,
    db,
    ingest::{IngestOrchestrator, PgTransactionGateway},
    storage::{ObjectStore, Storage},
};

#[derive(Parser)]
#[command(name = "txnflow")]
#[command(about = "Transaction file ingestion and aggregation jobs", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Do not apply pending database migrations at start-up
    #[arg(long, global = true)]
    skip_migrations: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every file currently in the source bucket
    Ingest {
        /// Rows per batch (overrides INGEST_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Run the retry sweep and every active aggregation configuration once
    Aggregate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("txnflow")
        .filter_directives("txnflow_engine=debug,sqlx=warn,aws_config=warn,aws_smithy_runtime=warn")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    let mut config = Config::load()?;
    if let Commands::Ingest {
        batch_size: Some(batch_size),
    } = cli.command
    {
        config.ingest.batch_size = batch_size;
        config.validate()?;
    }

    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    if cli.skip_migrations {
        info!("Skipping database migrations");
    } else {
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        info!("Database migrations completed");
    }

    let storage: Arc<dyn ObjectStore> = Arc::new(Storage::new(config.storage.clone()).await?);

    match cli.command {
        Commands::Ingest { .. } => {
            let gateway = Arc::new(PgTransactionGateway::new(pool.clone()));
            let summary = IngestOrchestrator::new(config.ingest.clone(), storage.clone(), gateway)
                .run()
                .await;
            info!(
                files = summary.files_seen,
                succeeded = summary.files_succeeded,
                failed = summary.files_failed,
                rows = summary.rows_read,
                transactions = summary.transactions_saved,
                "Ingestion complete"
            );
        },
        Commands::Aggregate => {
            let store = Arc::new(PgAggregationStore::new(pool.clone()));
            let summary = AggregationEngine::new(
                store,
                storage.clone(),
                config.aggregation.upload_bucket.clone(),
            )
            .run()
            .await;
            info!(
                configurations = summary.configurations_seen,
                succeeded = summary.configurations_succeeded,
                without_data = summary.configurations_without_data,
                failed = summary.configurations_failed,
                retried = summary.files_retried,
                recovered = summary.files_recovered,
                "Aggregation complete"
            );
        },
    }

    storage.close().await?;
    pool.close().await;

    Ok(())
}
