//! txnflow Engine Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch ingestion of delimited transaction files into the canonical store, and
//! aggregation of stored transaction lines into reconciled extract files.
//!
//! # Overview
//!
//! - **Ingestion** ([`ingest`]): streams `|`-delimited files from object storage,
//!   splits them into batches that never cut a transaction in half, drops lines
//!   that are already stored, and saves the rest.
//! - **Aggregation** ([`aggregate`]): runs configured aggregation queries, checks
//!   them against a control total, claims every aggregated line, and delivers
//!   the extract plus control file with a retry sweep for failed uploads.
//! - **Storage** ([`storage`]): an explicitly owned object-store client (S3 or
//!   in-memory).
//! - **Database** ([`db`]): pool construction and retryable/non-retryable error
//!   classification.
//!
//! Both pipelines share only the canonical store and run as separate
//! invocations of the `txnflow` binary.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use txnflow_engine::{config::Config, db, ingest, storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     let store = Arc::new(storage::Storage::new(config.storage.clone()).await?);
//!     let gateway = Arc::new(ingest::PgTransactionGateway::new(pool));
//!     let summary = ingest::IngestOrchestrator::new(config.ingest.clone(), store, gateway)
//!         .run()
//!         .await;
//!     tracing::info!(failed = summary.files_failed, "Ingestion finished");
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod db;
pub mod ingest;
pub mod storage;

// Re-export commonly used types
pub use db::{DbError, DbResult};
