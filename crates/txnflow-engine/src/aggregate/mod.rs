//! Aggregation and reconciliation
//!
//! Each active configuration supplies an aggregation query over the canonical
//! store and, optionally, a control query. One engine invocation:
//!
//! 1. retries delivery of files persisted earlier but never uploaded;
//! 2. per configuration, runs the aggregation query, reconciles it against the
//!    control total, claims every aggregated line and delivers the extract.
//!
//! Claims, the control file and the data file are committed in one database
//! transaction before anything is uploaded. A file that fails to upload is
//! only ever re-sent by the retry sweep, never re-aggregated, and a failed
//! commit leaves every line unclaimed for the next run.

use crate::db::DbError;
use thiserror::Error;
use txnflow_common::{Classify, ErrorClass};

pub mod config;
pub mod control;
pub mod delivery;
pub mod engine;
pub mod extract;
pub mod models;
pub mod relation;
pub mod retry;
pub mod store;

pub use config::AggregationJobConfig;
pub use engine::{AggregationEngine, AggregationSummary};
pub use store::{AggregationStore, PgAggregationStore};

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error(transparent)]
    Database(#[from] DbError),

    /// Aggregated data exists but the control query produced nothing
    #[error("Control data is empty for configuration '{prefix}'")]
    ControlDataMissing { prefix: String },

    #[error("Extract generation failed: {0}")]
    Extract(#[from] csv::Error),

    /// A row's line-key list or aggregation id could not be parsed
    #[error("Invalid claim in aggregated row {row}: {message}")]
    InvalidClaim { row: usize, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl Classify for AggregationError {
    fn class(&self) -> ErrorClass {
        match self {
            AggregationError::Database(err) => err.class(),
            _ => ErrorClass::NonRetryable,
        }
    }
}
