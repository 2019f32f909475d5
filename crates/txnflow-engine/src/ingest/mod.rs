//! Batch file ingestion
//!
//! Files in the source bucket are streamed row by row, buffered into batches,
//! split on transaction boundaries, filtered against what is already stored,
//! assembled into canonical transactions and saved one batch per database
//! transaction. A fully ingested file is moved to the archive bucket.
//!
//! ```text
//! row_source -> splitter -> dedup -> assembler -> gateway -> archive
//! ```

use crate::db::DbError;
use thiserror::Error;
use txnflow_common::metrics::ErrorCode;
use txnflow_common::{Classify, ErrorClass};

pub mod assembler;
pub mod config;
pub mod dedup;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod row_source;
pub mod splitter;

pub use config::IngestConfig;
pub use gateway::{PgTransactionGateway, SaveOutcome, TransactionGateway};
pub use models::{CanonicalLine, CanonicalTransaction, RawRow, SourceRef};
pub use orchestrator::{IngestOrchestrator, IngestSummary};

#[derive(Error, Debug)]
pub enum IngestError {
    /// A source record could not be read or typed. The whole file is rejected.
    #[error("Record {record}: {message}")]
    Mapping { record: u64, message: String },

    #[error(transparent)]
    Database(#[from] DbError),

    /// The source object could not be fetched
    #[error("Source object unavailable: {0:#}")]
    Storage(anyhow::Error),
}

impl IngestError {
    pub fn mapping(record: u64, message: impl Into<String>) -> Self {
        Self::Mapping {
            record,
            message: message.into(),
        }
    }

    /// Error counter a failed file is reported under
    pub fn error_code(&self) -> ErrorCode {
        match self {
            IngestError::Mapping { .. } => ErrorCode::EntityMappingError,
            IngestError::Database(_) => ErrorCode::DbConnectionError,
            IngestError::Storage(_) => ErrorCode::S3FileReadError,
        }
    }
}

impl Classify for IngestError {
    fn class(&self) -> ErrorClass {
        match self {
            IngestError::Mapping { .. } => ErrorClass::NonRetryable,
            IngestError::Database(err) => err.class(),
            IngestError::Storage(_) => ErrorClass::Retryable,
        }
    }
}
