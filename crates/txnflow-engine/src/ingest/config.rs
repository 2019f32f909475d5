use super::models::SourceRef;
use crate::db::env_or;
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_BATCH_SIZE: usize = 30_000;
pub const DEFAULT_SOURCE_SYSTEM: &str = "ertm";
pub const DEFAULT_SOURCE_TYPE: &str = "retail";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Bucket polled for source files
    pub source_bucket: String,
    /// Bucket fully ingested files are moved to
    pub archive_bucket: String,
    /// Rows buffered before a batch is split and saved
    pub batch_size: usize,
    pub source_system: String,
    pub source_type: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_bucket: "txnflow-inbound".to_string(),
            archive_bucket: "txnflow-archive".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            source_system: DEFAULT_SOURCE_SYSTEM.to_string(),
            source_type: DEFAULT_SOURCE_TYPE.to_string(),
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> txnflow_common::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            source_bucket: env::var("INGEST_SOURCE_BUCKET").unwrap_or(defaults.source_bucket),
            archive_bucket: env::var("INGEST_ARCHIVE_BUCKET").unwrap_or(defaults.archive_bucket),
            batch_size: env_or("INGEST_BATCH_SIZE", defaults.batch_size)?,
            source_system: env::var("INGEST_SOURCE_SYSTEM").unwrap_or(defaults.source_system),
            source_type: env::var("INGEST_SOURCE_TYPE").unwrap_or(defaults.source_type),
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef::new(&self.source_system, &self.source_type)
    }
}
