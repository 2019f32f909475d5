//! Ingestion orchestrator
//!
//! Processes every file of the source bucket once, one file at a time. Each
//! file runs through a small state machine:
//!
//! ```text
//! Streaming --(stream exhausted)--> FlushingFinal --> Done
//!     |                                  |
//!     +-----------> Failed <-------------+
//! ```
//!
//! Batches committed before a failure stay committed. Re-running the file is
//! safe because the duplicate filter skips what is already stored.

use super::{
    assembler::assemble,
    config::IngestConfig,
    dedup::DuplicateFilter,
    gateway::TransactionGateway,
    models::{RawRow, SourceRef},
    row_source,
    splitter::{self, TransactionGroup},
    IngestError,
};
use crate::storage::ObjectStore;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use txnflow_common::metrics::{self, ErrorCode, Metric, Tag};

/// Totals for one pass over the source bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub files_seen: usize,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub rows_read: u64,
    pub transactions_saved: u64,
}

#[derive(Debug, Default)]
struct FileReport {
    rows_read: u64,
    batches: u64,
    transactions_saved: u64,
    lines_saved: u64,
    duplicate_rows: u64,
}

#[derive(Debug)]
enum FileState {
    Streaming,
    FlushingFinal,
    Done,
    Failed(IngestError),
}

pub struct IngestOrchestrator {
    config: IngestConfig,
    source: SourceRef,
    store: Arc<dyn ObjectStore>,
    gateway: Arc<dyn TransactionGateway>,
}

impl IngestOrchestrator {
    pub fn new(
        config: IngestConfig,
        store: Arc<dyn ObjectStore>,
        gateway: Arc<dyn TransactionGateway>,
    ) -> Self {
        let source = config.source_ref();
        Self {
            config,
            source,
            store,
            gateway,
        }
    }

    /// Ingest every file currently in the source bucket.
    ///
    /// File failures are logged and counted, never returned. An unreachable
    /// bucket listing ends the pass early.
    pub async fn run(&self) -> IngestSummary {
        let started = Instant::now();
        let bucket = self.config.source_bucket.as_str();
        let mut summary = IngestSummary::default();

        info!(bucket = %bucket, batch_size = self.config.batch_size, "Starting ingestion pass");

        let keys = match self.store.list(bucket).await {
            Ok(keys) => keys,
            Err(e) => {
                error!(bucket = %bucket, error = %format!("{:#}", e), "Cannot list source bucket");
                metrics::increment_error(ErrorCode::S3ConnectionError, &[(Tag::BucketName, bucket)]);
                return summary;
            },
        };

        for key in keys {
            summary.files_seen += 1;
            let file_started = Instant::now();

            match self.ingest_file(&key).await {
                Ok(report) => {
                    summary.files_succeeded += 1;
                    summary.rows_read += report.rows_read;
                    summary.transactions_saved += report.transactions_saved;
                    info!(
                        file = %key,
                        rows = report.rows_read,
                        batches = report.batches,
                        transactions = report.transactions_saved,
                        lines = report.lines_saved,
                        duplicates = report.duplicate_rows,
                        "File ingested"
                    );
                    self.archive(&key).await;
                },
                Err(e) => {
                    summary.files_failed += 1;
                    error!(
                        file = %key,
                        retryable = txnflow_common::Classify::is_retryable(&e),
                        error = %e,
                        "File ingestion failed, leaving it in place"
                    );
                    metrics::increment_error(e.error_code(), &[(Tag::FileName, &key)]);
                },
            }

            metrics::record_time(
                Metric::FileProcessingTime,
                file_started.elapsed(),
                &[(Tag::FileName, &key)],
            );
        }

        metrics::record_time(
            Metric::BucketProcessingTime,
            started.elapsed(),
            &[(Tag::BucketName, bucket)],
        );

        info!(
            files = summary.files_seen,
            succeeded = summary.files_succeeded,
            failed = summary.files_failed,
            "Ingestion pass finished"
        );

        summary
    }

    async fn ingest_file(&self, key: &str) -> Result<FileReport, IngestError> {
        let reader = self
            .store
            .download(&self.config.source_bucket, key)
            .await
            .map_err(IngestError::Storage)?;
        let mut rows = row_source::rows(reader);

        let batch_size = self.config.batch_size.max(1);
        let mut batch: Vec<RawRow> = Vec::with_capacity(batch_size);
        let mut report = FileReport::default();
        let mut state = FileState::Streaming;

        loop {
            state = match state {
                FileState::Streaming => match rows.next().await {
                    Some(Ok(row)) => {
                        report.rows_read += 1;
                        batch.push(row);
                        if batch.len() >= batch_size {
                            let outcome = splitter::split(std::mem::take(&mut batch), batch_size);
                            if let Some(overflow) = outcome.overflow {
                                debug!(
                                    file = %key,
                                    transaction = %overflow.key,
                                    rows = overflow.rows.len(),
                                    "Carrying transaction into next batch"
                                );
                                batch = overflow.rows;
                            }
                            match self.save_groups(key, outcome.complete, &mut report).await {
                                Ok(()) => FileState::Streaming,
                                Err(e) => FileState::Failed(e),
                            }
                        } else {
                            FileState::Streaming
                        }
                    },
                    Some(Err(e)) => FileState::Failed(e),
                    None => FileState::FlushingFinal,
                },
                FileState::FlushingFinal => {
                    let groups = splitter::flush(std::mem::take(&mut batch));
                    match self.save_groups(key, groups, &mut report).await {
                        Ok(()) => FileState::Done,
                        Err(e) => FileState::Failed(e),
                    }
                },
                FileState::Done => return Ok(report),
                FileState::Failed(e) => return Err(e),
            };
        }
    }

    /// Filter, assemble and save one batch worth of complete groups.
    async fn save_groups(
        &self,
        key: &str,
        groups: Vec<TransactionGroup>,
        report: &mut FileReport,
    ) -> Result<(), IngestError> {
        if groups.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        report.batches += 1;
        let batch_number = report.batches.to_string();

        let filtered = DuplicateFilter::new(self.gateway.as_ref(), &self.source)
            .filter(groups)
            .await?;
        report.duplicate_rows += filtered.duplicate_rows as u64;
        if filtered.duplicate_rows > 0 {
            metrics::count(
                Metric::DuplicateTransactionCount,
                filtered.duplicate_rows as u64,
                &[(Tag::FileName, key)],
            );
        }

        let transactions: Vec<_> = filtered
            .groups
            .into_iter()
            .filter_map(|group| assemble(group, &self.source))
            .collect();

        if !transactions.is_empty() {
            let save_started = Instant::now();
            let saved = self.gateway.save_all(&transactions).await?;
            report.transactions_saved += saved.transactions_inserted;
            report.lines_saved += saved.lines_inserted;

            metrics::count(
                Metric::SaveTransactionCount,
                transactions.len() as u64,
                &[(Tag::FileName, key)],
            );
            metrics::record_time(
                Metric::SaveTransactionTime,
                save_started.elapsed(),
                &[(Tag::FileName, key)],
            );
        }

        let records = transactions.len().to_string();
        let tags = [
            (Tag::FileName, key),
            (Tag::BatchNumber, batch_number.as_str()),
            (Tag::RecordsCount, records.as_str()),
        ];
        metrics::increment(Metric::BatchProcessingCount, &tags);
        metrics::record_time(Metric::BatchProcessingTime, started.elapsed(), &tags);

        Ok(())
    }

    async fn archive(&self, key: &str) {
        if let Err(e) = self
            .store
            .move_object(key, &self.config.source_bucket, &self.config.archive_bucket)
            .await
        {
            warn!(
                file = %key,
                archive = %self.config.archive_bucket,
                error = %format!("{:#}", e),
                "File ingested but could not be archived"
            );
            metrics::increment_error(ErrorCode::S3FileMoveError, &[(Tag::FileName, key)]);
        }
    }
}
