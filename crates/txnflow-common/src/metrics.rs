//! Metric emission
//!
//! Counters and timers are emitted as `tracing` events on the
//! [`METRICS_TARGET`] target, one event per observation. A subscriber (or a
//! log pipeline filtering on the target) turns them into time series.
//!
//! ```no_run
//! use std::time::Instant;
//! use txnflow_common::metrics::{self, ErrorCode, Metric, Tag};
//!
//! let started = Instant::now();
//! metrics::record_time(Metric::QueryExecutionTime, started.elapsed(), &[]);
//! metrics::increment_error(ErrorCode::S3UploadError, &[(Tag::FileName, "CASH_2025_10_10.csv")]);
//! ```

use std::fmt::Write as _;
use std::time::Duration;

/// Target every metric event is emitted on
pub const METRICS_TARGET: &str = "txnflow::metrics";

/// Metric names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    // Aggregation job
    JobExecutionTime,
    ConfigurationCount,
    ConfigurationStatus,
    AggregationRowCount,
    QueryExecutionTime,
    ControlQueryExecutionTime,
    S3UploadStatus,
    S3UploadTime,
    DbSaveTime,
    ControlFileDbSaveTime,
    FileGeneratedCount,
    ControlFileGeneratedCount,

    // File ingestion
    SaveTransactionCount,
    SaveTransactionTime,
    DuplicateTransactionCount,
    BucketProcessingTime,
    FileProcessingTime,
    BatchProcessingTime,
    BatchProcessingCount,

    /// Every error counter shares one name and is split by the `error_code` tag
    ErrorCount,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::JobExecutionTime => "job.executionTime",
            Metric::ConfigurationCount => "configuration.count",
            Metric::ConfigurationStatus => "configuration.status",
            Metric::AggregationRowCount => "aggregation.row.count",
            Metric::QueryExecutionTime => "query.executionTime",
            Metric::ControlQueryExecutionTime => "control.query.executionTime",
            Metric::S3UploadStatus => "s3.upload.status",
            Metric::S3UploadTime => "s3.upload.executionTime",
            Metric::DbSaveTime => "db.save.executionTime",
            Metric::ControlFileDbSaveTime => "control.file.db.save.executionTime",
            Metric::FileGeneratedCount => "file.generated.count",
            Metric::ControlFileGeneratedCount => "control.file.generated.count",
            Metric::SaveTransactionCount => "database.saveTransaction.count",
            Metric::SaveTransactionTime => "database.saveTransaction.executionTime",
            Metric::DuplicateTransactionCount => "transaction.duplicate.count",
            Metric::BucketProcessingTime => "bucket.processing.executionTime",
            Metric::FileProcessingTime => "file.processing.executionTime",
            Metric::BatchProcessingTime => "batch.processing.executionTime",
            Metric::BatchProcessingCount => "batch.processing.count",
            Metric::ErrorCount => "error.count",
        }
    }
}

/// Error codes carried by [`Metric::ErrorCount`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    QueryExecutionError,
    S3UploadError,
    CsvGenerationError,
    DbSaveError,
    DbConnectionError,
    JobExecutionError,
    DataControlCannotBeEmpty,
    RetryFileUploadProcessExecutionError,
    RetryFileUploadError,
    S3FileReadError,
    S3ConnectionError,
    S3FileMoveError,
    EntityMappingError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::QueryExecutionError => "QueryExecutionError",
            ErrorCode::S3UploadError => "S3UploadError",
            ErrorCode::CsvGenerationError => "CSVGenerationError",
            ErrorCode::DbSaveError => "DbSaveError",
            ErrorCode::DbConnectionError => "DbConnectionError",
            ErrorCode::JobExecutionError => "JobExecutionError",
            ErrorCode::DataControlCannotBeEmpty => "DataControlCannotBeEmpty",
            ErrorCode::RetryFileUploadProcessExecutionError => {
                "retryFileUploadProcessExecutionError"
            },
            ErrorCode::RetryFileUploadError => "retryFileUploadError",
            ErrorCode::S3FileReadError => "S3FileReadError",
            ErrorCode::S3ConnectionError => "S3ConnectionError",
            ErrorCode::S3FileMoveError => "S3FileMoveError",
            ErrorCode::EntityMappingError => "EntityMappingError",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    FileName,
    FileNamePrefix,
    BucketName,
    Status,
    BatchNumber,
    RecordsCount,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::FileName => "file_name",
            Tag::FileNamePrefix => "file_name_prefix",
            Tag::BucketName => "bucket_name",
            Tag::Status => "status",
            Tag::BatchNumber => "batch_number",
            Tag::RecordsCount => "records_count",
        }
    }
}

/// Outcome value for [`Tag::Status`]
pub fn status(success: bool) -> &'static str {
    if success {
        "Success"
    } else {
        "Failure"
    }
}

/// Add `value` to a counter.
pub fn count(metric: Metric, value: u64, tags: &[(Tag, &str)]) {
    tracing::info!(
        target: METRICS_TARGET,
        metric = metric.as_str(),
        kind = "counter",
        value,
        tags = %render_tags(tags),
        "metric"
    );
}

/// Add one to a counter.
pub fn increment(metric: Metric, tags: &[(Tag, &str)]) {
    count(metric, 1, tags);
}

/// Record an elapsed duration, in milliseconds.
pub fn record_time(metric: Metric, elapsed: Duration, tags: &[(Tag, &str)]) {
    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        target: METRICS_TARGET,
        metric = metric.as_str(),
        kind = "timer",
        value = millis,
        tags = %render_tags(tags),
        "metric"
    );
}

/// Add one to the error counter for `code`.
pub fn increment_error(code: ErrorCode, tags: &[(Tag, &str)]) {
    tracing::info!(
        target: METRICS_TARGET,
        metric = Metric::ErrorCount.as_str(),
        kind = "counter",
        value = 1u64,
        error_code = code.as_str(),
        tags = %render_tags(tags),
        "metric"
    );
}

fn render_tags(tags: &[(Tag, &str)]) -> String {
    let mut rendered = String::new();
    for (i, (tag, value)) in tags.iter().enumerate() {
        if i > 0 {
            rendered.push(',');
        }
        let _ = write!(rendered, "{}={}", tag.as_str(), value);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_match_dashboards() {
        assert_eq!(Metric::S3UploadTime.as_str(), "s3.upload.executionTime");
        assert_eq!(Metric::DuplicateTransactionCount.as_str(), "transaction.duplicate.count");
        assert_eq!(ErrorCode::CsvGenerationError.as_str(), "CSVGenerationError");
        assert_eq!(ErrorCode::RetryFileUploadError.to_string(), "retryFileUploadError");
    }

    #[test]
    fn test_render_tags() {
        assert_eq!(render_tags(&[]), "");
        assert_eq!(
            render_tags(&[(Tag::FileNamePrefix, "CASH"), (Tag::Status, status(false))]),
            "file_name_prefix=CASH,status=Failure"
        );
    }
}
