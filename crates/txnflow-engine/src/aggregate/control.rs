//! Control total reconciliation

use super::models::AggregationConfiguration;
use super::store::AggregationStore;
use super::AggregationError;
use std::time::Instant;
use tracing::{error, info};
use txnflow_common::metrics::{self, ErrorCode, Metric, Tag};

/// Run the configuration's control query, if it has one.
///
/// `Ok(None)` means no control query is configured. A control query that
/// returns no row, NULL or blank text is a [`AggregationError::ControlDataMissing`].
pub async fn reconcile(
    store: &dyn AggregationStore,
    config: &AggregationConfiguration,
) -> Result<Option<String>, AggregationError> {
    let Some(query) = config.control_query() else {
        return Ok(None);
    };
    let prefix = config.file_name_prefix.as_str();

    let started = Instant::now();
    let total = store.run_control_query(query).await.map_err(|e| {
        metrics::increment_error(ErrorCode::QueryExecutionError, &[(Tag::FileNamePrefix, prefix)]);
        e
    })?;
    metrics::record_time(
        Metric::ControlQueryExecutionTime,
        started.elapsed(),
        &[(Tag::FileNamePrefix, prefix)],
    );

    match total.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
        Some(total) => {
            info!(prefix = %prefix, total = %total, "Control total computed");
            Ok(Some(total))
        },
        None => {
            error!(prefix = %prefix, "Control query returned no data while aggregated rows exist");
            metrics::increment_error(
                ErrorCode::DataControlCannotBeEmpty,
                &[(Tag::FileNamePrefix, prefix)],
            );
            Err(AggregationError::ControlDataMissing {
                prefix: prefix.to_string(),
            })
        },
    }
}
