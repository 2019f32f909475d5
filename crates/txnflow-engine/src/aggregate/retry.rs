//! Retry sweep for files that never reached object storage

use super::delivery::Delivery;
use super::store::AggregationStore;
use tracing::{error, info, warn};
use txnflow_common::metrics::{self, ErrorCode, Tag};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub recovered: usize,
}

pub struct RetrySweeper {
    delivery: Delivery,
}

impl RetrySweeper {
    pub fn new(delivery: Delivery) -> Self {
        Self { delivery }
    }

    /// Re-deliver every pending file. One file failing does not stop the others.
    pub async fn sweep(&self, store: &dyn AggregationStore) -> SweepReport {
        let mut report = SweepReport::default();

        let pending = match store.pending_uploads().await {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "Cannot load files pending upload");
                metrics::increment_error(ErrorCode::RetryFileUploadProcessExecutionError, &[]);
                return report;
            },
        };

        if pending.is_empty() {
            return report;
        }

        info!(count = pending.len(), "Retrying pending uploads");

        for file in &pending {
            report.attempted += 1;
            if self.delivery.deliver(store, file).await {
                report.recovered += 1;
            } else {
                warn!(file = %file.name, "Retry upload failed");
                metrics::increment_error(
                    ErrorCode::RetryFileUploadError,
                    &[(Tag::FileName, file.name.as_str())],
                );
            }
        }

        report
    }
}
