//! Upload of generated files

use super::models::GeneratedFile;
use super::store::AggregationStore;
use crate::storage::ObjectStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use txnflow_common::metrics::{self, status, ErrorCode, Metric, Tag};

/// Uploads persisted files and flips their uploaded flag.
#[derive(Clone)]
pub struct Delivery {
    storage: Arc<dyn ObjectStore>,
    bucket: String,
}

impl Delivery {
    pub fn new(storage: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
        }
    }

    /// Upload `file` and mark it uploaded.
    ///
    /// Returns `false` when either step failed; the file then stays pending
    /// for the retry sweep.
    pub async fn deliver(&self, store: &dyn AggregationStore, file: &GeneratedFile) -> bool {
        let started = Instant::now();
        let uploaded = self
            .storage
            .upload(&self.bucket, &file.name, file.content.clone().into_bytes())
            .await;

        let tags = [(Tag::FileName, file.name.as_str())];
        metrics::record_time(Metric::S3UploadTime, started.elapsed(), &tags);
        metrics::increment(
            Metric::S3UploadStatus,
            &[(Tag::FileName, file.name.as_str()), (Tag::Status, status(uploaded.is_ok()))],
        );

        let result = match uploaded {
            Ok(result) => result,
            Err(e) => {
                error!(
                    file = %file.name,
                    bucket = %self.bucket,
                    error = %format!("{:#}", e),
                    "Upload failed, file left for retry"
                );
                metrics::increment_error(ErrorCode::S3UploadError, &tags);
                return false;
            },
        };

        if let Err(e) = store.mark_uploaded(file.id).await {
            error!(file = %file.name, error = %e, "Uploaded file could not be marked as uploaded");
            metrics::increment_error(ErrorCode::DbSaveError, &tags);
            return false;
        }

        info!(
            file = %file.name,
            bucket = %self.bucket,
            size = result.size,
            checksum = %result.checksum,
            "File delivered"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::models::NewGeneratedFile;
    use crate::aggregate::store::fake::MemoryAggregationStore;
    use crate::storage::memory::MemoryStore;

    fn persisted(store: &MemoryAggregationStore) -> GeneratedFile {
        store.insert_file(NewGeneratedFile {
            configuration_id: 1,
            name: "CASH_2025_10_10_00_00_00.csv".to_string(),
            content: "a|b\r\n".to_string(),
        })
    }

    #[tokio::test]
    async fn test_delivered_file_is_marked() {
        let objects = Arc::new(MemoryStore::new());
        let store = MemoryAggregationStore::default();
        let file = persisted(&store);

        assert!(Delivery::new(objects.clone(), "out").deliver(&store, &file).await);

        assert!(store.files()[0].uploaded);
        assert_eq!(
            objects.get("out", &file.name).await.as_deref(),
            Some(&b"a|b\r\n"[..])
        );
    }

    #[tokio::test]
    async fn test_failed_upload_stays_pending() {
        let objects = Arc::new(MemoryStore::new());
        objects.fail_next_uploads(1);
        let store = MemoryAggregationStore::default();
        let file = persisted(&store);

        assert!(!Delivery::new(objects, "out").deliver(&store, &file).await);
        assert_eq!(store.pending_uploads().await.unwrap().len(), 1);
    }
}
