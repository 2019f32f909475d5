use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationJobConfig {
    /// Bucket generated extract and control files are uploaded to
    pub upload_bucket: String,
}

impl Default for AggregationJobConfig {
    fn default() -> Self {
        Self {
            upload_bucket: "txnflow-extracts".to_string(),
        }
    }
}

impl AggregationJobConfig {
    pub fn from_env() -> Self {
        Self {
            upload_bucket: env::var("AGGREGATION_UPLOAD_BUCKET")
                .unwrap_or_else(|_| Self::default().upload_bucket),
        }
    }
}
