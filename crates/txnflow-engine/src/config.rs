//! Configuration management
//!
//! Every section reads its own environment variables; [`Config::load`] reads
//! `.env` first, then assembles and validates the sections.

use crate::aggregate::AggregationJobConfig;
use crate::db::DbConfig;
use crate::ingest::IngestConfig;
use crate::storage::StorageConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DbConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub aggregation: AggregationJobConfig,
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DbConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            ingest: IngestConfig::from_env()?,
            aggregation: AggregationJobConfig::from_env(),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.ingest.batch_size == 0 {
            anyhow::bail!("INGEST_BATCH_SIZE must be greater than 0");
        }

        for (name, bucket) in [
            ("INGEST_SOURCE_BUCKET", &self.ingest.source_bucket),
            ("INGEST_ARCHIVE_BUCKET", &self.ingest.archive_bucket),
            ("AGGREGATION_UPLOAD_BUCKET", &self.aggregation.upload_bucket),
        ] {
            if bucket.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
        }

        if self.ingest.source_bucket == self.ingest.archive_bucket {
            anyhow::bail!(
                "Source and archive buckets must differ (both are '{}')",
                self.ingest.source_bucket
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            database: DbConfig::default(),
            storage: StorageConfig::default(),
            ingest: IngestConfig::default(),
            aggregation: AggregationJobConfig::default(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let mut config = config();
        config.ingest.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_archive_must_differ_from_source() {
        let mut config = config();
        config.ingest.archive_bucket = config.ingest.source_bucket.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_empty_upload_bucket_is_rejected() {
        let mut config = config();
        config.aggregation.upload_bucket = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_connections_above_max() {
        let mut config = config();
        config.database.min_connections = 50;
        assert!(config.validate().is_err());
    }
}
