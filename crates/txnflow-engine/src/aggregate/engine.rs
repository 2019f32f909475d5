//! Aggregation engine

use super::{
    control,
    delivery::Delivery,
    extract::{self, ExtractFormat},
    models::{AggregationConfiguration, NewExtract, NewGeneratedFile},
    relation::parse_claims,
    retry::RetrySweeper,
    store::AggregationStore,
    AggregationError,
};
use crate::storage::ObjectStore;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use txnflow_common::metrics::{self, status, ErrorCode, Metric, Tag};

/// Totals for one engine invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationSummary {
    pub configurations_seen: usize,
    pub configurations_succeeded: usize,
    pub configurations_without_data: usize,
    pub configurations_failed: usize,
    pub files_retried: usize,
    pub files_recovered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigurationOutcome {
    NoData,
    Generated { data_uploaded: bool },
}

pub struct AggregationEngine {
    store: Arc<dyn AggregationStore>,
    delivery: Delivery,
}

impl AggregationEngine {
    pub fn new(
        store: Arc<dyn AggregationStore>,
        storage: Arc<dyn ObjectStore>,
        upload_bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            delivery: Delivery::new(storage, upload_bucket),
        }
    }

    pub async fn run(&self) -> AggregationSummary {
        self.run_at(Local::now().naive_local()).await
    }

    /// One invocation as of `now`, which dates file names and selects active
    /// configurations.
    pub async fn run_at(&self, now: NaiveDateTime) -> AggregationSummary {
        let started = Instant::now();
        let mut summary = AggregationSummary::default();

        let sweep = RetrySweeper::new(self.delivery.clone())
            .sweep(self.store.as_ref())
            .await;
        summary.files_retried = sweep.attempted;
        summary.files_recovered = sweep.recovered;

        let today = now.date();
        let configurations = match self.store.active_configurations(today).await {
            Ok(configurations) => configurations,
            Err(e) => {
                error!(error = %e, "Cannot load aggregation configurations");
                metrics::increment_error(ErrorCode::JobExecutionError, &[]);
                metrics::record_time(Metric::JobExecutionTime, started.elapsed(), &[]);
                return summary;
            },
        };

        let active: Vec<_> = configurations
            .into_iter()
            .filter(|c| c.is_active_on(today))
            .collect();
        metrics::count(Metric::ConfigurationCount, active.len() as u64, &[]);
        info!(configurations = active.len(), "Starting aggregation run");

        for config in &active {
            summary.configurations_seen += 1;
            let prefix = config.file_name_prefix.as_str();

            let result = self.process(config, now).await;
            metrics::increment(
                Metric::ConfigurationStatus,
                &[(Tag::FileNamePrefix, prefix), (Tag::Status, status(result.is_ok()))],
            );

            match result {
                Ok(ConfigurationOutcome::NoData) => {
                    summary.configurations_without_data += 1;
                    info!(prefix = %prefix, "No data to aggregate");
                },
                Ok(ConfigurationOutcome::Generated { data_uploaded }) => {
                    summary.configurations_succeeded += 1;
                    if !data_uploaded {
                        warn!(prefix = %prefix, "Extract generated but not uploaded yet");
                    }
                },
                Err(e) => {
                    summary.configurations_failed += 1;
                    error!(
                        prefix = %prefix,
                        retryable = txnflow_common::Classify::is_retryable(&e),
                        error = %e,
                        "Aggregation failed for configuration"
                    );
                },
            }
        }

        metrics::record_time(Metric::JobExecutionTime, started.elapsed(), &[]);
        info!(?summary, "Aggregation run finished");

        summary
    }

    async fn process(
        &self,
        config: &AggregationConfiguration,
        now: NaiveDateTime,
    ) -> Result<ConfigurationOutcome, AggregationError> {
        let prefix = config.file_name_prefix.as_str();
        let tags = [(Tag::FileNamePrefix, prefix)];

        let format = ExtractFormat {
            delimiter: config.delimiter()?,
            quote_all: config.quote_all,
        };

        let started = Instant::now();
        let result = self
            .store
            .run_aggregation_query(&config.aggregation_query)
            .await
            .map_err(|e| {
                metrics::increment_error(ErrorCode::QueryExecutionError, &tags);
                e
            })?;
        metrics::record_time(Metric::QueryExecutionTime, started.elapsed(), &tags);
        metrics::count(Metric::AggregationRowCount, result.data_row_count() as u64, &tags);

        if result.is_empty() {
            return Ok(ConfigurationOutcome::NoData);
        }

        // Everything that can be rejected without touching the store happens first
        let data_name = extract::data_file_name(prefix, now);
        let data_content = extract::render_extract(&result, format).map_err(|e| {
            metrics::increment_error(ErrorCode::CsvGenerationError, &tags);
            e
        })?;
        let claims = parse_claims(&result.rows)?;

        let control = match control::reconcile(self.store.as_ref(), config).await? {
            Some(total) => Some(NewGeneratedFile {
                configuration_id: config.id,
                name: extract::control_file_name(prefix, now),
                content: extract::render_control(
                    &data_name,
                    &total,
                    result.data_row_count(),
                    format,
                )?,
            }),
            None => None,
        };
        let has_control = control.is_some();
        let claim_count = claims.len();

        // Claims and both files commit together; uploads start only afterwards
        let started = Instant::now();
        let saved = self
            .store
            .save_extract(NewExtract {
                control,
                relations: claims,
                data: NewGeneratedFile {
                    configuration_id: config.id,
                    name: data_name,
                    content: data_content,
                },
            })
            .await
            .map_err(|e| {
                metrics::increment_error(ErrorCode::DbSaveError, &tags);
                e
            })?;
        metrics::record_time(Metric::DbSaveTime, started.elapsed(), &tags);
        if has_control {
            metrics::record_time(Metric::ControlFileDbSaveTime, started.elapsed(), &tags);
        }

        if saved.claimed < claim_count as u64 {
            warn!(
                prefix = %prefix,
                claims = claim_count,
                new = saved.claimed,
                "Some lines were already claimed by the same aggregation id"
            );
        }

        if let Some(control_file) = &saved.control {
            metrics::increment(Metric::ControlFileGeneratedCount, &tags);
            self.delivery.deliver(self.store.as_ref(), control_file).await;
        }

        metrics::increment(Metric::FileGeneratedCount, &tags);
        info!(
            prefix = %prefix,
            file = %saved.data.name,
            rows = result.data_row_count(),
            claims = claim_count,
            "Extract generated"
        );

        let data_uploaded = self.delivery.deliver(self.store.as_ref(), &saved.data).await;

        Ok(ConfigurationOutcome::Generated { data_uploaded })
    }
}
