//! Shared fixtures for integration tests
//!
//! Each test starts its own PostgreSQL 16 container with migrations applied.
//! Object storage is the in-memory store, so no MinIO container is needed.

#![allow(dead_code)]

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

pub const SOURCE_BUCKET: &str = "txnflow-inbound";
pub const ARCHIVE_BUCKET: &str = "txnflow-archive";
pub const UPLOAD_BUCKET: &str = "txnflow-extracts";

pub const RETAIL_HEADER: &str = "SOURCE_REFERENCE_TRANSACTION_ID|SOURCE_REFERENCE_LINE_ID|BUSINESS_DATE|TRANSACTION_LINE_TYPE|RINGING_STORE|LINE_ITEM_AMOUNT";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,txnflow_engine=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// PostgreSQL container with migrations applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("postgresql://postgres:postgres@{}:{}/postgres", host, port))
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }
}

/// A retail source file; each row is `txn|line|business_date|line_type|store|amount`.
pub fn retail_file(rows: &[&str]) -> String {
    let mut content = String::from(RETAIL_HEADER);
    for row in rows {
        content.push('\n');
        content.push_str(row);
    }
    content.push('\n');
    content
}

pub async fn count(pool: &PgPool, table: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn line_ids_of(pool: &PgPool, transaction_key: &str) -> Result<Vec<String>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT l.source_reference_line_id
        FROM transaction_line l
        JOIN transaction t ON t.transaction_id = l.transaction_id
        WHERE t.source_reference_transaction_id = $1
        ORDER BY l.source_reference_line_id
        "#,
    )
    .bind(transaction_key)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Unclaimed retail lines, one aggregated row per business date.
pub const RETAIL_AGGREGATION_QUERY: &str = r#"
SELECT string_agg(l.transaction_line_id::text, ',' ORDER BY l.transaction_line_id) AS transaction_line_ids,
       gen_random_uuid()::text AS aggregation_id,
       'RETAIL' AS data_source,
       SUM(r.line_item_amount) AS amount,
       to_char(t.business_date, 'YYYY/MM/DD') AS "BusinessDate"
FROM transaction t
JOIN transaction_line l ON l.transaction_id = t.transaction_id
JOIN retail_transaction_line r ON r.transaction_line_id = l.transaction_line_id
WHERE NOT EXISTS (
    SELECT 1 FROM transaction_aggregation_relation a
    WHERE a.transaction_line_id = l.transaction_line_id
)
GROUP BY t.business_date
ORDER BY t.business_date
"#;

/// Total amount over the same unclaimed lines.
pub const RETAIL_CONTROL_QUERY: &str = r#"
SELECT SUM(r.line_item_amount)::text
FROM transaction_line l
JOIN retail_transaction_line r ON r.transaction_line_id = l.transaction_line_id
WHERE NOT EXISTS (
    SELECT 1 FROM transaction_aggregation_relation a
    WHERE a.transaction_line_id = l.transaction_line_id
)
"#;

pub async fn insert_configuration(
    pool: &PgPool,
    prefix: &str,
    aggregation_query: &str,
    control_query: Option<&str>,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO aggregation_configuration (
            file_name_prefix, file_delimiter, is_data_quotes_surrounded,
            aggregation_query, data_control_query, start_date
        )
        VALUES ($1, '|', FALSE, $2, $3, CURRENT_DATE - 7)
        RETURNING aggregation_configuration_id
        "#,
    )
    .bind(prefix)
    .bind(aggregation_query)
    .bind(control_query)
    .fetch_one(pool)
    .await?;
    Ok(id)
}
