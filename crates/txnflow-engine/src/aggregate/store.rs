//! Aggregation bookkeeping in the canonical store

use super::models::{
    AggregatedResult, AggregationConfiguration, AggregationRelation, GeneratedFile, NewExtract,
    NewGeneratedFile, SavedExtract,
};
use crate::db::DbResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{postgres::PgRow, Column, Executor, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[async_trait]
pub trait AggregationStore: Send + Sync {
    /// Configurations whose window contains `day`, in id order.
    async fn active_configurations(&self, day: NaiveDate) -> DbResult<Vec<AggregationConfiguration>>;

    /// Run a configuration's aggregation query as-is.
    async fn run_aggregation_query(&self, query: &str) -> DbResult<AggregatedResult>;

    /// First column of the first row of a control query, `None` when there is
    /// no row or the value is NULL.
    async fn run_control_query(&self, query: &str) -> DbResult<Option<String>>;

    /// Persist the claims and the generated files of one run atomically.
    ///
    /// Files are stored with `uploaded = false`. On error nothing is written.
    async fn save_extract(&self, extract: NewExtract) -> DbResult<SavedExtract>;

    /// Files never confirmed as uploaded, oldest first.
    async fn pending_uploads(&self) -> DbResult<Vec<GeneratedFile>>;

    async fn mark_uploaded(&self, file_id: i64) -> DbResult<()>;
}

pub struct PgAggregationStore {
    db: PgPool,
}

impl PgAggregationStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Every value of a row in text form.
///
/// Free-form queries run over the simple query protocol, so values arrive as
/// text whatever their column type.
fn text_values(row: &PgRow) -> DbResult<Vec<String>> {
    (0..row.len())
        .map(|i| -> DbResult<String> {
            let value: Option<String> = row.try_get_unchecked(i)?;
            Ok(value.unwrap_or_default())
        })
        .collect()
}

async fn insert_file(
    tx: &mut Transaction<'_, Postgres>,
    file: &NewGeneratedFile,
) -> DbResult<GeneratedFile> {
    let saved = sqlx::query_as::<_, GeneratedFile>(
        r#"
        INSERT INTO generated_file_detail (
            aggregation_configuration_id, generated_file_name, file_content, is_uploaded_to_s3
        )
        VALUES ($1, $2, $3, FALSE)
        RETURNING generated_file_detail_id, aggregation_configuration_id,
                  generated_file_name, file_content, is_uploaded_to_s3
        "#,
    )
    .bind(file.configuration_id)
    .bind(&file.name)
    .bind(&file.content)
    .fetch_one(&mut **tx)
    .await?;

    Ok(saved)
}

/// Claims in one statement. Returns how many were new.
async fn insert_relations(
    tx: &mut Transaction<'_, Postgres>,
    relations: &[AggregationRelation],
) -> DbResult<u64> {
    if relations.is_empty() {
        return Ok(0);
    }

    let (aggregation_ids, line_ids): (Vec<Uuid>, Vec<i64>) = relations
        .iter()
        .map(|r| (r.aggregation_id, r.transaction_line_id))
        .unzip();

    let result = sqlx::query(
        r#"
        INSERT INTO transaction_aggregation_relation (aggregation_id, transaction_line_id)
        SELECT * FROM UNNEST($1::uuid[], $2::bigint[])
        ON CONFLICT ON CONSTRAINT uq_aggregation_relation DO NOTHING
        "#,
    )
    .bind(&aggregation_ids)
    .bind(&line_ids)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl AggregationStore for PgAggregationStore {
    async fn active_configurations(&self, day: NaiveDate) -> DbResult<Vec<AggregationConfiguration>> {
        let configurations = sqlx::query_as::<_, AggregationConfiguration>(
            r#"
            SELECT aggregation_configuration_id, file_name_prefix, file_delimiter,
                   is_data_quotes_surrounded, aggregation_query, data_control_query,
                   start_date, end_date
            FROM aggregation_configuration
            WHERE start_date <= $1
              AND (end_date IS NULL OR end_date >= $1)
            ORDER BY aggregation_configuration_id
            "#,
        )
        .bind(day)
        .fetch_all(&self.db)
        .await?;

        Ok(configurations)
    }

    async fn run_aggregation_query(&self, query: &str) -> DbResult<AggregatedResult> {
        let rows = sqlx::raw_sql(query).fetch_all(&self.db).await?;

        let Some(first) = rows.first() else {
            return Ok(AggregatedResult::default());
        };

        let header = first.columns().iter().map(|c| c.name().to_string()).collect();
        let rows = rows.iter().map(text_values).collect::<DbResult<Vec<_>>>()?;

        Ok(AggregatedResult { header, rows })
    }

    async fn run_control_query(&self, query: &str) -> DbResult<Option<String>> {
        let row = (&self.db).fetch_optional(sqlx::raw_sql(query)).await?;

        match row {
            Some(row) if !row.is_empty() => Ok(row.try_get_unchecked::<Option<String>, _>(0)?),
            _ => Ok(None),
        }
    }

    async fn save_extract(&self, extract: NewExtract) -> DbResult<SavedExtract> {
        let mut tx = self.db.begin().await?;

        let control = match &extract.control {
            Some(file) => Some(insert_file(&mut tx, file).await?),
            None => None,
        };
        let claimed = insert_relations(&mut tx, &extract.relations).await?;
        let data = insert_file(&mut tx, &extract.data).await?;

        tx.commit().await?;

        Ok(SavedExtract {
            control,
            data,
            claimed,
        })
    }

    async fn pending_uploads(&self) -> DbResult<Vec<GeneratedFile>> {
        let files = sqlx::query_as::<_, GeneratedFile>(
            r#"
            SELECT generated_file_detail_id, aggregation_configuration_id,
                   generated_file_name, file_content, is_uploaded_to_s3
            FROM generated_file_detail
            WHERE is_uploaded_to_s3 = FALSE
            ORDER BY generated_file_detail_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(files)
    }

    async fn mark_uploaded(&self, file_id: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE generated_file_detail
            SET is_uploaded_to_s3 = TRUE, last_updated_datetime = NOW()
            WHERE generated_file_detail_id = $1
            "#,
        )
        .bind(file_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Store over in-memory tables. Aggregation results are scripted per query
    //! text; claimed lines are removed from later results the way an anti-join
    //! would remove them.

    use super::*;
    use crate::db::DbError;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct MemoryAggregationStore {
        pub(crate) configurations: Mutex<Vec<AggregationConfiguration>>,
        pub(crate) results: Mutex<HashMap<String, AggregatedResult>>,
        pub(crate) control_totals: Mutex<HashMap<String, Option<String>>>,
        pub(crate) relations: Mutex<Vec<AggregationRelation>>,
        pub(crate) files: Mutex<Vec<GeneratedFile>>,
        pub(crate) failing_queries: Mutex<HashSet<String>>,
        pub(crate) fail_configuration_load: Mutex<bool>,
        failing_saves: Mutex<usize>,
    }

    fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    impl MemoryAggregationStore {
        pub(crate) fn add_configuration(&self, configuration: AggregationConfiguration) {
            lock(&self.configurations).push(configuration);
        }

        pub(crate) fn script_result(&self, query: &str, result: AggregatedResult) {
            lock(&self.results).insert(query.to_string(), result);
        }

        pub(crate) fn script_control(&self, query: &str, total: Option<&str>) {
            lock(&self.control_totals).insert(query.to_string(), total.map(str::to_string));
        }

        pub(crate) fn fail_query(&self, query: &str) {
            lock(&self.failing_queries).insert(query.to_string());
        }

        /// Make the next `n` extract saves fail before writing anything.
        pub(crate) fn fail_next_saves(&self, n: usize) {
            *lock(&self.failing_saves) = n;
        }

        /// Store a file with `uploaded = false`.
        pub(crate) fn insert_file(&self, file: NewGeneratedFile) -> GeneratedFile {
            let mut files = lock(&self.files);
            let saved = GeneratedFile {
                id: files.len() as i64 + 1,
                aggregation_configuration_id: file.configuration_id,
                name: file.name,
                content: file.content,
                uploaded: false,
            };
            files.push(saved.clone());
            saved
        }

        pub(crate) fn files(&self) -> Vec<GeneratedFile> {
            lock(&self.files).clone()
        }

        pub(crate) fn relations(&self) -> Vec<AggregationRelation> {
            lock(&self.relations).clone()
        }

        fn check(&self, query: &str) -> DbResult<()> {
            if lock(&self.failing_queries).contains(query) {
                return Err(DbError::from(sqlx::Error::Protocol(format!("query failed: {}", query))));
            }
            Ok(())
        }

        fn is_claimed(&self, row: &[String]) -> bool {
            let claimed: HashSet<i64> = lock(&self.relations)
                .iter()
                .map(|r| r.transaction_line_id)
                .collect();
            row.first()
                .map(|ids| {
                    ids.split(',')
                        .filter_map(|id| id.trim().parse::<i64>().ok())
                        .any(|id| claimed.contains(&id))
                })
                .unwrap_or(false)
        }
    }

    #[async_trait]
    impl AggregationStore for MemoryAggregationStore {
        async fn active_configurations(&self, _day: NaiveDate) -> DbResult<Vec<AggregationConfiguration>> {
            if *lock(&self.fail_configuration_load) {
                return Err(DbError::from(sqlx::Error::PoolTimedOut));
            }
            Ok(lock(&self.configurations).clone())
        }

        async fn run_aggregation_query(&self, query: &str) -> DbResult<AggregatedResult> {
            self.check(query)?;
            let mut result = lock(&self.results).get(query).cloned().unwrap_or_default();
            result.rows.retain(|row| !self.is_claimed(row));
            Ok(result)
        }

        async fn run_control_query(&self, query: &str) -> DbResult<Option<String>> {
            self.check(query)?;
            Ok(lock(&self.control_totals).get(query).cloned().flatten())
        }

        async fn save_extract(&self, extract: NewExtract) -> DbResult<SavedExtract> {
            {
                let mut failures = lock(&self.failing_saves);
                if *failures > 0 {
                    *failures -= 1;
                    return Err(DbError::from(sqlx::Error::PoolTimedOut));
                }
            }

            let control = extract.control.map(|file| self.insert_file(file));

            let mut claimed = 0;
            {
                let mut stored = lock(&self.relations);
                for relation in extract.relations {
                    if !stored.contains(&relation) {
                        stored.push(relation);
                        claimed += 1;
                    }
                }
            }

            let data = self.insert_file(extract.data);

            Ok(SavedExtract {
                control,
                data,
                claimed,
            })
        }

        async fn pending_uploads(&self) -> DbResult<Vec<GeneratedFile>> {
            Ok(lock(&self.files).iter().filter(|f| !f.uploaded).cloned().collect())
        }

        async fn mark_uploaded(&self, file_id: i64) -> DbResult<()> {
            if let Some(file) = lock(&self.files).iter_mut().find(|f| f.id == file_id) {
                file.uploaded = true;
            }
            Ok(())
        }
    }
}
