//! Canonical transaction persistence

use super::models::{CanonicalLine, CanonicalTransaction, SourceRef};
use crate::db::DbResult;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

/// What a [`TransactionGateway::save_all`] call actually inserted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub transactions_inserted: u64,
    pub lines_inserted: u64,
}

/// Lookups and bulk saves against the canonical store
#[async_trait]
pub trait TransactionGateway: Send + Sync {
    async fn exists_transaction(&self, source: &SourceRef, transaction_key: &str) -> DbResult<bool>;

    /// The subset of `candidates` already stored for `source`.
    async fn existing_transaction_keys(
        &self,
        source: &SourceRef,
        candidates: &[String],
    ) -> DbResult<Vec<String>>;

    /// The subset of `candidates` already stored as lines of the given transaction.
    async fn existing_line_keys(
        &self,
        source: &SourceRef,
        transaction_key: &str,
        candidates: &[String],
    ) -> DbResult<Vec<String>>;

    /// Save a batch atomically.
    ///
    /// Lines of a transaction that already exists are attached to it. Lines
    /// already stored are skipped.
    async fn save_all(&self, transactions: &[CanonicalTransaction]) -> DbResult<SaveOutcome>;
}

pub struct PgTransactionGateway {
    db: PgPool,
}

impl PgTransactionGateway {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn upsert_header(
        tx: &mut Transaction<'_, Postgres>,
        transaction: &CanonicalTransaction,
    ) -> DbResult<(i64, bool)> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO transaction (
                source_reference_transaction_id, source_reference_system_type, source_reference_type,
                source_processed_date, transaction_date, business_date,
                transaction_type, transaction_reversal_code
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT ON CONSTRAINT uq_transaction_source DO NOTHING
            RETURNING transaction_id
            "#,
        )
        .bind(&transaction.source_reference_transaction_id)
        .bind(&transaction.source.system)
        .bind(&transaction.source.source_type)
        .bind(transaction.header.source_processed_date)
        .bind(transaction.header.transaction_date)
        .bind(transaction.header.business_date)
        .bind(&transaction.header.transaction_type)
        .bind(&transaction.header.transaction_reversal_code)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(id) = inserted {
            return Ok((id, true));
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            SELECT transaction_id FROM transaction
            WHERE source_reference_transaction_id = $1
              AND source_reference_system_type = $2
              AND source_reference_type = $3
            "#,
        )
        .bind(&transaction.source_reference_transaction_id)
        .bind(&transaction.source.system)
        .bind(&transaction.source.source_type)
        .fetch_one(&mut **tx)
        .await?;

        Ok((id, false))
    }

    async fn insert_line(
        tx: &mut Transaction<'_, Postgres>,
        transaction_id: i64,
        line: &CanonicalLine,
    ) -> DbResult<bool> {
        let line_id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO transaction_line (
                transaction_id, source_reference_line_id, source_reference_line_type,
                transaction_line_type, ringing_store, store_of_intent
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT uq_transaction_line_source DO NOTHING
            RETURNING transaction_line_id
            "#,
        )
        .bind(transaction_id)
        .bind(&line.source_reference_line_id)
        .bind(&line.source_reference_line_type)
        .bind(&line.transaction_line_type)
        .bind(&line.ringing_store)
        .bind(&line.store_of_intent)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(line_id) = line_id else {
            return Ok(false);
        };

        let detail = &line.detail;
        sqlx::query(
            r#"
            INSERT INTO retail_transaction_line (
                transaction_line_id, department_id, class_id, fee_code,
                tender_type, tender_card_type_code, tender_card_subtype_code, tender_activity_code,
                line_item_amount, tax_amount, employee_discount_amount, tender_amount,
                fulfillment_type_dropship_code, cash_disbursement_line1, cash_disbursement_line2,
                waived_reason_code, waived_amount
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(line_id)
        .bind(&detail.department_id)
        .bind(&detail.class_id)
        .bind(&detail.fee_code)
        .bind(&detail.tender_type)
        .bind(&detail.tender_card_type_code)
        .bind(&detail.tender_card_subtype_code)
        .bind(&detail.tender_activity_code)
        .bind(&detail.line_item_amount)
        .bind(&detail.tax_amount)
        .bind(&detail.employee_discount_amount)
        .bind(&detail.tender_amount)
        .bind(&detail.fulfillment_type_dropship_code)
        .bind(&detail.cash_disbursement_line1)
        .bind(&detail.cash_disbursement_line2)
        .bind(&detail.waived_reason_code)
        .bind(&detail.waived_amount)
        .execute(&mut **tx)
        .await?;

        Ok(true)
    }
}

#[async_trait]
impl TransactionGateway for PgTransactionGateway {
    async fn exists_transaction(&self, source: &SourceRef, transaction_key: &str) -> DbResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM transaction
                WHERE source_reference_system_type = $1
                  AND source_reference_type = $2
                  AND source_reference_transaction_id = $3
            )
            "#,
        )
        .bind(&source.system)
        .bind(&source.source_type)
        .bind(transaction_key)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    async fn existing_transaction_keys(
        &self,
        source: &SourceRef,
        candidates: &[String],
    ) -> DbResult<Vec<String>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT source_reference_transaction_id FROM transaction
            WHERE source_reference_system_type = $1
              AND source_reference_type = $2
              AND source_reference_transaction_id = ANY($3)
            "#,
        )
        .bind(&source.system)
        .bind(&source.source_type)
        .bind(candidates)
        .fetch_all(&self.db)
        .await?;

        Ok(keys)
    }

    async fn existing_line_keys(
        &self,
        source: &SourceRef,
        transaction_key: &str,
        candidates: &[String],
    ) -> DbResult<Vec<String>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT l.source_reference_line_id
            FROM transaction_line l
            JOIN transaction t ON t.transaction_id = l.transaction_id
            WHERE t.source_reference_system_type = $1
              AND t.source_reference_type = $2
              AND t.source_reference_transaction_id = $3
              AND l.source_reference_line_id = ANY($4)
            "#,
        )
        .bind(&source.system)
        .bind(&source.source_type)
        .bind(transaction_key)
        .bind(candidates)
        .fetch_all(&self.db)
        .await?;

        Ok(keys)
    }

    async fn save_all(&self, transactions: &[CanonicalTransaction]) -> DbResult<SaveOutcome> {
        let mut outcome = SaveOutcome::default();
        if transactions.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.db.begin().await?;

        for transaction in transactions {
            let (transaction_id, created) = Self::upsert_header(&mut tx, transaction).await?;
            if created {
                outcome.transactions_inserted += 1;
            } else {
                debug!(
                    transaction = %transaction.source_reference_transaction_id,
                    "Attaching lines to stored transaction"
                );
            }

            for line in &transaction.lines {
                if Self::insert_line(&mut tx, transaction_id, line).await? {
                    outcome.lines_inserted += 1;
                }
            }
        }

        tx.commit().await?;

        Ok(outcome)
    }
}
