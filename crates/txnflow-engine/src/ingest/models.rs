//! Ingestion data model
//!
//! [`RetailLineRecord`] is one line of a retail source file exactly as it was
//! read. [`RawRow`] is the same record after typing: keys checked, dates and
//! amounts parsed, empty fields turned into `None`. [`CanonicalTransaction`] is
//! the aggregate the gateway persists.

use super::IngestError;
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::types::BigDecimal;
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One `|`-delimited retail line, bound by header name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetailLineRecord {
    pub source_reference_transaction_id: String,
    pub source_processed_date: String,
    pub transaction_date: String,
    pub business_date: String,
    pub transaction_type: String,
    pub transaction_reversal_code: String,

    pub source_reference_line_id: String,
    pub source_reference_line_type: String,
    pub transaction_line_type: String,
    pub ringing_store: String,
    pub store_of_intent: String,
    pub department_id: String,
    pub class_id: String,
    pub fee_code: String,
    pub tender_type: String,
    pub tender_card_type: String,
    pub tender_card_subtype: String,
    pub tender_adjustment_code: String,
    pub line_item_amount: String,
    pub tax_amount: String,
    pub employee_discount_amount: String,
    pub tender_amount: String,
    pub waived_amount: String,
    #[serde(rename = "CASH_DISBURSEMENT_LINE1")]
    pub cash_disbursement_line1: String,
    #[serde(rename = "CASH_DISBURSEMENT_LINE2")]
    pub cash_disbursement_line2: String,
    pub waived_reason_code: String,
    pub fulfillment_type_dropship_code: String,
}

/// Transaction-level fields. Every row of a transaction may carry them; the
/// assembler keeps the first value seen for each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionHeader {
    pub source_processed_date: Option<NaiveDate>,
    pub transaction_date: Option<NaiveDate>,
    pub business_date: Option<NaiveDate>,
    pub transaction_type: Option<String>,
    pub transaction_reversal_code: Option<String>,
}

impl TransactionHeader {
    /// Fill every field still unset from `other`.
    pub fn fill_from(&mut self, other: &TransactionHeader) {
        fill(&mut self.source_processed_date, &other.source_processed_date);
        fill(&mut self.transaction_date, &other.transaction_date);
        fill(&mut self.business_date, &other.business_date);
        fill(&mut self.transaction_type, &other.transaction_type);
        fill(&mut self.transaction_reversal_code, &other.transaction_reversal_code);
    }
}

fn fill<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if target.is_none() {
        target.clone_from(source);
    }
}

/// Line-level fields of a retail row, before normalisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetailLineFields {
    pub source_reference_line_type: Option<String>,
    pub transaction_line_type: Option<String>,
    pub ringing_store: Option<String>,
    pub store_of_intent: Option<String>,
    pub department_id: Option<String>,
    pub class_id: Option<String>,
    pub fee_code: Option<String>,
    pub tender_type: Option<String>,
    pub tender_card_type: Option<String>,
    pub tender_card_subtype: Option<String>,
    pub tender_adjustment_code: Option<String>,
    pub line_item_amount: Option<BigDecimal>,
    pub tax_amount: Option<BigDecimal>,
    pub employee_discount_amount: Option<BigDecimal>,
    pub tender_amount: Option<BigDecimal>,
    pub waived_amount: Option<BigDecimal>,
    pub cash_disbursement_line1: Option<String>,
    pub cash_disbursement_line2: Option<String>,
    pub waived_reason_code: Option<String>,
    pub fulfillment_type_dropship_code: Option<String>,
}

/// A typed source row
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based position in the source file
    pub record: u64,
    pub transaction_key: String,
    pub line_key: String,
    pub header: TransactionHeader,
    pub line: RetailLineFields,
}

impl RawRow {
    /// Minimal row, mostly for building fixtures.
    pub fn new(record: u64, transaction_key: impl Into<String>, line_key: impl Into<String>) -> Self {
        Self {
            record,
            transaction_key: transaction_key.into(),
            line_key: line_key.into(),
            header: TransactionHeader::default(),
            line: RetailLineFields::default(),
        }
    }

    pub fn from_record(record: u64, raw: RetailLineRecord) -> Result<Self, IngestError> {
        let transaction_key = text(raw.source_reference_transaction_id)
            .ok_or_else(|| IngestError::mapping(record, "missing SOURCE_REFERENCE_TRANSACTION_ID"))?;
        let line_key = text(raw.source_reference_line_id)
            .ok_or_else(|| IngestError::mapping(record, "missing SOURCE_REFERENCE_LINE_ID"))?;

        let header = TransactionHeader {
            source_processed_date: date(record, "SOURCE_PROCESSED_DATE", &raw.source_processed_date)?,
            transaction_date: date(record, "TRANSACTION_DATE", &raw.transaction_date)?,
            business_date: date(record, "BUSINESS_DATE", &raw.business_date)?,
            transaction_type: text(raw.transaction_type),
            transaction_reversal_code: text(raw.transaction_reversal_code),
        };

        let line = RetailLineFields {
            source_reference_line_type: text(raw.source_reference_line_type),
            transaction_line_type: text(raw.transaction_line_type),
            ringing_store: text(raw.ringing_store),
            store_of_intent: text(raw.store_of_intent),
            department_id: text(raw.department_id),
            class_id: text(raw.class_id),
            fee_code: text(raw.fee_code),
            tender_type: text(raw.tender_type),
            tender_card_type: text(raw.tender_card_type),
            tender_card_subtype: text(raw.tender_card_subtype),
            tender_adjustment_code: text(raw.tender_adjustment_code),
            line_item_amount: decimal(record, "LINE_ITEM_AMOUNT", &raw.line_item_amount)?,
            tax_amount: decimal(record, "TAX_AMOUNT", &raw.tax_amount)?,
            employee_discount_amount: decimal(
                record,
                "EMPLOYEE_DISCOUNT_AMOUNT",
                &raw.employee_discount_amount,
            )?,
            tender_amount: decimal(record, "TENDER_AMOUNT", &raw.tender_amount)?,
            waived_amount: decimal(record, "WAIVED_AMOUNT", &raw.waived_amount)?,
            cash_disbursement_line1: text(raw.cash_disbursement_line1),
            cash_disbursement_line2: text(raw.cash_disbursement_line2),
            waived_reason_code: text(raw.waived_reason_code),
            fulfillment_type_dropship_code: text(raw.fulfillment_type_dropship_code),
        };

        Ok(Self {
            record,
            transaction_key,
            line_key,
            header,
            line,
        })
    }
}

fn text(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn date(record: u64, column: &str, value: &str) -> Result<Option<NaiveDate>, IngestError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map(Some)
        .map_err(|e| IngestError::mapping(record, format!("{}: invalid date '{}': {}", column, value, e)))
}

fn decimal(record: u64, column: &str, value: &str) -> Result<Option<BigDecimal>, IngestError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    BigDecimal::from_str(value.trim())
        .map(Some)
        .map_err(|e| {
            IngestError::mapping(record, format!("{}: invalid amount '{}': {}", column, value, e))
        })
}

/// Source system and type stamped on every assembled transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub system: String,
    pub source_type: String,
}

impl SourceRef {
    pub fn new(system: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            source_type: source_type.into(),
        }
    }
}

/// Retail detail attached 1:1 to a canonical line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetailLineDetail {
    pub department_id: Option<String>,
    pub class_id: Option<String>,
    pub fee_code: Option<String>,
    pub tender_type: Option<String>,
    pub tender_card_type_code: Option<String>,
    pub tender_card_subtype_code: Option<String>,
    pub tender_activity_code: Option<String>,
    pub line_item_amount: Option<BigDecimal>,
    pub tax_amount: Option<BigDecimal>,
    pub employee_discount_amount: Option<BigDecimal>,
    pub tender_amount: Option<BigDecimal>,
    pub fulfillment_type_dropship_code: Option<String>,
    pub cash_disbursement_line1: Option<String>,
    pub cash_disbursement_line2: Option<String>,
    pub waived_reason_code: Option<String>,
    pub waived_amount: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalLine {
    pub source_reference_line_id: String,
    pub source_reference_line_type: Option<String>,
    pub transaction_line_type: Option<String>,
    pub ringing_store: Option<String>,
    pub store_of_intent: Option<String>,
    pub detail: RetailLineDetail,
}

/// The persisted aggregate, unique by source system, type and transaction key
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTransaction {
    pub source: SourceRef,
    pub source_reference_transaction_id: String,
    pub header: TransactionHeader,
    pub lines: Vec<CanonicalLine>,
}
