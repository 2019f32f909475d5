//! Fold a transaction group into a canonical aggregate

use super::models::{CanonicalLine, CanonicalTransaction, RawRow, RetailLineDetail, SourceRef};
use super::splitter::TransactionGroup;
use txnflow_common::format::to_four_digit;

/// Build the canonical transaction for one group.
///
/// Header fields come from the first row that carries each of them; every
/// row becomes one line. Returns `None` for an empty group.
pub fn assemble(group: TransactionGroup, source: &SourceRef) -> Option<CanonicalTransaction> {
    let mut rows = group.rows.into_iter();
    let first = rows.next()?;

    let mut transaction = CanonicalTransaction {
        source: source.clone(),
        source_reference_transaction_id: group.key,
        header: first.header.clone(),
        lines: vec![to_line(first)],
    };

    for row in rows {
        transaction.header.fill_from(&row.header);
        transaction.lines.push(to_line(row));
    }

    Some(transaction)
}

fn to_line(row: RawRow) -> CanonicalLine {
    let fields = row.line;
    CanonicalLine {
        source_reference_line_id: row.line_key,
        source_reference_line_type: fields.source_reference_line_type,
        transaction_line_type: fields.transaction_line_type.as_deref().and_then(line_type),
        ringing_store: four_digit(fields.ringing_store),
        store_of_intent: four_digit(fields.store_of_intent),
        detail: RetailLineDetail {
            department_id: four_digit(fields.department_id),
            class_id: four_digit(fields.class_id),
            fee_code: four_digit(fields.fee_code),
            tender_type: fields.tender_type,
            tender_card_type_code: fields.tender_card_type,
            tender_card_subtype_code: fields.tender_card_subtype,
            tender_activity_code: fields.tender_adjustment_code,
            line_item_amount: fields.line_item_amount,
            tax_amount: fields.tax_amount,
            employee_discount_amount: fields.employee_discount_amount,
            tender_amount: fields.tender_amount,
            fulfillment_type_dropship_code: fields.fulfillment_type_dropship_code,
            cash_disbursement_line1: fields.cash_disbursement_line1,
            cash_disbursement_line2: fields.cash_disbursement_line2,
            waived_reason_code: fields.waived_reason_code,
            waived_amount: fields.waived_amount,
        },
    }
}

fn four_digit(code: Option<String>) -> Option<String> {
    code.map(|c| to_four_digit(&c))
}

/// Normalise a source line type code.
pub fn line_type(code: &str) -> Option<String> {
    let code = code.trim();
    match code.to_ascii_uppercase().as_str() {
        "" => None,
        "S" => Some("SALE".to_string()),
        "R" | "RETURN" => Some("RETN".to_string()),
        other => Some(other.to_string()),
    }
}
