//! Batch boundary splitting
//!
//! A batch is cut at a fixed row count, which can land in the middle of a
//! transaction. [`split`] holds back the transaction the batch ended on so its
//! lines are saved together with the rows that follow it.

use super::models::RawRow;
use std::collections::HashMap;

/// Rows sharing one transaction key, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionGroup {
    pub key: String,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Default, PartialEq)]
pub struct SplitOutcome {
    /// Groups safe to persist now
    pub complete: Vec<TransactionGroup>,
    /// Group carried into the next batch
    pub overflow: Option<TransactionGroup>,
}

/// Group rows by transaction key, in first-seen key order.
pub fn group_rows(rows: Vec<RawRow>) -> Vec<TransactionGroup> {
    let mut groups: Vec<TransactionGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        match index.get(&row.transaction_key) {
            Some(&slot) => groups[slot].rows.push(row),
            None => {
                index.insert(row.transaction_key.clone(), groups.len());
                groups.push(TransactionGroup {
                    key: row.transaction_key.clone(),
                    rows: vec![row],
                });
            },
        }
    }

    groups
}

/// Split a buffered batch.
///
/// When the batch is full and holds more than one transaction key, the group
/// of the last appended row becomes the overflow. Otherwise every group is
/// complete.
pub fn split(batch: Vec<RawRow>, batch_size: usize) -> SplitOutcome {
    let Some(last_key) = batch.last().map(|row| row.transaction_key.clone()) else {
        return SplitOutcome::default();
    };
    let full = batch.len() >= batch_size;

    let mut groups = group_rows(batch);
    if !full || groups.len() < 2 {
        return SplitOutcome {
            complete: groups,
            overflow: None,
        };
    }

    let overflow = groups
        .iter()
        .position(|group| group.key == last_key)
        .map(|slot| groups.remove(slot));

    SplitOutcome {
        complete: groups,
        overflow,
    }
}

/// Final split at end of stream: everything is complete.
pub fn flush(batch: Vec<RawRow>) -> Vec<TransactionGroup> {
    group_rows(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rows(keys: &[(&str, &str)]) -> Vec<RawRow> {
        keys.iter()
            .enumerate()
            .map(|(i, (txn, line))| RawRow::new(i as u64 + 1, *txn, *line))
            .collect()
    }

    fn line_keys(group: &TransactionGroup) -> Vec<&str> {
        group.rows.iter().map(|r| r.line_key.as_str()).collect()
    }

    #[test]
    fn test_full_batch_holds_back_last_transaction() {
        let outcome = split(rows(&[("T1", "L1"), ("T1", "L2"), ("T2", "L1")]), 3);

        assert_eq!(outcome.complete.len(), 1);
        assert_eq!(outcome.complete[0].key, "T1");
        assert_eq!(line_keys(&outcome.complete[0]), vec!["L1", "L2"]);

        let overflow = outcome.overflow.unwrap();
        assert_eq!(overflow.key, "T2");
        assert_eq!(line_keys(&overflow), vec!["L1"]);
    }

    #[test]
    fn test_overflow_collects_every_row_of_last_key() {
        let outcome = split(
            rows(&[("T2", "L1"), ("T1", "L1"), ("T2", "L2"), ("T3", "L1"), ("T2", "L3")]),
            5,
        );

        let complete: Vec<&str> = outcome.complete.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(complete, vec!["T1", "T3"]);
        assert_eq!(line_keys(&outcome.overflow.unwrap()), vec!["L1", "L2", "L3"]);
    }

    #[test]
    fn test_partial_batch_is_all_complete() {
        let outcome = split(rows(&[("T1", "L1"), ("T2", "L1")]), 10);
        assert_eq!(outcome.complete.len(), 2);
        assert!(outcome.overflow.is_none());
    }

    #[test]
    fn test_single_key_batch_is_complete() {
        let outcome = split(rows(&[("T1", "L1"), ("T1", "L2"), ("T1", "L3")]), 2);
        assert_eq!(outcome.complete.len(), 1);
        assert_eq!(outcome.complete[0].rows.len(), 3);
        assert!(outcome.overflow.is_none());
    }

    #[test]
    fn test_empty_batch() {
        assert_eq!(split(Vec::new(), 2), SplitOutcome::default());
        assert!(flush(Vec::new()).is_empty());
    }

    #[test]
    fn test_grouping_keeps_first_seen_order() {
        let groups = group_rows(rows(&[("B", "1"), ("A", "1"), ("B", "2"), ("C", "1")]));
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["B", "A", "C"]);
    }

    fn arb_rows() -> impl Strategy<Value = Vec<RawRow>> {
        prop::collection::vec(("T[0-4]", "L[0-9]"), 0..40).prop_map(|pairs| {
            pairs
                .into_iter()
                .enumerate()
                .map(|(i, (txn, line))| RawRow::new(i as u64 + 1, txn, line))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn split_loses_no_rows(batch in arb_rows(), batch_size in 1usize..50) {
            let total = batch.len();
            let outcome = split(batch, batch_size);
            let kept: usize = outcome.complete.iter().map(|g| g.rows.len()).sum::<usize>()
                + outcome.overflow.as_ref().map_or(0, |g| g.rows.len());
            prop_assert_eq!(kept, total);
        }

        #[test]
        fn no_key_is_both_complete_and_overflow(batch in arb_rows(), batch_size in 1usize..50) {
            let outcome = split(batch, batch_size);
            if let Some(overflow) = &outcome.overflow {
                prop_assert!(outcome.complete.iter().all(|g| g.key != overflow.key));
                prop_assert!(!outcome.complete.is_empty());
            }
        }

        #[test]
        fn overflow_only_when_full(batch in arb_rows(), batch_size in 1usize..50) {
            let len = batch.len();
            let outcome = split(batch, batch_size);
            if len < batch_size {
                prop_assert!(outcome.overflow.is_none());
            }
        }
    }
}
