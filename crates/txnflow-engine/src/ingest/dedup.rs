//! Drop rows that an earlier run already stored

use super::gateway::TransactionGateway;
use super::models::SourceRef;
use super::splitter::TransactionGroup;
use crate::db::DbResult;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub groups: Vec<TransactionGroup>,
    /// Rows removed because their line was already stored
    pub duplicate_rows: usize,
}

/// Read-only filter in front of the gateway.
///
/// A transaction not yet stored passes through untouched. For one that is,
/// only rows with a line key not yet stored survive, and a group left empty
/// is dropped.
pub struct DuplicateFilter<'a> {
    gateway: &'a dyn TransactionGateway,
    source: &'a SourceRef,
}

impl<'a> DuplicateFilter<'a> {
    pub fn new(gateway: &'a dyn TransactionGateway, source: &'a SourceRef) -> Self {
        Self { gateway, source }
    }

    /// Any lookup failure fails the whole call; no partially filtered result is returned.
    pub async fn filter(&self, groups: Vec<TransactionGroup>) -> DbResult<FilterOutcome> {
        if groups.is_empty() {
            return Ok(FilterOutcome::default());
        }

        let candidates: Vec<String> = groups.iter().map(|g| g.key.clone()).collect();
        let existing: HashSet<String> = self
            .gateway
            .existing_transaction_keys(self.source, &candidates)
            .await?
            .into_iter()
            .collect();

        let mut outcome = FilterOutcome::default();

        for mut group in groups {
            if existing.contains(&group.key) {
                let line_keys: Vec<String> = group.rows.iter().map(|r| r.line_key.clone()).collect();
                let stored: HashSet<String> = self
                    .gateway
                    .existing_line_keys(self.source, &group.key, &line_keys)
                    .await?
                    .into_iter()
                    .collect();

                let before = group.rows.len();
                group.rows.retain(|row| !stored.contains(&row.line_key));
                outcome.duplicate_rows += before - group.rows.len();

                if group.rows.is_empty() {
                    debug!(transaction = %group.key, "Transaction already fully stored");
                    continue;
                }
            }
            outcome.groups.push(group);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::assembler::assemble;
    use crate::ingest::gateway::fake::MemoryGateway;
    use crate::ingest::models::RawRow;
    use crate::ingest::splitter::group_rows;

    fn source() -> SourceRef {
        SourceRef::new("ertm", "retail")
    }

    fn groups(keys: &[(&str, &str)]) -> Vec<TransactionGroup> {
        group_rows(
            keys.iter()
                .enumerate()
                .map(|(i, (t, l))| RawRow::new(i as u64 + 1, *t, *l))
                .collect(),
        )
    }

    async fn seed(gateway: &MemoryGateway, keys: &[(&str, &str)]) {
        let transactions: Vec<_> = groups(keys)
            .into_iter()
            .filter_map(|g| assemble(g, &source()))
            .collect();
        gateway.save_all(&transactions).await.unwrap();
    }

    #[tokio::test]
    async fn test_new_transactions_pass_through() {
        let gateway = MemoryGateway::default();
        let source = source();
        let outcome = DuplicateFilter::new(&gateway, &source)
            .filter(groups(&[("T1", "L1"), ("T2", "L1")]))
            .await
            .unwrap();

        assert_eq!(outcome.groups.len(), 2);
        assert_eq!(outcome.duplicate_rows, 0);
    }

    #[tokio::test]
    async fn test_only_new_lines_of_stored_transaction_survive() {
        let gateway = MemoryGateway::default();
        seed(&gateway, &[("T1", "L1"), ("T1", "L2")]).await;

        let source = source();
        let outcome = DuplicateFilter::new(&gateway, &source)
            .filter(groups(&[("T1", "L1"), ("T1", "L2"), ("T1", "L3")]))
            .await
            .unwrap();

        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].rows.len(), 1);
        assert_eq!(outcome.groups[0].rows[0].line_key, "L3");
        assert_eq!(outcome.duplicate_rows, 2);
    }

    #[tokio::test]
    async fn test_fully_stored_transaction_is_dropped() {
        let gateway = MemoryGateway::default();
        seed(&gateway, &[("T1", "L1")]).await;

        let source = source();
        let outcome = DuplicateFilter::new(&gateway, &source)
            .filter(groups(&[("T1", "L1"), ("T2", "L1")]))
            .await
            .unwrap();

        let keys: Vec<&str> = outcome.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["T2"]);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_surfaced() {
        let gateway = MemoryGateway::default();
        gateway.fail_lookups(true);

        let source = source();
        let err = DuplicateFilter::new(&gateway, &source)
            .filter(groups(&[("T1", "L1")]))
            .await
            .unwrap_err();
        assert!(txnflow_common::Classify::is_retryable(&err));
    }
}
