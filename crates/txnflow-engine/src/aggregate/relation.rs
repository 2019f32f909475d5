//! Claims carried by aggregated rows

use super::models::AggregationRelation;
use super::AggregationError;
use std::collections::HashSet;
use uuid::Uuid;

/// One claim per distinct (aggregation id, line key) pair across all rows.
///
/// Column 0 of each row is the comma-joined line keys, column 1 the
/// aggregation id.
pub fn parse_claims(rows: &[Vec<String>]) -> Result<Vec<AggregationRelation>, AggregationError> {
    let mut seen = HashSet::new();
    let mut claims = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        let invalid = |message: String| AggregationError::InvalidClaim {
            row: row_number,
            message,
        };

        let (Some(line_keys), Some(group_id)) = (row.first(), row.get(1)) else {
            return Err(invalid(format!("expected at least 2 columns, found {}", row.len())));
        };

        let aggregation_id = Uuid::parse_str(group_id.trim())
            .map_err(|e| invalid(format!("aggregation id '{}': {}", group_id, e)))?;

        let mut any = false;
        for key in line_keys.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            let transaction_line_id = key
                .parse::<i64>()
                .map_err(|e| invalid(format!("line key '{}': {}", key, e)))?;
            any = true;

            let claim = AggregationRelation {
                aggregation_id,
                transaction_line_id,
            };
            if seen.insert(claim) {
                claims.push(claim);
            }
        }

        if !any {
            return Err(invalid("empty line key list".to_string()));
        }
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: &str = "6f1c2a4e-8a55-4a5e-9f3e-0f7f1b2c3d4e";

    fn row(keys: &str, group: &str) -> Vec<String> {
        vec![keys.to_string(), group.to_string(), "RETAIL".to_string()]
    }

    #[test]
    fn test_one_claim_per_line() {
        let claims = parse_claims(&[row("1, 2", GROUP), row("3", GROUP)]).unwrap();
        let ids: Vec<i64> = claims.iter().map(|c| c.transaction_line_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(claims.iter().all(|c| c.aggregation_id.to_string() == GROUP));
    }

    #[test]
    fn test_repeated_pairs_collapse() {
        let claims = parse_claims(&[row("1,1", GROUP), row("1", GROUP)]).unwrap();
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn test_malformed_rows_are_rejected() {
        assert!(matches!(
            parse_claims(&[row("1,x", GROUP)]),
            Err(AggregationError::InvalidClaim { row: 1, .. })
        ));
        assert!(parse_claims(&[row("1", "uuid-A")]).is_err());
        assert!(parse_claims(&[row(" , ", GROUP)]).is_err());
        assert!(parse_claims(&[vec!["1".to_string()]]).is_err());
    }
}
