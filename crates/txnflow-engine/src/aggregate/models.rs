//! Aggregation data model

use super::AggregationError;
use chrono::NaiveDate;
use uuid::Uuid;

/// One row of `aggregation_configuration`
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AggregationConfiguration {
    #[sqlx(rename = "aggregation_configuration_id")]
    pub id: i64,
    pub file_name_prefix: String,
    pub file_delimiter: String,
    #[sqlx(rename = "is_data_quotes_surrounded")]
    pub quote_all: bool,
    pub aggregation_query: String,
    pub data_control_query: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl AggregationConfiguration {
    /// Active when `day` falls inside `[start_date, end_date]`; an open end never expires.
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && self.end_date.map_or(true, |end| end >= day)
    }

    /// The delimiter as a single byte.
    pub fn delimiter(&self) -> Result<u8, AggregationError> {
        match self.file_delimiter.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(AggregationError::InvalidConfiguration(format!(
                "delimiter '{}' of '{}' is not a single ASCII character",
                self.file_delimiter, self.file_name_prefix
            ))),
        }
    }

    /// The control query, unless blank.
    pub fn control_query(&self) -> Option<&str> {
        self.data_control_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

/// Aggregation query output, values in text form with NULL as empty.
///
/// Columns are `[line_key_list, aggregation_id, business columns...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedResult {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl AggregatedResult {
    pub fn data_row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One row of `generated_file_detail`
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GeneratedFile {
    #[sqlx(rename = "generated_file_detail_id")]
    pub id: i64,
    pub aggregation_configuration_id: i64,
    #[sqlx(rename = "generated_file_name")]
    pub name: String,
    #[sqlx(rename = "file_content")]
    pub content: String,
    #[sqlx(rename = "is_uploaded_to_s3")]
    pub uploaded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGeneratedFile {
    pub configuration_id: i64,
    pub name: String,
    pub content: String,
}

/// Claim of one transaction line by one aggregation group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AggregationRelation {
    pub aggregation_id: Uuid,
    pub transaction_line_id: i64,
}

/// Everything one configuration run writes, committed together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExtract {
    pub control: Option<NewGeneratedFile>,
    pub relations: Vec<AggregationRelation>,
    pub data: NewGeneratedFile,
}

/// Rows written by [`NewExtract`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedExtract {
    pub control: Option<GeneratedFile>,
    pub data: GeneratedFile,
    /// Claims that did not exist yet
    pub claimed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configuration(start: NaiveDate, end: Option<NaiveDate>) -> AggregationConfiguration {
        AggregationConfiguration {
            id: 1,
            file_name_prefix: "CASH".to_string(),
            file_delimiter: "|".to_string(),
            quote_all: false,
            aggregation_query: "SELECT 1".to_string(),
            data_control_query: None,
            start_date: start,
            end_date: end,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
    }

    #[test]
    fn test_active_window_is_inclusive() {
        let config = configuration(day(10), Some(day(12)));
        assert!(!config.is_active_on(day(9)));
        assert!(config.is_active_on(day(10)));
        assert!(config.is_active_on(day(12)));
        assert!(!config.is_active_on(day(13)));
        assert!(configuration(day(10), None).is_active_on(day(31)));
    }

    #[test]
    fn test_delimiter_must_be_one_byte() {
        let mut config = configuration(day(1), None);
        assert_eq!(config.delimiter().unwrap(), b'|');

        config.file_delimiter = "||".to_string();
        assert!(matches!(
            config.delimiter(),
            Err(AggregationError::InvalidConfiguration(_))
        ));

        config.file_delimiter = "¦".to_string();
        assert!(config.delimiter().is_err());
    }

    #[test]
    fn test_blank_control_query_is_none() {
        let mut config = configuration(day(1), None);
        config.data_control_query = Some("  ".to_string());
        assert_eq!(config.control_query(), None);

        config.data_control_query = Some("SELECT SUM(amount) FROM x".to_string());
        assert_eq!(config.control_query(), Some("SELECT SUM(amount) FROM x"));
    }
}
