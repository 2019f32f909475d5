//! Extract rendering
//!
//! Extracts are CSV with the configured delimiter, `\r\n` line endings and
//! either every field quoted or none.

use super::models::AggregatedResult;
use super::AggregationError;
use chrono::NaiveDateTime;
use csv::{QuoteStyle, Terminator, WriterBuilder};

const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

pub const CONTROL_HEADER: [&str; 3] = ["FileName", "TotalAmount", "AggregationDataRowCount"];

/// `{prefix}_{YYYY_MM_DD_HH_MM_SS}.csv`
pub fn data_file_name(prefix: &str, at: NaiveDateTime) -> String {
    format!("{}_{}.csv", prefix, at.format(TIMESTAMP_FORMAT))
}

/// `{prefix}_CONTROL_{YYYY_MM_DD_HH_MM_SS}.csv`
pub fn control_file_name(prefix: &str, at: NaiveDateTime) -> String {
    format!("{}_CONTROL_{}.csv", prefix, at.format(TIMESTAMP_FORMAT))
}

/// Field layout of one extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractFormat {
    pub delimiter: u8,
    pub quote_all: bool,
}

impl ExtractFormat {
    fn render<I, R>(&self, records: I) -> Result<String, AggregationError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator,
        R::Item: AsRef<[u8]>,
    {
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(Terminator::CRLF)
            .quote_style(if self.quote_all {
                QuoteStyle::Always
            } else {
                QuoteStyle::Never
            })
            .from_writer(Vec::new());

        for record in records {
            writer.write_record(record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;

        String::from_utf8(bytes).map_err(|e| {
            AggregationError::Extract(csv::Error::from(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            )))
        })
    }
}

/// Header and rows with the leading line-key column removed.
pub fn render_extract(
    result: &AggregatedResult,
    format: ExtractFormat,
) -> Result<String, AggregationError> {
    let header = std::iter::once(&result.header);
    format.render(header.chain(result.rows.iter()).map(|row| row.iter().skip(1)))
}

/// The two-row control table for a data file.
pub fn render_control(
    data_file_name: &str,
    total: &str,
    data_row_count: usize,
    format: ExtractFormat,
) -> Result<String, AggregationError> {
    let count = data_row_count.to_string();
    format.render([
        CONTROL_HEADER.to_vec(),
        vec![data_file_name, total, count.as_str()],
    ])
}
