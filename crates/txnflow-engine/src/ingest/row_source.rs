//! Lazy row stream over a delimited source file

use super::models::{RawRow, RetailLineRecord};
use super::IngestError;
use csv_async::{AsyncReaderBuilder, Trim};
use futures::stream::{BoxStream, StreamExt};
use tokio::io::AsyncRead;

pub const FIELD_DELIMITER: u8 = b'|';

/// Typed rows of a `|`-delimited file with a header line.
///
/// The stream is single pass and reads the source only as it is polled. Each
/// item is either a row or a mapping error carrying the 1-based record number.
pub fn rows<R>(reader: R) -> BoxStream<'static, Result<RawRow, IngestError>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    AsyncReaderBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .trim(Trim::All)
        .create_deserializer(reader)
        .into_deserialize::<RetailLineRecord>()
        .enumerate()
        .map(|(index, result)| {
            let record = index as u64 + 1;
            result
                .map_err(|e| IngestError::mapping(record, e.to_string()))
                .and_then(|raw| RawRow::from_record(record, raw))
        })
        .boxed()
}
