//! Chunking and row-delimited serialization (spec §4.5.4). Chunks are
//! fixed-size, contiguous, and serialized without a header row using a
//! rare single-byte field separator so embedded commas and tabs in source
//! data never get misread as delimiters.

use bytes::Bytes;
use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::util::display::array_value_to_string;
use etl_core::ChunkDescriptor;

/// Default column separator: SOH (0x01), never present in ordinary text.
pub const DEFAULT_COLUMN_SEPARATOR: char = '\u{0001}';
pub const DEFAULT_ROW_DELIMITER: char = '\n';

/// Split `batch` into contiguous chunks of at most `chunk_rows` rows.
pub fn chunk_descriptors(num_rows: usize, chunk_rows: usize) -> Vec<ChunkDescriptor> {
    if num_rows == 0 {
        return vec![];
    }
    let chunk_rows = chunk_rows.max(1);
    let mut out = Vec::new();
    let mut start = 0;
    let mut ordinal = 0;
    while start < num_rows {
        let end = (start + chunk_rows).min(num_rows);
        out.push(ChunkDescriptor { start, end, ordinal });
        start = end;
        ordinal += 1;
    }
    out
}

/// Serialize one row range of `batch` to the stream-load body format.
pub fn serialize_chunk(
    batch: &RecordBatch,
    chunk: &ChunkDescriptor,
    column_separator: char,
    row_delimiter: char,
) -> Bytes {
    let mut out = String::new();
    for row in chunk.start..chunk.end {
        for (col_idx, column) in batch.columns().iter().enumerate() {
            if col_idx > 0 {
                out.push(column_separator);
            }
            if column.is_null(row) {
                // empty field; StarRocks treats an empty positional field as NULL
                // under default settings.
            } else {
                out.push_str(&array_value_to_string(column, row).unwrap_or_default());
            }
        }
        out.push(row_delimiter);
    }
    Bytes::from(out.into_bytes())
}
