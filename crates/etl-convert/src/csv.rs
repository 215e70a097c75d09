//! CSV ingestion into the bronze layer (spec §4.3). Column names and types
//! are preserved verbatim from the source; no renames, coercion, or
//! filtering happen here.

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::csv::reader::{infer_schema_from_files, ReaderBuilder};
use datafusion::arrow::compute::concat_batches;
use datafusion::arrow::datatypes::SchemaRef;
use etl_core::ConvertError;
use std::path::Path;
use std::sync::Arc;

/// Infer a schema from one or more CSV files and read them into a single
/// batch. Transparently handles a `.gz`-suffixed source by sampling a
/// decompressed prefix for schema inference before re-reading the full
/// stream.
pub fn convert_csv(path: &Path, has_header: bool) -> Result<RecordBatch, ConvertError> {
    let is_gz = path.extension().and_then(|e| e.to_str()) == Some("gz");

    if is_gz {
        return convert_csv_gz(path, has_header);
    }

    let path_str = path.to_string_lossy().to_string();
    let schema = infer_schema_from_files(&[path_str], b',', Some(1024), has_header).map_err(|e| {
        ConvertError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    })?;

    let file = std::fs::File::open(path).map_err(|e| ConvertError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let schema = Arc::new(schema);
    let mut reader = ReaderBuilder::new(schema.clone())
        .with_header(has_header)
        .build(file)
        .map_err(|e| ConvertError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let mut batches = Vec::new();
    for batch in &mut reader {
        let batch = batch.map_err(|e| ConvertError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        batches.push(batch);
    }

    combine(path, schema, batches)
}

fn convert_csv_gz(path: &Path, has_header: bool) -> Result<RecordBatch, ConvertError> {
    let file = std::fs::File::open(path).map_err(|e| ConvertError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let decoder = flate2_decoder(file);

    // arrow's CSV reader needs a schema upfront; sample a decompressed
    // prefix into memory to infer it, then build a fresh decoder to read
    // the whole stream.
    let mut sample = Vec::new();
    {
        let mut d = flate2_decoder(std::fs::File::open(path).map_err(|e| ConvertError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?);
        std::io::Read::read_to_end(&mut d, &mut sample).map_err(|e| ConvertError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    }
    let (schema, _) = datafusion::arrow::csv::reader::Format::default()
        .with_header(has_header)
        .infer_schema(std::io::Cursor::new(&sample), Some(1024))
        .map_err(|e| ConvertError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let schema = Arc::new(schema);
    let mut reader = ReaderBuilder::new(schema.clone())
        .with_header(has_header)
        .build(decoder)
        .map_err(|e| ConvertError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let mut batches = Vec::new();
    for batch in &mut reader {
        let batch = batch.map_err(|e| ConvertError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        batches.push(batch);
    }

    combine(path, schema, batches)
}

fn flate2_decoder(file: std::fs::File) -> flate2::read::GzDecoder<std::fs::File> {
    flate2::read::GzDecoder::new(file)
}

/// A header-only (or entirely empty) file produces zero row batches from
/// the reader; that is the spec §8 "0 data rows" boundary case, not a
/// parse failure, so it returns an empty batch over the inferred schema
/// rather than erroring.
fn combine(path: &Path, schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<RecordBatch, ConvertError> {
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    concat_batches(&schema, &batches).map_err(|e| ConvertError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
