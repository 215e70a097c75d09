//! # etl-convert — source decoding into the canonical columnar bronze layer
//!
//! Dispatches a downloaded source file to the right decoder by suffix (CSV,
//! `.xlsx`, or pass-through Parquet) and writes the result back out as a
//! bronze-layer Parquet file under `raw/` (spec §4.3). The bronze suffix is
//! always Parquet, singular `raw_parquet`, per Design Note §9.
//!
//! Column names and values are carried through unchanged here; renaming,
//! type coercion, and computed columns are `etl-transform`'s job.

pub mod csv;
pub mod excel;
pub mod parquet;

use datafusion::arrow::array::RecordBatch;
use datafusion::parquet::arrow::ArrowWriter;
use etl_core::{ConvertError, Frame};
use std::path::{Path, PathBuf};
use tracing::info;

/// Per-conversion tunables a tenant's column mapping or source config may
/// set (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub has_header: bool,
    pub sheet_name: Option<String>,
}

/// Decode `source_path` into an Arrow [`RecordBatch`] based on its
/// extension, without touching the filesystem beyond reading it.
pub fn decode(source_path: &Path, options: &ConvertOptions) -> Result<RecordBatch, ConvertError> {
    let ext = source_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => csv::convert_csv(source_path, options.has_header),
        "xlsx" => excel::convert_excel(source_path, options.sheet_name.as_deref()),
        "parquet" => parquet::convert_parquet(source_path),
        other => Err(ConvertError::UnsupportedFormat(other.to_string())),
    }
}

/// Write `batch` atomically to `raw_dir/<bronze_name>.parquet`: buffer to
/// `<name>.parquet.part`, fsync, then rename (same atomic-write contract
/// as blob downloads, spec §8).
fn write_bronze_file(raw_dir: &Path, bronze_name: &str, batch: &RecordBatch) -> Result<PathBuf, ConvertError> {
    std::fs::create_dir_all(raw_dir).map_err(|e| ConvertError::ParseError {
        path: raw_dir.display().to_string(),
        message: e.to_string(),
    })?;
    let final_path = raw_dir.join(format!("{bronze_name}.parquet"));
    let part_path = raw_dir.join(format!("{bronze_name}.parquet.part"));

    let file = std::fs::File::create(&part_path).map_err(|e| ConvertError::ParseError {
        path: part_path.display().to_string(),
        message: e.to_string(),
    })?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).map_err(|e| ConvertError::ParseError {
        path: part_path.display().to_string(),
        message: e.to_string(),
    })?;
    writer.write(batch).map_err(|e| ConvertError::ParseError {
        path: part_path.display().to_string(),
        message: e.to_string(),
    })?;
    let inner = writer.into_inner().map_err(|e| ConvertError::ParseError {
        path: part_path.display().to_string(),
        message: e.to_string(),
    })?;
    inner.sync_all().map_err(|e| ConvertError::ParseError {
        path: part_path.display().to_string(),
        message: e.to_string(),
    })?;

    std::fs::rename(&part_path, &final_path).map_err(|e| ConvertError::ParseError {
        path: final_path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(final_path)
}

/// Decode `source_path` and land it in the bronze layer as a [`Frame`],
/// returning the frame and the path it was written to.
pub fn convert_to_bronze(
    source_path: &Path,
    table: &str,
    bronze_name: &str,
    raw_dir: &Path,
    options: &ConvertOptions,
) -> Result<(Frame, PathBuf), ConvertError> {
    let batch = decode(source_path, options)?;
    let written = write_bronze_file(raw_dir, bronze_name, &batch)?;
    info!(
        table,
        rows = batch.num_rows(),
        path = %written.display(),
        "converted source file to bronze"
    );
    Ok((Frame::new(table, "bronze", batch), written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_round_trips_through_bronze() {
        let src_dir = tempfile::tempdir().unwrap();
        let raw_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("part-0.csv");
        let mut f = std::fs::File::create(&src_path).unwrap();
        writeln!(f, "a,b").unwrap();
        writeln!(f, "1,hello").unwrap();
        writeln!(f, "2,world").unwrap();
        drop(f);

        let (frame, written) = convert_to_bronze(
            &src_path,
            "dim_thing",
            "part-0",
            raw_dir.path(),
            &ConvertOptions {
                has_header: true,
                sheet_name: None,
            },
        )
        .unwrap();

        assert_eq!(frame.num_rows(), 2);
        assert_eq!(frame.num_columns(), 2);
        assert!(written.is_file());
        assert!(!raw_dir.path().join("part-0.parquet.part").exists());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part-0.txt");
        std::fs::write(&path, b"nope").unwrap();
        let err = decode(&path, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat(ref s) if s == "txt"));
    }

    #[test]
    fn parquet_passthrough_preserves_row_count() {
        use datafusion::arrow::array::Int64Array;
        use datafusion::arrow::datatypes::{DataType, Field, Schema};
        use std::sync::Arc;

        let raw_dir = tempfile::tempdir().unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema.clone(), vec![Arc::new(Int64Array::from(vec![1, 2, 3]))]).unwrap();
        let src_path = write_bronze_file(raw_dir.path(), "seed-source", &batch).unwrap();
        let renamed = raw_dir.path().join("seed-source.parquet_src.parquet");
        std::fs::rename(&src_path, &renamed).unwrap();

        let decoded = parquet::convert_parquet(&renamed).unwrap();
        assert_eq!(decoded.num_rows(), 3);
    }
}
