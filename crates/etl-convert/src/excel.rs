//! Excel (.xlsx) ingestion into the bronze layer, using `calamine` to read
//! worksheet cells and inferring an Arrow schema column-by-column.

use calamine::{open_workbook, Data, Reader, Xlsx};
use datafusion::arrow::array::{
    BooleanArray, Float64Array, RecordBatch, StringArray, TimestampMillisecondArray,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use etl_core::ConvertError;
use std::path::Path;
use std::sync::Arc;

/// Infer a single Arrow [`DataType`] for a worksheet column from the
/// calamine cell kinds observed in its data rows. Falls back to `Utf8`
/// the moment a column mixes types, matching the CSV path's
/// header-then-infer behavior rather than failing the whole sheet.
fn infer_column_type(rows: &[&[Data]], col: usize) -> DataType {
    let mut seen_float = false;
    let mut seen_bool = false;
    let mut seen_datetime = false;
    let mut seen_string = false;

    for row in rows {
        match row.get(col) {
            Some(Data::Float(_)) | Some(Data::Int(_)) => seen_float = true,
            Some(Data::Bool(_)) => seen_bool = true,
            Some(Data::DateTime(_)) => seen_datetime = true,
            Some(Data::String(_)) => seen_string = true,
            Some(Data::Empty) | None => {}
            Some(Data::Error(_)) => seen_string = true,
            Some(Data::DateTimeIso(_)) | Some(Data::DurationIso(_)) => seen_string = true,
        }
    }

    match (seen_string, seen_datetime, seen_bool, seen_float) {
        (false, true, false, false) => DataType::Timestamp(TimeUnit::Millisecond, None),
        (false, false, true, false) => DataType::Boolean,
        (false, false, false, true) => DataType::Float64,
        (false, false, false, false) => DataType::Utf8,
        _ => DataType::Utf8,
    }
}

fn cell_as_string(cell: Option<&Data>) -> Option<String> {
    match cell {
        None | Some(Data::Empty) => None,
        Some(Data::String(s)) => Some(s.clone()),
        Some(Data::Float(f)) => Some(f.to_string()),
        Some(Data::Int(i)) => Some(i.to_string()),
        Some(Data::Bool(b)) => Some(b.to_string()),
        Some(Data::DateTime(d)) => Some(d.to_string()),
        Some(Data::DateTimeIso(s)) | Some(Data::DurationIso(s)) => Some(s.clone()),
        Some(Data::Error(e)) => Some(format!("{e:?}")),
    }
}

/// Read the named sheet (or the first sheet when `sheet_name` is `None`)
/// of an `.xlsx` workbook into a single [`RecordBatch`], treating the
/// first row as the header.
pub fn convert_excel(path: &Path, sheet_name: Option<&str>) -> Result<RecordBatch, ConvertError> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| ConvertError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let sheet = match sheet_name {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ConvertError::ParseError {
                path: path.display().to_string(),
                message: "workbook has no sheets".to_string(),
            })?,
    };

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| ConvertError::ParseError {
            path: path.display().to_string(),
            message: format!("sheet `{sheet}`: {e}"),
        })?;

    let mut rows = range.rows();
    let header = rows.next().ok_or_else(|| ConvertError::ParseError {
        path: path.display().to_string(),
        message: format!("sheet `{sheet}` is empty"),
    })?;
    let headers: Vec<String> = header.iter().map(|c| cell_as_string(Some(c)).unwrap_or_default()).collect();
    let data_rows: Vec<&[Data]> = rows.collect();

    let mut fields = Vec::with_capacity(headers.len());
    let mut columns: Vec<Arc<dyn datafusion::arrow::array::Array>> = Vec::with_capacity(headers.len());

    for (col, name) in headers.iter().enumerate() {
        let dtype = infer_column_type(&data_rows, col);
        fields.push(Field::new(name, dtype.clone(), true));

        let array: Arc<dyn datafusion::arrow::array::Array> = match dtype {
            DataType::Float64 => {
                let values: Vec<Option<f64>> = data_rows
                    .iter()
                    .map(|r| match r.get(col) {
                        Some(Data::Float(f)) => Some(*f),
                        Some(Data::Int(i)) => Some(*i as f64),
                        _ => None,
                    })
                    .collect();
                Arc::new(Float64Array::from(values))
            }
            DataType::Boolean => {
                let values: Vec<Option<bool>> = data_rows
                    .iter()
                    .map(|r| match r.get(col) {
                        Some(Data::Bool(b)) => Some(*b),
                        _ => None,
                    })
                    .collect();
                Arc::new(BooleanArray::from(values))
            }
            DataType::Timestamp(TimeUnit::Millisecond, None) => {
                let values: Vec<Option<i64>> = data_rows
                    .iter()
                    .map(|r| match r.get(col) {
                        Some(Data::DateTime(d)) => d.as_datetime().map(|dt| dt.and_utc().timestamp_millis()),
                        _ => None,
                    })
                    .collect();
                Arc::new(TimestampMillisecondArray::from(values))
            }
            _ => {
                let values: Vec<Option<String>> =
                    data_rows.iter().map(|r| cell_as_string(r.get(col))).collect();
                Arc::new(StringArray::from(values))
            }
        };
        columns.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, columns).map_err(|e| ConvertError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
