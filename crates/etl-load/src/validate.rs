//! Pre-load validation and the mandatory column reorder (spec §4.5.2,
//! §4.5.3). Pure functions over an Arrow batch and the live column list;
//! the widening round-trip through `DbControl` lives in `lib.rs` since it
//! needs network access between validation passes.

use datafusion::arrow::array::{
    Array, ArrayRef, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use etl_core::{LiveColumn, LoadError};
use std::sync::Arc;

/// Longest UTF-8 byte length of any non-null value in a string column.
/// Returns 0 for non-string columns or all-null columns.
pub fn max_string_width(batch: &RecordBatch, column: &str) -> usize {
    let Some((idx, _)) = batch.schema().column_with_name(column) else {
        return 0;
    };
    let Some(array) = batch.column(idx).as_any().downcast_ref::<StringArray>() else {
        return 0;
    };
    array.iter().flatten().map(|s| s.len()).max().unwrap_or(0)
}

/// Which variable-width columns in `batch` exceed their declared live
/// width, as `(column, observed_width)` pairs (spec §4.5.2).
pub fn overflowing_columns(batch: &RecordBatch, live: &[LiveColumn]) -> Vec<(String, usize)> {
    let mut out = Vec::new();
    for column in live {
        let Some(declared) = column.character_maximum_length else {
            continue;
        };
        let observed = max_string_width(batch, &column.column_name);
        if observed > declared as usize {
            out.push((column.column_name.clone(), observed));
        }
    }
    out
}

/// The next power-of-two at or above `at_least`, capped at `cap`.
pub fn next_width(at_least: usize, cap: u32) -> u32 {
    let mut width: u32 = 1;
    while (width as usize) < at_least && width < cap {
        width = width.saturating_mul(2);
    }
    width.min(cap)
}

fn live_type_to_arrow(data_type: &str) -> DataType {
    let lowered = data_type.to_ascii_lowercase();
    if lowered.contains("bigint") {
        DataType::Int64
    } else if lowered.contains("int") {
        DataType::Int32
    } else if lowered.contains("double") || lowered.contains("decimal") || lowered.contains("float") {
        DataType::Float64
    } else if lowered.contains("bool") {
        DataType::Boolean
    } else if lowered.contains("datetime") || lowered.contains("timestamp") {
        DataType::Timestamp(datafusion::arrow::datatypes::TimeUnit::Millisecond, None)
    } else if lowered.contains("date") {
        DataType::Date32
    } else {
        DataType::Utf8
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Int32 | DataType::Int64 | DataType::Float64)
}

/// Range-check `array` against `target` before a narrowing numeric cast
/// (spec §4.5.2 "Each numeric column is range-checked against the
/// declared type"). `datafusion::arrow::compute::cast` silently rewrites
/// an out-of-range value to null instead of rejecting it, so the check
/// must run before the cast, not rely on it.
fn check_numeric_range(array: &ArrayRef, target: &DataType, column: &str) -> Result<(), LoadError> {
    match target {
        DataType::Int32 => {
            if let Some(arr) = array.as_any().downcast_ref::<Int64Array>() {
                for (row, value) in arr.iter().enumerate() {
                    if let Some(value) = value {
                        if value < i32::MIN as i64 || value > i32::MAX as i64 {
                            return Err(LoadError::NumericOverflow {
                                column: column.to_string(),
                                row,
                                value: value.to_string(),
                            });
                        }
                    }
                }
            } else if let Some(arr) = array.as_any().downcast_ref::<Float64Array>() {
                for (row, value) in arr.iter().enumerate() {
                    if let Some(value) = value {
                        if value < i32::MIN as f64 || value > i32::MAX as f64 {
                            return Err(LoadError::NumericOverflow {
                                column: column.to_string(),
                                row,
                                value: value.to_string(),
                            });
                        }
                    }
                }
            }
        }
        DataType::Int64 => {
            if let Some(arr) = array.as_any().downcast_ref::<Float64Array>() {
                for (row, value) in arr.iter().enumerate() {
                    if let Some(value) = value {
                        if value < i64::MIN as f64 || value > i64::MAX as f64 {
                            return Err(LoadError::NumericOverflow {
                                column: column.to_string(),
                                row,
                                value: value.to_string(),
                            });
                        }
                    }
                }
            }
        }
        // Float64 is the widest numeric type this engine deals with; a
        // cast into it from Int32/Int64 can never overflow.
        _ => {}
    }
    Ok(())
}

fn null_array_of(dtype: &DataType, len: usize) -> ArrayRef {
    match dtype {
        DataType::Int32 => Arc::new(datafusion::arrow::array::Int32Array::from(vec![None; len])),
        DataType::Int64 => Arc::new(datafusion::arrow::array::Int64Array::from(vec![None; len])),
        DataType::Float64 => Arc::new(datafusion::arrow::array::Float64Array::from(vec![None::<f64>; len])),
        DataType::Boolean => Arc::new(datafusion::arrow::array::BooleanArray::from(vec![None; len])),
        DataType::Date32 => Arc::new(datafusion::arrow::array::Date32Array::from(vec![None; len])),
        _ => Arc::new(StringArray::from(vec![None::<String>; len])),
    }
}

/// Project `batch` to exactly the live schema's column list and order
/// (spec §4.5.3). Missing nullable columns are added as typed nulls;
/// missing non-nullable columns fail. Columns present in the batch but
/// absent from the live schema are dropped with a caller-visible warning
/// (logged by `lib.rs`, which knows the table name).
pub fn project_to_live_schema(batch: &RecordBatch, live: &[LiveColumn]) -> Result<(RecordBatch, Vec<String>), LoadError> {
    let mut fields = Vec::with_capacity(live.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(live.len());
    let mut dropped = Vec::new();

    for column in live {
        let dtype = live_type_to_arrow(&column.data_type);
        match batch.schema().column_with_name(&column.column_name) {
            Some((idx, field)) => {
                let array = if field.data_type() == &dtype {
                    batch.column(idx).clone()
                } else {
                    if is_numeric(field.data_type()) && is_numeric(&dtype) {
                        check_numeric_range(batch.column(idx), &dtype, &column.column_name)?;
                    }
                    datafusion::arrow::compute::cast(batch.column(idx), &dtype)
                        .map_err(|e| LoadError::SchemaDrift {
                            table: column.column_name.clone(),
                            message: e.to_string(),
                        })?
                };
                fields.push(Field::new(&column.column_name, dtype, column.is_nullable));
                columns.push(array);
            }
            None => {
                if !column.is_nullable {
                    return Err(LoadError::MissingColumn(column.column_name.clone()));
                }
                fields.push(Field::new(&column.column_name, dtype.clone(), true));
                columns.push(null_array_of(&dtype, batch.num_rows()));
            }
        }
    }

    let live_names: std::collections::HashSet<&str> =
        live.iter().map(|c| c.column_name.as_str()).collect();
    for field in batch.schema().fields() {
        if !live_names.contains(field.name().as_str()) {
            dropped.push(field.name().clone());
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let projected = RecordBatch::try_new(schema, columns).map_err(|e| LoadError::SchemaDrift {
        table: "<frame>".to_string(),
        message: e.to_string(),
    })?;
    Ok((projected, dropped))
}
