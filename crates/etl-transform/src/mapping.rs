//! Column rename and type coercion (spec §4.4 "Column mapping"). Source
//! columns not named by the mapping are dropped; target columns absent
//! from the source are filled with their declared default or null.

use datafusion::arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, RecordBatch,
    StringArray, TimestampMillisecondArray,
};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use etl_core::{CastPolicy, ColumnMapping, TransformError};
use std::sync::Arc;

fn parse_target_type(target_type: &str) -> DataType {
    match target_type.to_ascii_lowercase().as_str() {
        "int" | "int32" | "integer" => DataType::Int32,
        "bigint" | "int64" | "long" => DataType::Int64,
        "float" | "float32" | "double" | "float64" => DataType::Float64,
        "bool" | "boolean" => DataType::Boolean,
        "date" => DataType::Date32,
        "datetime" | "timestamp" => DataType::Timestamp(TimeUnit::Millisecond, None),
        "decimal" => DataType::Float64,
        _ => DataType::Utf8,
    }
}

fn trim_string_array(array: &StringArray) -> StringArray {
    StringArray::from(
        array
            .iter()
            .map(|v| v.map(|s| s.trim().to_string()))
            .collect::<Vec<_>>(),
    )
}

fn uppercase_string_array(array: &StringArray) -> StringArray {
    StringArray::from(
        array
            .iter()
            .map(|v| v.map(|s| s.to_ascii_uppercase()))
            .collect::<Vec<_>>(),
    )
}

fn parse_dates(array: &StringArray, format: &str) -> (Vec<Option<i32>>, usize) {
    let mut failures = 0;
    let values = array
        .iter()
        .map(|v| {
            v.and_then(|s| chrono::NaiveDate::parse_from_str(s, format).ok())
                .map(|d| (d - chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()).num_days() as i32)
                .or_else(|| {
                    if v.is_some() {
                        failures += 1;
                    }
                    None
                })
        })
        .collect();
    (values, failures)
}

fn parse_timestamps(array: &StringArray, format: &str) -> (Vec<Option<i64>>, usize) {
    let mut failures = 0;
    let values = array
        .iter()
        .map(|v| {
            v.and_then(|s| chrono::NaiveDateTime::parse_from_str(s, format).ok())
                .map(|d| d.and_utc().timestamp_millis())
                .or_else(|| {
                    if v.is_some() {
                        failures += 1;
                    }
                    None
                })
        })
        .collect();
    (values, failures)
}

/// Round every non-null value of a `Float64Array` to `precision` decimal
/// places (spec §4.4 "round decimals to configured precision").
fn round_decimal_array(array: &Float64Array, precision: u32) -> Float64Array {
    let factor = 10f64.powi(precision as i32);
    Float64Array::from(
        array
            .iter()
            .map(|v| v.map(|v| (v * factor).round() / factor))
            .collect::<Vec<_>>(),
    )
}

/// Cast one already-renamed column to its declared target type, applying
/// the entry's cast policy on failure instead of propagating an Arrow
/// cast error outright (spec §4.4 "Type coercion"). When `target_type`
/// is `Float64` and `decimal_precision` is set, the cleaning rule
/// "round decimals to configured precision" runs after the cast.
fn coerce_column(
    array: &ArrayRef,
    target_type: &DataType,
    policy: CastPolicy,
    date_format: Option<&str>,
    decimal_precision: Option<u32>,
    column_name: &str,
) -> Result<ArrayRef, TransformError> {
    if let (DataType::Date32, Some(fmt)) = (target_type, date_format) {
        let strings = array
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| TransformError::TypeCastFatal {
                column: column_name.to_string(),
                message: "date coercion requires a string source column".to_string(),
            })?;
        let (values, failures) = parse_dates(strings, fmt);
        if failures > 0 && policy == CastPolicy::FlagAndKeepString {
            tracing::warn!(column = column_name, failures, "date parse failures, keeping raw strings");
            return Ok(array.clone());
        }
        return Ok(Arc::new(Date32Array::from(values)));
    }

    if let (DataType::Timestamp(TimeUnit::Millisecond, None), Some(fmt)) = (target_type, date_format) {
        let strings = array
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| TransformError::TypeCastFatal {
                column: column_name.to_string(),
                message: "timestamp coercion requires a string source column".to_string(),
            })?;
        let (values, failures) = parse_timestamps(strings, fmt);
        if failures > 0 && policy == CastPolicy::FlagAndKeepString {
            tracing::warn!(column = column_name, failures, "timestamp parse failures, keeping raw strings");
            return Ok(array.clone());
        }
        return Ok(Arc::new(TimestampMillisecondArray::from(values)));
    }

    let result = if array.data_type() == target_type {
        Ok(array.clone())
    } else {
        match cast(array, target_type) {
            Ok(casted) => Ok(casted),
            Err(e) => match policy {
                CastPolicy::Null => Ok(null_array_of(target_type, array.len())),
                CastPolicy::Zero => Ok(zero_array_of(target_type, array.len())),
                CastPolicy::FlagAndKeepString => {
                    tracing::warn!(column = column_name, error = %e, "cast failed, keeping source values as strings");
                    cast(array, &DataType::Utf8).map_err(|e2| TransformError::TypeCastFatal {
                        column: column_name.to_string(),
                        message: e2.to_string(),
                    })
                }
            },
        }
    }?;

    match (result.data_type(), decimal_precision) {
        (DataType::Float64, Some(precision)) => {
            let floats = result
                .as_any()
                .downcast_ref::<Float64Array>()
                .expect("data_type Float64 implies a Float64Array result");
            Ok(Arc::new(round_decimal_array(floats, precision)))
        }
        _ => Ok(result),
    }
}

fn null_array_of(dtype: &DataType, len: usize) -> ArrayRef {
    match dtype {
        DataType::Int32 => Arc::new(datafusion::arrow::array::Int32Array::from(vec![None; len])),
        DataType::Int64 => Arc::new(Int64Array::from(vec![None; len])),
        DataType::Float64 => Arc::new(Float64Array::from(vec![None::<f64>; len])),
        DataType::Boolean => Arc::new(BooleanArray::from(vec![None; len])),
        DataType::Date32 => Arc::new(Date32Array::from(vec![None; len])),
        DataType::Timestamp(TimeUnit::Millisecond, None) => {
            Arc::new(TimestampMillisecondArray::from(vec![None; len]))
        }
        _ => Arc::new(StringArray::from(vec![None::<String>; len])),
    }
}

fn zero_array_of(dtype: &DataType, len: usize) -> ArrayRef {
    match dtype {
        DataType::Int32 => Arc::new(datafusion::arrow::array::Int32Array::from(vec![0; len])),
        DataType::Int64 => Arc::new(Int64Array::from(vec![0; len])),
        DataType::Float64 => Arc::new(Float64Array::from(vec![0.0; len])),
        DataType::Boolean => Arc::new(BooleanArray::from(vec![false; len])),
        _ => Arc::new(StringArray::from(vec![Some(String::new()); len])),
    }
}

/// Apply a tenant's column mapping to a bronze batch: rename, coerce,
/// trim, and upper-case "code" columns, in that order.
pub fn apply_mapping(batch: &RecordBatch, mapping: &ColumnMapping) -> Result<RecordBatch, TransformError> {
    let mut fields = Vec::with_capacity(mapping.entries.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(mapping.entries.len());

    for entry in &mapping.entries {
        let target_type = parse_target_type(&entry.target_type);
        let source = batch
            .schema()
            .column_with_name(&entry.source_name)
            .map(|(idx, _)| batch.column(idx).clone());

        let mut array = match source {
            Some(col) => coerce_column(
                &col,
                &target_type,
                entry.cast_policy,
                entry.date_format.as_deref(),
                entry.decimal_precision,
                &entry.target_name,
            )?,
            None => match &entry.default {
                Some(default) => {
                    let defaults = StringArray::from(vec![default.clone(); batch.num_rows()]);
                    coerce_column(
                        &(Arc::new(defaults) as ArrayRef),
                        &target_type,
                        entry.cast_policy,
                        entry.date_format.as_deref(),
                        entry.decimal_precision,
                        &entry.target_name,
                    )?
                }
                None => null_array_of(&target_type, batch.num_rows()),
            },
        };

        if let Some(str_array) = array.as_any().downcast_ref::<StringArray>() {
            let mut transformed = str_array.clone();
            if entry.trim {
                transformed = trim_string_array(&transformed);
            }
            if entry.is_code_column {
                transformed = uppercase_string_array(&transformed);
            }
            array = Arc::new(transformed);
        }

        fields.push(Field::new(&entry.target_name, array.data_type().clone(), entry.nullable));
        columns.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, columns).map_err(|e| TransformError::TypeCastFatal {
        column: mapping.table.clone(),
        message: e.to_string(),
    })
}
