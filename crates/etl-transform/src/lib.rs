//! # etl-transform — bronze to silver
//!
//! Drives the four-step Transformer pipeline in the fixed order the spec
//! requires: column mapping, type coercion (folded into mapping), computed
//! columns, then row-level filters (spec §4.4). Emits one summary per
//! table rather than per-column or per-row logging.

pub mod computed;
pub mod filter;
pub mod mapping;

use etl_core::{ColumnMapping, ComputedColumnRule, Frame, RowFilterRule, TransformError};
use tracing::info;

/// Observable counts for one table's pass through the Transformer (spec
/// §4.4 "Observable outputs").
#[derive(Debug, Clone, Default)]
pub struct TransformStats {
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_renamed: usize,
    pub columns_added: usize,
    pub columns_dropped: usize,
    pub rows_filtered: usize,
}

fn mapping_stats(bronze: &Frame, mapping: &ColumnMapping) -> (usize, usize, usize) {
    let source_names = bronze.column_names();
    let mut renamed = 0;
    let mut added = 0;
    for entry in &mapping.entries {
        if source_names.iter().any(|n| n == &entry.source_name) {
            renamed += 1;
        } else {
            added += 1;
        }
    }
    let mapped_sources: std::collections::HashSet<&str> =
        mapping.entries.iter().map(|e| e.source_name.as_str()).collect();
    let dropped = source_names.iter().filter(|n| !mapped_sources.contains(n.as_str())).count();
    (renamed, added, dropped)
}

/// Run one table's bronze frame through mapping, computed columns, and row
/// filters, producing the silver frame the Validator consumes.
pub async fn transform_to_silver(
    bronze: &Frame,
    mapping: &ColumnMapping,
    computed_rules: &[ComputedColumnRule],
    row_filters: &[RowFilterRule],
) -> Result<(Frame, TransformStats), TransformError> {
    let mut stats = TransformStats {
        rows_before: bronze.num_rows(),
        ..Default::default()
    };
    let (renamed, added, dropped) = mapping_stats(bronze, mapping);
    stats.columns_renamed = renamed;
    stats.columns_added = added;
    stats.columns_dropped = dropped;

    let mapped = mapping::apply_mapping(&bronze.batch, mapping)?;
    let computed = computed::apply_computed_columns(&mapped, computed_rules).await?;
    let outcome = filter::apply_row_filters(&computed, row_filters).await?;

    stats.rows_after = outcome.batch.num_rows();
    stats.rows_filtered = outcome.rows_dropped;

    info!(
        table = bronze.table.as_str(),
        rows_before = stats.rows_before,
        rows_after = stats.rows_after,
        renamed,
        added,
        dropped,
        rows_filtered = stats.rows_filtered,
        "transformed bronze to silver"
    );

    Ok((bronze.advance("silver", outcome.batch), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::{Int64Array, RecordBatch, StringArray};
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use etl_core::{CastPolicy, ColumnMappingEntry, ComputedColumnKind};
    use std::sync::Arc;

    fn sample_bronze() -> Frame {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Dealer_ID", DataType::Utf8, true),
            Field::new("amount", DataType::Int64, true),
            Field::new("material_type", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["d1", "d2", "d3"])),
                Arc::new(Int64Array::from(vec![10, 20, 30])),
                Arc::new(StringArray::from(vec!["A", "B", "A"])),
            ],
        )
        .unwrap();
        Frame::new("dim_dealer", "bronze", batch)
    }

    #[tokio::test]
    async fn mapping_then_filter_drops_non_matching_rows() {
        let bronze = sample_bronze();
        let mapping = ColumnMapping {
            table: "dim_dealer".to_string(),
            entries: vec![
                ColumnMappingEntry {
                    source_name: "Dealer_ID".to_string(),
                    target_name: "dealer_id".to_string(),
                    target_type: "string".to_string(),
                    nullable: true,
                    default: None,
                    cast_policy: CastPolicy::Null,
                    is_code_column: true,
                    date_format: None,
                    decimal_precision: None,
                    trim: true,
                },
                ColumnMappingEntry {
                    source_name: "amount".to_string(),
                    target_name: "amount".to_string(),
                    target_type: "bigint".to_string(),
                    nullable: true,
                    default: None,
                    cast_policy: CastPolicy::Null,
                    is_code_column: false,
                    date_format: None,
                    decimal_precision: None,
                    trim: false,
                },
                ColumnMappingEntry {
                    source_name: "material_type".to_string(),
                    target_name: "material_type".to_string(),
                    target_type: "string".to_string(),
                    nullable: true,
                    default: None,
                    cast_policy: CastPolicy::Null,
                    is_code_column: false,
                    date_format: None,
                    decimal_precision: None,
                    trim: false,
                },
            ],
        };
        let filters = vec![RowFilterRule {
            expression: "material_type = 'A'".to_string(),
        }];

        let (silver, stats) = transform_to_silver(&bronze, &mapping, &[], &filters).await.unwrap();
        assert_eq!(stats.rows_before, 3);
        assert_eq!(silver.num_rows(), 2);
        assert_eq!(stats.rows_filtered, 1);
    }

    #[tokio::test]
    async fn computed_concatenation_runs_before_filters() {
        let bronze = sample_bronze();
        let mapping = ColumnMapping {
            table: "dim_dealer".to_string(),
            entries: vec![ColumnMappingEntry {
                source_name: "Dealer_ID".to_string(),
                target_name: "dealer_id".to_string(),
                target_type: "string".to_string(),
                nullable: true,
                default: None,
                cast_policy: CastPolicy::Null,
                is_code_column: false,
                date_format: None,
                decimal_precision: None,
                trim: false,
            }],
        };
        let rules = vec![etl_core::ComputedColumnRule {
            target_column: "dealer_label".to_string(),
            output_type: "string".to_string(),
            kind: ComputedColumnKind::Concatenation {
                source_columns: vec!["dealer_id".to_string()],
                separator: "-".to_string(),
            },
        }];
        let filters = vec![RowFilterRule {
            expression: "dealer_label = 'd1'".to_string(),
        }];

        let (silver, stats) = transform_to_silver(&bronze, &mapping, &rules, &filters).await.unwrap();
        assert_eq!(silver.num_rows(), 1);
        assert_eq!(stats.rows_filtered, 2);
    }
}
