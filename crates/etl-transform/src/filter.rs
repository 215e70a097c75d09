//! Row-level filters (spec §4.4 step 4), applied last so predicates can
//! reference computed columns. Each predicate is a SQL boolean expression
//! evaluated with DataFusion, same approach as the arithmetic computed
//! column kind.

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::compute::filter_record_batch;
use datafusion::prelude::SessionContext;
use etl_core::{RowFilterRule, TransformError};

/// Result of applying a table's row filters: the surviving rows and how
/// many were dropped, for the Transformer's "filter-dropped rows" count.
pub struct FilterOutcome {
    pub batch: RecordBatch,
    pub rows_dropped: usize,
}

/// Apply every rule's predicate as an `AND`-ed `WHERE` clause in one pass.
pub async fn apply_row_filters(
    batch: &RecordBatch,
    rules: &[RowFilterRule],
) -> Result<FilterOutcome, TransformError> {
    if rules.is_empty() {
        return Ok(FilterOutcome {
            batch: batch.clone(),
            rows_dropped: 0,
        });
    }

    let predicate = rules
        .iter()
        .map(|r| format!("({})", r.expression))
        .collect::<Vec<_>>()
        .join(" AND ");

    let ctx = SessionContext::new();
    ctx.register_batch("rows", batch.clone())
        .map_err(|e| TransformError::FilterInvalid(e.to_string()))?;

    let sql = format!("SELECT ({predicate}) AS __keep FROM rows");
    let df = ctx.sql(&sql).await.map_err(|e| TransformError::FilterInvalid(e.to_string()))?;
    let results = df.collect().await.map_err(|e| TransformError::FilterInvalid(e.to_string()))?;

    let mask = results
        .first()
        .map(|b| b.column(0).clone())
        .ok_or_else(|| TransformError::FilterInvalid("filter predicate produced no output".to_string()))?;
    let mask = mask
        .as_any()
        .downcast_ref::<datafusion::arrow::array::BooleanArray>()
        .ok_or_else(|| TransformError::FilterInvalid("filter predicate did not evaluate to boolean".to_string()))?
        .clone();

    let kept = mask.iter().filter(|v| v.unwrap_or(false)).count();
    let dropped = batch.num_rows() - kept;

    let filtered = filter_record_batch(batch, &mask).map_err(|e| TransformError::FilterInvalid(e.to_string()))?;
    Ok(FilterOutcome {
        batch: filtered,
        rows_dropped: dropped,
    })
}
