//! Computed-column evaluation (spec §4.4 "Computed columns"). Rules are
//! ordered by a dependency graph before evaluation so a rule that
//! references another computed column's output sees it already populated;
//! a cycle is rejected at config-load time (see `etl-config`), but this
//! module re-validates defensively since it is the one actually walking
//! the order.
//!
//! Arithmetic rules register the batch with a DataFusion `SessionContext`
//! and run a generated `SELECT ... AS target FROM batch` rather than
//! hand-writing an
//! expression evaluator.

use datafusion::arrow::array::{ArrayRef, RecordBatch, StringArray};
use datafusion::arrow::datatypes::{Field, Schema};
use datafusion::prelude::SessionContext;
use etl_core::{ComputedColumnKind, ComputedColumnRule, TransformError};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

fn referenced_columns(kind: &ComputedColumnKind) -> Vec<&str> {
    match kind {
        ComputedColumnKind::Concatenation { source_columns, .. } => {
            source_columns.iter().map(|s| s.as_str()).collect()
        }
        ComputedColumnKind::Arithmetic { expression } => {
            // best-effort: arithmetic expressions reference bare identifiers;
            // exact column resolution happens inside DataFusion at eval time,
            // this is only used to build the ordering graph.
            expression
                .split(|c: char| !c.is_alphanumeric() && c != '_')
                .filter(|tok| !tok.is_empty() && !tok.chars().next().unwrap().is_numeric())
                .collect()
        }
        ComputedColumnKind::Lookup { source_column, .. } => vec![source_column.as_str()],
        ComputedColumnKind::Transformation { source_columns, .. } => {
            source_columns.iter().map(|s| s.as_str()).collect()
        }
    }
}

/// Order rules so that a rule depending on another rule's target column
/// runs after it. Returns an error if the dependency graph has a cycle.
fn order_rules(rules: &[ComputedColumnRule]) -> Result<Vec<usize>, TransformError> {
    let mut graph = DiGraph::<usize, ()>::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for (i, rule) in rules.iter().enumerate() {
        let idx = graph.add_node(i);
        nodes.insert(rule.target_column.as_str(), idx);
    }

    for (i, rule) in rules.iter().enumerate() {
        let this_idx = nodes[rule.target_column.as_str()];
        for dep in referenced_columns(&rule.kind) {
            if let Some(&dep_idx) = nodes.get(dep) {
                if dep_idx != this_idx {
                    graph.add_edge(dep_idx, this_idx, ());
                }
            }
        }
    }

    toposort(&graph, None)
        .map(|order| order.into_iter().map(|idx| graph[idx]).collect())
        .map_err(|cycle| {
            let node = cycle.node_id();
            TransformError::ComputedRuleCycle(vec![rules[graph[node]].target_column.clone()])
        })
}

fn concatenate(batch: &RecordBatch, source_columns: &[String], separator: &str) -> Result<ArrayRef, TransformError> {
    let mut columns = Vec::with_capacity(source_columns.len());
    for name in source_columns {
        let (idx, _) = batch
            .schema()
            .column_with_name(name)
            .ok_or_else(|| TransformError::MissingMapping(name.clone()))?;
        columns.push(batch.column(idx).clone());
    }

    let num_rows = batch.num_rows();
    let mut out = Vec::with_capacity(num_rows);
    for row in 0..num_rows {
        let mut parts = Vec::with_capacity(columns.len());
        let mut all_null = true;
        for col in &columns {
            let value = datafusion::arrow::util::display::array_value_to_string(col, row)
                .unwrap_or_default();
            if !col.is_null(row) {
                all_null = false;
            }
            parts.push(value);
        }
        out.push(if all_null { None } else { Some(parts.join(separator)) });
    }
    Ok(Arc::new(StringArray::from(out)))
}

fn lookup(batch: &RecordBatch, source_column: &str, table: &HashMap<String, String>, default: Option<&str>) -> Result<ArrayRef, TransformError> {
    let (idx, _) = batch
        .schema()
        .column_with_name(source_column)
        .ok_or_else(|| TransformError::MissingMapping(source_column.to_string()))?;
    let col = batch.column(idx);

    let num_rows = batch.num_rows();
    let mut out = Vec::with_capacity(num_rows);
    for row in 0..num_rows {
        if col.is_null(row) {
            out.push(default.map(|s| s.to_string()));
            continue;
        }
        let key = datafusion::arrow::util::display::array_value_to_string(col, row).unwrap_or_default();
        out.push(table.get(&key).cloned().or_else(|| default.map(|s| s.to_string())));
    }
    Ok(Arc::new(StringArray::from(out)))
}

fn transformation(batch: &RecordBatch, function: &str, source_columns: &[String]) -> Result<ArrayRef, TransformError> {
    let name = source_columns
        .first()
        .ok_or_else(|| TransformError::FilterInvalid("transformation rule needs at least one source column".to_string()))?;
    let (idx, _) = batch
        .schema()
        .column_with_name(name)
        .ok_or_else(|| TransformError::MissingMapping(name.clone()))?;
    let col = batch.column(idx);

    let num_rows = batch.num_rows();
    let mut out = Vec::with_capacity(num_rows);
    for row in 0..num_rows {
        if col.is_null(row) {
            out.push(None);
            continue;
        }
        let value = datafusion::arrow::util::display::array_value_to_string(col, row).unwrap_or_default();
        let transformed = match function {
            "upper" => value.to_uppercase(),
            "lower" => value.to_lowercase(),
            "trim" => value.trim().to_string(),
            other => {
                return Err(TransformError::FilterInvalid(format!(
                    "unknown transformation function: {other}"
                )))
            }
        };
        out.push(Some(transformed));
    }
    Ok(Arc::new(StringArray::from(out)))
}

async fn arithmetic(batch: &RecordBatch, expression: &str, target: &str) -> Result<ArrayRef, TransformError> {
    let ctx = SessionContext::new();
    ctx.register_batch("rows", batch.clone())
        .map_err(|e| TransformError::FilterInvalid(e.to_string()))?;

    let sql = format!("SELECT ({expression}) AS {target} FROM rows");
    let df = ctx.sql(&sql).await.map_err(|e| TransformError::FilterInvalid(e.to_string()))?;
    let results = df.collect().await.map_err(|e| TransformError::FilterInvalid(e.to_string()))?;

    if results.is_empty() {
        return Ok(Arc::new(StringArray::from(Vec::<Option<String>>::new())));
    }
    Ok(results[0].column(0).clone())
}

/// Evaluate every computed-column rule against `batch` in dependency
/// order, appending each result as a new column.
pub async fn apply_computed_columns(
    batch: &RecordBatch,
    rules: &[ComputedColumnRule],
) -> Result<RecordBatch, TransformError> {
    if rules.is_empty() {
        return Ok(batch.clone());
    }

    let order = order_rules(rules)?;
    let mut fields = batch.schema().fields().iter().map(|f| f.as_ref().clone()).collect::<Vec<_>>();
    let mut columns = batch.columns().to_vec();
    let mut working = batch.clone();

    for i in order {
        let rule = &rules[i];
        let array = match &rule.kind {
            ComputedColumnKind::Concatenation { source_columns, separator } => {
                concatenate(&working, source_columns, separator)?
            }
            ComputedColumnKind::Arithmetic { expression } => {
                arithmetic(&working, expression, &rule.target_column).await?
            }
            ComputedColumnKind::Lookup { source_column, table, default } => {
                lookup(&working, source_column, table, default.as_deref())?
            }
            ComputedColumnKind::Transformation { function, source_columns } => {
                transformation(&working, function, source_columns)?
            }
        };

        fields.push(Field::new(&rule.target_column, array.data_type().clone(), true));
        columns.push(array);
        let schema = Arc::new(Schema::new(fields.clone()));
        working = RecordBatch::try_new(schema, columns.clone()).map_err(|e| {
            TransformError::TypeCastFatal {
                column: rule.target_column.clone(),
                message: e.to_string(),
            }
        })?;
    }

    Ok(working)
}
