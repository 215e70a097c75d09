//! Frame abstraction passed between pipeline stages.
//!
//! `RecordBatch` alone doesn't carry enough context for logging or error
//! messages, so it's wrapped in a thin struct carrying the table name and
//! stage provenance so those don't need to be threaded separately
//! through every stage function.

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::datatypes::SchemaRef;
use std::sync::Arc;

/// A named, typed, immutable batch of rows flowing through one pipeline run.
///
/// Stages never mutate a `Frame` in place; each stage consumes one and
/// returns a new one (spec §3: "the engine treats frames as immutable
/// between stages").
#[derive(Debug, Clone)]
pub struct Frame {
    pub table: String,
    pub stage: &'static str,
    pub batch: RecordBatch,
}

impl Frame {
    pub fn new(table: impl Into<String>, stage: &'static str, batch: RecordBatch) -> Self {
        Self {
            table: table.into(),
            stage,
            batch,
        }
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Return a new frame over the same data, stamped with the next stage
    /// name, after replacing its batch.
    pub fn advance(&self, stage: &'static str, batch: RecordBatch) -> Self {
        Self {
            table: self.table.clone(),
            stage,
            batch,
        }
    }

    pub fn empty(table: impl Into<String>, stage: &'static str, schema: SchemaRef) -> Self {
        Self {
            table: table.into(),
            stage,
            batch: RecordBatch::new_empty(schema),
        }
    }
}

pub type ArrowSchemaRef = Arc<datafusion::arrow::datatypes::Schema>;
