//! Declarative schema, mapping, and computed-column model (spec §3).
//!
//! These are modeled as tagged enums with explicit parameter structs per
//! Design Note §9: the source material expresses them as free-form maps,
//! but a strong-typed reimplementation should not.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of database object a `TableSchema` describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
    Matview,
}

/// Declarative description of one destination table (spec §3 `TableSchema`).
///
/// `ordinal` only governs deterministic creation/drop ordering; it has no
/// bearing on runtime loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub kind: TableKind,
    pub ordinal: u32,
    pub ddl: String,
    #[serde(default)]
    pub column_comments: HashMap<String, String>,
}

/// What to do with a value that fails to cast to its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CastPolicy {
    #[default]
    Null,
    Zero,
    FlagAndKeepString,
}

/// One source-to-target column rename/coercion entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMappingEntry {
    pub source_name: String,
    pub target_name: String,
    pub target_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub cast_policy: CastPolicy,
    /// Marks this column as a "code" column for the shared "uppercase code
    /// columns" cleaning rule; scope is tenant-annotated per Design Note §9.
    #[serde(default)]
    pub is_code_column: bool,
    /// Strptime-style format string, required when `target_type` is a date
    /// or timestamp type.
    #[serde(default)]
    pub date_format: Option<String>,
    /// Decimal rounding precision, only meaningful for decimal target types.
    #[serde(default)]
    pub decimal_precision: Option<u32>,
    #[serde(default)]
    pub trim: bool,
}

fn default_true() -> bool {
    true
}

/// Ordered list of mapping entries for one table (spec §3 `ColumnMapping`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColumnMapping {
    pub table: String,
    pub entries: Vec<ColumnMappingEntry>,
}

impl ColumnMapping {
    pub fn entry_for_target(&self, target: &str) -> Option<&ColumnMappingEntry> {
        self.entries.iter().find(|e| e.target_name == target)
    }
}

/// Kind-specific parameters for a computed-column rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComputedColumnKind {
    /// Join named source columns with a separator.
    Concatenation {
        source_columns: Vec<String>,
        separator: String,
    },
    /// Evaluate a declarative arithmetic expression, e.g. `"a / NULLIF(b, 0)"`.
    Arithmetic { expression: String },
    /// Join against a small in-memory lookup table keyed by a source column.
    Lookup {
        source_column: String,
        table: HashMap<String, String>,
        #[serde(default)]
        default: Option<String>,
    },
    /// Apply a named built-in transformation function, e.g. `"upper"`.
    Transformation {
        function: String,
        source_columns: Vec<String>,
    },
}

/// One computed-column rule (spec §3 `ComputedColumnRule`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputedColumnRule {
    pub target_column: String,
    pub output_type: String,
    #[serde(flatten)]
    pub kind: ComputedColumnKind,
}

/// One tenant-declared row-level predicate, applied last in the
/// Transformer pipeline so it may reference computed columns (spec §4.4
/// step 4). `expression` is a SQL boolean expression evaluated against the
/// frame, e.g. `material_type IN ('A', 'B')` or `order_date >= '2023-04-01'`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFilterRule {
    pub expression: String,
}

/// A contiguous row range within a cleaned frame (spec §3 `ChunkDescriptor`).
#[derive(Debug, Clone, Copy)]
pub struct ChunkDescriptor {
    pub start: usize,
    pub end: usize,
    pub ordinal: usize,
}

impl ChunkDescriptor {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Status of one table within a job (spec §6.6 `JobOutcome`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub status: String,
    pub rows_loaded: u64,
    pub rows_filtered: u64,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    /// Machine-checkable error kind for failures that callers must branch
    /// on (e.g. `"TruncateFailed"`), distinct from `status`'s generic
    /// `Failed(<stage>)` label. `None` on success or for failures the job
    /// runner doesn't need to distinguish further (spec §7 job-abort
    /// rules require telling a failed truncate apart from a failed
    /// stream-load chunk, both of which fail at the `Load` stage).
    #[serde(default)]
    pub error_kind: Option<String>,
}

/// Aggregated result across all tables of one job invocation for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobOutcome {
    pub per_table: HashMap<String, StageOutcome>,
}

impl JobOutcome {
    /// A job is successful iff every table status is Success or
    /// PartialSuccess within the configured filter-ratio tolerance.
    pub fn is_success(&self) -> bool {
        self.per_table
            .values()
            .all(|o| o.status == "Success" || o.status == "PartialSuccess")
    }

    pub fn is_partial(&self) -> bool {
        !self.is_success() && self.per_table.values().any(|o| o.status == "Success")
    }
}

/// Outcome of a `seed_load` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeedOutcome {
    pub per_file: HashMap<String, StageOutcome>,
}

/// The state a table's pipeline run is currently in (spec §4.6 state
/// machine). `Failed` carries the stage it failed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStage {
    Discovered,
    Downloaded,
    Converted,
    Transformed,
    Validated,
    Loaded,
    Failed(&'static str),
}
