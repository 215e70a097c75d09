//! Database control plane and bulk-load interfaces the engine consumes
//! (spec §6.3, §6.4). Concrete implementations (sqlx over MySQL wire
//! protocol, reqwest Stream Load PUT) live in `etl-load`.

use crate::error::LoadError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One column as reported by `DESCRIBE <table>` / `information_schema`.
/// This is the single source of truth for column order and width
/// (spec §4.5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub ordinal_position: u32,
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub character_maximum_length: Option<u32>,
}

/// The SQL control interface the engine consumes (spec §6.3).
#[async_trait]
pub trait DbControl: Send + Sync {
    async fn show_databases(&self) -> Result<Vec<String>, LoadError>;

    async fn describe_table(&self, database: &str, table: &str) -> Result<Vec<LiveColumn>, LoadError>;

    async fn truncate_table(&self, database: &str, table: &str) -> Result<(), LoadError>;

    async fn execute_ddl(&self, ddl: &str) -> Result<(), LoadError>;

    /// Widen a `varchar` column, typically to the next power-of-two.
    async fn alter_widen_column(
        &self,
        database: &str,
        table: &str,
        column: &str,
        new_width: u32,
    ) -> Result<(), LoadError>;

    async fn insert_rows(&self, database: &str, table: &str, sql: &str) -> Result<u64, LoadError>;

    async fn count_rows(&self, database: &str, table: &str) -> Result<u64, LoadError>;
}

/// Outcome status of one Stream Load chunk (spec §6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStatus {
    Success,
    Failure,
    PartialSuccess,
}

/// Per-bulk-load outcome (spec §3 `LoadResult`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResult {
    pub status: LoadStatus,
    pub rows_loaded: u64,
    pub rows_filtered: u64,
    pub rows_unselected: u64,
    pub error_url: Option<String>,
    pub message: String,
}

/// Everything one Stream Load PUT needs that isn't the payload body.
#[derive(Debug, Clone)]
pub struct StreamLoadRequest {
    pub database: String,
    pub table: String,
    pub label: String,
    pub column_separator: char,
    pub row_delimiter: char,
    pub max_filter_ratio: f64,
    pub strict_mode: bool,
    pub timeout_secs: u64,
    /// Explicit `columns=` header; the spec's defense against positional
    /// binding hazards (Design Note §9). Always set by `etl-load`.
    pub columns: Vec<String>,
}

/// The bulk-load HTTP endpoint the engine consumes (spec §6.4).
#[async_trait]
pub trait StreamLoadClient: Send + Sync {
    async fn load_chunk(
        &self,
        request: &StreamLoadRequest,
        payload: Bytes,
    ) -> Result<LoadResult, LoadError>;
}
