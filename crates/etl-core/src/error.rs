//! Error taxonomy for the engine, one `thiserror` enum per component (see
//! spec §7). Every kind knows whether it is retryable so `etl-runtime`'s
//! classifier can stay a single `match` per error type instead of scattered
//! call-site logic.

use thiserror::Error;

/// Errors raised while resolving a tenant's layered configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tenant config is missing a required field: {0}")]
    InvalidTenant(String),

    #[error("failed to parse {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("unsupported storage provider: {0}")]
    UnsupportedProvider(String),

    #[error("secret-looking key `{key}` found in YAML config at {path}; secrets must live in .env")]
    SecretInYaml { path: String, key: String },

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    /// Computed-column dependency graph has a cycle. Caught at config-load
    /// time so the pipeline never performs file I/O for a table whose
    /// rules can't be ordered (spec §8).
    #[error("computed column rules for {table} contain a cycle: {columns:?}")]
    ComputedRuleCycle { table: String, columns: Vec<String> },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Errors raised while listing blobs for a table/partition.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to list blobs under prefix {prefix}: {message}")]
    ListFailed { prefix: String, message: String },

    #[error("authentication failed for provider: {0}")]
    AuthFailed(String),

    #[error("prefix not found: {0}")]
    PrefixNotFound(String),
}

impl DiscoveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DiscoveryError::ListFailed { .. })
    }
}

/// Errors raised while downloading a single blob.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("transient error downloading {blob}: {message}")]
    Transient { blob: String, message: String },

    #[error("permanent error downloading {blob}: {message}")]
    Permanent { blob: String, message: String },

    #[error("integrity check failed for {blob}: expected {expected} bytes, wrote {actual}")]
    Integrity {
        blob: String,
        expected: u64,
        actual: u64,
    },

    #[error("download of {0} timed out")]
    Timeout(String),
}

impl DownloadError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadError::Transient { .. } | DownloadError::Timeout(_)
        )
    }
}

/// Errors raised while converting a source file to the bronze layer.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to parse {path}: {message}")]
    ParseError { path: String, message: String },
}

impl ConvertError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Errors raised while transforming bronze into silver.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("column mapping references an unknown target column: {0}")]
    MissingMapping(String),

    #[error("computed column rules contain a cycle: {0:?}")]
    ComputedRuleCycle(Vec<String>),

    #[error("filter predicate is invalid: {0}")]
    FilterInvalid(String),

    #[error("type cast for column {column} is fatal: {message}")]
    TypeCastFatal { column: String, message: String },
}

impl TransformError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Errors raised by the Validator/BulkLoader.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("non-nullable column {0} is missing from the frame")]
    MissingColumn(String),

    #[error("column {column} exceeds declared width ({declared}) and widening is disabled or capped")]
    Overflow { column: String, declared: usize },

    #[error("numeric overflow in column {column} at row {row}: value {value}")]
    NumericOverflow {
        column: String,
        row: usize,
        value: String,
    },

    #[error("live schema for {table} drifted from the frame: {message}")]
    SchemaDrift { table: String, message: String },

    #[error("stream load failed for chunk {chunk} of {table}: {message}")]
    StreamLoadFail {
        table: String,
        chunk: usize,
        message: String,
    },

    #[error("stream load timed out for chunk {chunk} of {table}")]
    StreamLoadTimeout { table: String, chunk: usize },

    #[error("truncate failed for table {0}")]
    TruncateFailed(String),
}

impl LoadError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoadError::StreamLoadTimeout { .. } | LoadError::StreamLoadFail { .. }
        )
    }
}

/// Unexpected, always-fatal errors (invariant violations, bugs).
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InternalError {
    pub fn is_retryable(&self) -> bool {
        false
    }
}
