//! Tenant identity and the frozen `TenantContext` view built from it (spec
//! §3). `ConfigResolver` (in `etl-config`) is the only thing that
//! constructs a `TenantContext`; every other stage only reads one.

use crate::model::{ColumnMapping, ComputedColumnRule, RowFilterRule, TableSchema};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Which object-store flavor a tenant uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    Azure,
    S3,
    Gcs,
    MinIo,
    Local,
}

/// Which constants backend a tenant uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantsBackendKind {
    Relational,
    Document,
    SameDatabase,
}

/// Registry entry for one tenant (spec §3 `Tenant`). Defined in
/// `tenant_registry.yaml`; created manually, never mutated by the engine.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub tenant_slug: String,
    pub enabled: bool,
    pub database_name: String,
    pub provider: StorageProvider,
    pub constants_backend: ConstantsBackendKind,
    pub schedule_priority: i64,
}

/// The six filesystem roots derived for one tenant (spec §3
/// `TenantContext`: `{source_files, raw, cleaned}` under both
/// `incremental/` and `historical/` trees).
#[derive(Debug, Clone)]
pub struct TenantPaths {
    pub incremental_source_files: PathBuf,
    pub incremental_raw: PathBuf,
    pub incremental_cleaned: PathBuf,
    pub historical_source_files: PathBuf,
    pub historical_raw: PathBuf,
    pub historical_cleaned: PathBuf,
}

impl TenantPaths {
    pub fn under(root: &std::path::Path, slug: &str) -> Self {
        let tenant_root = root.join(slug);
        Self {
            incremental_source_files: tenant_root.join("incremental/source_files"),
            incremental_raw: tenant_root.join("incremental/raw"),
            incremental_cleaned: tenant_root.join("incremental/cleaned"),
            historical_source_files: tenant_root.join("historical/source_files"),
            historical_raw: tenant_root.join("historical/raw"),
            historical_cleaned: tenant_root.join("historical/cleaned"),
        }
    }

    /// Every root this tenant owns, for the "no stage writes outside this
    /// root" invariant check (spec §3 invariant 4, §8).
    pub fn all_roots(&self) -> [&std::path::Path; 6] {
        [
            &self.incremental_source_files,
            &self.incremental_raw,
            &self.incremental_cleaned,
            &self.historical_source_files,
            &self.historical_raw,
            &self.historical_cleaned,
        ]
    }
}

/// Database connection parameters resolved for one tenant.
#[derive(Debug, Clone)]
pub struct DbConnectionParams {
    pub host: String,
    pub query_port: u16,
    pub http_port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub pool_recycle_secs: u64,
}

/// Object-store credentials and container/prefix for one tenant.
#[derive(Debug, Clone)]
pub struct StorageCredentials {
    pub provider: StorageProvider,
    pub container_or_bucket: String,
    pub endpoint: Option<String>,
    pub account: Option<String>,
    pub connection_string: Option<String>,
    pub sas_token: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
}

/// Frozen, in-memory view of one tenant's identity, paths, credentials,
/// schemas, and runtime parameters (spec §3 `TenantContext`). Immutable
/// after construction; no stage may read tenant configuration except
/// through this struct (invariant 1).
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: Tenant,
    pub paths: TenantPaths,
    pub db: DbConnectionParams,
    pub storage: StorageCredentials,
    pub schemas: Vec<TableSchema>,
    pub column_mappings: HashMap<String, ColumnMapping>,
    pub computed_columns: HashMap<String, Vec<ComputedColumnRule>>,
    pub row_filters: HashMap<String, Vec<RowFilterRule>>,
    /// `tenants/<slug>/seeds/`: reference CSVs plus their `SEED_MAPPING`
    /// files, consumed by the `seed_load` entry point (spec §6.1, §6.6).
    pub seeds_dir: PathBuf,
    /// Per-table conventional PascalCase blob prefixes, declared not
    /// derived (spec §4.2 Discovery rule, Design Note §9).
    pub blob_prefixes: HashMap<String, String>,
    pub env: HashMap<String, String>,
    pub chunk_rows: usize,
    pub max_filter_ratio: f64,
    pub stream_load_timeout_secs: u64,
    pub fail_fast: bool,
    pub max_widen_cap: u32,
    pub allow_widen: bool,
}

impl TenantContext {
    pub fn slug(&self) -> &str {
        &self.tenant.tenant_slug
    }

    pub fn schema_for(&self, table: &str) -> Option<&TableSchema> {
        self.schemas.iter().find(|s| s.name == table)
    }

    pub fn mapping_for(&self, table: &str) -> Option<&ColumnMapping> {
        self.column_mappings.get(table)
    }

    pub fn computed_rules_for(&self, table: &str) -> &[ComputedColumnRule] {
        self.computed_columns
            .get(table)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn blob_prefix_for(&self, table: &str) -> Option<&str> {
        self.blob_prefixes.get(table).map(String::as_str)
    }

    pub fn row_filters_for(&self, table: &str) -> &[RowFilterRule] {
        self.row_filters.get(table).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Derive the stable 8-hex-char prefix used to namespace constants-backend
/// credentials for one tenant (Design Note §9), e.g. `BC_3607d64c_PG_URI`.
pub fn secret_prefix(tenant_id: Uuid, suffix: &str) -> String {
    let hex = tenant_id.simple().to_string();
    format!("BC_{}_{}", &hex[..8], suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_prefix_is_stable_and_short() {
        let id = Uuid::parse_str("3607d64c-0000-0000-0000-000000000000").unwrap();
        assert_eq!(secret_prefix(id, "PG_URI"), "BC_3607d64c_PG_URI");
    }

    #[test]
    fn tenant_paths_nest_under_slug() {
        let root = PathBuf::from("/data");
        let paths = TenantPaths::under(&root, "t-demo");
        for p in paths.all_roots() {
            assert!(p.starts_with("/data/t-demo"));
        }
    }
}
