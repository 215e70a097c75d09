//! `ConfigResolver`: produces a `TenantContext` from on-disk configuration
//! (spec §4.1).

use crate::dotenv;
use crate::merge::{deep_merge, interpolate_tenant_slug, merge_under_key};
use crate::registry;
use crate::schemas::{load_column_mappings, load_computed_columns, load_row_filters, load_schemas};
use crate::secrets::reject_secrets;
use etl_core::tenant::{DbConnectionParams, StorageCredentials, TenantPaths};
use etl_core::{ConfigError, Tenant, TenantContext};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct DatabaseSection {
    name: Option<String>,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_query_port")]
    query_port: u16,
    #[serde(default = "default_http_port")]
    http_port: u16,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_query_port() -> u16 {
    9030
}
fn default_http_port() -> u16 {
    8030
}

#[derive(Debug, Deserialize, Default)]
struct ConnectionPoolSection {
    #[serde(default = "default_pool_min")]
    min: u32,
    #[serde(default = "default_pool_max")]
    max: u32,
    #[serde(default = "default_recycle_secs")]
    recycle_secs: u64,
}

fn default_pool_min() -> u32 {
    1
}
fn default_pool_max() -> u32 {
    10
}
fn default_recycle_secs() -> u64 {
    1800
}

#[derive(Debug, Deserialize)]
struct StreamLoadSection {
    #[serde(default = "default_chunk_rows")]
    chunk_rows: usize,
    #[serde(default)]
    max_filter_ratio: f64,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_chunk_rows() -> usize {
    8192
}
fn default_timeout_secs() -> u64 {
    900
}

impl Default for StreamLoadSection {
    fn default() -> Self {
        Self {
            chunk_rows: default_chunk_rows(),
            max_filter_ratio: 0.0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ValidationSection {
    #[serde(default = "default_allow_widen")]
    allow_widen: bool,
    #[serde(default = "default_widen_cap")]
    max_widen_cap: u32,
}

fn default_allow_widen() -> bool {
    true
}
fn default_widen_cap() -> u32 {
    65533
}

#[derive(Debug, Deserialize, Default)]
struct StorageSection {
    #[serde(default)]
    container: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    account: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MergedConfig {
    database: DatabaseSection,
    #[serde(default)]
    connection_pool: ConnectionPoolSection,
    #[serde(default)]
    stream_load: StreamLoadSection,
    #[serde(default)]
    validation: ValidationSection,
    #[serde(default)]
    storage: StorageSection,
    #[serde(default)]
    blob_prefixes: HashMap<String, String>,
    #[serde(default = "default_schemas_dir")]
    schemas_dir: String,
    #[serde(default = "default_mappings_dir")]
    column_mappings_dir: String,
    #[serde(default = "default_computed_columns_file")]
    computed_columns_file: String,
    #[serde(default = "default_row_filters_file")]
    row_filters_file: String,
    #[serde(default)]
    fail_fast: bool,
}

fn default_schemas_dir() -> String {
    "schemas".to_string()
}
fn default_mappings_dir() -> String {
    "column_mappings".to_string()
}
fn default_computed_columns_file() -> String {
    "computed_columns.yaml".to_string()
}
fn default_row_filters_file() -> String {
    "row_filters.yaml".to_string()
}

/// Resolves layered on-disk configuration into immutable `TenantContext`s.
pub struct ConfigResolver {
    root: PathBuf,
}

impl ConfigResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_yaml(&self, rel: &str) -> Result<Value, ConfigError> {
        let path = self.root.join(rel);
        if !path.is_file() {
            return Ok(Value::Null);
        }
        let text = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// All tenants declared in the registry, ordered by `schedule_priority`.
    pub fn list_tenants(&self, include_disabled: bool) -> Result<Vec<Tenant>, ConfigError> {
        let tenants = registry::load_registry(&self.root.join("tenant_registry.yaml"))?;
        Ok(registry::ordered(tenants, include_disabled))
    }

    /// Resolve a single tenant by slug or UUID into a frozen `TenantContext`.
    pub fn get(&self, slug_or_uuid: &str) -> Result<TenantContext, ConfigError> {
        let tenants = registry::load_registry(&self.root.join("tenant_registry.yaml"))?;
        let tenant = registry::find(&tenants, slug_or_uuid)
            .ok_or_else(|| ConfigError::TenantNotFound(slug_or_uuid.to_string()))?
            .clone();

        if tenant.tenant_slug.is_empty() {
            return Err(ConfigError::InvalidTenant("tenant_slug".to_string()));
        }

        let tenant_dir = self.root.join("tenants").join(&tenant.tenant_slug);

        // Layered merge order (spec §4.1): shared defaults, component
        // defaults under a conventional key, shared data-quality rules,
        // per-tenant overrides.
        let mut merged = self.read_yaml("shared/default_config.yaml")?;
        let pool = self.read_yaml("starrocks/connection_pool.yaml")?;
        merged = merge_under_key(merged, "connection_pool", pool);
        let stream_load = self.read_yaml("starrocks/stream_load_defaults.yaml")?;
        merged = merge_under_key(merged, "stream_load", stream_load);
        let business_rules = self.read_yaml("shared/common_business_rules.yaml")?;
        merged = deep_merge(merged, business_rules);
        let tenant_overrides = {
            let path = tenant_dir.join("config.yaml");
            if !path.is_file() {
                Value::Null
            } else {
                let text = std::fs::read_to_string(&path)?;
                serde_yaml::from_str(&text).map_err(|e| ConfigError::ParseError {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
            }
        };
        merged = deep_merge(merged, tenant_overrides);

        reject_secrets(&merged, "merged config")?;
        interpolate_tenant_slug(&mut merged, &tenant.tenant_slug);

        let parsed: MergedConfig = serde_yaml::from_value(merged).map_err(|e| ConfigError::ParseError {
            path: "merged config".to_string(),
            message: e.to_string(),
        })?;

        let database_name = parsed
            .database
            .name
            .unwrap_or_else(|| tenant.database_name.clone());
        if database_name.is_empty() {
            return Err(ConfigError::InvalidTenant("database.name".to_string()));
        }

        let env_path = tenant_dir.join(".env");
        let env = if env_path.is_file() {
            dotenv::parse(&std::fs::read_to_string(&env_path)?)
        } else {
            HashMap::new()
        };

        let provider = tenant.provider;

        let db = DbConnectionParams {
            host: parsed.database.host,
            query_port: parsed.database.query_port,
            http_port: parsed.database.http_port,
            user: env.get("DB_USER").cloned().unwrap_or_default(),
            password: env.get("DB_PASSWORD").cloned().unwrap_or_default(),
            database: database_name,
            pool_min: parsed.connection_pool.min,
            pool_max: parsed.connection_pool.max,
            pool_recycle_secs: parsed.connection_pool.recycle_secs,
        };

        let storage = StorageCredentials {
            provider,
            container_or_bucket: parsed.storage.container.unwrap_or_default(),
            endpoint: parsed.storage.endpoint,
            account: parsed.storage.account,
            connection_string: env.get("AZURE_CONNECTION_STRING").cloned(),
            sas_token: env.get("AZURE_SAS_TOKEN").cloned(),
            access_key: env.get("AWS_ACCESS_KEY_ID").cloned(),
            secret_key: env.get("AWS_SECRET_ACCESS_KEY").cloned(),
            region: parsed.storage.region,
        };

        let schemas = load_schemas(&tenant_dir, &parsed.schemas_dir)?;
        let column_mappings = load_column_mappings(&tenant_dir, &parsed.column_mappings_dir)?;
        let computed_columns = load_computed_columns(&tenant_dir, &parsed.computed_columns_file)?;
        let row_filters = load_row_filters(&tenant_dir, &parsed.row_filters_file)?;

        let data_root = self.root.join("data");
        let paths = TenantPaths::under(&data_root, &tenant.tenant_slug);

        info!(
            tenant = tenant.tenant_slug.as_str(),
            tables = schemas.len(),
            "resolved tenant context"
        );

        if parsed.blob_prefixes.is_empty() {
            warn!(
                tenant = tenant.tenant_slug.as_str(),
                "no blob_prefixes declared; downloads for any table will fail discovery"
            );
        }

        Ok(TenantContext {
            tenant,
            paths,
            db,
            storage,
            schemas,
            column_mappings,
            computed_columns,
            row_filters,
            seeds_dir: tenant_dir.join("seeds"),
            blob_prefixes: parsed.blob_prefixes,
            env,
            chunk_rows: parsed.stream_load.chunk_rows,
            max_filter_ratio: parsed.stream_load.max_filter_ratio,
            stream_load_timeout_secs: parsed.stream_load.timeout_secs,
            fail_fast: parsed.fail_fast,
            max_widen_cap: parsed.validation.max_widen_cap,
            allow_widen: parsed.validation.allow_widen,
        })
    }

    /// The six subdirectory roots for a tenant, created on demand (spec
    /// §4.1 `derived_paths`).
    pub fn derived_paths(&self, ctx: &TenantContext) -> Result<TenantPaths, ConfigError> {
        for root in ctx.paths.all_roots() {
            std::fs::create_dir_all(root)?;
        }
        Ok(ctx.paths.clone())
    }
}
