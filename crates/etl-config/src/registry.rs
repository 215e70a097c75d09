//! `tenant_registry.yaml` parsing (spec §6.1).

use etl_core::tenant::{ConstantsBackendKind, StorageProvider, Tenant};
use etl_core::ConfigError;
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    tenants: Vec<RegistryEntry>,
}

#[derive(Debug, Deserialize)]
struct RegistryEntry {
    tenant_id: Uuid,
    tenant_slug: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    database_name: String,
    provider: String,
    #[serde(default = "default_constants_backend")]
    constants_backend: String,
    #[serde(default)]
    schedule_priority: i64,
}

fn default_enabled() -> bool {
    true
}

fn default_constants_backend() -> String {
    "relational".to_string()
}

pub fn parse_provider(raw: &str) -> Result<StorageProvider, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "azure" => Ok(StorageProvider::Azure),
        "s3" => Ok(StorageProvider::S3),
        "gcs" => Ok(StorageProvider::Gcs),
        "minio" => Ok(StorageProvider::MinIo),
        "local" => Ok(StorageProvider::Local),
        other => Err(ConfigError::UnsupportedProvider(other.to_string())),
    }
}

fn parse_constants_backend(raw: &str) -> Result<ConstantsBackendKind, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "relational" => Ok(ConstantsBackendKind::Relational),
        "document" => Ok(ConstantsBackendKind::Document),
        "same_database" => Ok(ConstantsBackendKind::SameDatabase),
        other => Err(ConfigError::UnsupportedProvider(format!(
            "constants backend: {other}"
        ))),
    }
}

/// Load and parse every entry in `tenant_registry.yaml`.
pub fn load_registry(path: &Path) -> Result<Vec<Tenant>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let file: RegistryFile = serde_yaml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    file.tenants
        .into_iter()
        .map(|e| {
            Ok(Tenant {
                tenant_id: e.tenant_id,
                tenant_slug: e.tenant_slug,
                enabled: e.enabled,
                database_name: e.database_name,
                provider: parse_provider(&e.provider)?,
                constants_backend: parse_constants_backend(&e.constants_backend)?,
                schedule_priority: e.schedule_priority,
            })
        })
        .collect()
}

/// Entries ordered by `schedule_priority` ascending, disabled tenants
/// excluded unless `include_disabled` is set (spec §4.1 `list_tenants`).
pub fn ordered(mut tenants: Vec<Tenant>, include_disabled: bool) -> Vec<Tenant> {
    if !include_disabled {
        tenants.retain(|t| t.enabled);
    }
    tenants.sort_by_key(|t| t.schedule_priority);
    tenants
}

/// Match a registry entry by either its slug or its UUID (spec §4.1 `get`).
pub fn find<'a>(tenants: &'a [Tenant], slug_or_uuid: &str) -> Option<&'a Tenant> {
    tenants.iter().find(|t| {
        t.tenant_slug == slug_or_uuid
            || Uuid::parse_str(slug_or_uuid)
                .map(|id| id == t.tenant_id)
                .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn orders_by_priority_and_excludes_disabled_by_default() {
        let tenants = vec![
            Tenant {
                tenant_id: Uuid::nil(),
                tenant_slug: "b".into(),
                enabled: true,
                database_name: "db_b".into(),
                provider: StorageProvider::Local,
                constants_backend: ConstantsBackendKind::Relational,
                schedule_priority: 20,
            },
            Tenant {
                tenant_id: Uuid::nil(),
                tenant_slug: "a".into(),
                enabled: false,
                database_name: "db_a".into(),
                provider: StorageProvider::Local,
                constants_backend: ConstantsBackendKind::Relational,
                schedule_priority: 1,
            },
            Tenant {
                tenant_id: Uuid::nil(),
                tenant_slug: "c".into(),
                enabled: true,
                database_name: "db_c".into(),
                provider: StorageProvider::Local,
                constants_backend: ConstantsBackendKind::Relational,
                schedule_priority: 5,
            },
        ];
        let got = ordered(tenants, false);
        let slugs: Vec<&str> = got.iter().map(|t| t.tenant_slug.as_str()).collect();
        assert_eq!(slugs, vec!["c", "b"]);
    }

    #[test]
    fn loads_registry_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "tenants:\n  - tenant_id: \"00000000-0000-0000-0000-000000000001\"\n    tenant_slug: t-demo\n    database_name: t_demo\n    provider: s3\n    schedule_priority: 1\n"
        )
        .unwrap();
        let tenants = load_registry(file.path()).unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].tenant_slug, "t-demo");
        assert_eq!(tenants[0].provider, StorageProvider::S3);
    }
}
