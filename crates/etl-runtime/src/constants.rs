//! Three `ConstantsBackend` implementations, one per `ConstantsBackendKind`
//! (spec §6.5): a `sqlx`-backed relational table (also used for the
//! "same-database" variant, just pointed at the tenant's own pool), a
//! minimal `reqwest` JSON client standing in for a document store, and an
//! in-memory fake for tests.

use async_trait::async_trait;
use etl_core::ConstantsBackend;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool, Row};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Relational or same-database backend: a `key_value_constants(key,
/// value)` table reached over its own pooled connection. Row keys are
/// expected to already carry the per-tenant secret prefix (spec §9,
/// `tenant::secret_prefix`); this backend does no prefixing itself.
pub struct SqlxConstantsBackend {
    pool: Pool<MySql>,
    table: String,
}

impl SqlxConstantsBackend {
    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: &str,
        database: &str,
        table: &str,
    ) -> anyhow::Result<Self> {
        let url = format!("mysql://{user}:{password}@{host}:{port}/{database}");
        let pool = MySqlPoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .max_lifetime(Duration::from_secs(1800))
            .connect(&url)
            .await?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }
}

#[async_trait]
impl ConstantsBackend for SqlxConstantsBackend {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let sql = format!("SELECT value FROM {} WHERE `key` = ?", self.table);
        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<HashMap<String, String>> {
        let sql = format!("SELECT `key`, value FROM {} WHERE `key` LIKE ?", self.table);
        let like_pattern = format!("{prefix}%");
        let rows = sqlx::query(&sql).bind(like_pattern).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>(0), r.get::<String, _>(1)))
            .collect())
    }
}

/// Document-style backend over a generic HTTP JSON API: `GET
/// {base_url}/{key}` returns `{"value": "..."}`, `GET
/// {base_url}?prefix=...` returns `{"key": "value", ...}`.
pub struct HttpConstantsBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConstantsBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct DocumentValue {
    value: String,
}

#[async_trait]
impl ConstantsBackend for HttpConstantsBackend {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: DocumentValue = response.error_for_status()?.json().await?;
        Ok(Some(doc.value))
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<HashMap<String, String>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("prefix", prefix)])
            .send()
            .await?
            .error_for_status()?;
        let map: HashMap<String, String> = response.json().await?;
        Ok(map)
    }
}

/// In-memory fake for tests and local tenant setups with no real
/// constants backend wired yet.
#[derive(Default)]
pub struct InMemoryConstantsBackend {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryConstantsBackend {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }
}

#[async_trait]
impl ConstantsBackend for InMemoryConstantsBackend {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.read().unwrap().get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<HashMap<String, String>> {
        Ok(self
            .values
            .read()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_backend_lists_by_prefix() {
        let mut values = HashMap::new();
        values.insert("BC_3607d64c_PG_URI".to_string(), "postgres://x".to_string());
        values.insert("BC_3607d64c_API_KEY".to_string(), "abc".to_string());
        values.insert("other".to_string(), "nope".to_string());
        let backend = InMemoryConstantsBackend::new(values);

        let listed = backend.list("BC_3607d64c_").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(backend.get("other").await.unwrap(), Some("nope".to_string()));
    }
}
