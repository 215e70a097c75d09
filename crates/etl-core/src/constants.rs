//! The constants/business-dimensions backend the engine consumes (spec
//! §6.5): a key→value capability over one of relational, document, or
//! same-database storage. Credentials are tenant-scoped and prefixed per
//! Design Note §9; see [`tenant::secret_prefix`](crate::tenant::secret_prefix).

use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait ConstantsBackend: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn list(&self, prefix: &str) -> anyhow::Result<HashMap<String, String>>;
}
