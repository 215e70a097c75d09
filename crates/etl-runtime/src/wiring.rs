//! Assembles concrete `BlobProvider`/`DbControl`/`StreamLoadClient`
//! implementations from a `TenantContext` (spec §6 external interfaces).
//! This is the one place in the crate that knows about `object_store`,
//! `sqlx`, and `reqwest` concretely; every other module only sees the
//! trait objects in [`PipelineDeps`](crate::deps::PipelineDeps).

use crate::deps::PipelineDeps;
use etl_core::TenantContext;
use etl_load::db_control::SqlxDbControl;
use etl_load::stream_load::ReqwestStreamLoadClient;
use etl_store::fetcher::BlobFetcher;
use etl_store::provider;

/// Owns one tenant's live connections for the duration of a job run.
/// `deps()` hands out borrowed trait objects so `run_job`/`run_table`
/// never need to know the concrete types underneath.
pub struct Engine {
    blob_provider: BlobFetcher,
    db: SqlxDbControl,
    stream_client: ReqwestStreamLoadClient,
}

impl Engine {
    /// Build every live connection for one tenant: the object store
    /// client, the control-plane MySQL pool, and the Stream Load HTTP
    /// client. `local_root` is only consulted for `StorageProvider::Local`
    /// tenants.
    pub async fn connect(ctx: &TenantContext, local_root: &std::path::Path) -> anyhow::Result<Self> {
        let store = provider::build(&ctx.storage, local_root)?;
        let blob_provider = BlobFetcher::new(store);

        let db = SqlxDbControl::connect(
            &ctx.db.host,
            ctx.db.query_port,
            &ctx.db.user,
            &ctx.db.password,
            &ctx.db.database,
            ctx.db.pool_min,
            ctx.db.pool_max,
            ctx.db.pool_recycle_secs,
        )
        .await?;

        let stream_client = ReqwestStreamLoadClient::new(
            &ctx.db.host,
            ctx.db.http_port,
            &ctx.db.user,
            &ctx.db.password,
        );

        Ok(Self {
            blob_provider,
            db,
            stream_client,
        })
    }

    pub fn deps(&self) -> PipelineDeps<'_> {
        PipelineDeps {
            blob_provider: &self.blob_provider,
            db: &self.db,
            stream_client: &self.stream_client,
        }
    }
}
