//! The trait-object bundle `PipelineRunner` drives against. Kept as
//! borrowed `&dyn` references (not owned `Arc`s) so tests can hand in
//! fakes without any of `etl-runtime`'s code caring whether it's talking
//! to `object_store`/`sqlx`/`reqwest` or an in-memory double.

use etl_core::{BlobProvider, DbControl, StreamLoadClient};

/// Everything one table's pipeline run needs from the outside world,
/// borrowed for the duration of the call.
pub struct PipelineDeps<'a> {
    pub blob_provider: &'a dyn BlobProvider,
    pub db: &'a dyn DbControl,
    pub stream_client: &'a dyn StreamLoadClient,
}
