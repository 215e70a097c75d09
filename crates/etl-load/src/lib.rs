//! # etl-load — Validator + BulkLoader
//!
//! Drives the critical-path subsystem described in spec §4.5: fetch the
//! live schema, widen overflowing columns, project the frame onto the
//! live column order (the defense against positional-binding corruption,
//! Design Note §9), then stream the result to the bulk-load endpoint in
//! fixed-size chunks with an idempotency label and bounded retry.

pub mod db_control;
pub mod serialize;
pub mod stream_load;
pub mod validate;

pub use db_control::SqlxDbControl;
pub use stream_load::{stream_load_label, ReqwestStreamLoadClient};

use etl_core::{
    ChunkDescriptor, DbControl, Frame, LoadError, LoadResult, LoadStatus, StreamLoadClient,
    StreamLoadRequest,
};
use serialize::{chunk_descriptors, serialize_chunk, DEFAULT_COLUMN_SEPARATOR, DEFAULT_ROW_DELIMITER};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use validate::{next_width, overflowing_columns, project_to_live_schema};

/// Tunables for one table's load (spec §4.5.4, §4.5.5).
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub database: String,
    pub table: String,
    pub tenant_slug: String,
    pub chunk_rows: usize,
    pub max_filter_ratio: f64,
    pub strict_mode: bool,
    pub timeout_secs: u64,
    /// Truncate the table before loading chunk 1 (dimension full-refresh).
    /// If the truncate fails the whole load aborts with no partial state.
    pub truncate_before: bool,
    pub allow_widen: bool,
    pub max_widen_cap: u32,
    pub max_attempts: u32,
    pub wall_clock_date: String,
}

/// Aggregate result of loading one table, enough to fill a `StageOutcome`.
#[derive(Debug, Clone)]
pub struct TableLoadOutcome {
    pub status: LoadStatus,
    pub rows_loaded: u64,
    pub rows_filtered: u64,
    pub elapsed_ms: u64,
}

/// Fetch the live schema, widening any overflowing variable-width column
/// up to `options.max_widen_cap` (power-of-two growth), re-querying after
/// each widen. Fails with `Overflow` if widening is disabled or the
/// required width exceeds the cap (spec §4.5.2).
async fn fetch_and_widen_schema(
    db: &dyn DbControl,
    frame: &Frame,
    options: &LoadOptions,
) -> Result<Vec<etl_core::LiveColumn>, LoadError> {
    let mut live = db.describe_table(&options.database, &options.table).await?;

    loop {
        let overflows = overflowing_columns(&frame.batch, &live);
        if overflows.is_empty() {
            return Ok(live);
        }
        if !options.allow_widen {
            let (column, declared) = &overflows[0];
            return Err(LoadError::Overflow {
                column: column.clone(),
                declared: *declared,
            });
        }

        for (column, observed) in &overflows {
            let new_width = next_width(*observed, options.max_widen_cap);
            if (new_width as usize) < *observed {
                return Err(LoadError::Overflow {
                    column: column.clone(),
                    declared: options.max_widen_cap as usize,
                });
            }
            info!(table = options.table.as_str(), column, new_width, "widening column");
            db.alter_widen_column(&options.database, &options.table, column, new_width)
                .await?;
        }
        live = db.describe_table(&options.database, &options.table).await?;
    }
}

async fn load_chunk_with_retry(
    stream_client: &dyn StreamLoadClient,
    request: &StreamLoadRequest,
    payload: bytes::Bytes,
    max_attempts: u32,
) -> Result<LoadResult, LoadError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match stream_client.load_chunk(request, payload.clone()).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let backoff = Duration::from_secs(2u64.pow(attempt.min(5)));
                warn!(table = request.table.as_str(), attempt, "retrying stream load chunk");
                tokio::time::sleep(backoff).await;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Validate and load one silver frame into its target table (spec §4.5).
pub async fn validate_and_load(
    db: &dyn DbControl,
    stream_client: &dyn StreamLoadClient,
    frame: &Frame,
    options: &LoadOptions,
) -> Result<TableLoadOutcome, LoadError> {
    let started = Instant::now();

    let live = fetch_and_widen_schema(db, frame, options).await?;
    let (projected, dropped) = project_to_live_schema(&frame.batch, &live)?;
    if !dropped.is_empty() {
        warn!(table = options.table.as_str(), columns = ?dropped, "dropping columns absent from live schema");
    }

    if options.truncate_before {
        db.truncate_table(&options.database, &options.table).await?;
    }

    let column_order: Vec<String> = live.iter().map(|c| c.column_name.clone()).collect();
    let chunks = chunk_descriptors(projected.num_rows(), options.chunk_rows);

    let mut rows_loaded = 0u64;
    let mut rows_filtered = 0u64;
    let mut had_partial = false;

    for chunk in &chunks {
        let outcome = load_one_chunk(stream_client, &projected, chunk, &column_order, options).await?;
        rows_loaded += outcome.rows_loaded;
        rows_filtered += outcome.rows_filtered;
        if outcome.status == LoadStatus::PartialSuccess {
            had_partial = true;
        }

        let total_rows = outcome.rows_loaded + outcome.rows_filtered + outcome.rows_unselected;
        if total_rows > 0 && (outcome.rows_filtered as f64 / total_rows as f64) > options.max_filter_ratio
            && options.max_filter_ratio == 0.0
        {
            return Err(LoadError::StreamLoadFail {
                table: options.table.clone(),
                chunk: chunk.ordinal,
                message: "filtered ratio exceeded max_filter_ratio at strict=0.0".to_string(),
            });
        }

        if (chunk.ordinal + 1) % 10 == 0 {
            info!(
                table = options.table.as_str(),
                chunk = chunk.ordinal,
                rows_loaded,
                rows_filtered,
                "stream load progress"
            );
        }
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let status = if had_partial { LoadStatus::PartialSuccess } else { LoadStatus::Success };

    info!(
        table = options.table.as_str(),
        rows_loaded, rows_filtered, elapsed_ms, "stream load complete"
    );

    Ok(TableLoadOutcome {
        status,
        rows_loaded,
        rows_filtered,
        elapsed_ms,
    })
}

async fn load_one_chunk(
    stream_client: &dyn StreamLoadClient,
    batch: &datafusion::arrow::array::RecordBatch,
    chunk: &ChunkDescriptor,
    column_order: &[String],
    options: &LoadOptions,
) -> Result<LoadResult, LoadError> {
    let payload = serialize_chunk(batch, chunk, DEFAULT_COLUMN_SEPARATOR, DEFAULT_ROW_DELIMITER);
    let label = stream_load_label(&options.tenant_slug, &options.table, chunk.ordinal, &options.wall_clock_date);

    let request = StreamLoadRequest {
        database: options.database.clone(),
        table: options.table.clone(),
        label,
        column_separator: DEFAULT_COLUMN_SEPARATOR,
        row_delimiter: DEFAULT_ROW_DELIMITER,
        max_filter_ratio: options.max_filter_ratio,
        strict_mode: options.strict_mode,
        timeout_secs: options.timeout_secs,
        columns: column_order.to_vec(),
    };

    load_chunk_with_retry(stream_client, &request, payload, options.max_attempts).await
}
