//! `PipelineRunner`: drives one `(tenant, table)` through Discovered →
//! Downloaded → Converted → Transformed → Validated → Loaded (spec §4.6).
//! Each transition is timed; a failure anywhere produces a terminal
//! `Failed(stage)` outcome the runner does not itself retry — retry is
//! each component's own job (bounded backoff inside `etl-store` downloads
//! and `etl-load` stream-load chunks).

use crate::deps::PipelineDeps;
use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::compute::concat_batches;
use etl_convert::ConvertOptions;
use etl_core::{Frame, StageOutcome, TenantContext};
use etl_load::LoadOptions;
use etl_store::{download_all, DownloadOptions};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Which tree of a tenant's roots (`incremental/` or `historical/`) a
/// table's run reads from and writes to (spec §3 `TenantContext`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Incremental,
    Historical,
}

struct StageFailure {
    stage: &'static str,
    message: String,
    /// Machine-checkable error kind, set only when a caller (`jobs.rs`)
    /// needs to distinguish this failure from siblings at the same stage
    /// — e.g. a failed truncate vs. a failed stream-load chunk, both of
    /// which fail at the `Load` stage (spec §7 job-abort rules).
    kind: Option<&'static str>,
}

impl StageFailure {
    fn new(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: None,
        }
    }

    fn with_kind(stage: &'static str, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: Some(kind),
        }
    }
}

impl From<etl_core::LoadError> for StageFailure {
    fn from(e: etl_core::LoadError) -> Self {
        match &e {
            etl_core::LoadError::TruncateFailed(_) => {
                StageFailure::with_kind("Load", "TruncateFailed", e.to_string())
            }
            _ => StageFailure::new("Load", e.to_string()),
        }
    }
}

fn paths_for(ctx: &TenantContext, mode: RunMode) -> (std::path::PathBuf, std::path::PathBuf, std::path::PathBuf) {
    match mode {
        RunMode::Incremental => (
            ctx.paths.incremental_source_files.clone(),
            ctx.paths.incremental_raw.clone(),
            ctx.paths.incremental_cleaned.clone(),
        ),
        RunMode::Historical => (
            ctx.paths.historical_source_files.clone(),
            ctx.paths.historical_raw.clone(),
            ctx.paths.historical_cleaned.clone(),
        ),
    }
}

async fn discover_and_download(
    ctx: &TenantContext,
    deps: &PipelineDeps<'_>,
    table: &str,
    source_dir: &std::path::Path,
    cancel: &CancellationToken,
) -> Result<Vec<std::path::PathBuf>, StageFailure> {
    let prefix = ctx
        .blob_prefix_for(table)
        .ok_or_else(|| StageFailure::new("Discovery", format!("no blob_prefixes entry declared for {table}")))?;

    let blobs = deps
        .blob_provider
        .list(prefix)
        .await
        .map_err(|e| StageFailure::new("Discovery", e.to_string()))?;

    if blobs.is_empty() {
        info!(table, prefix, "no blobs found for table; reporting zero rows");
        return Ok(Vec::new());
    }

    let outcomes = download_all(
        deps.blob_provider,
        &blobs,
        source_dir,
        &DownloadOptions::default(),
        cancel,
    )
    .await
    .map_err(|e| StageFailure::new("Download", e.to_string()))?;

    let mut downloaded = Vec::new();
    for outcome in outcomes {
        match outcome.error {
            None => downloaded.push(outcome.dest),
            Some(e) => warn!(table, blob = outcome.descriptor.key.as_str(), error = %e, "blob download failed, skipping"),
        }
    }

    if downloaded.is_empty() {
        return Err(StageFailure::new("Download", "every listed blob failed to download"));
    }
    Ok(downloaded)
}

fn convert_all(
    table: &str,
    files: &[std::path::PathBuf],
    raw_dir: &std::path::Path,
    touched: &mut Vec<std::path::PathBuf>,
) -> Result<RecordBatch, StageFailure> {
    let mut batches = Vec::with_capacity(files.len());
    for (i, path) in files.iter().enumerate() {
        let bronze_name = format!(
            "{}-{i}",
            path.file_stem().and_then(|s| s.to_str()).unwrap_or("part")
        );
        let (frame, written) =
            etl_convert::convert_to_bronze(path, table, &bronze_name, raw_dir, &ConvertOptions {
                has_header: true,
                sheet_name: None,
            })
            .map_err(|e| StageFailure::new("Convert", e.to_string()))?;
        touched.push(written);
        batches.push(frame.batch);
    }

    if batches.len() == 1 {
        return Ok(batches.remove(0));
    }
    let schema = batches[0].schema();
    concat_batches(&schema, &batches).map_err(|e| StageFailure::new("Convert", e.to_string()))
}

/// Remove every file this run wrote under the tenant's temp directories.
/// Called only on success (spec §5 "Shared resources": temp files are
/// cleaned on success, retained on failure for diagnostics).
fn cleanup_temp_dirs(touched: &[std::path::PathBuf]) {
    for path in touched {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to clean up temp file after successful run");
            }
        }
    }
}

/// Run one `(tenant, table)` unit through the full pipeline (spec §4.6
/// `run_table`). `truncate` only has effect when the table is loaded
/// full-refresh style; callers decide whether to set it per the table's
/// dimension/fact role (see `jobs`).
pub async fn run_table(
    ctx: &TenantContext,
    deps: &PipelineDeps<'_>,
    table: &str,
    mode: RunMode,
    truncate: bool,
    cancel: &CancellationToken,
) -> StageOutcome {
    let started = Instant::now();
    let mut touched = Vec::new();
    let result = run_table_inner(ctx, deps, table, mode, truncate, cancel, &mut touched).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok((rows_loaded, rows_filtered)) => {
            info!(table, rows_loaded, rows_filtered, elapsed_ms, "table pipeline succeeded");
            cleanup_temp_dirs(&touched);
            StageOutcome {
                status: "Success".to_string(),
                rows_loaded,
                rows_filtered,
                elapsed_ms,
                error: None,
                error_kind: None,
            }
        }
        Err(failure) => {
            error!(table, stage = failure.stage, message = failure.message.as_str(), "table pipeline failed");
            StageOutcome {
                status: format!("Failed({})", failure.stage),
                rows_loaded: 0,
                rows_filtered: 0,
                elapsed_ms,
                error: Some(failure.message),
                error_kind: failure.kind.map(str::to_string),
            }
        }
    }
}

async fn run_table_inner(
    ctx: &TenantContext,
    deps: &PipelineDeps<'_>,
    table: &str,
    mode: RunMode,
    truncate: bool,
    cancel: &CancellationToken,
    touched: &mut Vec<std::path::PathBuf>,
) -> Result<(u64, u64), StageFailure> {
    let (source_dir, raw_dir, _cleaned_dir) = paths_for(ctx, mode);
    std::fs::create_dir_all(&source_dir).map_err(|e| StageFailure::new("Discovery", e.to_string()))?;
    std::fs::create_dir_all(&raw_dir).map_err(|e| StageFailure::new("Discovery", e.to_string()))?;

    let downloaded = discover_and_download(ctx, deps, table, &source_dir, cancel).await?;
    touched.extend(downloaded.iter().cloned());
    if downloaded.is_empty() {
        // Empty blob set: zero files, zero rows, Success (spec §8 boundary).
        return Ok((0, 0));
    }

    let bronze_batch = convert_all(table, &downloaded, &raw_dir, touched)?;
    let bronze = Frame::new(table, "bronze", bronze_batch);

    let mapping = ctx
        .mapping_for(table)
        .ok_or_else(|| StageFailure::new("Transform", format!("no column mapping declared for {table}")))?;
    let computed_rules = ctx.computed_rules_for(table);
    let row_filters = ctx.row_filters_for(table);

    let (silver, _stats) = etl_transform::transform_to_silver(&bronze, mapping, computed_rules, row_filters)
        .await
        .map_err(|e| StageFailure::new("Transform", e.to_string()))?;

    let wall_clock_date = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let load_options = LoadOptions {
        database: ctx.db.database.clone(),
        table: table.to_string(),
        tenant_slug: ctx.slug().to_string(),
        chunk_rows: ctx.chunk_rows,
        max_filter_ratio: ctx.max_filter_ratio,
        strict_mode: false,
        timeout_secs: ctx.stream_load_timeout_secs,
        truncate_before: truncate,
        allow_widen: ctx.allow_widen,
        max_widen_cap: ctx.max_widen_cap,
        max_attempts: 3,
        wall_clock_date,
    };

    let outcome = etl_load::validate_and_load(deps.db, deps.stream_client, &silver, &load_options)
        .await?;

    Ok((outcome.rows_loaded, outcome.rows_filtered))
}
