//! Named, scheduler-facing entry points (spec §6.6) and the job-level
//! state machine that drives `run_table` across a batch of tables.
//!
//! Table role (dimension vs. fact) is read off the table name rather than
//! declared separately: the `dim_` prefix convention the source schemas
//! already follow (`dim_dealer_master`, `fact_invoice_secondary`) is the
//! only signal the engine needs, so there is no extra config surface for
//! tenants to get wrong.

use crate::deps::PipelineDeps;
use crate::runner::{run_table, RunMode};
use etl_core::{JobOutcome, TenantContext};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Whether a table is a dimension (small, refreshable wholesale) or a
/// fact (large, appended incrementally). Derived from the `dim_` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    Dimension,
    Fact,
}

impl TableRole {
    pub fn of(table: &str) -> Self {
        if table.starts_with("dim_") {
            TableRole::Dimension
        } else {
            TableRole::Fact
        }
    }
}

/// One table's place in a job: which mode to run it in and whether to
/// truncate before loading (full dimension refresh only).
#[derive(Debug, Clone)]
pub struct TableRunSpec {
    pub table: String,
    pub mode: RunMode,
    pub truncate: bool,
}

impl TableRunSpec {
    fn full_refresh(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            mode: RunMode::Historical,
            truncate: true,
        }
    }

    fn incremental(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            mode: RunMode::Incremental,
            truncate: false,
        }
    }
}

/// An ordered batch of tables to run as one unit (spec §6.6 `JobSpec`).
#[derive(Debug, Clone, Default)]
pub struct JobSpec(pub Vec<TableRunSpec>);

/// Run every table in `spec` against one tenant, in order, aborting the
/// remaining tables when either:
/// - a full-refresh truncate fails (there is no safe partial state to
///   continue from for that table's dependents), or
/// - `ctx.fail_fast` is set and any table fails.
///
/// Otherwise every table runs regardless of earlier failures, and the
/// aggregate `JobOutcome` reflects per-table status (spec §7 job-abort
/// rules, §6.6).
pub async fn run_job(
    ctx: &TenantContext,
    deps: &PipelineDeps<'_>,
    spec: &JobSpec,
    cancel: &CancellationToken,
) -> JobOutcome {
    let mut per_table = HashMap::new();

    for run_spec in &spec.0 {
        if cancel.is_cancelled() {
            info!(tenant = ctx.slug(), "job cancelled, stopping before remaining tables");
            break;
        }

        let outcome = run_table(
            ctx,
            deps,
            &run_spec.table,
            run_spec.mode,
            run_spec.truncate,
            cancel,
        )
        .await;

        // A failed truncate aborts the job (spec §7); a failed stream-load
        // chunk on the same table does not (spec §5) — both fail at the
        // `Load` stage with an identical `status` string, so the two must
        // be told apart by `error_kind`, not by pattern-matching `status`.
        let is_truncate_failure = outcome.error_kind.as_deref() == Some("TruncateFailed");
        let failed = outcome.error.is_some();

        per_table.insert(run_spec.table.clone(), outcome);

        if is_truncate_failure {
            error!(
                tenant = ctx.slug(),
                table = run_spec.table.as_str(),
                "full-refresh truncate failed, aborting remainder of job"
            );
            break;
        }
        if failed && ctx.fail_fast {
            error!(
                tenant = ctx.slug(),
                table = run_spec.table.as_str(),
                "table failed under fail_fast, aborting remainder of job"
            );
            break;
        }
    }

    JobOutcome { per_table }
}

/// Dimension tables, full-refresh historical load: truncate then reload
/// every row from the historical tree (spec §6.6 nightly job).
pub async fn evening_dimension_refresh(
    ctx: &TenantContext,
    deps: &PipelineDeps<'_>,
    cancel: &CancellationToken,
) -> JobOutcome {
    let tables = dimension_tables(ctx);
    let spec = JobSpec(tables.into_iter().map(TableRunSpec::full_refresh).collect());
    run_job(ctx, deps, &spec, cancel).await
}

/// Dimension tables, incremental load without truncation (spec §6.6
/// morning job, dimension leg — used when a dimension changed during the
/// day and a full nightly refresh hasn't run yet).
pub async fn morning_dimension_incremental(
    ctx: &TenantContext,
    deps: &PipelineDeps<'_>,
    cancel: &CancellationToken,
) -> JobOutcome {
    let tables = dimension_tables(ctx);
    let spec = JobSpec(tables.into_iter().map(TableRunSpec::incremental).collect());
    run_job(ctx, deps, &spec, cancel).await
}

/// One fact table, incremental append from the incremental tree (spec
/// §6.6 `morning_fact_incremental(tenant, table)`). Unlike the dimension
/// jobs, which sweep every declared table of their kind, the spec names
/// this entry point per-table: fact loads run many small files per table
/// on independent schedules, so the scheduler invokes this once per
/// fact table rather than once per tenant.
pub async fn morning_fact_incremental(
    ctx: &TenantContext,
    deps: &PipelineDeps<'_>,
    table: &str,
    cancel: &CancellationToken,
) -> JobOutcome {
    let spec = JobSpec(vec![TableRunSpec::incremental(table)]);
    run_job(ctx, deps, &spec, cancel).await
}

fn dimension_tables(ctx: &TenantContext) -> Vec<String> {
    ctx.schemas
        .iter()
        .map(|s| s.name.clone())
        .filter(|name| TableRole::of(name) == TableRole::Dimension)
        .collect()
}
