//! # etl-cli — scheduler-facing entry point
//!
//! A thin dispatcher: resolve a tenant's `TenantContext` via `ConfigResolver`,
//! wire its live connections via `etl_runtime::Engine`, run the requested
//! job, and print the resulting outcome as JSON for the caller (a cron
//! entry, Airflow task, or an operator's shell) to inspect. All business
//! logic lives in `etl-runtime`; this binary owns process-level concerns
//! only (argument parsing, logging setup, graceful shutdown).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use etl_config::ConfigResolver;
use etl_runtime::{
    evening_dimension_refresh, morning_dimension_incremental, morning_fact_incremental, seed_load, Engine,
};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "etl-cli")]
#[command(about = "Runs tenant-etl jobs against one tenant's configuration")]
struct Args {
    /// Root directory holding `tenant_registry.yaml`, `shared/`, `starrocks/`, and `tenants/`.
    #[arg(long, default_value = "config")]
    config_root: PathBuf,

    /// Local filesystem root used as the scratch area for downloaded and
    /// bronze-layer files, and as the object-store root for `Local`-provider tenants.
    #[arg(long, default_value = "data")]
    local_root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every tenant declared in the registry, in schedule-priority order.
    ListTenants {
        /// Include tenants with `enabled: false`.
        #[arg(long)]
        include_disabled: bool,
    },
    /// Dimension tables, full-refresh: truncate then reload from the historical tree.
    EveningDimensionRefresh { tenant: String },
    /// Dimension tables, incremental load without truncation.
    MorningDimensionIncremental { tenant: String },
    /// One fact table, incremental append from the incremental tree.
    MorningFactIncremental { tenant: String, table: String },
    /// Load one or all reference CSVs from `seeds/` via plain INSERT.
    SeedLoad {
        tenant: String,
        /// Load only this table's seed file; omit to load every seed file.
        table: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let resolver = ConfigResolver::new(&args.config_root);
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, cancelling in-flight work");
            shutdown.cancel();
        }
    });

    match args.command {
        Command::ListTenants { include_disabled } => {
            let tenants = resolver
                .list_tenants(include_disabled)
                .context("failed to list tenants")?;
            for tenant in tenants {
                println!(
                    "{}\t{}\tpriority={}\tenabled={}",
                    tenant.tenant_id, tenant.tenant_slug, tenant.schedule_priority, tenant.enabled
                );
            }
            Ok(())
        }
        Command::EveningDimensionRefresh { tenant } => {
            let ctx = resolver.get(&tenant).context("failed to resolve tenant")?;
            let engine = Engine::connect(&ctx, &args.local_root)
                .await
                .context("failed to connect tenant's live dependencies")?;
            let outcome = evening_dimension_refresh(&ctx, &engine.deps(), &cancel).await;
            print_job_outcome(&tenant, &outcome)
        }
        Command::MorningDimensionIncremental { tenant } => {
            let ctx = resolver.get(&tenant).context("failed to resolve tenant")?;
            let engine = Engine::connect(&ctx, &args.local_root)
                .await
                .context("failed to connect tenant's live dependencies")?;
            let outcome = morning_dimension_incremental(&ctx, &engine.deps(), &cancel).await;
            print_job_outcome(&tenant, &outcome)
        }
        Command::MorningFactIncremental { tenant, table } => {
            let ctx = resolver.get(&tenant).context("failed to resolve tenant")?;
            let engine = Engine::connect(&ctx, &args.local_root)
                .await
                .context("failed to connect tenant's live dependencies")?;
            let outcome = morning_fact_incremental(&ctx, &engine.deps(), &table, &cancel).await;
            print_job_outcome(&tenant, &outcome)
        }
        Command::SeedLoad { tenant, table } => {
            let ctx = resolver.get(&tenant).context("failed to resolve tenant")?;
            let engine = Engine::connect(&ctx, &args.local_root)
                .await
                .context("failed to connect tenant's live dependencies")?;
            let deps = engine.deps();
            let outcome = seed_load(&ctx, deps.db, table.as_deref()).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}

fn print_job_outcome(tenant: &str, outcome: &etl_core::JobOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    if !outcome.is_success() {
        anyhow::bail!("job completed with failures for tenant {tenant}");
    }
    Ok(())
}
