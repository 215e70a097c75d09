//! # etl-runtime — PipelineRunner and scheduler-facing job entry points
//!
//! Composes the five stages (`etl-store` → `etl-convert` → `etl-transform`
//! → `etl-load`) for one `(tenant, table)` unit, owns temp-path layout and
//! the per-table state machine, and exposes the four named jobs a
//! scheduler invokes (spec §4.6, §6.6). This crate plays the role the
//! teacher's `main.rs` played — wiring concrete operators together — but
//! factored into plain async functions instead of a binary, so `bins/
//! etl-cli` is a thin dispatcher rather than the place business logic
//! lives.

pub mod constants;
pub mod deps;
pub mod jobs;
pub mod runner;
pub mod seeds;
pub mod wiring;

pub use constants::{HttpConstantsBackend, InMemoryConstantsBackend, SqlxConstantsBackend};
pub use deps::PipelineDeps;
pub use jobs::{
    evening_dimension_refresh, morning_dimension_incremental, morning_fact_incremental, run_job,
    JobSpec, TableRole, TableRunSpec,
};
pub use runner::{run_table, RunMode};
pub use seeds::seed_load;
pub use wiring::Engine;
