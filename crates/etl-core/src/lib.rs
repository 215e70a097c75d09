//! # etl-core — shared types and traits for the tenant-etl engine
//!
//! This crate provides the foundational types, traits, and error taxonomy
//! shared by every stage of the pipeline: tenant identity and configuration,
//! the columnar frame abstraction the stages pass between each other, the
//! declarative schema/mapping/computed-column model, and the interfaces the
//! engine expects from its external collaborators (object storage, the
//! database control plane, the bulk-load endpoint, and the constants
//! backend).
//!
//! Concrete implementations of the traits defined here live in the
//! downstream crates (`etl-store`, `etl-load`, ...); this crate only
//! defines the seams.

pub mod blob;
pub mod constants;
pub mod dataframe;
pub mod error;
pub mod load;
pub mod model;
pub mod tenant;

pub use blob::{BlobDescriptor, BlobProvider};
pub use constants::ConstantsBackend;
pub use dataframe::Frame;
pub use error::{
    ConfigError, ConvertError, DiscoveryError, DownloadError, InternalError, LoadError,
    TransformError,
};
pub use load::{DbControl, LiveColumn, LoadResult, LoadStatus, StreamLoadClient};
pub use model::{
    CastPolicy, ChunkDescriptor, ColumnMapping, ColumnMappingEntry, ComputedColumnKind,
    ComputedColumnRule, JobOutcome, PipelineStage, RowFilterRule, SeedOutcome, StageOutcome,
    TableKind, TableSchema,
};
pub use tenant::{Tenant, TenantContext, TenantPaths};
