//! # etl-store — provider-agnostic blob listing and download
//!
//! Implements the object-store capability set the engine consumes (spec
//! §4.2, §6.2) over the `object_store` crate: local filesystem, S3/MinIO,
//! GCS, and Azure, selected per tenant by `StorageProvider`. Downloads are
//! sequential by default, atomic at the filesystem level, and
//! automatically decompress `.gz` sources.

pub mod download;
pub mod fetcher;
pub mod provider;

pub use download::{download_all, DownloadOptions, DownloadOutcome};
pub use fetcher::BlobFetcher;
