//! The object-store capability set the engine consumes (spec §6.2).
//!
//! Concrete providers (local filesystem, S3/MinIO, GCS, Azure) live in
//! `etl-store`; this trait is the seam so `etl-runtime` and tests never
//! depend on a specific cloud SDK.

use crate::error::{DiscoveryError, DownloadError};
use async_trait::async_trait;
use bytes::Bytes;

pub use bytes::Bytes as BlobBytes;

/// One listed object, provider-agnostic.
#[derive(Debug, Clone)]
pub struct BlobDescriptor {
    /// Provider-native key/path, e.g. `DimDealer_MS/2024-01-01/part-0.csv`.
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

impl BlobDescriptor {
    /// Last path segment, used as the local file name on download.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Provider-agnostic listing/download capability (spec §4.2, §6.2).
#[async_trait]
pub trait BlobProvider: Send + Sync {
    /// List blobs under a provider-native prefix, sorted lexicographically.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobDescriptor>, DiscoveryError>;

    /// Open a readable byte stream for one descriptor.
    async fn open(&self, descriptor: &BlobDescriptor) -> Result<Bytes, DownloadError>;

    /// Fetch size/etag/last_modified without downloading the body.
    async fn head(&self, descriptor: &BlobDescriptor) -> Result<BlobDescriptor, DownloadError>;
}
