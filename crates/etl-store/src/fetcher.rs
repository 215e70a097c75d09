//! `BlobProvider` implementation backed by `object_store` (spec §4.2,
//! §6.2). One instance per tenant, built once from that tenant's
//! `StorageCredentials`.

use async_trait::async_trait;
use bytes::Bytes;
use etl_core::error::{DiscoveryError, DownloadError};
use etl_core::{BlobDescriptor, BlobProvider};
use futures::TryStreamExt;
use object_store::{path::Path as ObjPath, ObjectStore};
use std::sync::Arc;

pub struct BlobFetcher {
    store: Arc<dyn ObjectStore>,
}

impl BlobFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

fn to_descriptor(meta: &object_store::ObjectMeta) -> BlobDescriptor {
    BlobDescriptor {
        key: meta.location.to_string(),
        size: meta.size as u64,
        etag: meta.e_tag.clone(),
        last_modified: Some(meta.last_modified),
    }
}

#[async_trait]
impl BlobProvider for BlobFetcher {
    async fn list(&self, prefix: &str) -> Result<Vec<BlobDescriptor>, DiscoveryError> {
        let path = ObjPath::from(prefix);
        let mut stream = self.store.list(Some(&path));
        let mut out = Vec::new();
        while let Some(item) = stream
            .try_next()
            .await
            .map_err(|e| DiscoveryError::ListFailed {
                prefix: prefix.to_string(),
                message: e.to_string(),
            })?
        {
            out.push(to_descriptor(&item));
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn open(&self, descriptor: &BlobDescriptor) -> Result<Bytes, DownloadError> {
        let path = ObjPath::from(descriptor.key.as_str());
        let result = self.store.get(&path).await.map_err(|e| DownloadError::Transient {
            blob: descriptor.key.clone(),
            message: e.to_string(),
        })?;
        let bytes = result.bytes().await.map_err(|e| DownloadError::Transient {
            blob: descriptor.key.clone(),
            message: e.to_string(),
        })?;
        Ok(bytes)
    }

    async fn head(&self, descriptor: &BlobDescriptor) -> Result<BlobDescriptor, DownloadError> {
        let path = ObjPath::from(descriptor.key.as_str());
        let meta = self.store.head(&path).await.map_err(|e| DownloadError::Transient {
            blob: descriptor.key.clone(),
            message: e.to_string(),
        })?;
        Ok(to_descriptor(&meta))
    }
}
