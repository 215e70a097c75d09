//! Build a concrete `object_store::ObjectStore` for a tenant's configured
//! provider (spec §4.2 "Provider variants supported"). MinIO is just the S3
//! builder pointed at a custom endpoint with path-style addressing, not a
//! separate implementation.

use etl_core::tenant::{StorageCredentials, StorageProvider};
use object_store::{azure::MicrosoftAzureBuilder, aws::AmazonS3Builder, gcp::GoogleCloudStorageBuilder};
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use std::sync::Arc;

pub fn build(creds: &StorageCredentials, local_root: &std::path::Path) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match creds.provider {
        StorageProvider::Local => {
            std::fs::create_dir_all(local_root)?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(local_root)?))
        }
        StorageProvider::Azure => {
            let mut builder = MicrosoftAzureBuilder::new().with_container_name(&creds.container_or_bucket);
            if let Some(account) = &creds.account {
                builder = builder.with_account(account);
            }
            if let Some(conn) = &creds.connection_string {
                builder = builder.with_connection_string(conn);
            } else if let Some(sas) = &creds.sas_token {
                builder = builder.with_config(object_store::azure::AzureConfigKey::SasKey, sas);
            }
            Ok(Arc::new(builder.build()?))
        }
        StorageProvider::S3 => {
            let mut builder = AmazonS3Builder::new().with_bucket_name(&creds.container_or_bucket);
            if let Some(region) = &creds.region {
                builder = builder.with_region(region);
            }
            if let Some(key) = &creds.access_key {
                builder = builder.with_access_key_id(key);
            }
            if let Some(secret) = &creds.secret_key {
                builder = builder.with_secret_access_key(secret);
            }
            Ok(Arc::new(builder.build()?))
        }
        StorageProvider::MinIo => {
            let mut builder = AmazonS3Builder::new()
                .with_bucket_name(&creds.container_or_bucket)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(true);
            if let Some(endpoint) = &creds.endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            if let Some(region) = &creds.region {
                builder = builder.with_region(region);
            }
            if let Some(key) = &creds.access_key {
                builder = builder.with_access_key_id(key);
            }
            if let Some(secret) = &creds.secret_key {
                builder = builder.with_secret_access_key(secret);
            }
            Ok(Arc::new(builder.build()?))
        }
        StorageProvider::Gcs => {
            let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(&creds.container_or_bucket);
            if let Some(endpoint) = &creds.endpoint {
                builder = builder.with_service_account_path(endpoint);
            }
            Ok(Arc::new(builder.build()?))
        }
    }
}
