//! Download contract: sequential-by-default, atomic rename, automatic
//! gzip decompression, bounded retry with exponential backoff (spec §4.2
//! "Download contract", "Concurrency and backpressure", "Retry/failure").

use bytes::Bytes;
use etl_core::error::DownloadError;
use etl_core::{BlobDescriptor, BlobProvider};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tunables for one download run; defaults match spec §4.2.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub progress_every_n_blobs: usize,
    pub max_attempts: u32,
    pub fail_fast: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            progress_every_n_blobs: 5,
            max_attempts: 3,
            fail_fast: false,
        }
    }
}

/// Outcome of downloading one blob.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub descriptor: BlobDescriptor,
    pub dest: PathBuf,
    pub error: Option<DownloadError>,
}

fn is_gzip(name: &str) -> bool {
    name.ends_with(".gz")
}

fn strip_gz_suffix(name: &str) -> &str {
    name.strip_suffix(".gz").unwrap_or(name)
}

fn decompress_if_needed(name: &str, bytes: Bytes) -> Result<(String, Vec<u8>), DownloadError> {
    if !is_gzip(name) {
        return Ok((name.to_string(), bytes.to_vec()));
    }
    let mut decoder = flate2::read::GzDecoder::new(bytes.as_ref());
    let mut out = Vec::new();
    std::io::Read::read_to_end(&mut decoder, &mut out).map_err(|e| DownloadError::Permanent {
        blob: name.to_string(),
        message: format!("gzip decode failed: {e}"),
    })?;
    Ok((strip_gz_suffix(name).to_string(), out))
}

/// Write `bytes` atomically to `dest_dir/name`: write to `<name>.part`,
/// fsync, then rename. No observer ever sees a partial file at the final
/// name (spec §8 invariant).
fn write_atomic(dest_dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
    std::fs::create_dir_all(dest_dir).map_err(|e| DownloadError::Permanent {
        blob: name.to_string(),
        message: e.to_string(),
    })?;
    let final_path = dest_dir.join(name);
    let part_path = dest_dir.join(format!("{name}.part"));

    let mut file = std::fs::File::create(&part_path).map_err(|e| DownloadError::Permanent {
        blob: name.to_string(),
        message: e.to_string(),
    })?;
    file.write_all(bytes).map_err(|e| DownloadError::Permanent {
        blob: name.to_string(),
        message: e.to_string(),
    })?;
    file.sync_all().map_err(|e| DownloadError::Permanent {
        blob: name.to_string(),
        message: e.to_string(),
    })?;
    std::fs::rename(&part_path, &final_path).map_err(|e| DownloadError::Permanent {
        blob: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(final_path)
}

async fn download_one(
    provider: &dyn BlobProvider,
    descriptor: &BlobDescriptor,
    dest_dir: &Path,
    max_attempts: u32,
) -> Result<PathBuf, DownloadError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match provider.open(descriptor).await {
            Ok(bytes) => {
                if bytes.len() as u64 != descriptor.size && descriptor.size > 0 {
                    return Err(DownloadError::Integrity {
                        blob: descriptor.key.clone(),
                        expected: descriptor.size,
                        actual: bytes.len() as u64,
                    });
                }
                let (name, decompressed) = decompress_if_needed(descriptor.file_name(), bytes)?;
                return write_atomic(dest_dir, &name, &decompressed);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let backoff = Duration::from_secs(2u64.pow(attempt.min(5)));
                warn!(blob = descriptor.key.as_str(), attempt, "retrying download after transient error");
                tokio::time::sleep(backoff).await;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Download every listed blob into `dest_dir`, sequentially by default
/// (spec §4.2, §5). Returns one outcome per blob; a failure does not abort
/// the run unless `fail_fast` is set.
pub async fn download_all(
    provider: &dyn BlobProvider,
    blobs: &[BlobDescriptor],
    dest_dir: &Path,
    options: &DownloadOptions,
    cancel: &CancellationToken,
) -> Result<Vec<DownloadOutcome>, DownloadError> {
    let mut out = Vec::with_capacity(blobs.len());
    for (i, descriptor) in blobs.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let result = download_one(provider, descriptor, dest_dir, options.max_attempts).await;
        match result {
            Ok(dest) => out.push(DownloadOutcome {
                descriptor: descriptor.clone(),
                dest,
                error: None,
            }),
            Err(e) => {
                if options.fail_fast {
                    return Err(e);
                }
                out.push(DownloadOutcome {
                    descriptor: descriptor.clone(),
                    dest: dest_dir.join(descriptor.file_name()),
                    error: Some(e),
                });
            }
        }

        if (i + 1) % options.progress_every_n_blobs == 0 {
            info!(downloaded = i + 1, total = blobs.len(), "download progress");
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use etl_core::error::{DiscoveryError, DownloadError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeProvider {
        blobs: HashMap<String, Vec<u8>>,
        fail_once: Mutex<HashMap<String, u32>>,
    }

    #[async_trait]
    impl BlobProvider for FakeProvider {
        async fn list(&self, _prefix: &str) -> Result<Vec<BlobDescriptor>, DiscoveryError> {
            unimplemented!()
        }

        async fn open(&self, descriptor: &BlobDescriptor) -> Result<Bytes, DownloadError> {
            let mut attempts = self.fail_once.lock().unwrap();
            let remaining = attempts.entry(descriptor.key.clone()).or_insert(0);
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DownloadError::Transient {
                    blob: descriptor.key.clone(),
                    message: "simulated".to_string(),
                });
            }
            Ok(Bytes::from(self.blobs.get(&descriptor.key).unwrap().clone()))
        }

        async fn head(&self, descriptor: &BlobDescriptor) -> Result<BlobDescriptor, DownloadError> {
            Ok(descriptor.clone())
        }
    }

    #[tokio::test]
    async fn downloads_write_final_file_with_no_part_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut blobs = HashMap::new();
        blobs.insert("DimDealer/part-0.csv".to_string(), b"a,b\n1,2\n".to_vec());
        let provider = FakeProvider {
            blobs,
            fail_once: Mutex::new(HashMap::new()),
        };
        let descriptors = vec![BlobDescriptor {
            key: "DimDealer/part-0.csv".to_string(),
            size: 8,
            etag: None,
            last_modified: None,
        }];

        let outcomes = download_all(
            &provider,
            &descriptors,
            dir.path(),
            &DownloadOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcomes[0].error.is_none());
        assert!(outcomes[0].dest.is_file());
        assert!(!dir.path().join("part-0.csv.part").exists());
    }

    #[tokio::test]
    async fn gzip_blobs_are_decompressed_and_renamed_without_gz_suffix() {
        use std::io::Write as _;
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"a,b\n1,2\n").unwrap();
        let gz_bytes = encoder.finish().unwrap();

        let mut blobs = HashMap::new();
        blobs.insert("DimDealer/part-0.csv.gz".to_string(), gz_bytes);
        let provider = FakeProvider {
            blobs,
            fail_once: Mutex::new(HashMap::new()),
        };
        let descriptors = vec![BlobDescriptor {
            key: "DimDealer/part-0.csv.gz".to_string(),
            size: 0,
            etag: None,
            last_modified: None,
        }];

        let outcomes = download_all(
            &provider,
            &descriptors,
            dir.path(),
            &DownloadOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcomes[0].error.is_none());
        assert_eq!(outcomes[0].dest.file_name().unwrap(), "part-0.csv");
        let contents = std::fs::read_to_string(&outcomes[0].dest).unwrap();
        assert_eq!(contents, "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let mut blobs = HashMap::new();
        blobs.insert("DimDealer/part-0.csv".to_string(), b"a,b\n1,2\n".to_vec());
        let mut fail_once = HashMap::new();
        fail_once.insert("DimDealer/part-0.csv".to_string(), 2);
        let provider = FakeProvider {
            blobs,
            fail_once: Mutex::new(fail_once),
        };
        let descriptors = vec![BlobDescriptor {
            key: "DimDealer/part-0.csv".to_string(),
            size: 8,
            etag: None,
            last_modified: None,
        }];

        let outcomes = download_all(
            &provider,
            &descriptors,
            dir.path(),
            &DownloadOptions {
                max_attempts: 3,
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcomes[0].error.is_none());
    }
}
