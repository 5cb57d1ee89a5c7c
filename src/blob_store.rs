//! Content-addressed blob storage
//!
//! Stores blobs under the sharded layout from [`crate::sharding`]:
//!
//! ```text
//! blobs/
//! ├── .tmp/                  # in-flight uploads
//! ├── ru7u2/
//! │   └── baeaaaiq...fru7u2
//! └── QuP/
//!     └── QmY7Yh4U...jQuPU
//! ```
//!
//! Incoming bytes land in `.tmp/` first, are hashed from disk, and are only
//! moved into their shard once the CID checks out.

use crate::cid_util::{compute_path_cid, is_legacy_cid};
use crate::error::NodeError;
use crate::sharding::ShardPath;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const TMP_DIR: &str = ".tmp";

/// Result of storing a blob
#[derive(Debug, Clone)]
pub struct StoreResult {
    /// CID the blob is stored under
    pub cid: String,
    /// Absolute path of the stored file
    pub path: PathBuf,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Whether blob already existed
    pub already_existed: bool,
}

/// Blob storage manager
pub struct BlobStore {
    /// Root directory for blob storage
    root_dir: PathBuf,
}

impl BlobStore {
    /// Create a new blob store at the given directory
    pub async fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self, NodeError> {
        let root_dir = root_dir.as_ref().to_path_buf();

        fs::create_dir_all(root_dir.join(TMP_DIR)).await?;

        info!(path = %root_dir.display(), "Initialized blob store");

        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get path for a blob by CID
    pub fn blob_path(&self, cid: &str) -> Result<PathBuf, NodeError> {
        Ok(self.root_dir.join(ShardPath::new(cid)?.relative_path()))
    }

    /// Fresh path for an upload in progress
    pub fn temp_path(&self) -> PathBuf {
        self.root_dir.join(TMP_DIR).join(uuid::Uuid::new_v4().to_string())
    }

    /// Check if a blob exists
    pub async fn exists(&self, cid: &str) -> bool {
        match self.blob_path(cid) {
            Ok(path) => fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Move the file at `tmp_path` into the store under `expected_cid`.
    ///
    /// The file is hashed first and rejected on mismatch. Legacy identifiers
    /// cannot be reproduced by hashing, so they are stored unverified.
    /// `tmp_path` is consumed in every case.
    pub async fn store_file(&self, expected_cid: &str, tmp_path: &Path) -> Result<StoreResult, NodeError> {
        let result = self.place(expected_cid, tmp_path).await;
        if result.is_err() || matches!(result, Ok(ref r) if r.already_existed) {
            fs::remove_file(tmp_path).await.ok();
        }
        result
    }

    async fn place(&self, expected_cid: &str, tmp_path: &Path) -> Result<StoreResult, NodeError> {
        let dest = self.blob_path(expected_cid)?;

        if is_legacy_cid(expected_cid) {
            warn!(cid = %expected_cid, "Legacy cid cannot be verified against content, storing as-is");
        } else {
            let path = tmp_path.to_path_buf();
            let computed = tokio::task::spawn_blocking(move || compute_path_cid(path))
                .await
                .map_err(|e| NodeError::Internal(format!("Hash task failed: {}", e)))??;

            if computed != expected_cid {
                return Err(NodeError::CidMismatch {
                    expected: expected_cid.to_string(),
                    computed,
                });
            }
        }

        let size_bytes = fs::metadata(tmp_path).await?.len();

        if fs::metadata(&dest).await.is_ok() {
            debug!(cid = %expected_cid, "Blob already exists");
            return Ok(StoreResult {
                cid: expected_cid.to_string(),
                path: dest,
                size_bytes,
                already_existed: true,
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(tmp_path, &dest).await?;

        info!(cid = %expected_cid, size = size_bytes, path = %dest.display(), "Stored blob");

        Ok(StoreResult {
            cid: expected_cid.to_string(),
            path: dest,
            size_bytes,
            already_existed: false,
        })
    }

    /// Store in-memory bytes under `expected_cid`
    pub async fn store(&self, expected_cid: &str, data: &[u8]) -> Result<StoreResult, NodeError> {
        let tmp = self.temp_path();
        fs::write(&tmp, data).await?;
        self.store_file(expected_cid, &tmp).await
    }

    /// Get storage statistics
    pub async fn stats(&self) -> Result<StorageStats, NodeError> {
        let mut total_blobs = 0u64;
        let mut total_bytes = 0u64;
        let mut shards = 0u64;

        let mut entries = fs::read_dir(&self.root_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name() == TMP_DIR || !entry.file_type().await?.is_dir() {
                continue;
            }
            shards += 1;

            let mut blobs = fs::read_dir(entry.path()).await?;
            while let Some(blob) = blobs.next_entry().await? {
                let metadata = blob.metadata().await?;
                if metadata.is_file() {
                    total_blobs += 1;
                    total_bytes += metadata.len();
                }
            }
        }

        Ok(StorageStats {
            total_blobs,
            total_bytes,
            shards,
        })
    }
}

/// Storage statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct StorageStats {
    pub total_blobs: u64,
    pub total_bytes: u64,
    pub shards: u64,
}
