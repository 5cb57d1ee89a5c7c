//! Index collaborators
//!
//! The resolver never touches a database directly. It asks three questions,
//! each behind a trait so any store can answer them:
//!
//! - [`StorageIndex`] - where on local disk is this CID (or dir CID + file name)?
//! - [`HostIndex`] - which peers advertise this CID?
//! - [`DelistIndex`] - is this CID currently delisted?
//!
//! Ingest writes through [`FileRegistry`]. [`SqliteIndex`] implements all four
//! against a local SQLite file.

pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::NodeError;

pub use sqlite::{IndexStats, SqliteIndex};

/// Local storage paths for content held by this node
#[async_trait]
pub trait StorageIndex: Send + Sync {
    /// Storage path of the file with this CID, `None` if not held here
    async fn storage_path_by_hash(&self, cid: &str) -> Result<Option<PathBuf>, NodeError>;

    /// Storage path of `file_name` inside the directory `dir_cid`
    async fn storage_path_by_dir_and_name(
        &self,
        dir_cid: &str,
        file_name: &str,
    ) -> Result<Option<PathBuf>, NodeError>;
}

/// Peers known to hold a CID
#[async_trait]
pub trait HostIndex: Send + Sync {
    /// Hosts advertising `cid`, in a fresh random order on every call
    async fn hosts_for_hash(&self, cid: &str) -> Result<Vec<String>, NodeError>;
}

/// Delist records for content
#[async_trait]
pub trait DelistIndex: Send + Sync {
    /// Status from the most recent record, `false` when there is none
    async fn delist_status(&self, cid: &str) -> Result<bool, NodeError>;
}

/// Records files this node has stored
#[async_trait]
pub trait FileRegistry: Send + Sync {
    async fn register_file(&self, cid: &str, storage_path: &Path) -> Result<(), NodeError>;
}
