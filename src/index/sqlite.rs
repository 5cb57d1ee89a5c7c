//! SQLite-backed index
//!
//! Implements [`StorageIndex`], [`HostIndex`] and [`DelistIndex`] against a
//! single local database file.
//!
//! ## Tables
//!
//! - `files` - CID (and optional dir CID + file name) → storage path
//! - `cid_lookup` - CID → peer hosts advertising it
//! - `delist_statuses` - append-only delist records

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{schema, DelistIndex, FileRegistry, HostIndex, StorageIndex};
use crate::error::NodeError;

/// Index database for local files, peer hosts and delist statuses
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Open or create the index database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self, NodeError> {
        info!("Opening index database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let index = Self {
            conn: Mutex::new(conn),
        };
        index.with_conn(|conn| schema::init_schema(conn))?;

        Ok(index)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, NodeError> {
        debug!("Opening in-memory index database");

        let index = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        index.with_conn(|conn| schema::init_schema(conn))?;

        Ok(index)
    }

    /// Run `f` with the connection locked
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, NodeError>
    where
        F: FnOnce(&Connection) -> Result<T, NodeError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| NodeError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Record a file held on this node
    pub fn record_file(
        &self,
        cid: &str,
        dir_entry: Option<(&str, &str)>,
        storage_path: &Path,
    ) -> Result<(), NodeError> {
        let (dir_cid, file_name) = match dir_entry {
            Some((dir, name)) => (Some(dir), Some(name)),
            None => (None, None),
        };
        let storage_path = storage_path.to_string_lossy();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (multihash, dir_multihash, file_name, storage_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![cid, dir_cid, file_name, storage_path, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    /// Record that `host` advertises `cid`
    pub fn record_host(&self, cid: &str, host: &str) -> Result<(), NodeError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO cid_lookup (multihash, host) VALUES (?1, ?2)",
                params![cid, host],
            )?;
            Ok(())
        })
    }

    /// Append a delist record
    pub fn record_delist_status(
        &self,
        cid: &str,
        delisted: bool,
        at: DateTime<Utc>,
    ) -> Result<(), NodeError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO delist_statuses (cid, delisted, created_at) VALUES (?1, ?2, ?3)",
                params![cid, delisted, at.timestamp_millis()],
            )?;
            Ok(())
        })
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<IndexStats, NodeError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, NodeError> {
                let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
                Ok(n as u64)
            };

            Ok(IndexStats {
                files: count("files")?,
                host_entries: count("cid_lookup")?,
                delist_records: count("delist_statuses")?,
            })
        })
    }
}

#[async_trait]
impl StorageIndex for SqliteIndex {
    async fn storage_path_by_hash(&self, cid: &str) -> Result<Option<PathBuf>, NodeError> {
        self.with_conn(|conn| {
            let path: Option<String> = conn
                .query_row(
                    "SELECT storage_path FROM files WHERE multihash = ?1 LIMIT 1",
                    params![cid],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(path.map(PathBuf::from))
        })
    }

    async fn storage_path_by_dir_and_name(
        &self,
        dir_cid: &str,
        file_name: &str,
    ) -> Result<Option<PathBuf>, NodeError> {
        self.with_conn(|conn| {
            let path: Option<String> = conn
                .query_row(
                    "SELECT storage_path FROM files WHERE dir_multihash = ?1 AND file_name = ?2 LIMIT 1",
                    params![dir_cid, file_name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(path.map(PathBuf::from))
        })
    }
}

#[async_trait]
impl HostIndex for SqliteIndex {
    async fn hosts_for_hash(&self, cid: &str) -> Result<Vec<String>, NodeError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT host FROM cid_lookup WHERE multihash = ?1 ORDER BY RANDOM()")?;
            let hosts = stmt
                .query_map(params![cid], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(hosts)
        })
    }
}

#[async_trait]
impl DelistIndex for SqliteIndex {
    async fn delist_status(&self, cid: &str) -> Result<bool, NodeError> {
        self.with_conn(|conn| {
            let delisted: Option<bool> = conn
                .query_row(
                    "SELECT delisted FROM delist_statuses WHERE cid = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    params![cid],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(delisted.unwrap_or(false))
        })
    }
}

#[async_trait]
impl FileRegistry for SqliteIndex {
    async fn register_file(&self, cid: &str, storage_path: &Path) -> Result<(), NodeError> {
        let known = self.storage_path_by_hash(cid).await?;
        if known.as_deref() == Some(storage_path) {
            debug!(cid = %cid, "File already registered");
            return Ok(());
        }
        self.record_file(cid, None, storage_path)
    }
}

/// Index statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStats {
    pub files: u64,
    pub host_entries: u64,
    pub delist_records: u64,
}
