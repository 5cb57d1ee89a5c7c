//! Index database schema

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::NodeError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), NodeError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new index schema v{}", SCHEMA_VERSION);
        conn.execute_batch(INDEX_SCHEMA)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating index schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Index schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, NodeError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), NodeError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

const INDEX_SCHEMA: &str = r#"
-- Files held on this node's disk
-- dir_multihash/file_name are set for files addressed as {dirCid}/{fileName}
CREATE TABLE IF NOT EXISTS files (
    multihash TEXT NOT NULL,
    dir_multihash TEXT,
    file_name TEXT,
    storage_path TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Which peer hosts advertise which CIDs
CREATE TABLE IF NOT EXISTS cid_lookup (
    multihash TEXT NOT NULL,
    host TEXT NOT NULL,
    PRIMARY KEY (multihash, host)
);

-- Append-only delist records; the newest row per cid wins
CREATE TABLE IF NOT EXISTS delist_statuses (
    cid TEXT NOT NULL,
    delisted INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_multihash ON files(multihash);
CREATE INDEX IF NOT EXISTS idx_files_dir ON files(dir_multihash, file_name);
CREATE INDEX IF NOT EXISTS idx_delist_cid ON delist_statuses(cid, created_at);
"#;
