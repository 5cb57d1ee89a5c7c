//! Shard layout for stored blobs
//!
//! Blobs live at `{shard}/{cid}` below the blob root. The shard is a suffix of
//! the identifier string, not a decode of its multihash, so the location of any
//! file can be worked out by hand from its CID:
//!
//! - legacy (`Qm...`): 3 chars, ending one char before the end
//!   (`QmY7...jQuPU` → `QuP`)
//! - current: last 5 chars (`baea...fru7u2` → `ru7u2`)
//!
//! These offsets define the existing on-disk layout and must not change.

use crate::cid_util::is_legacy_cid;
use crate::error::NodeError;
use std::fmt;
use std::path::PathBuf;

/// Shard length for current-format identifiers
pub const CID_SHARD_LEN: usize = 5;

/// Shard length for legacy identifiers
pub const LEGACY_SHARD_LEN: usize = 3;

/// Location of a CID inside the sharded blob layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPath<'a> {
    shard: &'a str,
    cid: &'a str,
}

impl<'a> ShardPath<'a> {
    /// Derive the shard for `cid`.
    ///
    /// Fails for identifiers too short to shard, or containing anything that
    /// would let the path leave its shard directory.
    pub fn new(cid: &'a str) -> Result<Self, NodeError> {
        if cid.is_empty() || cid.contains(|c: char| c == '/' || c == '\\') || cid.contains("..") {
            return Err(NodeError::MalformedCid(cid.to_string()));
        }

        let shard = if is_legacy_cid(cid) {
            cid.get(cid.len() - LEGACY_SHARD_LEN - 1..cid.len() - 1)
        } else if cid.len() >= CID_SHARD_LEN {
            cid.get(cid.len() - CID_SHARD_LEN..)
        } else {
            None
        };

        let shard = shard.ok_or_else(|| NodeError::MalformedCid(cid.to_string()))?;
        Ok(Self { shard, cid })
    }

    /// Shard directory name
    pub fn shard(&self) -> &'a str {
        self.shard
    }

    /// The identifier this path was derived from
    pub fn cid(&self) -> &'a str {
        self.cid
    }

    /// `{shard}/{cid}` as a relative path
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.shard).join(self.cid)
    }
}

impl fmt::Display for ShardPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shard, self.cid)
    }
}

/// Sharded relative path for a CID
pub fn shard_cid(cid: &str) -> Result<PathBuf, NodeError> {
    ShardPath::new(cid).map(|p| p.relative_path())
}
