//! cid-node - content-addressed storage node
//!
//! Serves files by content identifier (CID) from a sharded local store, and
//! sends clients to a peer when the content lives elsewhere.
//!
//! ## Architecture
//!
//! - **cid_util**: streaming SHA2-256 → CIDv1, validation, legacy detection
//! - **sharding**: CID → `shard/cid` relative path
//! - **resolver**: local lookup, then redirect to a peer that advertises the CID
//! - **legacy**: `/ipfs`, `/content` and `/tracks/cidstream` routes
//! - **delist**: per-CID delist check before anything is served
//! - **index**: collaborator traits plus their SQLite implementation
//!
//! ## Storage Layout
//!
//! ```text
//! <storage_dir>/
//! ├── blobs/                 # Sharded content: <shard>/<cid>
//! │   ├── .tmp/              # Uploads awaiting verification
//! │   └── ru7u2/
//! ├── index.db               # files, cid_lookup, delist_statuses
//! ├── listens.jsonl          # Listen events
//! └── config.toml            # Configuration
//! ```

pub mod blob_store;
pub mod cid_util;
pub mod config;
pub mod context;
pub mod delist;
pub mod error;
pub mod http;
pub mod index;
pub mod legacy;
pub mod listens;
pub mod media;
pub mod resolver;
pub mod sharding;

// Re-exports
pub use blob_store::BlobStore;
pub use cid_util::{compute_file_cid, is_legacy_cid, validate_cid};
pub use config::Config;
pub use context::NodeContext;
pub use delist::DelistGate;
pub use error::NodeError;
pub use http::HttpServer;
pub use index::{DelistIndex, FileRegistry, HostIndex, SqliteIndex, StorageIndex};
pub use legacy::{LegacyRoute, LegacyRouter};
pub use listens::{ListenEvent, ListenLogger};
pub use resolver::{LookupKey, PeerResolver, ResolveOutcome};
pub use sharding::{shard_cid, ShardPath};
