//! Error types for cid-node

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    /// Reading the content stream failed while hashing
    #[error("Input error: {0}")]
    Input(#[source] std::io::Error),

    #[error("expected cid: {expected} but contents hashed to {computed}")]
    CidMismatch { expected: String, computed: String },

    #[error("Malformed cid: {0}")]
    MalformedCid(String),

    #[error("CID encoding error: {0}")]
    Encoding(String),

    /// An index store (storage paths, hosts, delist statuses) failed
    #[error("Index error: {0}")]
    Collaborator(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NodeError {
    /// True for failures reported by an index collaborator
    pub fn is_collaborator(&self) -> bool {
        matches!(self, NodeError::Collaborator(_) | NodeError::Database(_))
    }
}
