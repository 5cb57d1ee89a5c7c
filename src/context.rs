//! Per-node context handed to every request handler
//!
//! Holds the index collaborators, blob store and listen logger. Built once at
//! startup and shared behind an `Arc`; nothing in it is mutated per request.

use std::sync::Arc;

use crate::blob_store::BlobStore;
use crate::config::Config;
use crate::delist::DelistGate;
use crate::index::{FileRegistry, SqliteIndex};
use crate::listens::ListenLogger;
use crate::resolver::PeerResolver;

pub struct NodeContext {
    /// Identifier of this node
    pub host_id: String,
    /// Scheme used to rebuild absolute request URLs
    pub public_scheme: String,
    pub resolver: PeerResolver,
    pub delist: DelistGate,
    pub listens: ListenLogger,
    pub blob_store: Arc<BlobStore>,
    pub registry: Arc<dyn FileRegistry>,
}

impl NodeContext {
    /// Context with every collaborator answered by one SQLite index
    pub fn new(
        config: &Config,
        index: Arc<SqliteIndex>,
        blob_store: Arc<BlobStore>,
        listens: ListenLogger,
    ) -> Self {
        Self {
            host_id: config.host_id.clone(),
            public_scheme: config.public_scheme.clone(),
            resolver: PeerResolver::new(index.clone(), index.clone()),
            delist: DelistGate::new(index.clone()),
            listens,
            blob_store,
            registry: index,
        }
    }
}
