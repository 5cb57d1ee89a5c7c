//! Delist gate
//!
//! Consulted before content is served. A failed lookup is logged and treated
//! as "not delisted": serving stays available when the index is down, at the
//! cost of takedowns not applying until it recovers.

use std::sync::Arc;
use tracing::error;

use crate::index::DelistIndex;

/// Fail-open delist predicate over a [`DelistIndex`]
#[derive(Clone)]
pub struct DelistGate {
    index: Arc<dyn DelistIndex>,
}

impl DelistGate {
    pub fn new(index: Arc<dyn DelistIndex>) -> Self {
        Self { index }
    }

    /// Whether `cid` is currently delisted
    pub async fn is_delisted(&self, cid: &str) -> bool {
        match self.index.delist_status(cid).await {
            Ok(delisted) => delisted,
            Err(e) => {
                error!(cid = %cid, error = %e, "Delist status lookup failed");
                false
            }
        }
    }
}
