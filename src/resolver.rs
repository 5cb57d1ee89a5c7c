//! Peer resolution
//!
//! Decides, per request, whether content is served from local disk, redirected
//! to a peer that advertises it, or reported missing.
//!
//! ## Resolution Flow
//!
//! 1. Look up a local storage path (by CID, or by dir CID + file name)
//! 2. Hit → serve locally
//! 3. Miss and `localOnly` requested → not found, never redirect
//! 4. Miss → ask the host index for peers holding the CID (already shuffled)
//! 5. First peer → 302 to the same URL on that host; no peers → not found
//!
//! Index failures are logged with the CID and request path and returned to the
//! caller. Nothing here retries.

use hyper::{StatusCode, Uri};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::NodeError;
use crate::index::{HostIndex, StorageIndex};

/// What to look up in the local storage index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey<'a> {
    /// A file addressed by its own CID
    Cid(&'a str),
    /// A file addressed as `{dir_cid}/{file_name}`
    DirFile { dir_cid: &'a str, file_name: &'a str },
}

impl<'a> LookupKey<'a> {
    /// CID used when asking peers; the file name plays no part in redirects
    pub fn redirect_cid(&self) -> &'a str {
        match *self {
            LookupKey::Cid(cid) => cid,
            LookupKey::DirFile { dir_cid, .. } => dir_cid,
        }
    }
}

/// Result of resolving a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Content is on local disk at this path
    ServeLocal(PathBuf),
    /// Content lives on a peer; send the client there
    Redirect(Uri),
    /// Not held locally and the caller asked not to be redirected
    NotFoundLocalOnly,
    /// Not held locally and no peer advertises the CID
    NotFoundNoHost(String),
}

impl ResolveOutcome {
    /// HTTP status this outcome is reported with
    pub fn status(&self) -> StatusCode {
        match self {
            ResolveOutcome::ServeLocal(_) => StatusCode::OK,
            ResolveOutcome::Redirect(_) => StatusCode::FOUND,
            ResolveOutcome::NotFoundLocalOnly | ResolveOutcome::NotFoundNoHost(_) => {
                StatusCode::NOT_FOUND
            }
        }
    }

    /// Plain-text body for the not-found outcomes
    pub fn not_found_message(&self) -> Option<String> {
        match self {
            ResolveOutcome::NotFoundLocalOnly => {
                Some("not redirecting because localOnly=true".to_string())
            }
            ResolveOutcome::NotFoundNoHost(cid) => Some(format!("no host found with cid: {}", cid)),
            _ => None,
        }
    }
}

/// Resolves content to a local path or a peer redirect
#[derive(Clone)]
pub struct PeerResolver {
    storage: Arc<dyn StorageIndex>,
    hosts: Arc<dyn HostIndex>,
}

impl PeerResolver {
    pub fn new(storage: Arc<dyn StorageIndex>, hosts: Arc<dyn HostIndex>) -> Self {
        Self { storage, hosts }
    }

    /// Resolve `key` for a request made to `request_url`
    pub async fn resolve(
        &self,
        request_url: &Uri,
        key: LookupKey<'_>,
        local_only: bool,
    ) -> Result<ResolveOutcome, NodeError> {
        let lookup = match key {
            LookupKey::Cid(cid) => self.storage.storage_path_by_hash(cid).await,
            LookupKey::DirFile { dir_cid, file_name } => {
                self.storage
                    .storage_path_by_dir_and_name(dir_cid, file_name)
                    .await
            }
        };

        match lookup {
            Ok(Some(path)) => Ok(ResolveOutcome::ServeLocal(path)),
            Ok(None) => {
                self.redirect_to_cid(request_url, key.redirect_cid(), local_only)
                    .await
            }
            Err(e) => {
                error!(
                    cid = %key.redirect_cid(),
                    path = %request_url.path(),
                    error = %e,
                    "Error querying storage path"
                );
                Err(e)
            }
        }
    }

    /// Skip the local lookup and go straight to peer resolution
    pub async fn redirect_to_cid(
        &self,
        request_url: &Uri,
        cid: &str,
        local_only: bool,
    ) -> Result<ResolveOutcome, NodeError> {
        if local_only {
            return Ok(ResolveOutcome::NotFoundLocalOnly);
        }

        let hosts = self.hosts.hosts_for_hash(cid).await.map_err(|e| {
            error!(
                cid = %cid,
                path = %request_url.path(),
                error = %e,
                "Error querying hosts for cid"
            );
            e
        })?;

        info!(cid = %cid, hosts = ?hosts, "Potential hosts for cid");

        // TODO: skip hosts that are known to be down once peer health is tracked
        match hosts.first() {
            Some(host) => {
                let dest = replace_host(request_url, host)?;
                info!(cid = %cid, dest = %dest, "Redirecting");
                Ok(ResolveOutcome::Redirect(dest))
            }
            None => {
                info!(cid = %cid, "No host found with cid");
                Ok(ResolveOutcome::NotFoundNoHost(cid.to_string()))
            }
        }
    }
}

/// Point `url` at `host`, keeping path and query untouched.
///
/// `host` is either a bare authority (`peer:4000`), which keeps the request's
/// scheme, or a base URL (`https://peer.example`), whose scheme is used.
pub fn replace_host(url: &Uri, host: &str) -> Result<Uri, NodeError> {
    let (scheme, authority) = match host.split_once("://") {
        Some((scheme, rest)) => (scheme, rest.split('/').next().unwrap_or(rest)),
        None => (url.scheme_str().unwrap_or("http"), host),
    };

    if authority.is_empty() {
        return Err(NodeError::Collaborator(format!("invalid host entry: {:?}", host)));
    }

    let path_and_query = url.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| NodeError::Collaborator(format!("invalid host entry {:?}: {}", host, e)))
}
