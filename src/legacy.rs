//! Legacy addressing schemes
//!
//! Older clients fetch content by flat CID or by directory CID plus file name:
//!
//! - `GET/HEAD /ipfs/{cid}`, `/content/{cid}` - flat
//! - `GET/HEAD /tracks/cidstream/{cid}` - flat, streaming route for audio
//! - `GET/HEAD /ipfs/{dirCid}/{fileName}`, `/content/{dirCid}/{fileName}` - directory
//!
//! Both schemes go through the delist gate and then
//! [`PeerResolver`](crate::resolver::PeerResolver): serve the local copy,
//! redirect to a peer, or answer 404. Local serves honor `Range` (206, or
//! 416 when unsatisfiable) and `If-None-Match` (304), reading only the
//! requested bytes from disk. Flat local serves that send content also record
//! a listen event. Outside the streaming route, audio responses carry
//! `x-would-block: true` so clients know to move to `/tracks/cidstream`.
//!
//! Append `?localOnly=true` to any route to never be redirected.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode, Uri};
use std::io::{self, SeekFrom};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, error, info, warn};

use crate::context::NodeContext;
use crate::error::NodeError;
use crate::http::{build_error, text_response, HttpResponse};
use crate::media;
use crate::resolver::{LookupKey, ResolveOutcome};

/// Advisory header set on audio served outside the streaming route
pub const WOULD_BLOCK_HEADER: &str = "x-would-block";

/// Body of the 403 sent for delisted content
pub const DELISTED_MESSAGE: &str = "cid is delisted by this node";

const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

/// A request path understood by the legacy router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyRoute<'a> {
    /// `/ipfs/{cid}`, `/content/{cid}` or `/tracks/cidstream/{cid}`
    Cid { cid: &'a str, streaming: bool },
    /// `/ipfs/{dir_cid}/{file_name}` or `/content/{dir_cid}/{file_name}`
    DirFile { dir_cid: &'a str, file_name: &'a str },
}

impl<'a> LegacyRoute<'a> {
    /// Identifier named in the path (the dir CID for directory routes)
    pub fn cid(&self) -> &'a str {
        self.lookup_key().redirect_cid()
    }

    pub fn lookup_key(&self) -> LookupKey<'a> {
        match *self {
            LegacyRoute::Cid { cid, .. } => LookupKey::Cid(cid),
            LegacyRoute::DirFile { dir_cid, file_name } => LookupKey::DirFile { dir_cid, file_name },
        }
    }
}

/// Match `path` against the legacy routes
pub fn parse_legacy_route(path: &str) -> Option<LegacyRoute<'_>> {
    if let Some(cid) = path.strip_prefix("/tracks/cidstream/") {
        if cid.is_empty() || cid.contains('/') {
            return None;
        }
        return Some(LegacyRoute::Cid { cid, streaming: true });
    }

    let rest = path
        .strip_prefix("/ipfs/")
        .or_else(|| path.strip_prefix("/content/"))?;

    let mut segments = rest.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(cid), None, None) if !cid.is_empty() => Some(LegacyRoute::Cid {
            cid,
            streaming: false,
        }),
        (Some(dir_cid), Some(file_name), None) if !dir_cid.is_empty() && !file_name.is_empty() => {
            Some(LegacyRoute::DirFile { dir_cid, file_name })
        }
        _ => None,
    }
}

/// What the router needs from an incoming request
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Absolute URL of the request, used as the base for redirects
    pub url: Uri,
    /// HEAD request: headers only
    pub head_only: bool,
    /// `localOnly=true` was passed
    pub local_only: bool,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub range: Option<String>,
    pub if_none_match: Option<String>,
}

impl RequestInfo {
    pub fn from_request<B>(
        req: &Request<B>,
        public_scheme: &str,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Self, NodeError> {
        let header_str = |name: HeaderName| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Ok(Self {
            url: absolute_url(req, public_scheme)?,
            head_only: *req.method() == Method::HEAD,
            local_only: local_only_requested(req.uri()),
            remote_addr: remote_addr.map(|a| a.to_string()),
            user_agent: header_str(header::USER_AGENT),
            range: header_str(header::RANGE),
            if_none_match: header_str(header::IF_NONE_MATCH),
        })
    }
}

/// Rebuild the absolute URL a client used, from the Host header when the
/// request line only carries a path
fn absolute_url<B>(req: &Request<B>, public_scheme: &str) -> Result<Uri, NodeError> {
    let uri = req.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(uri.clone());
    }

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Uri::builder()
        .scheme(public_scheme)
        .authority(host)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| NodeError::Internal(format!("Invalid request url: {}", e)))
}

/// First `localOnly` query value equals `true`
pub fn local_only_requested(uri: &Uri) -> bool {
    uri.query()
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "localOnly")
                .map(|(_, value)| value == "true")
        })
        .unwrap_or(false)
}

/// Parse a `Range` header against a file of `total_size` bytes.
/// Supports `bytes=start-end`, `bytes=start-` and `bytes=-suffix`.
///
/// Returns `(start, end)` with `end` exclusive, or `None` when the header is
/// malformed or selects nothing in the file. An `end` past the file is cut
/// to the last byte.
fn parse_range_header(range_header: &str, total_size: u64) -> Option<(u64, u64)> {
    let range_str = range_header.trim().strip_prefix("bytes=")?;

    if let Some(suffix) = range_str.strip_prefix('-') {
        let suffix: u64 = suffix.parse().ok()?;
        if suffix == 0 || total_size == 0 {
            return None;
        }
        return Some((total_size.saturating_sub(suffix), total_size));
    }

    let (start, end) = range_str.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end = if end.is_empty() {
        total_size
    } else {
        let end: u64 = end.parse().ok()?;
        end.checked_add(1)?.min(total_size)
    };

    if start >= total_size || start >= end {
        return None;
    }

    Some((start, end))
}

/// `If-None-Match` names `etag` (or `*`)
fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|tag| tag == "*" || tag.strip_prefix("W/").unwrap_or(tag) == etag)
}

/// Local file opened for serving
struct LocalFile {
    file: File,
    content_type: &'static str,
    len: u64,
}

impl LocalFile {
    async fn open(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path).await?;
        let len = file.metadata().await?.len();
        let content_type = media::sniff_file(&mut file).await?;
        Ok(Self {
            file,
            content_type,
            len,
        })
    }

    /// Read bytes `start..end` from disk
    async fn read_span(&mut self, start: u64, end: u64) -> io::Result<Bytes> {
        let want = end - start;
        self.file.seek(SeekFrom::Start(start)).await?;

        let mut buf = Vec::with_capacity(want as usize);
        (&mut self.file).take(want).read_to_end(&mut buf).await?;
        if buf.len() as u64 != want {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file ended after {} of {} bytes", buf.len(), want),
            ));
        }
        Ok(Bytes::from(buf))
    }
}

/// Serves the legacy routes against a node context
#[derive(Clone)]
pub struct LegacyRouter {
    ctx: Arc<NodeContext>,
}

impl LegacyRouter {
    pub fn new(ctx: Arc<NodeContext>) -> Self {
        Self { ctx }
    }

    /// Answer `route`: 200/206/304/416 from local disk, 302 to a peer, 403 or 404
    pub async fn handle(
        &self,
        route: LegacyRoute<'_>,
        info: &RequestInfo,
    ) -> Result<HttpResponse, NodeError> {
        let cid = route.cid();

        if self.ctx.delist.is_delisted(cid).await {
            info!(cid = %cid, "Refusing delisted cid");
            return Ok(text_response(StatusCode::FORBIDDEN, DELISTED_MESSAGE));
        }

        match self
            .ctx
            .resolver
            .resolve(&info.url, route.lookup_key(), info.local_only)
            .await?
        {
            ResolveOutcome::ServeLocal(path) => self.serve_local(route, &path, info).await,
            outcome => outcome_response(outcome),
        }
    }

    async fn serve_local(
        &self,
        route: LegacyRoute<'_>,
        path: &Path,
        info: &RequestInfo,
    ) -> Result<HttpResponse, NodeError> {
        let mut local = match LocalFile::open(path).await {
            Ok(local) => local,
            Err(e) => return self.fall_back_to_peer(route, path, info, e).await,
        };

        let etag = match route {
            LegacyRoute::Cid { cid, .. } => format!("\"{}\"", cid),
            LegacyRoute::DirFile { dir_cid, file_name } => format!("\"{}/{}\"", dir_cid, file_name),
        };

        if let Some(if_none_match) = &info.if_none_match {
            if etag_matches(if_none_match, &etag) {
                debug!(cid = %route.cid(), "ETag match, returning 304");
                return Response::builder()
                    .status(StatusCode::NOT_MODIFIED)
                    .header(header::ETAG, etag)
                    .header(header::CACHE_CONTROL, IMMUTABLE_CACHE)
                    .body(Full::new(Bytes::new()))
                    .map_err(build_error);
            }
        }

        let span = match &info.range {
            Some(range) => match parse_range_header(range, local.len) {
                Some(span) => Some(span),
                None => {
                    warn!(cid = %route.cid(), range = %range, size = local.len, "Invalid range header");
                    return Response::builder()
                        .status(StatusCode::RANGE_NOT_SATISFIABLE)
                        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                        .header(header::CONTENT_RANGE, format!("bytes */{}", local.len))
                        .body(Full::new(Bytes::from_static(b"Invalid range")))
                        .map_err(build_error);
                }
            },
            None => None,
        };
        let (start, end) = span.unwrap_or((0, local.len));

        let body = if info.head_only {
            Bytes::new()
        } else {
            match local.read_span(start, end).await {
                Ok(body) => body,
                Err(e) => return self.fall_back_to_peer(route, path, info, e).await,
            }
        };

        let mut builder = Response::builder()
            .header(header::CONTENT_TYPE, local.content_type)
            .header(header::CONTENT_LENGTH, end - start)
            .header(header::ETAG, etag)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CACHE_CONTROL, IMMUTABLE_CACHE);

        builder = match span {
            Some(_) => builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end - 1, local.len),
                ),
            None => builder.status(StatusCode::OK),
        };

        if let LegacyRoute::Cid { cid, streaming } = route {
            if !streaming && media::is_audio(local.content_type) {
                builder = builder.header(WOULD_BLOCK_HEADER, HeaderValue::from_static("true"));
            }
            if !info.head_only {
                self.record_listen(cid, path, info);
            }
        }

        info!(
            cid = %route.cid(),
            path = %path.display(),
            content_type = local.content_type,
            range = format!("{}-{}", start, end),
            size = local.len,
            "Serving local file"
        );

        builder.body(Full::new(body)).map_err(build_error)
    }

    /// Local copy could not be read: log it and try a peer instead
    async fn fall_back_to_peer(
        &self,
        route: LegacyRoute<'_>,
        path: &Path,
        info: &RequestInfo,
        e: io::Error,
    ) -> Result<HttpResponse, NodeError> {
        error!(
            cid = %route.cid(),
            path = %path.display(),
            error = %e,
            "Error serving local file, trying peers"
        );
        let outcome = self
            .ctx
            .resolver
            .redirect_to_cid(&info.url, route.cid(), info.local_only)
            .await?;
        outcome_response(outcome)
    }

    fn record_listen(&self, cid: &str, path: &Path, info: &RequestInfo) {
        let listens = &self.ctx.listens;
        if !listens.is_enabled() {
            return;
        }

        let mut event = listens.event(cid).with_storage_path(path.display().to_string());
        if let Some(addr) = &info.remote_addr {
            event = event.with_remote_addr(addr.clone());
        }
        if let Some(user_agent) = &info.user_agent {
            event = event.with_user_agent(user_agent.clone());
        }
        if let Some(range) = &info.range {
            event = event.with_range(range.clone());
        }

        if !listens.record(event) {
            debug!(cid = %cid, "Listen not recorded");
        }
    }
}

/// Response for a redirect or not-found outcome
fn outcome_response(outcome: ResolveOutcome) -> Result<HttpResponse, NodeError> {
    match outcome {
        ResolveOutcome::Redirect(dest) => Response::builder()
            .status(StatusCode::FOUND)
            .header(header::LOCATION, dest.to_string())
            .body(Full::new(Bytes::new()))
            .map_err(build_error),
        ResolveOutcome::ServeLocal(path) => Err(NodeError::Internal(format!(
            "unexpected local outcome for {}",
            path.display()
        ))),
        not_found => {
            let message = not_found.not_found_message().unwrap_or_default();
            Ok(text_response(not_found.status(), message))
        }
    }
}
