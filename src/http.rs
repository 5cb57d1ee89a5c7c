//! HTTP server for content routes
//!
//! ## Routes
//! - `GET /health` - Node status and blob store stats
//! - `PUT /blob/{cid}` - Store a file under its CID on this node
//! - `GET/HEAD /ipfs/{cid}`, `/content/{cid}`, `/tracks/cidstream/{cid}`
//! - `GET/HEAD /ipfs/{dirCid}/{fileName}`, `/content/{dirCid}/{fileName}`
//!
//! The content routes are served by [`LegacyRouter`].
//!
//! ## Example Usage
//!
//! ```bash
//! # Store a file (the CID must match the content)
//! curl -X PUT --data-binary @track.mp3 \
//!      http://localhost:8090/blob/baeaaaiqsec...
//!
//! # Fetch it, never redirecting to a peer
//! curl "http://localhost:8090/ipfs/baeaaaiqsec...?localOnly=true" > track.mp3
//! ```

use crate::cid_util::{is_legacy_cid, parse_cid};
use crate::context::NodeContext;
use crate::error::NodeError;
use crate::legacy::{parse_legacy_route, LegacyRouter, RequestInfo};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

pub type HttpResponse = Response<Full<Bytes>>;

/// Plain-text response
pub fn text_response(status: StatusCode, body: impl Into<String>) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(body.into())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Map a response builder failure
pub(crate) fn build_error<E: Display>(e: E) -> NodeError {
    NodeError::Internal(format!("Failed to build response: {}", e))
}

/// HTTP server state
pub struct HttpServer {
    ctx: Arc<NodeContext>,
    router: LegacyRouter,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(ctx: Arc<NodeContext>, bind_addr: SocketAddr) -> Self {
        Self {
            router: LegacyRouter::new(ctx.clone()),
            ctx,
            bind_addr,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), NodeError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle(req, Some(remote_addr)).await) }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route a request. Handler errors become 500 responses.
    pub async fn handle<B>(&self, req: Request<B>, remote_addr: Option<SocketAddr>) -> HttpResponse
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Display,
    {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!(method = %method, path = %path, "Incoming request");

        let result = match (method, path.as_str()) {
            (Method::GET, "/health") => self.handle_health().await,

            (Method::PUT, p) if p.starts_with("/blob/") => {
                let cid = p.strip_prefix("/blob/").unwrap_or("");
                self.handle_put_blob(req, cid).await
            }

            (Method::GET | Method::HEAD, p) => match parse_legacy_route(p) {
                Some(route) => {
                    let info = RequestInfo::from_request(&req, &self.ctx.public_scheme, remote_addr);
                    match info {
                        Ok(info) => self.router.handle(route, &info).await,
                        Err(e) => Err(e),
                    }
                }
                None => Ok(text_response(StatusCode::NOT_FOUND, "Not Found")),
            },

            _ => Ok(text_response(StatusCode::NOT_FOUND, "Not Found")),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                error!(path = %path, error = %e, "Request error");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e))
            }
        }
    }

    /// Health check endpoint
    async fn handle_health(&self) -> Result<HttpResponse, NodeError> {
        let stats = self.ctx.blob_store.stats().await?;
        let body = serde_json::json!({
            "status": "ok",
            "host": self.ctx.host_id,
            "listen_log_enabled": self.ctx.listens.is_enabled(),
            "blobs": stats.total_blobs,
            "bytes": stats.total_bytes,
        });

        Ok(json_response(StatusCode::OK, &body))
    }

    /// PUT /blob/{cid} - Store a file on this node
    async fn handle_put_blob<B>(&self, req: Request<B>, cid: &str) -> Result<HttpResponse, NodeError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Display,
    {
        let checked = match self.ctx.blob_store.blob_path(cid) {
            Ok(_) if is_legacy_cid(cid) => Ok(()),
            Ok(_) => parse_cid(cid).map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = checked {
            return Ok(text_response(StatusCode::BAD_REQUEST, e.to_string()));
        }

        let tmp_path = self.ctx.blob_store.temp_path();
        if let Err(e) = write_body(req.into_body(), &tmp_path).await {
            fs::remove_file(&tmp_path).await.ok();
            return Err(e);
        }

        let result = match self.ctx.blob_store.store_file(cid, &tmp_path).await {
            Ok(result) => result,
            Err(e @ (NodeError::CidMismatch { .. } | NodeError::MalformedCid(_))) => {
                warn!(cid = %cid, error = %e, "Rejected upload");
                return Ok(text_response(StatusCode::BAD_REQUEST, e.to_string()));
            }
            Err(e) => return Err(e),
        };

        self.ctx.registry.register_file(&result.cid, &result.path).await?;

        let body = serde_json::json!({
            "cid": result.cid,
            "size_bytes": result.size_bytes,
            "already_existed": result.already_existed,
        });

        Ok(json_response(
            if result.already_existed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            },
            &body,
        ))
    }
}

/// Stream a request body to `path`
async fn write_body<B>(mut body: B, path: &Path) -> Result<u64, NodeError>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Display,
{
    let mut file = fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| NodeError::Internal(format!("Failed to read body: {}", e)))?;
        if let Ok(data) = frame.into_data() {
            file.write_all(&data).await?;
            written += data.len() as u64;
        }
    }

    file.flush().await?;
    Ok(written)
}
