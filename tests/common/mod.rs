//! Shared fixtures for route tests

#![allow(dead_code)]

use bytes::Bytes;
use cid_node::listens::ListenEvent;
use cid_node::{
    compute_file_cid, BlobStore, Config, HttpServer, ListenLogger, NodeContext, SqliteIndex,
};
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, Response};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const HOST: &str = "node1.example:8090";

/// A node wired to an in-memory index and a temporary blob directory
pub struct TestNode {
    pub dir: TempDir,
    pub index: Arc<SqliteIndex>,
    pub store: Arc<BlobStore>,
    pub server: HttpServer,
    pub listens: mpsc::Receiver<ListenEvent>,
}

impl TestNode {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage_dir = dir.path().to_path_buf();
        config.host_id = "node1".to_string();

        let index = Arc::new(SqliteIndex::open_in_memory().unwrap());
        let store = Arc::new(BlobStore::new(config.blobs_dir()).await.unwrap());
        let (logger, listens) = ListenLogger::with_channel(config.host_id.clone(), 16);
        let ctx = Arc::new(NodeContext::new(&config, index.clone(), store.clone(), logger));
        let server = HttpServer::new(ctx, "127.0.0.1:0".parse().unwrap());

        Self {
            dir,
            index,
            store,
            server,
            listens,
        }
    }

    /// Store `data` and index it under its CID
    pub async fn add_file(&self, data: &[u8]) -> (String, PathBuf) {
        let cid = cid_of(data);
        let stored = self.store.store(&cid, data).await.unwrap();
        self.index.record_file(&cid, None, &stored.path).unwrap();
        (cid, stored.path)
    }

    pub async fn send(&self, req: Request<Full<Bytes>>) -> Response<Full<Bytes>> {
        self.server
            .handle(req, Some("10.0.0.9:52000".parse().unwrap()))
            .await
    }

    pub async fn get(&self, path: &str) -> Response<Full<Bytes>> {
        self.send(request(Method::GET, path, Bytes::new())).await
    }

    /// GET with one extra request header
    pub async fn get_with(
        &self,
        path: &str,
        name: header::HeaderName,
        value: &str,
    ) -> Response<Full<Bytes>> {
        let mut req = request(Method::GET, path, Bytes::new());
        req.headers_mut().insert(name, value.parse().unwrap());
        self.send(req).await
    }
}

pub fn cid_of(data: &[u8]) -> String {
    compute_file_cid(&mut Cursor::new(data)).unwrap()
}

pub fn request(method: Method, path: &str, body: Bytes) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::HOST, HOST)
        .header(header::USER_AGENT, "test-client/1.0")
        .body(Full::new(body))
        .unwrap()
}

pub async fn body_bytes(response: Response<Full<Bytes>>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_text(response: Response<Full<Bytes>>) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}

/// Bytes that sniff as MP3
pub fn mp3_bytes() -> Vec<u8> {
    let mut data = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    data.extend((0..2048u32).map(|i| (i % 251) as u8));
    data
}
