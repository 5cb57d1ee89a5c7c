//! Legacy route integration tests
//!
//! Exercises the flat and directory schemes end to end through the HTTP
//! handler:
//! - local serves with headers, audio advisory and listen events
//! - byte ranges and conditional requests
//! - localOnly and no-host not-found responses
//! - redirects to peers, including after a failed local read
//! - the delist gate

mod common;

use bytes::Bytes;
use chrono::{Duration, Utc};
use common::*;
use hyper::{header, Method, StatusCode};
use std::path::Path;

// =============================================================================
// Local serves
// =============================================================================

#[tokio::test]
async fn test_flat_local_serve() {
    let mut node = TestNode::new().await;
    let data = b"\x89PNG\r\n\x1a\nnot really an image".to_vec();
    let (cid, path) = node.add_file(&data).await;

    let response = node.get(&format!("/ipfs/{}", cid)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], data.len().to_string().as_str());
    assert_eq!(response.headers()[header::ETAG], format!("\"{}\"", cid).as_str());
    assert!(response.headers().get("x-would-block").is_none());
    assert_eq!(body_bytes(response).await, Bytes::from(data));

    let event = node.listens.try_recv().unwrap();
    assert_eq!(event.cid, cid);
    assert_eq!(event.host_id, "node1");
    assert_eq!(event.storage_path, Some(path.display().to_string()));
    assert_eq!(event.remote_addr.as_deref(), Some("10.0.0.9:52000"));
    assert_eq!(event.user_agent.as_deref(), Some("test-client/1.0"));
}

#[tokio::test]
async fn test_content_prefix_serves_same_file() {
    let node = TestNode::new().await;
    let (cid, _) = node.add_file(b"{\"title\":\"metadata\"}").await;

    let response = node.get(&format!("/content/{}", cid)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(body_text(response).await, "{\"title\":\"metadata\"}");
}

#[tokio::test]
async fn test_audio_advisory_header_only_outside_stream_route() {
    let mut node = TestNode::new().await;
    let (cid, _) = node.add_file(&mp3_bytes()).await;

    let response = node.get(&format!("/ipfs/{}", cid)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(response.headers()["x-would-block"], "true");

    let response = node.get(&format!("/tracks/cidstream/{}", cid)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-would-block").is_none());

    // both flat serves are listens
    assert_eq!(node.listens.try_recv().unwrap().cid, cid);
    assert_eq!(node.listens.try_recv().unwrap().cid, cid);
    assert!(node.listens.try_recv().is_err());
}

#[tokio::test]
async fn test_head_returns_headers_only() {
    let mut node = TestNode::new().await;
    let data = mp3_bytes();
    let (cid, _) = node.add_file(&data).await;

    let response = node
        .send(request(Method::HEAD, &format!("/ipfs/{}", cid), Bytes::new()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], data.len().to_string().as_str());
    assert_eq!(response.headers()["x-would-block"], "true");
    assert!(body_bytes(response).await.is_empty());
    assert!(node.listens.try_recv().is_err());
}

#[tokio::test]
async fn test_dir_scheme_serves_without_listen_or_advisory() {
    let mut node = TestNode::new().await;
    let data = mp3_bytes();
    let cid = cid_of(&data);
    let stored = node.store.store(&cid, &data).await.unwrap();
    node.index
        .record_file(&cid, Some(("QmDirOfTrackArtwork", "preview.mp3")), &stored.path)
        .unwrap();

    let response = node.get("/content/QmDirOfTrackArtwork/preview.mp3").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-would-block").is_none());
    assert_eq!(body_bytes(response).await.len(), data.len());
    assert!(node.listens.try_recv().is_err());
}

// =============================================================================
// Ranges and conditional requests
// =============================================================================

#[tokio::test]
async fn test_range_on_stream_route() {
    let mut node = TestNode::new().await;
    let data = mp3_bytes();
    let (cid, _) = node.add_file(&data).await;
    let path = format!("/tracks/cidstream/{}", cid);

    let response = node.get_with(&path, header::RANGE, "bytes=0-99").await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-99/2058");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(body_bytes(response).await, Bytes::copy_from_slice(&data[..100]));

    let event = node.listens.try_recv().unwrap();
    assert_eq!(event.cid, cid);
    assert_eq!(event.range.as_deref(), Some("bytes=0-99"));

    // seek to the tail
    let response = node.get_with(&path, header::RANGE, "bytes=-58").await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2000-2057/2058");
    assert_eq!(body_bytes(response).await, Bytes::copy_from_slice(&data[2000..]));

    let response = node.get_with(&path, header::RANGE, "bytes=1024-").await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "1034");
    assert_eq!(body_bytes(response).await, Bytes::copy_from_slice(&data[1024..]));
}

#[tokio::test]
async fn test_range_on_head_sends_no_body() {
    let mut node = TestNode::new().await;
    let (cid, _) = node.add_file(&mp3_bytes()).await;

    let mut req = request(Method::HEAD, &format!("/tracks/cidstream/{}", cid), Bytes::new());
    req.headers_mut()
        .insert(header::RANGE, "bytes=100-199".parse().unwrap());
    let response = node.send(req).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 100-199/2058");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
    assert!(body_bytes(response).await.is_empty());
    assert!(node.listens.try_recv().is_err());
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let mut node = TestNode::new().await;
    let (cid, _) = node.add_file(&mp3_bytes()).await;
    let path = format!("/tracks/cidstream/{}", cid);

    for range in ["bytes=5000-", "bytes=100-50", "bytes=zero-"] {
        let response = node.get_with(&path, header::RANGE, range).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{}", range);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */2058");
    }
    assert!(node.listens.try_recv().is_err());
}

#[tokio::test]
async fn test_if_none_match_returns_not_modified() {
    let mut node = TestNode::new().await;
    let (cid, _) = node.add_file(&mp3_bytes()).await;
    let path = format!("/ipfs/{}", cid);
    let etag = format!("\"{}\"", cid);

    let response = node.get_with(&path, header::IF_NONE_MATCH, &etag).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers()[header::ETAG], etag.as_str());
    assert!(body_bytes(response).await.is_empty());
    assert!(node.listens.try_recv().is_err());

    // a matching etag wins over a range
    let mut req = request(Method::GET, &path, Bytes::new());
    req.headers_mut()
        .insert(header::IF_NONE_MATCH, etag.parse().unwrap());
    req.headers_mut()
        .insert(header::RANGE, "bytes=0-9".parse().unwrap());
    assert_eq!(node.send(req).await.status(), StatusCode::NOT_MODIFIED);

    let response = node
        .get_with(&path, header::IF_NONE_MATCH, "\"QmSomethingElse\"")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.len(), 2058);
    assert_eq!(node.listens.try_recv().unwrap().cid, cid);
}

#[tokio::test]
async fn test_if_none_match_on_dir_route() {
    let node = TestNode::new().await;
    let data = b"\xFF\xD8\xFF\xE0 jpeg bytes".to_vec();
    let cid = cid_of(&data);
    let stored = node.store.store(&cid, &data).await.unwrap();
    node.index
        .record_file(&cid, Some(("QmDirOfImages", "150x150.jpg")), &stored.path)
        .unwrap();

    let response = node
        .get_with(
            "/content/QmDirOfImages/150x150.jpg",
            header::IF_NONE_MATCH,
            "\"QmDirOfImages/150x150.jpg\"",
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

// =============================================================================
// Not found and redirects
// =============================================================================

#[tokio::test]
async fn test_local_only_never_redirects() {
    let node = TestNode::new().await;
    let cid = cid_of(b"held elsewhere");
    node.index.record_host(&cid, "peerA").unwrap();

    let response = node.get(&format!("/ipfs/{}?localOnly=true", cid)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "not redirecting because localOnly=true");
}

#[tokio::test]
async fn test_no_host_found() {
    let node = TestNode::new().await;
    let cid = cid_of(b"held nowhere");

    let response = node.get(&format!("/ipfs/{}", cid)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, format!("no host found with cid: {}", cid));
}

#[tokio::test]
async fn test_redirect_keeps_path_and_query() {
    let node = TestNode::new().await;
    let cid = cid_of(b"held elsewhere");
    node.index.record_host(&cid, "peerA:4000").unwrap();

    let response = node
        .get(&format!("/tracks/cidstream/{}?signature=abc&localOnly=false", cid))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("http://peerA:4000/tracks/cidstream/{}?signature=abc&localOnly=false", cid).as_str()
    );
}

#[tokio::test]
async fn test_dir_miss_redirects_on_dir_cid() {
    let node = TestNode::new().await;
    node.index.record_host("QmDirOfImages", "https://peer.example").unwrap();

    let response = node.get("/ipfs/QmDirOfImages/480x480.jpg").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://peer.example/ipfs/QmDirOfImages/480x480.jpg"
    );
}

#[tokio::test]
async fn test_unreadable_local_file_falls_back_to_peer() {
    let mut node = TestNode::new().await;
    let cid = cid_of(b"lost from disk");
    node.index
        .record_file(&cid, None, Path::new("/nonexistent/blobs/lost"))
        .unwrap();
    node.index.record_host(&cid, "peerB").unwrap();

    let response = node.get(&format!("/ipfs/{}", cid)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        format!("http://peerB/ipfs/{}", cid).as_str()
    );
    assert!(node.listens.try_recv().is_err());

    let response = node.get(&format!("/ipfs/{}?localOnly=true", cid)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Delist gate
// =============================================================================

#[tokio::test]
async fn test_delisted_content_refused() {
    let mut node = TestNode::new().await;
    let (cid, _) = node.add_file(&mp3_bytes()).await;
    let now = Utc::now();

    node.index
        .record_delist_status(&cid, true, now - Duration::minutes(10))
        .unwrap();
    let response = node.get(&format!("/ipfs/{}", cid)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "cid is delisted by this node");
    assert!(node.listens.try_recv().is_err());

    // most recent record wins
    node.index.record_delist_status(&cid, false, now).unwrap();
    let response = node.get(&format!("/ipfs/{}", cid)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_delisted_content_not_redirected() {
    let node = TestNode::new().await;
    let cid = cid_of(b"taken down");
    node.index.record_host(&cid, "peerA").unwrap();
    node.index.record_delist_status(&cid, true, Utc::now()).unwrap();

    let response = node.get(&format!("/content/{}", cid)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Routing
// =============================================================================

#[tokio::test]
async fn test_unknown_routes() {
    let node = TestNode::new().await;

    assert_eq!(node.get("/").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(node.get("/ipfs/").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(node.get("/ipfs/a/b/c").await.status(), StatusCode::NOT_FOUND);

    let response = node
        .send(request(Method::POST, "/ipfs/QmAbc", Bytes::new()))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let node = TestNode::new().await;
    node.add_file(b"one").await;

    let response = node.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["host"], "node1");
    assert_eq!(body["listen_log_enabled"], true);
    assert_eq!(body["blobs"], 1);
}
