//! cid-node daemon
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! cid-node
//!
//! # Start with custom config
//! cid-node --config /path/to/config.toml
//!
//! # Override port and storage directory
//! cid-node --http-port 8091 --storage-dir /data/cid-node
//!
//! # Identify this node in listen events, behind a TLS proxy
//! cid-node --host-id node3.example --public-scheme https
//! ```

use anyhow::Context;
use clap::Parser;
use cid_node::{BlobStore, Config, HttpServer, ListenLogger, NodeContext, SqliteIndex};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LISTEN_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "cid-node")]
#[command(about = "Content-addressed storage node with peer redirects")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "CID_NODE_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, env = "CID_NODE_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP port for content routes
    #[arg(long, env = "CID_NODE_HTTP_PORT")]
    http_port: Option<u16>,

    /// Identifier of this node in listen events
    #[arg(long, env = "CID_NODE_HOST_ID")]
    host_id: Option<String>,

    /// Scheme clients use to reach this node
    #[arg(long, env = "CID_NODE_PUBLIC_SCHEME")]
    public_scheme: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("cid_node=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(host_id) = args.host_id {
        config.host_id = host_id;
    }
    if let Some(scheme) = args.public_scheme {
        config.public_scheme = scheme;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        host_id = %config.host_id,
        "Starting cid-node"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let index = Arc::new(SqliteIndex::open(&config.index_db_path())?);
    let blob_store = Arc::new(BlobStore::new(config.blobs_dir()).await?);

    let (listens, listen_writer) = if config.listen_log_enabled {
        let (logger, handle) = ListenLogger::spawn_file_writer(
            config.host_id.clone(),
            config.listen_log_path(),
            config.listen_queue_capacity,
        )
        .await?;
        (logger, Some(handle))
    } else {
        info!("Listen logging disabled");
        (ListenLogger::disabled(config.host_id.clone()), None)
    };

    let ctx = Arc::new(NodeContext::new(&config, index.clone(), blob_store.clone(), listens));

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(ctx, http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Endpoints:");
    info!("  GET  /health                          - Health check");
    info!("  PUT  /blob/{{cid}}                      - Store a file on this node");
    info!("  GET  /ipfs/{{cid}}, /content/{{cid}}      - Fetch by CID");
    info!("  GET  /tracks/cidstream/{{cid}}          - Stream audio by CID");
    info!("  GET  /ipfs/{{dirCid}}/{{fileName}}        - Fetch from a directory CID");

    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    // Open connections may still hold logger handles; give queued listens a moment
    if let Some(handle) = listen_writer {
        let _ = tokio::time::timeout(LISTEN_FLUSH_TIMEOUT, handle).await;
    }

    if let Ok(stats) = index.stats() {
        info!(
            files = stats.files,
            hosts = stats.host_entries,
            delist_records = stats.delist_records,
            "Final index stats"
        );
    }
    if let Ok(stats) = blob_store.stats().await {
        info!(
            blobs = stats.total_blobs,
            bytes = stats.total_bytes,
            "Final storage stats"
        );
    }

    Ok(())
}
