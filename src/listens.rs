//! Listen event logging
//!
//! Every local serve of a flat-addressed file records a listen. Recording must
//! never slow down or fail the response, so events go through a bounded queue
//! to a detached writer task that appends them as JSON lines.
//!
//! Delivery is at-most-once: when the queue is full or the writer has stopped
//! the event is dropped, and anything still queued at shutdown is lost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A single listen of locally served content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenEvent {
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// CID that was served
    pub cid: String,
    /// Node that served it
    pub host_id: String,
    /// Where the file was read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Range header of the request, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

impl ListenEvent {
    pub fn new(cid: impl Into<String>, host_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            cid: cid.into(),
            host_id: host_id.into(),
            storage_path: None,
            remote_addr: None,
            user_agent: None,
            range: None,
        }
    }

    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Non-blocking handle for recording listens
#[derive(Clone)]
pub struct ListenLogger {
    tx: Option<mpsc::Sender<ListenEvent>>,
    host_id: String,
}

impl ListenLogger {
    /// Logger that discards every event
    pub fn disabled(host_id: impl Into<String>) -> Self {
        Self {
            tx: None,
            host_id: host_id.into(),
        }
    }

    /// Logger feeding a queue of `capacity` events; the caller drains the receiver
    pub fn with_channel(
        host_id: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ListenEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Some(tx),
                host_id: host_id.into(),
            },
            rx,
        )
    }

    /// Open `path` for appending and spawn the writer task
    pub async fn spawn_file_writer(
        host_id: impl Into<String>,
        path: PathBuf,
        capacity: usize,
    ) -> std::io::Result<(Self, JoinHandle<()>)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!("Listen logging initialized to {}", path.display());

        let (logger, rx) = Self::with_channel(host_id, capacity);
        let handle = tokio::spawn(write_events(rx, BufWriter::new(file)));
        Ok((logger, handle))
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Start an event for `cid` stamped with this node's host id
    pub fn event(&self, cid: &str) -> ListenEvent {
        ListenEvent::new(cid, self.host_id.clone())
    }

    /// Queue an event without waiting. Returns false if it was dropped.
    pub fn record(&self, event: ListenEvent) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!(cid = %event.cid, "Listen queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(cid = %event.cid, "Listen writer stopped, dropping event");
                false
            }
        }
    }
}

/// Drain `rx` into `writer` until every sender is gone
async fn write_events<W>(mut rx: mpsc::Receiver<ListenEvent>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let line = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize listen event: {}", e);
                continue;
            }
        };

        if let Err(e) = writer.write_all(format!("{}\n", line).as_bytes()).await {
            error!("Failed to write listen event: {}", e);
            continue;
        }
        if let Err(e) = writer.flush().await {
            error!("Failed to flush listen log: {}", e);
        }
    }
}
