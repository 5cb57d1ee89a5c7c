//! Configuration for cid-node

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cid-node")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage directory for blobs, the index database and logs
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP port for content routes
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Scheme clients use to reach this node (used to rebuild request URLs
    /// for redirects; TLS is usually terminated in front of the node)
    #[serde(default = "default_public_scheme")]
    pub public_scheme: String,

    /// Identifier of this node in listen events
    #[serde(default = "default_host_id")]
    pub host_id: String,

    /// Record listen events for locally served files
    #[serde(default = "default_true")]
    pub listen_log_enabled: bool,

    /// Listen events buffered before new ones are dropped
    #[serde(default = "default_listen_queue_capacity")]
    pub listen_queue_capacity: usize,
}

fn default_http_port() -> u16 {
    8090
}

fn default_public_scheme() -> String {
    "http".to_string()
}

fn default_host_id() -> String {
    "localhost".to_string()
}

fn default_true() -> bool {
    true
}

fn default_listen_queue_capacity() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            public_scheme: default_public_scheme(),
            host_id: default_host_id(),
            listen_log_enabled: true,
            listen_queue_capacity: default_listen_queue_capacity(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get blobs directory
    pub fn blobs_dir(&self) -> PathBuf {
        self.storage_dir.join("blobs")
    }

    /// Get index database path
    pub fn index_db_path(&self) -> PathBuf {
        self.storage_dir.join("index.db")
    }

    /// Get listen log path
    pub fn listen_log_path(&self) -> PathBuf {
        self.storage_dir.join("listens.jsonl")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
