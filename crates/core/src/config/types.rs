use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::worker::WorkerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerSectionConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration. One SQLite file holds the queue, the task
/// registry and the history ledger.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("pixerd.db")
}

/// Queue naming configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_stream")]
    pub stream: String,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default = "default_consumer")]
    pub consumer: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stream: default_stream(),
            group: default_group(),
            consumer: default_consumer(),
        }
    }
}

fn default_stream() -> String {
    "jobs".to_string()
}

fn default_group() -> String {
    "workers".to_string()
}

fn default_consumer() -> String {
    "consumer-1".to_string()
}

/// Worker section: whether in-process workers run, how many, and
/// their loop tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSectionConfig {
    #[serde(default = "default_worker_enabled")]
    pub enabled: bool,
    #[serde(default = "default_worker_count")]
    pub count: usize,
    #[serde(flatten)]
    pub loop_config: WorkerConfig,
}

impl Default for WorkerSectionConfig {
    fn default() -> Self {
        Self {
            enabled: default_worker_enabled(),
            count: default_worker_count(),
            loop_config: WorkerConfig::default(),
        }
    }
}

fn default_worker_enabled() -> bool {
    true
}

fn default_worker_count() -> usize {
    1
}

/// Encoder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncoderConfig {
    /// Explicit ImageMagick binary path; when unset the binary is
    /// located on `$PATH`.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    #[serde(default = "default_encode_timeout")]
    pub timeout_secs: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            binary: None,
            timeout_secs: default_encode_timeout(),
        }
    }
}

fn default_encode_timeout() -> u64 {
    120
}

/// Uploads configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadsConfig {
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}
