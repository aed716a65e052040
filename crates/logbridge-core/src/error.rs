//! Error types for bridge setup.
//!
//! Only setup can fail: building sinks, loading configuration and attaching
//! a process. Once a stream drains, failures are counted instead of raised.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while configuring or attaching the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Failed to create a directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to open a log file.
    #[error("failed to open log file {path}: {source}")]
    OpenError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a configuration file.
    #[error("failed to read config {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The process was not spawned with the given stream piped.
    #[error("process has no piped {0}")]
    MissingStream(&'static str),

    /// Failed to spawn a drainer thread.
    #[error("failed to spawn drainer thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Lock poisoned (thread panicked while holding lock).
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
