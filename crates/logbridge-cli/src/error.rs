//! Error types for the runner.

use std::path::PathBuf;

use thiserror::Error;

use logbridge_core::BridgeError;

/// Errors that can occur while starting or supervising processes.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Bridge setup failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Failed to read or write a runner file.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest could not be parsed.
    #[error("invalid manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Manifest parsed but describes an unusable process list.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Program not found on PATH.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// Failed to spawn a process.
    #[error("failed to start {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to install signal handlers.
    #[error("failed to register signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type alias for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
