//! Error types for wsh-echo

use thiserror::Error;

/// Echo server error type
#[derive(Error, Debug)]
pub enum EchoError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),

    #[error("Core error: {0}")]
    Core(#[from] wsh_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for wsh-echo
pub type Result<T> = std::result::Result<T, EchoError>;
