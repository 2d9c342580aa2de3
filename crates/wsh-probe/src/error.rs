//! Error types for wsh-probe
//!
//! Network trouble during a run is not an error here: it is classified into
//! a [`TestOutcome`](crate::TestOutcome). Only problems that make the run
//! meaningless surface as `ProbeError`.

use thiserror::Error;

/// Probe error type
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid proxy URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Core error: {0}")]
    Core(#[from] wsh_core::Error),

    #[error("Probe cancelled")]
    Cancelled,
}

/// Result type alias for wsh-probe
pub type Result<T> = std::result::Result<T, ProbeError>;
