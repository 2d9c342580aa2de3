//! Error types (wsh-harness)

use std::fmt;
use std::time::Duration;

/// Errors that abort a harness session
///
/// Wraps the errors of the sub-crates; probe outcomes are not errors.
#[derive(Debug)]
pub enum HarnessError {
    /// Malformed configuration
    Config(wsh_core::Error),
    /// Echo server failed to start or stop
    Echo(wsh_echo::EchoError),
    /// Echo server did not become ready in time
    StartupTimeout(Duration),
    /// Probe could not run
    Probe(wsh_probe::ProbeError),
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Config error: {}", e),
            Self::Echo(e) => write!(f, "Echo server error: {}", e),
            Self::StartupTimeout(d) => write!(f, "Echo server not ready within {:?}", d),
            Self::Probe(e) => write!(f, "Probe error: {}", e),
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Echo(e) => Some(e),
            Self::Probe(e) => Some(e),
            Self::StartupTimeout(_) => None,
        }
    }
}

impl From<wsh_core::Error> for HarnessError {
    fn from(e: wsh_core::Error) -> Self {
        Self::Config(e)
    }
}

impl From<wsh_echo::EchoError> for HarnessError {
    fn from(e: wsh_echo::EchoError) -> Self {
        Self::Echo(e)
    }
}

impl From<wsh_probe::ProbeError> for HarnessError {
    fn from(e: wsh_probe::ProbeError) -> Self {
        Self::Probe(e)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, HarnessError>;
