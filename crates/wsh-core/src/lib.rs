//! wsh-core: shared building blocks for the WebSocket proxy harness
//!
//! Configuration, the error type and the upstream wire protocol
//! (`Frame`, `EchoResponse`) used by both the echo server and the probe.

pub mod config;
pub mod error;
pub mod message;

pub use config::{HarnessConfig, ProbeConfig, Scenario, SessionConfig, UpstreamConfig};
pub use error::{Error, Result};
pub use message::{EchoResponse, Frame, unix_timestamp};
