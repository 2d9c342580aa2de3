//! wsh-echo: upstream WebSocket echo server
//!
//! Greets every connection with a welcome frame, then answers each inbound
//! frame with exactly one echo envelope, preserving JSON vs. text payloads.
//! Built with axum for the HTTP upgrade.

pub mod connection;
pub mod error;
pub mod handler;
pub mod server;

pub use connection::{ConnectionInfo, ConnectionRegistry};
pub use error::{EchoError, Result};
pub use handler::websocket_handler;
pub use server::{EchoServer, EchoState};
