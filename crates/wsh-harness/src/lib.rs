//! wsh-harness: session orchestration for the WebSocket proxy harness
//!
//! Starts the upstream echo server, hands over to the operator, runs the
//! proxy probe and keeps the upstream alive for manual follow-up.

pub mod error;
pub mod rendezvous;
pub mod report;
pub mod session;

pub use error::{HarnessError, Result};
pub use rendezvous::{ChannelRendezvous, Handoff, Immediate, Rendezvous, StdinRendezvous};
pub use session::{SessionEnd, SessionReport, run_session};
