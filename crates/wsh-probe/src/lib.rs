//! wsh-probe: proxy test client
//!
//! Connects through the proxy under test, waits for the upstream welcome,
//! plays a scripted message sequence and classifies what happened.

pub mod client;
pub mod error;
pub mod report;
pub mod script;

pub use client::ProxyProbe;
pub use error::{ProbeError, Result};
pub use report::{Check, ExchangeRecord, ProbeReport, TestOutcome};
pub use script::Script;
