//! Scripted message sequences

use serde_json::json;
use std::time::Duration;

use wsh_core::{Frame, ProbeConfig, Scenario, unix_timestamp};

/// Ordered frames to send, with an optional pause between sends
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    frames: Vec<Frame>,
    pause: Duration,
}

impl Script {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            pause: Duration::ZERO,
        }
    }

    /// Wait `pause` between consecutive sends
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// One JSON and one text frame, back to back
    pub fn minimal() -> Self {
        Self::new(vec![
            Frame::json(json!({
                "type": "test",
                "message": "Hello from BWS WebSocket Proxy!",
                "timestamp": "2025-08-24",
            })),
            Frame::text("PING from BWS proxy test"),
        ])
    }

    /// Text, JSON and ping frames, separated by `pause`
    pub fn full(pause: Duration) -> Self {
        Self::new(vec![
            Frame::text("Hello BWS WebSocket Proxy!"),
            Frame::json(json!({"type": "test", "data": "JSON message test"})),
            Frame::json(json!({"type": "ping", "timestamp": unix_timestamp()})),
        ])
        .with_pause(pause)
    }

    pub fn for_config(config: &ProbeConfig) -> Self {
        match config.scenario {
            Scenario::Minimal => Self::minimal(),
            Scenario::Full => Self::full(config.message_pause()),
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
