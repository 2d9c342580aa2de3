//! Operator handoff
//!
//! The point between "upstream is ready" and "run the probe" where the
//! operator starts the proxy under test. The wait is untimed; the session
//! races it against its shutdown token so an interrupt always wins.

use async_trait::async_trait;
use std::io::{BufRead, Write};
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

/// Result of waiting for the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    Proceed,
    Cancelled,
}

/// Something that decides when the probe may start
#[async_trait]
pub trait Rendezvous: Send + Sync {
    async fn wait(&self) -> Handoff;
}

/// Proceeds at once (unattended runs)
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

#[async_trait]
impl Rendezvous for Immediate {
    async fn wait(&self) -> Handoff {
        Handoff::Proceed
    }
}

/// Waits for the operator to press Enter.
///
/// End of input counts as a cancel. The read runs on its own thread since a
/// blocked stdin read cannot be cancelled.
#[derive(Debug, Clone)]
pub struct StdinRendezvous {
    prompt: String,
}

impl StdinRendezvous {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

#[async_trait]
impl Rendezvous for StdinRendezvous {
    async fn wait(&self) -> Handoff {
        let (tx, rx) = oneshot::channel();
        let prompt = self.prompt.clone();

        std::thread::spawn(move || {
            let mut stdout = std::io::stdout();
            let _ = write!(stdout, "{}", prompt);
            let _ = stdout.flush();

            let mut line = String::new();
            let handoff = match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => Handoff::Cancelled,
                Ok(_) => Handoff::Proceed,
            };
            let _ = tx.send(handoff);
        });

        rx.await.unwrap_or(Handoff::Cancelled)
    }
}

/// Proceeds when the paired [`oneshot::Sender`] fires; dropping it cancels
#[derive(Debug)]
pub struct ChannelRendezvous {
    rx: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ChannelRendezvous {
    /// Sender that releases the rendezvous, and the rendezvous itself
    pub fn pair() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                rx: Mutex::new(Some(rx)),
            },
        )
    }
}

#[async_trait]
impl Rendezvous for ChannelRendezvous {
    async fn wait(&self) -> Handoff {
        let Some(rx) = self.rx.lock().await.take() else {
            debug!("Rendezvous already consumed");
            return Handoff::Cancelled;
        };

        match rx.await {
            Ok(()) => Handoff::Proceed,
            Err(_) => Handoff::Cancelled,
        }
    }
}
