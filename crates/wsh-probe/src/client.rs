//! Proxy test client
//!
//! One strictly sequential session: connect, await the welcome, then for
//! each scripted frame send it and wait for its echo before the next send.

use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message, error::ProtocolError};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use wsh_core::{EchoResponse, Frame, ProbeConfig};

use crate::report::{Check, Ending, ProbeReport};
use crate::script::Script;
use crate::{ProbeError, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bound on the closing handshake after the script finished
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// What a receive attempt produced
#[derive(Debug)]
enum Received {
    Payload(String),
    /// The peer ended the session
    Closed(String),
    TimedOut,
    /// Transport failure that is not a close
    Broken(String),
}

/// Drives the scripted session against the proxy under test
pub struct ProxyProbe {
    config: ProbeConfig,
    cancel: CancellationToken,
}

impl ProxyProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the run with [`ProbeError::Cancelled`] when `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run the script selected by the configured scenario
    pub async fn run(&self) -> Result<ProbeReport> {
        self.run_script(&Script::for_config(&self.config)).await
    }

    /// Run an explicit script.
    ///
    /// Network problems are reported through the returned report's outcome;
    /// an `Err` means the target URL is unusable or the run was cancelled.
    pub async fn run_script(&self, script: &Script) -> Result<ProbeReport> {
        let url = Url::parse(&self.config.proxy_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ProbeError::UnsupportedScheme(url.scheme().to_string()));
        }

        let started = Instant::now();
        let mut report = ProbeReport::new(url.as_str(), script.frames());
        self.drive(&url, script, &mut report).await?;
        report.elapsed = started.elapsed();

        info!(
            target = %report.target,
            outcome = %report.outcome,
            verified = report.verified_count(),
            total = report.exchanges.len(),
            "Probe finished"
        );
        Ok(report)
    }

    async fn drive(&self, url: &Url, script: &Script, report: &mut ProbeReport) -> Result<()> {
        info!("Connecting to proxy at {}", url);

        let connect = tokio::time::timeout(self.config.connect_timeout(), connect_async(url.as_str()));
        let mut socket = match self.cancellable(connect).await? {
            Ok(Ok((socket, response))) => {
                debug!(status = %response.status(), "WebSocket upgrade completed");
                socket
            }
            Ok(Err(e)) => {
                warn!("Connection failed: {}", e);
                report.fail(format!("connect: {}", e));
                return Ok(());
            }
            Err(_) => {
                warn!("No upgrade within {:?}", self.config.connect_timeout());
                report.fail(format!(
                    "connect: no upgrade within {:?}",
                    self.config.connect_timeout()
                ));
                return Ok(());
            }
        };
        report.upgrade = true;
        info!("Connected through proxy");

        match self.receive(&mut socket, self.config.welcome_timeout()).await? {
            Received::Payload(text) => match EchoResponse::parse(&text) {
                Ok(welcome) if welcome.is_welcome() => {
                    debug!("Welcome message: {}", text);
                    report.welcome = Check::Verified;
                }
                _ => {
                    warn!("First frame was not a welcome: {}", text);
                    report.welcome = Check::Mismatch {
                        received: Frame::decode(&text).to_value(),
                    };
                    report.fail("handshake: first frame was not a welcome");
                    close_quietly(&mut socket).await;
                    return Ok(());
                }
            },
            Received::TimedOut => {
                warn!("No welcome within {:?}", self.config.welcome_timeout());
                report.welcome = Check::unverified(format!(
                    "no welcome within {:?}",
                    self.config.welcome_timeout()
                ));
                report.abandon_from(0, "welcome not received");
                report.conclude(Ending::TimedOut, self.config.strict);
                close_quietly(&mut socket).await;
                return Ok(());
            }
            Received::Closed(reason) => {
                info!("Connection closed before welcome: {}", reason);
                report.welcome = Check::unverified(format!("peer closed: {}", reason));
                report.abandon_from(0, "peer closed");
                report.conclude(Ending::PeerClosed, self.config.strict);
                return Ok(());
            }
            Received::Broken(reason) => {
                report.fail(format!("handshake: {}", reason));
                return Ok(());
            }
        }

        let ending = self.exchange(&mut socket, script, report).await?;
        report.conclude(ending, self.config.strict);
        if ending != Ending::PeerClosed {
            close_quietly(&mut socket).await;
        }
        Ok(())
    }

    /// Send each scripted frame and match its echo
    async fn exchange(
        &self,
        socket: &mut Socket,
        script: &Script,
        report: &mut ProbeReport,
    ) -> Result<Ending> {
        for (index, frame) in script.frames().iter().enumerate() {
            if index > 0 && !script.pause().is_zero() {
                self.cancellable(tokio::time::sleep(script.pause())).await?;
            }

            let wire = frame.to_wire();
            debug!(kind = frame.kind(), "Sending: {}", wire);

            if let Err(e) = self.cancellable(socket.send(Message::Text(wire.clone().into()))).await? {
                let reason = match classify_error(e) {
                    Received::Closed(reason) => {
                        info!("Connection closed while sending: {}", reason);
                        report.abandon_from(index, "peer closed");
                        return Ok(Ending::PeerClosed);
                    }
                    Received::Broken(reason) => reason,
                    other => format!("{:?}", other),
                };
                report.abandon_from(index, "send failed");
                report.fail(format!("send: {}", reason));
                return Ok(Ending::Broken);
            }

            match self.receive(socket, self.config.exchange_timeout()).await? {
                Received::Payload(text) => {
                    debug!("Received: {}", text);
                    report.exchanges[index].check = verify_echo(&wire, &text);
                }
                Received::TimedOut => {
                    warn!(
                        message = index + 1,
                        "No echo within {:?}",
                        self.config.exchange_timeout()
                    );
                    report.exchanges[index].check = Check::unverified(format!(
                        "no echo within {:?}",
                        self.config.exchange_timeout()
                    ));
                    // A late echo would be matched against the wrong send
                    report.abandon_from(index + 1, "skipped after timeout");
                    return Ok(Ending::TimedOut);
                }
                Received::Closed(reason) => {
                    info!("Connection closed: {}", reason);
                    report.abandon_from(index, "peer closed");
                    return Ok(Ending::PeerClosed);
                }
                Received::Broken(reason) => {
                    report.abandon_from(index, "receive failed");
                    report.fail(format!("receive: {}", reason));
                    return Ok(Ending::Broken);
                }
            }
        }

        Ok(Ending::Completed)
    }

    /// Wait for the next data frame, skipping control frames
    async fn receive(&self, socket: &mut Socket, wait: Duration) -> Result<Received> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let next = self.cancellable(tokio::time::timeout_at(deadline, socket.next())).await?;
            let msg = match next {
                Err(_) => return Ok(Received::TimedOut),
                Ok(None) => return Ok(Received::Closed("stream ended".to_string())),
                Ok(Some(Err(e))) => return Ok(classify_error(e)),
                Ok(Some(Ok(msg))) => msg,
            };

            match msg {
                Message::Text(text) => return Ok(Received::Payload(text.as_str().to_owned())),
                Message::Binary(bytes) => {
                    return Ok(Received::Payload(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Ok(Received::Closed(reason));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProbeError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

/// Compare an echo envelope with the payload that produced it.
///
/// The upstream decodes what it receives, so the expectation is the decoded
/// form of the wire text.
fn verify_echo(sent_wire: &str, received: &str) -> Check {
    let expected = Frame::decode(sent_wire).to_value();
    match EchoResponse::parse(received) {
        Ok(EchoResponse::Echo { original, .. }) if original.to_value() == expected => {
            Check::Verified
        }
        Ok(EchoResponse::Echo { original, .. }) => Check::Mismatch {
            received: original.to_value(),
        },
        _ => Check::Mismatch {
            received: Frame::decode(received).to_value(),
        },
    }
}

/// Abrupt transport ends count as a close; anything else is a broken session
fn classify_error(error: tungstenite::Error) -> Received {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            Received::Closed("connection closed".to_string())
        }
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            Received::Closed("reset without closing handshake".to_string())
        }
        tungstenite::Error::Io(e) => Received::Closed(format!("io: {}", e)),
        other => Received::Broken(other.to_string()),
    }
}

async fn close_quietly(socket: &mut Socket) {
    let _ = socket.close(None).await;
    // Drain until the peer acknowledges the close
    let _ = tokio::time::timeout(CLOSE_GRACE, async {
        while let Some(Ok(_)) = socket.next().await {}
    })
    .await;
}
