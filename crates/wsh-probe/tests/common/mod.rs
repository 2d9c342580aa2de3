#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async};

use wsh_core::{ProbeConfig, UpstreamConfig};
use wsh_echo::EchoServer;

/// Echo server on an ephemeral port
pub async fn start_echo() -> EchoServer {
    let config = UpstreamConfig {
        port: 0,
        ..UpstreamConfig::default()
    };
    EchoServer::start(config).await.expect("echo server failed to start")
}

/// Probe configuration with short timeouts aimed at `url`
pub fn probe_config(url: impl Into<String>) -> ProbeConfig {
    ProbeConfig {
        proxy_url: url.into(),
        connect_timeout_ms: 2000,
        welcome_timeout_ms: 500,
        exchange_timeout_ms: 500,
        message_pause_ms: 10,
        ..ProbeConfig::default()
    }
}

/// Pass-through WebSocket relay standing in for the proxy under test.
///
/// Every accepted client gets its own upstream connection; frames are
/// forwarded unmodified in both directions.
pub async fn start_relay(upstream: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let upstream = upstream.clone();
            tokio::spawn(async move {
                let Ok(client) = accept_async(stream).await else {
                    return;
                };
                let Ok((server, _)) = connect_async(upstream.as_str()).await else {
                    return;
                };

                let (mut client_tx, mut client_rx) = client.split();
                let (mut server_tx, mut server_rx) = server.split();

                let to_server = async {
                    while let Some(Ok(msg)) = client_rx.next().await {
                        if server_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                };
                let to_client = async {
                    while let Some(Ok(msg)) = server_rx.next().await {
                        if client_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                };

                tokio::select! {
                    _ = to_server => {},
                    _ = to_client => {},
                }
            });
        }
    });

    addr
}

/// How a scripted upstream behaves after the upgrade
#[derive(Clone, Copy)]
pub enum Upstream {
    /// Never sends anything
    Silent,
    /// Welcome, then never answers
    WelcomeOnly,
    /// Welcome, one echo, then closes the connection
    CloseAfterOneEcho,
    /// Welcome, then echoes with the payload replaced
    Corrupting,
    /// Sends a non-welcome first frame
    NoWelcome,
}

pub async fn start_scripted_upstream(behaviour: Upstream) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_scripted(stream, behaviour));
        }
    });

    addr
}

async fn serve_scripted(stream: TcpStream, behaviour: Upstream) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    let welcome = r#"{"type":"welcome","message":"scripted","path":"/","timestamp":1.0}"#;

    match behaviour {
        Upstream::Silent => {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        Upstream::NoWelcome => {
            let _ = ws.send(Message::Text(r#"{"type":"hello"}"#.into())).await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        Upstream::WelcomeOnly => {
            let _ = ws.send(Message::Text(welcome.into())).await;
            while let Some(Ok(_)) = ws.next().await {}
        }
        Upstream::CloseAfterOneEcho => {
            let _ = ws.send(Message::Text(welcome.into())).await;
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let echo = serde_json::json!({
                    "type": "echo",
                    "original": wsh_core::Frame::decode(text.as_str()),
                    "processed_at": 1.0,
                    "server": "scripted",
                });
                let _ = ws.send(Message::Text(echo.to_string().into())).await;
            }
            let _ = ws.close(None).await;
            while let Some(Ok(_)) = ws.next().await {}
        }
        Upstream::Corrupting => {
            let _ = ws.send(Message::Text(welcome.into())).await;
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() {
                    let echo = r#"{"type":"echo","original":"tampered","processed_at":1.0,"server":"scripted"}"#;
                    if ws.send(Message::Text(echo.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// A TCP listener that accepts but never answers the HTTP upgrade
pub async fn start_black_hole() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    addr
}

/// An address nothing listens on
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
