//! Echo server implementation
//!
//! Starts and stops the axum-based WebSocket upstream.

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use wsh_core::UpstreamConfig;

use crate::connection::ConnectionRegistry;
use crate::handler::websocket_handler;
use crate::{EchoError, Result};

/// Shared echo server state
pub struct EchoState {
    /// Server configuration
    pub config: UpstreamConfig,
    /// Connections currently being served
    pub connections: ConnectionRegistry,
    /// Cancelled when the server is asked to stop
    pub shutdown: CancellationToken,
    /// Tracks connections from upgrade request to close
    pub tracker: TaskTracker,
}

/// Handle to a running echo server
pub struct EchoServer {
    local_addr: SocketAddr,
    state: Arc<EchoState>,
    serve_task: JoinHandle<std::io::Result<()>>,
}

impl EchoServer {
    /// Bind the configured address and start serving.
    ///
    /// Returns once the listener is bound, so connections made after this
    /// point are accepted.
    pub async fn start(config: UpstreamConfig) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| EchoError::Bind { addr, source })?;
        Self::from_listener(listener, config)
    }

    /// Serve on an already bound listener
    pub fn from_listener(listener: TcpListener, config: UpstreamConfig) -> Result<Self> {
        Self::with_shutdown(listener, config, CancellationToken::new())
    }

    /// Serve on `listener`, stopping when `shutdown` is cancelled
    pub fn with_shutdown(
        listener: TcpListener,
        config: UpstreamConfig,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let local_addr = listener.local_addr()?;

        let state = Arc::new(EchoState {
            config,
            connections: ConnectionRegistry::new(),
            shutdown,
            tracker: TaskTracker::new(),
        });

        let app = router(state.clone());
        let token = state.shutdown.clone();
        let serve_task = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });

        info!("WebSocket echo server listening on {}", local_addr);

        Ok(Self {
            local_addr,
            state,
            serve_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` URL a local client can connect to
    pub fn url(&self) -> String {
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip([127, 0, 0, 1].into());
        }
        format!("ws://{}", addr)
    }

    pub fn active_connections(&self) -> usize {
        self.state.connections.len()
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Stop accepting, then wait for every connection to finish its
    /// in-flight send and close.
    pub async fn stop(self) -> Result<()> {
        let active = self.state.connections.snapshot();
        info!(active = active.len(), "Stopping WebSocket echo server");
        for conn in &active {
            debug!(
                connection_id = %conn.id,
                peer = %conn.peer,
                path = %conn.path,
                echoed = conn.frames_echoed,
                "Closing active connection"
            );
        }
        self.state.shutdown.cancel();

        let served = self.serve_task.await;

        self.state.tracker.close();
        self.state.tracker.wait().await;

        served??;
        info!("WebSocket echo server stopped");
        Ok(())
    }
}

/// Build the echo router: `/health` plus a WebSocket upgrade on every other path
pub fn router(state: Arc<EchoState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .fallback(websocket_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
