//! Session orchestration
//!
//! Startup, operator handoff, probe run, report, then linger until the
//! shutdown token fires. The echo server is stopped and drained on every
//! exit path once it has started.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wsh_core::HarnessConfig;
use wsh_echo::EchoServer;
use wsh_probe::{ProbeError, ProbeReport, ProxyProbe};

use crate::rendezvous::{Handoff, Rendezvous};
use crate::{HarnessError, Result};

/// How the session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    Completed(ProbeReport),
    /// Interrupted or cancelled by the operator before the probe finished
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Where the upstream echo server could be reached
    pub upstream_url: String,
    pub end: SessionEnd,
}

impl SessionReport {
    pub fn probe(&self) -> Option<&ProbeReport> {
        match &self.end {
            SessionEnd::Completed(report) => Some(report),
            SessionEnd::Cancelled => None,
        }
    }
}

/// Run a full session.
///
/// `on_report` is called with the report before the linger phase, so the
/// operator sees the result while the upstream is still up.
pub async fn run_session<F>(
    config: &HarnessConfig,
    rendezvous: &dyn Rendezvous,
    shutdown: CancellationToken,
    on_report: F,
) -> Result<SessionReport>
where
    F: FnOnce(&SessionReport),
{
    config.validate()?;

    let startup = config.session.startup_timeout();
    let server = tokio::time::timeout(startup, EchoServer::start(config.upstream.clone()))
        .await
        .map_err(|_| HarnessError::StartupTimeout(startup))??;

    let upstream_url = server.url();
    let end = drive(config, &server, rendezvous, &shutdown).await;

    let report = match end {
        Ok(end) => SessionReport { upstream_url, end },
        Err(e) => {
            server.stop().await?;
            return Err(e);
        }
    };

    on_report(&report);

    if config.session.linger && report.end != SessionEnd::Cancelled {
        info!("Upstream server will continue running for manual testing");
        info!("Connect directly to: {}", report.upstream_url);
        info!("Connect via proxy: {}", config.probe.proxy_url);
        info!("Press Ctrl+C to stop the upstream server");
        shutdown.cancelled().await;
    }

    server.stop().await?;
    Ok(report)
}

/// Everything between a ready server and the report
async fn drive(
    config: &HarnessConfig,
    server: &EchoServer,
    rendezvous: &dyn Rendezvous,
    shutdown: &CancellationToken,
) -> Result<SessionEnd> {
    if until_shutdown(shutdown, tokio::time::sleep(config.session.settle()))
        .await
        .is_none()
    {
        return Ok(SessionEnd::Cancelled);
    }

    info!("Upstream echo server ready on {}", server.url());
    info!(
        "Start the proxy under test so that {} forwards to {}",
        config.probe.proxy_url,
        server.url()
    );

    match until_shutdown(shutdown, rendezvous.wait()).await {
        Some(Handoff::Proceed) => {}
        Some(Handoff::Cancelled) | None => {
            warn!("Session cancelled by operator");
            return Ok(SessionEnd::Cancelled);
        }
    }

    info!("Running WebSocket client test");
    let probe = ProxyProbe::new(config.probe.clone()).with_cancellation(shutdown.clone());
    match probe.run().await {
        Ok(report) => Ok(SessionEnd::Completed(report)),
        Err(ProbeError::Cancelled) => Ok(SessionEnd::Cancelled),
        Err(e) => Err(e.into()),
    }
}

/// `None` when the shutdown token fires first
async fn until_shutdown<F: Future>(shutdown: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        out = fut => Some(out),
    }
}
