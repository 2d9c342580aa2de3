//! wsh-harness: WebSocket proxy compliance harness
//!
//! Usage:
//!   wsh-harness serve      - Run the upstream echo server only
//!   wsh-harness probe      - Run the proxy test client only
//!   wsh-harness session    - Upstream + operator handoff + probe
//!   wsh-harness --help     - Show help

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wsh_core::{HarnessConfig, Scenario};
use wsh_echo::EchoServer;
use wsh_harness::report::Renderer;
use wsh_harness::{Immediate, Rendezvous, SessionEnd, StdinRendezvous, run_session};
use wsh_probe::ProxyProbe;

#[derive(Parser)]
#[command(name = "wsh-harness", version, about = "WebSocket proxy compliance harness")]
struct Cli {
    /// Configuration file (defaults to ./ws-harness.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the upstream echo server until Ctrl+C
    Serve(UpstreamArgs),

    /// Run the proxy test client once
    Probe(ProbeArgs),

    /// Start the upstream, wait for the operator, then probe through the proxy
    Session {
        #[command(flatten)]
        upstream: UpstreamArgs,

        #[command(flatten)]
        probe: ProbeArgs,

        /// Do not wait for Enter before probing
        #[arg(long)]
        no_wait: bool,

        /// Stop the upstream right after the report
        #[arg(long)]
        no_linger: bool,
    },
}

#[derive(Args)]
struct UpstreamArgs {
    /// Interface for the echo server
    #[arg(long)]
    host: Option<String>,

    /// Port for the echo server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args)]
struct ProbeArgs {
    /// WebSocket URL fronted by the proxy under test
    #[arg(long)]
    proxy_url: Option<String>,

    /// Message script: full or minimal
    #[arg(long)]
    scenario: Option<Scenario>,

    /// Fail when any round trip is unverified
    #[arg(long)]
    strict: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl UpstreamArgs {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(host) = &self.host {
            config.upstream.host = host.clone();
        }
        if let Some(port) = self.port {
            config.upstream.port = port;
        }
    }
}

impl ProbeArgs {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(url) = &self.proxy_url {
            config.probe.proxy_url = url.clone();
        }
        if let Some(scenario) = self.scenario {
            config.probe.scenario = scenario;
        }
        if self.strict {
            config.probe.strict = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.json_logs);

    let mut config = HarnessConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down...");
        }
        signal_token.cancel();
    });

    match cli.command {
        Command::Serve(upstream) => {
            upstream.apply(&mut config);
            config.validate()?;
            serve(config, shutdown).await
        }
        Command::Probe(probe) => {
            probe.apply(&mut config);
            config.validate()?;
            run_probe(config, shutdown, probe.json).await
        }
        Command::Session {
            upstream,
            probe,
            no_wait,
            no_linger,
        } => {
            upstream.apply(&mut config);
            probe.apply(&mut config);
            if no_linger {
                config.session.linger = false;
            }

            let rendezvous: Box<dyn Rendezvous> = if no_wait {
                Box::new(Immediate)
            } else {
                Box::new(StdinRendezvous::new(
                    "Start the proxy under test and press Enter to run the client test...\n",
                ))
            };

            let renderer = Renderer::new(std::io::stdout().is_terminal());
            let json = probe.json;
            let report = run_session(&config, rendezvous.as_ref(), shutdown, |report| {
                print_report(&renderer, report, json);
            })
            .await?;

            Ok(match report.end {
                SessionEnd::Completed(probe) if !probe.outcome.is_success() => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            })
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the echo server until interrupted
async fn serve(config: HarnessConfig, shutdown: CancellationToken) -> anyhow::Result<ExitCode> {
    let server = EchoServer::start(config.upstream).await?;
    tracing::info!("WebSocket server ready on {}", server.url());
    tracing::info!("Press Ctrl+C to stop");

    shutdown.cancelled().await;
    server.stop().await?;
    Ok(ExitCode::SUCCESS)
}

/// Probe the proxy once and print the report
async fn run_probe(
    config: HarnessConfig,
    shutdown: CancellationToken,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let probe = ProxyProbe::new(config.probe).with_cancellation(shutdown);
    let report = probe.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", Renderer::new(std::io::stdout().is_terminal()).probe(&report));
    }

    Ok(if report.outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(renderer: &Renderer, report: &wsh_harness::SessionReport, json: bool) {
    match (json, report.probe()) {
        (true, Some(probe)) => match serde_json::to_string_pretty(probe) {
            Ok(text) => println!("{}", text),
            Err(e) => tracing::error!("Failed to serialize report: {}", e),
        },
        _ => print!("{}", renderer.session(report)),
    }
}
