//! Terminal rendering of probe and session reports

use nu_ansi_term::{Color, Style};
use std::fmt::Write;

use wsh_probe::{Check, ProbeReport, TestOutcome};

use crate::session::{SessionEnd, SessionReport};

/// Renders reports, optionally with ANSI colors
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    colored: bool,
}

impl Renderer {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.colored {
            style.paint(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn mark(&self, ok: bool) -> String {
        if ok {
            self.paint(Color::Green.bold(), "PASS")
        } else {
            self.paint(Color::Red.bold(), "FAIL")
        }
    }

    fn warn(&self) -> String {
        self.paint(Color::Yellow.bold(), "WARN")
    }

    fn check(&self, check: &Check) -> (String, String) {
        match check {
            Check::Verified => (self.mark(true), "verified".to_string()),
            Check::Mismatch { received } => (self.mark(false), format!("mismatch, got {}", received)),
            Check::Unverified { reason } => (self.warn(), format!("unverified ({})", reason)),
        }
    }

    pub fn probe(&self, report: &ProbeReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Proxy probe: {}", report.target);
        let _ = writeln!(out, "  [{}] WebSocket upgrade", self.mark(report.upgrade));

        if report.upgrade {
            let (mark, detail) = self.check(&report.welcome);
            let _ = writeln!(out, "  [{}] Welcome frame: {}", mark, detail);

            for (index, record) in report.exchanges.iter().enumerate() {
                let (mark, detail) = self.check(&record.check);
                let _ = writeln!(
                    out,
                    "  [{}] Message {} ({}): {}",
                    mark,
                    index + 1,
                    record.sent.kind(),
                    detail
                );
            }

            let _ = writeln!(
                out,
                "  [{}] Bidirectional relay ({}/{} echoed)",
                if report.all_echoes_verified() { self.mark(true) } else { self.warn() },
                report.verified_count(),
                report.exchanges.len()
            );
            let _ = writeln!(
                out,
                "  [{}] JSON and text payloads preserved",
                if report.payload_types_preserved() { self.mark(true) } else { self.warn() },
            );
        }

        let outcome = match &report.outcome {
            TestOutcome::Passed => self.paint(Color::Green.bold(), "PASSED"),
            TestOutcome::TimedOut => self.paint(
                Color::Yellow.bold(),
                "TIMED OUT (upgrade succeeded, echoes unverified)",
            ),
            failed @ TestOutcome::Failed(_) => self.paint(Color::Red.bold(), &failed.to_string()),
        };
        let _ = writeln!(out, "Result: {} in {:.2?}", outcome, report.elapsed);
        out
    }

    pub fn session(&self, report: &SessionReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Upstream echo server: {}", report.upstream_url);
        match &report.end {
            SessionEnd::Completed(probe) => out.push_str(&self.probe(probe)),
            SessionEnd::Cancelled => {
                let _ = writeln!(out, "Session cancelled before the probe completed");
            }
        }
        out
    }
}
