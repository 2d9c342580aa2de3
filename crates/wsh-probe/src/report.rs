//! Probe results
//!
//! A run records the upgrade, the welcome frame and every round trip as
//! separate checks, then derives a single [`TestOutcome`] from them.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use wsh_core::Frame;

/// Overall result of one probe run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    /// The upgrade or handshake did not complete, or a payload came back altered
    Failed(String),
    /// Upgraded, but an expected frame did not arrive in time
    TimedOut,
}

impl TestOutcome {
    /// Passed and TimedOut both mean the upgrade worked
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed(_) => "FAILED",
            Self::TimedOut => "TIMED OUT",
        }
    }
}

impl std::fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "FAILED ({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// State of a single verification step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Check {
    Verified,
    /// A frame arrived but did not match what was expected
    Mismatch { received: Value },
    /// Nothing conclusive arrived
    Unverified { reason: String },
}

impl Check {
    pub fn unverified(reason: impl Into<String>) -> Self {
        Self::Unverified {
            reason: reason.into(),
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch { .. })
    }
}

/// One scripted send and what came back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeRecord {
    pub sent: Frame,
    pub check: Check,
}

/// How the exchange phase stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ending {
    /// Every scripted frame got an answer
    Completed,
    /// A frame was not answered in time
    TimedOut,
    /// The peer closed the session
    PeerClosed,
    /// The transport failed; the failure is already recorded
    Broken,
}

/// Everything a probe run established
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    /// URL the probe connected to
    pub target: String,
    pub outcome: TestOutcome,
    /// The WebSocket upgrade completed
    pub upgrade: bool,
    pub welcome: Check,
    pub exchanges: Vec<ExchangeRecord>,
    pub elapsed: Duration,
}

impl ProbeReport {
    pub(crate) fn new(target: impl Into<String>, frames: &[Frame]) -> Self {
        Self {
            target: target.into(),
            outcome: TestOutcome::Failed("not run".to_string()),
            upgrade: false,
            welcome: Check::unverified("not received"),
            exchanges: frames
                .iter()
                .map(|frame| ExchangeRecord {
                    sent: frame.clone(),
                    check: Check::unverified("not sent"),
                })
                .collect(),
            elapsed: Duration::ZERO,
        }
    }

    /// Mark exchanges from `start` onwards that have no result yet
    pub(crate) fn abandon_from(&mut self, start: usize, reason: &str) {
        for record in self.exchanges.iter_mut().skip(start) {
            if !record.check.is_verified() && !record.check.is_mismatch() {
                record.check = Check::unverified(reason);
            }
        }
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.outcome = TestOutcome::Failed(reason.into());
    }

    /// Derive the outcome once the exchange phase is over.
    ///
    /// An altered payload always fails. Otherwise a timeout is a soft pass
    /// and a peer close is a pass, unless `strict` requires every check to
    /// be verified.
    pub(crate) fn conclude(&mut self, ending: Ending, strict: bool) {
        if ending == Ending::Broken {
            return;
        }
        if let Some(index) = self.exchanges.iter().position(|r| r.check.is_mismatch()) {
            self.fail(format!("echo mismatch on message {}", index + 1));
            return;
        }

        self.outcome = match ending {
            Ending::TimedOut => TestOutcome::TimedOut,
            Ending::Completed | Ending::PeerClosed | Ending::Broken => TestOutcome::Passed,
        };

        if strict {
            let unverified = self.unverified_count();
            if !self.welcome.is_verified() {
                self.fail("strict: welcome frame not verified");
            } else if unverified > 0 {
                self.fail(format!("strict: {} round trip(s) unverified", unverified));
            }
        }
    }

    pub fn verified_count(&self) -> usize {
        self.exchanges.iter().filter(|r| r.check.is_verified()).count()
    }

    pub fn unverified_count(&self) -> usize {
        self.exchanges
            .iter()
            .filter(|r| matches!(r.check, Check::Unverified { .. }))
            .count()
    }

    /// Every round trip was echoed back intact
    pub fn all_echoes_verified(&self) -> bool {
        self.exchanges.iter().all(|r| r.check.is_verified())
    }

    /// Text and JSON payloads were both seen intact
    pub fn payload_types_preserved(&self) -> bool {
        let verified = |json: bool| {
            self.exchanges
                .iter()
                .any(|r| r.check.is_verified() && r.sent.is_json() == json)
        };
        verified(true) && verified(false)
    }
}
