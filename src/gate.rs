use std::time::{Duration, Instant};

use crate::{
    context::{PageSignals, SessionContext},
    error::{RejectionKind, SecurityRejection},
};

/// Thresholds used by the security gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateLimits {
    /// Submissions faster than this are treated as automated.
    pub min_dwell: Duration,
    /// Forms open longer than this have expired.
    pub max_dwell: Duration,
    /// Attempts allowed per session.
    pub max_attempts: u32,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            min_dwell: Duration::from_secs(15),
            max_dwell: Duration::from_secs(1800),
            max_attempts: 3,
        }
    }
}

/// One check of the gate, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GateCheck {
    /// Hidden field must be empty.
    Decoy,
    /// Dwell time must lie inside the configured window.
    DwellTime,
    /// Attempts per session are capped.
    AttemptCeiling,
    /// Terms must be accepted. Always enforced.
    Consent,
}

/// Result of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityCheckResult {
    pub passed: bool,
    pub reason: Option<String>,
    pub rejection: Option<RejectionKind>,
}

impl SecurityCheckResult {
    fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
            rejection: None,
        }
    }

    fn fail(rejection: SecurityRejection) -> Self {
        Self {
            passed: false,
            reason: Some(rejection.message),
            rejection: Some(rejection.kind),
        }
    }

    /// Converts into a `Result`, keeping the reason text unchanged.
    pub fn into_result(self) -> Result<(), SecurityRejection> {
        match (self.passed, self.rejection) {
            (true, _) => Ok(()),
            (false, kind) => Err(SecurityRejection::new(
                kind.unwrap_or(RejectionKind::Decoy),
                self.reason.unwrap_or_default(),
            )),
        }
    }
}

/// The anti-automation and consent gate run before any network activity.
///
/// Checks run in a fixed order and the first failure wins:
/// decoy field, dwell time, attempt ceiling, consent. Unlike validation the
/// gate is stateful: every evaluation that reaches the attempt-ceiling check
/// bumps the session's counter, pass or fail.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
/// use reservation_relay::{PageSignals, SecurityGate, SessionContext};
///
/// let gate = SecurityGate::standard();
/// let rendered = Instant::now();
/// let mut session = SessionContext::started_at(rendered);
///
/// let signals = PageSignals::consenting();
/// let early = gate.evaluate_at(&mut session, &signals, rendered + Duration::from_secs(10));
/// assert!(!early.passed);
///
/// let later = gate.evaluate_at(&mut session, &signals, rendered + Duration::from_secs(20));
/// assert!(later.passed);
/// ```
#[derive(Debug, Clone)]
pub struct SecurityGate {
    limits: GateLimits,
    checks: Vec<GateCheck>,
}

impl SecurityGate {
    /// Creates a gate that only enforces consent.
    pub fn new(limits: GateLimits) -> Self {
        Self {
            limits,
            checks: vec![GateCheck::Consent],
        }
    }

    /// Creates a gate with every check enabled and default limits.
    pub fn standard() -> Self {
        Self::new(GateLimits::default())
            .require(GateCheck::Decoy)
            .require(GateCheck::DwellTime)
            .require(GateCheck::AttemptCeiling)
    }

    /// Enables a check, ignoring duplicates.
    ///
    /// Evaluation order does not depend on the order of `require` calls.
    pub fn require(mut self, check: GateCheck) -> Self {
        if !self.checks.contains(&check) {
            self.checks.push(check);
            self.checks.sort();
        }
        self
    }

    /// Returns the configured limits.
    pub fn limits(&self) -> &GateLimits {
        &self.limits
    }

    /// Returns true if `check` is enabled.
    pub fn is_enabled(&self, check: GateCheck) -> bool {
        self.checks.contains(&check)
    }

    /// Evaluates the gate now.
    pub fn evaluate(
        &self,
        session: &mut SessionContext,
        signals: &PageSignals,
    ) -> SecurityCheckResult {
        self.evaluate_at(session, signals, Instant::now())
    }

    /// Evaluates the gate as if the user submitted at `now`.
    pub fn evaluate_at(
        &self,
        session: &mut SessionContext,
        signals: &PageSignals,
        now: Instant,
    ) -> SecurityCheckResult {
        match self.run_checks(session, signals, now) {
            Ok(()) => SecurityCheckResult::pass(),
            Err(rejection) => {
                tracing::warn!(
                    check = %rejection.kind,
                    attempts = session.attempt_count(),
                    "security gate rejected submission"
                );
                SecurityCheckResult::fail(rejection)
            }
        }
    }

    fn run_checks(
        &self,
        session: &mut SessionContext,
        signals: &PageSignals,
        now: Instant,
    ) -> Result<(), SecurityRejection> {
        for check in &self.checks {
            self.check_one(*check, session, signals, now)?;
        }
        Ok(())
    }

    fn check_one(
        &self,
        check: GateCheck,
        session: &mut SessionContext,
        signals: &PageSignals,
        now: Instant,
    ) -> Result<(), SecurityRejection> {
        match check {
            GateCheck::Decoy => {
                if !signals.decoy_value.is_empty() {
                    return Err(SecurityRejection::new(
                        RejectionKind::Decoy,
                        "Security validation failed",
                    ));
                }
            }
            GateCheck::DwellTime => {
                let dwell = session.elapsed_at(now);
                if dwell < self.limits.min_dwell {
                    return Err(SecurityRejection::new(
                        RejectionKind::TooFast,
                        "Please take more time to complete the form carefully",
                    ));
                }
                if dwell > self.limits.max_dwell {
                    return Err(SecurityRejection::new(
                        RejectionKind::SessionExpired,
                        "Form session expired. Please refresh and try again",
                    ));
                }
            }
            GateCheck::AttemptCeiling => {
                if session.record_attempt() > self.limits.max_attempts {
                    return Err(SecurityRejection::new(
                        RejectionKind::TooManyAttempts,
                        "Too many submission attempts. Please refresh the page",
                    ));
                }
            }
            GateCheck::Consent => {
                if !signals.consent {
                    return Err(SecurityRejection::new(
                        RejectionKind::MissingConsent,
                        "You must agree to the terms and conditions",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for SecurityGate {
    fn default() -> Self {
        Self::standard()
    }
}
