use std::fmt;
use std::time::Duration;

use crate::sanitizer::display_message;
use crate::validation::ValidationResult;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the relay.
///
/// Validation and security failures carry the page-facing text unchanged.
/// A delivery failure keeps both underlying transport errors so an operator
/// can tell which layer broke.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration failed its startup checks. No client is built.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// One or more field rules failed.
    #[error("{0}")]
    Validation(ValidationResult),

    /// The security gate vetoed the attempt.
    #[error("{0}")]
    Security(#[from] SecurityRejection),

    /// A single transport failed and no fallback applied.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The direct request and the callback-script fallback both failed.
    #[error("direct transport failed: {direct}; callback transport failed: {callback}")]
    Delivery {
        direct: TransportError,
        callback: TransportError,
    },
}

impl Error {
    /// The error text prepared for on-screen display.
    pub fn display_message(&self) -> String {
        display_message(&self.to_string())
    }

    /// Returns the failure class for transport-related errors.
    ///
    /// For a delivery failure this is the class of the fallback's error,
    /// the last thing that happened.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Error::Transport(e) => Some(e.kind()),
            Error::Delivery { callback, .. } => Some(callback.kind()),
            _ => None,
        }
    }
}

/// Startup configuration problems, all collected before reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    issues: Vec<String>,
}

impl ConfigError {
    pub(crate) fn new(issues: Vec<String>) -> Self {
        Self { issues }
    }

    /// Every problem found.
    pub fn issues(&self) -> &[String] {
        &self.issues
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration validation failed: {}", self.issues.join("; "))
    }
}

impl std::error::Error for ConfigError {}

/// A security gate veto with the reason shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRejection {
    /// Which check fired
    pub kind: RejectionKind,
    /// Page-facing reason
    pub message: String,
}

impl SecurityRejection {
    /// Creates a new rejection.
    pub fn new(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SecurityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SecurityRejection {}

/// The gate check that produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// Hidden decoy field was filled in
    Decoy,
    /// Submitted before the minimum dwell time
    TooFast,
    /// Form open longer than the maximum dwell time
    SessionExpired,
    /// Attempt ceiling exceeded
    TooManyAttempts,
    /// Terms were not accepted
    MissingConsent,
}

impl RejectionKind {
    /// True when the user must reload the form to continue.
    pub fn is_session_fatal(self) -> bool {
        matches!(self, RejectionKind::SessionExpired | RejectionKind::TooManyAttempts)
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionKind::Decoy => write!(f, "decoy"),
            RejectionKind::TooFast => write!(f, "too_fast"),
            RejectionKind::SessionExpired => write!(f, "session_expired"),
            RejectionKind::TooManyAttempts => write!(f, "too_many_attempts"),
            RejectionKind::MissingConsent => write!(f, "missing_consent"),
        }
    }
}

/// A failure of one transport attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No reply before the per-request deadline.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The request could not be sent or the resource failed to load.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The reply was not a JSON object.
    #[error("malformed response: {0}")]
    MalformedBody(String),

    /// The backend answered `success: false`.
    #[error("request failed: {0}")]
    Application(String),

    /// The request does not fit in a callback-script URL.
    #[error("payload too large: {len} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { len: usize, limit: usize },

    /// A callback with this name is already pending.
    #[error("callback {0} is already pending")]
    DuplicateCallback(String),
}

impl TransportError {
    /// Classifies the failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::Timeout(_) => FailureKind::Timeout,
            TransportError::Network(_)
            | TransportError::Status(_)
            | TransportError::MalformedBody(_)
            | TransportError::DuplicateCallback(_) => FailureKind::Network,
            TransportError::Application(_) => FailureKind::Application,
            TransportError::PayloadTooLarge { .. } => FailureKind::PayloadTooLarge,
        }
    }
}

/// Coarse class of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Network,
    Application,
    PayloadTooLarge,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network"),
            FailureKind::Application => write!(f, "application"),
            FailureKind::PayloadTooLarge => write!(f, "payload_too_large"),
        }
    }
}
