use std::time::{Duration, Instant};

/// Per-form-load state read and updated by the security gate.
///
/// A session starts when the form is rendered. It records that instant and
/// counts how many submission attempts reached the attempt-ceiling check.
/// The count survives failed attempts and is never reset implicitly; a new
/// page load means a new `SessionContext`.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
/// use reservation_relay::SessionContext;
///
/// let rendered = Instant::now();
/// let session = SessionContext::started_at(rendered);
///
/// assert_eq!(session.attempt_count(), 0);
/// assert_eq!(session.elapsed_at(rendered + Duration::from_secs(20)), Duration::from_secs(20));
/// ```
#[derive(Debug, Clone)]
pub struct SessionContext {
    start_time: Instant,
    attempt_count: u32,
}

impl SessionContext {
    /// Starts a session now.
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    /// Starts a session at a known render instant.
    pub fn started_at(start_time: Instant) -> Self {
        Self {
            start_time,
            attempt_count: 0,
        }
    }

    /// Returns the instant the form was rendered.
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Returns the number of attempts counted so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Dwell time at `now`; zero if `now` precedes the render instant.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start_time)
    }

    /// Counts one more attempt and returns the new total.
    pub(crate) fn record_attempt(&mut self) -> u32 {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.attempt_count
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Page state the gate inspects besides the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSignals {
    /// Value of the field hidden from genuine users.
    pub decoy_value: String,
    /// Whether the terms-and-conditions box is ticked.
    pub consent: bool,
}

impl PageSignals {
    /// Signals of an ordinary user who accepted the terms.
    pub fn consenting() -> Self {
        Self {
            decoy_value: String::new(),
            consent: true,
        }
    }

    /// Sets the decoy field value.
    pub fn with_decoy(mut self, value: impl Into<String>) -> Self {
        self.decoy_value = value.into();
        self
    }
}
