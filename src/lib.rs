//! Resilient delivery of reservation form submissions.
//!
//! The crate puts a pre-submission gate in front of a two-strategy transport:
//! - **Gate**: field validation, anti-automation checks and text sanitization,
//!   always in that order and always before any network activity
//! - **Taint tracking**: raw input is [`Tainted`]; only the gate produces the
//!   [`Verified`] record a submission envelope is built from
//! - **Delivery**: a direct JSON request with one fallback to a callback-script
//!   request correlated through a process-wide [`CallbackRegistry`]
//!
//! # Core Types
//!
//! - [`ReservationClient`]: the facade running submissions and admin queries
//! - [`SecurityGate`]: decoy, dwell-time, attempt-ceiling and consent checks
//! - [`Dispatcher`]: direct transport with callback-script fallback
//! - [`CallbackRegistry`]: exactly-once completion of pending callbacks
//! - [`Secret<T>`]: wrapper that redacts the shared API key in logs
//!
//! # Examples
//!
//! ```
//! use std::time::{Duration, Instant};
//! use reservation_relay::{validate, PageSignals, SecurityGate, SessionContext, SubmissionRecord};
//!
//! let record = SubmissionRecord {
//!     first_name: "Ann".to_string(),
//!     email: "not-an-email".to_string(),
//!     ..SubmissionRecord::default()
//! };
//! let report = validate(&record);
//! assert!(!report.is_valid);
//! assert!(report.summary().contains("Please enter a valid email address"));
//!
//! let rendered = Instant::now();
//! let mut session = SessionContext::started_at(rendered);
//! let check = SecurityGate::standard().evaluate_at(
//!     &mut session,
//!     &PageSignals::consenting(),
//!     rendered + Duration::from_secs(20),
//! );
//! assert!(check.passed);
//! ```

#![forbid(unsafe_code)]

mod config;
mod context;
mod dispatcher;
mod envelope;
mod error;
mod gate;
mod logging;
mod pipeline;
mod record;
mod registry;
mod sanitizer;
mod secret;
mod tainted;
mod transport;
mod validation;
mod verified;

pub use config::{ClientConfig, PLACEHOLDER_API_KEY, PLACEHOLDER_SCRIPT_URL};
pub use context::{PageSignals, SessionContext};
pub use dispatcher::Dispatcher;
pub use envelope::{
    Action, BackendResponse, CorrelationId, RequestEnvelope, RequestStamp, SubmissionMetadata,
};
pub use error::{
    ConfigError, Error, FailureKind, RejectionKind, Result, SecurityRejection, TransportError,
};
pub use gate::{GateCheck, GateLimits, SecurityCheckResult, SecurityGate};
pub use logging::RequestLog;
pub use pipeline::ReservationClient;
pub use record::{Field, ReservationId, SubmissionRecord, RESERVATION_ID_MAX_LEN};
pub use registry::{CallbackRegistry, Completion, PendingRequest, TransportHandle};
pub use sanitizer::{display_message, sanitize, TextSanitizer, MAX_DISPLAY_LEN, MAX_FIELD_LEN};
pub use secret::Secret;
pub use tainted::Tainted;
pub use transport::{
    parse_callback_reply, CallbackScriptTransport, DirectTransport, HttpScriptLoader,
    ScriptLoader, Transport,
};
pub use validation::{validate, FieldError, Rule, ValidationResult, GPA_RANGE, VALID_GRADES};
pub use verified::Verified;
