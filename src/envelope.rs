//! Request envelopes and backend responses, the values transports exchange.

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::TransportError;
use crate::record::{Field, ReservationId, SubmissionRecord};
use crate::verified::Verified;

/// Process-wide sequence feeding correlation ids.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Backend operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    SubmitForm,
    QueryReservation,
    GetReservations,
    UpdateStatus,
    Health,
}

impl Action {
    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::SubmitForm => "submitform",
            Action::QueryReservation => "queryreservation",
            Action::GetReservations => "getreservations",
            Action::UpdateStatus => "updatestatus",
            Action::Health => "health",
        }
    }

    /// True for operations that go to the administrative endpoint.
    pub fn is_admin(self) -> bool {
        matches!(self, Action::GetReservations | Action::UpdateStatus)
    }

    /// Prefix of correlation ids and callback names for this action.
    pub fn callback_prefix(self) -> &'static str {
        match self {
            Action::SubmitForm => "secureCallback",
            Action::QueryReservation => "queryCallback",
            Action::GetReservations => "adminCallback",
            Action::UpdateStatus => "updateCallback",
            Action::Health => "healthCallback",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Identifier binding an outstanding request to its completion.
///
/// Ids have the shape `<prefix>_<sequence>_<millis>`, which is also a valid
/// script function name, so the same value names the callback the backend
/// invokes. The sequence is process-wide, so two ids generated in one
/// process never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh id.
    pub fn generate(prefix: &str) -> Self {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
        Self(format!("{}_{}_{}", prefix, seq, Utc::now().timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CorrelationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stamped onto a form submission after the gate passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionMetadata {
    /// When the submission left the page.
    pub submission_time: DateTime<Utc>,
    /// Dwell time at submission, whole seconds.
    pub form_seconds: u64,
    /// Form schema version the backend expects.
    pub form_version: String,
    /// Browser or client identification, clamped to 200 characters.
    pub user_agent: Option<String>,
}

impl SubmissionMetadata {
    /// Current form schema version.
    pub const FORM_VERSION: &'static str = "2.0";
    const USER_AGENT_LEN: usize = 200;

    /// Metadata for a submission happening now.
    pub fn now(form_seconds: u64) -> Self {
        Self {
            submission_time: Utc::now(),
            form_seconds,
            form_version: Self::FORM_VERSION.to_string(),
            user_agent: None,
        }
    }

    /// Sets the user agent, keeping at most 200 characters.
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.chars().take(Self::USER_AGENT_LEN).collect());
        self
    }
}

/// The unit handed to a transport.
///
/// Envelopes are built through one constructor per backend action. The form
/// submission constructor only takes a [`Verified`] record, so a transport can
/// never be handed a submission that skipped the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    action: Action,
    origin: String,
    payload: Map<String, Value>,
    correlation_id: CorrelationId,
    issued_at: DateTime<Utc>,
}

impl RequestEnvelope {
    pub(crate) fn new(action: Action, origin: impl Into<String>) -> Self {
        Self {
            action,
            origin: origin.into(),
            payload: Map::new(),
            correlation_id: CorrelationId::generate(action.callback_prefix()),
            issued_at: Utc::now(),
        }
    }

    /// A form submission: the cleaned record, metadata, and a request stamp.
    pub fn submission(
        record: Verified<SubmissionRecord>,
        meta: &SubmissionMetadata,
        origin: impl Into<String>,
    ) -> Self {
        let origin = origin.into();
        let record = record.into_inner();

        let mut payload = Map::new();
        for field in Field::ALL {
            if let Some(value) = record.get(field) {
                payload.insert(field.key().to_string(), Value::from(value));
            }
        }
        payload.insert(
            "submissionTime".to_string(),
            Value::from(meta.submission_time.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        payload.insert(
            "formTime".to_string(),
            Value::from(format!("{} seconds", meta.form_seconds)),
        );
        payload.insert("formVersion".to_string(), Value::from(meta.form_version.clone()));
        payload.insert("securityPassed".to_string(), Value::Bool(true));
        if let Some(user_agent) = &meta.user_agent {
            payload.insert("userAgent".to_string(), Value::from(user_agent.clone()));
        }
        payload.insert("origin".to_string(), Value::from(origin.clone()));

        let stamp = RequestStamp::generate(&Value::Object(payload.clone()));
        payload.insert("timestamp".to_string(), Value::from(stamp.timestamp));
        payload.insert("nonce".to_string(), Value::from(stamp.nonce));
        payload.insert("signature".to_string(), Value::from(stamp.signature));

        let mut envelope = Self::new(Action::SubmitForm, origin);
        envelope.payload = payload;
        envelope
    }

    /// Looks up one reservation.
    pub fn query_reservation(id: &ReservationId, origin: impl Into<String>) -> Self {
        Self::new(Action::QueryReservation, origin).with_field("reservationId", id.as_str())
    }

    /// Lists reservations.
    pub fn get_reservations(origin: impl Into<String>) -> Self {
        Self::new(Action::GetReservations, origin)
    }

    /// Changes a reservation's status.
    pub fn update_status(id: &ReservationId, status: &str, origin: impl Into<String>) -> Self {
        Self::new(Action::UpdateStatus, origin)
            .with_field("reservationId", id.as_str())
            .with_field("status", status)
    }

    /// Liveness check.
    pub fn health(origin: impl Into<String>) -> Self {
        Self::new(Action::Health, origin)
    }

    pub(crate) fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Structured body for the direct transport.
    ///
    /// Payload keys sit next to the envelope keys; the envelope keys win on
    /// collision.
    pub fn to_json_body(&self) -> Value {
        let mut body = self.payload.clone();
        body.insert("action".to_string(), Value::from(self.action.as_str()));
        body.insert("origin".to_string(), Value::from(self.origin.clone()));
        body.insert(
            "correlationId".to_string(),
            Value::from(self.correlation_id.as_str()),
        );
        body.insert(
            "issuedAt".to_string(),
            Value::from(self.issued_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Value::Object(body)
    }

    /// Query parameters for the callback-script transport.
    ///
    /// Every payload field is flattened: strings as-is, other scalars via
    /// their JSON text, arrays and objects as compact JSON. Null fields are
    /// dropped. The callback name is not included; the transport adds it.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("action".to_string(), self.action.as_str().to_string()),
            ("origin".to_string(), self.origin.clone()),
        ];
        for (key, value) in &self.payload {
            if matches!(key.as_str(), "action" | "origin" | "callback" | "timestamp") {
                continue;
            }
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            pairs.push((key.clone(), text));
        }
        let timestamp = self
            .payload
            .get("timestamp")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| self.issued_at.timestamp_millis());
        pairs.push(("timestamp".to_string(), timestamp.to_string()));
        pairs
    }
}

/// Anti-replay stamp attached to form submissions.
///
/// `signature` is the first 32 characters of the base64 text of
/// `"<timestamp>-<nonce>-<payload json>"`. It is a tamper hint for the
/// backend, not a cryptographic signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestStamp {
    pub timestamp: i64,
    pub nonce: String,
    pub signature: String,
}

impl RequestStamp {
    const NONCE_LEN: usize = 11;
    const SIGNATURE_LEN: usize = 32;

    /// Stamps `payload` at the current time.
    pub fn generate(payload: &Value) -> Self {
        Self::generate_at(payload, Utc::now().timestamp_millis(), random_nonce())
    }

    fn generate_at(payload: &Value, timestamp: i64, nonce: String) -> Self {
        let material = format!("{}-{}-{}", timestamp, nonce, payload);
        let encoded = base64::engine::general_purpose::STANDARD.encode(material);
        let signature = encoded.chars().take(Self::SIGNATURE_LEN).collect();
        Self {
            timestamp,
            nonce,
            signature,
        }
    }
}

fn random_nonce() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..RequestStamp::NONCE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// A normalized backend reply: `{success, error?, ...fields}`.
///
/// A reply without `success` counts as a success; only an explicit
/// `success: false` marks a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BackendResponse {
    fields: Map<String, Value>,
}

impl BackendResponse {
    /// Accepts any JSON object.
    pub fn from_value(value: Value) -> Result<Self, TransportError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(TransportError::MalformedBody(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parses a response body.
    pub fn parse(body: &str) -> Result<Self, TransportError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| TransportError::MalformedBody(e.to_string()))?;
        Self::from_value(value)
    }

    /// False only when the reply says `success: false`.
    pub fn is_success(&self) -> bool {
        !matches!(self.fields.get("success"), Some(Value::Bool(false)))
    }

    /// The backend's error text, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.fields.get("error").and_then(Value::as_str)
    }

    /// The `reservationId` field, if present.
    pub fn reservation_id(&self) -> Option<&str> {
        self.fields.get("reservationId").and_then(Value::as_str)
    }

    /// Looks up any field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Turns `success: false` into an application error.
    pub fn into_result(self) -> Result<Self, TransportError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransportError::Application(
                self.error_message().unwrap_or("Request failed").to_string(),
            ))
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
