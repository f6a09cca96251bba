//! The client facade: the pre-submission gate composed with delivery.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use url::Url;

use crate::config::ClientConfig;
use crate::context::{PageSignals, SessionContext};
use crate::dispatcher::Dispatcher;
use crate::envelope::{BackendResponse, RequestEnvelope, SubmissionMetadata};
use crate::error::{Error, Result};
use crate::gate::SecurityGate;
use crate::record::{ReservationId, SubmissionRecord};
use crate::sanitizer::sanitize;
use crate::tainted::Tainted;
use crate::transport::{CallbackScriptTransport, DirectTransport, Transport};
use crate::validation::{validate, Rule, ValidationResult};
use crate::verified::Verified;

/// Delivers reservation form submissions and admin queries.
///
/// A submission must pass validation, the security gate and the sanitizer
/// before anything touches the network; the first step that fails ends the
/// attempt with its own error. A required field the sanitizer empties counts
/// as a validation failure and is reported before the gate spends an
/// attempt. Query and admin operations go straight to the dispatcher.
///
/// The client owns one [`SessionContext`] for its lifetime. It is only
/// replaced by [`reset_session`](Self::reset_session).
///
/// # Examples
///
/// ```no_run
/// use reservation_relay::{
///     ClientConfig, PageSignals, ReservationClient, SubmissionRecord, Tainted,
/// };
///
/// # async fn run(record: SubmissionRecord) -> reservation_relay::Result<()> {
/// let config = ClientConfig::from_env()?;
/// let client = ReservationClient::new(config)?;
///
/// let reply = client
///     .submit(Tainted::new(record), &PageSignals::consenting())
///     .await?;
/// println!("reservation {}", reply.reservation_id().unwrap_or("pending"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ReservationClient {
    config: ClientConfig,
    gate: SecurityGate,
    session: Mutex<SessionContext>,
    dispatcher: Dispatcher,
    admin: Option<Dispatcher>,
    user_agent: Option<String>,
}

impl ReservationClient {
    /// Validates `config` and builds the HTTP transports it describes.
    ///
    /// Admin operations use a dispatcher of their own when
    /// `admin_endpoint` is set.
    pub fn new(config: ClientConfig) -> Result<Self> {
        check_config(&config)?;
        let dispatcher = build_dispatcher(&config, config.endpoint_url()?)?;
        let admin = config
            .admin_endpoint_url()?
            .map(|endpoint| build_dispatcher(&config, endpoint))
            .transpose()?;
        Ok(Self::assemble(config, dispatcher, admin))
    }

    /// Validates `config` and delivers through the given transports.
    ///
    /// Every operation, admin included, uses this one pair.
    pub fn with_transports(
        config: ClientConfig,
        direct: Arc<dyn Transport>,
        fallback: Arc<dyn Transport>,
    ) -> Result<Self> {
        check_config(&config)?;
        Ok(Self::assemble(config, Dispatcher::new(direct, fallback), None))
    }

    fn assemble(config: ClientConfig, dispatcher: Dispatcher, admin: Option<Dispatcher>) -> Self {
        tracing::info!(
            origin = %config.origin,
            timeout_ms = config.request_timeout_ms,
            retry_count = config.retry_count,
            admin_endpoint = admin.is_some(),
            "reservation client ready; retry_count is informational only"
        );
        Self {
            config,
            gate: SecurityGate::standard(),
            session: Mutex::new(SessionContext::new()),
            dispatcher,
            admin,
            user_agent: None,
        }
    }

    /// Sends admin operations through their own transports.
    pub fn with_admin_transports(
        mut self,
        direct: Arc<dyn Transport>,
        fallback: Arc<dyn Transport>,
    ) -> Self {
        self.admin = Some(Dispatcher::new(direct, fallback));
        self
    }

    /// Replaces the security gate.
    pub fn with_gate(mut self, gate: SecurityGate) -> Self {
        self.gate = gate;
        self
    }

    /// Reports `user_agent` with every submission.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A copy of the current session state.
    pub fn session(&self) -> SessionContext {
        self.lock_session().clone()
    }

    /// Starts a new session as if the form had just been rendered.
    pub fn reset_session(&self) {
        *self.lock_session() = SessionContext::new();
        tracing::debug!("session reset");
    }

    /// Submits a form.
    pub async fn submit(
        &self,
        raw: Tainted<SubmissionRecord>,
        signals: &PageSignals,
    ) -> Result<BackendResponse> {
        self.submit_at(raw, signals, Instant::now()).await
    }

    /// Submits a form as if the user pressed submit at `now`.
    pub async fn submit_at(
        &self,
        raw: Tainted<SubmissionRecord>,
        signals: &PageSignals,
        now: Instant,
    ) -> Result<BackendResponse> {
        let report = validate(raw.peek());
        if !report.is_valid {
            tracing::info!(errors = report.errors.len(), "submission failed validation");
            return Err(Error::Validation(report));
        }

        // Markup-only values pass the format rules but clean down to nothing.
        let cleaned = sanitize(raw.into_inner());
        let emptied: Vec<_> = validate(&cleaned)
            .errors
            .into_iter()
            .filter(|e| e.rule == Rule::Required)
            .collect();
        if !emptied.is_empty() {
            tracing::info!(errors = emptied.len(), "submission emptied by sanitization");
            return Err(Error::Validation(ValidationResult::from_errors(emptied)));
        }

        let form_seconds = {
            let mut session = self.lock_session();
            self.gate
                .evaluate_at(&mut session, signals, now)
                .into_result()?;
            session.elapsed_at(now).as_secs()
        };

        let record = Verified::new_unchecked(cleaned);
        let mut meta = SubmissionMetadata::now(form_seconds);
        if let Some(user_agent) = &self.user_agent {
            meta = meta.with_user_agent(user_agent);
        }

        let envelope = RequestEnvelope::submission(record, &meta, self.config.origin.as_str());
        self.send(&envelope).await
    }

    /// Looks up a reservation. The id is normalized first.
    pub async fn query_reservation(&self, raw_id: &str) -> Result<BackendResponse> {
        let id = ReservationId::normalize(raw_id);
        if id.is_empty() {
            tracing::warn!("reservation id is empty after normalization");
        }
        let envelope = RequestEnvelope::query_reservation(&id, self.config.origin.as_str());
        self.send(&envelope).await
    }

    /// Lists reservations. Admin operation.
    pub async fn get_reservations(&self) -> Result<BackendResponse> {
        let envelope = RequestEnvelope::get_reservations(self.config.origin.as_str());
        self.send(&envelope).await
    }

    /// Changes a reservation's status. Admin operation.
    pub async fn update_status(&self, raw_id: &str, status: &str) -> Result<BackendResponse> {
        let id = ReservationId::normalize(raw_id);
        let envelope = RequestEnvelope::update_status(&id, status, self.config.origin.as_str());
        self.send(&envelope).await
    }

    /// Probes the backend.
    pub async fn health_check(&self) -> Result<BackendResponse> {
        let envelope = RequestEnvelope::health(self.config.origin.as_str());
        self.send(&envelope).await
    }

    /// Runs a health check and logs the outcome. Returns whether it passed.
    pub async fn verify_connection(&self) -> bool {
        match self.health_check().await {
            Ok(reply) => {
                tracing::info!(
                    status = reply.get("status").and_then(|v| v.as_str()).unwrap_or("ok"),
                    "backend connection verified"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "backend connection check failed");
                false
            }
        }
    }

    /// Admin actions use the admin transports when configured.
    async fn send(&self, envelope: &RequestEnvelope) -> Result<BackendResponse> {
        let dispatcher = match &self.admin {
            Some(admin) if envelope.action().is_admin() => admin,
            _ => &self.dispatcher,
        };
        dispatcher.send(envelope).await
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionContext> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_config(config: &ClientConfig) -> Result<()> {
    config.validate().map_err(|e| {
        tracing::error!(error = %e, "refusing to build reservation client");
        Error::from(e)
    })
}

fn build_dispatcher(config: &ClientConfig, endpoint: Url) -> Result<Dispatcher> {
    let timeout = config.request_timeout();
    let mut direct = DirectTransport::new(endpoint.clone(), timeout)?;
    let mut callback =
        CallbackScriptTransport::new(endpoint, timeout).with_max_url_len(config.max_url_len);
    if let Some(key) = &config.api_key {
        direct = direct.with_api_key(key.clone());
        callback = callback.with_api_key(key.clone());
    }
    Ok(Dispatcher::new(Arc::new(direct), Arc::new(callback)))
}
