use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use super::Transport;
use crate::envelope::{BackendResponse, CorrelationId, RequestEnvelope};
use crate::error::TransportError;
use crate::logging::RequestLog;
use crate::registry::{CallbackRegistry, PendingRequest, TransportHandle};
use crate::secret::Secret;

/// Fetches a callback script and reports its reply to the registry.
///
/// `load` must not block. It starts the fetch and returns a handle that
/// cancels it; the fetch ends by calling exactly one of
/// [`CallbackRegistry::resolve`] or [`CallbackRegistry::fail`] for
/// `callback`, or nothing at all if the remote never answers.
pub trait ScriptLoader: Send + Sync {
    fn load(
        &self,
        url: Url,
        callback: CorrelationId,
        registry: Arc<CallbackRegistry>,
    ) -> Box<dyn TransportHandle>;
}

/// Loads callback scripts over HTTP GET on the current tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct HttpScriptLoader {
    client: reqwest::Client,
}

impl HttpScriptLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ScriptLoader for HttpScriptLoader {
    fn load(
        &self,
        url: Url,
        callback: CorrelationId,
        registry: Arc<CallbackRegistry>,
    ) -> Box<dyn TransportHandle> {
        let client = self.client.clone();
        let task = tokio::spawn(async move {
            match fetch_reply(&client, url, callback.as_str()).await {
                Ok(reply) => registry.resolve(callback.as_str(), reply),
                Err(e) => registry.fail(callback.as_str(), e),
            };
        });
        Box::new(task)
    }
}

async fn fetch_reply(
    client: &reqwest::Client,
    url: Url,
    callback: &str,
) -> Result<BackendResponse, TransportError> {
    let network = |_| {
        TransportError::Network("Network error - please check your connection".to_string())
    };
    let response = client.get(url).send().await.map_err(network)?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status.as_u16()));
    }
    let body = response.text().await.map_err(network)?;
    parse_callback_reply(&body, callback)
}

/// Extracts the JSON argument of `callback(...)` from a script body.
///
/// Leading comments or guards such as `/**/ typeof cb === 'function' &&`
/// are skipped; the argument runs to the last closing parenthesis.
///
/// # Examples
///
/// ```
/// use reservation_relay::parse_callback_reply;
///
/// let reply = parse_callback_reply(r#"/**/cb_1({"success":true});"#, "cb_1").unwrap();
/// assert!(reply.is_success());
/// ```
pub fn parse_callback_reply(body: &str, callback: &str) -> Result<BackendResponse, TransportError> {
    let call = format!("{}(", callback);
    let start = body
        .find(&call)
        .map(|at| at + call.len())
        .ok_or_else(|| {
            TransportError::MalformedBody(format!("reply does not invoke {}", callback))
        })?;
    let end = body
        .rfind(')')
        .filter(|&end| end >= start)
        .ok_or_else(|| {
            TransportError::MalformedBody("unterminated callback invocation".to_string())
        })?;
    BackendResponse::parse(body[start..end].trim())
}

/// Keeps an abandoned request on its own deadline.
///
/// If the awaiting future is dropped early, the entry stays registered so a
/// reply can still resolve it, and a detached task expires it once the
/// deadline passes.
struct ExpireOnDrop {
    registry: Arc<CallbackRegistry>,
    id: CorrelationId,
    deadline: Instant,
    armed: bool,
}

impl ExpireOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ExpireOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let registry = Arc::clone(&self.registry);
        let id = self.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let deadline = self.deadline;
                runtime.spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    registry.expire(id.as_str());
                });
            }
            // No runtime left to wait on.
            Err(_) => {
                registry.expire(id.as_str());
            }
        }
    }
}

/// Delivers an envelope as the query string of a callback script.
///
/// Every attempt gets a fresh callback name, registered with its own
/// deadline. The reply `name({...})` resolves the entry; reaching the
/// deadline expires it. Whichever happens first is the outcome, and a late
/// reply is ignored by the registry.
#[derive(Clone)]
pub struct CallbackScriptTransport {
    endpoint: Url,
    registry: Arc<CallbackRegistry>,
    loader: Arc<dyn ScriptLoader>,
    timeout: Duration,
    max_url_len: usize,
    api_key: Option<Secret<String>>,
}

impl CallbackScriptTransport {
    /// Longest URL a script request may use.
    pub const DEFAULT_MAX_URL_LEN: usize = 8192;

    /// Creates a transport on the shared registry with an HTTP loader.
    pub fn new(endpoint: Url, timeout: Duration) -> Self {
        Self {
            endpoint,
            registry: CallbackRegistry::shared(),
            loader: Arc::new(HttpScriptLoader::new()),
            timeout,
            max_url_len: Self::DEFAULT_MAX_URL_LEN,
            api_key: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<CallbackRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn ScriptLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_max_url_len(mut self, max_url_len: usize) -> Self {
        self.max_url_len = max_url_len;
        self
    }

    /// Adds the shared API key as the `apikey` query parameter.
    pub fn with_api_key(mut self, api_key: Secret<String>) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Builds the script URL for `envelope` under the callback name `callback`.
    pub fn build_url(
        &self,
        envelope: &RequestEnvelope,
        callback: &CorrelationId,
    ) -> Result<Url, TransportError> {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in envelope.query_pairs() {
                query.append_pair(&key, &value);
            }
            query.append_pair("callback", callback.as_str());
            if let Some(key) = &self.api_key {
                query.append_pair("apikey", key.expose_secret());
            }
        }

        let len = url.as_str().len();
        if len > self.max_url_len {
            return Err(TransportError::PayloadTooLarge {
                len,
                limit: self.max_url_len,
            });
        }
        Ok(url)
    }
}

impl std::fmt::Debug for CallbackScriptTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackScriptTransport")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("max_url_len", &self.max_url_len)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for CallbackScriptTransport {
    fn name(&self) -> &'static str {
        "callback"
    }

    async fn send(&self, envelope: &RequestEnvelope) -> Result<BackendResponse, TransportError> {
        let log = RequestLog::for_envelope(envelope);
        let callback = self
            .registry
            .next_callback_name(envelope.action().callback_prefix());
        let url = self.build_url(envelope, &callback)?;

        let (pending, mut rx) = PendingRequest::new(callback.clone(), self.timeout);
        let deadline = pending.deadline();
        self.registry.register(pending)?;
        let guard = ExpireOnDrop {
            registry: Arc::clone(&self.registry),
            id: callback.clone(),
            deadline,
            armed: true,
        };

        log.debug(format_args!(
            "loading callback script {} ({} bytes)",
            callback,
            url.as_str().len()
        ));
        let handle = self
            .loader
            .load(url, callback.clone(), Arc::clone(&self.registry));
        self.registry.attach_handle(callback.as_str(), handle);

        let received = match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(received) => received,
            Err(_) => {
                self.registry.expire(callback.as_str());
                // Either the expiry above or a reply that won the race.
                rx.await
            }
        };
        guard.disarm();

        let reply = received.map_err(|_| {
            TransportError::Network(format!("callback {} was dropped unanswered", callback))
        })??;
        reply.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Action;
    use crate::record::ReservationId;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct NoopHandle(Arc<AtomicUsize>);

    impl TransportHandle for NoopHandle {
        fn release(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Answers every load synchronously with a fixed body.
    struct ReplyLoader {
        body: String,
        urls: Mutex<Vec<Url>>,
    }

    impl ReplyLoader {
        fn new(body: &str) -> Arc<Self> {
            Arc::new(Self {
                body: body.to_string(),
                urls: Mutex::new(Vec::new()),
            })
        }
    }

    impl ScriptLoader for ReplyLoader {
        fn load(
            &self,
            url: Url,
            callback: CorrelationId,
            registry: Arc<CallbackRegistry>,
        ) -> Box<dyn TransportHandle> {
            self.urls.lock().unwrap().push(url);
            let script = format!("{}({});", callback, self.body);
            match parse_callback_reply(&script, callback.as_str()) {
                Ok(reply) => registry.resolve(callback.as_str(), reply),
                Err(e) => registry.fail(callback.as_str(), e),
            };
            Box::new(NoopHandle(Arc::new(AtomicUsize::new(0))))
        }
    }

    /// Never answers.
    struct SilentLoader {
        released: Arc<AtomicUsize>,
    }

    impl ScriptLoader for SilentLoader {
        fn load(
            &self,
            _: Url,
            _: CorrelationId,
            _: Arc<CallbackRegistry>,
        ) -> Box<dyn TransportHandle> {
            Box::new(NoopHandle(Arc::clone(&self.released)))
        }
    }

    fn endpoint() -> Url {
        Url::parse("https://script.google.com/macros/s/AKfy/exec").unwrap()
    }

    fn transport(
        loader: Arc<dyn ScriptLoader>,
    ) -> (CallbackScriptTransport, Arc<CallbackRegistry>) {
        let registry = Arc::new(CallbackRegistry::new());
        let transport = CallbackScriptTransport::new(endpoint(), Duration::from_secs(15))
            .with_registry(Arc::clone(&registry))
            .with_loader(loader);
        (transport, registry)
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn reply_resolves_and_carries_query() {
        let loader = ReplyLoader::new(r#"{"success":true,"reservationId":"ABC123"}"#);
        let (transport, registry) = transport(loader.clone());
        let transport = transport.with_api_key(Secret::new("k-1".to_string()));
        let id = ReservationId::normalize("abc-123");

        let reply = transport
            .send(&RequestEnvelope::query_reservation(&id, "https://a.test"))
            .await
            .unwrap();

        assert_eq!(reply.reservation_id(), Some("ABC123"));
        assert!(registry.is_empty());

        let urls = loader.urls.lock().unwrap();
        let url = &urls[0];
        assert_eq!(query(url, "action").as_deref(), Some("queryreservation"));
        assert_eq!(query(url, "reservationId").as_deref(), Some("ABC123"));
        assert_eq!(query(url, "apikey").as_deref(), Some("k-1"));
        assert!(query(url, "callback").unwrap().starts_with("queryCallback_"));
        assert!(query(url, "timestamp").is_some());
    }

    #[tokio::test]
    async fn explicit_failure_is_an_application_error() {
        let loader = ReplyLoader::new(r#"{"success":false,"error":"Invalid API key"}"#);
        let (transport, _) = transport(loader);

        let err = transport
            .send(&RequestEnvelope::health("https://a.test"))
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Application("Invalid API key".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_expires_at_the_deadline() {
        let released = Arc::new(AtomicUsize::new(0));
        let (transport, registry) = transport(Arc::new(SilentLoader {
            released: Arc::clone(&released),
        }));

        let err = transport
            .send(&RequestEnvelope::health("https://a.test"))
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Timeout(Duration::from_secs(15)));
        assert!(registry.is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    /// Answers `delay` after the load, from a spawned task.
    struct SlowLoader {
        delay: Duration,
        landed: Arc<AtomicBool>,
    }

    impl ScriptLoader for SlowLoader {
        fn load(
            &self,
            _: Url,
            callback: CorrelationId,
            registry: Arc<CallbackRegistry>,
        ) -> Box<dyn TransportHandle> {
            let delay = self.delay;
            let landed = Arc::clone(&self.landed);
            Box::new(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let reply = BackendResponse::parse(r#"{"success":true}"#).unwrap();
                landed.store(registry.resolve(callback.as_str(), reply), Ordering::SeqCst);
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_call_still_accepts_a_reply_before_the_deadline() {
        let landed = Arc::new(AtomicBool::new(false));
        let (transport, registry) = transport(Arc::new(SlowLoader {
            delay: Duration::from_secs(2),
            landed: Arc::clone(&landed),
        }));
        let envelope = RequestEnvelope::health("https://a.test");

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), transport.send(&envelope)).await;
        assert!(abandoned.is_err());
        assert_eq!(registry.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(landed.load(Ordering::SeqCst));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_silent_call_expires_at_its_deadline() {
        let released = Arc::new(AtomicUsize::new(0));
        let (transport, registry) = transport(Arc::new(SilentLoader {
            released: Arc::clone(&released),
        }));
        let envelope = RequestEnvelope::health("https://a.test");

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), transport.send(&envelope)).await;
        assert!(abandoned.is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(registry.is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_url_is_rejected_before_registering() {
        let released = Arc::new(AtomicUsize::new(0));
        let (transport, registry) = transport(Arc::new(SilentLoader {
            released: Arc::clone(&released),
        }));
        let transport = transport.with_max_url_len(100);
        let id = ReservationId::normalize(&"A".repeat(20));
        let envelope =
            RequestEnvelope::update_status(&id, &"confirmed ".repeat(20), "https://a.test");

        let err = transport.send(&envelope).await.unwrap_err();

        assert!(matches!(err, TransportError::PayloadTooLarge { limit: 100, .. }));
        assert!(registry.is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_prefix_follows_action() {
        let (transport, _) = transport(ReplyLoader::new("{}"));
        let envelope = RequestEnvelope::get_reservations("https://a.test");
        let name = CorrelationId::generate(Action::GetReservations.callback_prefix());

        let url = transport.build_url(&envelope, &name).unwrap();
        assert_eq!(query(&url, "callback").as_deref(), Some(name.as_str()));
        assert!(name.as_str().starts_with("adminCallback_"));
        assert!(query(&url, "apikey").is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let (transport, _) = transport(ReplyLoader::new("{}"));
        let transport = transport.with_api_key(Secret::new("k-secret".to_string()));

        let text = format!("{:?}", transport);
        assert!(!text.contains("k-secret"));
        assert!(text.contains("[REDACTED]"));
    }

    #[test]
    fn parse_reply_variants() {
        let plain = parse_callback_reply(r#"cb({"success":true})"#, "cb").unwrap();
        assert!(plain.is_success());

        let guarded = parse_callback_reply(
            r#"/**/ typeof cb === 'function' && cb({"success":false,"error":"no"});"#,
            "cb",
        )
        .unwrap();
        assert_eq!(guarded.error_message(), Some("no"));

        let nested = parse_callback_reply(r#"cb({"note":"a (b) c"})"#, "cb").unwrap();
        assert_eq!(nested.get("note").and_then(|v| v.as_str()), Some("a (b) c"));
    }

    #[test]
    fn parse_reply_rejects_other_callbacks_and_garbage() {
        assert!(matches!(
            parse_callback_reply(r#"other({"success":true})"#, "cb"),
            Err(TransportError::MalformedBody(_))
        ));
        assert!(matches!(
            parse_callback_reply("cb(", "cb"),
            Err(TransportError::MalformedBody(_))
        ));
        assert!(matches!(
            parse_callback_reply("cb([1,2])", "cb"),
            Err(TransportError::MalformedBody(_))
        ));
    }
}
