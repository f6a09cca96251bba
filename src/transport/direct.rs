use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::Transport;
use crate::envelope::{BackendResponse, RequestEnvelope};
use crate::error::TransportError;
use crate::logging::RequestLog;
use crate::secret::Secret;

const USER_AGENT_VALUE: &str = concat!("reservation-relay/", env!("CARGO_PKG_VERSION"));

/// Posts the envelope as a JSON body.
///
/// Success needs a 2xx status, a body that parses as a JSON object, and no
/// `success: false` in it. Everything else is a failure the dispatcher may
/// fall back from.
#[derive(Debug, Clone)]
pub struct DirectTransport {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
    api_key: Option<Secret<String>>,
}

impl DirectTransport {
    /// Creates a transport posting to `endpoint`, each request bounded by `timeout`.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| {
                TransportError::Network(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint,
            timeout,
            api_key: None,
        })
    }

    /// Sends the shared API key as the `apikey` body field.
    pub fn with_api_key(mut self, api_key: Secret<String>) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn send(&self, envelope: &RequestEnvelope) -> Result<BackendResponse, TransportError> {
        let log = RequestLog::for_envelope(envelope);
        let mut body = envelope.to_json_body();
        if let (Some(key), Value::Object(fields)) = (&self.api_key, &mut body) {
            fields.insert("apikey".to_string(), Value::from(key.expose_secret().as_str()));
        }

        log.debug(format_args!("posting to {}", self.endpoint));
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let text = response.text().await.map_err(|e| self.classify(e))?;
        BackendResponse::parse(&text)?.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn transport(server: &MockServer, timeout: Duration) -> DirectTransport {
        let endpoint = Url::parse(&format!("{}/exec", server.uri())).unwrap();
        DirectTransport::new(endpoint, timeout).unwrap()
    }

    #[tokio::test]
    async fn posts_json_and_returns_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/exec"))
            .and(body_partial_json(serde_json::json!({
                "action": "health",
                "apikey": "k-123",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"success":true,"status":"ok"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server, Duration::from_secs(5))
            .await
            .with_api_key(Secret::new("k-123".to_string()));
        let reply = transport
            .send(&RequestEnvelope::health("https://a.test"))
            .await
            .unwrap();

        assert_eq!(reply.get("status").and_then(Value::as_str), Some("ok"));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = transport(&server, Duration::from_secs(5))
            .await
            .send(&RequestEnvelope::health("https://a.test"))
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Status(503));
    }

    #[tokio::test]
    async fn explicit_failure_becomes_application_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"success":false,"error":"Reservation not found"}"#),
            )
            .mount(&server)
            .await;

        let err = transport(&server, Duration::from_secs(5))
            .await
            .send(&RequestEnvelope::get_reservations("https://a.test"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TransportError::Application("Reservation not found".to_string())
        );
    }

    #[tokio::test]
    async fn html_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let err = transport(&server, Duration::from_secs(5))
            .await
            .send(&RequestEnvelope::health("https://a.test"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::MalformedBody(_)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = transport(&server, Duration::from_millis(50))
            .await
            .send(&RequestEnvelope::health("https://a.test"))
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Timeout(Duration::from_millis(50)));
    }
}
