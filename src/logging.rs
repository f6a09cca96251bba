use std::fmt;

use crate::envelope::{Action, RequestEnvelope};

/// A logger scoped to one outbound request.
///
/// Every event carries the request's `correlation_id` and `action`, so the
/// direct attempt, the fallback and the registry outcome of one request can
/// be joined in the log stream.
///
/// Secret values are redacted when logged through their `Debug` and
/// `Display` implementations.
#[derive(Debug, Clone, Copy)]
pub struct RequestLog<'a> {
    correlation_id: &'a str,
    action: Action,
}

impl<'a> RequestLog<'a> {
    /// Creates a logger for `envelope`.
    pub fn for_envelope(envelope: &'a RequestEnvelope) -> Self {
        Self {
            correlation_id: envelope.correlation_id().as_str(),
            action: envelope.action(),
        }
    }

    /// Returns the correlation id attached to every event.
    pub fn correlation_id(&self) -> &str {
        self.correlation_id
    }

    /// Logs an info-level message.
    ///
    /// ```no_run
    /// # use reservation_relay::{RequestLog, Secret};
    /// # fn example(log: RequestLog<'_>) {
    /// let key = Secret::new("apikey");
    /// log.info(format_args!("sending with key {:?}", key));
    /// # }
    /// ```
    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(correlation_id = %self.correlation_id, action = %self.action, "{}", args);
    }

    /// Logs a warning-level message.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(correlation_id = %self.correlation_id, action = %self.action, "{}", args);
    }

    /// Logs an error-level message.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(correlation_id = %self.correlation_id, action = %self.action, "{}", args);
    }

    /// Logs a debug-level message.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(correlation_id = %self.correlation_id, action = %self.action, "{}", args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Secret;

    #[test]
    fn carries_envelope_identity() {
        let envelope = RequestEnvelope::health("https://a.test");
        let log = RequestLog::for_envelope(&envelope);

        assert_eq!(log.correlation_id(), envelope.correlation_id().as_str());
        assert!(log.correlation_id().starts_with("healthCallback_"));
    }

    #[test]
    fn logging_with_secret_does_not_panic() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let envelope = RequestEnvelope::get_reservations("https://a.test");
        let log = RequestLog::for_envelope(&envelope);
        let key = Secret::new("hunter2".to_string());

        log.info(format_args!("key {:?}", key));
        log.warn(format_args!("key {}", key));
        log.error(format_args!("failed"));
        log.debug(format_args!("done"));
    }
}
