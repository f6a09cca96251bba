use std::sync::Arc;

use crate::envelope::{BackendResponse, RequestEnvelope};
use crate::error::{Error, Result};
use crate::logging::RequestLog;
use crate::transport::Transport;

/// Direct delivery with a single callback-script fallback.
///
/// The direct transport is tried first. Any failure of it, whether status,
/// timeout, malformed body or `success: false`, triggers exactly one attempt
/// on the fallback. There is no further retry. When both fail the error
/// keeps both causes.
#[derive(Clone)]
pub struct Dispatcher {
    direct: Arc<dyn Transport>,
    fallback: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(direct: Arc<dyn Transport>, fallback: Arc<dyn Transport>) -> Self {
        Self { direct, fallback }
    }

    /// Delivers `envelope` and returns the backend reply.
    pub async fn send(&self, envelope: &RequestEnvelope) -> Result<BackendResponse> {
        let log = RequestLog::for_envelope(envelope);

        let direct = match self.direct.send(envelope).await {
            Ok(reply) => {
                log.debug(format_args!("delivered via {}", self.direct.name()));
                return Ok(reply);
            }
            Err(e) => e,
        };
        log.warn(format_args!(
            "{} transport failed ({}): {}; falling back to {}",
            self.direct.name(),
            direct.kind(),
            direct,
            self.fallback.name()
        ));

        match self.fallback.send(envelope).await {
            Ok(reply) => {
                log.info(format_args!("delivered via {}", self.fallback.name()));
                Ok(reply)
            }
            Err(callback) => {
                log.error(format_args!(
                    "{} transport failed ({}): {}",
                    self.fallback.name(),
                    callback.kind(),
                    callback
                ));
                Err(Error::Delivery { direct, callback })
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("direct", &self.direct.name())
            .field("fallback", &self.fallback.name())
            .finish()
    }
}
