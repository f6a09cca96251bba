//! Delivery strategies for request envelopes.
//!
//! Two transports implement [`Transport`]: [`DirectTransport`] posts the
//! envelope as JSON, and [`CallbackScriptTransport`] encodes it into the URL
//! of a script whose reply invokes a named callback. The
//! [`Dispatcher`](crate::Dispatcher) tries the first and falls back to the
//! second.

use async_trait::async_trait;

use crate::envelope::{BackendResponse, RequestEnvelope};
use crate::error::TransportError;

mod callback;
mod direct;

pub use callback::{parse_callback_reply, CallbackScriptTransport, HttpScriptLoader, ScriptLoader};
pub use direct::DirectTransport;

/// One way of delivering an envelope to the backend.
///
/// Implementations normalize every reply to a [`BackendResponse`] and map
/// an explicit `success: false` to [`TransportError::Application`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Delivers `envelope` and waits for the reply.
    async fn send(&self, envelope: &RequestEnvelope) -> Result<BackendResponse, TransportError>;
}
