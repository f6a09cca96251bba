//! Correlation of outstanding callback-script requests with their completions.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::envelope::{BackendResponse, CorrelationId};
use crate::error::TransportError;

/// The single outcome a pending request completes with.
pub type Completion = Result<BackendResponse, TransportError>;

static SHARED: LazyLock<Arc<CallbackRegistry>> =
    LazyLock::new(|| Arc::new(CallbackRegistry::new()));

/// The transient resource behind an in-flight callback request.
///
/// Releasing it tears the resource down. It is called at most once, by
/// whichever terminal operation removes the pending entry.
pub trait TransportHandle: Send {
    fn release(self: Box<Self>);
}

impl<T: Send + 'static> TransportHandle for tokio::task::JoinHandle<T> {
    fn release(self: Box<Self>) {
        self.abort();
    }
}

/// An outstanding request, owned by the registry until it completes.
pub struct PendingRequest {
    correlation_id: CorrelationId,
    deadline: Instant,
    timeout: Duration,
    on_complete: oneshot::Sender<Completion>,
    handle: Option<Box<dyn TransportHandle>>,
}

impl PendingRequest {
    /// Creates a pending request expiring `timeout` from now, and the
    /// receiver its single outcome is delivered to.
    pub fn new(
        correlation_id: CorrelationId,
        timeout: Duration,
    ) -> (Self, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        let pending = Self {
            correlation_id,
            deadline: Instant::now() + timeout,
            timeout,
            on_complete: tx,
            handle: None,
        };
        (pending, rx)
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn complete(mut self, outcome: Completion) {
        if let Some(handle) = self.handle.take() {
            handle.release();
        }
        // A dropped receiver means nobody is waiting any more.
        let _ = self.on_complete.send(outcome);
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("correlation_id", &self.correlation_id)
            .field("deadline", &self.deadline)
            .field("has_handle", &self.handle.is_some())
            .finish()
    }
}

/// Table of pending callback requests keyed by correlation id.
///
/// Each entry reaches exactly one terminal outcome: resolved, expired or
/// failed. The terminal operation that removes the entry completes it and
/// releases its transport handle; any later signal for the same id returns
/// `false` and changes nothing.
///
/// The map sits behind a mutex. Every check-then-remove happens inside one
/// lock scope and completion runs after the lock is dropped.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use reservation_relay::{BackendResponse, CallbackRegistry, PendingRequest};
///
/// let registry = CallbackRegistry::new();
/// let id = registry.next_callback_name("queryCallback");
/// let (pending, mut rx) = PendingRequest::new(id.clone(), Duration::from_secs(15));
/// registry.register(pending).unwrap();
///
/// let reply = BackendResponse::parse(r#"{"success":true}"#).unwrap();
/// assert!(registry.resolve(id.as_str(), reply));
/// assert!(!registry.expire(id.as_str()));
/// assert!(rx.try_recv().unwrap().is_ok());
/// ```
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    pending: Mutex<HashMap<CorrelationId, PendingRequest>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registry shared by every transport in the process.
    pub fn shared() -> Arc<CallbackRegistry> {
        Arc::clone(&SHARED)
    }

    /// Generates a callback name unique for the life of the process.
    pub fn next_callback_name(&self, prefix: &str) -> CorrelationId {
        CorrelationId::generate(prefix)
    }

    /// Adds a pending request. An id that is already pending is rejected.
    pub fn register(&self, pending: PendingRequest) -> Result<(), TransportError> {
        let mut map = self.lock();
        if map.contains_key(pending.correlation_id.as_str()) {
            return Err(TransportError::DuplicateCallback(
                pending.correlation_id.to_string(),
            ));
        }
        tracing::debug!(correlation_id = %pending.correlation_id, "callback registered");
        map.insert(pending.correlation_id.clone(), pending);
        Ok(())
    }

    /// Binds the transport handle of a pending request.
    ///
    /// If the request already completed, the handle is released on the spot
    /// and `false` is returned.
    pub fn attach_handle(&self, id: &str, handle: Box<dyn TransportHandle>) -> bool {
        let previous = {
            let mut map = self.lock();
            match map.get_mut(id) {
                Some(pending) => Ok(pending.handle.replace(handle)),
                None => Err(handle),
            }
        };
        match previous {
            Ok(old) => {
                if let Some(old) = old {
                    old.release();
                }
                true
            }
            Err(handle) => {
                handle.release();
                false
            }
        }
    }

    /// Completes a request with the backend's reply.
    pub fn resolve(&self, id: &str, response: BackendResponse) -> bool {
        self.finish(id, "resolved", |_| Ok(response))
    }

    /// Completes a request with a timeout.
    pub fn expire(&self, id: &str) -> bool {
        self.finish(id, "expired", |pending| {
            Err(TransportError::Timeout(pending.timeout))
        })
    }

    /// Completes a request with a load failure.
    pub fn fail(&self, id: &str, error: TransportError) -> bool {
        self.finish(id, "failed", |_| Err(error))
    }

    /// True if `id` is still pending.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn finish(
        &self,
        id: &str,
        outcome: &'static str,
        make: impl FnOnce(&PendingRequest) -> Completion,
    ) -> bool {
        let removed = self.lock().remove(id);
        match removed {
            Some(pending) => {
                tracing::debug!(correlation_id = %id, outcome, "callback completed");
                let completion = make(&pending);
                pending.complete(completion);
                true
            }
            None => {
                tracing::debug!(correlation_id = %id, outcome, "late callback signal ignored");
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, PendingRequest>> {
        // Entries stay consistent across a panic: each mutation is a single map call.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
