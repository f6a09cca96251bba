use std::fmt;

use serde::{Deserialize, Deserializer};

/// A wrapper that keeps credential material out of logs and error text.
///
/// The relay holds the backend's shared API key in a `Secret<String>`. The key
/// has to travel in the callback-script query string, so it is exposed exactly
/// once, when the URL is built, and never through `Debug` or `Display`.
///
/// # Examples
///
/// ```
/// use reservation_relay::Secret;
///
/// let api_key = Secret::new("AKfycb-shared-key".to_string());
///
/// assert_eq!(format!("{:?}", api_key), "[REDACTED]");
/// assert_eq!(format!("{}", api_key), "[REDACTED]");
/// assert_eq!(api_key.expose_secret(), "AKfycb-shared-key");
/// ```
// Do NOT derive Debug, Display or Default: each one would print or fabricate key material.
// Clone is derived on purpose: `ClientConfig` is Clone, and the direct and
// callback transports each own a copy of the key. A clone is still redacted.
#[derive(Clone)]
pub struct Secret<T> {
    inner: T,
}

impl<T> Secret<T> {
    /// Wraps a sensitive value.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Explicitly exposes the secret value.
    ///
    /// Callers must not log or display the returned reference.
    pub fn expose_secret(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Secret<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Secret::new)
    }
}
