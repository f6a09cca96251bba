use std::fmt;

/// Raw form input that has not been through the pre-submission gate.
///
/// Everything a page hands to the relay arrives as `Tainted<T>`. The inner
/// value can only be read by crate code: the validation engine borrows it, the
/// sanitizer consumes it, and only then does a [`Verified`](crate::Verified)
/// value exist that a transport will accept.
///
/// # Examples
///
/// ```
/// use reservation_relay::{SubmissionRecord, Tainted};
///
/// let raw = Tainted::new(SubmissionRecord {
///     first_name: "<script>alert(1)</script>Ann".to_string(),
///     ..SubmissionRecord::default()
/// });
///
/// // Debug output says where the value came from.
/// assert!(format!("{:?}", raw).starts_with("Tainted"));
/// ```
// Clone is kept: a caller may retry the same raw input after fixing page state.
#[derive(Clone)]
pub struct Tainted<T> {
    // Must stay private. Public access would let raw input skip the gate.
    inner: T,
}

impl<T> Tainted<T> {
    /// Wraps an untrusted value.
    pub fn new(value: T) -> Self {
        Self { inner: value }
    }

    /// Borrows the raw value for read-only checks.
    ///
    /// Only the validation engine uses this; it never mutates its input.
    pub(crate) fn peek(&self) -> &T {
        &self.inner
    }

    /// Extracts the raw value for sanitization.
    pub(crate) fn into_inner(self) -> T {
        self.inner
    }
}

// No Deref, AsRef, Borrow, From<T> or Into<T>: any of them would let raw
// input reach a transport without passing the gate.

impl<T: fmt::Debug> fmt::Debug for Tainted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tainted")
            .field("inner", &self.inner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tainted_wraps_value() {
        let raw = Tainted::new("onclick=steal()".to_string());
        let debug_output = format!("{:?}", raw);

        assert!(debug_output.contains("Tainted"));
        assert!(debug_output.contains("onclick=steal()"));
    }

    #[test]
    fn peek_does_not_consume() {
        let raw = Tainted::new(vec![1, 2, 3]);

        assert_eq!(raw.peek().len(), 3);
        assert_eq!(raw.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn tainted_cannot_be_used_as_t() {
        let raw = Tainted::new("unsafe".to_string());

        #[allow(dead_code)]
        fn takes_string(_s: String) {}

        // Does not compile if uncommented:
        // takes_string(raw);

        let _ = raw;
    }
}
