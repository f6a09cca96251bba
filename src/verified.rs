/// A value that has passed the whole pre-submission gate.
///
/// For a [`SubmissionRecord`](crate::SubmissionRecord) this means validation,
/// the security gate and the sanitizer ran, in that order. The constructor is
/// crate-private and only the submission pipeline calls it, so a transport that
/// asks for `Verified<SubmissionRecord>` cannot be handed raw input.
///
/// External code cannot build one:
///
/// ```compile_fail
/// use reservation_relay::{SubmissionRecord, Verified};
///
/// let forged = Verified::new_unchecked(SubmissionRecord::default());
/// ```
///
/// There is deliberately no `Deref` and no `Default`; access goes through
/// [`AsRef::as_ref`] or [`into_inner`](Self::into_inner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified<T> {
    inner: T,
}

impl<T> Verified<T> {
    /// Wraps a value without checking it.
    ///
    /// Callers must have run every gate step on `value` first.
    pub(crate) fn new_unchecked(value: T) -> Self {
        Self { inner: value }
    }

    /// Consumes the wrapper and returns the cleaned value.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> AsRef<T> for Verified<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}
