use std::sync::LazyLock;

use regex::Regex;

use crate::record::SubmissionRecord;

/// Length cap for record fields sent to the backend.
pub const MAX_FIELD_LEN: usize = 500;

/// Length cap for any text shown on screen.
pub const MAX_DISPLAY_LEN: usize = 200;

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>").expect("script block regex is valid")
});

static SCRIPT_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:java|vb)script:").expect("script uri regex is valid"));

static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)on\w+\s*=").expect("event handler regex is valid"));

/// Text cleaner applied to every string attribute of a submission.
///
/// Cleaning does, in order:
/// - trims surrounding whitespace
/// - removes `<script>...</script>` blocks, any case, across lines
/// - strips every `<` and `>`
/// - removes `javascript:` and `vbscript:` prefixes
/// - removes inline event-handler patterns such as `onclick=`
///
/// The steps repeat until nothing changes, so input built to reassemble a
/// pattern after one removal (`javajavascript:script:`) is still cleaned.
/// The result is then clamped to the length cap, counted in characters.
///
/// Cleaning never fails and is idempotent: cleaning cleaned text is a no-op.
///
/// # Examples
///
/// ```
/// use reservation_relay::TextSanitizer;
///
/// let sanitizer = TextSanitizer::default_limits();
///
/// assert_eq!(sanitizer.clean("  hello  "), "hello");
/// assert_eq!(sanitizer.clean("Hi<script>alert(1)</script> there"), "Hi there");
/// assert_eq!(sanitizer.clean("<b onclick=x()>bold</b>"), "b x()bold/b");
/// assert_eq!(sanitizer.clean("JavaScript:void(0)"), "void(0)");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TextSanitizer {
    max_len: usize,
}

impl TextSanitizer {
    /// Creates a sanitizer with the given character cap.
    ///
    /// # Panics
    ///
    /// Panics if `max_len` is 0.
    pub fn new(max_len: usize) -> Self {
        assert!(max_len > 0, "max_len must be greater than 0");
        Self { max_len }
    }

    /// Sanitizer for record fields (500 characters).
    pub fn default_limits() -> Self {
        Self::new(MAX_FIELD_LEN)
    }

    /// Sanitizer for on-screen text (200 characters).
    pub fn display() -> Self {
        Self::new(MAX_DISPLAY_LEN)
    }

    /// Returns the character cap.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Cleans one piece of text.
    pub fn clean(&self, raw: &str) -> String {
        let mut current = raw.to_string();
        loop {
            let next = Self::clean_once(&current);
            if next == current {
                break;
            }
            current = next;
        }

        if current.chars().count() > self.max_len {
            current = current.chars().take(self.max_len).collect();
            // A cut can expose trailing whitespace; drop it so a second pass is a no-op.
            current.truncate(current.trim_end().len());
        }
        current
    }

    /// Cleans every text attribute of `record`.
    pub fn sanitize_record(&self, record: SubmissionRecord) -> SubmissionRecord {
        record.map_text(|value| self.clean(value))
    }

    fn clean_once(text: &str) -> String {
        let text = text.trim();
        let text = SCRIPT_BLOCK.replace_all(text, "");
        let text = text.replace(['<', '>'], "");
        let text = SCRIPT_URI.replace_all(&text, "");
        let text = EVENT_HANDLER.replace_all(&text, "");
        text.trim().to_string()
    }
}

impl Default for TextSanitizer {
    fn default() -> Self {
        Self::default_limits()
    }
}

/// Cleans every text attribute of `record` with the field cap.
pub fn sanitize(record: SubmissionRecord) -> SubmissionRecord {
    TextSanitizer::default_limits().sanitize_record(record)
}

/// Prepares a message for on-screen display.
pub fn display_message(text: &str) -> String {
    TextSanitizer::display().clean(text)
}
