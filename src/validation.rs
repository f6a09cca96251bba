//! Field-rule validation for submission records.
//!
//! [`validate`] is pure and total: it borrows the record, checks every rule,
//! and returns every violation in field-declaration order. It never stops at
//! the first failure, so a form can show its complete error list in one pass.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::record::{Field, SubmissionRecord};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex is valid")
});

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9\s\-()+]{10,}$").expect("phone regex is valid"));

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z\s\-'.]{2,50}$").expect("name regex is valid"));

/// Grades the program accepts.
pub const VALID_GRADES: [&str; 9] = ["4", "5", "6", "7", "8", "9", "10", "11", "12"];

/// Inclusive GPA bounds.
pub const GPA_RANGE: std::ops::RangeInclusive<f64> = 0.0..=4.0;

/// The rule a field violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Mandatory field missing or blank.
    Required,
    /// Email does not look like `local@domain.tld`.
    Email,
    /// Phone has fewer than ten digits/separators or other characters.
    Phone,
    /// Name has characters outside letters, space and `-'.`, or bad length.
    Name,
    /// GPA is not a number in `[0.0, 4.0]`.
    GpaRange,
    /// Grade is outside 4 through 12.
    Grade,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required => write!(f, "required"),
            Rule::Email => write!(f, "email format"),
            Rule::Phone => write!(f, "phone format"),
            Rule::Name => write!(f, "name format"),
            Rule::GpaRange => write!(f, "gpa range"),
            Rule::Grade => write!(f, "grade set"),
        }
    }
}

/// One violated rule on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub rule: Rule,
    pub message: String,
}

impl FieldError {
    fn new(field: Field, rule: Rule, message: impl Into<String>) -> Self {
        Self {
            field,
            rule,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    pub(crate) fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// All messages joined with `", "`, the form the page shows.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns true if any error names `field`.
    pub fn has_error_for(&self, field: Field) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Checks `record` against every field rule.
///
/// # Examples
///
/// ```
/// use reservation_relay::{validate, Field, SubmissionRecord};
///
/// let result = validate(&SubmissionRecord {
///     email: "not-an-email".to_string(),
///     ..SubmissionRecord::default()
/// });
///
/// assert!(!result.is_valid);
/// assert!(result.has_error_for(Field::FirstName));
/// assert!(result.has_error_for(Field::Email));
/// ```
pub fn validate(record: &SubmissionRecord) -> ValidationResult {
    let mut errors = Vec::new();

    for field in Field::REQUIRED {
        let value = record.get(field).unwrap_or_default().trim();
        if value.is_empty() {
            errors.push(FieldError::new(
                field,
                Rule::Required,
                format!("{} is required", field.label()),
            ));
            continue;
        }
        if let Some(error) = check_format(field, value) {
            errors.push(error);
        }
    }

    if let Some(gpa) = record.gpa.as_deref().map(str::trim) {
        if !gpa.is_empty() && !gpa_in_range(gpa) {
            errors.push(FieldError::new(
                Field::Gpa,
                Rule::GpaRange,
                "GPA must be between 0.0 and 4.0",
            ));
        }
    }

    ValidationResult::from_errors(errors)
}

fn check_format(field: Field, value: &str) -> Option<FieldError> {
    let (rule, message) = match field {
        Field::Email if !EMAIL.is_match(value) => {
            (Rule::Email, "Please enter a valid email address")
        }
        Field::Phone if !PHONE.is_match(value) => {
            (Rule::Phone, "Please enter a valid phone number")
        }
        Field::FirstName if !NAME.is_match(value) => {
            (Rule::Name, "First name contains invalid characters")
        }
        Field::LastName if !NAME.is_match(value) => {
            (Rule::Name, "Last name contains invalid characters")
        }
        Field::Grade if !VALID_GRADES.contains(&value) => {
            (Rule::Grade, "Please select a valid grade level")
        }
        _ => return None,
    };
    Some(FieldError::new(field, rule, message))
}

fn gpa_in_range(raw: &str) -> bool {
    raw.parse::<f64>()
        .map(|gpa| GPA_RANGE.contains(&gpa))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_record() -> SubmissionRecord {
        SubmissionRecord {
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            email: "a@b.com".to_string(),
            phone: "123-456-7890".to_string(),
            grade: "10".to_string(),
            gender: "F".to_string(),
            english_level: "intermediate".to_string(),
            preferred_days: "Mon".to_string(),
            preferred_time: "PM".to_string(),
            session_length: "60".to_string(),
            ..SubmissionRecord::default()
        }
    }

    #[test]
    fn valid_record_passes() {
        let result = validate(&valid_record());
        assert!(result.is_valid, "{}", result.summary());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn empty_record_reports_every_required_field_in_order() {
        let result = validate(&SubmissionRecord::default());

        let fields: Vec<Field> = result.errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, Field::REQUIRED.to_vec());
        assert!(result.errors.iter().all(|e| e.rule == Rule::Required));
        assert_eq!(result.errors[0].message, "First name is required");
    }

    #[test]
    fn blank_counts_as_missing() {
        let record = SubmissionRecord {
            gender: "   ".to_string(),
            ..valid_record()
        };

        let result = validate(&record);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].field, Field::Gender);
        assert_eq!(result.errors[0].message, "Gender is required");
    }

    #[test]
    fn accumulates_all_format_errors() {
        let record = SubmissionRecord {
            first_name: "R2D2".to_string(),
            last_name: "L".to_string(),
            email: "nope@".to_string(),
            phone: "12345".to_string(),
            grade: "3".to_string(),
            gpa: Some("4.5".to_string()),
            ..valid_record()
        };

        let result = validate(&record);
        let rules: Vec<(Field, Rule)> = result.errors.iter().map(|e| (e.field, e.rule)).collect();
        assert_eq!(
            rules,
            vec![
                (Field::FirstName, Rule::Name),
                (Field::LastName, Rule::Name),
                (Field::Email, Rule::Email),
                (Field::Phone, Rule::Phone),
                (Field::Grade, Rule::Grade),
                (Field::Gpa, Rule::GpaRange),
            ]
        );
    }

    #[test]
    fn names_allow_punctuation_and_spaces() {
        let record = SubmissionRecord {
            first_name: "Mary-Jane".to_string(),
            last_name: "O'Neil Jr.".to_string(),
            ..valid_record()
        };
        assert!(validate(&record).is_valid);
    }

    #[test]
    fn name_longer_than_fifty_is_rejected() {
        let record = SubmissionRecord {
            last_name: "a".repeat(51),
            ..valid_record()
        };
        let result = validate(&record);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "Last name contains invalid characters");
    }

    #[test]
    fn phone_accepts_common_separators() {
        for phone in ["(123) 456-7890", "+1 123 456 7890", "1234567890"] {
            let record = SubmissionRecord {
                phone: phone.to_string(),
                ..valid_record()
            };
            assert!(validate(&record).is_valid, "{phone} should be accepted");
        }
    }

    #[test]
    fn gpa_bounds() {
        for (gpa, ok) in [
            ("0", true),
            ("4.0", true),
            ("3.25", true),
            ("-0.1", false),
            ("4.01", false),
            ("abc", false),
            ("NaN", false),
        ] {
            let record = SubmissionRecord {
                gpa: Some(gpa.to_string()),
                ..valid_record()
            };
            assert_eq!(validate(&record).is_valid, ok, "gpa {gpa}");
        }
    }

    #[test]
    fn empty_gpa_is_treated_as_absent() {
        let record = SubmissionRecord {
            gpa: Some(String::new()),
            ..valid_record()
        };
        assert!(validate(&record).is_valid);
    }

    #[test]
    fn every_grade_from_four_to_twelve_is_valid() {
        for grade in VALID_GRADES {
            let record = SubmissionRecord {
                grade: grade.to_string(),
                ..valid_record()
            };
            assert!(validate(&record).is_valid, "grade {grade}");
        }
    }

    #[test]
    fn validate_does_not_mutate_input() {
        let record = SubmissionRecord {
            email: "  bad  ".to_string(),
            ..valid_record()
        };
        let before = record.clone();

        let _ = validate(&record);
        assert_eq!(record, before);
    }

    #[test]
    fn summary_joins_messages() {
        let record = SubmissionRecord {
            email: "x".to_string(),
            grade: "13".to_string(),
            ..valid_record()
        };
        assert_eq!(
            validate(&record).summary(),
            "Please enter a valid email address, Please select a valid grade level"
        );
    }
}
