//! Submission record schema and reservation identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of a normalized reservation identifier.
pub const RESERVATION_ID_MAX_LEN: usize = 20;

/// One reservation form submission.
///
/// The ten scheduling and contact fields are mandatory; `gpa`,
/// `learning_goals` and `referral` are optional. Keys serialize in camelCase,
/// which is what the backend expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub grade: String,
    pub gender: String,
    pub english_level: String,
    pub preferred_days: String,
    pub preferred_time: String,
    pub session_length: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_goals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral: Option<String>,
}

/// Fields of a [`SubmissionRecord`] in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    FirstName,
    LastName,
    Email,
    Phone,
    Grade,
    Gender,
    EnglishLevel,
    PreferredDays,
    PreferredTime,
    SessionLength,
    Gpa,
    LearningGoals,
    Referral,
}

impl Field {
    /// Mandatory fields, in the order their errors are reported.
    pub const REQUIRED: [Field; 10] = [
        Field::FirstName,
        Field::LastName,
        Field::Email,
        Field::Phone,
        Field::Grade,
        Field::Gender,
        Field::EnglishLevel,
        Field::PreferredDays,
        Field::PreferredTime,
        Field::SessionLength,
    ];

    /// Every field, in declaration order.
    pub const ALL: [Field; 13] = [
        Field::FirstName,
        Field::LastName,
        Field::Email,
        Field::Phone,
        Field::Grade,
        Field::Gender,
        Field::EnglishLevel,
        Field::PreferredDays,
        Field::PreferredTime,
        Field::SessionLength,
        Field::Gpa,
        Field::LearningGoals,
        Field::Referral,
    ];

    /// Wire name of the field.
    pub fn key(self) -> &'static str {
        match self {
            Field::FirstName => "firstName",
            Field::LastName => "lastName",
            Field::Email => "email",
            Field::Phone => "phone",
            Field::Grade => "grade",
            Field::Gender => "gender",
            Field::EnglishLevel => "englishLevel",
            Field::PreferredDays => "preferredDays",
            Field::PreferredTime => "preferredTime",
            Field::SessionLength => "sessionLength",
            Field::Gpa => "gpa",
            Field::LearningGoals => "learningGoals",
            Field::Referral => "referral",
        }
    }

    /// Human-readable label used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Field::FirstName => "First name",
            Field::LastName => "Last name",
            Field::Email => "Email address",
            Field::Phone => "Phone number",
            Field::Grade => "Grade level",
            Field::Gender => "Gender",
            Field::EnglishLevel => "English proficiency",
            Field::PreferredDays => "Preferred days",
            Field::PreferredTime => "Preferred time",
            Field::SessionLength => "Session length",
            Field::Gpa => "GPA",
            Field::LearningGoals => "Learning goals",
            Field::Referral => "Referral",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl SubmissionRecord {
    /// Returns the raw value of a field, `None` for an absent optional field.
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::FirstName => Some(&self.first_name),
            Field::LastName => Some(&self.last_name),
            Field::Email => Some(&self.email),
            Field::Phone => Some(&self.phone),
            Field::Grade => Some(&self.grade),
            Field::Gender => Some(&self.gender),
            Field::EnglishLevel => Some(&self.english_level),
            Field::PreferredDays => Some(&self.preferred_days),
            Field::PreferredTime => Some(&self.preferred_time),
            Field::SessionLength => Some(&self.session_length),
            Field::Gpa => self.gpa.as_deref(),
            Field::LearningGoals => self.learning_goals.as_deref(),
            Field::Referral => self.referral.as_deref(),
        }
    }

    /// Applies `f` to every text-bearing attribute, present optionals included.
    pub(crate) fn map_text(self, mut f: impl FnMut(&str) -> String) -> Self {
        let mut opt = |v: Option<String>| v.map(|s| f(&s));
        let gpa = opt(self.gpa);
        let learning_goals = opt(self.learning_goals);
        let referral = opt(self.referral);
        Self {
            first_name: f(&self.first_name),
            last_name: f(&self.last_name),
            email: f(&self.email),
            phone: f(&self.phone),
            grade: f(&self.grade),
            gender: f(&self.gender),
            english_level: f(&self.english_level),
            preferred_days: f(&self.preferred_days),
            preferred_time: f(&self.preferred_time),
            session_length: f(&self.session_length),
            gpa,
            learning_goals,
            referral,
        }
    }
}

/// A reservation identifier normalized to `[A-Z0-9]{0,20}`.
///
/// # Examples
///
/// ```
/// use reservation_relay::ReservationId;
///
/// let id = ReservationId::normalize(" res-abc_123 ");
/// assert_eq!(id.as_str(), "RESABC123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    /// Drops every non-alphanumeric character, uppercases, and truncates.
    pub fn normalize(raw: &str) -> Self {
        Self(
            raw.chars()
                .filter(char::is_ascii_alphanumeric)
                .map(|c| c.to_ascii_uppercase())
                .take(RESERVATION_ID_MAX_LEN)
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn record_serializes_camel_case_and_skips_absent_optionals() {
        let record = SubmissionRecord {
            first_name: "Ann".to_string(),
            english_level: "intermediate".to_string(),
            ..SubmissionRecord::default()
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["firstName"], "Ann");
        assert_eq!(json["englishLevel"], "intermediate");
        assert!(json.get("gpa").is_none());
    }

    #[test]
    fn get_follows_field_keys() {
        let record = SubmissionRecord {
            phone: "123-456-7890".to_string(),
            gpa: Some("3.5".to_string()),
            ..SubmissionRecord::default()
        };

        assert_eq!(record.get(Field::Phone), Some("123-456-7890"));
        assert_eq!(record.get(Field::Gpa), Some("3.5"));
        assert_eq!(record.get(Field::Referral), None);
    }

    #[test]
    fn map_text_touches_present_optionals_only() {
        let record = SubmissionRecord {
            referral: Some("friend".to_string()),
            ..SubmissionRecord::default()
        };

        let mapped = record.map_text(|s| format!("[{s}]"));
        assert_eq!(mapped.first_name, "[]");
        assert_eq!(mapped.referral.as_deref(), Some("[friend]"));
        assert_eq!(mapped.gpa, None);
    }

    #[test]
    fn reservation_id_normalizes() {
        assert_eq!(ReservationId::normalize("abc-123").as_str(), "ABC123");
        assert_eq!(ReservationId::normalize("<script>").as_str(), "SCRIPT");
        assert!(ReservationId::normalize("--- ").is_empty());
    }

    #[test]
    fn reservation_id_truncates_to_twenty() {
        let id = ReservationId::normalize("a1b2c3d4e5f6g7h8i9j0k1l2");
        assert_eq!(id.as_str().len(), RESERVATION_ID_MAX_LEN);
        assert_eq!(id.as_str(), "A1B2C3D4E5F6G7H8I9J0");
    }

    proptest! {
        /// Property: normalized identifiers only ever contain [A-Z0-9]
        #[test]
        fn proptest_reservation_id_charset(raw in any::<String>()) {
            let id = ReservationId::normalize(&raw);
            prop_assert!(id.as_str().len() <= RESERVATION_ID_MAX_LEN);
            prop_assert!(id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }
}
