//! Submission validation.
//!
//! Raw form input is cleaned and checked before it may enter the
//! persistence pipeline. Field errors are reported all at once and are
//! never retried.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use vigil_core::{RecordFields, ValidationError};

/// Longest accepted biography, in characters.
pub const MAX_BIOGRAPHY_CHARS: usize = 5000;

/// Longest accepted value for every other field, in characters.
pub const MAX_FIELD_CHARS: usize = 200;

/// Form input exactly as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSubmission {
    pub full_name: Option<String>,
    pub birth_date: Option<String>,
    pub martyrdom_date: Option<String>,
    pub birth_place: Option<String>,
    pub martyrdom_place: Option<String>,
    pub biography: Option<String>,
    pub submitter_name: Option<String>,
    pub submitter_contact: Option<String>,
}

/// Turns raw input into clean record fields.
pub trait Validator: Send + Sync {
    fn validate(&self, raw: &RawSubmission) -> Result<RecordFields, Vec<ValidationError>>;
}

/// Default validator: trims every field, requires a name and a martyrdom
/// date, checks date formats and bounds field lengths.
#[derive(Debug, Clone)]
pub struct RequiredFieldsValidator {
    pub max_biography_chars: usize,
    pub max_field_chars: usize,
}

impl Default for RequiredFieldsValidator {
    fn default() -> Self {
        Self {
            max_biography_chars: MAX_BIOGRAPHY_CHARS,
            max_field_chars: MAX_FIELD_CHARS,
        }
    }
}

impl RequiredFieldsValidator {
    fn clean(
        &self,
        field: &str,
        value: &Option<String>,
        max: usize,
        errors: &mut Vec<ValidationError>,
    ) -> Option<String> {
        let trimmed = value.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
        if trimmed.chars().count() > max {
            errors.push(ValidationError::TooLong {
                field: field.to_string(),
                max,
            });
        }
        Some(trimmed.to_string())
    }

    fn date(
        &self,
        field: &str,
        value: &Option<String>,
        errors: &mut Vec<ValidationError>,
    ) -> (Option<String>, Option<NaiveDate>) {
        let Some(cleaned) = self.clean(field, value, self.max_field_chars, errors) else {
            return (None, None);
        };
        match NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d") {
            Ok(date) => (Some(cleaned), Some(date)),
            Err(_) => {
                errors.push(ValidationError::InvalidValue {
                    field: field.to_string(),
                    reason: "expected YYYY-MM-DD".to_string(),
                });
                (Some(cleaned), None)
            }
        }
    }
}

impl Validator for RequiredFieldsValidator {
    fn validate(&self, raw: &RawSubmission) -> Result<RecordFields, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let max = self.max_field_chars;

        let full_name = self.clean("fullName", &raw.full_name, max, &mut errors);
        if full_name.is_none() {
            errors.push(ValidationError::RequiredFieldMissing {
                field: "fullName".to_string(),
            });
        }

        let (birth_date, born) = self.date("birthDate", &raw.birth_date, &mut errors);
        let (martyrdom_date, died) = self.date("martyrdomDate", &raw.martyrdom_date, &mut errors);
        if martyrdom_date.is_none() {
            errors.push(ValidationError::RequiredFieldMissing {
                field: "martyrdomDate".to_string(),
            });
        }
        if let (Some(born), Some(died)) = (born, died) {
            if born > died {
                errors.push(ValidationError::InvalidValue {
                    field: "birthDate".to_string(),
                    reason: "must not be after martyrdomDate".to_string(),
                });
            }
        }

        let fields = RecordFields {
            full_name: full_name.unwrap_or_default(),
            birth_date,
            martyrdom_date,
            birth_place: self.clean("birthPlace", &raw.birth_place, max, &mut errors),
            martyrdom_place: self.clean("martyrdomPlace", &raw.martyrdom_place, max, &mut errors),
            biography: self.clean(
                "biography",
                &raw.biography,
                self.max_biography_chars,
                &mut errors,
            ),
            submitter_name: self.clean("submitterName", &raw.submitter_name, max, &mut errors),
            submitter_contact: self.clean(
                "submitterContact",
                &raw.submitter_contact,
                max,
                &mut errors,
            ),
        };

        if errors.is_empty() {
            Ok(fields)
        } else {
            Err(errors)
        }
    }
}
