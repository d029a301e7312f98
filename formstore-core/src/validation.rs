//! Field validation.
//!
//! A field is validated in two steps:
//!
//! 1. If the value is empty (`None`, `null`, `""` or `[]`), the domain's
//!    [`Validator::Required`] rules run first, then the entry's own required
//!    flag, which fails with [`REQUIRED_MESSAGE`].
//! 2. Otherwise, if the value is not empty, the domain validators run in
//!    declaration order and the first failure wins.
//!
//! Validation never returns `Err`: the outcome is an optional message,
//! exposed as computed state on form fields.

use std::fmt;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::Value;

use crate::entity::FieldEntry;
use crate::error::{SchemaError, SchemaResult};
use crate::store::EntityField;

/// Message reported for an empty required field.
pub const REQUIRED_MESSAGE: &str = "Field is required";
/// Default message of [`Validator::Regex`].
pub const INVALID_FORMAT_MESSAGE: &str = "Invalid format";
/// Default message of [`Validator::Email`].
pub const INVALID_EMAIL_MESSAGE: &str = "Invalid email address";
/// Default message of [`Validator::Date`].
pub const INVALID_DATE_MESSAGE: &str = "Invalid date";
/// Default message when [`Validator::Number`] gets a non-numeric value.
pub const NOT_A_NUMBER_MESSAGE: &str = "Must be a number";

/// Custom validation function: returns an error message or `None`.
pub type CustomValidator = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// A single validation rule.
#[derive(Clone)]
pub enum Validator {
    /// Fails on empty values.
    Required {
        /// Message override.
        message: Option<String>,
    },
    /// Fails when the textual value does not match.
    Regex {
        /// Compiled pattern.
        regex: Regex,
        /// Message override.
        message: Option<String>,
    },
    /// Fails when the value is not an email address.
    Email {
        /// Message override.
        message: Option<String>,
    },
    /// Fails when the value is not a number within bounds (inclusive).
    Number {
        /// Lower bound.
        min: Option<f64>,
        /// Upper bound.
        max: Option<f64>,
        /// Message override.
        message: Option<String>,
    },
    /// Fails when the text length (in characters) is out of bounds.
    String {
        /// Minimum length.
        min_length: Option<usize>,
        /// Maximum length.
        max_length: Option<usize>,
        /// Message override.
        message: Option<String>,
    },
    /// Fails when the value is not an ISO 8601 date or date-time.
    Date {
        /// Message override.
        message: Option<String>,
    },
    /// Application-defined rule.
    Function(CustomValidator),
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required { .. } => f.write_str("Required"),
            Self::Regex { regex, .. } => write!(f, "Regex({})", regex.as_str()),
            Self::Email { .. } => f.write_str("Email"),
            Self::Number { min, max, .. } => write!(f, "Number({min:?}..={max:?})"),
            Self::String {
                min_length,
                max_length,
                ..
            } => write!(f, "String({min_length:?}..={max_length:?})"),
            Self::Date { .. } => f.write_str("Date"),
            Self::Function(_) => f.write_str("Function"),
        }
    }
}

impl Validator {
    /// Explicit required rule.
    #[must_use]
    pub const fn required() -> Self {
        Self::Required { message: None }
    }

    /// Regex rule.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidRegex`] if the pattern does not compile.
    pub fn regex(pattern: &str) -> SchemaResult<Self> {
        let regex = Regex::new(pattern).map_err(|source| SchemaError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self::Regex {
            regex,
            message: None,
        })
    }

    /// Email rule.
    #[must_use]
    pub const fn email() -> Self {
        Self::Email { message: None }
    }

    /// Numeric range rule.
    #[must_use]
    pub const fn number(min: Option<f64>, max: Option<f64>) -> Self {
        Self::Number {
            min,
            max,
            message: None,
        }
    }

    /// Text length rule.
    #[must_use]
    pub const fn length(min_length: Option<usize>, max_length: Option<usize>) -> Self {
        Self::String {
            min_length,
            max_length,
            message: None,
        }
    }

    /// Date rule.
    #[must_use]
    pub const fn date() -> Self {
        Self::Date { message: None }
    }

    /// Custom rule.
    #[must_use]
    pub fn custom(f: impl Fn(&Value) -> Option<String> + Send + Sync + 'static) -> Self {
        Self::Function(Arc::new(f))
    }

    /// Replace the failure message. No effect on [`Validator::Function`].
    #[must_use]
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::Required { message }
            | Self::Regex { message, .. }
            | Self::Email { message }
            | Self::Number { message, .. }
            | Self::String { message, .. }
            | Self::Date { message } => *message = Some(text.into()),
            Self::Function(_) => {}
        }
        self
    }

    /// Apply the rule, returning the failure message.
    #[must_use]
    pub fn validate(&self, value: &Value) -> Option<String> {
        match self {
            Self::Required { message } => {
                is_empty(Some(value)).then(|| message_or(message, REQUIRED_MESSAGE))
            }
            Self::Regex { regex, message } => {
                (!regex.is_match(&as_text(value))).then(|| message_or(message, INVALID_FORMAT_MESSAGE))
            }
            Self::Email { message } => {
                (!is_email(&as_text(value))).then(|| message_or(message, INVALID_EMAIL_MESSAGE))
            }
            Self::Number { min, max, message } => check_number(value, *min, *max, message.as_deref()),
            Self::String {
                min_length,
                max_length,
                message,
            } => check_length(value, *min_length, *max_length, message.as_deref()),
            Self::Date { message } => {
                (!is_date(&as_text(value))).then(|| message_or(message, INVALID_DATE_MESSAGE))
            }
            Self::Function(f) => f(value),
        }
    }
}

fn message_or(message: &Option<String>, default: &str) -> String {
    message.clone().unwrap_or_else(|| default.to_string())
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn check_number(value: &Value, min: Option<f64>, max: Option<f64>, message: Option<&str>) -> Option<String> {
    let Some(n) = as_number(value) else {
        return Some(message.unwrap_or(NOT_A_NUMBER_MESSAGE).to_string());
    };
    if let Some(min) = min.filter(|min| n < *min) {
        return Some(message.map_or_else(|| format!("Must be at least {min}"), str::to_string));
    }
    if let Some(max) = max.filter(|max| n > *max) {
        return Some(message.map_or_else(|| format!("Must be at most {max}"), str::to_string));
    }
    None
}

fn check_length(
    value: &Value,
    min_length: Option<usize>,
    max_length: Option<usize>,
    message: Option<&str>,
) -> Option<String> {
    let len = as_text(value).chars().count();
    if let Some(min) = min_length.filter(|min| len < *min) {
        return Some(message.map_or_else(|| format!("Must be at least {min} characters"), str::to_string));
    }
    if let Some(max) = max_length.filter(|max| len > *max) {
        return Some(message.map_or_else(|| format!("Must be at most {max} characters"), str::to_string));
    }
    None
}

static EMAIL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$").ok());

fn is_email(text: &str) -> bool {
    EMAIL.as_ref().is_some_and(|re| re.is_match(text))
}

fn is_date(text: &str) -> bool {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(text).is_ok()
}

/// Whether a value counts as empty for the required check.
#[must_use]
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Validate a value against a field entry.
///
/// Empty values only meet the required checks: domain `Required` rules
/// first, then the entry flag. Other validators only see non-empty values.
#[must_use]
pub fn validate_value(entry: &FieldEntry, value: Option<&Value>) -> Option<String> {
    let validators = entry.domain().validators();
    let Some(value) = value.filter(|value| !is_empty(Some(*value))) else {
        return validators
            .iter()
            .find_map(|validator| match validator {
                Validator::Required { message } => Some(message_or(message, REQUIRED_MESSAGE)),
                _ => None,
            })
            .or_else(|| entry.is_required().then(|| REQUIRED_MESSAGE.to_string()));
    };
    validators.iter().find_map(|validator| validator.validate(value))
}

/// Validate the current value of a field.
///
/// The read is tracked, so calling this inside a computed value makes it
/// depend on the field value.
#[must_use]
pub fn validate_field(field: &EntityField) -> Option<String> {
    let entry = field.field();
    field.with_value(|value| validate_value(&entry, value))
}
