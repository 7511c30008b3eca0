// Record Validation - one field at a time
// Pure functions: raw CSV text in, typed value or display-ready message out

use crate::domain::{
    AccountId, MeterReadValue, Person, MAX_NAME_LENGTH, MAX_READ_VALUE, MIN_READ_VALUE,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::collections::HashSet;

/// Wire format of `MeterReadingDateTime`, as shown to users
pub const DATE_TIME_FORMAT_DISPLAY: &str = "dd/MM/yyyy HH:mm";

const DATE_TIME_FORMAT: &str = "%d/%m/%Y %H:%M";

// ============================================================================
// VALIDATION RESULT
// ============================================================================

/// Either a validated value or a human-readable reason it was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult<T> {
    Success(T),
    Failure(String),
}

impl<T> ValidationResult<T> {
    pub fn success(value: T) -> Self {
        ValidationResult::Success(value)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ValidationResult::Failure(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ValidationResult::Success(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ValidationResult::Success(value) => Some(value),
            ValidationResult::Failure(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ValidationResult::Success(_) => None,
            ValidationResult::Failure(message) => Some(message),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            ValidationResult::Success(value) => Ok(value),
            ValidationResult::Failure(message) => Err(message),
        }
    }
}

// ============================================================================
// FIELD VALIDATORS
// ============================================================================

/// Parse an account reference and check it against the known account ids
pub fn validate_account_exists(raw: &str, known: &HashSet<AccountId>) -> ValidationResult<AccountId> {
    if raw.trim().is_empty() {
        return ValidationResult::failure("Account ID is empty");
    }

    match raw.trim().parse::<i32>() {
        Ok(id) if known.contains(&AccountId(id)) => ValidationResult::success(AccountId(id)),
        Ok(_) => ValidationResult::failure(format!("Account {} does not exist", raw)),
        Err(_) => ValidationResult::failure(format!("Account {} is not a valid number", raw)),
    }
}

/// Parse `dd/MM/yyyy HH:mm`. The wall-clock digits are taken as UTC.
pub fn validate_date_time(raw: &str) -> ValidationResult<DateTime<Utc>> {
    if raw.trim().is_empty() {
        return ValidationResult::failure("DateTime is empty");
    }

    match parse_date_time(raw) {
        Some(parsed) => ValidationResult::success(parsed),
        None => ValidationResult::failure(format!(
            "Invalid datetime format: {}. Expected format: {}",
            raw, DATE_TIME_FORMAT_DISPLAY
        )),
    }
}

pub fn validate_meter_read_value(raw: &str) -> ValidationResult<MeterReadValue> {
    if raw.trim().is_empty() {
        return ValidationResult::failure("Meter read value is empty");
    }

    match raw.trim().parse::<i32>() {
        Ok(value) if (MIN_READ_VALUE..=MAX_READ_VALUE).contains(&value) => {
            ValidationResult::success(MeterReadValue::new_unchecked(value))
        }
        Ok(value) => ValidationResult::failure(format!(
            "Meter read value must be between {} and {}. Got: {}",
            MIN_READ_VALUE, MAX_READ_VALUE, value
        )),
        Err(_) => ValidationResult::failure(format!("Meter read value {} is not a valid number", raw)),
    }
}

/// Both names required, trimmed, and within the column length limit
pub fn validate_person_name(first_name: &str, last_name: &str) -> ValidationResult<Person> {
    let first = first_name.trim();
    let last = last_name.trim();

    if first.is_empty() {
        return ValidationResult::failure("First name cannot be empty");
    }
    if last.is_empty() {
        return ValidationResult::failure("Last name cannot be empty");
    }

    let first_len = first.chars().count();
    if first_len > MAX_NAME_LENGTH {
        return ValidationResult::failure(format!(
            "First name cannot exceed {} characters. Current length: {}",
            MAX_NAME_LENGTH, first_len
        ));
    }

    let last_len = last.chars().count();
    if last_len > MAX_NAME_LENGTH {
        return ValidationResult::failure(format!(
            "Last name cannot exceed {} characters. Current length: {}",
            MAX_NAME_LENGTH, last_len
        ));
    }

    ValidationResult::success(Person {
        first_name: first.to_string(),
        last_name: last.to_string(),
    })
}

// ============================================================================
// HELPERS
// ============================================================================

/// chrono accepts single-digit fields and signed years, so the exact
/// `DD/MM/YYYY HH:MM` shape is checked before handing off to it.
fn parse_date_time(raw: &str) -> Option<DateTime<Utc>> {
    let bytes = raw.as_bytes();
    if bytes.len() != 16 {
        return None;
    }

    let shape_ok = bytes.iter().enumerate().all(|(i, b)| match i {
        2 | 5 => *b == b'/',
        10 => *b == b' ',
        13 => *b == b':',
        _ => b.is_ascii_digit(),
    });
    if !shape_ok {
        return None;
    }

    NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
