// Domain Model - accounts, meter readings and upload results
// Value types are small Copy newtypes so ids and values can't be mixed up

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a first or last name (matches the accounts table CHECK)
pub const MAX_NAME_LENGTH: usize = 100;

/// Lowest accepted meter read value
pub const MIN_READ_VALUE: i32 = 0;

/// Highest accepted meter read value
pub const MAX_READ_VALUE: i32 = 99_999;

// ============================================================================
// IDENTIFIERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i32);

impl AccountId {
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned reading id. `MeterReadingId::UNSET` until the batch commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MeterReadingId(pub i64);

impl MeterReadingId {
    pub const UNSET: MeterReadingId = MeterReadingId(0);

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

// ============================================================================
// VALUES
// ============================================================================

/// A meter read value. Only built through `validation::validate_meter_read_value`,
/// a range-checked deserialize, or read back from the store, so it always lies
/// in [0, 99999].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32")]
pub struct MeterReadValue(i32);

impl MeterReadValue {
    pub(crate) fn new_unchecked(value: i32) -> Self {
        MeterReadValue(value)
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl TryFrom<i32> for MeterReadValue {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if (MIN_READ_VALUE..=MAX_READ_VALUE).contains(&value) {
            Ok(MeterReadValue(value))
        } else {
            Err(format!(
                "Meter read value must be between {} and {}. Got: {}",
                MIN_READ_VALUE, MAX_READ_VALUE, value
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
}

// ============================================================================
// ENTITIES
// ============================================================================

/// Account holder. Created by seeding, read-only to ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub person: Person,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    pub id: MeterReadingId,
    pub account_id: AccountId,
    pub reading_time: DateTime<Utc>,
    pub value: MeterReadValue,
}

impl MeterReading {
    /// A validated reading that has not been persisted yet
    pub fn pending(account_id: AccountId, reading_time: DateTime<Utc>, value: MeterReadValue) -> Self {
        MeterReading {
            id: MeterReadingId::UNSET,
            account_id,
            reading_time,
            value,
        }
    }

    pub fn with_id(mut self, id: MeterReadingId) -> Self {
        self.id = id;
        self
    }
}

// ============================================================================
// PROCESSING RESULT
// ============================================================================

/// Outcome of one upload. Serialized as the upload response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub validated: usize,
    pub failed: usize,
    pub committed: usize,
    pub errors: Vec<String>,
}

impl ProcessingResult {
    /// Every record validated and the batch is durable
    pub fn committed(validated: usize) -> Self {
        ProcessingResult {
            validated,
            failed: 0,
            committed: validated,
            errors: Vec::new(),
        }
    }

    /// At least one record failed; nothing was written
    pub fn rejected(validated: usize, errors: Vec<String>) -> Self {
        ProcessingResult {
            validated,
            failed: errors.len(),
            committed: 0,
            errors,
        }
    }

    /// Validation passed but the commit transaction did not
    pub fn commit_failed(validated: usize, message: &str) -> Self {
        ProcessingResult {
            validated,
            failed: 1,
            committed: 0,
            errors: vec![message.to_string()],
        }
    }

    pub fn is_committed(&self) -> bool {
        self.failed == 0 && self.committed == self.validated
    }
}
