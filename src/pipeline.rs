// Ingestion Pipeline - CSV upload to all-or-nothing batch commit
//
//   Reading -> Validating -> AllValid  -> Committing -> Done
//                         -> HasErrors -> Rejected   -> Done
//
// Records are handled strictly in file order, one at a time, so error lists
// and counts are reproducible. A bad record never stops the batch; any error
// at all stops the commit.

use crate::cache::AccountCache;
use crate::commit::commit_batch;
use crate::csv_format::{validate_format, RowSchema, INVALID_FORMAT};
use crate::domain::{AccountId, MeterReading, ProcessingResult};
use crate::faults::FaultLogger;
use crate::store::RecordStore;
use crate::validation::{
    validate_account_exists, validate_date_time, validate_meter_read_value, ValidationResult,
};
use anyhow::anyhow;
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Seek};
use std::sync::Arc;
use tracing::{debug, info, info_span};

/// Shown for a record that failed for reasons other than its content
pub const RECORD_FAULT: &str = "Error processing record, please contact support";

// ============================================================================
// FATAL ERRORS
// ============================================================================

/// Failures that stop an upload before any record is processed
#[derive(Debug)]
pub enum IngestError {
    /// Header or row shape is wrong
    InvalidFormat(String),
    /// The upload stream itself could not be read
    Unreadable(csv::Error),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::InvalidFormat(message) => write!(f, "{}", message),
            IngestError::Unreadable(e) => write!(f, "Upload could not be read: {}", e),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::InvalidFormat(_) => None,
            IngestError::Unreadable(e) => Some(e),
        }
    }
}

// ============================================================================
// PER-RECORD OUTCOME
// ============================================================================

#[derive(Debug)]
enum RecordOutcome {
    /// All fields valid and not yet in the store
    Valid(MeterReading),
    /// Content problem the uploader can fix; message is shown as-is
    Invalid(String),
    /// Anything else; logged, shown as `RECORD_FAULT`
    Fault(anyhow::Error),
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct IngestionPipeline {
    store: Arc<dyn RecordStore>,
    cache: Arc<AccountCache>,
    faults: Arc<dyn FaultLogger>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<AccountCache>,
        faults: Arc<dyn FaultLogger>,
    ) -> Self {
        IngestionPipeline { store, cache, faults }
    }

    pub fn cache(&self) -> &AccountCache {
        &self.cache
    }

    /// Validate and (if everything passes) commit one uploaded CSV.
    ///
    /// Content problems come back inside `ProcessingResult` with
    /// `committed == 0`. Only an unusable upload returns `Err`.
    pub fn process<R: Read + Seek>(&self, stream: &mut R) -> Result<ProcessingResult, IngestError> {
        if let ValidationResult::Failure(message) = validate_format(stream) {
            return Err(IngestError::InvalidFormat(message));
        }

        // One snapshot for the whole batch, whatever refreshes happen meanwhile
        let known = self.cache.snapshot();

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(&mut *stream);

        let headers = reader.headers().map_err(IngestError::Unreadable)?.clone();
        let schema = RowSchema::from_headers(&headers)
            .ok_or_else(|| IngestError::InvalidFormat(INVALID_FORMAT.to_string()))?;

        let mut validated = Vec::new();
        let mut errors = Vec::new();

        for result in reader.records() {
            let (line, outcome) = match result {
                Ok(record) => (
                    record.position().map(|p| p.line()).unwrap_or_default(),
                    self.check_record(&schema, &record, &known),
                ),
                Err(e) => (
                    e.position().map(|p| p.line()).unwrap_or_default(),
                    RecordOutcome::Fault(anyhow::Error::new(e).context("Malformed CSV record")),
                ),
            };

            match outcome {
                RecordOutcome::Valid(reading) => validated.push(reading),
                RecordOutcome::Invalid(message) => {
                    debug!(line, %message, "record rejected");
                    errors.push(message);
                }
                RecordOutcome::Fault(e) => {
                    self.faults.log_exception(&e, Some(&format!("line {}", line)));
                    errors.push(RECORD_FAULT.to_string());
                }
            }
        }

        if !errors.is_empty() {
            info!(
                validated = validated.len(),
                failed = errors.len(),
                "upload rejected, nothing committed"
            );
            return Ok(ProcessingResult::rejected(validated.len(), errors));
        }

        let _span = info_span!("commit", readings = validated.len()).entered();
        Ok(commit_batch(self.store.as_ref(), self.faults.as_ref(), &validated))
    }

    /// Account, then timestamp, then value; the first failure wins.
    /// Fully valid records are then checked against committed readings.
    fn check_record(
        &self,
        schema: &RowSchema,
        record: &StringRecord,
        known: &HashSet<AccountId>,
    ) -> RecordOutcome {
        let raw = match schema.decode(record) {
            Ok(raw) => raw,
            Err(reason) => return RecordOutcome::Fault(anyhow!(reason)),
        };

        let account_id = match validate_account_exists(raw.account_id, known) {
            ValidationResult::Success(id) => id,
            ValidationResult::Failure(message) => return RecordOutcome::Invalid(message),
        };

        let reading_time = match validate_date_time(raw.reading_time) {
            ValidationResult::Success(time) => time,
            ValidationResult::Failure(message) => {
                return RecordOutcome::Invalid(format!("Account {}: {}", raw.account_id, message))
            }
        };

        let value = match validate_meter_read_value(raw.read_value) {
            ValidationResult::Success(value) => value,
            ValidationResult::Failure(message) => {
                return RecordOutcome::Invalid(format!("Account {}: {}", raw.account_id, message))
            }
        };

        // Only committed readings are checked; see DESIGN.md on in-batch duplicates
        match self.store.reading_exists(account_id, reading_time) {
            Ok(true) => RecordOutcome::Invalid(format!(
                "Duplicate reading for account {} at {}",
                raw.account_id, raw.reading_time
            )),
            Ok(false) => RecordOutcome::Valid(MeterReading::pending(account_id, reading_time, value)),
            Err(e) => RecordOutcome::Fault(e.context(format!(
                "Duplicate check failed for account {}",
                account_id
            ))),
        }
    }
}
