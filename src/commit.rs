// Transactional Commit - a validated batch becomes durable as one unit

use crate::domain::{MeterReading, ProcessingResult};
use crate::faults::FaultLogger;
use crate::store::RecordStore;
use anyhow::Context;
use tracing::{info, warn};

pub const COMMIT_FAILED: &str = "Database save failed, please contact support";

/// Write every reading of the batch in a single store transaction.
///
/// Success reports all of them committed. Any failure (constraint violation,
/// lost connection, ...) is logged and reported as one synthetic failure with
/// nothing committed.
pub fn commit_batch(
    store: &dyn RecordStore,
    faults: &dyn FaultLogger,
    readings: &[MeterReading],
) -> ProcessingResult {
    let validated = readings.len();

    match store
        .insert_all(readings)
        .with_context(|| format!("Commit of {} validated readings failed", validated))
    {
        Ok(stored) => {
            info!(committed = stored.len(), "meter reading batch committed");
            ProcessingResult::committed(stored.len())
        }
        Err(e) => {
            warn!(validated, "meter reading batch rolled back");
            faults.log_exception(&e, Some("batch commit"));
            ProcessingResult::commit_failed(validated, COMMIT_FAILED)
        }
    }
}
