// Meter Reading Ingestion - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod domain;
pub mod validation;
pub mod csv_format;
pub mod store;
pub mod faults;
pub mod cache;
pub mod commit;
pub mod pipeline;
pub mod seed;
pub mod upload;
pub mod config;
pub mod service;

// Re-export commonly used types
pub use domain::{
    Account, AccountId, MeterReadValue, MeterReading, MeterReadingId, Person, ProcessingResult,
    MAX_NAME_LENGTH,
};
pub use validation::{
    validate_account_exists, validate_date_time, validate_meter_read_value, validate_person_name,
    ValidationResult,
};
pub use csv_format::{validate_format, RawReading, RowSchema, EXPECTED_HEADERS, INVALID_FORMAT};
pub use store::{setup_database, RecordStore, SqliteStore};
pub use faults::{FaultLogger, TracingFaultLogger};
pub use cache::{AccountCache, AccountSnapshot};
pub use commit::{commit_batch, COMMIT_FAILED};
pub use pipeline::{IngestError, IngestionPipeline, RECORD_FAULT};
pub use seed::{read_accounts, seed_accounts_from_csv};
pub use upload::{handle_upload, UploadOutcome};
pub use service::IngestService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
