// Upload Handling - transport checks and response classes
//
// 200 processed (validation failures included, committed = 0)
// 400 transport rejection or format violation
// 500 unexpected fault

use crate::domain::ProcessingResult;
use crate::pipeline::{IngestError, IngestionPipeline};
use std::io::Cursor;
use tracing::{info, warn};

pub const NO_FILE: &str = "No file uploaded";
pub const NOT_CSV: &str = "Only CSV files are allowed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The file was read and every record looked at
    Processed(ProcessingResult),
    /// Refused before record processing; message is for the client
    Rejected(String),
    /// Something went wrong on our side
    Failed(String),
}

impl UploadOutcome {
    pub fn status_code(&self) -> u16 {
        match self {
            UploadOutcome::Processed(_) => 200,
            UploadOutcome::Rejected(_) => 400,
            UploadOutcome::Failed(_) => 500,
        }
    }
}

/// Run one uploaded file through the pipeline
pub fn handle_upload(
    pipeline: &IngestionPipeline,
    file_name: Option<&str>,
    content: Vec<u8>,
) -> UploadOutcome {
    let file_name = match file_name {
        Some(name) if !content.is_empty() => name,
        _ => return UploadOutcome::Rejected(NO_FILE.to_string()),
    };

    if !file_name.to_ascii_lowercase().ends_with(".csv") {
        return UploadOutcome::Rejected(NOT_CSV.to_string());
    }

    info!(file = file_name, bytes = content.len(), "processing meter reading upload");

    let mut stream = Cursor::new(content);
    match pipeline.process(&mut stream) {
        Ok(result) => UploadOutcome::Processed(result),
        Err(IngestError::InvalidFormat(message)) => UploadOutcome::Rejected(message),
        Err(e) => {
            warn!(file = file_name, error = %e, "upload could not be processed");
            UploadOutcome::Failed(format!("Error processing file: {}", e))
        }
    }
}
