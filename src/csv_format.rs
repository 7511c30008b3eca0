// CSV Format Layer - header/shape checks and the explicit row schema
//
// Format validation runs before any record is looked at. It only ever answers
// "Invalid CSV format"; the specific reason goes to the debug log.

use crate::validation::ValidationResult;
use csv::{ReaderBuilder, StringRecord};
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, warn};

/// Column names of a meter reading upload, in documented order
pub const EXPECTED_HEADERS: [&str; 3] = ["AccountId", "MeterReadingDateTime", "MeterReadValue"];

pub const INVALID_FORMAT: &str = "Invalid CSV format";

// ============================================================================
// FORMAT VALIDATOR
// ============================================================================

/// Check that `stream` holds exactly the three expected columns (any order,
/// any case) and that no data row carries extra non-empty values.
///
/// Returns the trimmed header names as found in the file. The stream is
/// rewound to position zero on every exit path so the next stage can re-read it.
pub fn validate_format<R: Read + Seek>(stream: &mut R) -> ValidationResult<Vec<String>> {
    let outcome = match stream.seek(SeekFrom::Start(0)) {
        Ok(_) => check_shape(&mut *stream),
        Err(e) => Err(format!("stream not seekable: {}", e)),
    };

    let rewound = stream.seek(SeekFrom::Start(0));

    match (outcome, rewound) {
        (Ok(headers), Ok(_)) => ValidationResult::success(headers),
        (Ok(_), Err(e)) => {
            warn!(error = %e, "could not rewind upload after format check");
            ValidationResult::failure(INVALID_FORMAT)
        }
        (Err(reason), _) => {
            debug!(%reason, "upload rejected by format check");
            ValidationResult::failure(INVALID_FORMAT)
        }
    }
}

fn check_shape<R: Read>(stream: R) -> Result<Vec<String>, String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(stream);

    let raw_headers = reader
        .headers()
        .map_err(|e| format!("unreadable header row: {}", e))?
        .clone();

    if raw_headers.is_empty() {
        return Err("empty file".to_string());
    }
    if raw_headers.len() > EXPECTED_HEADERS.len() {
        return Err(format!("{} header columns", raw_headers.len()));
    }

    let headers: Vec<String> = raw_headers
        .iter()
        .map(clean_header)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();

    let missing: Vec<&str> = EXPECTED_HEADERS
        .iter()
        .copied()
        .filter(|expected| !headers.iter().any(|h| h.eq_ignore_ascii_case(expected)))
        .collect();
    let unexpected: Vec<&String> = headers
        .iter()
        .filter(|h| !EXPECTED_HEADERS.iter().any(|expected| h.eq_ignore_ascii_case(expected)))
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(format!("missing headers {:?}, unexpected headers {:?}", missing, unexpected));
    }

    for result in reader.records() {
        let record = result.map_err(|e| format!("unreadable row: {}", e))?;

        let has_extra = record
            .iter()
            .skip(EXPECTED_HEADERS.len())
            .any(|value| !value.trim().is_empty());

        if has_extra {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            return Err(format!("line {}: more values than headers", line));
        }
    }

    Ok(headers)
}

fn clean_header(raw: &str) -> &str {
    raw.trim().trim_start_matches('\u{feff}').trim()
}

// ============================================================================
// ROW SCHEMA
// ============================================================================

/// Column positions of the three reading fields, resolved once per upload
/// from the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSchema {
    account_id: usize,
    reading_time: usize,
    read_value: usize,
}

/// One data row as raw text, before any field validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawReading<'r> {
    pub account_id: &'r str,
    pub reading_time: &'r str,
    pub read_value: &'r str,
}

impl RowSchema {
    pub fn from_headers(headers: &StringRecord) -> Option<Self> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| clean_header(h).eq_ignore_ascii_case(name))
        };

        Some(RowSchema {
            account_id: position(EXPECTED_HEADERS[0])?,
            reading_time: position(EXPECTED_HEADERS[1])?,
            read_value: position(EXPECTED_HEADERS[2])?,
        })
    }

    /// Pull the three fields out of a record. Fails on short rows.
    pub fn decode<'r>(&self, record: &'r StringRecord) -> Result<RawReading<'r>, String> {
        let field = |index: usize, name: &str| {
            record
                .get(index)
                .ok_or_else(|| format!("row has no {} value", name))
        };

        Ok(RawReading {
            account_id: field(self.account_id, EXPECTED_HEADERS[0])?,
            reading_time: field(self.reading_time, EXPECTED_HEADERS[1])?,
            read_value: field(self.read_value, EXPECTED_HEADERS[2])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn validate(content: &str) -> ValidationResult<Vec<String>> {
        let mut stream = Cursor::new(content.as_bytes().to_vec());
        validate_format(&mut stream)
    }

    fn assert_invalid(content: &str) {
        assert_eq!(
            validate(content).error_message(),
            Some(INVALID_FORMAT),
            "expected rejection for {:?}",
            content
        );
    }

    #[test]
    fn test_valid_csv() {
        let result = validate("AccountId,MeterReadingDateTime,MeterReadValue\n2344,22/04/2019 09:24,1002");
        assert_eq!(
            result.value().cloned(),
            Some(vec![
                "AccountId".to_string(),
                "MeterReadingDateTime".to_string(),
                "MeterReadValue".to_string()
            ])
        );
    }

    #[test]
    fn test_empty_file() {
        assert_invalid("");
    }

    #[test]
    fn test_extra_header_column() {
        assert_invalid("AccountId,MeterReadingDateTime,MeterReadValue,ExtraColumn\n2344,22/04/2019 09:24,1002,extra");
    }

    #[test]
    fn test_missing_header() {
        assert_invalid("AccountId,MeterReadingDateTime\n2344,22/04/2019 09:24");
    }

    #[test]
    fn test_wrong_header_names() {
        assert_invalid("AccountNum,ReadingDate,Value\n2344,22/04/2019 09:24,1002");
    }

    #[test]
    fn test_blank_header_cell() {
        assert_invalid("AccountId,MeterReadingDateTime,\n2344,22/04/2019 09:24,1002");
    }

    #[test]
    fn test_extra_data_in_row() {
        assert_invalid("AccountId,MeterReadingDateTime,MeterReadValue\n2344,22/04/2019 09:24,1002,extradata");
    }

    #[test]
    fn test_extra_data_in_later_row() {
        assert_invalid(
            "AccountId,MeterReadingDateTime,MeterReadValue\n\
             2344,22/04/2019 09:24,1002\n\
             2233,22/04/2019 12:25,323,,X",
        );
    }

    #[test]
    fn test_trailing_empty_cells_allowed() {
        let result = validate("AccountId,MeterReadingDateTime,MeterReadValue\n2344,22/04/2019 09:24,1002,, ");
        assert!(result.is_success());
    }

    #[test]
    fn test_header_case_insensitive() {
        let result = validate("accountid,meterreadingdatetime,meterreadvalue\n2344,22/04/2019 09:24,1002");
        assert_eq!(
            result.value().cloned(),
            Some(vec![
                "accountid".to_string(),
                "meterreadingdatetime".to_string(),
                "meterreadvalue".to_string()
            ])
        );
    }

    #[test]
    fn test_header_order_insensitive() {
        let result = validate("MeterReadValue,AccountId,MeterReadingDateTime\n1002,2344,22/04/2019 09:24");
        assert!(result.is_success());
    }

    #[test]
    fn test_header_whitespace_trimmed() {
        let result = validate(" AccountId , MeterReadingDateTime , MeterReadValue \n2344,22/04/2019 09:24,1002");
        assert_eq!(
            result.value().cloned(),
            Some(vec![
                "AccountId".to_string(),
                "MeterReadingDateTime".to_string(),
                "MeterReadValue".to_string()
            ])
        );
    }

    #[test]
    fn test_stream_rewound_after_success_and_failure() {
        let mut good = Cursor::new(b"AccountId,MeterReadingDateTime,MeterReadValue\n1,22/04/2019 09:24,5".to_vec());
        good.set_position(10);
        assert!(validate_format(&mut good).is_success());
        assert_eq!(good.position(), 0);

        let mut bad = Cursor::new(b"Nope\n1".to_vec());
        assert!(!validate_format(&mut bad).is_success());
        assert_eq!(bad.position(), 0);
    }

    #[test]
    fn test_unreadable_row_rejected_and_rewound() {
        let mut content = b"AccountId,MeterReadingDateTime,MeterReadValue\n1,22/04/2019 09:24,".to_vec();
        content.extend_from_slice(&[0xff, 0xfe]);
        let mut stream = Cursor::new(content);
        stream.set_position(5);

        let result = validate_format(&mut stream);

        assert_eq!(result.error_message(), Some(INVALID_FORMAT));
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut stream = Cursor::new(b"AccountId,MeterReadingDateTime,MeterReadValue\n1,22/04/2019 09:24,5".to_vec());
        let first = validate_format(&mut stream);
        let second = validate_format(&mut stream);
        assert_eq!(first, second);
        assert!(first.is_success());
    }

    #[test]
    fn test_row_schema_follows_header_order() {
        let headers = StringRecord::from(vec!["meterreadvalue", " AccountId", "MeterReadingDateTime"]);
        let schema = RowSchema::from_headers(&headers).unwrap();

        let record = StringRecord::from(vec!["500", "1", "22/04/2019 09:24"]);
        let raw = schema.decode(&record).unwrap();
        assert_eq!(raw.account_id, "1");
        assert_eq!(raw.reading_time, "22/04/2019 09:24");
        assert_eq!(raw.read_value, "500");

        let short = StringRecord::from(vec!["500", "1"]);
        assert!(schema.decode(&short).is_err());
    }

    #[test]
    fn test_row_schema_requires_all_columns() {
        let headers = StringRecord::from(vec!["AccountId", "MeterReadValue"]);
        assert_eq!(RowSchema::from_headers(&headers), None);
    }
}
