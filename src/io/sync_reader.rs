//! Synchronous CSV reader with iterator interface
//!
//! Provides a streaming iterator over agreement requests from a CSV file.
//! Delegates CSV format concerns to the csv_format module.
//!
//! Rows are deserialized lazily through `csv`'s owning iterator, numbered as
//! they go by, and converted one at a time.
//!
//! ```no_run
//! use iou_ledger::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), String> {
//! for result in SyncReader::new(Path::new("requests.csv"))? {
//!     match result {
//!         Ok(request) => println!("Request: {:?}", request),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Opening failures come back from `new()`; a bad row is yielded as an `Err`
//! carrying its line number and the iteration carries on.

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::AgreementRequest;
use csv::{DeserializeRecordsIntoIter, ReaderBuilder, Trim};
use std::fs::File;
use std::iter::Enumerate;
use std::path::Path;

/// Lines before the first data row
const HEADER_LINES: usize = 1;

/// Synchronous CSV reader over agreement requests
pub struct SyncReader {
    rows: Enumerate<DeserializeRecordsIntoIter<File, CsvRecord>>,
}

impl std::fmt::Debug for SyncReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncReader").finish_non_exhaustive()
    }
}

impl SyncReader {
    /// Open `path` for streaming
    ///
    /// Fields are trimmed and short rows are allowed through, so a missing
    /// value is reported by the conversion step rather than by the parser.
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;
        let rows = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(file)
            .into_deserialize()
            .enumerate();
        Ok(Self { rows })
    }
}

impl Iterator for SyncReader {
    type Item = Result<AgreementRequest, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, row) = self.rows.next()?;
        let line = index + HEADER_LINES + 1;
        let request = row
            .map_err(|e| format!("CSV parse error: {}", e))
            .and_then(convert_csv_record);
        Some(request.map_err(|e| format!("Line {}: {}", line, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestAction;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_sync_reader_fails_on_missing_file() {
        let result = SyncReader::new(Path::new("nonexistent.csv"));
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_sync_reader_iterates_requests() {
        let file = create_temp_csv(
            "action,lender,borrower,value\n\
             issue,PartyA,PartyB,10\n\
             settle,PartyA,PartyB,10\n",
        );

        let records: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(records.len(), 2);
        let first = records[0].as_ref().unwrap();
        assert_eq!(first.action, RequestAction::Issue);
        assert_eq!(first.lender, "PartyA");
        assert_eq!(first.borrower, "PartyB");
        assert_eq!(first.value, 10);
        assert_eq!(records[1].as_ref().unwrap().action, RequestAction::Settle);
    }

    #[test]
    fn test_sync_reader_includes_line_numbers_in_errors() {
        let file = create_temp_csv(
            "action,lender,borrower,value\n\
             issue,PartyA,PartyB,10\n\
             issue,PartyA,PartyB,lots\n\
             lend,PartyA,PartyB,5\n\
             issue,PartyC,PartyD,5\n",
        );

        let records: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(records.len(), 4);
        assert!(records[0].is_ok());
        assert!(records[1].as_ref().unwrap_err().contains("Line 3"));
        assert!(records[2].as_ref().unwrap_err().contains("Line 4"));
        assert!(records[3].is_ok());
    }

    #[test]
    fn test_sync_reader_handles_whitespace_and_missing_value() {
        let file = create_temp_csv(
            "action,lender,borrower,value\n  issue  ,  PartyA , PartyB ,  3 \nissue,PartyA,PartyB\n",
        );

        let records: Vec<_> = SyncReader::new(file.path()).unwrap().collect();

        assert_eq!(records.len(), 2);
        let request = records[0].as_ref().unwrap();
        assert_eq!(request.lender, "PartyA");
        assert_eq!(request.value, 3);
        assert!(records[1].is_err());
    }

    #[test]
    fn test_sync_reader_handles_empty_file_after_header() {
        let file = create_temp_csv("action,lender,borrower,value\n");
        assert_eq!(SyncReader::new(file.path()).unwrap().count(), 0);
    }
}
