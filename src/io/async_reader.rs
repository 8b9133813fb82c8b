//! Asynchronous CSV reader with batch interface
//!
//! Provides a streaming interface over agreement requests from a CSV file,
//! read in batches for the async strategy.
//!
//! # Architecture
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of AgreementRequests
//!                  ↓
//!           csv_format module
//!           (CsvRecord, convert_csv_record)
//! ```

use crate::io::csv_format::{convert_csv_record, CsvRecord};
use crate::types::AgreementRequest;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous CSV reader
///
/// Maintains streaming behavior with constant memory usage per batch.
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader }
    }

    /// Read a batch of agreement requests
    ///
    /// Reads up to `batch_size` valid requests. Invalid rows are logged as
    /// warnings and skipped; they do not count towards the batch size.
    ///
    /// # Returns
    ///
    /// The converted requests, in file order. An empty vector means the end
    /// of the file was reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<AgreementRequest> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CsvRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(csv_record)) => match convert_csv_record(csv_record) {
                    Ok(request) => batch.push(request),
                    Err(e) => warn!(error = %e, "Record conversion error"),
                },
                Some(Err(e)) => warn!(error = %e, "CSV parse error"),
                None => break,
            }
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    const HEADER: &str = "action,lender,borrower,value\n";

    #[tokio::test]
    async fn test_async_reader_multiple_batches() {
        let csv_content = format!(
            "{}issue,A,B,1\nissue,A,B,2\nsettle,A,B,1\nissue,C,D,4\nissue,C,D,5\n",
            HEADER
        );
        let mut reader = AsyncReader::new(Cursor::new(csv_content.into_bytes()));

        let values: Vec<i64> = reader.read_batch(2).await.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1, 2]);

        let batch = reader.read_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].action, crate::types::RequestAction::Settle);
        assert_eq!(batch[1].lender, "C");

        assert_eq!(reader.read_batch(2).await.len(), 1);
        assert!(reader.read_batch(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_empty_csv() {
        let mut reader = AsyncReader::new(Cursor::new(HEADER.as_bytes()));
        assert!(reader.read_batch(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_async_reader_skips_invalid_records() {
        let csv_content = format!("{}borrow,A,B,1\nissue,A,B,x\nissue,A,B,-3\n", HEADER);
        let mut reader = AsyncReader::new(Cursor::new(csv_content.into_bytes()));

        // Only the well-formed row survives; its value is for the contract to judge
        let batch = reader.read_batch(10).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].value, -3);
    }

    #[tokio::test]
    async fn test_async_reader_whitespace_and_case() {
        let csv_content = format!("{}  ISSUE , A , B , 9 \n", HEADER);
        let mut reader = AsyncReader::new(Cursor::new(csv_content.into_bytes()));

        let batch = reader.read_batch(10).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].lender, "A");
        assert_eq!(batch[0].value, 9);
    }
}
