//! Asynchronous CSV reader with batch interface
//!
//! Reads ledger script rows in batches for the async strategy.
//!
//! # Architecture
//!
//! ```text
//! tokio::fs::File → compat → csv_async → AsyncReader → Vec<LedgerRecord>
//!                                             ↓
//!                                     csv_format module
//!                           (LedgerCsvRecord, convert_csv_record)
//! ```
//!
//! Rows that fail to parse or convert are logged with their line number and
//! left out of the batch, so a batch may hold fewer rows than requested even
//! before the end of the script.

use crate::io::csv_format::{convert_csv_record, LedgerCsvRecord};
use crate::types::LedgerRecord;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous CSV reader
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    /// Data rows consumed so far; the header is line 1
    rows_read: usize,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    /// Create a new AsyncReader over an async byte source
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            rows_read: 0,
        }
    }

    /// Read a batch of ledger records
    ///
    /// Consumes rows until `batch_size` valid records are collected or the
    /// script ends. Invalid rows are logged and skipped.
    ///
    /// # Returns
    ///
    /// The converted records in script order. An empty vector means the end
    /// of the script was reached.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<LedgerRecord> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut rows = self.csv_reader.deserialize::<LedgerCsvRecord>();

        while batch.len() < batch_size {
            let Some(row) = rows.next().await else {
                break;
            };
            self.rows_read += 1;
            let line = self.rows_read + 1;

            match row {
                Ok(csv_record) => match convert_csv_record(csv_record) {
                    Ok(record) => batch.push(record),
                    Err(error) => warn!(line, %error, "Skipping ledger row"),
                },
                Err(error) => warn!(line, %error, "CSV parse error"),
            }
        }

        batch
    }
}
