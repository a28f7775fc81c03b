//! Synchronous CSV readers
//!
//! `SyncReader` streams ledger script rows one at a time; `load_currencies`
//! reads a whole currency definition file, which is small and needed up
//! front.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from the constructors
//! - Row-level parse and conversion errors are yielded as `Err` items, prefixed
//!   with the line they came from, so callers can log them and carry on
//!
//! ```no_run
//! use canvass_ledger::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::from_path(Path::new("ledger.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(record) => println!("Replaying {}", record.op),
//!         Err(e) => eprintln!("Skipping: {}", e),
//!     }
//! }
//! ```

use crate::io::csv_format::{
    convert_csv_record, convert_currency_record, CurrencyCsvRecord, LedgerCsvRecord,
};
use crate::types::{Currency, LedgerRecord};
use csv::{DeserializeRecordsIntoIter, ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;

fn reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder
        .trim(Trim::All)
        .flexible(true)
        .buffer_capacity(8 * 1024);
    builder
}

fn open(path: &Path) -> Result<File, String> {
    File::open(path).map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))
}

/// Streaming reader over ledger script rows
pub struct SyncReader<R: Read> {
    rows: DeserializeRecordsIntoIter<R, LedgerCsvRecord>,
    /// Data rows read so far; the header is line 1
    rows_read: usize,
}

impl SyncReader<File> {
    /// Open a ledger script on disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn from_path(path: &Path) -> Result<Self, String> {
        Ok(Self::from_reader(open(path)?))
    }
}

impl<R: Read> SyncReader<R> {
    /// Read a ledger script from any byte source
    pub fn from_reader(reader: R) -> Self {
        Self {
            rows: reader_builder().from_reader(reader).into_deserialize(),
            rows_read: 0,
        }
    }
}

impl<R: Read> Iterator for SyncReader<R> {
    type Item = Result<LedgerRecord, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        self.rows_read += 1;
        let line = self.rows_read + 1;

        Some(match row {
            Ok(csv_record) => {
                convert_csv_record(csv_record).map_err(|e| format!("Line {}: {}", line, e))
            }
            Err(e) => Err(format!("Line {}: CSV parse error: {}", line, e)),
        })
    }
}

/// Load every currency from a definition file
///
/// Unlike script rows, a bad currency row is fatal: formatting would be wrong
/// for every poll in that currency.
///
/// # Errors
///
/// Returns an error naming the file if it cannot be read, a row cannot
/// be parsed, or a currency fails validation.
pub fn load_currencies(path: &Path) -> Result<Vec<Currency>, String> {
    let mut reader = reader_builder().from_reader(open(path)?);

    let mut currencies = Vec::new();
    for row in reader.deserialize::<CurrencyCsvRecord>() {
        let csv_record = row.map_err(|e| format!("{}: {}", path.display(), e))?;
        currencies.push(convert_currency_record(csv_record)?);
    }

    if currencies.is_empty() {
        return Err(format!("{}: no currencies defined", path.display()));
    }
    Ok(currencies)
}
