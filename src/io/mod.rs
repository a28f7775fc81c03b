//! I/O module
//!
//! Handles ledger script parsing, currency files and poll output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, output serialization)
//! - `sync_reader` - Streaming script reader and currency file loader
//! - `async_reader` - Asynchronous script reader with batch reading interface

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use csv_format::{convert_csv_record, write_polls_csv, LedgerCsvRecord};
pub use sync_reader::{load_currencies, SyncReader};
