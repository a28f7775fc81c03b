//! Synchronous processing strategy
//!
//! Streams script rows through a `SyncReader` and applies them one at a time,
//! in file order, on the calling thread. Memory use is bounded by the number
//! of polls and donations, not by the size of the script.

use crate::io::sync_reader::SyncReader;
use crate::strategy::{new_engine, write_output, ProcessingStrategy};
use crate::types::Currency;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Synchronous processing strategy
///
/// # Examples
///
/// ```no_run
/// use canvass_ledger::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use canvass_ledger::types::Currency;
/// use std::path::Path;
///
/// let strategy = SyncProcessingStrategy::new(Currency::builtin());
/// strategy
///     .process(Path::new("ledger.csv"), &mut std::io::stdout())
///     .expect("Processing failed");
/// ```
#[derive(Debug, Clone)]
pub struct SyncProcessingStrategy {
    currencies: Vec<Currency>,
}

impl SyncProcessingStrategy {
    pub fn new(currencies: Vec<Currency>) -> Self {
        Self { currencies }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let engine = new_engine(&self.currencies)?;
        let reader = SyncReader::from_path(input_path)?;

        for row in reader {
            match row {
                Ok(record) => {
                    let (op, poll, user) = (record.op, record.poll, record.user);
                    if let Err(error) = engine.process(record) {
                        warn!(%op, poll, user, %error, "Skipping record");
                    }
                }
                Err(error) => warn!(%error, "Skipping ledger row"),
            }
        }

        write_output(&engine, output)
    }
}
