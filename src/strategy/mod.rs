//! Processing strategy module for ledger script replay
//!
//! This module defines the Strategy pattern for complete replay pipelines,
//! covering both script parsing and engine processing. The implementation
//! (synchronous or asynchronous batch) is selected at runtime; both produce
//! the same poll output for the same script.

use crate::cli::StrategyType;
use crate::core::LedgerEngine;
use crate::io::write_polls_csv;
use crate::types::Currency;
use std::io::Write;
use std::path::Path;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for complete replay pipelines
pub trait ProcessingStrategy: Send + Sync {
    /// Replay a ledger script and write the final poll states
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the ledger script
    /// * `output` - Writer receiving the poll CSV
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The script cannot be opened
    /// - The currency table is invalid
    /// - Output cannot be written
    ///
    /// Rows that fail to parse or apply are logged and skipped; they never
    /// make this method fail.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// Build an engine over a fresh store with `currencies`
fn new_engine(currencies: &[Currency]) -> Result<LedgerEngine, String> {
    LedgerEngine::new(currencies.to_vec()).map_err(|e| format!("Invalid currency table: {}", e))
}

/// Write the engine's polls with its currencies
fn write_output(engine: &LedgerEngine, output: &mut dyn Write) -> Result<(), String> {
    write_polls_csv(&engine.polls(), &engine.store().currencies(), output)
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `config` - Optional configuration for async batch processing (ignored for sync)
/// * `currencies` - Currencies the replay may use
///
/// # Returns
///
/// A boxed trait object implementing the ProcessingStrategy trait
pub fn create_strategy(
    strategy_type: StrategyType,
    config: Option<BatchConfig>,
    currencies: Vec<Currency>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(currencies)),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(config, currencies))
        }
    }
}
