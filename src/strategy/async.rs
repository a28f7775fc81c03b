//! Asynchronous batch processing strategy
//!
//! Reads the script in batches and replays each batch through a
//! `BatchProcessor` on a multi-threaded tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     └── BatchProcessor (barrier segments + user partitioning)
//!         └── Arc<LedgerEngine> (store with row locks)
//! ```
//!
//! Batches run one after another, so a barrier row never overtakes an
//! earlier donation row in another batch. Inside a batch, the rows of
//! different users between two barriers run in parallel.

use crate::core::BatchProcessor;
use crate::io::async_reader::AsyncReader;
use crate::strategy::{new_engine, write_output, ProcessingStrategy};
use crate::types::Currency;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Configuration for batch processing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of ledger rows per batch
    pub batch_size: usize,
    /// Worker threads available to a batch
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig, replacing zero values with defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(batch_size, default = default.batch_size, "Invalid batch size, using default");
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                max_concurrent_batches,
                default = default.max_concurrent_batches,
                "Invalid worker count, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Asynchronous batch processing strategy
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    config: BatchConfig,
    currencies: Vec<Currency>,
}

impl AsyncProcessingStrategy {
    pub fn new(config: BatchConfig, currencies: Vec<Currency>) -> Self {
        Self { config, currencies }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .max_blocking_threads(self.config.max_concurrent_batches)
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        let engine = Arc::new(new_engine(&self.currencies)?);
        let processor = BatchProcessor::new(Arc::clone(&engine));

        runtime.block_on(async {
            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                let results = processor.process_batch(batch).await;
                let failed = results.iter().filter(|r| r.result.is_err()).count();
                debug!(rows = results.len(), failed, "Batch replayed");
            }

            Ok::<(), String>(())
        })?;

        write_output(&engine, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn run(config: BatchConfig, script: &str) -> String {
        let file = create_temp_csv(script);
        let strategy = AsyncProcessingStrategy::new(config, Currency::builtin());
        let mut output = Vec::new();
        strategy.process(file.path(), &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_batch_config_replaces_zero_values() {
        let default = BatchConfig::default();
        assert_eq!(BatchConfig::new(0, 0), default);
        assert_eq!(BatchConfig::new(5, 2), BatchConfig { batch_size: 5, max_concurrent_batches: 2 });
    }

    #[test]
    fn test_async_strategy_replays_script() {
        let output = run(
            BatchConfig::default(),
            "op,poll,user,amount,currency,title\n\
             open,1,9,,EUR,Dach\n\
             donate,1,1,10\n\
             donate,1,2,0.5\n",
        );

        assert_eq!(
            output,
            "poll,title,currency,state,votes,total,display\n1,Dach,EUR,open,2,10.5,\"10,50 €\"\n"
        );
    }

    #[test]
    fn test_async_strategy_handles_missing_file() {
        let strategy = AsyncProcessingStrategy::new(BatchConfig::default(), Currency::builtin());
        let mut output = Vec::new();

        let result = strategy.process(Path::new("nonexistent.csv"), &mut output);
        assert!(result.unwrap_err().contains("Failed to open file"));
    }

    #[test]
    fn test_async_strategy_keeps_order_across_batches() {
        // A user's pledge and pay land in different batches; the barrier
        // in the second batch must see the payment
        let output = run(
            BatchConfig::new(2, 4),
            "op,poll,user,amount,currency,title\n\
             open,1,9,,GBP,A\n\
             pledge,1,1,4\n\
             pay,1,1\n\
             open,2,9,,GBP,B\n\
             expire,1,9\n",
        );

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[1], "1,A,GBP,expired,2,0.0,£0.00");
        assert_eq!(lines[2], "2,B,GBP,open,1,4.0,£4.00");
    }
}
