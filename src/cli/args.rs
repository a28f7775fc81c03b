use crate::io::load_currencies;
use crate::strategy::BatchConfig;
use crate::types::Currency;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Replay a donation ledger script and print the resulting polls
#[derive(Parser, Debug)]
#[command(name = "canvass-ledger")]
#[command(
    about = "Replay a donation ledger script and print the resulting polls",
    long_about = "Replay a donation ledger script and print the resulting polls.\n\n\
                  Logging goes to stderr and is controlled with RUST_LOG (default: warn)."
)]
pub struct CliArgs {
    /// Ledger script path
    #[arg(value_name = "INPUT", help = "Path to the ledger script CSV")]
    pub input_file: PathBuf,

    /// Processing strategy
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' replays row by row, 'async' replays users in parallel"
    )]
    pub strategy: StrategyType,

    /// Number of ledger rows per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of ledger rows per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Worker threads (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Worker threads replaying a batch (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    /// Currency definitions replacing the built-in table
    #[arg(
        long = "currencies",
        value_name = "FILE",
        help = "CSV of currency definitions (default: built-in GBP, USD, EUR, CHF, ARS, JPY)"
    )]
    pub currencies: Option<PathBuf>,
}

/// Available processing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values take their defaults; zero values are replaced by the
    /// defaults with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_none() && self.max_concurrent_batches.is_none() {
            return BatchConfig::default();
        }

        let default = BatchConfig::default();
        BatchConfig::new(
            self.batch_size.unwrap_or(default.batch_size),
            self.max_concurrent_batches
                .unwrap_or(default.max_concurrent_batches),
        )
    }

    /// The currency table to replay with
    ///
    /// # Errors
    ///
    /// Returns an error if `--currencies` names a file that cannot be loaded.
    pub fn currency_table(&self) -> Result<Vec<Currency>, String> {
        match &self.currencies {
            Some(path) => load_currencies(path),
            None => Ok(Currency::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    #[case::default_strategy(&["program", "ledger.csv"], StrategyType::Async)]
    #[case::explicit_sync(&["program", "--strategy", "sync", "ledger.csv"], StrategyType::Sync)]
    #[case::explicit_async(&["program", "--strategy", "async", "ledger.csv"], StrategyType::Async)]
    fn test_strategy_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.strategy, expected);
    }

    #[rstest]
    #[case::all_defaults(&["program", "ledger.csv"], 1000, num_cpus::get())]
    #[case::custom_batch_size(&["program", "--batch-size", "2000", "ledger.csv"], 2000, num_cpus::get())]
    #[case::custom_max_concurrent(&["program", "--max-concurrent", "8", "ledger.csv"], 1000, 8)]
    #[case::zero_batch_size(&["program", "--batch-size", "0", "ledger.csv"], 1000, num_cpus::get())]
    #[case::zero_max_concurrent(&["program", "--max-concurrent", "0", "ledger.csv"], 1000, num_cpus::get())]
    fn test_batch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_batch_config();

        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_max_concurrent);
    }

    #[test]
    fn test_builtin_currency_table() {
        let parsed = CliArgs::try_parse_from(["program", "ledger.csv"]).unwrap();
        let codes: Vec<_> = parsed
            .currency_table()
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(codes, vec!["GBP", "USD", "EUR", "CHF", "ARS", "JPY"]);
    }

    #[test]
    fn test_currency_file_replaces_builtin_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"code,name,symbol\nNZD,New Zealand Dollar,NZ$\n")
            .unwrap();
        let path = file.path().to_str().unwrap();

        let parsed = CliArgs::try_parse_from(["program", "--currencies", path, "ledger.csv"]).unwrap();
        let table = parsed.currency_table().unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table[0].code, "NZD");
    }

    #[test]
    fn test_missing_currency_file() {
        let parsed =
            CliArgs::try_parse_from(["program", "--currencies", "missing.csv", "ledger.csv"]).unwrap();
        assert!(parsed.currency_table().is_err());
    }

    #[rstest]
    #[case::missing_input(&["program"])]
    #[case::invalid_strategy(&["program", "--strategy", "invalid", "ledger.csv"])]
    #[case::currencies_without_file(&["program", "ledger.csv", "--currencies"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        assert!(CliArgs::try_parse_from(args).is_err());
    }
}
