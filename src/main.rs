//! canvass-ledger CLI
//!
//! Replays a donation ledger script and prints the final state of every poll.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- ledger.csv > polls.csv
//! cargo run -- --strategy sync ledger.csv > polls.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 ledger.csv > polls.csv
//! cargo run -- --currencies currencies.csv ledger.csv > polls.csv
//! RUST_LOG=info cargo run -- ledger.csv > polls.csv
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success (skipped rows are logged, not fatal)
//! - 1: Error (file not found, bad currency table, output failure)

use canvass_ledger::cli;
use canvass_ledger::strategy;
use std::process;
use tracing::error;

fn main() {
    cli::init_logging();
    let args = cli::parse_args();

    let currencies = match args.currency_table() {
        Ok(currencies) => currencies,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let config = matches!(args.strategy, cli::StrategyType::Async).then(|| args.to_batch_config());
    let strategy = strategy::create_strategy(args.strategy, config, currencies);

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        error!("{}", e);
        process::exit(1);
    }
}
