//! Benchmarks for the replay strategies and the money primitives
//!
//! ```bash
//! cargo bench
//! ```
//!
//! Ledger scripts are generated into temporary files: `users` payers donate
//! to a dozen polls in two currencies, with an expiry every few hundred rows
//! so redistribution is part of the measured work.

use canvass_ledger::cli::StrategyType;
use canvass_ledger::money::{divide, format, round};
use canvass_ledger::strategy::{create_strategy, BatchConfig};
use canvass_ledger::types::Currency;
use divan::Bencher;
use std::fmt::Write as _;
use std::io::Write;
use tempfile::NamedTempFile;

fn main() {
    divan::main();
}

const USERS: &[u32] = &[100, 1_000, 10_000];

fn script(users: u32) -> NamedTempFile {
    let mut text = String::from("op,poll,user,amount,currency,title\n");
    for poll in 1..=12 {
        let currency = if poll % 2 == 0 { "GBP" } else { "EUR" };
        writeln!(text, "open,{},0,,{},Poll {}", poll, currency, poll).unwrap();
    }
    for user in 1..=users {
        let poll = user % 10 + 1;
        writeln!(text, "donate,{},{},{}.{:02}", poll, user, user % 50 + 1, user % 100).unwrap();
        if user % 500 == 0 {
            writeln!(text, "expire,{},0", (user / 500) % 10 + 1).unwrap();
        }
    }

    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(text.as_bytes()).expect("Failed to write script");
    file.flush().expect("Failed to flush script");
    file
}

#[divan::bench(args = USERS)]
fn sync_strategy(bencher: Bencher, users: u32) {
    let file = script(users);
    let strategy = create_strategy(StrategyType::Sync, None, Currency::builtin());

    bencher.bench_local(|| {
        let mut output = Vec::new();
        strategy
            .process(file.path(), &mut output)
            .expect("Processing failed");
        output
    });
}

#[divan::bench(args = USERS)]
fn async_strategy(bencher: Bencher, users: u32) {
    let file = script(users);
    let strategy = create_strategy(
        StrategyType::Async,
        Some(BatchConfig::default()),
        Currency::builtin(),
    );

    bencher.bench_local(|| {
        let mut output = Vec::new();
        strategy
            .process(file.path(), &mut output)
            .expect("Processing failed");
        output
    });
}

#[divan::bench]
fn divide_into_shares() -> (String, String) {
    divide(divan::black_box("1234567"), "891", divan::black_box(7_i64)).expect("divide failed")
}

#[divan::bench(args = ["mathematical", "argentinian", "swiss"])]
fn round_value(bencher: Bencher, algorithm: &str) {
    let currency = Currency::new("BEN", "Bench", "B").with_rounding(
        algorithm.parse().expect("unknown algorithm"),
        if algorithm == "mathematical" { 2 } else { 4 },
    );

    bencher.bench_local(|| round(&currency, divan::black_box("98765.43219")).expect("round failed"));
}

#[divan::bench]
fn format_value(bencher: Bencher) {
    let currency = Currency::builtin().remove(0);

    bencher.bench_local(|| format(&currency, divan::black_box("12345678.905")).expect("format failed"));
}
