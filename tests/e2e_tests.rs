//! End-to-end integration tests
//!
//! Each fixture under tests/fixtures/ holds a ledger script (input.csv) and the
//! poll table it must produce (expected.csv). Every fixture runs through both
//! strategies, and a generated script with many concurrent users checks that
//! the two strategies agree.

#[cfg(test)]
mod tests {
    use canvass_ledger::cli::StrategyType;
    use canvass_ledger::strategy::{create_strategy, BatchConfig};
    use canvass_ledger::types::Currency;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;
    use std::fmt::Write as _;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::str::FromStr;
    use tempfile::NamedTempFile;

    fn run(input_path: &Path, strategy_type: StrategyType, config: Option<BatchConfig>) -> String {
        let strategy = create_strategy(strategy_type, config, Currency::builtin());
        let mut output = Vec::new();
        strategy
            .process(input_path, &mut output)
            .unwrap_or_else(|e| panic!("Failed to process script: {}", e));
        String::from_utf8(output).expect("Output is not UTF-8")
    }

    /// Run a fixture's input.csv and compare with its expected.csv
    fn run_test_fixture(fixture_name: &str, strategy_type: StrategyType) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        let actual_output = run(Path::new(&input_path), strategy_type, None);
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (strategy: {:?})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, strategy_type, actual_output, expected_output
        );
    }

    #[rstest]
    #[case("happy_path")]
    #[case("redistribution")]
    #[case("expire_edge_cases")]
    #[case("single_in_flight")]
    #[case("malformed_rows")]
    fn test_fixtures(
        #[case] fixture: &str,
        #[values(StrategyType::Sync, StrategyType::Async)] strategy: StrategyType,
    ) {
        run_test_fixture(fixture, strategy);
    }

    const ROUNDS: u32 = 3;
    const USERS: u32 = 200;

    fn poll_currency(poll: u32) -> &'static str {
        if poll % 2 == 0 {
            "GBP"
        } else {
            "CHF"
        }
    }

    /// Poll and amount of a user's donation in a round
    fn generated_donation(round: u32, user: u32) -> (u32, String) {
        let poll = user % 6 + 1;
        let amount = format!("{}.{:02}", user % 17 + 1, (user * 7 + round) % 100);
        (poll, amount)
    }

    /// Many users donating to a handful of polls, with expiries in between
    fn generated_script() -> String {
        let mut script = String::from("op,poll,user,amount,currency,title\n");
        for poll in 1..=6 {
            writeln!(script, "open,{},1000,,{},Poll {}", poll, poll_currency(poll), poll).unwrap();
        }
        for round in 0..ROUNDS {
            for user in 1..=USERS {
                let (poll, amount) = generated_donation(round, user);
                if user % 3 == 0 {
                    writeln!(script, "pledge,{},{},{}", poll, user, amount).unwrap();
                    writeln!(script, "pay,{},{}", poll, user).unwrap();
                } else {
                    writeln!(script, "donate,{},{},{}", poll, user, amount).unwrap();
                }
            }
            // Expire one poll of each currency per round
            writeln!(script, "expire,{},1000", round * 2 + 1).unwrap();
            writeln!(script, "expire,{},1000", round * 2 + 2).unwrap();
        }
        script
    }

    #[rstest]
    #[case::default_batches(None)]
    #[case::small_batches(Some(BatchConfig::new(7, 4)))]
    #[case::single_worker(Some(BatchConfig::new(50, 1)))]
    fn test_strategies_agree_on_generated_script(#[case] config: Option<BatchConfig>) {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(generated_script().as_bytes())
            .expect("Failed to write script");
        file.flush().expect("Failed to flush script");

        let sync_output = run(file.path(), StrategyType::Sync, None);
        let async_output = run(file.path(), StrategyType::Async, config);

        assert_eq!(sync_output, async_output);
        assert_eq!(sync_output.lines().count(), 7);
    }

    #[test]
    fn test_generated_script_conserves_money() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(generated_script().as_bytes())
            .expect("Failed to write script");
        file.flush().expect("Failed to flush script");

        // Polls expired in an earlier round refuse the donation
        let mut donated: BTreeMap<&str, Decimal> = BTreeMap::new();
        for round in 0..ROUNDS {
            for user in 1..=USERS {
                let (poll, amount) = generated_donation(round, user);
                if poll > round * 2 {
                    *donated.entry(poll_currency(poll)).or_default() +=
                        Decimal::from_str(&amount).unwrap();
                }
            }
        }

        let output = run(file.path(), StrategyType::Async, None);
        let mut rows = csv::Reader::from_reader(output.as_bytes());

        let mut live_polls = 0;
        let mut held: BTreeMap<&str, Decimal> = BTreeMap::new();
        for row in rows.records() {
            let row = row.unwrap();
            if &row[3] == "expired" {
                assert_eq!(&row[5], "0.0");
            } else {
                live_polls += 1;
            }
            let currency = if &row[2] == "GBP" { "GBP" } else { "CHF" };
            *held.entry(currency).or_default() += Decimal::from_str(&row[5]).unwrap();
        }
        // The last round expires polls 5 and 6 into nothing left open of
        // their currency, so those two expiries are refused
        assert_eq!(live_polls, 2);
        assert_eq!(held, donated);
    }
}
