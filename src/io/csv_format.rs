//! CSV format handling for ledger scripts, currency files and poll output
//!
//! This module centralizes all CSV format concerns, providing:
//! - LedgerCsvRecord / CurrencyCsvRecord structures for deserialization
//! - Conversion from CSV records to domain types
//! - Poll output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::money::{format, MoneyAmount};
use crate::types::{Currency, LedgerOperation, LedgerRecord, Poll, PollId, RoundingAlgorithm, UserId};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use tracing::warn;

/// CSV record structure for ledger script rows
///
/// Matches the input CSV format with columns: op, poll, user, amount,
/// currency, title. Every column after `user` is optional because most
/// operations only need some of them.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LedgerCsvRecord {
    pub op: String,
    pub poll: PollId,
    pub user: UserId,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub title: Option<String>,
}

/// CSV record structure for currency definitions
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CurrencyCsvRecord {
    pub code: String,
    pub name: String,
    pub symbol: Option<String>,
    pub rounding_algorithm: Option<String>,
    pub decimal_precision: Option<u32>,
    pub integer_template: Option<String>,
    pub delimiter: Option<String>,
    pub fraction_template: Option<String>,
    pub show_after_number: Option<bool>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Convert a LedgerCsvRecord to a LedgerRecord
///
/// This function:
/// - Parses the operation name (case insensitive)
/// - Parses the amount exactly (if present); unlike `simplify`, stray
///   characters are an error here
/// - Validates that amounts are present for pledge/donate
/// - Validates that a currency is present for open
///
/// # Returns
///
/// - Ok(LedgerRecord) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_csv_record(csv_record: LedgerCsvRecord) -> Result<LedgerRecord, String> {
    let op = match csv_record.op.to_lowercase().as_str() {
        "open" => LedgerOperation::Open,
        "pledge" => LedgerOperation::Pledge,
        "pay" => LedgerOperation::Pay,
        "donate" => LedgerOperation::Donate,
        "underway" => LedgerOperation::Underway,
        "complete" => LedgerOperation::Complete,
        "expire" => LedgerOperation::Expire,
        _ => {
            return Err(format!(
                "Invalid operation: '{}' for poll {}",
                csv_record.op, csv_record.poll
            ))
        }
    };

    let amount = match non_blank(csv_record.amount) {
        Some(amount_str) => match Decimal::from_str_exact(amount_str.trim()) {
            Ok(decimal) => Some(MoneyAmount::from_decimal(decimal)),
            Err(_) => {
                return Err(format!(
                    "Invalid amount '{}' for poll {}",
                    amount_str, csv_record.poll
                ))
            }
        },
        None => None,
    };

    if op.needs_amount() && amount.is_none() {
        return Err(format!(
            "{} for poll {} by user {} requires an amount",
            op, csv_record.poll, csv_record.user
        ));
    }

    let currency = non_blank(csv_record.currency).map(|c| c.trim().to_uppercase());
    if op == LedgerOperation::Open && currency.is_none() {
        return Err(format!("open for poll {} requires a currency", csv_record.poll));
    }

    Ok(LedgerRecord {
        op,
        poll: csv_record.poll,
        user: csv_record.user,
        amount,
        currency,
        title: non_blank(csv_record.title),
    })
}

/// Convert a CurrencyCsvRecord to a validated Currency
///
/// Blank optional columns keep the defaults of [`Currency::new`].
pub fn convert_currency_record(csv_record: CurrencyCsvRecord) -> Result<Currency, String> {
    let mut currency = Currency::new(
        csv_record.code.trim(),
        csv_record.name.trim(),
        csv_record.symbol.as_deref().unwrap_or_default(),
    );

    if let Some(key) = non_blank(csv_record.rounding_algorithm) {
        if key.parse::<RoundingAlgorithm>().is_err() {
            warn!(currency = %currency.code, key = %key, "Unknown rounding algorithm, using mathematical");
        }
        currency.rounding_algorithm = RoundingAlgorithm::from_key_or_default(&key);
    }
    if let Some(precision) = csv_record.decimal_precision {
        currency.decimal_precision = precision;
    }
    if let Some(template) = csv_record.integer_template {
        currency.integer_template = template;
    }
    if let Some(delimiter) = csv_record.delimiter {
        currency.delimiter = delimiter;
    }
    if let Some(template) = csv_record.fraction_template {
        currency.fraction_template = template;
    }
    if let Some(after) = csv_record.show_after_number {
        currency.show_after_number = after;
    }

    currency
        .validate()
        .map_err(|e| format!("Currency {}: {}", currency.code, e))?;
    Ok(currency)
}

/// Write poll states to CSV format
///
/// Writes polls in CSV format with columns: poll, title, currency, state,
/// votes, total, display. Polls are sorted by id for deterministic output.
/// `total` is the exact simplified amount and `display` the amount formatted
/// for the poll's currency.
///
/// # Arguments
///
/// * `polls` - Slice of polls to write
/// * `currencies` - Currency definitions used for `display`
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write or formatting error occurred
pub fn write_polls_csv(
    polls: &[Poll],
    currencies: &[Currency],
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["poll", "title", "currency", "state", "votes", "total", "display"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_polls = polls.to_vec();
    sorted_polls.sort_by_key(|poll| poll.id);

    for poll in sorted_polls {
        let total = poll.total.to_string();
        let display = match currencies.iter().find(|c| c.code == poll.currency) {
            Some(currency) => format(currency, &total)
                .map_err(|e| format!("Failed to format total of poll {}: {}", poll.id, e))?,
            None => total.clone(),
        };

        writer
            .write_record(&[
                poll.id.to_string(),
                poll.title,
                poll.currency,
                poll.state.to_string(),
                poll.votes.to_string(),
                total,
                display,
            ])
            .map_err(|e| format!("Failed to write poll record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
