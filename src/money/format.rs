//! Currency display formatting and gateway unit conversion
//!
//! Formatting lays the digits of a rounded value over the currency's integer
//! and fraction templates. Any numeric template character is a digit slot;
//! everything else is copied as is. This gives per-currency grouping such as
//! "1,234,567" or "1'234'567" without locale support.

use crate::money::amount::{simplify, MoneyAmount};
use crate::money::rounding::round;
use crate::types::{CanvassError, Currency};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Print a value the way the currency writes money
///
/// ```
/// use canvass_ledger::money::format;
/// use canvass_ledger::types::Currency;
///
/// let pounds = Currency::new("GBP", "Pound Sterling", "£");
/// assert_eq!(format(&pounds, "1234567.891").unwrap(), "£1,234,567.89");
/// ```
pub fn format(currency: &Currency, value: &str) -> Result<String, CanvassError> {
    let numeric = round(currency, value)?;

    let (negative, unsigned) = match numeric.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, numeric.as_str()),
    };
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let reversed_template: String = currency.integer_template.chars().rev().collect();
    let mut formatted = apply_template(&reversed_template, integer);
    if negative {
        formatted.insert(0, '-');
    }

    let formatted_fraction = apply_template(&currency.fraction_template, fraction);
    if !formatted_fraction.is_empty() {
        formatted.push_str(&currency.delimiter);
        formatted.push_str(&formatted_fraction);
    }

    if currency.show_after_number {
        Ok(format!("{}{}", formatted, currency.symbol))
    } else {
        Ok(format!("{}{}", currency.symbol, formatted))
    }
}

/// Format an amount given as integer and fraction parts
pub fn compose(currency: &Currency, integer: &str, fraction: &str) -> Result<String, CanvassError> {
    format(currency, &simplify(integer, fraction))
}

/// Convert an amount to the whole minor units a payment gateway charges
///
/// The amount is rounded for the currency first, then scaled by 100 and
/// floored.
pub fn amount_for_gateway(currency: &Currency, amount: &MoneyAmount) -> Result<i64, CanvassError> {
    let rounded = round(currency, &amount.to_string())?;
    let value = Decimal::from_str(&rounded).map_err(|_| CanvassError::malformed_amount(&rounded))?;

    value
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.floor())
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| CanvassError::arithmetic_overflow("amount_for_gateway"))
}

/// Convert gateway minor units back to a human amount
pub fn amount_for_humans(minor_units: i64) -> MoneyAmount {
    MoneyAmount::from_decimal(Decimal::from(minor_units) / Decimal::ONE_HUNDRED)
}

/// Walk a template, taking digits from the end of `value` for numeric slots
///
/// The result is built from the right, so passing a reversed template gives
/// right-aligned integer grouping while a template used as is suits
/// fractions. Digits left over once the template runs out go at the front.
fn apply_template(template: &str, value: &str) -> String {
    let mut remaining: Vec<char> = value.chars().collect();
    let mut formatted: Vec<char> = Vec::with_capacity(template.len() + value.len());

    for slot in template.chars() {
        if remaining.is_empty() {
            break;
        }
        let add = if slot.is_ascii_digit() {
            match remaining.pop() {
                Some(digit) => digit,
                None => break,
            }
        } else {
            slot
        };
        formatted.insert(0, add);
    }

    remaining.into_iter().chain(formatted).collect()
}
