//! Exact money arithmetic over split integer/fraction strings
//!
//! Amounts cross the crate boundary as a pair of strings, the integer part and
//! the fraction part, and never as binary floats. Arithmetic parses both parts
//! into a [`Decimal`], operates exactly and splits the result again.
//!
//! Parsing is exact: an input with more significant digits than a [`Decimal`]
//! can hold is rejected instead of being rounded behind the caller's back.
//! Rounding to a currency's payable form is a separate, explicit step (see
//! [`crate::money::rounding`]).

use crate::types::CanvassError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An exact amount held as integer and fraction strings
///
/// The fraction is always digits only and the integer carries the sign, so
/// `"{integer}.{fraction}"` is a valid decimal. Zero is `("0", "0")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoneyAmount {
    pub integer: String,
    pub fraction: String,
}

impl MoneyAmount {
    /// Create an amount from raw parts
    ///
    /// The parts are stored as given; use [`MoneyAmount::parse`] to clean them.
    pub fn new(integer: &str, fraction: &str) -> Self {
        MoneyAmount {
            integer: integer.to_string(),
            fraction: fraction.to_string(),
        }
    }

    /// The zero amount, `("0", "0")`
    pub fn zero() -> Self {
        MoneyAmount::new("0", "0")
    }

    /// Clean raw user input into canonical parts
    pub fn parse(integer: &str, fraction: &str) -> Result<Self, CanvassError> {
        Ok(MoneyAmount::from_decimal(parse_parts(integer, fraction)?))
    }

    /// Split an amount written as one decimal string, e.g. `"12.50"`
    pub fn from_decimal_str(value: &str) -> Result<Self, CanvassError> {
        let (integer, fraction) = value.split_once('.').unwrap_or((value, ""));
        MoneyAmount::parse(integer, fraction)
    }

    /// Split a [`Decimal`] into canonical parts
    pub fn from_decimal(value: Decimal) -> Self {
        let (integer, fraction) = split(value);
        MoneyAmount { integer, fraction }
    }

    /// The exact value of this amount
    pub fn to_decimal(&self) -> Result<Decimal, CanvassError> {
        parse_parts(&self.integer, &self.fraction)
    }

    /// Both parts are "0"
    pub fn is_zero(&self) -> bool {
        self.integer == "0" && self.fraction == "0"
    }

    pub fn add(&self, other: &MoneyAmount) -> Result<MoneyAmount, CanvassError> {
        let (integer, fraction) = add(&self.integer, &self.fraction, &other.integer, &other.fraction)?;
        Ok(MoneyAmount { integer, fraction })
    }

    pub fn subtract(&self, other: &MoneyAmount) -> Result<MoneyAmount, CanvassError> {
        let (integer, fraction) =
            subtract(&self.integer, &self.fraction, &other.integer, &other.fraction)?;
        Ok(MoneyAmount { integer, fraction })
    }

    pub fn divide(&self, divisor: impl Into<Scalar>) -> Result<MoneyAmount, CanvassError> {
        let (integer, fraction) = divide(&self.integer, &self.fraction, divisor)?;
        Ok(MoneyAmount { integer, fraction })
    }

    pub fn multiply(&self, multiplier: impl Into<Scalar>) -> Result<MoneyAmount, CanvassError> {
        let (integer, fraction) = multiply(&self.integer, &self.fraction, multiplier)?;
        Ok(MoneyAmount { integer, fraction })
    }
}

impl Default for MoneyAmount {
    fn default() -> Self {
        MoneyAmount::zero()
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&simplify(&self.integer, &self.fraction))
    }
}

/// A multiplier or divisor
///
/// Strings are cleaned permissively: anything other than digits, `-` and `.`
/// is dropped, so `"   -5"` is minus five.
#[derive(Debug, Clone)]
pub enum Scalar {
    Decimal(Decimal),
    Text(String),
}

impl Scalar {
    fn to_decimal(&self) -> Result<Decimal, CanvassError> {
        match self {
            Scalar::Decimal(value) => Ok(*value),
            Scalar::Text(text) => {
                let cleaned = permissive_clean(text);
                Decimal::from_str_exact(&cleaned).map_err(|_| CanvassError::malformed_amount(text))
            }
        }
    }
}

impl From<Decimal> for Scalar {
    fn from(value: Decimal) -> Self {
        Scalar::Decimal(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Decimal(Decimal::from(value))
    }
}

impl From<usize> for Scalar {
    fn from(value: usize) -> Self {
        Scalar::Decimal(Decimal::from(value))
    }
}

/// Join cleaned integer and fraction parts into one decimal string
///
/// An optional `-` at the start of the integer part (white space before it is
/// allowed) survives at the front of the result; every other non-digit
/// character is removed from both parts. There is no `.` when the fraction is
/// empty. A blank integer part reads as `"0"`.
///
/// ```
/// use canvass_ledger::money::simplify;
///
/// assert_eq!(simplify("12,23'", "431"), "1223.431");
/// assert_eq!(simplify("  - 1!2,23'", ""), "-1223");
/// ```
pub fn simplify(integer: &str, fraction: &str) -> String {
    let integer = clean_integer(integer);
    let fraction = digits_only(fraction);

    if fraction.is_empty() {
        integer
    } else {
        format!("{}.{}", integer, fraction)
    }
}

/// Add two amounts given as integer/fraction pairs
///
/// Returns `(integer, fraction)`; the fraction is `"0"` for whole results.
pub fn add(
    integer1: &str,
    fraction1: &str,
    integer2: &str,
    fraction2: &str,
) -> Result<(String, String), CanvassError> {
    let left = parse_parts(integer1, fraction1)?;
    let right = parse_parts(integer2, fraction2)?;

    left.checked_add(right)
        .map(split)
        .ok_or_else(|| CanvassError::arithmetic_overflow("add"))
}

/// Subtract the second amount from the first
pub fn subtract(
    integer1: &str,
    fraction1: &str,
    integer2: &str,
    fraction2: &str,
) -> Result<(String, String), CanvassError> {
    let left = parse_parts(integer1, fraction1)?;
    let right = parse_parts(integer2, fraction2)?;

    left.checked_sub(right)
        .map(split)
        .ok_or_else(|| CanvassError::arithmetic_overflow("subtract"))
}

/// Multiply an amount by an integer, decimal or numeric string
pub fn multiply(
    integer: &str,
    fraction: &str,
    multiplier: impl Into<Scalar>,
) -> Result<(String, String), CanvassError> {
    let number = parse_parts(integer, fraction)?;
    let multiplier = multiplier.into().to_decimal()?;

    number
        .checked_mul(multiplier)
        .map(split)
        .ok_or_else(|| CanvassError::arithmetic_overflow("multiply"))
}

/// Divide an amount without rounding, within the limits of [`Decimal`]
pub fn divide(
    integer: &str,
    fraction: &str,
    divisor: impl Into<Scalar>,
) -> Result<(String, String), CanvassError> {
    let number = parse_parts(integer, fraction)?;
    let divisor = divisor.into().to_decimal()?;

    if divisor.is_zero() {
        return Err(CanvassError::division_by_zero(&simplify(integer, fraction)));
    }

    number
        .checked_div(divisor)
        .map(split)
        .ok_or_else(|| CanvassError::arithmetic_overflow("divide"))
}

/// Parse integer/fraction parts into an exact decimal
pub(crate) fn parse_parts(integer: &str, fraction: &str) -> Result<Decimal, CanvassError> {
    let simplified = simplify(integer, fraction);
    Decimal::from_str_exact(&simplified).map_err(|_| CanvassError::malformed_amount(&simplified))
}

/// Split a decimal into `(integer, fraction)` strings with no trailing zeros
fn split(value: Decimal) -> (String, String) {
    let normalized = value.normalize();
    if normalized.is_zero() {
        return ("0".to_string(), "0".to_string());
    }

    let text = normalized.to_string();
    match text.split_once('.') {
        Some((integer, fraction)) => (integer.to_string(), fraction.to_string()),
        None => (text, "0".to_string()),
    }
}

fn clean_integer(integer: &str) -> String {
    let negative = integer.trim_start().starts_with('-');
    let digits = digits_only(integer);
    let digits = if digits.is_empty() { "0".to_string() } else { digits };

    if negative {
        format!("-{}", digits)
    } else {
        digits
    }
}

fn digits_only(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

fn permissive_clean(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect()
}
