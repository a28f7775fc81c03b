//! Currency rounding algorithms
//!
//! Each algorithm takes a value as a decimal string and returns the payable
//! form for a currency, also as a string: the smallest denomination the money
//! can actually take. Results are fixed point and zero padded.

use crate::money::amount::MoneyAmount;
use crate::types::currency::SUBUNIT_ROUNDING_PRECISION;
use crate::types::{CanvassError, Currency, RoundingAlgorithm};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Round a value according to the currency's algorithm
///
/// ```
/// use canvass_ledger::money::round;
/// use canvass_ledger::types::Currency;
///
/// let pounds = Currency::new("GBP", "Pound Sterling", "£");
/// assert_eq!(round(&pounds, "10.495").unwrap(), "10.50");
/// ```
pub fn round(currency: &Currency, value: &str) -> Result<String, CanvassError> {
    let number =
        Decimal::from_str(value.trim()).map_err(|_| CanvassError::malformed_amount(value))?;
    let rounded = round_decimal(currency, number)?;

    Ok(trim_to_numeric(&rounded))
}

/// Round an amount and return it as a new amount
pub fn round_amount(currency: &Currency, amount: &MoneyAmount) -> Result<MoneyAmount, CanvassError> {
    let rounded = round(currency, &amount.to_string())?;
    MoneyAmount::from_decimal_str(&rounded)
}

fn round_decimal(currency: &Currency, number: Decimal) -> Result<String, CanvassError> {
    let dp = currency.decimal_precision;

    match currency.rounding_algorithm {
        RoundingAlgorithm::Mathematical => {
            Ok(fixed(number, dp, RoundingStrategy::MidpointAwayFromZero))
        }
        RoundingAlgorithm::RoundUp => Ok(fixed(number, dp, RoundingStrategy::ToPositiveInfinity)),
        RoundingAlgorithm::RoundDown => Ok(fixed(number, dp, RoundingStrategy::ToZero)),
        RoundingAlgorithm::Argentinian => argentinian(number),
        RoundingAlgorithm::Swiss => swiss(number),
    }
}

/// Round to `dp` places with the given strategy, padding with zeros
fn fixed(number: Decimal, dp: u32, strategy: RoundingStrategy) -> String {
    let mut rounded = number.round_dp_with_strategy(dp, strategy);
    rounded.rescale(dp);
    unsigned_zero(rounded).to_string()
}

/// Third decimal: below 3 becomes 0, 3 to 7 becomes 5, 8 and up carries
///
/// Works on the magnitude so negative values mirror positive ones. Only the
/// fractional part is scaled, so any representable value can be rounded.
fn argentinian(number: Decimal) -> Result<String, CanvassError> {
    let (negative, whole, fraction) = subunit_magnitude(number);

    let hundredths = (fraction * Decimal::ONE_HUNDRED).trunc();
    let third = (fraction * Decimal::ONE_THOUSAND).trunc() % Decimal::TEN;

    let thousandths = if third < Decimal::from(3) {
        hundredths * Decimal::TEN
    } else if third < Decimal::from(8) {
        hundredths * Decimal::TEN + Decimal::from(5)
    } else {
        (hundredths + Decimal::ONE) * Decimal::TEN
    };

    signed_fixed(negative, whole, thousandths, 3)
}

/// Decimals two to four, read as `xy.z`: below 26 gives `.x0`, up to 75
/// gives `.x5`, above 75 carries into the tenths and gives `.x0`
fn swiss(number: Decimal) -> Result<String, CanvassError> {
    let (negative, whole, fraction) = subunit_magnitude(number);

    let tenths = (fraction * Decimal::TEN).trunc();
    let last_three = (fraction * Decimal::from(10_000)).trunc() % Decimal::ONE_THOUSAND;

    let hundredths = if last_three < Decimal::from(260) {
        tenths * Decimal::TEN
    } else if last_three <= Decimal::from(750) {
        tenths * Decimal::TEN + Decimal::from(5)
    } else {
        (tenths + Decimal::ONE) * Decimal::TEN
    };

    signed_fixed(negative, whole, hundredths, 2)
}

/// Mathematically round to four places and split into sign, whole part and
/// fractional part
fn subunit_magnitude(number: Decimal) -> (bool, Decimal, Decimal) {
    let rounded = number.round_dp_with_strategy(
        SUBUNIT_ROUNDING_PRECISION,
        RoundingStrategy::MidpointAwayFromZero,
    );
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let magnitude = rounded.abs();
    (negative, magnitude.trunc(), magnitude.fract())
}

/// Add a count of `10^-scale` units to the whole part as a fixed point string
fn signed_fixed(
    negative: bool,
    whole: Decimal,
    units: Decimal,
    scale: u32,
) -> Result<String, CanvassError> {
    let mut value = whole
        .checked_add(units / Decimal::from(10_u64.pow(scale)))
        .ok_or_else(|| CanvassError::arithmetic_overflow("round"))?;
    value.rescale(scale);

    if negative && !value.is_zero() {
        value.set_sign_negative(true);
    }
    Ok(unsigned_zero(value).to_string())
}

fn unsigned_zero(mut value: Decimal) -> Decimal {
    if value.is_zero() {
        value.set_sign_positive(true);
    }
    value
}

/// Trim any characters outside "0-9" from the end of a string
fn trim_to_numeric(text: &str) -> String {
    text.trim_end_matches(|c: char| !c.is_ascii_digit()).to_string()
}
