//! Currency types for the canvass ledger
//!
//! A currency binds a rounding algorithm, an internal decimal precision and
//! display templates to a short code. It is the unit of account for polls and
//! donations.

use super::error::CanvassError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a currency name ("Native name (English name)")
pub const MAXLEN_NAME: usize = 160;
/// ISO 4217 codes have three letters
pub const MAXLEN_CODE: usize = 3;
/// Allows big integers (e.g. for Yen)
pub const MAXLEN_INTEGER_TEMPLATE: usize = 32;
pub const MAXLEN_DELIMITER: usize = 8;
pub const MAXLEN_FRACTION_TEMPLATE: usize = 16;
pub const MAXLEN_SYMBOL: usize = 16;

pub const DEFAULT_DECIMAL_PRECISION: u32 = 2;
pub const DEFAULT_SHOW_AFTER_NUMBER: bool = false;

/// Precision the five-cent style algorithms need to see their digits
pub const SUBUNIT_ROUNDING_PRECISION: u32 = 4;

/// Named rounding algorithms
///
/// Keys are stored against currencies as lowercase strings. An unknown key
/// falls back to [`RoundingAlgorithm::Mathematical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingAlgorithm {
    /// Round half away from zero
    #[default]
    Mathematical,
    /// Round toward positive infinity
    RoundUp,
    /// Truncate toward zero
    RoundDown,
    /// Third decimal becomes 0 or 5
    Argentinian,
    /// Second decimal becomes 0 or 5
    Swiss,
}

impl RoundingAlgorithm {
    /// All algorithms in their default listing order
    pub const ALL: [RoundingAlgorithm; 5] = [
        RoundingAlgorithm::Mathematical,
        RoundingAlgorithm::RoundUp,
        RoundingAlgorithm::RoundDown,
        RoundingAlgorithm::Argentinian,
        RoundingAlgorithm::Swiss,
    ];

    /// The key stored against a currency
    pub fn key(&self) -> &'static str {
        match self {
            RoundingAlgorithm::Mathematical => "mathematical",
            RoundingAlgorithm::RoundUp => "round_up",
            RoundingAlgorithm::RoundDown => "round_down",
            RoundingAlgorithm::Argentinian => "argentinian",
            RoundingAlgorithm::Swiss => "swiss",
        }
    }

    /// Short description of the algorithm for administrators
    pub fn hint(&self) -> &'static str {
        match self {
            RoundingAlgorithm::Mathematical => "ax: x < 5 -> x=0, x > 4 -> a+1, x=0",
            RoundingAlgorithm::RoundUp => "ax: x -> a+1, x=0",
            RoundingAlgorithm::RoundDown => "ax: x -> x=0",
            RoundingAlgorithm::Argentinian => {
                "0.0ax: x < 3 -> x=0; 2 < x < 8 -> x=5; x > 7 -> a+1, x=0"
            }
            RoundingAlgorithm::Swiss => {
                "0.axy: xy < 26 -> xy=00; 25 < xy < 76 -> xy=50; xy > 75 -> a+1, xy=00"
            }
        }
    }

    /// Resolve a stored key, falling back to mathematical rounding
    pub fn from_key_or_default(key: &str) -> Self {
        key.parse().unwrap_or_default()
    }

    /// Whether the algorithm requires [`SUBUNIT_ROUNDING_PRECISION`]
    pub fn needs_subunit_precision(&self) -> bool {
        matches!(self, RoundingAlgorithm::Argentinian | RoundingAlgorithm::Swiss)
    }
}

impl FromStr for RoundingAlgorithm {
    type Err = CanvassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        RoundingAlgorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.key() == key)
            .ok_or_else(|| CanvassError::validation("rounding_algorithm", "is not included in the list"))
    }
}

impl fmt::Display for RoundingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A currency and the fiscally correct way to round and print its values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    /// Unique code, e.g. "GBP"
    pub code: String,

    /// Display name
    pub name: String,

    /// Symbol printed before (or after) formatted values
    pub symbol: String,

    /// How values in this currency are rounded
    pub rounding_algorithm: RoundingAlgorithm,

    /// Decimal places used for internal rounding
    ///
    /// For the five-cent style algorithms this must be 4, so that rounding to
    /// four places does not disturb the digits they inspect. The rounded
    /// result always has equal or lower precision.
    pub decimal_precision: u32,

    /// Template for the integer part, e.g. "0,000,000"
    pub integer_template: String,

    /// Printed between integer and fraction
    pub delimiter: String,

    /// Template for the fraction part, e.g. "00"
    pub fraction_template: String,

    /// Print the symbol after the number rather than before it
    pub show_after_number: bool,
}

impl Currency {
    /// Create a currency with default precision, rounding and templates
    pub fn new(code: &str, name: &str, symbol: &str) -> Self {
        Currency {
            code: code.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            rounding_algorithm: RoundingAlgorithm::default(),
            decimal_precision: DEFAULT_DECIMAL_PRECISION,
            integer_template: "0,000,000,000,000".to_string(),
            delimiter: ".".to_string(),
            fraction_template: "00".to_string(),
            show_after_number: DEFAULT_SHOW_AFTER_NUMBER,
        }
    }

    /// Builder-style setter for the rounding algorithm and precision
    pub fn with_rounding(mut self, algorithm: RoundingAlgorithm, decimal_precision: u32) -> Self {
        self.rounding_algorithm = algorithm;
        self.decimal_precision = decimal_precision;
        self
    }

    /// Builder-style setter for the display templates
    pub fn with_templates(mut self, integer: &str, delimiter: &str, fraction: &str) -> Self {
        self.integer_template = integer.to_string();
        self.delimiter = delimiter.to_string();
        self.fraction_template = fraction.to_string();
        self
    }

    /// Builder-style setter for symbol placement
    pub fn with_symbol_after_number(mut self, show_after_number: bool) -> Self {
        self.show_after_number = show_after_number;
        self
    }

    /// Check field limits and algorithm/precision compatibility
    pub fn validate(&self) -> Result<(), CanvassError> {
        if self.name.trim().is_empty() {
            return Err(CanvassError::validation("name", "can't be blank"));
        }
        if self.code.trim().is_empty() {
            return Err(CanvassError::validation("code", "can't be blank"));
        }

        let limits = [
            ("name", &self.name, MAXLEN_NAME),
            ("code", &self.code, MAXLEN_CODE),
            ("symbol", &self.symbol, MAXLEN_SYMBOL),
            ("integer_template", &self.integer_template, MAXLEN_INTEGER_TEMPLATE),
            ("delimiter", &self.delimiter, MAXLEN_DELIMITER),
            ("fraction_template", &self.fraction_template, MAXLEN_FRACTION_TEMPLATE),
        ];
        for (field, value, limit) in limits {
            if value.chars().count() > limit {
                return Err(CanvassError::validation(
                    field,
                    &format!("is too long (maximum is {} characters)", limit),
                ));
            }
        }

        if self.rounding_algorithm.needs_subunit_precision()
            && self.decimal_precision != SUBUNIT_ROUNDING_PRECISION
        {
            return Err(CanvassError::validation(
                "decimal_precision",
                &format!(
                    "must be {} for {} rounding",
                    SUBUNIT_ROUNDING_PRECISION, self.rounding_algorithm
                ),
            ));
        }

        Ok(())
    }

    /// The currencies available when no currency file is supplied
    pub fn builtin() -> Vec<Currency> {
        vec![
            Currency::new("GBP", "Pound Sterling", "£"),
            Currency::new("USD", "US Dollar", "$"),
            Currency::new("EUR", "Euro", " €")
                .with_templates("0.000.000.000.000", ",", "00")
                .with_symbol_after_number(true),
            Currency::new("CHF", "Schweizer Franken (Swiss Franc)", "CHF ")
                .with_rounding(RoundingAlgorithm::Swiss, 4)
                .with_templates("0'000'000'000'000", ".", "00"),
            Currency::new("ARS", "Peso argentino (Argentine Peso)", "$")
                .with_rounding(RoundingAlgorithm::Argentinian, 4)
                .with_templates("0.000.000.000.000", ",", "000"),
            Currency::new("JPY", "日本円 (Japanese Yen)", "¥")
                .with_rounding(RoundingAlgorithm::Mathematical, 0)
                .with_templates("0,000,000,000,000", "", ""),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("mathematical", RoundingAlgorithm::Mathematical)]
    #[case("round_up", RoundingAlgorithm::RoundUp)]
    #[case("round_down", RoundingAlgorithm::RoundDown)]
    #[case("ARGENTINIAN", RoundingAlgorithm::Argentinian)]
    #[case(" swiss ", RoundingAlgorithm::Swiss)]
    fn test_parse_rounding_algorithm(#[case] key: &str, #[case] expected: RoundingAlgorithm) {
        assert_eq!(key.parse::<RoundingAlgorithm>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_algorithm_falls_back_to_mathematical() {
        assert!("bankers".parse::<RoundingAlgorithm>().is_err());
        assert_eq!(
            RoundingAlgorithm::from_key_or_default("bankers"),
            RoundingAlgorithm::Mathematical
        );
    }

    #[test]
    fn test_builtin_currencies_are_valid() {
        let currencies = Currency::builtin();
        assert_eq!(currencies.len(), 6);
        for currency in &currencies {
            currency.validate().unwrap();
        }
    }

    #[rstest]
    #[case::blank_name(Currency::new("GBP", "  ", "£"), "name")]
    #[case::long_code(Currency::new("GBPX", "Pounds", "£"), "code")]
    #[case::swiss_precision(
        Currency::new("CHF", "Franc", "F").with_rounding(RoundingAlgorithm::Swiss, 2),
        "decimal_precision"
    )]
    #[case::argentinian_precision(
        Currency::new("ARS", "Peso", "$").with_rounding(RoundingAlgorithm::Argentinian, 3),
        "decimal_precision"
    )]
    fn test_validation_failures(#[case] currency: Currency, #[case] field: &str) {
        let error = currency.validate().unwrap_err();
        assert_eq!(error.field(), Some(field));
    }
}
