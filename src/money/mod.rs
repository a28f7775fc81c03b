//! Money module
//!
//! Exact decimal arithmetic over integer/fraction string pairs, currency
//! rounding and display formatting.
//!
//! # Components
//!
//! - `amount` - Money amounts and the four arithmetic operations
//! - `rounding` - The five named rounding algorithms
//! - `format` - Template based display and gateway unit conversion

pub mod amount;
pub mod format;
pub mod rounding;

pub use amount::{add, divide, multiply, simplify, subtract, MoneyAmount, Scalar};
pub use format::{amount_for_gateway, amount_for_humans, compose, format};
pub use rounding::{round, round_amount};
