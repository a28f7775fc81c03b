//! canvass-ledger
//!
//! # Overview
//!
//! The money engine of a donation platform: exact decimal amounts, per-currency
//! rounding and formatting, donation and poll lifecycles, and loss-free
//! redistribution of an expired poll's funds to the other open polls in its
//! currency. A CLI replays ledger scripts through a sync or an async strategy.
//!
//! # Architecture
//!
//! - [`money`] - Exact amounts, rounding algorithms and currency formatting
//! - [`types`] - Domain types (Currency, Poll, Donation, errors, script records)
//! - [`core`] - Business logic:
//!   - [`core::store`] - Transactional store with pessimistic row locks
//!   - [`core::donation_workflow`] - `initial` → `paid`
//!   - [`core::poll_workflow`] - `open` → `underway` → `completed`, or `expired`
//!     with redistribution
//!   - [`core::payment`] - Payment gateway and notification seams
//!   - [`core::collector`] - Removal of abandoned donations
//!   - [`core::engine`] - Ledger script replay
//! - [`io`] - CSV script reading, currency files and poll output
//! - [`strategy`] - Sync and async replay pipelines
//! - [`cli`] - Argument parsing and logging setup
//!
//! # Money
//!
//! Amounts are carried as `(integer, fraction)` digit strings and computed
//! with exact decimals. Nothing is rounded until it is shown to a person or
//! sent to a gateway, so redistribution always conserves the total:
//!
//! ```
//! use canvass_ledger::money::{divide, format};
//! use canvass_ledger::types::Currency;
//!
//! let (integer, fraction) = divide("100", "", 3_i64).unwrap();
//! assert_eq!(integer, "33");
//! assert!(fraction.starts_with("3333"));
//!
//! let swiss = Currency::builtin().into_iter().find(|c| c.code == "CHF").unwrap();
//! assert_eq!(format(&swiss, "1234.5371").unwrap(), "CHF 1'234.55");
//! ```

pub mod cli;
pub mod core;
pub mod io;
pub mod money;
pub mod strategy;
pub mod types;

pub use core::{LedgerEngine, MemoryStore};
pub use io::write_polls_csv;
pub use money::MoneyAmount;
pub use types::{CanvassError, Currency, Donation, LedgerRecord, Poll, PollState};
