//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `currency`: Currencies and rounding algorithm keys
//! - `poll`: Polls and the poll state machine
//! - `donation`: Donations, payers and gateway tokens
//! - `record`: Ledger script rows
//! - `error`: Error types for the ledger

pub mod currency;
pub mod donation;
pub mod error;
pub mod poll;
pub mod record;

pub use currency::{Currency, RoundingAlgorithm};
pub use donation::{AuthorisationTokens, Donation, DonationEvent, DonationState, Payer};
pub use error::CanvassError;
pub use poll::{Poll, PollEvent, PollState};
pub use record::{LedgerOperation, LedgerRecord};

/// Poll identifier
pub type PollId = u32;

/// Donation identifier, assigned by the store
pub type DonationId = u64;

/// User identifier
pub type UserId = u32;

/// Invoice number from the store's sequence
pub type InvoiceNumber = u64;

/// Owner of redistribution donations
pub const SYSTEM_USER_ID: UserId = 0;
