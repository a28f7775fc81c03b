//! Error types for the canvass ledger
//!
//! This module defines all error types that can occur while handling money,
//! currencies, polls and donations.
//!
//! # Error Categories
//!
//! - **Validation Errors**: malformed amounts, missing fields, forbidden edits
//! - **Business-Rule Failures**: poll not open, poll vanished, no open polls to
//!   receive redistributed funds
//! - **Gateway Errors**: payment gateway refusals, and the distinguished
//!   "charged but not recorded" case that needs manual reconciliation
//! - **Fatal Errors**: redistribution arithmetic failure, decimal overflow
//! - **I/O and Parsing Errors**: ledger script and currency file handling

use crate::types::{DonationId, PollId};
use thiserror::Error;

/// Main error type for the canvass ledger
///
/// Every variant carries enough context to produce a message suitable for an
/// operator. Errors raised inside a store transaction roll that transaction
/// back before they reach the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CanvassError {
    /// A field failed validation
    #[error("{field} {message}")]
    Validation {
        /// Attribute the message belongs to
        field: String,
        /// Human readable reason
        message: String,
    },

    /// A money amount could not be parsed or represented exactly
    #[error("Invalid amount '{amount}'")]
    MalformedAmount {
        /// The offending amount text
        amount: String,
    },

    /// Decimal arithmetic exceeded the representable range
    #[error("Arithmetic overflow in {operation}")]
    ArithmeticOverflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Division by a zero scalar
    #[error("Division by zero while dividing {amount}")]
    DivisionByZero {
        /// The dividend
        amount: String,
    },

    /// No currency with the given code exists
    #[error("Currency '{code}' not found")]
    CurrencyNotFound {
        /// Currency code
        code: String,
    },

    /// A currency with the given code already exists
    #[error("Currency '{code}' already exists")]
    DuplicateCurrency {
        /// Currency code
        code: String,
    },

    /// Currency is referenced by polls or donations and cannot be removed
    #[error("Currency '{code}' is used by {polls} poll(s) and {donations} donation(s)")]
    CurrencyInUse {
        /// Currency code
        code: String,
        /// Number of referencing polls
        polls: usize,
        /// Number of referencing donations
        donations: usize,
    },

    /// The last remaining currency cannot be removed
    #[error("Currency '{code}' is the last remaining currency")]
    LastCurrency {
        /// Currency code
        code: String,
    },

    /// No poll with the given ID exists
    #[error("Poll {poll} not found")]
    PollNotFound {
        /// Poll ID
        poll: PollId,
    },

    /// A poll with the given ID already exists
    #[error("Poll {poll} already exists")]
    DuplicatePoll {
        /// Poll ID
        poll: PollId,
    },

    /// The poll a donation belongs to disappeared before payment
    #[error("Poll {poll} has vanished")]
    PollVanished {
        /// Poll ID
        poll: PollId,
    },

    /// The poll is not accepting donations
    #[error("Poll {poll} is not open ({state})")]
    PollNotOpen {
        /// Poll ID
        poll: PollId,
        /// Current workflow state
        state: String,
    },

    /// A poll with donations cannot be destroyed
    #[error("Poll {poll} has {donations} donation(s) and cannot be destroyed")]
    PollHasDonations {
        /// Poll ID
        poll: PollId,
        /// Number of donations referencing the poll
        donations: usize,
    },

    /// A poll's currency cannot change once it has counted votes
    #[error("Poll {poll} has {votes} vote(s); its currency cannot change")]
    CurrencyChangeForbidden {
        /// Poll ID
        poll: PollId,
        /// Current vote count
        votes: u64,
    },

    /// Expiry would have nowhere to send the poll's funds
    #[error("Poll {poll} cannot expire: no other open polls use currency '{currency}'")]
    NoOtherOpenPolls {
        /// Poll ID
        poll: PollId,
        /// Currency code
        currency: String,
    },

    /// Redistribution left money behind
    #[error("Internal mathematical error during redistribution of poll {poll}: {remaining} left over")]
    RedistributionArithmeticFailure {
        /// Poll ID
        poll: PollId,
        /// Residual amount
        remaining: String,
    },

    /// The requested event is not valid from the current state
    #[error("Cannot {event} {entity} in state {state}")]
    InvalidTransition {
        /// Entity kind and ID, e.g. "poll 3"
        entity: String,
        /// Event name
        event: String,
        /// Current state name
        state: String,
    },

    /// No donation with the given ID exists
    #[error("Donation {donation} not found")]
    DonationNotFound {
        /// Donation ID
        donation: DonationId,
    },

    /// The payment gateway refused an operation; nothing was charged
    #[error("Payment gateway error: {message}")]
    Gateway {
        /// Gateway message
        message: String,
    },

    /// Money moved at the gateway but the local records were not updated
    #[error("Donation {donation} was charged but could not be recorded: {message}")]
    ChargedButNotRecorded {
        /// Donation ID
        donation: DonationId,
        /// Description of the local failure
        message: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error occurred
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl From<std::io::Error> for CanvassError {
    fn from(error: std::io::Error) -> Self {
        CanvassError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for CanvassError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        CanvassError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl CanvassError {
    /// Create a Validation error
    pub fn validation(field: &str, message: &str) -> Self {
        CanvassError::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a MalformedAmount error
    pub fn malformed_amount(amount: &str) -> Self {
        CanvassError::MalformedAmount {
            amount: amount.to_string(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str) -> Self {
        CanvassError::ArithmeticOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create a DivisionByZero error
    pub fn division_by_zero(amount: &str) -> Self {
        CanvassError::DivisionByZero {
            amount: amount.to_string(),
        }
    }

    /// Create a CurrencyNotFound error
    pub fn currency_not_found(code: &str) -> Self {
        CanvassError::CurrencyNotFound {
            code: code.to_string(),
        }
    }

    /// Create a PollNotOpen error
    pub fn poll_not_open(poll: PollId, state: impl ToString) -> Self {
        CanvassError::PollNotOpen {
            poll,
            state: state.to_string(),
        }
    }

    /// Create a NoOtherOpenPolls error
    pub fn no_other_open_polls(poll: PollId, currency: &str) -> Self {
        CanvassError::NoOtherOpenPolls {
            poll,
            currency: currency.to_string(),
        }
    }

    /// Create an InvalidTransition error
    pub fn invalid_transition(entity: &str, event: impl ToString, state: impl ToString) -> Self {
        CanvassError::InvalidTransition {
            entity: entity.to_string(),
            event: event.to_string(),
            state: state.to_string(),
        }
    }

    /// Create a Gateway error
    pub fn gateway(message: &str) -> Self {
        CanvassError::Gateway {
            message: message.to_string(),
        }
    }

    /// The record attribute a validation-style error should be reported against
    ///
    /// Business-rule failures that block a form submission are attributed to a
    /// field so callers can render them next to the input that caused them.
    pub fn field(&self) -> Option<&str> {
        match self {
            CanvassError::Validation { field, .. } => Some(field.as_str()),
            CanvassError::MalformedAmount { .. } => Some("amount"),
            CanvassError::CurrencyChangeForbidden { .. } => Some("currency"),
            CanvassError::NoOtherOpenPolls { .. } => Some("workflow_state"),
            _ => None,
        }
    }

    /// Whether the error may leave money captured without a local record
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, CanvassError::ChargedButNotRecorded { .. })
    }
}
