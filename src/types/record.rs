//! Ledger script records
//!
//! One record is one row of a ledger script: a poll administration step or a
//! donation step, as replayed by [`crate::core::LedgerEngine`].

use super::{PollId, UserId};
use crate::money::MoneyAmount;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operations a ledger script can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerOperation {
    /// Create a poll
    Open,
    /// Start an in-flight (initial) donation
    Pledge,
    /// Settle the user's in-flight donation to the poll
    Pay,
    /// Record an external donation and settle it at once
    Donate,
    /// Poll transitions
    Underway,
    Complete,
    Expire,
}

impl LedgerOperation {
    /// Poll-level operations that must not run alongside donation rows
    ///
    /// Donation rows between two barriers may be reordered across users but
    /// never across a barrier.
    pub fn is_barrier(&self) -> bool {
        matches!(
            self,
            LedgerOperation::Open
                | LedgerOperation::Underway
                | LedgerOperation::Complete
                | LedgerOperation::Expire
        )
    }

    pub fn needs_amount(&self) -> bool {
        matches!(self, LedgerOperation::Pledge | LedgerOperation::Donate)
    }
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LedgerOperation::Open => "open",
            LedgerOperation::Pledge => "pledge",
            LedgerOperation::Pay => "pay",
            LedgerOperation::Donate => "donate",
            LedgerOperation::Underway => "underway",
            LedgerOperation::Complete => "complete",
            LedgerOperation::Expire => "expire",
        })
    }
}

/// A validated ledger script row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub op: LedgerOperation,

    pub poll: PollId,

    /// Poll owner for `open`, payer for donation rows
    pub user: UserId,

    /// Required for `pledge` and `donate`
    pub amount: Option<MoneyAmount>,

    /// Required for `open`
    pub currency: Option<String>,

    /// Poll title for `open`
    pub title: Option<String>,
}
