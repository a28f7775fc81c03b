//! Donation types and the donation workflow state machine
//!
//! A donation records money moving into (or, for redistribution debits, out
//! of) a poll. It starts `initial` while the payer goes through the gateway
//! and becomes `paid` exactly once.

use super::error::CanvassError;
use super::{DonationId, InvoiceNumber, PollId, UserId, SYSTEM_USER_ID};
use crate::money::MoneyAmount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name and e-mail recorded against redistribution donations
pub const SYSTEM_USER_LABEL: &str = "-";

/// Donation workflow states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationState {
    #[default]
    Initial,
    Paid,
}

/// Donation workflow events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationEvent {
    Pay,
}

impl DonationState {
    /// The state reached by applying `event`, if the pair is allowed
    pub fn transition(self, event: DonationEvent) -> Option<DonationState> {
        match (self, event) {
            (DonationState::Initial, DonationEvent::Pay) => Some(DonationState::Paid),
            _ => None,
        }
    }
}

impl fmt::Display for DonationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DonationState::Initial => "initial",
            DonationState::Paid => "paid",
        })
    }
}

impl fmt::Display for DonationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DonationEvent::Pay => "pay",
        })
    }
}

/// Payment gateway state carried by a donation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorisationTokens {
    /// Funds reserved on a card, not yet captured
    Authorised { authorization: String },
    /// Captured through the on-site flow
    Onsite { authorization: String },
    /// Purchased through an off-site checkout
    Offsite {
        payer_id: String,
        token: String,
        authorization: String,
    },
}

impl AuthorisationTokens {
    /// The gateway reference for this state
    pub fn authorization(&self) -> &str {
        match self {
            AuthorisationTokens::Authorised { authorization }
            | AuthorisationTokens::Onsite { authorization }
            | AuthorisationTokens::Offsite { authorization, .. } => authorization,
        }
    }
}

/// Who is paying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payer {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl Payer {
    pub fn new(id: UserId, name: &str, email: &str) -> Self {
        Payer {
            id,
            name: name.to_string(),
            email: email.to_string(),
        }
    }

    /// The sentinel owner of redistribution donations
    pub fn system() -> Self {
        Payer::new(SYSTEM_USER_ID, SYSTEM_USER_LABEL, SYSTEM_USER_LABEL)
    }
}

/// A donation to a poll
///
/// User and poll details are copied in so the record stands alone if either
/// is later removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donation {
    /// Assigned by the store on first save
    pub id: Option<DonationId>,

    pub amount: MoneyAmount,

    /// Currency code, copied from the poll
    pub currency: String,

    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,

    pub poll_id: PollId,
    pub poll_title: String,

    pub state: DonationState,

    /// Created by moving funds out of an expiring poll
    pub redistribution: bool,

    /// Removes `amount` from its poll rather than adding it
    pub debit: bool,

    /// Expired poll a redistribution credit came from
    pub source_poll_id: Option<PollId>,
    pub source_poll_title: Option<String>,

    pub invoice_number: Option<InvoiceNumber>,

    pub authorisation_tokens: Option<AuthorisationTokens>,

    pub notes: String,

    pub updated_at: DateTime<Utc>,
}

impl Donation {
    /// Create an unsaved, initial donation
    pub fn new(payer: &Payer, poll_id: PollId, poll_title: &str, currency: &str, amount: MoneyAmount) -> Self {
        Donation {
            id: None,
            amount,
            currency: currency.to_string(),
            user_id: payer.id,
            user_name: payer.name.clone(),
            user_email: payer.email.clone(),
            poll_id,
            poll_title: poll_title.to_string(),
            state: DonationState::Initial,
            redistribution: false,
            debit: false,
            source_poll_id: None,
            source_poll_title: None,
            invoice_number: None,
            authorisation_tokens: None,
            notes: String::new(),
            updated_at: Utc::now(),
        }
    }

    /// Apply an event, failing if the state machine does not allow it
    pub fn apply(&mut self, event: DonationEvent) -> Result<DonationState, CanvassError> {
        let next = self
            .state
            .transition(event)
            .ok_or_else(|| CanvassError::invalid_transition(&self.entity(), event, self.state))?;
        self.state = next;
        self.updated_at = Utc::now();
        Ok(next)
    }

    /// Check required fields and the credit amount rule
    pub fn validate(&self) -> Result<(), CanvassError> {
        let required = [
            ("user_name", &self.user_name),
            ("user_email", &self.user_email),
            ("poll_title", &self.poll_title),
            ("currency", &self.currency),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CanvassError::validation(field, "can't be blank"));
            }
        }

        let amount = self.amount.to_decimal()?;
        if !self.debit && amount <= rust_decimal::Decimal::ZERO {
            return Err(CanvassError::validation("amount", "must be greater than 0"));
        }
        Ok(())
    }

    pub fn is_initial(&self) -> bool {
        self.state == DonationState::Initial
    }

    /// Label used in transition errors, e.g. "donation 12"
    pub fn entity(&self) -> String {
        match self.id {
            Some(id) => format!("donation {}", id),
            None => "new donation".to_string(),
        }
    }
}
