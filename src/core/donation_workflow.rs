//! Donation workflow
//!
//! This module provides the operations that move a donation from `initial` to
//! `paid` and keep the owning poll's total and vote count in step with it.
//!
//! The workflow is responsible for:
//! - Building donations against open polls
//! - Enforcing a single in-flight donation per user
//! - Crediting the poll under its row lock when a donation is paid
//! - Numbering settled donations from the invoice sequence
//!
//! # Design
//!
//! [`pay`] never opens a transaction of its own. It runs inside the caller's
//! [`Transaction`] so that payment, the poll credit and anything else the
//! caller does (taking an invoice number, a gateway capture, a whole
//! redistribution) commit or roll back together.

use crate::core::store::{MemoryStore, Transaction};
use crate::money::MoneyAmount;
use crate::types::{
    CanvassError, Donation, DonationEvent, DonationId, Payer, PollId, PollState, UserId,
};
use chrono::Utc;
use tracing::{debug, info};

/// Options for [`generate`]
#[derive(Debug, Clone, Default)]
pub struct DonationOptions {
    /// Created by an administrator rather than the payer; the payer's other
    /// in-flight donations are left alone
    pub external: bool,

    /// Overrides the payer's name (external donations)
    pub user_name: Option<String>,

    /// Overrides the payer's e-mail (external donations)
    pub user_email: Option<String>,

    pub notes: Option<String>,
}

impl DonationOptions {
    /// Options for an administrative donation
    pub fn external() -> Self {
        DonationOptions {
            external: true,
            ..DonationOptions::default()
        }
    }
}

/// Build an unsaved donation to an open poll
///
/// Unless `options.external` is set, the payer's existing in-flight
/// donations are destroyed first, in one transaction.
///
/// # Arguments
///
/// * `store` - The store holding the poll
/// * `poll_id` - Poll to donate to
/// * `payer` - Who is paying
/// * `integer`, `fraction` - The amount, cleaned with [`MoneyAmount::parse`]
/// * `options` - External flag and overrides
///
/// # Returns
///
/// A donation with no id, in the poll's currency
///
/// # Errors
///
/// - `PollNotFound` if the poll does not exist
/// - `PollNotOpen` if it does not accept donations
/// - `MalformedAmount` if the amount cannot be represented exactly
pub fn generate(
    store: &MemoryStore,
    poll_id: PollId,
    payer: &Payer,
    integer: &str,
    fraction: &str,
    options: &DonationOptions,
) -> Result<Donation, CanvassError> {
    let poll = store
        .poll(poll_id)
        .ok_or(CanvassError::PollNotFound { poll: poll_id })?;
    if poll.state != PollState::Open {
        return Err(CanvassError::poll_not_open(poll.id, poll.state));
    }

    let amount = MoneyAmount::parse(integer, fraction)?;

    if !options.external {
        destroy_initial_for(store, payer.id)?;
    }

    let mut donation = Donation::new(payer, poll.id, &poll.title, &poll.currency, amount);
    if options.external {
        if let Some(name) = &options.user_name {
            donation.user_name = name.clone();
        }
        if let Some(email) = &options.user_email {
            donation.user_email = email.clone();
        }
    }
    if let Some(notes) = &options.notes {
        donation.notes = notes.clone();
    }

    Ok(donation)
}

/// Validate and store a donation, inserting or updating it
///
/// A new donation gets its id here; it is written back into `donation`.
/// Only donations still `initial` in the store can be updated.
pub fn save(store: &MemoryStore, donation: &mut Donation) -> Result<DonationId, CanvassError> {
    donation.validate()?;
    donation.updated_at = Utc::now();

    let id = store.transaction(|tx| {
        if let Some(id) = donation.id {
            let stored = tx
                .lock_donation(id)
                .ok_or(CanvassError::DonationNotFound { donation: id })?;
            if !stored.is_initial() {
                return Err(CanvassError::invalid_transition(
                    &stored.entity(),
                    "save",
                    stored.state,
                ));
            }
        }
        Ok(tx.put_donation(donation.clone()))
    })?;

    donation.id = Some(id);
    debug!(donation = id, "Saved donation");
    Ok(id)
}

/// Mark a donation paid inside `tx`, crediting its poll
///
/// Debit donations only change state; the caller adjusts the poll.
///
/// # Errors
///
/// - `InvalidTransition` if the donation is already paid
/// - `PollVanished` if the poll was deleted since the donation was made
/// - `PollNotOpen` if the poll stopped accepting donations
pub fn pay(tx: &mut Transaction<'_>, donation: &mut Donation) -> Result<(), CanvassError> {
    donation.apply(DonationEvent::Pay)?;

    if !donation.debit {
        let mut poll = tx
            .lock_poll(donation.poll_id)
            .ok_or(CanvassError::PollVanished {
                poll: donation.poll_id,
            })?;
        if poll.state != PollState::Open {
            return Err(CanvassError::poll_not_open(poll.id, poll.state));
        }

        poll.votes += 1;
        poll.total = poll.total.add(&donation.amount)?;
        tx.put_poll(poll);
    }

    let id = tx.put_donation(donation.clone());
    donation.id = Some(id);

    info!(
        donation = id,
        poll = donation.poll_id,
        amount = %donation.amount,
        debit = donation.debit,
        "Donation paid"
    );
    Ok(())
}

/// Pay a stored donation in its own transaction with a new invoice number
///
/// Used for administrative donations that need no gateway.
pub fn settle(
    store: &MemoryStore,
    donation_id: DonationId,
    notes: Option<&str>,
) -> Result<Donation, CanvassError> {
    store.transaction(|tx| {
        let mut donation = tx
            .lock_donation(donation_id)
            .ok_or(CanvassError::DonationNotFound {
                donation: donation_id,
            })?;

        donation.invoice_number = Some(tx.next_invoice_number());
        if let Some(notes) = notes {
            donation.notes = notes.to_string();
        }

        pay(tx, &mut donation)?;
        Ok(donation)
    })
}

/// Store a new donation as paid in one transaction
///
/// Nothing is stored, and no invoice number is used, if payment fails.
pub fn save_paid(store: &MemoryStore, mut donation: Donation) -> Result<Donation, CanvassError> {
    donation.validate()?;
    donation.id = None;

    store.transaction(move |tx| {
        donation.invoice_number = Some(tx.next_invoice_number());
        pay(tx, &mut donation)?;
        Ok(donation)
    })
}

/// Remove all of a user's in-flight donations in one transaction
///
/// # Returns
///
/// The removed donations, so callers can release any gateway holds
pub fn destroy_initial_for(
    store: &MemoryStore,
    user_id: UserId,
) -> Result<Vec<Donation>, CanvassError> {
    let removed = store.transaction(|tx| {
        let mut removed = Vec::new();
        for id in tx.initial_donation_ids(user_id) {
            if let Some(donation) = tx.lock_donation(id).filter(Donation::is_initial) {
                tx.delete_donation(id);
                removed.push(donation);
            }
        }
        Ok(removed)
    })?;

    if !removed.is_empty() {
        debug!(user = user_id, count = removed.len(), "Destroyed in-flight donations");
    }
    Ok(removed)
}
