//! Poll workflow and fund redistribution
//!
//! This module provides poll administration (create, update, destroy) and the
//! poll state machine. Moving a poll with votes to `expired` redistributes its
//! total across the other open polls in the same currency.
//!
//! # Redistribution
//!
//! The expiring poll's total is debited in one redistribution donation and
//! credited to each recipient in turn. With `N` recipients left, the next one
//! receives `round(remaining / N)` in the currency's rounding; the last one
//! receives exactly what remains. Rounding therefore never creates or loses
//! money, and anything short of an exact zero remainder aborts the whole
//! transaction.
//!
//! # Locking
//!
//! The expiring poll and every candidate recipient are locked together in
//! ascending id order before anything is read for the calculation, so
//! concurrent expiries and payments cannot deadlock. Candidates are
//! re-checked once locked.

use crate::core::donation_workflow::pay;
use crate::core::store::{MemoryStore, Transaction};
use crate::money::{round_amount, MoneyAmount};
use crate::types::{CanvassError, Donation, Payer, Poll, PollEvent, PollId, PollState};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Editable poll fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct PollChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub currency: Option<String>,
}

/// Create a poll, open with zero total and votes
///
/// # Errors
///
/// - `Validation` for blank or over-long fields
/// - `CurrencyNotFound` if the currency code is unknown
/// - `DuplicatePoll` if the id is taken
pub fn create_poll(store: &MemoryStore, mut poll: Poll) -> Result<Poll, CanvassError> {
    poll.validate()?;
    if store.currency(&poll.currency).is_none() {
        return Err(CanvassError::currency_not_found(&poll.currency));
    }

    poll.state = PollState::Open;
    poll.total = MoneyAmount::zero();
    poll.votes = 0;

    store.transaction(|tx| tx.insert_poll(poll.clone()))?;
    info!(poll = poll.id, currency = %poll.currency, "Poll opened");
    Ok(poll)
}

/// Edit a poll's title, description or currency
///
/// The currency is fixed once the poll has votes.
pub fn update_poll(
    store: &MemoryStore,
    poll_id: PollId,
    changes: PollChanges,
) -> Result<Poll, CanvassError> {
    store.transaction(|tx| {
        let mut poll = tx
            .lock_poll(poll_id)
            .ok_or(CanvassError::PollNotFound { poll: poll_id })?;

        if let Some(currency) = changes.currency {
            if currency != poll.currency {
                if poll.votes > 0 {
                    return Err(CanvassError::CurrencyChangeForbidden {
                        poll: poll.id,
                        votes: poll.votes,
                    });
                }
                tx.currency(&currency)?;
                poll.currency = currency;
            }
        }
        if let Some(title) = changes.title {
            poll.title = title;
        }
        if let Some(description) = changes.description {
            poll.description = description;
        }

        poll.validate()?;
        tx.put_poll(poll.clone());
        Ok(poll)
    })
}

/// Delete a poll that has no donations
pub fn destroy_poll(store: &MemoryStore, poll_id: PollId) -> Result<Poll, CanvassError> {
    store.transaction(|tx| {
        let poll = tx
            .lock_poll(poll_id)
            .ok_or(CanvassError::PollNotFound { poll: poll_id })?;

        let donations = tx.donation_count(poll_id);
        if donations > 0 {
            return Err(CanvassError::PollHasDonations {
                poll: poll_id,
                donations,
            });
        }

        tx.delete_poll(poll_id);
        info!(poll = poll_id, "Poll destroyed");
        Ok(poll)
    })
}

/// Events an administrator may apply to a poll next
pub fn allowed_events(store: &MemoryStore, poll_id: PollId) -> Result<Vec<PollEvent>, CanvassError> {
    store
        .poll(poll_id)
        .map(|poll| poll.state.allowed_events())
        .ok_or(CanvassError::PollNotFound { poll: poll_id })
}

/// Apply a workflow event to a poll in its own transaction
///
/// # Arguments
///
/// * `store` - The store holding the poll
/// * `poll_id` - Poll to change
/// * `event` - `underway`, `complete` or `expire`
///
/// # Returns
///
/// The poll as committed
///
/// # Errors
///
/// - `PollNotFound` if the poll does not exist
/// - `InvalidTransition` if the event is not allowed from the poll's state
/// - `NoOtherOpenPolls` if an expiring poll with votes has nowhere to send
///   its funds
/// - `RedistributionArithmeticFailure` if redistribution left a remainder
pub fn transition(
    store: &MemoryStore,
    poll_id: PollId,
    event: PollEvent,
) -> Result<Poll, CanvassError> {
    let poll = store.transaction(|tx| match event {
        PollEvent::Expire => expire(tx, poll_id),
        _ => {
            let mut poll = tx
                .lock_poll(poll_id)
                .ok_or(CanvassError::PollNotFound { poll: poll_id })?;
            poll.state = next_state(&poll, event)?;
            tx.put_poll(poll.clone());
            Ok(poll)
        }
    });

    match &poll {
        Ok(poll) => info!(poll = poll.id, %event, state = %poll.state, "Poll transition"),
        Err(error) => warn!(poll = poll_id, %event, %error, "Poll transition refused"),
    }
    poll
}

fn next_state(poll: &Poll, event: PollEvent) -> Result<PollState, CanvassError> {
    poll.state
        .transition(event)
        .ok_or_else(|| CanvassError::invalid_transition(&poll.entity(), event, poll.state))
}

/// Expire a poll inside `tx`, redistributing its funds
fn expire(tx: &mut Transaction<'_>, poll_id: PollId) -> Result<Poll, CanvassError> {
    let snapshot = tx
        .find_poll(poll_id)
        .ok_or(CanvassError::PollNotFound { poll: poll_id })?;

    let mut lock_ids: BTreeSet<PollId> = tx.open_poll_ids(&snapshot.currency).into_iter().collect();
    lock_ids.insert(poll_id);

    let mut locked: BTreeMap<PollId, Poll> = BTreeMap::new();
    for id in lock_ids {
        if let Some(poll) = tx.lock_poll(id) {
            locked.insert(id, poll);
        }
    }

    let mut poll = locked
        .remove(&poll_id)
        .ok_or(CanvassError::PollNotFound { poll: poll_id })?;
    let target = next_state(&poll, PollEvent::Expire)?;

    if poll.votes == 0 {
        poll.state = target;
        tx.put_poll(poll.clone());
        return Ok(poll);
    }

    let recipients: Vec<Poll> = locked
        .into_values()
        .filter(|p| p.state == PollState::Open && p.currency == poll.currency)
        .collect();
    if recipients.is_empty() {
        return Err(CanvassError::no_other_open_polls(poll.id, &poll.currency));
    }

    redistribute(tx, &poll, &recipients)?;

    poll.votes += 1;
    poll.total = MoneyAmount::zero();
    poll.state = target;
    tx.put_poll(poll.clone());
    Ok(poll)
}

/// Debit `source` and credit its total across `recipients` in order
fn redistribute(
    tx: &mut Transaction<'_>,
    source: &Poll,
    recipients: &[Poll],
) -> Result<(), CanvassError> {
    let system = Payer::system();

    let mut debit = Donation::new(
        &system,
        source.id,
        &source.title,
        &source.currency,
        source.total.clone(),
    );
    debit.redistribution = true;
    debit.debit = true;
    pay(tx, &mut debit)?;

    let mut remaining = source.total.clone();
    for (index, recipient) in recipients.iter().enumerate() {
        let left = recipients.len() - index;
        let share = if left == 1 {
            remaining.clone()
        } else {
            let currency = tx.currency(&recipient.currency)?;
            let share = round_amount(&currency, &remaining.divide(left)?)?;
            // Rounding up an off-grid remainder can overshoot it
            if share.to_decimal()? > remaining.to_decimal()? {
                remaining.clone()
            } else {
                share
            }
        };

        if !share.is_zero() {
            let mut credit = Donation::new(
                &system,
                recipient.id,
                &recipient.title,
                &recipient.currency,
                share.clone(),
            );
            credit.redistribution = true;
            credit.source_poll_id = Some(source.id);
            credit.source_poll_title = Some(source.title.clone());
            pay(tx, &mut credit)?;
        }

        remaining = remaining.subtract(&share)?;
    }

    if !remaining.to_decimal()?.is_zero() {
        return Err(CanvassError::RedistributionArithmeticFailure {
            poll: source.id,
            remaining: remaining.to_string(),
        });
    }

    info!(
        poll = source.id,
        total = %source.total,
        recipients = recipients.len(),
        "Redistributed expired poll"
    );
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::core::donation_workflow::{generate, save, settle, DonationOptions};
    use crate::types::{Currency, RoundingAlgorithm};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    proptest! {
        #[test]
        fn redistribution_conserves_any_total(
            minor in 1i64..1_000_000_000i64,
            scale in 0u32..=4u32,
            recipients in 1u32..8u32,
            algorithm in proptest::sample::select(RoundingAlgorithm::ALL.to_vec())
        ) {
            let precision = if algorithm.needs_subunit_precision() { 4 } else { 2 };
            let currency = Currency::new("TST", "Test", "T").with_rounding(algorithm, precision);
            let store = MemoryStore::with_currencies(vec![currency]).unwrap();
            for id in 1..=recipients + 1 {
                create_poll(&store, Poll::new(id, "Poll", "Description", "TST", 1)).unwrap();
            }

            let amount = Decimal::new(minor, scale);
            let text = amount.to_string();
            let (integer, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
            let payer = Payer::new(7, "Eve", "eve@example.com");
            let mut donation =
                generate(&store, 1, &payer, integer, fraction, &DonationOptions::external()).unwrap();
            let id = save(&store, &mut donation).unwrap();
            settle(&store, id, None).unwrap();

            transition(&store, 1, PollEvent::Expire).unwrap();

            let polls = store.polls();
            let redistributed: Decimal = polls
                .iter()
                .filter(|p| p.id != 1)
                .map(|p| p.total.to_decimal().unwrap())
                .sum();
            prop_assert_eq!(redistributed, amount);
            prop_assert!(store.poll(1).unwrap().total.is_zero());
            prop_assert!(polls.iter().all(|p| p.total.to_decimal().unwrap() >= Decimal::ZERO));
        }
    }
}
