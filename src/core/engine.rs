//! Ledger script engine
//!
//! This module provides the `LedgerEngine` that replays ledger script records
//! against a `MemoryStore`, routing each row to the poll or donation workflow.
//!
//! The engine holds no state of its own beyond the store, so a single engine
//! can be shared behind an `Arc` by concurrent workers; every operation takes
//! `&self` and serialises through the store's row locks.

use crate::core::donation_workflow::{generate, save, save_paid, settle, DonationOptions};
use crate::core::poll_workflow::{create_poll, transition};
use crate::core::store::MemoryStore;
use crate::types::{
    CanvassError, Currency, Donation, LedgerOperation, LedgerRecord, Payer, Poll, PollEvent,
    PollId, UserId,
};
use tracing::debug;

/// Ledger script engine
///
/// Replays `LedgerRecord`s against its store.
#[derive(Debug)]
pub struct LedgerEngine {
    store: MemoryStore,
}

impl LedgerEngine {
    /// Create an engine over a fresh store holding `currencies`
    ///
    /// # Errors
    ///
    /// Returns an error if a currency is invalid or listed twice.
    pub fn new(currencies: Vec<Currency>) -> Result<Self, CanvassError> {
        Ok(LedgerEngine {
            store: MemoryStore::with_currencies(currencies)?,
        })
    }

    pub fn with_store(store: MemoryStore) -> Self {
        LedgerEngine { store }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Process a single ledger record
    ///
    /// # Arguments
    ///
    /// * `record` - The ledger record to apply
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the operation was applied
    /// * `Err(CanvassError)` if it was refused; the store is left unchanged
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A required column is missing
    /// - The poll does not exist, or exists already for `open`
    /// - The poll is not open for donation rows
    /// - `pay` finds no in-flight donation from the user to the poll
    /// - The transition is not allowed, or an expiry has nowhere to send funds
    pub fn process(&self, record: LedgerRecord) -> Result<(), CanvassError> {
        debug!(op = %record.op, poll = record.poll, user = record.user, "Processing record");

        match record.op {
            LedgerOperation::Open => self.open(record),
            LedgerOperation::Pledge => {
                let mut donation = self.donation(record, DonationOptions::default())?;
                save(&self.store, &mut donation).map(|_| ())
            }
            LedgerOperation::Pay => self.pay(record.poll, record.user),
            LedgerOperation::Donate => {
                let donation = self.donation(record, DonationOptions::external())?;
                save_paid(&self.store, donation).map(|_| ())
            }
            LedgerOperation::Underway => self.transition(record.poll, PollEvent::Underway),
            LedgerOperation::Complete => self.transition(record.poll, PollEvent::Complete),
            LedgerOperation::Expire => self.transition(record.poll, PollEvent::Expire),
        }
    }

    /// Get all polls for final output, sorted by id
    pub fn polls(&self) -> Vec<Poll> {
        self.store.polls()
    }

    fn open(&self, record: LedgerRecord) -> Result<(), CanvassError> {
        let currency = record
            .currency
            .ok_or_else(|| CanvassError::validation("currency", "can't be blank"))?;
        let title = record
            .title
            .unwrap_or_else(|| format!("Poll {}", record.poll));

        create_poll(
            &self.store,
            Poll::new(record.poll, &title, &title, &currency, record.user),
        )?;
        Ok(())
    }

    fn donation(
        &self,
        record: LedgerRecord,
        options: DonationOptions,
    ) -> Result<Donation, CanvassError> {
        let amount = record
            .amount
            .ok_or_else(|| CanvassError::validation("amount", "can't be blank"))?;

        generate(
            &self.store,
            record.poll,
            &script_payer(record.user),
            &amount.integer,
            &amount.fraction,
            &options,
        )
    }

    fn pay(&self, poll_id: PollId, user_id: UserId) -> Result<(), CanvassError> {
        let in_flight = self.store.transaction(|tx| {
            Ok(tx
                .initial_donation_ids(user_id)
                .into_iter()
                .rev()
                .find(|id| tx.find_donation(*id).is_some_and(|d| d.poll_id == poll_id)))
        })?;

        let id = in_flight.ok_or_else(|| {
            CanvassError::validation("donation", "no donation in flight for this poll")
        })?;
        settle(&self.store, id, None)?;
        Ok(())
    }

    fn transition(&self, poll_id: PollId, event: PollEvent) -> Result<(), CanvassError> {
        transition(&self.store, poll_id, event).map(|_| ())
    }
}

/// Payer details for a script user
fn script_payer(user_id: UserId) -> Payer {
    Payer::new(
        user_id,
        &format!("User {}", user_id),
        &format!("user{}@ledger.invalid", user_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::MoneyAmount;
    use crate::types::PollState;

    fn engine() -> LedgerEngine {
        LedgerEngine::new(Currency::builtin()).unwrap()
    }

    fn record(op: LedgerOperation, poll: PollId, user: UserId) -> LedgerRecord {
        LedgerRecord {
            op,
            poll,
            user,
            amount: None,
            currency: None,
            title: None,
        }
    }

    fn open(poll: PollId, currency: &str) -> LedgerRecord {
        LedgerRecord {
            currency: Some(currency.to_string()),
            title: Some(format!("Poll {}", poll)),
            ..record(LedgerOperation::Open, poll, 99)
        }
    }

    fn with_amount(op: LedgerOperation, poll: PollId, user: UserId, amount: &str) -> LedgerRecord {
        LedgerRecord {
            amount: Some(MoneyAmount::from_decimal_str(amount).unwrap()),
            ..record(op, poll, user)
        }
    }

    #[test]
    fn test_open_creates_poll() {
        let engine = engine();
        engine.process(open(1, "GBP")).unwrap();

        let polls = engine.polls();
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0].state, PollState::Open);
        assert_eq!(polls[0].owner, 99);
    }

    #[test]
    fn test_open_without_currency_fails() {
        let engine = engine();
        let result = engine.process(record(LedgerOperation::Open, 1, 99));
        assert!(matches!(result, Err(CanvassError::Validation { .. })));
        assert!(engine.polls().is_empty());
    }

    #[test]
    fn test_pledge_does_not_count_until_paid() {
        let engine = engine();
        engine.process(open(1, "GBP")).unwrap();
        engine
            .process(with_amount(LedgerOperation::Pledge, 1, 7, "12.50"))
            .unwrap();

        assert_eq!(engine.polls()[0].votes, 0);

        engine.process(record(LedgerOperation::Pay, 1, 7)).unwrap();

        let poll = &engine.polls()[0];
        assert_eq!(poll.votes, 1);
        assert_eq!(poll.total.to_string(), "12.5");
    }

    #[test]
    fn test_pay_without_pledge_fails() {
        let engine = engine();
        engine.process(open(1, "GBP")).unwrap();

        let result = engine.process(record(LedgerOperation::Pay, 1, 7));
        assert!(matches!(result, Err(CanvassError::Validation { .. })));
    }

    #[test]
    fn test_second_pledge_replaces_first() {
        let engine = engine();
        engine.process(open(1, "GBP")).unwrap();
        engine
            .process(with_amount(LedgerOperation::Pledge, 1, 7, "5"))
            .unwrap();
        engine
            .process(with_amount(LedgerOperation::Pledge, 1, 7, "8"))
            .unwrap();
        engine.process(record(LedgerOperation::Pay, 1, 7)).unwrap();

        assert_eq!(engine.polls()[0].total.to_string(), "8.0");
        assert!(engine.process(record(LedgerOperation::Pay, 1, 7)).is_err());
    }

    #[test]
    fn test_donate_settles_at_once() {
        let engine = engine();
        engine.process(open(1, "GBP")).unwrap();
        engine
            .process(with_amount(LedgerOperation::Donate, 1, 7, "3"))
            .unwrap();
        engine
            .process(with_amount(LedgerOperation::Donate, 1, 7, "4"))
            .unwrap();

        let poll = &engine.polls()[0];
        assert_eq!(poll.votes, 2);
        assert_eq!(poll.total.to_string(), "7.0");

        // Nothing is left in flight for a later pay to pick up
        assert!(engine.process(record(LedgerOperation::Pay, 1, 7)).is_err());
        assert!(engine.store().donations().iter().all(|d| !d.is_initial()));
    }

    #[test]
    fn test_failed_donate_leaves_no_donation() {
        let engine = engine();
        engine.process(open(1, "GBP")).unwrap();
        engine.process(record(LedgerOperation::Underway, 1, 99)).unwrap();

        assert!(engine
            .process(with_amount(LedgerOperation::Donate, 1, 7, "3"))
            .is_err());
        assert!(engine.store().donations().is_empty());
    }

    #[test]
    fn test_donate_without_amount_fails() {
        let engine = engine();
        engine.process(open(1, "GBP")).unwrap();
        let result = engine.process(record(LedgerOperation::Donate, 1, 7));
        assert!(matches!(result, Err(CanvassError::Validation { .. })));
    }

    #[test]
    fn test_expire_redistributes() {
        let engine = engine();
        engine.process(open(1, "GBP")).unwrap();
        engine.process(open(2, "GBP")).unwrap();
        engine
            .process(with_amount(LedgerOperation::Donate, 1, 7, "10"))
            .unwrap();
        engine.process(record(LedgerOperation::Expire, 1, 99)).unwrap();

        let polls = engine.polls();
        assert_eq!(polls[0].state, PollState::Expired);
        assert!(polls[0].total.is_zero());
        assert_eq!(polls[1].total.to_string(), "10.0");
    }

    #[test]
    fn test_donation_to_completed_poll_fails() {
        let engine = engine();
        engine.process(open(1, "GBP")).unwrap();
        engine.process(record(LedgerOperation::Underway, 1, 99)).unwrap();
        engine.process(record(LedgerOperation::Complete, 1, 99)).unwrap();

        let result = engine.process(with_amount(LedgerOperation::Donate, 1, 7, "1"));
        assert!(matches!(result, Err(CanvassError::PollNotOpen { .. })));
    }
}
