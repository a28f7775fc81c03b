//! Transactional in-memory store with row locks
//!
//! This module provides the `MemoryStore`, which holds currencies, polls and
//! donations in concurrent maps, and the `Transaction` type through which all
//! poll and donation writes go.
//!
//! # Design
//!
//! Tables are `DashMap`s, so reads of different rows never contend. Writes are
//! staged inside a [`Transaction`] and applied together when the closure
//! passed to [`MemoryStore::transaction`] returns `Ok`. Returning `Err` (or
//! panicking) drops the staged changes.
//!
//! # Locking
//!
//! `lock_*` methods behave like `SELECT ... FOR UPDATE`: they block until no
//! other transaction holds the row, then read its latest committed value. A
//! row stays locked until the owning transaction commits or rolls back, and a
//! transaction may lock the same row more than once. Staging a write locks the
//! row implicitly.
//!
//! Lock order: a transaction that needs the invoice sequence takes it before
//! any poll row, and poll rows are taken in ascending id order. Donation rows
//! are only locked by the transaction working on that donation.

use crate::types::{
    CanvassError, Currency, Donation, DonationId, DonationState, InvoiceNumber, Poll, PollId,
    PollState, UserId,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError, RwLock};
use tracing::debug;

/// A lockable row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    InvoiceSequence,
    Poll(PollId),
    Donation(DonationId),
}

/// Blocking, re-entrant row lock table
#[derive(Debug, Default)]
struct RowLocks {
    /// Row to owning transaction id
    owners: Mutex<HashMap<RowKey, u64>>,
    released: Condvar,
}

impl RowLocks {
    /// Block until `owner` holds `key`
    ///
    /// Returns `true` if the lock was newly taken, `false` if `owner` already
    /// held it.
    fn acquire(&self, key: RowKey, owner: u64) -> bool {
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match owners.get(&key) {
                None => {
                    owners.insert(key, owner);
                    return true;
                }
                Some(holder) if *holder == owner => return false,
                Some(_) => {
                    owners = self
                        .released
                        .wait(owners)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn release(&self, keys: &[RowKey], owner: u64) {
        if keys.is_empty() {
            return;
        }
        {
            let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
            for key in keys {
                if owners.get(key) == Some(&owner) {
                    owners.remove(key);
                }
            }
        }
        self.released.notify_all();
    }
}

/// Thread-safe in-memory store
///
/// `MemoryStore` is shared by reference (or `Arc`) between threads. Currency
/// administration is applied directly; poll and donation changes go through
/// [`MemoryStore::transaction`].
#[derive(Debug)]
pub struct MemoryStore {
    currencies: DashMap<String, Currency>,
    polls: DashMap<PollId, Poll>,
    donations: DashMap<DonationId, Donation>,

    last_donation_id: AtomicU64,
    last_invoice_number: AtomicU64,
    last_transaction_id: AtomicU64,

    locks: RowLocks,

    /// Held for writing while a commit applies, so snapshots never see half
    /// of one
    commit_gate: RwLock<()>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        MemoryStore {
            currencies: DashMap::new(),
            polls: DashMap::new(),
            donations: DashMap::new(),
            last_donation_id: AtomicU64::new(0),
            last_invoice_number: AtomicU64::new(0),
            last_transaction_id: AtomicU64::new(0),
            locks: RowLocks::default(),
            commit_gate: RwLock::new(()),
        }
    }

    /// Create a store holding the given currencies
    ///
    /// # Errors
    ///
    /// Returns the first validation or duplicate code error.
    pub fn with_currencies(currencies: Vec<Currency>) -> Result<Self, CanvassError> {
        let store = MemoryStore::new();
        for currency in currencies {
            store.create_currency(currency)?;
        }
        Ok(store)
    }

    /// Run `f` in a transaction, committing only if it returns `Ok`
    ///
    /// # Arguments
    ///
    /// * `f` - Closure receiving the transaction; all reads and writes it makes
    ///   through the transaction see its own staged changes
    ///
    /// # Returns
    ///
    /// * `Ok(value)` - The closure's value, after the commit
    /// * `Err(CanvassError)` - The closure's error; nothing was written
    pub fn transaction<T, F>(&self, f: F) -> Result<T, CanvassError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, CanvassError>,
    {
        let mut tx = Transaction::begin(self);
        match f(&mut tx) {
            Ok(value) => {
                tx.commit();
                Ok(value)
            }
            Err(error) => {
                debug!(transaction = tx.id, %error, "Rolling back");
                Err(error)
            }
        }
    }

    /// Take the next invoice number in a transaction of its own
    pub fn next_invoice_number(&self) -> Result<InvoiceNumber, CanvassError> {
        self.transaction(|tx| Ok(tx.next_invoice_number()))
    }

    /// The most recently issued invoice number (0 before the first)
    pub fn last_invoice_number(&self) -> InvoiceNumber {
        self.last_invoice_number.load(Ordering::SeqCst)
    }

    // Currencies

    /// Add a currency after validating it
    pub fn create_currency(&self, currency: Currency) -> Result<(), CanvassError> {
        currency.validate()?;
        match self.currencies.entry(currency.code.clone()) {
            Entry::Occupied(_) => Err(CanvassError::DuplicateCurrency {
                code: currency.code,
            }),
            Entry::Vacant(entry) => {
                entry.insert(currency);
                Ok(())
            }
        }
    }

    /// Replace an existing currency's settings
    pub fn update_currency(&self, currency: Currency) -> Result<(), CanvassError> {
        currency.validate()?;
        match self.currencies.get_mut(&currency.code) {
            Some(mut existing) => {
                *existing = currency;
                Ok(())
            }
            None => Err(CanvassError::currency_not_found(&currency.code)),
        }
    }

    /// Remove a currency nothing refers to
    ///
    /// # Errors
    ///
    /// - `CurrencyNotFound` if the code is unknown
    /// - `CurrencyInUse` if any poll or donation uses it
    /// - `LastCurrency` if it is the only currency left
    pub fn destroy_currency(&self, code: &str) -> Result<Currency, CanvassError> {
        let _gate = self.commit_gate.write().unwrap_or_else(PoisonError::into_inner);

        if !self.currencies.contains_key(code) {
            return Err(CanvassError::currency_not_found(code));
        }

        let polls = self.polls.iter().filter(|p| p.currency == code).count();
        let donations = self.donations.iter().filter(|d| d.currency == code).count();
        if polls > 0 || donations > 0 {
            return Err(CanvassError::CurrencyInUse {
                code: code.to_string(),
                polls,
                donations,
            });
        }
        if self.currencies.len() <= 1 {
            return Err(CanvassError::LastCurrency {
                code: code.to_string(),
            });
        }

        self.currencies
            .remove(code)
            .map(|(_, currency)| currency)
            .ok_or_else(|| CanvassError::currency_not_found(code))
    }

    pub fn currency(&self, code: &str) -> Option<Currency> {
        self.currencies.get(code).map(|c| c.clone())
    }

    /// All currencies sorted by code
    pub fn currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = self.currencies.iter().map(|c| c.clone()).collect();
        currencies.sort_by(|a, b| a.code.cmp(&b.code));
        currencies
    }

    // Committed snapshots

    pub fn poll(&self, id: PollId) -> Option<Poll> {
        self.polls.get(&id).map(|p| p.clone())
    }

    /// All committed polls sorted by id
    pub fn polls(&self) -> Vec<Poll> {
        let _gate = self.commit_gate.read().unwrap_or_else(PoisonError::into_inner);
        let mut polls: Vec<Poll> = self.polls.iter().map(|p| p.clone()).collect();
        polls.sort_by_key(|poll| poll.id);
        polls
    }

    pub fn donation(&self, id: DonationId) -> Option<Donation> {
        self.donations.get(&id).map(|d| d.clone())
    }

    /// All committed donations sorted by id
    pub fn donations(&self) -> Vec<Donation> {
        let _gate = self.commit_gate.read().unwrap_or_else(PoisonError::into_inner);
        let mut donations: Vec<Donation> = self.donations.iter().map(|d| d.clone()).collect();
        donations.sort_by_key(|donation| donation.id);
        donations
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

/// An open transaction against a [`MemoryStore`]
///
/// Staged values shadow committed ones for every read made through the
/// transaction. `None` in a staging map marks a deletion.
#[derive(Debug)]
pub struct Transaction<'a> {
    store: &'a MemoryStore,
    id: u64,
    held: Vec<RowKey>,
    polls: HashMap<PollId, Option<Poll>>,
    donations: HashMap<DonationId, Option<Donation>>,
    invoice_number: Option<InvoiceNumber>,
}

impl<'a> Transaction<'a> {
    fn begin(store: &'a MemoryStore) -> Self {
        let id = store.last_transaction_id.fetch_add(1, Ordering::SeqCst) + 1;
        Transaction {
            store,
            id,
            held: Vec::new(),
            polls: HashMap::new(),
            donations: HashMap::new(),
            invoice_number: None,
        }
    }

    fn lock(&mut self, key: RowKey) {
        if self.store.locks.acquire(key, self.id) {
            debug!(transaction = self.id, ?key, "Locked row");
            self.held.push(key);
        }
    }

    /// Currency lookup; currencies are not transactional
    pub fn currency(&self, code: &str) -> Result<Currency, CanvassError> {
        self.store
            .currency(code)
            .ok_or_else(|| CanvassError::currency_not_found(code))
    }

    // Polls

    /// Read a poll without locking it
    pub fn find_poll(&self, id: PollId) -> Option<Poll> {
        match self.polls.get(&id) {
            Some(staged) => staged.clone(),
            None => self.store.poll(id),
        }
    }

    /// Lock a poll row and read it
    ///
    /// The lock is taken even when the poll does not exist, so a concurrent
    /// insert of the same id waits for this transaction.
    pub fn lock_poll(&mut self, id: PollId) -> Option<Poll> {
        self.lock(RowKey::Poll(id));
        self.find_poll(id)
    }

    /// Stage a poll write
    pub fn put_poll(&mut self, poll: Poll) {
        self.lock(RowKey::Poll(poll.id));
        self.polls.insert(poll.id, Some(poll));
    }

    /// Stage a new poll, failing if the id is taken
    pub fn insert_poll(&mut self, poll: Poll) -> Result<(), CanvassError> {
        if self.lock_poll(poll.id).is_some() {
            return Err(CanvassError::DuplicatePoll { poll: poll.id });
        }
        self.put_poll(poll);
        Ok(())
    }

    /// Stage a poll deletion
    pub fn delete_poll(&mut self, id: PollId) {
        self.lock(RowKey::Poll(id));
        self.polls.insert(id, None);
    }

    /// Ids of open polls in `currency`, ascending
    pub fn open_poll_ids(&self, currency: &str) -> Vec<PollId> {
        let mut ids: BTreeSet<PollId> = self.store.polls.iter().map(|p| *p.key()).collect();
        ids.extend(self.polls.keys().copied());

        ids.into_iter()
            .filter(|id| {
                self.find_poll(*id)
                    .is_some_and(|p| p.state == PollState::Open && p.currency == currency)
            })
            .collect()
    }

    // Donations

    pub fn find_donation(&self, id: DonationId) -> Option<Donation> {
        match self.donations.get(&id) {
            Some(staged) => staged.clone(),
            None => self.store.donation(id),
        }
    }

    /// Lock a donation row and read it
    pub fn lock_donation(&mut self, id: DonationId) -> Option<Donation> {
        self.lock(RowKey::Donation(id));
        self.find_donation(id)
    }

    /// Stage a donation write, assigning an id to a new donation
    ///
    /// # Returns
    ///
    /// The donation's id
    pub fn put_donation(&mut self, mut donation: Donation) -> DonationId {
        let id = match donation.id {
            Some(id) => id,
            None => {
                let id = self.store.last_donation_id.fetch_add(1, Ordering::SeqCst) + 1;
                donation.id = Some(id);
                id
            }
        };
        self.lock(RowKey::Donation(id));
        self.donations.insert(id, Some(donation));
        id
    }

    /// Stage a donation deletion
    pub fn delete_donation(&mut self, id: DonationId) {
        self.lock(RowKey::Donation(id));
        self.donations.insert(id, None);
    }

    fn donation_ids(&self) -> BTreeSet<DonationId> {
        let mut ids: BTreeSet<DonationId> =
            self.store.donations.iter().map(|d| *d.key()).collect();
        ids.extend(self.donations.keys().copied());
        ids
    }

    /// Ids of a user's in-flight donations, ascending
    pub fn initial_donation_ids(&self, user_id: UserId) -> Vec<DonationId> {
        self.donation_ids()
            .into_iter()
            .filter(|id| {
                self.find_donation(*id)
                    .is_some_and(|d| d.user_id == user_id && d.state == DonationState::Initial)
            })
            .collect()
    }

    /// Number of donations referencing a poll
    pub fn donation_count(&self, poll_id: PollId) -> usize {
        self.donation_ids()
            .into_iter()
            .filter(|id| self.find_donation(*id).is_some_and(|d| d.poll_id == poll_id))
            .count()
    }

    // Invoice sequence

    /// Take the next invoice number
    ///
    /// Locks the sequence row until this transaction ends, so numbers are
    /// handed out in commit order. A rolled back transaction does not use up
    /// its number.
    pub fn next_invoice_number(&mut self) -> InvoiceNumber {
        self.lock(RowKey::InvoiceSequence);
        let current = self
            .invoice_number
            .unwrap_or_else(|| self.store.last_invoice_number.load(Ordering::SeqCst));
        let next = current + 1;
        self.invoice_number = Some(next);
        next
    }

    fn commit(mut self) {
        let store = self.store;
        let _gate = store.commit_gate.write().unwrap_or_else(PoisonError::into_inner);

        for (id, staged) in self.polls.drain() {
            match staged {
                Some(poll) => {
                    store.polls.insert(id, poll);
                }
                None => {
                    store.polls.remove(&id);
                }
            }
        }
        for (id, staged) in self.donations.drain() {
            match staged {
                Some(donation) => {
                    store.donations.insert(id, donation);
                }
                None => {
                    store.donations.remove(&id);
                }
            }
        }
        if let Some(number) = self.invoice_number.take() {
            store.last_invoice_number.store(number, Ordering::SeqCst);
        }

        debug!(transaction = self.id, "Committed");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.store.locks.release(&self.held, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::MoneyAmount;
    use crate::types::{Payer, RoundingAlgorithm};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn store() -> MemoryStore {
        MemoryStore::with_currencies(Currency::builtin()).unwrap()
    }

    fn poll(id: PollId, currency: &str) -> Poll {
        Poll::new(id, "Title", "Description", currency, 1)
    }

    #[test]
    fn test_commit_applies_staged_writes() {
        let store = store();
        store
            .transaction(|tx| {
                tx.insert_poll(poll(1, "GBP"))?;
                assert!(tx.find_poll(1).is_some());
                Ok(())
            })
            .unwrap();
        assert_eq!(store.polls().len(), 1);
    }

    #[test]
    fn test_error_rolls_back() {
        let store = store();
        let result: Result<(), CanvassError> = store.transaction(|tx| {
            tx.insert_poll(poll(1, "GBP"))?;
            tx.next_invoice_number();
            Err(CanvassError::gateway("declined"))
        });

        assert!(result.is_err());
        assert!(store.poll(1).is_none());
        assert_eq!(store.last_invoice_number(), 0);
    }

    #[test]
    fn test_duplicate_poll() {
        let store = store();
        store.transaction(|tx| tx.insert_poll(poll(1, "GBP"))).unwrap();
        let error = store.transaction(|tx| tx.insert_poll(poll(1, "USD"))).unwrap_err();
        assert_eq!(error, CanvassError::DuplicatePoll { poll: 1 });
    }

    #[test]
    fn test_reads_see_own_writes_and_deletes() {
        let store = store();
        store.transaction(|tx| tx.insert_poll(poll(1, "GBP"))).unwrap();

        store
            .transaction(|tx| {
                tx.delete_poll(1);
                assert!(tx.lock_poll(1).is_none());
                tx.insert_poll(poll(2, "GBP"))?;
                assert_eq!(tx.open_poll_ids("GBP"), vec![2]);
                Ok(())
            })
            .unwrap();

        assert!(store.poll(1).is_none());
        assert!(store.poll(2).is_some());
    }

    #[test]
    fn test_donation_ids_and_queries() {
        let store = store();
        let payer = Payer::new(9, "Bo", "bo@example.com");

        let (first, second) = store
            .transaction(|tx| {
                let amount = MoneyAmount::new("5", "0");
                let first = tx.put_donation(Donation::new(&payer, 1, "T", "GBP", amount.clone()));
                let second = tx.put_donation(Donation::new(&payer, 2, "T", "GBP", amount));
                Ok((first, second))
            })
            .unwrap();

        assert!(second > first);
        store
            .transaction(|tx| {
                assert_eq!(tx.initial_donation_ids(9), vec![first, second]);
                assert_eq!(tx.donation_count(1), 1);
                assert!(tx.initial_donation_ids(10).is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_lock_blocks_until_commit() {
        let store = store();
        store.transaction(|tx| tx.insert_poll(poll(1, "GBP"))).unwrap();
        let (locked_tx, locked_rx) = mpsc::channel();
        let shared = &store;

        thread::scope(|scope| {
            scope.spawn(move || {
                shared
                    .transaction(|tx| {
                        let mut poll = tx.lock_poll(1).unwrap();
                        locked_tx.send(()).unwrap();
                        thread::sleep(Duration::from_millis(50));
                        poll.votes += 1;
                        tx.put_poll(poll);
                        Ok(())
                    })
                    .unwrap();
            });

            locked_rx.recv().unwrap();
            let votes = store
                .transaction(|tx| Ok(tx.lock_poll(1).unwrap().votes))
                .unwrap();
            assert_eq!(votes, 1);
        });
    }

    #[test]
    fn test_invoice_numbers_are_unique_and_gap_free() {
        let store = store();
        let threads = 8;
        let per_thread = 50;

        let mut numbers: Vec<InvoiceNumber> = thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    scope.spawn(|| {
                        (0..per_thread)
                            .map(|_| store.next_invoice_number().unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        numbers.sort_unstable();
        let expected: Vec<InvoiceNumber> = (1..=(threads * per_thread) as u64).collect();
        assert_eq!(numbers, expected);
    }

    #[test]
    fn test_invoice_numbers_increase_per_thread() {
        let store = store();
        let first = store.next_invoice_number().unwrap();
        let second = store.next_invoice_number().unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_destroy_currency_rules() {
        let store = MemoryStore::with_currencies(vec![
            Currency::new("GBP", "Pound", "£"),
            Currency::new("USD", "Dollar", "$"),
        ])
        .unwrap();
        store.transaction(|tx| tx.insert_poll(poll(1, "GBP"))).unwrap();

        assert!(matches!(
            store.destroy_currency("GBP").unwrap_err(),
            CanvassError::CurrencyInUse { polls: 1, donations: 0, .. }
        ));
        assert!(matches!(
            store.destroy_currency("XXX").unwrap_err(),
            CanvassError::CurrencyNotFound { .. }
        ));

        assert_eq!(store.destroy_currency("USD").unwrap().code, "USD");

        store.transaction(|tx| {
            tx.delete_poll(1);
            Ok(())
        })
        .unwrap();
        assert!(matches!(
            store.destroy_currency("GBP").unwrap_err(),
            CanvassError::LastCurrency { .. }
        ));
    }

    #[test]
    fn test_currency_create_and_update() {
        let store = store();
        assert!(matches!(
            store.create_currency(Currency::new("GBP", "Pound", "£")).unwrap_err(),
            CanvassError::DuplicateCurrency { .. }
        ));

        let franc = Currency::new("CHF", "Franc", "F").with_rounding(RoundingAlgorithm::Swiss, 2);
        assert_eq!(
            store.update_currency(franc).unwrap_err().field(),
            Some("decimal_precision")
        );

        let pounds = Currency::new("GBP", "Pound", "GBP ");
        store.update_currency(pounds).unwrap();
        assert_eq!(store.currency("GBP").unwrap().symbol, "GBP ");
        assert_eq!(store.currencies().first().unwrap().code, "ARS");
    }
}
