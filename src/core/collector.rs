//! Garbage collection of abandoned donations
//!
//! A payer who leaves part way through a payment leaves an `initial` donation
//! behind. The collector removes those that have not been touched for
//! [`TIMEOUT_HOURS`], sweeping at most once per [`SWEEP_INTERVAL_HOURS`] per
//! collector instance. Callers decide when to invoke it; there is no
//! background task.

use crate::core::store::MemoryStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

pub const TIMEOUT_HOURS: i64 = 2;
pub const SWEEP_INTERVAL_HOURS: i64 = 24;

/// Removes stale in-flight donations
#[derive(Debug)]
pub struct GarbageCollector {
    timeout: TimeDelta,
    sweep_interval: TimeDelta,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl GarbageCollector {
    pub fn new() -> Self {
        GarbageCollector::with_limits(
            TimeDelta::hours(TIMEOUT_HOURS),
            TimeDelta::hours(SWEEP_INTERVAL_HOURS),
        )
    }

    pub fn with_limits(timeout: TimeDelta, sweep_interval: TimeDelta) -> Self {
        GarbageCollector {
            timeout,
            sweep_interval,
            last_sweep: Mutex::new(None),
        }
    }

    /// Sweep if the interval has passed since the last sweep
    ///
    /// # Arguments
    ///
    /// * `store` - Store to sweep
    /// * `now` - Current time; donations last updated before `now - timeout`
    ///   are removed
    ///
    /// # Returns
    ///
    /// The number of donations removed (0 when the sweep was skipped)
    pub fn collect(&self, store: &MemoryStore, now: DateTime<Utc>) -> usize {
        {
            let mut last_sweep = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(last) = *last_sweep {
                if now - last < self.sweep_interval {
                    debug!(%last, "Skipping donation sweep");
                    return 0;
                }
            }
            *last_sweep = Some(now);
        }

        let cutoff = now - self.timeout;
        let stale: Vec<_> = store
            .donations()
            .into_iter()
            .filter(|d| d.is_initial() && d.updated_at < cutoff)
            .filter_map(|d| d.id)
            .collect();
        if stale.is_empty() {
            return 0;
        }

        let removed = store.transaction(|tx| {
            let mut removed = 0;
            for id in stale {
                // Re-check under the lock; the payer may have come back
                let still_stale = tx
                    .lock_donation(id)
                    .is_some_and(|d| d.is_initial() && d.updated_at < cutoff);
                if still_stale {
                    tx.delete_donation(id);
                    removed += 1;
                }
            }
            Ok(removed)
        });

        match removed {
            Ok(count) => {
                info!(count, "Collected stale donations");
                count
            }
            Err(error) => {
                warn!(%error, "Donation sweep failed");
                0
            }
        }
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        GarbageCollector::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::donation_workflow::{generate, save, settle, DonationOptions};
    use crate::core::poll_workflow::create_poll;
    use crate::types::{Currency, Payer, Poll};

    fn setup() -> MemoryStore {
        let store = MemoryStore::with_currencies(Currency::builtin()).unwrap();
        create_poll(&store, Poll::new(1, "Roof", "Fix the roof", "GBP", 99)).unwrap();
        store
    }

    fn pledge(store: &MemoryStore, user: u32) -> u64 {
        let payer = Payer::new(user, "P", "p@example.com");
        let mut donation = generate(store, 1, &payer, "5", "", &DonationOptions::default()).unwrap();
        save(store, &mut donation).unwrap()
    }

    #[test]
    fn test_collects_only_stale_initial_donations() {
        let store = setup();
        let stale = pledge(&store, 1);
        let paid = pledge(&store, 2);
        settle(&store, paid, None).unwrap();
        let collector = GarbageCollector::new();

        let now = Utc::now();
        assert_eq!(collector.collect(&store, now), 0);
        assert!(store.donation(stale).is_some());

        let later = now + TimeDelta::hours(TIMEOUT_HOURS + SWEEP_INTERVAL_HOURS);
        assert_eq!(collector.collect(&store, later), 1);
        assert!(store.donation(stale).is_none());
        assert!(store.donation(paid).is_some());
    }

    #[test]
    fn test_sweeps_at_most_once_per_interval() {
        let store = setup();
        let collector = GarbageCollector::new();
        let now = Utc::now() + TimeDelta::hours(TIMEOUT_HOURS + 1);

        assert_eq!(collector.collect(&store, now), 0);
        pledge(&store, 1);

        let much_later = now + TimeDelta::hours(TIMEOUT_HOURS + 1);
        assert_eq!(collector.collect(&store, much_later), 0);
        assert_eq!(store.donations().len(), 1);

        let next_day = now + TimeDelta::hours(SWEEP_INTERVAL_HOURS);
        assert_eq!(collector.collect(&store, next_day), 1);
    }
}
