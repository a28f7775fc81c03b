//! Batch processing with user-based partitioning for the async strategy
//!
//! This module provides the `BatchProcessor` struct, which replays a batch of
//! ledger records concurrently while keeping the outcome identical to a
//! sequential replay.
//!
//! # Design
//!
//! A batch is cut into segments at barrier records (`open`, `underway`,
//! `complete`, `expire`). A barrier runs alone, after everything before it and
//! before everything after it. The donation rows between two barriers are
//! partitioned by user: rows of different users run concurrently on tokio
//! tasks, rows of one user run in their original order.
//!
//! Donation rows only ever add to poll totals, and addition of exact amounts
//! commutes, so reordering them across users leaves the final state unchanged.
//!
//! ```text
//! [pledge u1] [pay u1] [donate u2] | [expire] | [donate u1] [donate u3]
//!  \_____ segment: u1, u2 ____/     barrier    \___ segment: u1, u3 __/
//! ```
//!
//! # Thread Safety
//!
//! The processor is cloneable and can be safely shared across async tasks.
//! The engine sits behind an `Arc` and serialises through its store's locks.

use std::collections::HashMap;
use std::sync::Arc;

use super::LedgerEngine;
use crate::types::{CanvassError, LedgerRecord, UserId};
use tracing::{error, warn};

/// Result of processing a single ledger record
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The record that was processed
    pub record: LedgerRecord,

    /// The result of processing (success or error)
    pub result: Result<(), CanvassError>,
}

/// A run of records to execute together
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// A poll-level record that runs alone
    Barrier(LedgerRecord),
    /// Consecutive donation rows
    Donations(Vec<LedgerRecord>),
}

/// Batch processor with user-based partitioning
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    engine: Arc<LedgerEngine>,
}

impl BatchProcessor {
    /// Create a new BatchProcessor
    ///
    /// # Arguments
    ///
    /// * `engine` - Arc-wrapped LedgerEngine shared by all tasks
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// Cut a batch into segments at barrier records
    ///
    /// # Guarantees
    ///
    /// - Each record appears in exactly one segment
    /// - Segments are in the original order
    /// - No `Donations` segment is empty
    pub fn segment(batch: Vec<LedgerRecord>) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut donations = Vec::new();

        for record in batch {
            if record.op.is_barrier() {
                if !donations.is_empty() {
                    segments.push(Segment::Donations(std::mem::take(&mut donations)));
                }
                segments.push(Segment::Barrier(record));
            } else {
                donations.push(record);
            }
        }
        if !donations.is_empty() {
            segments.push(Segment::Donations(donations));
        }

        segments
    }

    /// Partition donation rows by user ID
    ///
    /// # Guarantees
    ///
    /// - Each record appears in exactly one partition
    /// - Records for each user keep their original order
    pub fn partition_by_user(records: Vec<LedgerRecord>) -> HashMap<UserId, Vec<LedgerRecord>> {
        let mut user_batches: HashMap<UserId, Vec<LedgerRecord>> = HashMap::new();

        for record in records {
            user_batches.entry(record.user).or_default().push(record);
        }

        user_batches
    }

    /// Process records sequentially, capturing every outcome
    pub fn process_in_order(&self, records: Vec<LedgerRecord>) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(records.len());

        for record in records {
            let result = self.engine.process(record.clone());
            if let Err(error) = &result {
                warn!(op = %record.op, poll = record.poll, user = record.user, %error, "Skipping record");
            }
            results.push(ProcessingResult { record, result });
        }

        results
    }

    /// Process a batch of ledger records
    ///
    /// Segments run one after another. Within a donation segment each user's
    /// rows run on their own tokio task. The engine is synchronous, so tasks
    /// go through `spawn_blocking` to keep lock waits off the async workers.
    ///
    /// # Returns
    ///
    /// A vector of `ProcessingResult`, one per record that ran. Results within
    /// a donation segment may be in a different order than the input.
    pub async fn process_batch(&self, batch: Vec<LedgerRecord>) -> Vec<ProcessingResult> {
        let mut results = Vec::new();

        for segment in Self::segment(batch) {
            match segment {
                Segment::Barrier(record) => {
                    results.extend(self.process_in_order(vec![record]));
                }
                Segment::Donations(records) => {
                    let mut tasks = Vec::new();
                    for (_user, records) in Self::partition_by_user(records) {
                        let processor = self.clone();
                        tasks.push(tokio::task::spawn_blocking(move || {
                            processor.process_in_order(records)
                        }));
                    }

                    for task in tasks {
                        match task.await {
                            Ok(user_results) => results.extend(user_results),
                            Err(e) => error!(error = %e, "Task panicked"),
                        }
                    }
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::MoneyAmount;
    use crate::types::{Currency, LedgerOperation, PollId};
    use rstest::rstest;

    fn record(op: LedgerOperation, poll: PollId, user: UserId) -> LedgerRecord {
        LedgerRecord {
            op,
            poll,
            user,
            amount: (op.needs_amount()).then(|| MoneyAmount::from_decimal_str("1.5").unwrap()),
            currency: (op == LedgerOperation::Open).then(|| "GBP".to_string()),
            title: None,
        }
    }

    fn processor() -> BatchProcessor {
        BatchProcessor::new(Arc::new(LedgerEngine::new(Currency::builtin()).unwrap()))
    }

    #[test]
    fn test_segment_splits_at_barriers() {
        use LedgerOperation::*;
        let batch = vec![
            record(Open, 1, 9),
            record(Donate, 1, 1),
            record(Pledge, 1, 2),
            record(Underway, 1, 9),
            record(Donate, 1, 3),
        ];

        let segments = BatchProcessor::segment(batch);

        assert_eq!(segments.len(), 4);
        assert!(matches!(&segments[0], Segment::Barrier(r) if r.op == Open));
        assert!(matches!(&segments[1], Segment::Donations(rows) if rows.len() == 2));
        assert!(matches!(&segments[2], Segment::Barrier(r) if r.op == Underway));
        assert!(matches!(&segments[3], Segment::Donations(rows) if rows.len() == 1));
    }

    #[rstest]
    #[case::empty(vec![], 0)]
    #[case::only_barriers(vec![LedgerOperation::Open, LedgerOperation::Expire], 2)]
    #[case::only_donations(vec![LedgerOperation::Donate, LedgerOperation::Pay], 1)]
    fn test_segment_counts(#[case] ops: Vec<LedgerOperation>, #[case] expected: usize) {
        let batch = ops.into_iter().map(|op| record(op, 1, 1)).collect();
        assert_eq!(BatchProcessor::segment(batch).len(), expected);
    }

    #[test]
    fn test_partition_keeps_user_order() {
        use LedgerOperation::*;
        let batch = vec![
            record(Pledge, 1, 1),
            record(Donate, 2, 2),
            record(Pay, 1, 1),
        ];

        let partitions = BatchProcessor::partition_by_user(batch);

        assert_eq!(partitions.len(), 2);
        let ops: Vec<_> = partitions[&1].iter().map(|r| r.op).collect();
        assert_eq!(ops, vec![Pledge, Pay]);
    }

    #[test]
    fn test_processor_is_cloneable() {
        let engine = Arc::new(LedgerEngine::new(Currency::builtin()).unwrap());
        let processor = BatchProcessor::new(Arc::clone(&engine));
        let _processor_clone = processor.clone();

        assert!(Arc::strong_count(&engine) >= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_process_batch_applies_every_user() {
        use LedgerOperation::*;
        let processor = processor();
        let mut batch = vec![record(Open, 1, 99)];
        for user in 1..=20 {
            batch.push(record(Pledge, 1, user));
            batch.push(record(Pay, 1, user));
        }
        batch.push(record(Underway, 1, 99));
        batch.push(record(Donate, 1, 5));

        let results = processor.process_batch(batch).await;

        assert_eq!(results.len(), 43);
        let failures: Vec<_> = results.iter().filter(|r| r.result.is_err()).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].record.op, Donate);

        let poll = &processor.engine.polls()[0];
        assert_eq!(poll.votes, 20);
        assert_eq!(poll.total.to_string(), "30.0");
    }
}
