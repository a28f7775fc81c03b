//! Core business logic module
//!
//! This module contains the ledger's processing components:
//! - `store` - Transactional in-memory store with pessimistic row locks
//! - `donation_workflow` - Donation lifecycle (generate, save, pay)
//! - `poll_workflow` - Poll lifecycle and redistribution on expiry
//! - `payment` - Gateway and notification seams around the donation workflow
//! - `collector` - Removal of abandoned in-flight donations
//! - `engine` - Ledger script replay
//! - `batch_processor` - Concurrent replay for the async strategy

pub mod batch_processor;
pub mod collector;
pub mod donation_workflow;
pub mod engine;
pub mod payment;
pub mod poll_workflow;
pub mod store;

pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use collector::GarbageCollector;
pub use donation_workflow::DonationOptions;
pub use engine::LedgerEngine;
pub use payment::{
    LogNotifier, NotificationSink, OffsiteCheckout, PaymentCard, PaymentGateway, PaymentProcessor,
};
pub use poll_workflow::PollChanges;
pub use store::{MemoryStore, Transaction};
