//! Payment gateway and notification seams
//!
//! This module defines the traits the ledger uses to reach the outside world
//! and the `PaymentProcessor` that drives a donation through a gateway.
//!
//! # Flows
//!
//! On-site: [`PaymentProcessor::authorize`] reserves the amount on a card and
//! stores the authorisation; [`PaymentProcessor::capture`] then takes the
//! money and pays the donation in one transaction. Off-site:
//! [`PaymentProcessor::purchase_offsite`] pays the donation and completes the
//! purchase in one transaction, the purchase going last so a refusal rolls the
//! payment back.
//!
//! Once the gateway has taken money, any failure to commit is reported as
//! `ChargedButNotRecorded` and never retried.

use crate::core::donation_workflow::{destroy_initial_for, generate, pay, save, DonationOptions};
use crate::core::store::MemoryStore;
use crate::money::amount_for_gateway;
use crate::types::{
    AuthorisationTokens, CanvassError, Donation, DonationEvent, DonationId, Payer, PollId,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// An opaque payment gateway
///
/// Amounts are minor units as produced by [`amount_for_gateway`]. Every
/// method returns the gateway's authorisation reference on success.
pub trait PaymentGateway: Send + Sync {
    /// Reserve an amount on a card
    fn authorize(
        &self,
        amount: i64,
        card: &PaymentCard,
        currency: &str,
    ) -> Result<String, CanvassError>;

    /// Take money previously reserved by `authorize`
    fn capture(&self, amount: i64, authorization: &str, currency: &str)
        -> Result<String, CanvassError>;

    /// Complete an off-site checkout
    fn purchase(
        &self,
        amount: i64,
        checkout: &OffsiteCheckout,
        currency: &str,
    ) -> Result<String, CanvassError>;

    /// Release a reservation
    fn void(&self, authorization: &str) -> Result<(), CanvassError>;

    /// Refund a captured amount
    fn credit(&self, amount: i64, authorization: &str, currency: &str)
        -> Result<String, CanvassError>;
}

/// Receives "new donation" notifications; delivery is best effort
pub trait NotificationSink: Send + Sync {
    /// Tell the donor their donation was received
    fn donor(&self, donation: &Donation) -> Result<(), CanvassError>;

    /// Tell administrators a donation was received
    fn admin(&self, donation: &Donation) -> Result<(), CanvassError>;
}

/// A notification sink that writes to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn donor(&self, donation: &Donation) -> Result<(), CanvassError> {
        info!(to = %donation.user_email, poll = %donation.poll_title, "Donation receipt");
        Ok(())
    }

    fn admin(&self, donation: &Donation) -> Result<(), CanvassError> {
        info!(donation = ?donation.id, amount = %donation.amount, "New donation");
        Ok(())
    }
}

/// Card details for an on-site authorisation
///
/// Never stored; only the gateway's authorisation reference is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCard {
    pub name: String,
    pub number: String,
    pub verification_value: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
}

impl PaymentCard {
    /// Check the fields a gateway cannot do without
    pub fn validate(&self) -> Result<(), CanvassError> {
        if self.name.trim().is_empty() {
            return Err(CanvassError::validation("card_name", "can't be blank"));
        }

        let digits: String = self.number.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.is_empty() {
            return Err(CanvassError::validation("card_number", "can't be blank"));
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) || !(12..=19).contains(&digits.len()) {
            return Err(CanvassError::validation("card_number", "is invalid"));
        }
        if !(1..=12).contains(&self.expiry_month) {
            return Err(CanvassError::validation("card_to", "is invalid"));
        }
        Ok(())
    }
}

/// Identifiers returned by an off-site checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsiteCheckout {
    pub payer_id: String,
    pub token: String,
}

/// Drives donations through a payment gateway
#[derive(Clone)]
pub struct PaymentProcessor {
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationSink>,
}

impl PaymentProcessor {
    pub fn new(gateway: Arc<dyn PaymentGateway>, notifier: Arc<dyn NotificationSink>) -> Self {
        PaymentProcessor { gateway, notifier }
    }

    /// Start a donation, replacing the payer's in-flight one
    ///
    /// Reservations held by replaced donations are voided.
    pub fn begin(
        &self,
        store: &MemoryStore,
        poll_id: PollId,
        payer: &Payer,
        integer: &str,
        fraction: &str,
    ) -> Result<Donation, CanvassError> {
        for replaced in destroy_initial_for(store, payer.id)? {
            self.void_quietly(&replaced);
        }

        let mut donation = generate(store, poll_id, payer, integer, fraction, &DonationOptions::default())?;
        save(store, &mut donation)?;
        Ok(donation)
    }

    /// Reserve a donation's amount on a card
    ///
    /// # Errors
    ///
    /// - `Validation` for an unusable card
    /// - `Gateway` if the gateway refuses; the donation is unchanged
    pub fn authorize(
        &self,
        store: &MemoryStore,
        donation_id: DonationId,
        card: &PaymentCard,
    ) -> Result<Donation, CanvassError> {
        card.validate()?;
        let donation = self.payable(store, donation_id)?;
        let currency = store
            .currency(&donation.currency)
            .ok_or_else(|| CanvassError::currency_not_found(&donation.currency))?;
        let amount = amount_for_gateway(&currency, &donation.amount)?;

        let authorization = self.gateway.authorize(amount, card, &currency.code)?;

        let stored = store.transaction(|tx| {
            let mut donation = tx
                .lock_donation(donation_id)
                .filter(Donation::is_initial)
                .ok_or(CanvassError::DonationNotFound {
                    donation: donation_id,
                })?;
            donation.authorisation_tokens = Some(AuthorisationTokens::Authorised {
                authorization: authorization.clone(),
            });
            tx.put_donation(donation.clone());
            Ok(donation)
        });

        if stored.is_err() {
            // The donation went away while the card was being checked
            if let Err(error) = self.gateway.void(&authorization) {
                warn!(donation = donation_id, %error, "Failed to void reservation");
            }
        }
        stored
    }

    /// Capture an authorised donation and pay it
    ///
    /// # Errors
    ///
    /// - `Gateway` if the capture is refused; nothing changes
    /// - `ChargedButNotRecorded` if the capture succeeded but the payment
    ///   could not be recorded
    pub fn capture(
        &self,
        store: &MemoryStore,
        donation_id: DonationId,
        notes: Option<&str>,
    ) -> Result<Donation, CanvassError> {
        let mut charged = false;

        let result = store.transaction(|tx| {
            let mut donation = tx
                .lock_donation(donation_id)
                .ok_or(CanvassError::DonationNotFound {
                    donation: donation_id,
                })?;
            let authorization = match &donation.authorisation_tokens {
                Some(AuthorisationTokens::Authorised { authorization }) if donation.is_initial() => {
                    authorization.clone()
                }
                _ => {
                    return Err(CanvassError::invalid_transition(
                        &donation.entity(),
                        DonationEvent::Pay,
                        donation.state,
                    ))
                }
            };

            let currency = tx.currency(&donation.currency)?;
            let amount = amount_for_gateway(&currency, &donation.amount)?;
            let captured = self.gateway.capture(amount, &authorization, &currency.code)?;
            charged = true;

            // The invoice sequence is only locked once the gateway has answered
            if let Some(notes) = notes {
                donation.notes = notes.to_string();
            }
            donation.invoice_number = Some(tx.next_invoice_number());
            donation.authorisation_tokens = Some(AuthorisationTokens::Onsite {
                authorization: captured,
            });
            pay(tx, &mut donation)?;
            Ok(donation)
        });

        self.finish(donation_id, result, charged)
    }

    /// Pay a donation through an off-site checkout
    ///
    /// # Errors
    ///
    /// - `Gateway` if the purchase is refused; the payment is rolled back
    /// - `PollNotOpen`/`PollVanished` before anything is charged
    pub fn purchase_offsite(
        &self,
        store: &MemoryStore,
        donation_id: DonationId,
        checkout: &OffsiteCheckout,
        notes: Option<&str>,
    ) -> Result<Donation, CanvassError> {
        let mut charged = false;

        let result = store.transaction(|tx| {
            let mut donation = tx
                .lock_donation(donation_id)
                .ok_or(CanvassError::DonationNotFound {
                    donation: donation_id,
                })?;
            if let Some(notes) = notes {
                donation.notes = notes.to_string();
            }
            donation.invoice_number = Some(tx.next_invoice_number());
            pay(tx, &mut donation)?;

            let currency = tx.currency(&donation.currency)?;
            let amount = amount_for_gateway(&currency, &donation.amount)?;
            let authorization = self.gateway.purchase(amount, checkout, &currency.code)?;
            charged = true;

            donation.authorisation_tokens = Some(AuthorisationTokens::Offsite {
                payer_id: checkout.payer_id.clone(),
                token: checkout.token.clone(),
                authorization,
            });
            tx.put_donation(donation.clone());
            Ok(donation)
        });

        self.finish(donation_id, result, charged)
    }

    /// Abandon an in-flight donation, releasing any reservation
    pub fn cancel(&self, store: &MemoryStore, donation_id: DonationId) -> Result<Donation, CanvassError> {
        let donation = store.transaction(|tx| {
            let donation = tx
                .lock_donation(donation_id)
                .ok_or(CanvassError::DonationNotFound {
                    donation: donation_id,
                })?;
            if !donation.is_initial() {
                return Err(CanvassError::validation("workflow_state", "paid donations cannot be cancelled"));
            }
            tx.delete_donation(donation_id);
            Ok(donation)
        })?;

        self.void_quietly(&donation);
        Ok(donation)
    }

    /// Refund a paid donation at the gateway
    ///
    /// Only the money moves; the donation stays paid and poll totals are
    /// unchanged.
    ///
    /// # Returns
    ///
    /// The gateway's refund reference
    pub fn refund(&self, store: &MemoryStore, donation_id: DonationId) -> Result<String, CanvassError> {
        let donation = store
            .donation(donation_id)
            .ok_or(CanvassError::DonationNotFound {
                donation: donation_id,
            })?;
        let authorization = match &donation.authorisation_tokens {
            Some(tokens @ (AuthorisationTokens::Onsite { .. } | AuthorisationTokens::Offsite { .. })) => {
                tokens.authorization().to_string()
            }
            _ => return Err(CanvassError::gateway("donation was not paid through the gateway")),
        };
        let currency = store
            .currency(&donation.currency)
            .ok_or_else(|| CanvassError::currency_not_found(&donation.currency))?;
        let amount = amount_for_gateway(&currency, &donation.amount)?;

        let reference = self.gateway.credit(amount, &authorization, &currency.code)?;
        info!(donation = donation_id, %reference, "Donation refunded");
        Ok(reference)
    }

    /// An existing, unpaid donation
    fn payable(&self, store: &MemoryStore, donation_id: DonationId) -> Result<Donation, CanvassError> {
        let donation = store
            .donation(donation_id)
            .ok_or(CanvassError::DonationNotFound {
                donation: donation_id,
            })?;
        if !donation.is_initial() {
            return Err(CanvassError::invalid_transition(
                &donation.entity(),
                DonationEvent::Pay,
                donation.state,
            ));
        }
        Ok(donation)
    }

    fn finish(
        &self,
        donation_id: DonationId,
        result: Result<Donation, CanvassError>,
        charged: bool,
    ) -> Result<Donation, CanvassError> {
        match result {
            Ok(donation) => {
                info!(donation = donation_id, invoice = ?donation.invoice_number, "Payment recorded");
                self.notify(&donation);
                Ok(donation)
            }
            Err(error) if charged => {
                error!(donation = donation_id, %error, "Charged but not recorded");
                Err(CanvassError::ChargedButNotRecorded {
                    donation: donation_id,
                    message: error.to_string(),
                })
            }
            Err(error) => Err(error),
        }
    }

    fn notify(&self, donation: &Donation) {
        if let Err(error) = self.notifier.donor(donation) {
            warn!(donation = ?donation.id, %error, "Donor notification failed");
        }
        if let Err(error) = self.notifier.admin(donation) {
            warn!(donation = ?donation.id, %error, "Admin notification failed");
        }
    }

    fn void_quietly(&self, donation: &Donation) {
        if let Some(AuthorisationTokens::Authorised { authorization }) = &donation.authorisation_tokens {
            if let Err(error) = self.gateway.void(authorization) {
                warn!(donation = ?donation.id, %error, "Failed to void reservation");
            }
        }
    }
}
