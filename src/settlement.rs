//! Payment settlement.
//!
//! `initiate_payment` asks the gateway for a redirect target; the
//! Payment row (INITIATED) is only written after the gateway call
//! returns, so a hung or failed call leaves no local state behind.
//!
//! `verify_payment` is idempotent: an already-settled payment returns
//! success without touching the gateway. A fresh verification applies
//! three effects as one unit under the store lock: payment SUCCESS,
//! listing PAID, creator wallet credited by the net amount. Partial
//! application of that unit is a correctness violation.

use std::sync::Arc;

use serde_json::json;

use crate::audit::AuditSink;
use crate::ledger::Ledger;
use crate::models::{
    LedgerEvent, ListingEvent, ListingStatus, MarketError, Payment, PaymentStatus,
};
use crate::payment_gateway::{
    GatewayError, InitializeRequest, PaymentGateway, VerifyStatus, MINOR_UNITS,
};
use crate::store::MarketStore;
use crate::utils::{generate_id, payment_reference};

#[derive(Debug, Clone, serde::Serialize)]
pub struct PaymentInit {
    pub reference: String,
    pub redirect_url: String,
    pub amount: u64,
    pub fee_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// This call settled the payment and credited the creator
    Settled { listing_id: u64, net_amount: u64 },
    /// A previous call already settled it; nothing changed
    AlreadySettled { listing_id: u64 },
    /// Gateway truth says the charge failed; listing unchanged
    Failed,
}

pub struct PaymentSettlement {
    store: Arc<MarketStore>,
    ledger: Arc<Ledger>,
    gateway: Arc<dyn PaymentGateway>,
    audit: Arc<dyn AuditSink>,
    /// Platform fee as a fraction, e.g. 0.05
    fee_percent: f64,
    callback_url: String,
}

fn map_gateway_error(err: GatewayError) -> MarketError {
    match err {
        GatewayError::Declined(msg) => MarketError::GatewayDeclined(msg),
        GatewayError::Transport(msg) => MarketError::GatewayUnavailable(msg),
        GatewayError::Timeout(msg) => MarketError::GatewayTimeout(msg),
    }
}

impl PaymentSettlement {
    pub fn new(
        store: Arc<MarketStore>,
        ledger: Arc<Ledger>,
        gateway: Arc<dyn PaymentGateway>,
        audit: Arc<dyn AuditSink>,
        fee_percent: f64,
        callback_url: String,
    ) -> Self {
        Self { store, ledger, gateway, audit, fee_percent, callback_url }
    }

    pub fn fee_for(&self, amount: u64) -> u64 {
        (amount as f64 * self.fee_percent).round() as u64
    }

    /// Only the declared winner may pay, and only before settlement.
    pub async fn initiate_payment(
        &self,
        listing_id: u64,
        payer_id: u64,
        payer_email: String,
        now_ms: i64,
    ) -> Result<PaymentInit, MarketError> {
        let listing = self.store.get_listing(listing_id)?;

        if listing.winner_user_id != Some(payer_id) {
            return Err(MarketError::NotWinner { user_id: payer_id });
        }
        if matches!(
            listing.status,
            ListingStatus::Paid | ListingStatus::InProgress | ListingStatus::Completed
        ) {
            return Err(MarketError::AlreadyPaid);
        }

        let amount = listing.current_bid;
        let fee_amount = self.fee_for(amount);
        let net_amount = amount - fee_amount;
        let reference = payment_reference();

        // Out-of-process call; no local state has been written yet.
        let init = self
            .gateway
            .initialize(InitializeRequest {
                email: payer_email,
                amount: amount * MINOR_UNITS,
                reference: reference.clone(),
                callback_url: self.callback_url.clone(),
                metadata: json!({ "listing_id": listing_id, "payer_id": payer_id }),
            })
            .await
            .map_err(map_gateway_error)?;

        let payment = Payment {
            id: generate_id(),
            listing_id,
            payer_id,
            amount,
            fee_amount,
            net_amount,
            reference: init.reference.clone(),
            status: PaymentStatus::Initiated,
            initiated_at: now_ms,
            verified_at: None,
            escrow_released_at: None,
        };

        self.store.with(|inner| {
            // The listing may have moved while we awaited the gateway
            let listing = inner.listing(listing_id)?;
            if matches!(
                listing.status,
                ListingStatus::Paid | ListingStatus::InProgress | ListingStatus::Completed
            ) {
                return Err(MarketError::AlreadyPaid);
            }
            inner.payments.insert(payment.reference.clone(), payment.clone());
            Ok(())
        })?;

        self.audit.record(
            "PAYMENT_INITIATED",
            payer_id,
            json!({ "listing_id": listing_id, "reference": init.reference, "amount": amount }),
        );

        Ok(PaymentInit {
            reference: init.reference,
            redirect_url: init.redirect_url,
            amount,
            fee_amount,
        })
    }

    pub async fn verify_payment(
        &self,
        reference: &str,
        now_ms: i64,
    ) -> Result<VerifyOutcome, MarketError> {
        let payment = self.store.get_payment(reference)?;

        // Idempotent fast path: settled means settled, no gateway call
        if payment.status.is_settled() {
            return Ok(VerifyOutcome::AlreadySettled { listing_id: payment.listing_id });
        }

        // Gateway truth. Timeout and transport failures are "unknown
        // outcome": the payment stays INITIATED for a later re-check.
        let status = self
            .gateway
            .verify(reference.to_string())
            .await
            .map_err(map_gateway_error)?;

        match status {
            VerifyStatus::Success { amount, .. } => {
                if amount != payment.amount * MINOR_UNITS {
                    log::warn!(
                        "Payment {} amount mismatch: gateway {} vs expected {}",
                        reference,
                        amount,
                        payment.amount * MINOR_UNITS
                    );
                    self.mark_failed(reference)?;
                    return Ok(VerifyOutcome::Failed);
                }
                self.settle(reference, now_ms)
            }
            VerifyStatus::Failed => {
                self.mark_failed(reference)?;
                self.audit.record(
                    "PAYMENT_FAILED",
                    payment.payer_id,
                    json!({ "reference": reference, "listing_id": payment.listing_id }),
                );
                Ok(VerifyOutcome::Failed)
            }
        }
    }

    /// All-or-nothing settlement unit: payment SUCCESS, listing PAID
    /// and the wallet credit become visible together.
    fn settle(&self, reference: &str, now_ms: i64) -> Result<VerifyOutcome, MarketError> {
        let settled = self.store.with(|inner| {
            let payment = inner
                .payments
                .get(reference)
                .ok_or_else(|| MarketError::PaymentNotFound(reference.to_string()))?
                .clone();

            // Re-check under the lock: a concurrent verify may have won
            if payment.status.is_settled() {
                return Ok(None);
            }

            let listing = inner.listing_mut(payment.listing_id)?;
            listing.transition(ListingEvent::Settle).map_err(|_| MarketError::InvalidState {
                operation: "settle payment",
                status: listing.status.to_string(),
            })?;
            let creator_id = listing.creator_id;

            let record = inner
                .payments
                .get_mut(reference)
                .ok_or_else(|| MarketError::PaymentNotFound(reference.to_string()))?;
            record.status = PaymentStatus::Success;
            record.verified_at = Some(now_ms);

            inner.user_mut(creator_id).wallet.credit(payment.net_amount);

            Ok(Some((payment, creator_id)))
        })?;

        let (payment, creator_id) = match settled {
            Some(v) => v,
            None => {
                let payment = self.store.get_payment(reference)?;
                return Ok(VerifyOutcome::AlreadySettled { listing_id: payment.listing_id });
            }
        };

        if let Err(e) = self.ledger.append(&LedgerEvent::PaymentSettled {
            listing_id: payment.listing_id,
            payer_id: payment.payer_id,
            creator_id,
            amount: payment.amount,
            fee_amount: payment.fee_amount,
            net_amount: payment.net_amount,
            reference: reference.to_string(),
            ts_ms: now_ms,
        }) {
            log::error!(
                "CRITICAL: payment {} settled but ledger append failed: {}",
                reference,
                e
            );
        }
        self.audit.record(
            "PAYMENT_SETTLED",
            payment.payer_id,
            json!({
                "reference": reference,
                "listing_id": payment.listing_id,
                "net_amount": payment.net_amount,
            }),
        );

        Ok(VerifyOutcome::Settled {
            listing_id: payment.listing_id,
            net_amount: payment.net_amount,
        })
    }

    fn mark_failed(&self, reference: &str) -> Result<(), MarketError> {
        self.store.with(|inner| {
            let record = inner
                .payments
                .get_mut(reference)
                .ok_or_else(|| MarketError::PaymentNotFound(reference.to_string()))?;
            if record.status == PaymentStatus::Initiated {
                record.status = PaymentStatus::Failed;
            }
            Ok(())
        })
    }
}
