//! Lifecycle driver.
//!
//! Advances a listing through its state machine. Every transition
//! validates before mutating and runs as one unit under the store
//! lock, so a failed precondition leaves no partial effect. Check
//! order within a transition: authorization, then state, then
//! auxiliary data existence.

use std::sync::Arc;

use serde_json::json;

use crate::audit::AuditSink;
use crate::ledger::Ledger;
use crate::models::{
    Dispute, DisputeStatus, LedgerEvent, Listing, ListingEvent, ListingStatus, MarketError,
    PaymentStatus,
};
use crate::store::MarketStore;
use crate::utils::generate_id;

pub struct LifecycleDriver {
    store: Arc<MarketStore>,
    ledger: Arc<Ledger>,
    audit: Arc<dyn AuditSink>,
    /// How long the winner has to pay after selection
    payment_due_ms: i64,
}

impl LifecycleDriver {
    pub fn new(
        store: Arc<MarketStore>,
        ledger: Arc<Ledger>,
        audit: Arc<dyn AuditSink>,
        payment_due_hours: i64,
    ) -> Self {
        Self { store, ledger, audit, payment_due_ms: payment_due_hours * 3600 * 1000 }
    }

    fn invalid_state(operation: &'static str, status: ListingStatus) -> MarketError {
        MarketError::InvalidState { operation, status: status.to_string() }
    }

    /// Creator-initiated early end. Requires at least one bid so the
    /// creator cannot shortcut an empty auction into winner selection.
    pub fn end_listing(
        &self,
        listing_id: u64,
        caller_id: u64,
        now_ms: i64,
    ) -> Result<Listing, MarketError> {
        let ended = self.store.with(|inner| {
            let has_bids = !inner.bids_for(listing_id).is_empty();
            let listing = inner.listing_mut(listing_id)?;

            if caller_id != listing.creator_id {
                return Err(MarketError::NotCreator { user_id: caller_id });
            }
            if listing.status != ListingStatus::Active {
                return Err(Self::invalid_state("end", listing.status));
            }
            if !has_bids {
                return Err(MarketError::InvalidState {
                    operation: "end",
                    status: "active with no bids".to_string(),
                });
            }

            listing.transition(ListingEvent::End).map_err(MarketError::Unknown)?;
            Ok(listing.clone())
        })?;

        self.audit.record(
            "LISTING_ENDED",
            caller_id,
            json!({ "listing_id": listing_id, "at": now_ms, "early": true }),
        );
        Ok(ended)
    }

    /// One-time, irreversible winner selection. No re-selection path.
    pub fn select_winner(
        &self,
        listing_id: u64,
        caller_id: u64,
        winner_user_id: u64,
        now_ms: i64,
    ) -> Result<Listing, MarketError> {
        let payment_due_ms = self.payment_due_ms;
        let selected = self.store.with(|inner| {
            let winning_amount = inner
                .best_bid_by(listing_id, winner_user_id)
                .map(|b| b.amount);
            let listing = inner.listing_mut(listing_id)?;

            if caller_id != listing.creator_id {
                return Err(MarketError::NotCreator { user_id: caller_id });
            }
            if listing.status != ListingStatus::Ended {
                return Err(Self::invalid_state("select winner", listing.status));
            }
            if listing.winner_user_id.is_some() {
                return Err(MarketError::WinnerAlreadySelected);
            }
            let winning_amount = winning_amount.ok_or(MarketError::BidNotFound {
                listing_id,
                bidder_id: winner_user_id,
            })?;

            listing.winner_user_id = Some(winner_user_id);
            // Defensive re-sync: the winning bid's amount is the price
            listing.current_bid = winning_amount;
            listing.selected_at = Some(now_ms);
            listing.payment_due_at = Some(now_ms + payment_due_ms);
            Ok(listing.clone())
        })?;

        self.audit.record(
            "WINNER_SELECTED",
            caller_id,
            json!({
                "listing_id": listing_id,
                "winner_user_id": winner_user_id,
                "amount": selected.current_bid,
            }),
        );
        Ok(selected)
    }

    /// Creator confirms delivery. Idempotent re-entry from InProgress.
    pub fn mark_delivered(
        &self,
        listing_id: u64,
        caller_id: u64,
        now_ms: i64,
    ) -> Result<Listing, MarketError> {
        let delivered = self.store.with(|inner| {
            let listing = inner.listing_mut(listing_id)?;

            if caller_id != listing.creator_id {
                return Err(MarketError::NotCreator { user_id: caller_id });
            }
            if !matches!(listing.status, ListingStatus::Paid | ListingStatus::InProgress) {
                return Err(Self::invalid_state("deliver", listing.status));
            }

            listing.transition(ListingEvent::Deliver).map_err(MarketError::Unknown)?;
            listing.delivered_at = Some(now_ms);
            Ok(listing.clone())
        })?;

        self.audit.record(
            "DELIVERY_CONFIRMED",
            caller_id,
            json!({ "listing_id": listing_id, "at": now_ms }),
        );
        Ok(delivered)
    }

    /// Escrow release. Winner-invoked, exactly once per listing:
    /// listing -> COMPLETED, payment -> RELEASED, creator wallet and
    /// counters credited, all under one lock.
    pub fn complete_transaction(
        &self,
        listing_id: u64,
        caller_id: u64,
        now_ms: i64,
    ) -> Result<Listing, MarketError> {
        let (completed, net_amount, creator_id) = self.store.with(|inner| {
            let payment_ref = inner
                .success_payment_for(listing_id)
                .map(|p| p.reference.clone());
            let listing = inner.listing_mut(listing_id)?;

            if listing.winner_user_id != Some(caller_id) {
                return Err(MarketError::NotWinner { user_id: caller_id });
            }
            if !matches!(listing.status, ListingStatus::Paid | ListingStatus::InProgress) {
                return Err(Self::invalid_state("complete", listing.status));
            }
            if listing.delivered_at.is_none() {
                return Err(MarketError::NotDelivered);
            }
            let payment_ref = payment_ref.ok_or(MarketError::InvalidState {
                operation: "complete",
                status: "no settled payment".to_string(),
            })?;

            listing.transition(ListingEvent::Complete).map_err(MarketError::Unknown)?;
            listing.completed_at = Some(now_ms);
            listing.escrow_released_at = Some(now_ms);
            let creator_id = listing.creator_id;
            let snapshot = listing.clone();

            let payment = inner
                .payments
                .get_mut(&payment_ref)
                .ok_or_else(|| MarketError::PaymentNotFound(payment_ref.clone()))?;
            payment.status = PaymentStatus::Released;
            payment.escrow_released_at = Some(now_ms);
            let net_amount = payment.net_amount;

            let creator = inner.user_mut(creator_id);
            creator.wallet.credit(net_amount);
            creator.total_sales += 1;
            creator.total_earnings += net_amount;

            Ok((snapshot, net_amount, creator_id))
        })?;

        if let Err(e) = self.ledger.append(&LedgerEvent::EscrowReleased {
            listing_id,
            creator_id,
            net_amount,
            ts_ms: now_ms,
        }) {
            log::error!(
                "CRITICAL: escrow released for listing {} but ledger append failed: {}",
                listing_id,
                e
            );
        }
        self.audit.record(
            "ESCROW_RELEASED",
            caller_id,
            json!({ "listing_id": listing_id, "net_amount": net_amount }),
        );
        Ok(completed)
    }

    /// Either party may dispute while money is in escrow. At most one
    /// unresolved dispute per listing.
    pub fn open_dispute(
        &self,
        listing_id: u64,
        caller_id: u64,
        reason: String,
        now_ms: i64,
    ) -> Result<Dispute, MarketError> {
        let dispute = self.store.with(|inner| {
            let dispute_open = inner.has_unresolved_dispute(listing_id);
            let listing = inner.listing_mut(listing_id)?;

            let against_id = if caller_id == listing.creator_id {
                listing.winner_user_id.ok_or(MarketError::InvalidState {
                    operation: "dispute",
                    status: "no winner selected".to_string(),
                })?
            } else if listing.winner_user_id == Some(caller_id) {
                listing.creator_id
            } else {
                return Err(MarketError::NotParticipant { user_id: caller_id });
            };
            if !matches!(listing.status, ListingStatus::Paid | ListingStatus::InProgress) {
                return Err(Self::invalid_state("dispute", listing.status));
            }
            if dispute_open {
                return Err(MarketError::DisputeAlreadyOpen);
            }

            listing.transition(ListingEvent::Dispute).map_err(MarketError::Unknown)?;

            let dispute = Dispute {
                id: generate_id(),
                listing_id,
                created_by_id: caller_id,
                against_id,
                reason,
                status: DisputeStatus::Open,
                opened_at: now_ms,
            };
            inner.disputes.entry(listing_id).or_default().push(dispute.clone());
            Ok(dispute)
        })?;

        self.audit.record(
            "DISPUTE_OPENED",
            caller_id,
            json!({ "listing_id": listing_id, "against_id": dispute.against_id }),
        );
        Ok(dispute)
    }

    /// Creator withdraws an auction nobody has bid on yet.
    pub fn cancel_listing(
        &self,
        listing_id: u64,
        caller_id: u64,
        now_ms: i64,
    ) -> Result<Listing, MarketError> {
        let cancelled = self.store.with(|inner| {
            let has_bids = !inner.bids_for(listing_id).is_empty();
            let listing = inner.listing_mut(listing_id)?;

            if caller_id != listing.creator_id {
                return Err(MarketError::NotCreator { user_id: caller_id });
            }
            if listing.status != ListingStatus::Active {
                return Err(Self::invalid_state("cancel", listing.status));
            }
            if has_bids {
                return Err(MarketError::InvalidState {
                    operation: "cancel",
                    status: "active with bids".to_string(),
                });
            }

            listing.transition(ListingEvent::Cancel).map_err(MarketError::Unknown)?;
            Ok(listing.clone())
        })?;

        self.audit.record(
            "LISTING_CANCELLED",
            caller_id,
            json!({ "listing_id": listing_id, "at": now_ms }),
        );
        Ok(cancelled)
    }
}
