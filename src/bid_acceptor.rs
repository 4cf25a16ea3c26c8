//! Bid acceptance.
//!
//! Flow:
//! 1. Rate-limit check (attempts, not accepted bids)
//! 2. Snapshot listing and validate
//! 3. Conditional write keyed on the snapshotted current_bid
//! 4. On conflict, re-read and revalidate, bounded retries
//! 5. Ledger event + audit fact

use std::sync::Arc;

use serde_json::json;

use crate::audit::AuditSink;
use crate::ledger::Ledger;
use crate::models::{Bid, LedgerEvent, Listing, ListingStatus, MarketError};
use crate::rate_limit::SlidingWindowLimiter;
use crate::store::{CasOutcome, MarketStore};

/// Conflict retries before giving up. Each retry revalidates against a
/// fresh snapshot, so exhaustion means the price moved this many
/// increments while we were trying.
const MAX_CAS_ATTEMPTS: u32 = 8;

pub struct BidAcceptor {
    store: Arc<MarketStore>,
    ledger: Arc<Ledger>,
    limiter: SlidingWindowLimiter,
    audit: Arc<dyn AuditSink>,
}

/// Preconditions from the snapshot, checked in contract order.
fn validate_bid(
    listing: &Listing,
    bidder_id: u64,
    amount: u64,
    now_ms: i64,
) -> Result<(), MarketError> {
    if listing.status != ListingStatus::Active {
        return Err(MarketError::InvalidState {
            operation: "bid",
            status: listing.status.to_string(),
        });
    }
    if now_ms > listing.end_at {
        return Err(MarketError::ListingExpired { end_at: listing.end_at });
    }
    if bidder_id == listing.creator_id {
        return Err(MarketError::SelfBid);
    }
    let minimum = listing.current_bid + listing.min_increment;
    if amount < minimum {
        return Err(MarketError::BidTooLow { amount, minimum });
    }
    Ok(())
}

impl BidAcceptor {
    pub fn new(
        store: Arc<MarketStore>,
        ledger: Arc<Ledger>,
        audit: Arc<dyn AuditSink>,
        max_attempts_per_window: u32,
        window_secs: u64,
    ) -> Self {
        Self {
            store,
            ledger,
            limiter: SlidingWindowLimiter::new(max_attempts_per_window, window_secs),
            audit,
        }
    }

    pub fn place_bid(
        &self,
        listing_id: u64,
        bidder_id: u64,
        amount: u64,
        now_ms: i64,
    ) -> Result<Bid, MarketError> {
        if amount == 0 {
            return Err(MarketError::InvalidAmount("bid must be positive".to_string()));
        }

        self.limiter.check(bidder_id, now_ms).map_err(|e| MarketError::RateLimited {
            user_id: e.user_id,
            retry_after_secs: e.retry_after_secs,
        })?;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let snapshot = self.store.get_listing(listing_id)?;
            validate_bid(&snapshot, bidder_id, amount, now_ms)?;

            match self.store.compare_and_swap_bid(
                listing_id,
                snapshot.current_bid,
                bidder_id,
                amount,
                now_ms,
            )? {
                CasOutcome::Applied(bid) => {
                    if let Err(e) = self.ledger.append(&LedgerEvent::BidPlaced {
                        listing_id,
                        bidder_id,
                        amount,
                        ts_ms: now_ms,
                    }) {
                        log::error!("CRITICAL: bid {} accepted but ledger append failed: {}", bid.id, e);
                    }
                    self.audit.record(
                        "BID_PLACED",
                        bidder_id,
                        json!({ "listing_id": listing_id, "amount": amount }),
                    );
                    return Ok(bid);
                }
                CasOutcome::Conflict { current_bid } => {
                    log::debug!(
                        "Bid CAS conflict on listing {}: expected {}, now {}",
                        listing_id,
                        snapshot.current_bid,
                        current_bid
                    );
                    continue;
                }
            }
        }

        Err(MarketError::BidContention)
    }

    pub fn remaining_quota(&self, bidder_id: u64, now_ms: i64) -> u32 {
        self.limiter.remaining_quota(bidder_id, now_ms)
    }

    /// Clears a user's attempt window. Admin path only.
    pub fn reset_quota(&self, bidder_id: u64) {
        self.limiter.reset_user(bidder_id);
    }
}
