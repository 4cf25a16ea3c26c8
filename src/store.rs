//! In-memory listing repository.
//!
//! All shared mutable state (listing status/current_bid, wallets) lives
//! behind one mutex; every multi-field transition runs to completion
//! under the lock, so readers never observe a half-applied change.
//! Bid acceptance goes through an explicit compare-and-swap keyed on
//! the expected prior `current_bid`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{
    Bid, Dispute, Listing, ListingStatus, MarketError, NewListing, Payment,
    PayoutAccount, PayoutRequest, UserProfile,
};
use crate::utils::generate_id;

/// Outcome of a conditional bid write.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The write applied; the accepted bid is returned.
    Applied(Bid),
    /// Another bid landed first; caller re-reads and revalidates.
    Conflict { current_bid: u64 },
}

#[derive(Default)]
pub struct StoreInner {
    pub listings: HashMap<u64, Listing>,
    /// Accepted bids per listing, in acceptance order.
    pub bids: HashMap<u64, Vec<Bid>>,
    /// Payments keyed by gateway reference.
    pub payments: HashMap<String, Payment>,
    pub users: HashMap<u64, UserProfile>,
    pub disputes: HashMap<u64, Vec<Dispute>>,
    pub payout_requests: Vec<PayoutRequest>,
}

impl StoreInner {
    pub fn listing(&self, listing_id: u64) -> Result<&Listing, MarketError> {
        self.listings.get(&listing_id).ok_or(MarketError::ListingNotFound(listing_id))
    }

    pub fn listing_mut(&mut self, listing_id: u64) -> Result<&mut Listing, MarketError> {
        self.listings.get_mut(&listing_id).ok_or(MarketError::ListingNotFound(listing_id))
    }

    pub fn bids_for(&self, listing_id: u64) -> &[Bid] {
        self.bids.get(&listing_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Highest recorded bid by a given user on a listing.
    pub fn best_bid_by(&self, listing_id: u64, bidder_id: u64) -> Option<&Bid> {
        self.bids_for(listing_id)
            .iter()
            .filter(|b| b.bidder_id == bidder_id)
            .max_by_key(|b| b.amount)
    }

    pub fn user_mut(&mut self, user_id: u64) -> &mut UserProfile {
        self.users.entry(user_id).or_insert_with(|| UserProfile::new(user_id))
    }

    pub fn success_payment_for(&self, listing_id: u64) -> Option<&Payment> {
        self.payments
            .values()
            .find(|p| p.listing_id == listing_id && p.status.is_settled())
    }

    pub fn has_unresolved_dispute(&self, listing_id: u64) -> bool {
        self.disputes
            .get(&listing_id)
            .map(|ds| ds.iter().any(|d| d.status.is_unresolved()))
            .unwrap_or(false)
    }
}

pub struct MarketStore {
    inner: Mutex<StoreInner>,
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(StoreInner::default()) }
    }

    /// Run a fallible transition under the store lock. The closure's
    /// effects are visible to other callers only after it returns Ok;
    /// an Err aborts with no partial effect as long as the closure
    /// validates before mutating (all callers in this crate do).
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut StoreInner) -> Result<R, MarketError>,
    ) -> Result<R, MarketError> {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner)
    }

    /// Read-only access under the same lock.
    pub fn read<R>(&self, f: impl FnOnce(&StoreInner) -> R) -> R {
        let inner = self.inner.lock().unwrap();
        f(&inner)
    }

    pub fn create_listing(&self, new: NewListing, now_ms: i64) -> Result<Listing, MarketError> {
        if new.title.trim().is_empty() {
            return Err(MarketError::InvalidField { field: "title", reason: "empty".to_string() });
        }
        if new.title.len() > 200 {
            return Err(MarketError::InvalidField {
                field: "title",
                reason: "longer than 200 chars".to_string(),
            });
        }
        if !(1..=10).contains(&new.weirdness) {
            return Err(MarketError::InvalidField {
                field: "weirdness",
                reason: format!("{} outside 1-10", new.weirdness),
            });
        }
        if new.min_increment == 0 {
            return Err(MarketError::InvalidAmount("min_increment must be positive".to_string()));
        }
        if new.end_at <= now_ms {
            return Err(MarketError::InvalidField {
                field: "end_at",
                reason: "must be in the future".to_string(),
            });
        }

        let listing = Listing {
            id: generate_id(),
            creator_id: new.creator_id,
            title: new.title,
            description: new.description,
            category: new.category,
            weirdness: new.weirdness,
            starting_bid: new.starting_bid,
            min_increment: new.min_increment,
            current_bid: new.starting_bid,
            highest_bidder_id: None,
            end_at: new.end_at,
            status: ListingStatus::Active,
            winner_user_id: None,
            selected_at: None,
            payment_due_at: None,
            delivered_at: None,
            completed_at: None,
            escrow_released_at: None,
            created_at: now_ms,
        };

        self.with(|inner| {
            inner.users.entry(listing.creator_id).or_insert_with(|| UserProfile::new(listing.creator_id));
            inner.listings.insert(listing.id, listing.clone());
            Ok(listing.clone())
        })
    }

    pub fn get_listing(&self, listing_id: u64) -> Result<Listing, MarketError> {
        self.read(|inner| inner.listings.get(&listing_id).cloned())
            .ok_or(MarketError::ListingNotFound(listing_id))
    }

    pub fn get_user(&self, user_id: u64) -> Result<UserProfile, MarketError> {
        self.read(|inner| inner.users.get(&user_id).cloned())
            .ok_or(MarketError::UserNotFound(user_id))
    }

    pub fn upsert_user(&self, user_id: u64) -> UserProfile {
        self.inner.lock().unwrap().user_mut(user_id).clone()
    }

    pub fn set_payout_account(
        &self,
        user_id: u64,
        account: PayoutAccount,
    ) -> Result<(), MarketError> {
        self.with(|inner| {
            inner.user_mut(user_id).payout_account = Some(account);
            Ok(())
        })
    }

    pub fn get_payment(&self, reference: &str) -> Result<Payment, MarketError> {
        self.read(|inner| inner.payments.get(reference).cloned())
            .ok_or_else(|| MarketError::PaymentNotFound(reference.to_string()))
    }

    pub fn payout_requests_for(&self, user_id: u64) -> Vec<PayoutRequest> {
        self.read(|inner| {
            inner
                .payout_requests
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect()
        })
    }

    /// Conditional bid write:
    /// `update listing set current_bid = :amount, highest_bidder_id = :bidder
    ///  where id = :listing_id and current_bid = :expected_prior and status = active`.
    ///
    /// The bid row and the listing update land together or not at all.
    /// Status and expiry are re-checked under the lock so a sweep or
    /// early end racing the bidder cannot be overwritten.
    pub fn compare_and_swap_bid(
        &self,
        listing_id: u64,
        expected_prior: u64,
        bidder_id: u64,
        amount: u64,
        now_ms: i64,
    ) -> Result<CasOutcome, MarketError> {
        self.with(|inner| {
            let listing = inner.listing_mut(listing_id)?;

            if listing.status != ListingStatus::Active {
                return Err(MarketError::InvalidState {
                    operation: "bid",
                    status: listing.status.to_string(),
                });
            }
            if now_ms > listing.end_at {
                return Err(MarketError::ListingExpired { end_at: listing.end_at });
            }
            if listing.current_bid != expected_prior {
                return Ok(CasOutcome::Conflict { current_bid: listing.current_bid });
            }

            let bid = Bid {
                id: generate_id(),
                listing_id,
                bidder_id,
                amount,
                created_at: now_ms,
            };

            listing.current_bid = amount;
            listing.highest_bidder_id = Some(bidder_id);
            inner.bids.entry(listing_id).or_default().push(bid.clone());
            inner.users.entry(bidder_id).or_insert_with(|| UserProfile::new(bidder_id));

            Ok(CasOutcome::Applied(bid))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_listing(store: &MarketStore, now: i64) -> Listing {
        store
            .create_listing(
                NewListing {
                    creator_id: 1,
                    title: "Personalized sea shanty".to_string(),
                    description: "One verse about your cat".to_string(),
                    category: Some("music".to_string()),
                    weirdness: 7,
                    starting_bid: 5000,
                    min_increment: 500,
                    end_at: now + 60_000,
                },
                now,
            )
            .unwrap()
    }

    #[test]
    fn test_create_listing_validation() {
        let store = MarketStore::new();
        let now = 1_000;

        let mut bad = NewListing {
            creator_id: 1,
            title: "ok".to_string(),
            description: String::new(),
            category: None,
            weirdness: 11,
            starting_bid: 100,
            min_increment: 10,
            end_at: now + 1000,
        };
        assert!(store.create_listing(bad.clone(), now).is_err());

        bad.weirdness = 5;
        bad.end_at = now - 1;
        assert!(store.create_listing(bad.clone(), now).is_err());

        bad.end_at = now + 1000;
        bad.min_increment = 0;
        assert!(store.create_listing(bad, now).is_err());
    }

    #[test]
    fn test_cas_applies_and_conflicts() {
        let store = MarketStore::new();
        let now = 1_000;
        let listing = active_listing(&store, now);

        let out = store
            .compare_and_swap_bid(listing.id, 5000, 2, 5500, now)
            .unwrap();
        assert!(matches!(out, CasOutcome::Applied(_)));

        // Stale expectation: another writer got in first
        let out = store
            .compare_and_swap_bid(listing.id, 5000, 3, 6000, now)
            .unwrap();
        match out {
            CasOutcome::Conflict { current_bid } => assert_eq!(current_bid, 5500),
            other => panic!("expected conflict, got {:?}", other),
        }

        let fresh = store.get_listing(listing.id).unwrap();
        assert_eq!(fresh.current_bid, 5500);
        assert_eq!(fresh.highest_bidder_id, Some(2));
    }

    #[test]
    fn test_cas_rejects_non_active_listing() {
        let store = MarketStore::new();
        let now = 1_000;
        let listing = active_listing(&store, now);

        store
            .with(|inner| {
                inner.listing_mut(listing.id)?.status = ListingStatus::Ended;
                Ok(())
            })
            .unwrap();

        let err = store
            .compare_and_swap_bid(listing.id, 5000, 2, 5500, now)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
    }

    #[test]
    fn test_cas_rejects_past_end_at() {
        let store = MarketStore::new();
        let now = 1_000;
        let listing = active_listing(&store, now);

        let err = store
            .compare_and_swap_bid(listing.id, 5000, 2, 5500, listing.end_at + 1)
            .unwrap_err();
        assert_eq!(err.error_code(), "LISTING_EXPIRED");
    }
}
