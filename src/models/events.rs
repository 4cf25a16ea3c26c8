use serde::{Deserialize, Serialize};

use super::listing::{ListingId, UserId};

/// Typed balance-affecting events, appended to the ledger as they
/// happen. Tagged variants replace the text-keyed audit blob the
/// source parsed at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LedgerEvent {
    BidPlaced {
        listing_id: ListingId,
        bidder_id: UserId,
        amount: u64,
        ts_ms: i64,
    },
    PaymentSettled {
        listing_id: ListingId,
        payer_id: UserId,
        creator_id: UserId,
        amount: u64,
        fee_amount: u64,
        net_amount: u64,
        reference: String,
        ts_ms: i64,
    },
    EscrowReleased {
        listing_id: ListingId,
        creator_id: UserId,
        net_amount: u64,
        ts_ms: i64,
    },
    PayoutRequested {
        user_id: UserId,
        amount: u64,
        ts_ms: i64,
    },
}

impl LedgerEvent {
    /// The wallet-bearing party this event is about.
    pub fn user_id(&self) -> UserId {
        match self {
            Self::BidPlaced { bidder_id, .. } => *bidder_id,
            Self::PaymentSettled { creator_id, .. } => *creator_id,
            Self::EscrowReleased { creator_id, .. } => *creator_id,
            Self::PayoutRequested { user_id, .. } => *user_id,
        }
    }

    pub fn listing_id(&self) -> Option<ListingId> {
        match self {
            Self::BidPlaced { listing_id, .. }
            | Self::PaymentSettled { listing_id, .. }
            | Self::EscrowReleased { listing_id, .. } => Some(*listing_id),
            Self::PayoutRequested { .. } => None,
        }
    }

    pub fn ts_ms(&self) -> i64 {
        match self {
            Self::BidPlaced { ts_ms, .. }
            | Self::PaymentSettled { ts_ms, .. }
            | Self::EscrowReleased { ts_ms, .. }
            | Self::PayoutRequested { ts_ms, .. } => *ts_ms,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BidPlaced { .. } => "bid_placed",
            Self::PaymentSettled { .. } => "payment_settled",
            Self::EscrowReleased { .. } => "escrow_released",
            Self::PayoutRequested { .. } => "payout_requested",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_encoding() {
        let event = LedgerEvent::EscrowReleased {
            listing_id: 7,
            creator_id: 42,
            net_amount: 4750,
            ts_ms: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "EscrowReleased");
        assert_eq!(json["data"]["net_amount"], 4750);

        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.user_id(), 42);
        assert_eq!(back.listing_id(), Some(7));
    }
}
