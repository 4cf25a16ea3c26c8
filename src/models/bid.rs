use serde::{Deserialize, Serialize};

use super::listing::{ListingId, UserId};

/// An accepted bid. Immutable once created: no edits, no retraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: u64,
    pub listing_id: ListingId,
    pub bidder_id: UserId,
    pub amount: u64,
    pub created_at: i64,
}
