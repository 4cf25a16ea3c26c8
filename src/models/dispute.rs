use serde::{Deserialize, Serialize};

use super::listing::{ListingId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeStatus {
    Open,
    #[serde(rename = "under_review")]
    UnderReview,
    Resolved,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::UnderReview => "under_review",
            Self::Resolved => "resolved",
        }
    }

    /// Open and under-review disputes block a second dispute on the
    /// same listing.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Open | Self::UnderReview)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: u64,
    pub listing_id: ListingId,
    pub created_by_id: UserId,
    pub against_id: UserId,
    pub reason: String,
    pub status: DisputeStatus,
    pub opened_at: i64,
}
