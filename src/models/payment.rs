use serde::{Deserialize, Serialize};
use std::fmt;

use super::listing::{ListingId, UserId};

/// States of the payment lifecycle.
/// INITIATED -> SUCCESS | FAILED via gateway verification;
/// SUCCESS -> RELEASED when escrow is released to the creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Initiated,
    Success,
    Failed,
    Released,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Released => "released",
        }
    }

    /// Settled payments never go back to gateway verification.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success | Self::Released)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment record, created only after the gateway accepted the
/// initialize call. Immutable audit fact apart from status timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: u64,
    pub listing_id: ListingId,
    pub payer_id: UserId,
    pub amount: u64,
    pub fee_amount: u64,
    /// amount - fee_amount, credited to the creator on release
    pub net_amount: u64,
    /// Globally-unique external correlation id
    pub reference: String,
    pub status: PaymentStatus,
    pub initiated_at: i64,
    pub verified_at: Option<i64>,
    pub escrow_released_at: Option<i64>,
}
