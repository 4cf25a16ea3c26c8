// Error types for the marketplace core
use std::fmt;

#[derive(Debug, Clone)]
pub enum MarketError {
    // Validation errors
    InvalidAmount(String),
    BidTooLow { amount: u64, minimum: u64 },
    SelfBid,
    InvalidField { field: &'static str, reason: String },
    BelowMinimumWithdrawal { amount: u64, minimum: u64 },
    InsufficientBalance { available: u64, required: u64 },
    MissingPayoutAccount,

    // Authorization errors
    NotCreator { user_id: u64 },
    NotWinner { user_id: u64 },
    NotParticipant { user_id: u64 },

    // State errors
    InvalidState { operation: &'static str, status: String },
    ListingExpired { end_at: i64 },
    WinnerAlreadySelected,
    AlreadyPaid,
    NotDelivered,
    DisputeAlreadyOpen,
    BidContention,

    // Missing data
    ListingNotFound(u64),
    PaymentNotFound(String),
    UserNotFound(u64),
    BidNotFound { listing_id: u64, bidder_id: u64 },

    // Throttling
    RateLimited { user_id: u64, retry_after_secs: u64 },

    // External failures
    GatewayDeclined(String),
    GatewayUnavailable(String),
    GatewayTimeout(String),

    // Unknown
    Unknown(String),
}

impl fmt::Display for MarketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),
            Self::BidTooLow { amount, minimum } => {
                write!(f, "Bid {} below minimum {}", amount, minimum)
            }
            Self::SelfBid => write!(f, "Creator cannot bid on own listing"),
            Self::InvalidField { field, reason } => write!(f, "Invalid {}: {}", field, reason),
            Self::BelowMinimumWithdrawal { amount, minimum } => {
                write!(f, "Withdrawal {} below minimum {}", amount, minimum)
            }
            Self::InsufficientBalance { available, required } => {
                write!(f, "Insufficient balance: have {}, need {}", available, required)
            }
            Self::MissingPayoutAccount => write!(f, "No payout destination on file"),
            Self::NotCreator { user_id } => {
                write!(f, "User {} is not the listing creator", user_id)
            }
            Self::NotWinner { user_id } => {
                write!(f, "User {} is not the declared winner", user_id)
            }
            Self::NotParticipant { user_id } => {
                write!(f, "User {} is neither creator nor winner", user_id)
            }
            Self::InvalidState { operation, status } => {
                write!(f, "Cannot {} while listing is {}", operation, status)
            }
            Self::ListingExpired { end_at } => {
                write!(f, "Listing ended at {}", end_at)
            }
            Self::WinnerAlreadySelected => write!(f, "Winner already selected"),
            Self::AlreadyPaid => write!(f, "Listing is already paid for"),
            Self::NotDelivered => write!(f, "Delivery has not been confirmed"),
            Self::DisputeAlreadyOpen => write!(f, "A dispute is already open for this listing"),
            Self::BidContention => write!(f, "Too much concurrent bid activity, try again"),
            Self::ListingNotFound(id) => write!(f, "Listing {} not found", id),
            Self::PaymentNotFound(reference) => {
                write!(f, "Payment {} not found", reference)
            }
            Self::UserNotFound(id) => write!(f, "User {} not found", id),
            Self::BidNotFound { listing_id, bidder_id } => {
                write!(f, "No bid by user {} on listing {}", bidder_id, listing_id)
            }
            Self::RateLimited { user_id, retry_after_secs } => write!(
                f,
                "Rate limit exceeded for user {}. Retry after {} seconds",
                user_id, retry_after_secs
            ),
            Self::GatewayDeclined(msg) => write!(f, "Payment gateway declined: {}", msg),
            Self::GatewayUnavailable(msg) => {
                write!(f, "Payment gateway unavailable: {}", msg)
            }
            Self::GatewayTimeout(msg) => write!(f, "Payment gateway timed out: {}", msg),
            Self::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for MarketError {}

impl From<anyhow::Error> for MarketError {
    fn from(err: anyhow::Error) -> Self {
        MarketError::Unknown(err.to_string())
    }
}

// Error code mapping for API responses
impl MarketError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::BidTooLow { .. } => "BID_TOO_LOW",
            Self::SelfBid => "SELF_BID",
            Self::InvalidField { .. } => "INVALID_FIELD",
            Self::BelowMinimumWithdrawal { .. } => "BELOW_MINIMUM_WITHDRAWAL",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::MissingPayoutAccount => "MISSING_PAYOUT_ACCOUNT",
            Self::NotCreator { .. } => "NOT_CREATOR",
            Self::NotWinner { .. } => "NOT_WINNER",
            Self::NotParticipant { .. } => "NOT_PARTICIPANT",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::ListingExpired { .. } => "LISTING_EXPIRED",
            Self::WinnerAlreadySelected => "WINNER_ALREADY_SELECTED",
            Self::AlreadyPaid => "ALREADY_PAID",
            Self::NotDelivered => "NOT_DELIVERED",
            Self::DisputeAlreadyOpen => "DISPUTE_ALREADY_OPEN",
            Self::BidContention => "BID_CONTENTION",
            Self::ListingNotFound(_) => "LISTING_NOT_FOUND",
            Self::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::BidNotFound { .. } => "BID_NOT_FOUND",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::GatewayDeclined(_) => "GATEWAY_DECLINED",
            Self::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            Self::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
            Self::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// HTTP status for the API surface. Authorization outranks state,
    /// state outranks missing data.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotCreator { .. } | Self::NotWinner { .. } | Self::NotParticipant { .. } => 403,
            Self::ListingNotFound(_)
            | Self::PaymentNotFound(_)
            | Self::UserNotFound(_)
            | Self::BidNotFound { .. } => 404,
            Self::RateLimited { .. } => 429,
            Self::GatewayDeclined(_) | Self::GatewayUnavailable(_) => 502,
            Self::GatewayTimeout(_) => 504,
            Self::Unknown(_) => 500,
            _ => 400,
        }
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::BidTooLow { .. }
                | Self::SelfBid
                | Self::InvalidField { .. }
                | Self::BelowMinimumWithdrawal { .. }
                | Self::InsufficientBalance { .. }
                | Self::MissingPayoutAccount
        )
    }

    /// Failures where a later identical call may succeed without any
    /// state change on our side.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GatewayUnavailable(_)
                | Self::GatewayTimeout(_)
                | Self::RateLimited { .. }
                | Self::BidContention
        )
    }
}
