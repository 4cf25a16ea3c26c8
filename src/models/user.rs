use serde::{Deserialize, Serialize};

use super::listing::UserId;

/// Wallet balance in integer currency units. Never negative: credits
/// come only from a payment's net amount (settlement and release), the
/// only debit path is a withdrawal that checked the balance first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Wallet {
    pub balance: u64,
    pub version: u64,
}

impl Wallet {
    pub fn credit(&mut self, amount: u64) {
        self.balance += amount;
        self.version += 1;
    }

    pub fn debit(&mut self, amount: u64) -> Result<(), &'static str> {
        if self.balance < amount {
            return Err("Insufficient funds");
        }
        self.balance -= amount;
        self.version += 1;
        Ok(())
    }
}

/// Bank destination for payouts. The actual transfer rail is external;
/// this is only the on-file destination withdrawal requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAccount {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}

/// Wallet-bearing party. `total_earnings` and `total_sales` are
/// monotonic counters bumped at escrow release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub wallet: Wallet,
    pub total_earnings: u64,
    pub total_sales: u64,
    pub payout_account: Option<PayoutAccount>,
}

impl UserProfile {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            wallet: Wallet::default(),
            total_earnings: 0,
            total_sales: 0,
            payout_account: None,
        }
    }
}

/// In-system reservation of withdrawn funds, pending the external rail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub id: u64,
    pub user_id: UserId,
    pub amount: u64,
    pub status: PayoutStatus,
    pub requested_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutStatus {
    Pending,
    Settled,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Settled => "settled",
        }
    }
}
