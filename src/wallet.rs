//! Wallet withdrawals.
//!
//! Withdrawal is an in-system reservation: the balance decrement and
//! the pending payout request are one atomic unit. The transfer to an
//! external bank rail happens outside this crate.

use std::sync::Arc;

use serde_json::json;

use crate::audit::AuditSink;
use crate::ledger::Ledger;
use crate::models::{
    LedgerEvent, MarketError, PayoutAccount, PayoutRequest, PayoutStatus, UserProfile,
};
use crate::store::MarketStore;
use crate::utils::generate_id;

pub struct WalletService {
    store: Arc<MarketStore>,
    ledger: Arc<Ledger>,
    audit: Arc<dyn AuditSink>,
    min_withdrawal: u64,
}

impl WalletService {
    pub fn new(
        store: Arc<MarketStore>,
        ledger: Arc<Ledger>,
        audit: Arc<dyn AuditSink>,
        min_withdrawal: u64,
    ) -> Self {
        Self { store, ledger, audit, min_withdrawal }
    }

    pub fn set_payout_account(
        &self,
        user_id: u64,
        account: PayoutAccount,
    ) -> Result<(), MarketError> {
        if account.account_number.trim().is_empty() || account.bank_code.trim().is_empty() {
            return Err(MarketError::InvalidField {
                field: "payout_account",
                reason: "bank_code and account_number required".to_string(),
            });
        }
        self.store.set_payout_account(user_id, account)
    }

    pub fn withdraw(
        &self,
        user_id: u64,
        amount: u64,
        now_ms: i64,
    ) -> Result<PayoutRequest, MarketError> {
        let min = self.min_withdrawal;
        let request = self.store.with(|inner| {
            let profile = inner
                .users
                .get_mut(&user_id)
                .ok_or(MarketError::UserNotFound(user_id))?;

            if amount < min {
                return Err(MarketError::BelowMinimumWithdrawal { amount, minimum: min });
            }
            if profile.wallet.balance < amount {
                return Err(MarketError::InsufficientBalance {
                    available: profile.wallet.balance,
                    required: amount,
                });
            }
            if profile.payout_account.is_none() {
                return Err(MarketError::MissingPayoutAccount);
            }

            profile
                .wallet
                .debit(amount)
                .map_err(|e| MarketError::Unknown(e.to_string()))?;

            let request = PayoutRequest {
                id: generate_id(),
                user_id,
                amount,
                status: PayoutStatus::Pending,
                requested_at: now_ms,
            };
            inner.payout_requests.push(request.clone());
            Ok(request)
        })?;

        if let Err(e) = self.ledger.append(&LedgerEvent::PayoutRequested {
            user_id,
            amount,
            ts_ms: now_ms,
        }) {
            log::error!(
                "CRITICAL: payout {} reserved but ledger append failed: {}",
                request.id,
                e
            );
        }
        self.audit.record(
            "PAYOUT_REQUESTED",
            user_id,
            json!({ "payout_id": request.id, "amount": amount }),
        );
        Ok(request)
    }

    pub fn profile(&self, user_id: u64) -> Result<UserProfile, MarketError> {
        self.store.get_user(user_id)
    }

    pub fn payout_requests(&self, user_id: u64) -> Vec<PayoutRequest> {
        self.store.payout_requests_for(user_id)
    }

    pub fn history(&self, user_id: u64) -> Result<Vec<LedgerEvent>, MarketError> {
        self.ledger
            .events_for_user(user_id)
            .map_err(|e| MarketError::Unknown(e.to_string()))
    }
}
