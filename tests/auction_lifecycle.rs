//! End-to-end auction flow against an in-process stack with a mocked
//! payment gateway.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use vibemarket::audit::NullAuditSink;
use vibemarket::bid_acceptor::BidAcceptor;
use vibemarket::ledger::Ledger;
use vibemarket::lifecycle::LifecycleDriver;
use vibemarket::models::{LedgerEvent, ListingStatus, NewListing, PaymentStatus, PayoutAccount};
use vibemarket::payment_gateway::{
    GatewayError, InitializeRequest, InitializeResponse, PaymentGateway, VerifyStatus, MINOR_UNITS,
};
use vibemarket::settlement::{PaymentSettlement, VerifyOutcome};
use vibemarket::store::MarketStore;
use vibemarket::wallet::WalletService;

#[derive(Debug, Clone, Copy)]
enum VerifyMode {
    Success,
    Failed,
    Timeout,
}

/// Gateway double. Echoes the reference back from initialize and
/// reports whatever outcome the test arms it with.
struct MockGateway {
    mode: Mutex<VerifyMode>,
    last_amount: Mutex<u64>,
    verify_calls: AtomicU32,
}

impl MockGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(VerifyMode::Success),
            last_amount: Mutex::new(0),
            verify_calls: AtomicU32::new(0),
        })
    }

    fn set_mode(&self, mode: VerifyMode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn set_reported_amount(&self, amount: u64) {
        *self.last_amount.lock().unwrap() = amount;
    }
}

impl PaymentGateway for MockGateway {
    fn initialize(
        &self,
        req: InitializeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<InitializeResponse, GatewayError>> + Send>> {
        *self.last_amount.lock().unwrap() = req.amount;
        Box::pin(async move {
            Ok(InitializeResponse {
                redirect_url: format!("https://checkout.test/{}", req.reference),
                access_code: "AC_test".to_string(),
                reference: req.reference,
            })
        })
    }

    fn verify(
        &self,
        _reference: String,
    ) -> Pin<Box<dyn Future<Output = Result<VerifyStatus, GatewayError>> + Send>> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        let amount = *self.last_amount.lock().unwrap();
        Box::pin(async move {
            match mode {
                VerifyMode::Success => Ok(VerifyStatus::Success { amount, paid_at: None }),
                VerifyMode::Failed => Ok(VerifyStatus::Failed),
                VerifyMode::Timeout => {
                    Err(GatewayError::Timeout("deadline exceeded".to_string()))
                }
            }
        })
    }
}

struct Market {
    store: Arc<MarketStore>,
    ledger: Arc<Ledger>,
    bids: BidAcceptor,
    lifecycle: LifecycleDriver,
    settlement: PaymentSettlement,
    wallet: WalletService,
    gateway: Arc<MockGateway>,
}

fn market() -> Market {
    let store = Arc::new(MarketStore::new());
    let ledger = Arc::new(Ledger::temporary().unwrap());
    let audit = Arc::new(NullAuditSink);
    let gateway = MockGateway::new();

    Market {
        store: store.clone(),
        ledger: ledger.clone(),
        bids: BidAcceptor::new(store.clone(), ledger.clone(), audit.clone(), 100, 60),
        lifecycle: LifecycleDriver::new(store.clone(), ledger.clone(), audit.clone(), 24),
        settlement: PaymentSettlement::new(
            store.clone(),
            ledger.clone(),
            gateway.clone(),
            audit.clone(),
            0.05,
            "http://localhost:8080/api/payments/verify".to_string(),
        ),
        wallet: WalletService::new(store, ledger, audit, 1000),
        gateway,
    }
}

const CREATOR: u64 = 1;

fn create_listing(m: &Market, now: i64) -> u64 {
    m.store
        .create_listing(
            NewListing {
                creator_id: CREATOR,
                title: "I will narrate your commute in a movie-trailer voice".to_string(),
                description: "One week, weekday mornings only".to_string(),
                category: Some("services".to_string()),
                weirdness: 7,
                starting_bid: 5000,
                min_increment: 500,
                end_at: now + 60_000,
            },
            now,
        )
        .unwrap()
        .id
}

/// Drives a listing to PAID with user 3 as the winner at 6000.
async fn paid_listing(m: &Market, now: i64) -> (u64, String) {
    let id = create_listing(m, now);
    m.bids.place_bid(id, 2, 5500, now).unwrap();
    m.bids.place_bid(id, 3, 6000, now).unwrap();
    m.lifecycle.end_listing(id, CREATOR, now).unwrap();
    m.lifecycle.select_winner(id, CREATOR, 3, now).unwrap();

    let init = m
        .settlement
        .initiate_payment(id, 3, "winner@example.com".to_string(), now)
        .await
        .unwrap();
    let outcome = m.settlement.verify_payment(&init.reference, now).await.unwrap();
    assert!(matches!(outcome, VerifyOutcome::Settled { .. }));
    (id, init.reference)
}

#[tokio::test]
async fn test_full_auction_lifecycle() {
    let m = market();
    let now = 1_000;
    let id = create_listing(&m, now);

    // Bidding: below current + increment is rejected
    m.bids.place_bid(id, 2, 5500, now).unwrap();
    let err = m.bids.place_bid(id, 3, 5900, now).unwrap_err();
    assert_eq!(err.error_code(), "BID_TOO_LOW");
    m.bids.place_bid(id, 3, 6000, now).unwrap();

    m.lifecycle.end_listing(id, CREATOR, now).unwrap();
    m.lifecycle.select_winner(id, CREATOR, 3, now).unwrap();

    let init = m
        .settlement
        .initiate_payment(id, 3, "winner@example.com".to_string(), now)
        .await
        .unwrap();
    assert_eq!(init.amount, 6000);
    assert_eq!(init.fee_amount, 300);

    let outcome = m.settlement.verify_payment(&init.reference, now).await.unwrap();
    assert_eq!(outcome, VerifyOutcome::Settled { listing_id: id, net_amount: 5700 });
    assert_eq!(m.store.get_listing(id).unwrap().status, ListingStatus::Paid);

    // Settlement credited the net amount
    assert_eq!(m.store.get_user(CREATOR).unwrap().wallet.balance, 5700);

    m.lifecycle.mark_delivered(id, CREATOR, now).unwrap();
    let done = m.lifecycle.complete_transaction(id, 3, now).unwrap();
    assert_eq!(done.status, ListingStatus::Completed);

    // Release credits the net amount once more and bumps the counters
    let creator = m.store.get_user(CREATOR).unwrap();
    assert_eq!(creator.wallet.balance, 11_400);
    assert_eq!(creator.total_sales, 1);
    assert_eq!(creator.total_earnings, 5700);
    assert_eq!(
        m.store.get_payment(&init.reference).unwrap().status,
        PaymentStatus::Released
    );

    // Earnings can leave through a withdrawal
    m.wallet
        .set_payout_account(
            CREATOR,
            PayoutAccount {
                bank_code: "058".to_string(),
                account_number: "0123456789".to_string(),
                account_name: "Vibe Creator".to_string(),
            },
        )
        .unwrap();
    let payout = m.wallet.withdraw(CREATOR, 5700, now).unwrap();
    assert_eq!(payout.amount, 5700);
    assert_eq!(m.store.get_user(CREATOR).unwrap().wallet.balance, 5700);

    // Ledger saw the whole story
    let events: Vec<LedgerEvent> =
        m.ledger.events().unwrap().into_iter().map(|(_, e)| e).collect();
    assert!(events.iter().any(|e| matches!(e, LedgerEvent::BidPlaced { amount: 6000, .. })));
    assert!(events.iter().any(|e| matches!(e, LedgerEvent::PaymentSettled { net_amount: 5700, .. })));
    assert!(events.iter().any(|e| matches!(e, LedgerEvent::EscrowReleased { net_amount: 5700, .. })));
    assert!(events.iter().any(|e| matches!(e, LedgerEvent::PayoutRequested { amount: 5700, .. })));

    // Per-listing view: both bids, the settlement and the release, in
    // append order; the payout belongs to the user view only
    let history = m.ledger.events_for_listing(id).unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(
        history.iter().map(|e| e.kind()).collect::<Vec<_>>(),
        vec!["bid_placed", "bid_placed", "payment_settled", "escrow_released"]
    );
    assert!(history.iter().all(|e| e.listing_id() == Some(id)));
}

#[tokio::test]
async fn test_repeated_verify_does_not_double_settle() {
    let m = market();
    let now = 1_000;
    let (id, reference) = paid_listing(&m, now).await;
    let calls_after_settle = m.gateway.verify_calls.load(Ordering::SeqCst);

    // Callback redelivery, user refresh, whatever: no second effect
    for _ in 0..3 {
        let outcome = m.settlement.verify_payment(&reference, now + 10).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::AlreadySettled { listing_id: id });
    }

    // Fast path never went back to the gateway, never re-credited
    assert_eq!(m.gateway.verify_calls.load(Ordering::SeqCst), calls_after_settle);
    assert_eq!(m.store.get_listing(id).unwrap().status, ListingStatus::Paid);
    assert_eq!(m.store.get_user(CREATOR).unwrap().wallet.balance, 5700);
}

#[tokio::test]
async fn test_failed_charge_leaves_listing_payable() {
    let m = market();
    let now = 1_000;
    let id = create_listing(&m, now);
    m.bids.place_bid(id, 3, 5500, now).unwrap();
    m.lifecycle.end_listing(id, CREATOR, now).unwrap();
    m.lifecycle.select_winner(id, CREATOR, 3, now).unwrap();

    m.gateway.set_mode(VerifyMode::Failed);
    let init = m
        .settlement
        .initiate_payment(id, 3, "winner@example.com".to_string(), now)
        .await
        .unwrap();
    let outcome = m.settlement.verify_payment(&init.reference, now).await.unwrap();
    assert_eq!(outcome, VerifyOutcome::Failed);
    assert_eq!(
        m.store.get_payment(&init.reference).unwrap().status,
        PaymentStatus::Failed
    );
    assert_eq!(m.store.get_listing(id).unwrap().status, ListingStatus::Ended);

    // The winner gets another attempt with a fresh reference
    m.gateway.set_mode(VerifyMode::Success);
    let retry = m
        .settlement
        .initiate_payment(id, 3, "winner@example.com".to_string(), now + 10)
        .await
        .unwrap();
    assert_ne!(retry.reference, init.reference);
    let outcome = m.settlement.verify_payment(&retry.reference, now + 10).await.unwrap();
    assert!(matches!(outcome, VerifyOutcome::Settled { .. }));
}

#[tokio::test]
async fn test_gateway_timeout_is_not_a_failure() {
    let m = market();
    let now = 1_000;
    let id = create_listing(&m, now);
    m.bids.place_bid(id, 3, 5500, now).unwrap();
    m.lifecycle.end_listing(id, CREATOR, now).unwrap();
    m.lifecycle.select_winner(id, CREATOR, 3, now).unwrap();

    let init = m
        .settlement
        .initiate_payment(id, 3, "winner@example.com".to_string(), now)
        .await
        .unwrap();

    m.gateway.set_mode(VerifyMode::Timeout);
    let err = m.settlement.verify_payment(&init.reference, now).await.unwrap_err();
    assert_eq!(err.error_code(), "GATEWAY_TIMEOUT");
    assert!(err.is_retryable());

    // Outcome unknown: payment stays INITIATED, never flipped to FAILED
    assert_eq!(
        m.store.get_payment(&init.reference).unwrap().status,
        PaymentStatus::Initiated
    );

    // The same reference settles once the gateway answers
    m.gateway.set_mode(VerifyMode::Success);
    let outcome = m.settlement.verify_payment(&init.reference, now + 10).await.unwrap();
    assert!(matches!(outcome, VerifyOutcome::Settled { .. }));
}

#[tokio::test]
async fn test_amount_mismatch_refuses_settlement() {
    let m = market();
    let now = 1_000;
    let id = create_listing(&m, now);
    m.bids.place_bid(id, 3, 5500, now).unwrap();
    m.lifecycle.end_listing(id, CREATOR, now).unwrap();
    m.lifecycle.select_winner(id, CREATOR, 3, now).unwrap();

    let init = m
        .settlement
        .initiate_payment(id, 3, "winner@example.com".to_string(), now)
        .await
        .unwrap();

    // Gateway reports a smaller charge than the winning amount
    m.gateway.set_reported_amount(5000 * MINOR_UNITS);
    let outcome = m.settlement.verify_payment(&init.reference, now).await.unwrap();
    assert_eq!(outcome, VerifyOutcome::Failed);
    assert_eq!(m.store.get_listing(id).unwrap().status, ListingStatus::Ended);
}

#[tokio::test]
async fn test_only_winner_may_pay_and_only_once() {
    let m = market();
    let now = 1_000;
    let id = create_listing(&m, now);
    m.bids.place_bid(id, 2, 5500, now).unwrap();
    m.bids.place_bid(id, 3, 6000, now).unwrap();
    m.lifecycle.end_listing(id, CREATOR, now).unwrap();
    m.lifecycle.select_winner(id, CREATOR, 3, now).unwrap();

    // Losing bidder cannot pay
    let err = m
        .settlement
        .initiate_payment(id, 2, "loser@example.com".to_string(), now)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_WINNER");

    let init = m
        .settlement
        .initiate_payment(id, 3, "winner@example.com".to_string(), now)
        .await
        .unwrap();
    m.settlement.verify_payment(&init.reference, now).await.unwrap();

    // A paid listing rejects a second initiation
    let err = m
        .settlement
        .initiate_payment(id, 3, "winner@example.com".to_string(), now)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "ALREADY_PAID");
}

#[tokio::test]
async fn test_dispute_freezes_escrow() {
    let m = market();
    let now = 1_000;
    let (id, reference) = paid_listing(&m, now).await;
    m.lifecycle.mark_delivered(id, CREATOR, now).unwrap();

    let dispute = m
        .lifecycle
        .open_dispute(id, 3, "that was not my commute".to_string(), now)
        .unwrap();
    assert_eq!(dispute.against_id, CREATOR);
    assert_eq!(m.store.get_listing(id).unwrap().status, ListingStatus::Disputed);

    // Escrow stays locked: no completion, no release credit on top of
    // the settlement one
    let err = m.lifecycle.complete_transaction(id, 3, now).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_STATE");
    assert_eq!(m.store.get_user(CREATOR).unwrap().wallet.balance, 5700);
    assert_eq!(
        m.store.get_payment(&reference).unwrap().status,
        PaymentStatus::Success
    );
}

#[tokio::test]
async fn test_bids_close_when_listing_ends() {
    let m = market();
    let now = 1_000;
    let id = create_listing(&m, now);
    m.bids.place_bid(id, 2, 5500, now).unwrap();
    m.lifecycle.end_listing(id, CREATOR, now).unwrap();

    let err = m.bids.place_bid(id, 3, 6000, now).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_STATE");
}
