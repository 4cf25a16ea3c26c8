//! HTTP surface for the marketplace core.
//!
//! Thin handlers: decode, resolve the authenticated user id supplied
//! by the session layer, call the component, map `MarketError` to an
//! HTTP rejection. No business rules live here.

use std::sync::Arc;

use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::audit::now_ms;
use crate::bid_acceptor::BidAcceptor;
use crate::ledger::Ledger;
use crate::lifecycle::LifecycleDriver;
use crate::models::{
    ApiResponse, Bid, Dispute, LedgerEvent, Listing, MarketError, NewListing, PayoutAccount,
    PayoutRequest, UserProfile,
};
use crate::settlement::{PaymentInit, PaymentSettlement, VerifyOutcome};
use crate::store::MarketStore;
use crate::sweeper::{ExpirySweeper, SweepReport};
use crate::wallet::WalletService;

pub struct AppState {
    pub store: Arc<MarketStore>,
    pub ledger: Arc<Ledger>,
    pub bids: BidAcceptor,
    pub lifecycle: LifecycleDriver,
    pub settlement: PaymentSettlement,
    pub sweeper: ExpirySweeper,
    pub wallet: WalletService,
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/vibes", post(create_vibe))
        .route("/api/vibes/:id", get(get_vibe))
        .route("/api/vibes/:id/bids", post(place_bid))
        .route("/api/vibes/:id/history", get(listing_history))
        .route("/api/bids/quota", get(bid_quota))
        .route("/api/vibes/:id/end", post(end_vibe))
        .route("/api/vibes/:id/winner", post(select_winner))
        .route("/api/vibes/:id/deliver", post(mark_delivered))
        .route("/api/vibes/:id/complete", post(complete_transaction))
        .route("/api/vibes/:id/dispute", post(open_dispute))
        .route("/api/vibes/:id/cancel", post(cancel_vibe))
        .route("/api/payments/initiate", post(initiate_payment))
        .route("/api/payments/verify", get(verify_payment))
        .route("/api/wallet", get(get_wallet))
        .route("/api/wallet/history", get(wallet_history))
        .route("/api/wallet/payout_account", post(set_payout_account))
        .route("/api/wallet/withdraw", post(withdraw))
        .route("/api/cron/sweep", post(run_sweep))
        .route("/api/admin/rate_limit/reset", post(reset_rate_limit))
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
}

/// Authenticated user id, supplied by the session layer in front of us
#[derive(serde::Deserialize)]
struct AuthParams {
    user_id: u64,
}

/// Error body carrying the same envelope as success responses, with
/// `code` set from the core taxonomy and `data` absent.
type ApiReject = (StatusCode, Json<ApiResponse<()>>);

fn reject(err: MarketError) -> ApiReject {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !err.is_user_error() {
        log::warn!("Request rejected [{}]: {}", err.error_code(), err);
    }
    (
        status,
        Json(ApiResponse::error(
            err.http_status() as i32,
            err.error_code(),
            err.to_string(),
        )),
    )
}

#[derive(serde::Deserialize)]
struct CreateVibePayload {
    title: String,
    description: String,
    category: Option<String>,
    weirdness: u8,
    starting_bid: u64,
    min_increment: u64,
    end_at: i64,
}

async fn create_vibe(
    Extension(state): Extension<Arc<AppState>>,
    Query(auth): Query<AuthParams>,
    Json(payload): Json<CreateVibePayload>,
) -> Result<Json<ApiResponse<Listing>>, ApiReject> {
    let listing = state
        .store
        .create_listing(
            NewListing {
                creator_id: auth.user_id,
                title: payload.title,
                description: payload.description,
                category: payload.category,
                weirdness: payload.weirdness,
                starting_bid: payload.starting_bid,
                min_increment: payload.min_increment,
                end_at: payload.end_at,
            },
            now_ms(),
        )
        .map_err(reject)?;

    log::info!("Listing {} created by user {}", listing.id, auth.user_id);
    Ok(Json(ApiResponse::success(listing)))
}

async fn get_vibe(
    Extension(state): Extension<Arc<AppState>>,
    Path(listing_id): Path<u64>,
) -> Result<Json<ApiResponse<Listing>>, ApiReject> {
    let listing = state.store.get_listing(listing_id).map_err(reject)?;
    Ok(Json(ApiResponse::success(listing)))
}

#[derive(serde::Deserialize)]
struct PlaceBidPayload {
    amount: u64,
}

async fn place_bid(
    Extension(state): Extension<Arc<AppState>>,
    Path(listing_id): Path<u64>,
    Query(auth): Query<AuthParams>,
    Json(payload): Json<PlaceBidPayload>,
) -> Result<Json<ApiResponse<Bid>>, ApiReject> {
    let bid = state
        .bids
        .place_bid(listing_id, auth.user_id, payload.amount, now_ms())
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(bid)))
}

/// Ledger events touching one listing, oldest first.
async fn listing_history(
    Extension(state): Extension<Arc<AppState>>,
    Path(listing_id): Path<u64>,
) -> Result<Json<ApiResponse<Vec<LedgerEvent>>>, ApiReject> {
    state.store.get_listing(listing_id).map_err(reject)?;
    let events = state
        .ledger
        .events_for_listing(listing_id)
        .map_err(|e| reject(MarketError::from(e)))?;
    Ok(Json(ApiResponse::success(events)))
}

#[derive(serde::Serialize)]
struct QuotaData {
    remaining: u32,
}

async fn bid_quota(
    Extension(state): Extension<Arc<AppState>>,
    Query(auth): Query<AuthParams>,
) -> Result<Json<ApiResponse<QuotaData>>, ApiReject> {
    let remaining = state.bids.remaining_quota(auth.user_id, now_ms());
    Ok(Json(ApiResponse::success(QuotaData { remaining })))
}

async fn end_vibe(
    Extension(state): Extension<Arc<AppState>>,
    Path(listing_id): Path<u64>,
    Query(auth): Query<AuthParams>,
) -> Result<Json<ApiResponse<Listing>>, ApiReject> {
    let listing = state
        .lifecycle
        .end_listing(listing_id, auth.user_id, now_ms())
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(listing)))
}

#[derive(serde::Deserialize)]
struct SelectWinnerPayload {
    winner_user_id: u64,
}

async fn select_winner(
    Extension(state): Extension<Arc<AppState>>,
    Path(listing_id): Path<u64>,
    Query(auth): Query<AuthParams>,
    Json(payload): Json<SelectWinnerPayload>,
) -> Result<Json<ApiResponse<Listing>>, ApiReject> {
    let listing = state
        .lifecycle
        .select_winner(listing_id, auth.user_id, payload.winner_user_id, now_ms())
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(listing)))
}

async fn mark_delivered(
    Extension(state): Extension<Arc<AppState>>,
    Path(listing_id): Path<u64>,
    Query(auth): Query<AuthParams>,
) -> Result<Json<ApiResponse<Listing>>, ApiReject> {
    let listing = state
        .lifecycle
        .mark_delivered(listing_id, auth.user_id, now_ms())
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(listing)))
}

async fn complete_transaction(
    Extension(state): Extension<Arc<AppState>>,
    Path(listing_id): Path<u64>,
    Query(auth): Query<AuthParams>,
) -> Result<Json<ApiResponse<Listing>>, ApiReject> {
    let listing = state
        .lifecycle
        .complete_transaction(listing_id, auth.user_id, now_ms())
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(listing)))
}

#[derive(serde::Deserialize)]
struct DisputePayload {
    reason: String,
}

async fn open_dispute(
    Extension(state): Extension<Arc<AppState>>,
    Path(listing_id): Path<u64>,
    Query(auth): Query<AuthParams>,
    Json(payload): Json<DisputePayload>,
) -> Result<Json<ApiResponse<Dispute>>, ApiReject> {
    let dispute = state
        .lifecycle
        .open_dispute(listing_id, auth.user_id, payload.reason, now_ms())
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(dispute)))
}

async fn cancel_vibe(
    Extension(state): Extension<Arc<AppState>>,
    Path(listing_id): Path<u64>,
    Query(auth): Query<AuthParams>,
) -> Result<Json<ApiResponse<Listing>>, ApiReject> {
    let listing = state
        .lifecycle
        .cancel_listing(listing_id, auth.user_id, now_ms())
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(listing)))
}

#[derive(serde::Deserialize)]
struct InitiatePaymentPayload {
    listing_id: u64,
    email: String,
}

async fn initiate_payment(
    Extension(state): Extension<Arc<AppState>>,
    Query(auth): Query<AuthParams>,
    Json(payload): Json<InitiatePaymentPayload>,
) -> Result<Json<ApiResponse<PaymentInit>>, ApiReject> {
    let init = state
        .settlement
        .initiate_payment(payload.listing_id, auth.user_id, payload.email, now_ms())
        .await
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(init)))
}

#[derive(serde::Deserialize)]
struct VerifyParams {
    reference: String,
}

#[derive(serde::Serialize)]
struct VerifyResponseData {
    settled: bool,
    listing_id: Option<u64>,
}

async fn verify_payment(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<ApiResponse<VerifyResponseData>>, ApiReject> {
    let outcome = state
        .settlement
        .verify_payment(&params.reference, now_ms())
        .await
        .map_err(reject)?;

    let data = match outcome {
        VerifyOutcome::Settled { listing_id, .. }
        | VerifyOutcome::AlreadySettled { listing_id } => {
            VerifyResponseData { settled: true, listing_id: Some(listing_id) }
        }
        VerifyOutcome::Failed => VerifyResponseData { settled: false, listing_id: None },
    };
    Ok(Json(ApiResponse::success(data)))
}

async fn get_wallet(
    Extension(state): Extension<Arc<AppState>>,
    Query(auth): Query<AuthParams>,
) -> Result<Json<ApiResponse<UserProfile>>, ApiReject> {
    let profile = state.wallet.profile(auth.user_id).map_err(reject)?;
    Ok(Json(ApiResponse::success(profile)))
}

async fn wallet_history(
    Extension(state): Extension<Arc<AppState>>,
    Query(auth): Query<AuthParams>,
) -> Result<Json<ApiResponse<Vec<LedgerEvent>>>, ApiReject> {
    let events = state.wallet.history(auth.user_id).map_err(reject)?;
    Ok(Json(ApiResponse::success(events)))
}

async fn set_payout_account(
    Extension(state): Extension<Arc<AppState>>,
    Query(auth): Query<AuthParams>,
    Json(account): Json<PayoutAccount>,
) -> Result<Json<ApiResponse<()>>, ApiReject> {
    state
        .wallet
        .set_payout_account(auth.user_id, account)
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(())))
}

#[derive(serde::Deserialize)]
struct WithdrawPayload {
    amount: u64,
}

async fn withdraw(
    Extension(state): Extension<Arc<AppState>>,
    Query(auth): Query<AuthParams>,
    Json(payload): Json<WithdrawPayload>,
) -> Result<Json<ApiResponse<PayoutRequest>>, ApiReject> {
    let request = state
        .wallet
        .withdraw(auth.user_id, payload.amount, now_ms())
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(request)))
}

/// Invoked by an external timer. Repeated invocation is a no-op once
/// everything expired is already ENDED.
async fn run_sweep(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<ApiResponse<SweepReport>>, ApiReject> {
    let report = state.sweeper.sweep(now_ms()).map_err(reject)?;
    Ok(Json(ApiResponse::success(report)))
}

#[derive(serde::Deserialize)]
struct ResetRateLimitPayload {
    user_id: u64,
}

/// Operator escape hatch for a user locked out by the bid limiter.
async fn reset_rate_limit(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ResetRateLimitPayload>,
) -> Result<Json<ApiResponse<()>>, ApiReject> {
    state.bids.reset_quota(payload.user_id);
    log::warn!("ADMIN ACTION: bid rate limit reset for user {}", payload.user_id);
    Ok(Json(ApiResponse::success(())))
}
