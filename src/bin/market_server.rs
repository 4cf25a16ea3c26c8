//! Marketplace core server.
//!
//! Wires the in-memory store, sled ledger, payment gateway adapter and
//! the HTTP surface together. The expiry sweeper is exposed as a cron
//! endpoint; an external timer drives it.

use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;

use vibemarket::audit::LogAuditSink;
use vibemarket::bid_acceptor::BidAcceptor;
use vibemarket::configure;
use vibemarket::gateway::{create_app, AppState};
use vibemarket::ledger::Ledger;
use vibemarket::lifecycle::LifecycleDriver;
use vibemarket::logger::setup_logger;
use vibemarket::payment_gateway::HttpPaymentGateway;
use vibemarket::settlement::PaymentSettlement;
use vibemarket::store::MarketStore;
use vibemarket::sweeper::ExpirySweeper;
use vibemarket::wallet::WalletService;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address, e.g. 0.0.0.0:8080
    #[arg(long)]
    listen: Option<String>,

    /// Ledger directory
    #[arg(long)]
    ledger_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let args = Args::parse();

    let config = configure::load_config()?;
    setup_logger(&config)?;

    let listen_addr = args.listen.unwrap_or(config.listen_addr.clone());
    let ledger_path = args.ledger_path.unwrap_or(config.ledger_path.clone());

    let store = Arc::new(MarketStore::new());
    let ledger = Arc::new(Ledger::open(&ledger_path)?);
    let audit = Arc::new(LogAuditSink);
    let payment_gateway = Arc::new(HttpPaymentGateway::new(
        config.gateway_base_url.clone(),
        config.gateway_secret_key.clone(),
        config.gateway_timeout_ms,
    ));

    let state = Arc::new(AppState {
        store: store.clone(),
        ledger: ledger.clone(),
        bids: BidAcceptor::new(
            store.clone(),
            ledger.clone(),
            audit.clone(),
            config.bid_rate_limit,
            config.bid_rate_window_secs,
        ),
        lifecycle: LifecycleDriver::new(
            store.clone(),
            ledger.clone(),
            audit.clone(),
            config.payment_due_hours,
        ),
        settlement: PaymentSettlement::new(
            store.clone(),
            ledger.clone(),
            payment_gateway,
            audit.clone(),
            config.fee_percent,
            config.gateway_callback_url.clone(),
        ),
        sweeper: ExpirySweeper::new(store.clone(), audit.clone()),
        wallet: WalletService::new(store, ledger, audit, config.min_withdrawal),
    });

    let app = create_app(state);

    log::info!("Market server listening on {}", listen_addr);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
