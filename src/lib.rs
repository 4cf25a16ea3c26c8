pub mod audit;
pub mod bid_acceptor;
pub mod configure;
pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod logger;
pub mod models;
pub mod payment_gateway;
pub mod rate_limit;
pub mod settlement;
pub mod store;
pub mod sweeper;
pub mod utils;
pub mod wallet;
