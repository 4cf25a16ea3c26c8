use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub log_file: String,
    pub log_level: String,
    pub log_to_file: bool,
    pub listen_addr: String,
    pub ledger_path: String,
    pub gateway_base_url: String,
    pub gateway_secret_key: String,
    pub gateway_callback_url: String,
    pub gateway_timeout_ms: u64,
    /// Platform fee as a fraction of the winning amount
    pub fee_percent: f64,
    pub min_withdrawal: u64,
    /// Bid attempts allowed per user per window
    pub bid_rate_limit: u32,
    pub bid_rate_window_secs: u64,
    pub payment_due_hours: i64,
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let s = Config::builder()
        // Set defaults
        .set_default("log_file", "log/vibemarket.log")?
        .set_default("log_level", "info")?
        .set_default("log_to_file", false)?
        .set_default("listen_addr", "0.0.0.0:8080")?
        .set_default("ledger_path", "data/ledger")?
        .set_default("gateway_base_url", "https://api.paystack.co")?
        .set_default("gateway_secret_key", "sk_test_xxx")?
        .set_default("gateway_callback_url", "http://localhost:8080/api/payments/verify")?
        .set_default("gateway_timeout_ms", 10_000)?
        .set_default("fee_percent", 0.05)?
        .set_default("min_withdrawal", 1000)?
        .set_default("bid_rate_limit", 5)?
        .set_default("bid_rate_window_secs", 60)?
        .set_default("payment_due_hours", 24)?
        // Add configuration from a file
        .add_source(File::with_name("config/config.yaml").required(false))
        // Add configuration from environment variables
        .add_source(config::Environment::with_prefix("APP"))
        .build()?;

    s.try_deserialize()
}
