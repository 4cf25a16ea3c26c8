//! Payment gateway adapter.
//!
//! The gateway is a consumed capability, not something this crate
//! implements: `initialize` produces a redirect target correlated by a
//! unique reference, `verify` reports gateway truth for a reference.
//! Amounts cross this boundary in minor units (x100 of the internal
//! integer currency unit).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const MINOR_UNITS: u64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    pub email: String,
    /// Minor currency units
    pub amount: u64,
    pub reference: String,
    pub callback_url: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResponse {
    pub redirect_url: String,
    pub access_code: String,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub enum VerifyStatus {
    Success {
        /// Minor currency units, as reported by the gateway
        amount: u64,
        paid_at: Option<String>,
    },
    Failed,
}

#[derive(Debug, Clone)]
pub enum GatewayError {
    /// The gateway answered and said no
    Declined(String),
    /// Transport-level failure, outcome unknown
    Transport(String),
    /// Deadline exceeded, outcome unknown - never treat as FAILED
    Timeout(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declined(msg) => write!(f, "Gateway declined: {}", msg),
            Self::Transport(msg) => write!(f, "Gateway transport error: {}", msg),
            Self::Timeout(msg) => write!(f, "Gateway timeout: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

pub trait PaymentGateway: Send + Sync {
    fn initialize(
        &self,
        req: InitializeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<InitializeResponse, GatewayError>> + Send>>;

    fn verify(
        &self,
        reference: String,
    ) -> Pin<Box<dyn Future<Output = Result<VerifyStatus, GatewayError>> + Send>>;
}

// Wire shapes of the hosted gateway API
#[derive(Debug, Deserialize)]
struct GatewayEnvelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: u64,
    paid_at: Option<String>,
}

/// reqwest-backed adapter. The client carries a request timeout; a
/// timed-out call surfaces as `GatewayError::Timeout` so settlement
/// can defer to a later idempotent re-verification.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, secret_key: String, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();
        Self { client, base_url, secret_key }
    }
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(err.to_string())
    } else {
        GatewayError::Transport(err.to_string())
    }
}

impl PaymentGateway for HttpPaymentGateway {
    fn initialize(
        &self,
        req: InitializeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<InitializeResponse, GatewayError>> + Send>> {
        let client = self.client.clone();
        let url = format!("{}/transaction/initialize", self.base_url);
        let secret = self.secret_key.clone();

        Box::pin(async move {
            let response = client
                .post(&url)
                .bearer_auth(&secret)
                .json(&req)
                .send()
                .await
                .map_err(map_transport_error)?;

            let envelope: GatewayEnvelope<InitializeData> =
                response.json().await.map_err(map_transport_error)?;

            if !envelope.status {
                return Err(GatewayError::Declined(
                    envelope.message.unwrap_or_else(|| "initialize rejected".to_string()),
                ));
            }

            let data = envelope.data.ok_or_else(|| {
                GatewayError::Transport("initialize response missing data".to_string())
            })?;

            Ok(InitializeResponse {
                redirect_url: data.authorization_url,
                access_code: data.access_code,
                reference: data.reference,
            })
        })
    }

    fn verify(
        &self,
        reference: String,
    ) -> Pin<Box<dyn Future<Output = Result<VerifyStatus, GatewayError>> + Send>> {
        let client = self.client.clone();
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);
        let secret = self.secret_key.clone();

        Box::pin(async move {
            let response = client
                .get(&url)
                .bearer_auth(&secret)
                .send()
                .await
                .map_err(map_transport_error)?;

            let envelope: GatewayEnvelope<VerifyData> =
                response.json().await.map_err(map_transport_error)?;

            if !envelope.status {
                return Err(GatewayError::Transport(
                    envelope.message.unwrap_or_else(|| "verify rejected".to_string()),
                ));
            }

            let data = envelope.data.ok_or_else(|| {
                GatewayError::Transport("verify response missing data".to_string())
            })?;

            if data.status == "success" {
                Ok(VerifyStatus::Success { amount: data.amount, paid_at: data.paid_at })
            } else {
                Ok(VerifyStatus::Failed)
            }
        })
    }
}
