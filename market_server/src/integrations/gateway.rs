//! REST client for the payment provider.
//!
//! The engine only ever sees the [`PaymentGateway`] trait; this is the live implementation that
//! talks to the provider's API. Transport-level failures and 5xx responses map to
//! [`GatewayError::Transient`] so the refund engine retries them; 4xx responses are permanent.
use std::sync::Arc;

use log::*;
use market_engine::traits::{CheckoutSession, GatewayError, PaymentGateway};
use mkt_common::{Price, Secret};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    StatusCode,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    /// Base URL of the provider API, e.g. `https://api.payments.example.com`.
    pub base_url: String,
    pub api_key: Secret<String>,
}

impl GatewayConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = std::env::var("MKT_GATEWAY_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MKT_GATEWAY_URL is not set. Please set it to the base URL of the payment provider API.");
            String::default()
        });
        let api_key = std::env::var("MKT_GATEWAY_API_KEY").map(Secret::new).unwrap_or_else(|_| {
            error!("🪛️ MKT_GATEWAY_API_KEY is not set. Please set it to the API key for the payment provider.");
            Secret::default()
        });
        Self { base_url, api_key }
    }
}

#[derive(Clone)]
pub struct RestPaymentGateway {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl RestPaymentGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(&format!("Bearer {}", config.api_key.reveal()))
            .map_err(|e| GatewayError::Permanent(format!("Invalid API key. {e}")))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayError::Permanent(format!("Could not build HTTP client. {e}")))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutSessionRequest<'a> {
    amount: i64,
    success_url: &'a str,
    cancel_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutSessionResponse {
    session_id: String,
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundRequest<'a> {
    payment_reference: &'a str,
}

fn error_for_status(status: StatusCode, message: String) -> GatewayError {
    if status.is_server_error() {
        GatewayError::Transient(format!("{status}: {message}"))
    } else {
        GatewayError::Permanent(format!("{status}: {message}"))
    }
}

impl PaymentGateway for RestPaymentGateway {
    async fn create_checkout_session(
        &self,
        amount: Price,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, GatewayError> {
        let body = CheckoutSessionRequest { amount: amount.value(), success_url, cancel_url };
        let response = self
            .client
            .post(self.url("/v1/checkout/sessions"))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, message));
        }
        let session: CheckoutSessionResponse =
            response.json().await.map_err(|e| GatewayError::Transient(e.to_string()))?;
        debug!("💳️ Created checkout session {} for {amount}", session.session_id);
        Ok(CheckoutSession { session_id: session.session_id, url: session.url })
    }

    async fn refund(&self, payment_reference: &str, idempotency_key: &str) -> Result<(), GatewayError> {
        let body = RefundRequest { payment_reference };
        let response = self
            .client
            .post(self.url("/v1/refunds"))
            .header("Idempotency-Key", idempotency_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, message));
        }
        debug!("💳️ Refund issued for payment {payment_reference}");
        Ok(())
    }
}
