use std::sync::Arc;

use mkt_common::Price;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An external checkout session, correlated to an order via its `session_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// A verified, parsed `payment.completed` webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    /// Unique event id, used for at-least-once delivery deduplication.
    pub event_id: String,
    pub checkout_session_id: String,
    /// The gateway's payment reference, required for any later refund.
    pub payment_reference: String,
}

/// The injected payment-provider client.
///
/// The engine never talks to the provider directly; everything goes through this trait so the
/// reconciler and refund engine are testable without a live network dependency. Implementations
/// must honour the idempotency key on [`PaymentGateway::refund`]: retried calls with the same
/// key must not produce a second refund.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// Creates a checkout session for the given amount. The buyer is redirected to the returned
    /// URL; settlement arrives later as a `payment.completed` webhook event.
    async fn create_checkout_session(
        &self,
        amount: Price,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Issues a refund for the payment identified by `payment_reference`.
    async fn refund(&self, payment_reference: &str, idempotency_key: &str) -> Result<(), GatewayError>;
}

impl<G> PaymentGateway for Arc<G>
where G: PaymentGateway + Send + Sync
{
    async fn create_checkout_session(
        &self,
        amount: Price,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, GatewayError> {
        self.as_ref().create_checkout_session(amount, success_url, cancel_url).await
    }

    async fn refund(&self, payment_reference: &str, idempotency_key: &str) -> Result<(), GatewayError> {
        self.as_ref().refund(payment_reference, idempotency_key).await
    }
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Network timeouts, 5xx responses and the like. Safe to retry.
    #[error("Transient payment gateway failure: {0}")]
    Transient(String),
    /// The gateway rejected the request outright. Retrying will not help.
    #[error("Permanent payment gateway failure: {0}")]
    Permanent(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}
