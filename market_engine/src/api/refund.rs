use std::time::Duration;

use log::*;

use crate::{
    db_types::Order,
    events::{EventProducers, RefundFailedEvent},
    traits::{GatewayError, OrderFlowError, PaymentGateway},
};

/// Retry schedule for transient gateway failures: `base_delay`, doubling per attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps and never retries. Used in tests.
    pub fn no_retries() -> Self {
        Self { max_attempts: 1, base_delay: Duration::from_millis(0) }
    }
}

/// Issues gateway refunds for orders whose payment must be reversed.
///
/// Every refund call carries an idempotency key derived from the order id, so a retried call
/// (ours, or a redelivered webhook triggering the same refund twice) can never double-refund.
/// Transient gateway failures are retried with exponential backoff; permanent or exhausted
/// failures are published on the operator `RefundFailedEvent` channel rather than dropped.
#[derive(Clone)]
pub struct RefundEngine<G> {
    gateway: G,
    policy: RetryPolicy,
    producers: EventProducers,
}

impl<G> RefundEngine<G>
where G: PaymentGateway
{
    pub fn new(gateway: G, policy: RetryPolicy, producers: EventProducers) -> Self {
        Self { gateway, policy, producers }
    }

    pub async fn refund(&self, order: &Order) -> Result<(), OrderFlowError> {
        let reference = order.payment_reference.as_deref().ok_or_else(|| {
            // A refund request for an order that never settled is an invariant violation, not a
            // user error. Log it loudly.
            error!("💸️🚨️ Order {} was queued for refund without a payment reference. This is a bug.", order.order_id);
            OrderFlowError::PaymentReferenceMissing(order.order_id.clone())
        })?;
        let idempotency_key = format!("refund-{}", order.order_id.as_str());
        let mut delay = self.policy.base_delay;
        let mut attempt = 1u32;
        loop {
            match self.gateway.refund(reference, &idempotency_key).await {
                Ok(()) => {
                    info!("💸️ Refund issued for order {} ({})", order.order_id, order.price);
                    return Ok(());
                },
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    warn!(
                        "💸️ Transient gateway failure refunding order {} (attempt {attempt}/{}). Retrying in \
                         {delay:?}. {e}",
                        order.order_id, self.policy.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                },
                Err(e) => {
                    self.escalate(order, &e).await;
                    return Err(e.into());
                },
            }
        }
    }

    async fn escalate(&self, order: &Order, err: &GatewayError) {
        error!(
            "💸️🚨️ Refund for order {} could not be issued: {err}. The buyer has been charged for an item they will \
             not receive. Operator intervention required.",
            order.order_id
        );
        for emitter in &self.producers.refund_failed_producer {
            emitter.publish_event(RefundFailedEvent::new(order.clone(), err.to_string())).await;
        }
    }
}
