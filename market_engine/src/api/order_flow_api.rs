use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderState, PaymentStatus, Rating},
    events::{EventProducers, OrderAnnulledEvent, OrderCompletedEvent, OrderPaidEvent},
    traits::{MarketplaceDatabase, OrderFlowError, PaymentCompleted, PaymentGateway, SettleOutcome},
};
use crate::api::refund::{RefundEngine, RetryPolicy};

/// Where the gateway should send the buyer after a checkout attempt.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutUrls {
    pub fn new(success_url: &str, cancel_url: &str) -> Self {
        Self { success_url: success_url.to_string(), cancel_url: cancel_url.to_string() }
    }
}

/// `OrderFlowApi` is the primary API for the order lifecycle: creating purchase intents,
/// reconciling `payment.completed` webhook events against orders, and applying buyer/seller
/// commands (shipping confirmation, delivery confirmation with rating, cancellation).
///
/// The state machine it enforces:
///
/// ```text
/// Pending --checkout ok--> Pending (awaits webhook)
/// Pending --payment.completed, first writer--> Paid
/// Pending/Paid --payment.completed, loser of race--> Refunded
/// Paid --confirm_shipping--> Shipping
/// Paid/Shipping --cancel--> Refunded (if paid) | Cancelled (if not)
/// Paid/Shipping --confirm_delivery_and_rate--> Completed  [terminal]
/// Cancelled, Refunded  [terminal]
/// ```
#[derive(Clone)]
pub struct OrderFlowApi<B, G> {
    db: B,
    gateway: G,
    refunds: RefundEngine<G>,
    urls: CheckoutUrls,
    producers: EventProducers,
}

impl<B, G> Debug for OrderFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, G> OrderFlowApi<B, G>
where
    B: MarketplaceDatabase,
    G: PaymentGateway + Clone,
{
    pub fn new(db: B, gateway: G, urls: CheckoutUrls, producers: EventProducers) -> Self {
        let refunds = RefundEngine::new(gateway.clone(), RetryPolicy::default(), producers.clone());
        Self { db, gateway, refunds, urls, producers }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.refunds = RefundEngine::new(self.gateway.clone(), policy, self.producers.clone());
        self
    }

    /// Creates a purchase intent for `item_id` on behalf of `buyer_id`.
    ///
    /// Preconditions: the item exists, is listed, is not sold, and no other order for the item
    /// already holds a settled payment. The order row is persisted *before* the checkout session
    /// is requested, so a webhook arriving immediately after payment can always resolve it. If
    /// the gateway call fails, the orphaned `Pending` row is deleted again and the gateway error
    /// is returned.
    ///
    /// Returns the order and the checkout URL the buyer should be redirected to.
    pub async fn create_order(&self, buyer_id: &str, item_id: &str) -> Result<(Order, String), OrderFlowError> {
        let item = self.db.fetch_item(item_id).await?.ok_or_else(|| OrderFlowError::ItemNotFound(item_id.into()))?;
        if !item.is_purchasable() {
            debug!("🛒️ Item {item_id} is not purchasable. Rejecting order from {buyer_id}");
            return Err(OrderFlowError::ItemUnavailable(item_id.into()));
        }
        if item.seller_id == buyer_id {
            return Err(OrderFlowError::Validation("You cannot buy your own item".into()));
        }
        if let Some(paid) = self.db.fetch_paid_order_for_item(item_id).await? {
            warn!("🛒️ Item {item_id} already has a settled order {}. Rejecting new order.", paid.order_id);
            return Err(OrderFlowError::ItemUnavailable(item_id.into()));
        }
        let new_order = NewOrder::new(item_id, buyer_id, &item.seller_id, item.price);
        let order = self.db.insert_order(new_order).await?;
        debug!("🛒️ Order {} persisted. Requesting checkout session.", order.order_id);
        let session =
            match self.gateway.create_checkout_session(order.price, &self.urls.success_url, &self.urls.cancel_url).await
            {
                Ok(s) => s,
                Err(e) => {
                    // Compensate, or the pending row would sit around forever with no session to
                    // ever settle it.
                    warn!("🛒️ Checkout session creation failed for {}. Removing orphaned order. {e}", order.order_id);
                    if let Err(del) = self.db.delete_unsettled_order(&order.order_id).await {
                        error!("🛒️ Could not compensate orphaned order {}. {del}", order.order_id);
                    }
                    return Err(e.into());
                },
            };
        let order = self.db.attach_checkout_session(&order.order_id, &session.session_id).await?;
        info!("🛒️ Order {} created for item {item_id}, session {}", order.order_id, session.session_id);
        Ok((order, session.url))
    }

    /// Applies a verified `payment.completed` event.
    ///
    /// The storage layer resolves the double-sale race atomically; this method only deals with
    /// the consequences. First writer wins; the loser is refunded automatically. Duplicate
    /// events, late events for terminal orders, and unknown checkout sessions are all no-ops so
    /// gateway redeliveries never cause a retry storm.
    pub async fn handle_payment_completed(&self, event: PaymentCompleted) -> Result<SettleOutcome, OrderFlowError> {
        let outcome =
            self.db.settle_checkout(&event.event_id, &event.checkout_session_id, &event.payment_reference).await?;
        match &outcome {
            SettleOutcome::Paid(order) => {
                info!("🔄️💰️ Order {} settled as paid. Item {} is sold.", order.order_id, order.item_id);
                self.call_order_paid_hook(order).await;
            },
            SettleOutcome::LostRace(order) => {
                warn!(
                    "🔄️💰️ Order {} lost the double-sale race for item {}. Issuing automatic refund.",
                    order.order_id, order.item_id
                );
                // Refund failures are escalated on the operator channel by the refund engine;
                // the webhook must still be acknowledged, otherwise the gateway redelivers an
                // event we have already recorded as processed.
                if let Err(e) = self.refunds.refund(order).await {
                    error!("🔄️💰️ Automatic refund for {} did not complete. {e}", order.order_id);
                }
                self.call_order_annulled_hook(order).await;
            },
            SettleOutcome::AlreadyProcessed => {
                debug!("🔄️💰️ Event {} has already been processed. No-op.", event.event_id);
            },
            SettleOutcome::Superseded(order) => {
                info!(
                    "🔄️💰️ Order {} reached terminal state {} before event {} landed. No-op.",
                    order.order_id, order.state, event.event_id
                );
            },
            SettleOutcome::OrderNotFound => {
                warn!("🔄️💰️ No order matches checkout session {}. Ignoring event.", event.checkout_session_id);
            },
        }
        Ok(outcome)
    }

    /// Seller command: `Paid → Shipping`.
    pub async fn confirm_shipping(&self, oid: &OrderId, seller_id: &str) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(oid).await?;
        if order.seller_id != seller_id {
            return Err(OrderFlowError::Unauthorized(format!("{seller_id} is not the seller of order {oid}")));
        }
        let order = self.db.mark_as_shipping(oid).await?;
        info!("🔄️📦️ Order {oid} is now shipping");
        Ok(order)
    }

    /// Buyer command: `Paid/Shipping → Completed`, setting the rating exactly once and bumping
    /// the seller's rating aggregate in the same transaction. The completion event carries the
    /// order so the rating aggregator can publish the new average.
    pub async fn confirm_delivery_and_rate(
        &self,
        oid: &OrderId,
        buyer_id: &str,
        rating: i64,
        comment: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        let rating = Rating::try_from(rating)?;
        let order = self.fetch_order(oid).await?;
        if order.buyer_id != buyer_id {
            return Err(OrderFlowError::Unauthorized(format!("{buyer_id} is not the buyer of order {oid}")));
        }
        if order.rating.is_some() {
            return Err(OrderFlowError::RatingAlreadySet(oid.clone()));
        }
        let order = self.db.complete_with_rating(oid, rating, comment).await?;
        info!("🔄️⭐️ Order {oid} completed with rating {rating}");
        self.call_order_completed_hook(&order).await;
        Ok(order)
    }

    /// Seller command: cancels a non-terminal order.
    ///
    /// If the payment has settled, the order is refunded, the gateway refund is issued (once,
    /// keyed by the order id) and the item's sold flag reverts. Otherwise the order is simply
    /// cancelled with zero gateway calls. Cancellation racing a webhook is safe: whichever
    /// transition lands first wins, and the loser sees an illegal-transition rejection.
    pub async fn cancel_order(&self, oid: &OrderId, seller_id: &str) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(oid).await?;
        if order.seller_id != seller_id {
            return Err(OrderFlowError::Unauthorized(format!("{seller_id} is not the seller of order {oid}")));
        }
        if order.state.is_terminal() {
            return Err(OrderFlowError::IllegalTransition { from: order.state, to: OrderState::Cancelled });
        }
        let order = if order.payment_status == PaymentStatus::Paid {
            let order = self.db.mark_as_refunded(oid).await?;
            info!("🔄️❌️ Order {oid} cancelled after payment. Refund queued, item {} unsold again.", order.item_id);
            if let Err(e) = self.refunds.refund(&order).await {
                error!("🔄️❌️ Refund for cancelled order {oid} did not complete. {e}");
            }
            order
        } else {
            let order = self.db.mark_as_cancelled(oid).await?;
            info!("🔄️❌️ Order {oid} cancelled before payment. No gateway interaction needed.");
            order
        };
        self.call_order_annulled_hook(&order).await;
        Ok(order)
    }

    async fn fetch_order(&self, oid: &OrderId) -> Result<Order, OrderFlowError> {
        self.db.fetch_order_by_order_id(oid).await?.ok_or_else(|| OrderFlowError::OrderNotFound(oid.clone()))
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            trace!("🔄️📦️ Notifying order paid hook subscribers");
            emitter.publish_event(OrderPaidEvent::new(order.clone())).await;
        }
    }

    async fn call_order_annulled_hook(&self, order: &Order) {
        for emitter in &self.producers.order_annulled_producer {
            trace!("🔄️📦️ Notifying order annulled hook subscribers");
            emitter.publish_event(OrderAnnulledEvent::new(order.clone())).await;
        }
    }

    async fn call_order_completed_hook(&self, order: &Order) {
        for emitter in &self.producers.order_completed_producer {
            trace!("🔄️📦️ Notifying order completed hook subscribers");
            emitter.publish_event(OrderCompletedEvent::new(order.clone())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
