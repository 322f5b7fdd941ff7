use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderState};

/// Fired when an order wins its item and settles as `Paid`. Buyer and seller notifications hang
/// off this event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired when an order leaves the happy path: seller cancellation, or losing the double-sale
/// race. `status` records which terminal state was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderState,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.state;
        Self { order, status }
    }
}

/// Fired when the buyer confirms delivery and rates the seller. The rating aggregator publishes
/// the new seller average off the back of this event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    pub order: Order,
}

impl OrderCompletedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired on the operator channel when a refund could not be issued after exhausting retries.
/// These must never be dropped silently: somebody has been charged for an item they will not
/// receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundFailedEvent {
    pub order: Order,
    pub reason: String,
}

impl RefundFailedEvent {
    pub fn new(order: Order, reason: impl Into<String>) -> Self {
        Self { order, reason: reason.into() }
    }
}
