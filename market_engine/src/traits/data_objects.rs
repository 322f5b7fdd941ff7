use crate::db_types::Order;

/// The result of applying a `payment.completed` event inside a single settlement transaction.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// This order won the item. It is now `Paid`/`Paid` and the item is marked sold.
    Paid(Order),
    /// Another order already holds the item. This order has been marked `Refunded`/`Refunded`
    /// and the caller must issue the gateway refund.
    LostRace(Order),
    /// The event id has been seen before. Nothing was changed.
    AlreadyProcessed,
    /// The order reached a terminal state before this event landed (e.g. seller cancellation
    /// raced the webhook). The event is a no-op.
    Superseded(Order),
    /// No order correlates to the checkout session in the event.
    OrderNotFound,
}
