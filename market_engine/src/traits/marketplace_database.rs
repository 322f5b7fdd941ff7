use thiserror::Error;

use crate::{
    api::order_objects::{OrderQueryFilter, Pagination},
    db_types::{NewOrder, Order, OrderId, OrderState, Rating},
    traits::{data_objects::SettleOutcome, GatewayError, ItemStore, ProfileStoreError},
};

/// This trait defines the highest level of behaviour for backends supporting the order engine.
///
/// This behaviour includes:
/// * Creating orders and correlating them with checkout sessions.
/// * The atomic settlement primitive that resolves the double-sale race.
/// * State transitions for the order lifecycle (shipping, completion, cancellation, refund).
/// * Maintaining the incremental seller rating aggregate.
///
/// Every method that mutates order state re-checks the current state inside the statement
/// (`UPDATE ... WHERE state = ...`), so concurrent commands and webhook deliveries serialize in
/// the storage layer; the loser of any race observes an [`OrderFlowError::IllegalTransition`]
/// or a no-op outcome rather than silently overwriting a terminal state.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase: Clone + ItemStore {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Persists a brand-new `Pending` order. Fails if the order id already exists.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderFlowError>;

    /// Records the checkout session id returned by the gateway. The session id is immutable: a
    /// second attach for the same order fails.
    async fn attach_checkout_session(&self, oid: &OrderId, session_id: &str) -> Result<Order, OrderFlowError>;

    /// Compensation for a failed checkout-session creation: removes the orphaned `Pending` row.
    /// Only `Pending` orders with no session attached may be deleted.
    async fn delete_unsettled_order(&self, oid: &OrderId) -> Result<(), OrderFlowError>;

    async fn fetch_order_by_order_id(&self, oid: &OrderId) -> Result<Option<Order>, OrderFlowError>;

    async fn fetch_order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, OrderFlowError>;

    /// Returns the order currently holding `payment_status = Paid` for the item, if any.
    async fn fetch_paid_order_for_item(&self, item_id: &str) -> Result<Option<Order>, OrderFlowError>;

    /// Applies a `payment.completed` event in a single transaction:
    /// 1. Inserts `event_id` into the processed-events table; bails out with
    ///    [`SettleOutcome::AlreadyProcessed`] if it was seen before.
    /// 2. Looks up the order by checkout session id.
    /// 3. Flips the item's sold flag with a conditional write. If this order wins, it becomes
    ///    `Paid`/`Paid` and stores `payment_reference`. If another order already holds the item,
    ///    this one is marked `Refunded`/`Refunded` (the caller issues the gateway refund).
    ///
    /// Terminal orders are left untouched ([`SettleOutcome::Superseded`]).
    async fn settle_checkout(
        &self,
        event_id: &str,
        session_id: &str,
        payment_reference: &str,
    ) -> Result<SettleOutcome, OrderFlowError>;

    /// Transitions `Paid → Shipping`. Fails with [`OrderFlowError::IllegalTransition`] from any
    /// other state.
    async fn mark_as_shipping(&self, oid: &OrderId) -> Result<Order, OrderFlowError>;

    /// Transitions an unpaid, non-terminal order to `Cancelled`. No gateway interaction.
    async fn mark_as_cancelled(&self, oid: &OrderId) -> Result<Order, OrderFlowError>;

    /// Transitions a paid order to `Refunded`/`Refunded` and reverts the item's sold flag, in
    /// one transaction. The gateway refund itself happens outside the transaction.
    async fn mark_as_refunded(&self, oid: &OrderId) -> Result<Order, OrderFlowError>;

    /// Completes an order from `Paid` or `Shipping`: stores the rating and optional comment,
    /// sets `completed_at`, and bumps the seller's `(rating_sum, rating_count)` aggregate in the
    /// same transaction. The rating is immutable; a second completion attempt fails.
    async fn complete_with_rating(
        &self,
        oid: &OrderId,
        rating: Rating,
        comment: Option<String>,
    ) -> Result<Order, OrderFlowError>;

    /// Paginated, newest-first order listings for one side of the market.
    async fn fetch_orders_for_buyer(&self, buyer_id: &str, pagination: &Pagination)
        -> Result<Vec<Order>, OrderFlowError>;

    async fn fetch_orders_for_seller(
        &self,
        seller_id: &str,
        pagination: &Pagination,
    ) -> Result<Vec<Order>, OrderFlowError>;

    /// Fetches orders according to criteria specified in the `OrderQueryFilter`.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;

    /// Reads the stored `(rating_sum, rating_count)` aggregate. `None` when the seller has no
    /// completed, rated orders.
    async fn seller_average_rating(&self, seller_id: &str) -> Result<Option<f64>, OrderFlowError>;

    /// Rebuilds the aggregate from a full rescan of the seller's completed orders and returns
    /// the exact mean. Repair path for the incremental aggregate.
    async fn rebuild_seller_rating(&self, seller_id: &str) -> Result<Option<f64>, OrderFlowError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), OrderFlowError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The item {0} does not exist")]
    ItemNotFound(String),
    #[error("The item {0} is not available for sale")]
    ItemUnavailable(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidRating(#[from] crate::db_types::InvalidRating),
    #[error("Caller is not authorized to act on this order. {0}")]
    Unauthorized(String),
    #[error("Illegal order state transition: {from} → {to}")]
    IllegalTransition { from: OrderState, to: OrderState },
    #[error("The rating for order {0} has already been set and cannot change")]
    RatingAlreadySet(OrderId),
    #[error("Order {0} has no checkout session attached")]
    CheckoutSessionMissing(OrderId),
    #[error("The checkout session for order {0} is already set and cannot change")]
    CheckoutSessionImmutable(OrderId),
    #[error("Invariant violated: order {0} has no payment reference but a refund was requested")]
    PaymentReferenceMissing(OrderId),
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Seller profile store error: {0}")]
    ProfileStore(#[from] ProfileStoreError),
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}
