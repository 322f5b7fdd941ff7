//! `SqliteDatabase` is a concrete implementation of a marketplace order engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`traits`] module.
//!
//! [`traits`]: crate::traits
use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, items, new_pool, orders, ratings, webhook_events};
use crate::{
    api::order_objects::{OrderQueryFilter, Pagination},
    db_types::{Item, NewItem, NewOrder, Order, OrderId, OrderState, Rating},
    traits::{ItemStore, MarketplaceDatabase, OrderFlowError, SettleOutcome},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl ItemStore for SqliteDatabase {
    async fn insert_item(&self, item: NewItem) -> Result<Item, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        items::insert_item(item, &mut conn).await
    }

    async fn fetch_item(&self, item_id: &str) -> Result<Option<Item>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let item = items::fetch_item(item_id, &mut conn).await?;
        Ok(item)
    }

    async fn mark_unsold(&self, item_id: &str) -> Result<(), OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        items::mark_unsold(item_id, &mut conn).await
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderFlowError> {
        let oid = order.order_id.clone();
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await.map_err(|e| match e {
            OrderFlowError::DatabaseError(ref msg) if msg.contains("UNIQUE constraint failed") => {
                OrderFlowError::OrderAlreadyExists(oid)
            },
            e => e,
        })?;
        Ok(order)
    }

    async fn attach_checkout_session(&self, oid: &OrderId, session_id: &str) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        match orders::attach_checkout_session(oid, session_id, &mut conn).await? {
            Some(order) => {
                debug!("🗃️ Checkout session [{session_id}] attached to order [{oid}]");
                Ok(order)
            },
            None => match orders::fetch_order_by_order_id(oid, &mut conn).await? {
                Some(_) => Err(OrderFlowError::CheckoutSessionImmutable(oid.clone())),
                None => Err(OrderFlowError::OrderNotFound(oid.clone())),
            },
        }
    }

    async fn delete_unsettled_order(&self, oid: &OrderId) -> Result<(), OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let deleted = orders::delete_unsettled_order(oid, &mut conn).await?;
        if deleted {
            debug!("🗃️ Order [{oid}] rolled back after checkout session failure");
        } else {
            warn!("🗃️ Order [{oid}] was not eligible for rollback. Leaving it in place.");
        }
        Ok(())
    }

    async fn fetch_order_by_order_id(&self, oid: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(oid, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_checkout_session(session_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_paid_order_for_item(&self, item_id: &str) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_paid_order_for_item(item_id, &mut conn).await?;
        Ok(order)
    }

    /// The settlement transaction. Everything that decides the fate of a `payment.completed`
    /// event happens between one `BEGIN` and one `COMMIT`:
    /// * the event-id dedup insert,
    /// * the sold-flag compare-and-swap on the item,
    /// * the winner/loser order update.
    ///
    /// If the order for the session does not exist yet, the transaction is rolled back so the
    /// event id is forgotten and a gateway redelivery gets a clean retry. Everything else
    /// commits, including the no-op outcomes, so replays of a decided event stay cheap.
    async fn settle_checkout(
        &self,
        event_id: &str,
        session_id: &str,
        payment_reference: &str,
    ) -> Result<SettleOutcome, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        if !webhook_events::record_event(event_id, &mut tx).await? {
            debug!("🗃️ Event [{event_id}] has already been processed. Ignoring.");
            return Ok(SettleOutcome::AlreadyProcessed);
        }
        let order = match orders::fetch_order_by_checkout_session(session_id, &mut tx).await? {
            Some(o) => o,
            None => {
                warn!("🗃️ Event [{event_id}] references unknown checkout session [{session_id}]");
                tx.rollback().await?;
                return Ok(SettleOutcome::OrderNotFound);
            },
        };
        // A settled or annulled order never moves again, whatever the gateway sends.
        if order.state.is_terminal() || order.is_paid() {
            debug!("🗃️ Event [{event_id}] arrived for order [{}] in state {}. Ignoring.", order.order_id, order.state);
            tx.commit().await?;
            return Ok(SettleOutcome::Superseded(order));
        }
        let won_item = items::try_mark_sold(&order.item_id, &mut tx).await?;
        let outcome = if won_item {
            let order = orders::mark_paid(&order.order_id, payment_reference, &mut tx).await?.ok_or_else(|| {
                OrderFlowError::DatabaseError(format!(
                    "Order {} vanished mid-settlement. Rolling the transaction back.",
                    order.order_id
                ))
            })?;
            info!("🗃️ Order [{}] settled as paid. Item [{}] is sold.", order.order_id, order.item_id);
            SettleOutcome::Paid(order)
        } else {
            let order = orders::mark_lost_race(&order.order_id, payment_reference, &mut tx).await?.ok_or_else(|| {
                OrderFlowError::DatabaseError(format!(
                    "Order {} vanished mid-settlement. Rolling the transaction back.",
                    order.order_id
                ))
            })?;
            info!(
                "🗃️ Order [{}] lost the race for item [{}]. Marked for refund.",
                order.order_id, order.item_id
            );
            SettleOutcome::LostRace(order)
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn mark_as_shipping(&self, oid: &OrderId) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        match orders::mark_as_shipping(oid, &mut conn).await? {
            Some(order) => {
                debug!("🗃️ Order [{oid}] is now shipping");
                Ok(order)
            },
            None => Err(transition_error(oid, OrderState::Shipping, &mut conn).await?),
        }
    }

    async fn mark_as_cancelled(&self, oid: &OrderId) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        match orders::mark_as_cancelled(oid, &mut conn).await? {
            Some(order) => {
                debug!("🗃️ Order [{oid}] has been cancelled");
                Ok(order)
            },
            None => Err(transition_error(oid, OrderState::Cancelled, &mut conn).await?),
        }
    }

    async fn mark_as_refunded(&self, oid: &OrderId) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::mark_as_refunded(oid, &mut tx).await? {
            Some(order) => order,
            None => {
                let err = transition_error(oid, OrderState::Refunded, &mut tx).await?;
                return Err(err);
            },
        };
        items::mark_unsold(&order.item_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{oid}] refunded. Item [{}] is back on the market.", order.item_id);
        Ok(order)
    }

    async fn complete_with_rating(
        &self,
        oid: &OrderId,
        rating: Rating,
        comment: Option<String>,
    ) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::complete_with_rating(oid, rating, comment, &mut tx).await? {
            Some(order) => order,
            None => {
                let err = match orders::fetch_order_by_order_id(oid, &mut tx).await? {
                    None => OrderFlowError::OrderNotFound(oid.clone()),
                    Some(o) if o.rating.is_some() => OrderFlowError::RatingAlreadySet(oid.clone()),
                    Some(o) => OrderFlowError::IllegalTransition { from: o.state, to: OrderState::Completed },
                };
                return Err(err);
            },
        };
        ratings::bump_aggregate(&order.seller_id, rating, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Order [{oid}] completed with a {rating} rating for {}", order.seller_id);
        Ok(order)
    }

    async fn fetch_orders_for_buyer(
        &self,
        buyer_id: &str,
        pagination: &Pagination,
    ) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_for_buyer(buyer_id, pagination, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_orders_for_seller(
        &self,
        seller_id: &str,
        pagination: &Pagination,
    ) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_for_seller(seller_id, pagination, &mut conn).await?;
        Ok(orders)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn seller_average_rating(&self, seller_id: &str) -> Result<Option<f64>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        ratings::average(seller_id, &mut conn).await
    }

    async fn rebuild_seller_rating(&self, seller_id: &str) -> Result<Option<f64>, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let avg = ratings::rebuild(seller_id, &mut tx).await?;
        tx.commit().await?;
        Ok(avg)
    }

    async fn close(&mut self) -> Result<(), OrderFlowError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Turns a failed conditional state update into the right error by looking at the row as it is.
async fn transition_error(
    oid: &OrderId,
    to: OrderState,
    conn: &mut sqlx::SqliteConnection,
) -> Result<OrderFlowError, OrderFlowError> {
    let err = match orders::fetch_order_by_order_id(oid, conn).await? {
        None => OrderFlowError::OrderNotFound(oid.clone()),
        Some(order) => OrderFlowError::IllegalTransition { from: order.state, to },
    };
    Ok(err)
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
