use crate::{
    api::order_objects::{OrderQueryFilter, Pagination},
    db_types::{Order, OrderId},
    traits::{MarketplaceDatabase, OrderFlowError},
};

/// Read-side API for order listings. Every accessor is scoped to the calling party: buyers can
/// only see orders they placed, sellers only orders for their items.
pub struct OrderQueryApi<B> {
    db: B,
}

impl<B> OrderQueryApi<B>
where B: MarketplaceDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn fetch_buy_order(&self, oid: &OrderId, buyer_id: &str) -> Result<Order, OrderFlowError> {
        let order =
            self.db.fetch_order_by_order_id(oid).await?.ok_or_else(|| OrderFlowError::OrderNotFound(oid.clone()))?;
        if order.buyer_id != buyer_id {
            return Err(OrderFlowError::Unauthorized(format!("{buyer_id} is not the buyer of order {oid}")));
        }
        Ok(order)
    }

    pub async fn fetch_sell_order(&self, oid: &OrderId, seller_id: &str) -> Result<Order, OrderFlowError> {
        let order =
            self.db.fetch_order_by_order_id(oid).await?.ok_or_else(|| OrderFlowError::OrderNotFound(oid.clone()))?;
        if order.seller_id != seller_id {
            return Err(OrderFlowError::Unauthorized(format!("{seller_id} is not the seller of order {oid}")));
        }
        Ok(order)
    }

    /// Newest-first page of the buyer's orders.
    pub async fn latest_buy_orders(&self, buyer_id: &str, pagination: &Pagination) -> Result<Vec<Order>, OrderFlowError> {
        self.db.fetch_orders_for_buyer(buyer_id, pagination).await
    }

    /// Newest-first page of the seller's orders.
    pub async fn latest_sell_orders(
        &self,
        seller_id: &str,
        pagination: &Pagination,
    ) -> Result<Vec<Order>, OrderFlowError> {
        self.db.fetch_orders_for_seller(seller_id, pagination).await
    }

    pub async fn search(&self, filter: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        self.db.search_orders(filter).await
    }
}
