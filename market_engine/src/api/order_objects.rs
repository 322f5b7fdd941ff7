use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderId, OrderState};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

//--------------------------------------     Pagination      ---------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: Option<i64>,
    pub count: Option<i64>,
}

impl Pagination {
    pub fn new(offset: i64, count: i64) -> Self {
        Self { offset: Some(offset), count: Some(count) }
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn count(&self) -> i64 {
        self.count.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }
}

//--------------------------------------   OrderQueryFilter  ---------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub item_id: Option<String>,
    pub buyer_id: Option<String>,
    pub seller_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub state: Option<Vec<OrderState>>,
}

impl OrderQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_item_id(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    pub fn with_buyer_id(mut self, buyer_id: impl Into<String>) -> Self {
        self.buyer_id = Some(buyer_id.into());
        self
    }

    pub fn with_seller_id(mut self, seller_id: impl Into<String>) -> Self {
        self.seller_id = Some(seller_id.into());
        self
    }

    pub fn with_state(mut self, state: OrderState) -> Self {
        self.state.get_or_insert_with(Vec::new).push(state);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none()
            && self.item_id.is_none()
            && self.buyer_id.is_none()
            && self.seller_id.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.state.as_ref().map(|s| s.is_empty()).unwrap_or(true)
    }
}
