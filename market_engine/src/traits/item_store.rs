use crate::{
    db_types::{Item, NewItem},
    traits::OrderFlowError,
};

/// The item availability gate.
///
/// Note what is *not* here: `mark_sold`. Flipping the sold flag is only legal as the conditional
/// write inside [`MarketplaceDatabase::settle_checkout`], never as a separate read-then-write.
/// The only un-gated mutation is `mark_unsold`, which reverts the flag when a paid order is
/// cancelled (and that revert is itself part of the refund transaction in the SQLite backend).
///
/// [`MarketplaceDatabase::settle_checkout`]: crate::traits::MarketplaceDatabase::settle_checkout
#[allow(async_fn_in_trait)]
pub trait ItemStore: Clone {
    /// Creates a new listing. The item starts out available and unsold.
    async fn insert_item(&self, item: NewItem) -> Result<Item, OrderFlowError>;

    async fn fetch_item(&self, item_id: &str) -> Result<Option<Item>, OrderFlowError>;

    /// True if the item exists, is listed for sale, and has not been sold.
    async fn is_available(&self, item_id: &str) -> Result<bool, OrderFlowError> {
        Ok(self.fetch_item(item_id).await?.map(|i| i.is_purchasable()).unwrap_or(false))
    }

    /// Reverts the sold flag. Called when a paid order is cancelled and refunded.
    async fn mark_unsold(&self, item_id: &str) -> Result<(), OrderFlowError>;
}
