use log::*;

use crate::traits::{MarketplaceDatabase, OrderFlowError, SellerProfileStore};

/// Publishes seller rating aggregates to the external profile store.
///
/// The aggregate itself is a `(rating_sum, rating_count)` pair that the storage layer maintains
/// incrementally inside each completion transaction, so publishing is O(1). The full rescan in
/// [`RatingAggregator::recompute`] exists as a repair path in case the aggregate ever drifts.
pub struct RatingAggregator<B, P> {
    db: B,
    profiles: P,
}

impl<B, P> RatingAggregator<B, P>
where
    B: MarketplaceDatabase,
    P: SellerProfileStore,
{
    pub fn new(db: B, profiles: P) -> Self {
        Self { db, profiles }
    }

    /// Reads the stored aggregate and pushes the average to the seller's profile. `None` (no
    /// completed orders) clears the profile value rather than writing zero.
    pub async fn publish(&self, seller_id: &str) -> Result<Option<f64>, OrderFlowError> {
        let average = self.db.seller_average_rating(seller_id).await?;
        self.profiles.update_average_rating(seller_id, average).await?;
        debug!("⭐️ Published average rating {average:?} for seller {seller_id}");
        Ok(average)
    }

    /// Rebuilds the aggregate from a full scan of the seller's completed orders, then publishes
    /// the exact mean.
    pub async fn recompute(&self, seller_id: &str) -> Result<Option<f64>, OrderFlowError> {
        let average = self.db.rebuild_seller_rating(seller_id).await?;
        self.profiles.update_average_rating(seller_id, average).await?;
        info!("⭐️ Recomputed average rating for seller {seller_id}: {average:?}");
        Ok(average)
    }
}
