use log::info;
use thiserror::Error;

/// The external seller-profile store. The engine only pushes rating aggregates to it; user and
/// profile storage itself lives outside this subsystem.
#[allow(async_fn_in_trait)]
pub trait SellerProfileStore {
    /// Writes the seller's average rating. `None` clears the aggregate (a seller with no
    /// completed orders has an undefined average, not a zero one).
    async fn update_average_rating(&self, seller_id: &str, average: Option<f64>) -> Result<(), ProfileStoreError>;
}

#[derive(Debug, Clone, Error)]
#[error("Could not update seller profile: {0}")]
pub struct ProfileStoreError(pub String);

/// Default collaborator used when no profile store is wired in: logs the update and moves on.
#[derive(Debug, Clone, Default)]
pub struct LoggingProfileStore;

impl SellerProfileStore for LoggingProfileStore {
    async fn update_average_rating(&self, seller_id: &str, average: Option<f64>) -> Result<(), ProfileStoreError> {
        match average {
            Some(avg) => info!("⭐️ Seller {seller_id} average rating is now {avg:.2}"),
            None => info!("⭐️ Seller {seller_id} average rating cleared"),
        }
        Ok(())
    }
}
