//! The behaviour that backends and external collaborators must provide to drive the order engine.
//!
//! * [`MarketplaceDatabase`] - persistent order storage with the atomic settlement primitive.
//! * [`ItemStore`] - the item availability gate.
//! * [`PaymentGateway`] - the injected payment provider (checkout sessions and refunds).
//! * [`SellerProfileStore`] - the external profile store that receives rating aggregates.
mod data_objects;
mod item_store;
mod marketplace_database;
mod payment_gateway;
mod seller_profiles;

pub use data_objects::SettleOutcome;
pub use item_store::ItemStore;
pub use marketplace_database::{MarketplaceDatabase, OrderFlowError};
pub use payment_gateway::{CheckoutSession, GatewayError, PaymentCompleted, PaymentGateway};
pub use seller_profiles::{LoggingProfileStore, ProfileStoreError, SellerProfileStore};
