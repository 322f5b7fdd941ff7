//! Art Marketplace Order Engine
//!
//! This library contains the order and payment lifecycle logic for the marketplace: creating
//! purchase intents, reconciling asynchronous payment-gateway webhook events against orders,
//! resolving the double-sale race for single, non-divisible items, issuing refunds, and
//! aggregating seller ratings. It is HTTP-framework and provider agnostic.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You
//!    should never need to access the database directly. Instead, use the public API provided by
//!    the engine. The exception is the data types used in the database, which are defined in the
//!    `db_types` module and are public.
//! 2. The engine public API ([`mod@api`]). This provides the public-facing functionality of the
//!    engine: the order flow state machine, the refund engine and the rating aggregator. Specific
//!    backends need to implement the traits in the [`mod@traits`] module in order to act as a
//!    backend for the marketplace server.
//! 3. The event hooks ([`mod@events`]). These are emitted when orders change state (paid,
//!    annulled, completed, refund failed). A simple actor framework is used so that callers can
//!    hook into these events, e.g. to dispatch buyer/seller notifications.
mod api;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{
    order_objects::{OrderQueryFilter, Pagination},
    order_query_api::OrderQueryApi,
    rating_api::RatingAggregator,
    order_flow_api::CheckoutUrls,
    refund::{RefundEngine, RetryPolicy},
    OrderFlowApi,
};
