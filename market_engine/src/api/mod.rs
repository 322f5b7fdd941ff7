pub mod order_flow_api;
pub mod order_objects;
pub mod order_query_api;
pub mod rating_api;
pub mod refund;

pub use order_flow_api::OrderFlowApi;
