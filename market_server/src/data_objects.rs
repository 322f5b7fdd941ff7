use std::fmt::Display;

use market_engine::db_types::Order;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

//----------------------------------------------  Order DTOs  ---------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub checkout_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmShippingRequest {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRatingRequest {
    pub order_id: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    /// Optional explicit item id; one is generated when omitted.
    #[serde(default)]
    pub item_id: Option<String>,
    /// Price in whole currency units.
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    pub order: Order,
}

impl From<Order> for OrderResult {
    fn from(order: Order) -> Self {
        Self { order }
    }
}

//----------------------------------------------  Webhook DTOs  -------------------------------------------------------

pub const PAYMENT_COMPLETED_EVENT: &str = "payment.completed";

/// The gateway's webhook envelope. Only `payment.completed` events carry state the engine cares
/// about; everything else is acknowledged and dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhookEvent {
    /// Unique event id, used for deduplication across redeliveries.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventData {
    #[serde(default)]
    pub checkout_session_id: Option<String>,
    #[serde(default)]
    pub payment_reference: Option<String>,
}
