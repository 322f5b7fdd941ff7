use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use mkt_common::Price;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::helpers::random_id;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------      OrderState     ---------------------------------------------------------
/// Fulfilment state of an order. The happy path is monotonic:
/// `Pending → Paid → Shipping → Completed`, with two escape transitions (`Cancelled`,
/// `Refunded`) available from any non-terminal state. `Completed`, `Cancelled` and `Refunded`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderState {
    /// The order has been created and a checkout session requested. No payment has settled yet.
    Pending,
    /// Payment has settled and the item is reserved for this order.
    Paid,
    /// The seller has confirmed shipment.
    Shipping,
    /// The buyer has confirmed delivery and rated the seller.
    Completed,
    /// The seller cancelled the order before payment settled.
    Cancelled,
    /// The payment was reversed, either on seller cancellation or as the loser of a double sale.
    Refunded,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Completed | OrderState::Cancelled | OrderState::Refunded)
    }
}

impl Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderState::Pending => write!(f, "Pending"),
            OrderState::Paid => write!(f, "Paid"),
            OrderState::Shipping => write!(f, "Shipping"),
            OrderState::Completed => write!(f, "Completed"),
            OrderState::Cancelled => write!(f, "Cancelled"),
            OrderState::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for OrderState {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Shipping" => Ok(Self::Shipping),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order state: {s}"))),
        }
    }
}

impl From<String> for OrderState {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order state: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderState::Pending
        })
    }
}

//--------------------------------------    PaymentStatus    ---------------------------------------------------------
/// Settlement state of the money attached to an order, tracked separately from fulfilment.
/// At most one order per item may ever hold `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Paid => write!(f, "Paid"),
            PaymentStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PaymentStatus::Pending
        })
    }
}

//--------------------------------------       OrderId       ---------------------------------------------------------
/// Opaque unique order identifier, generated at order creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn random() -> Self {
        Self(format!("ord-{}", random_id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------       Rating        ---------------------------------------------------------
/// A buyer rating for a completed order. Always an integer in `[1, 5]`; construct via
/// [`Rating::try_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Rating(i64);

impl Rating {
    pub fn value(&self) -> i64 {
        self.0
    }
}

#[derive(Debug, Clone, Error)]
#[error("Ratings must be an integer between 1 and 5. Got {0}.")]
pub struct InvalidRating(pub i64);

impl TryFrom<i64> for Rating {
    type Error = InvalidRating;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidRating(value))
        }
    }
}

impl Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
/// The central entity: one buyer–seller transaction for a single item.
///
/// Orders are created by the checkout initiator and mutated exclusively by the reconciler and
/// refund engine. They are never deleted once a checkout session has been handed to the buyer;
/// the only deletion is the compensation of an orphaned `Pending` row when checkout-session
/// creation fails.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub item_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub price: Price,
    pub state: OrderState,
    pub payment_status: PaymentStatus,
    /// Correlates webhook events to this order. Unique across all orders, immutable once set.
    pub checkout_session_id: Option<String>,
    /// Gateway payment reference, set once payment settles. Required for refunds.
    pub payment_reference: Option<String>,
    pub rating: Option<Rating>,
    pub rating_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

impl Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Order {} ({}/{}): item {} for {} from {} to {}",
            self.order_id, self.state, self.payment_status, self.item_id, self.price, self.seller_id, self.buyer_id
        )
    }
}

//--------------------------------------       NewOrder      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub item_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub price: Price,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(item_id: &str, buyer_id: &str, seller_id: &str, price: Price) -> Self {
        Self {
            order_id: OrderId::random(),
            item_id: item_id.to_string(),
            buyer_id: buyer_id.to_string(),
            seller_id: seller_id.to_string(),
            price,
            created_at: Utc::now(),
        }
    }
}

//--------------------------------------        Item         ---------------------------------------------------------
/// The availability gate's view of an item: listed or not, and a `sold` flag that is only ever
/// flipped by a conditional write inside the settlement transaction.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Item {
    pub item_id: String,
    pub seller_id: String,
    pub price: Price,
    pub available: bool,
    pub sold: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn is_purchasable(&self) -> bool {
        self.available && !self.sold
    }
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub item_id: String,
    pub seller_id: String,
    pub price: Price,
}

impl NewItem {
    pub fn new(seller_id: &str, price: Price) -> Self {
        Self { item_id: format!("item-{}", random_id()), seller_id: seller_id.to_string(), price }
    }

    pub fn with_id(item_id: &str, seller_id: &str, price: Price) -> Self {
        Self { item_id: item_id.to_string(), seller_id: seller_id.to_string(), price }
    }
}
