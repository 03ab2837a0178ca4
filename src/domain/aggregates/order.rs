//! Order Aggregate
//!
//! Orders are written once by checkout. Afterwards only `status` moves, and
//! only along the lifecycle encoded in [`OrderStatus::can_transition_to`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::value_objects::{AccountId, AddressId, Money, OrderId, OrderLineId, PaymentMethod, ProductId, Quantity};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    New,
    Processing,
    Delivering,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processing => "processing",
            Self::Delivering => "delivering",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Processing)
                | (Self::Processing, Self::Delivering)
                | (Self::Delivering, Self::Completed)
                | (Self::New | Self::Processing, Self::Canceled)
        )
    }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "processing" => Ok(Self::Processing),
            "delivering" => Ok(Self::Delivering),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    /// Reference frozen at checkout; `None` once the address row is gone.
    pub address_id: Option<AddressId>,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub total_price: Money,
    pub delivery_cost: Money,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Historical line. `product_name` and `product_price` are copies taken at
/// checkout and are never refreshed from the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub product_price: Money,
    pub quantity: Quantity,
}

impl OrderLine {
    pub fn line_total(&self) -> Money { self.product_price.multiply(self.quantity.value()) }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub account_id: AccountId,
    pub address_id: AddressId,
    pub payment_method: PaymentMethod,
    pub total_price: Money,
    pub delivery_cost: Money,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_price: Money,
    pub quantity: Quantity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub status: OrderStatus,
    pub total_price: Money,
    pub delivery_cost: Money,
    pub payment_method: PaymentMethod,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

impl OrderDetail {
    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            id: self.order.id,
            status: self.order.status,
            total_price: self.order.total_price,
            delivery_cost: self.order.delivery_cost,
            payment_method: self.order.payment_method,
            item_count: self.lines.len(),
            created_at: self.order.created_at,
        }
    }
}
