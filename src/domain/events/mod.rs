//! Domain events
//!
//! Emitted after the owning transaction commits. Delivery is best effort:
//! with no NATS connection, or when publishing fails, the event is only logged.

use serde::Serialize;

use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::{AccountId, CartId, DeliveryRuleId, Money, OrderId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    CartsMerged { target_cart: CartId, source_carts: Vec<CartId>, lines_moved: usize, lines_summed: usize },
    OrderPlaced { order_id: OrderId, account_id: AccountId, total_price: Money, delivery_cost: Money, line_count: usize },
    OrderStatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
    DeliveryRuleActivated { rule_id: DeliveryRuleId },
}

impl DomainEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::CartsMerged { .. } => "ecommerce.carts.merged",
            Self::OrderPlaced { .. } => "ecommerce.orders.placed",
            Self::OrderStatusChanged { .. } => "ecommerce.orders.status_changed",
            Self::DeliveryRuleActivated { .. } => "ecommerce.delivery.rule_activated",
        }
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
}

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }
    pub fn disabled() -> Self { Self { nats: None } }

    pub async fn publish(&self, event: DomainEvent) {
        let Some(client) = &self.nats else {
            tracing::debug!(subject = event.subject(), ?event, "event bus disabled, event not published");
            return;
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, subject = event.subject(), "failed to encode event");
                return;
            }
        };
        if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
            tracing::warn!(error = %e, subject = event.subject(), "failed to publish event");
        }
    }
}
