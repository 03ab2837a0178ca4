//! Order placement.
//!
//! One transaction snapshots the cart, prices it, writes the order and its
//! lines, and empties the cart. Any failure rolls all of it back and leaves
//! the cart exactly as it was.

use std::sync::Arc;

use crate::domain::aggregates::{Cart, CartView, NewOrder, NewOrderLine, OrderDetail};
use crate::domain::events::{DomainEvent, EventBus};
use crate::domain::value_objects::{AccountId, AddressId, PaymentMethod};
use crate::services::delivery::ensure_active_rule;
use crate::store::{AddressBook, ProductCatalog, Store, StoreTx};
use crate::{EcommerceError, Result};

/// Checkout input as submitted by the customer.
#[derive(Clone, Debug)]
pub struct PlaceOrder {
    pub address_id: AddressId,
    /// Parsed inside the transaction so the precondition order holds.
    pub payment_method: String,
    pub comment: Option<String>,
}

pub struct OrderFactory<S> {
    store: Arc<S>,
    events: EventBus,
}

impl<S> Clone for OrderFactory<S> {
    fn clone(&self) -> Self { Self { store: Arc::clone(&self.store), events: self.events.clone() } }
}

impl<S: Store> OrderFactory<S> {
    pub fn new(store: Arc<S>, events: EventBus) -> Self { Self { store, events } }

    /// Converts the account's cart into an order.
    ///
    /// Preconditions are checked before any write, first failure wins:
    /// `EmptyCart`, then `AddressNotFound`, then `InvalidPaymentMethod`.
    ///
    /// Lines whose product has been deleted are left out of the order; a cart
    /// with no line left is `EmptyCart`. Products withdrawn from sale are still
    /// snapshotted. The order total is the cart's subtotal plus the delivery
    /// fee and is never recomputed from the written lines.
    #[tracing::instrument(skip(self, cart, request), fields(cart_id = %cart.id))]
    pub async fn place_order(&self, account: AccountId, cart: &Cart, request: PlaceOrder) -> Result<OrderDetail> {
        let mut tx = self.store.begin().await?;
        let cart = tx
            .lock_cart(cart.id)
            .await?
            .filter(|c| c.is_owned_by(account))
            .ok_or(EcommerceError::CartNotFound)?;

        let lines = tx.cart_lines(cart.id).await?;
        if lines.is_empty() {
            return Err(EcommerceError::EmptyCart);
        }
        let address = tx
            .get_owned_address(account, request.address_id)
            .await?
            .ok_or(EcommerceError::AddressNotFound)?;
        let payment_method: PaymentMethod =
            request.payment_method.parse().map_err(EcommerceError::InvalidPaymentMethod)?;
        let comment = request.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());

        let snapshot_len = lines.len() as u64;
        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let product = tx.get_product(line.product_id).await?;
            priced.push((line, product));
        }
        let subtotal = CartView::build(cart.id, priced.clone()).total_price;

        let mut resolved = Vec::with_capacity(priced.len());
        for (line, product) in priced {
            match product {
                Some(product) => resolved.push((line, product)),
                None => tracing::warn!(cart_id = %cart.id, product_id = %line.product_id, "product no longer exists, line skipped"),
            }
        }
        if resolved.is_empty() {
            return Err(EcommerceError::EmptyCart);
        }

        let rule = ensure_active_rule(&mut tx).await?;
        let delivery_cost = rule.fee_for(subtotal);
        let order = tx
            .insert_order(&NewOrder {
                account_id: account,
                address_id: address.id,
                payment_method,
                total_price: subtotal + delivery_cost,
                delivery_cost,
                comment,
            })
            .await?;

        let mut order_lines = Vec::with_capacity(resolved.len());
        for (line, product) in resolved {
            let new_line = NewOrderLine {
                product_id: product.id,
                product_name: product.name,
                product_price: product.price,
                quantity: line.quantity,
            };
            order_lines.push(tx.insert_order_line(order.id, &new_line).await?);
        }

        let cleared = tx.clear_lines(cart.id).await?;
        if cleared != snapshot_len {
            tracing::warn!(cart_id = %cart.id, expected = snapshot_len, cleared, "cart changed during checkout");
            return Err(EcommerceError::ConcurrencyConflict);
        }
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            account_id = %account,
            total = %order.total_price,
            delivery = %order.delivery_cost,
            lines = order_lines.len(),
            "order placed"
        );
        self.events
            .publish(DomainEvent::OrderPlaced {
                order_id: order.id,
                account_id: account,
                total_price: order.total_price,
                delivery_cost: order.delivery_cost,
                line_count: order_lines.len(),
            })
            .await;

        Ok(OrderDetail { order, lines: order_lines })
    }
}
