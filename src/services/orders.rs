//! Order history and the administrative status lifecycle.

use std::sync::Arc;

use crate::domain::aggregates::{OrderDetail, OrderStatus, OrderSummary};
use crate::domain::events::{DomainEvent, EventBus};
use crate::domain::value_objects::{AccountId, OrderId};
use crate::store::{Store, StoreTx};
use crate::{EcommerceError, Result};

pub struct OrderService<S> {
    store: Arc<S>,
    events: EventBus,
}

impl<S> Clone for OrderService<S> {
    fn clone(&self) -> Self { Self { store: Arc::clone(&self.store), events: self.events.clone() } }
}

impl<S: Store> OrderService<S> {
    pub fn new(store: Arc<S>, events: EventBus) -> Self { Self { store, events } }

    /// The account's orders, newest first.
    pub async fn list_orders(&self, account: AccountId) -> Result<Vec<OrderSummary>> {
        let mut tx = self.store.begin().await?;
        let orders = tx.orders_for_account(account).await?;
        let mut summaries = Vec::with_capacity(orders.len());
        for order in orders {
            let lines = tx.order_lines(order.id).await?;
            summaries.push(OrderDetail { order, lines }.summary());
        }
        tx.commit().await?;
        Ok(summaries)
    }

    /// Orders of other accounts are reported as not found.
    pub async fn get_order(&self, account: AccountId, id: OrderId) -> Result<OrderDetail> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .get_order(id)
            .await?
            .filter(|o| o.account_id == account)
            .ok_or(EcommerceError::OrderNotFound)?;
        let lines = tx.order_lines(order.id).await?;
        tx.commit().await?;
        Ok(OrderDetail { order, lines })
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<OrderDetail> {
        let mut tx = self.store.begin().await?;
        tx.lock_key(&format!("order:{id}")).await?;
        let mut order = tx.get_order(id).await?.ok_or(EcommerceError::OrderNotFound)?;
        let from = order.status;
        if !from.can_transition_to(status) {
            return Err(EcommerceError::InvalidStatusTransition { from, to: status });
        }
        tx.set_order_status(id, status).await?;
        order.status = status;
        let lines = tx.order_lines(id).await?;
        tx.commit().await?;

        tracing::info!(order_id = %id, %from, to = %status, "order status changed");
        self.events.publish(DomainEvent::OrderStatusChanged { order_id: id, from, to: status }).await;
        Ok(OrderDetail { order, lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Money;
    use crate::services::cart::CartService;
    use crate::services::checkout::{OrderFactory, PlaceOrder};
    use crate::services::identity::testing::TestRequester;
    use crate::store::MemoryStore;

    async fn place(store: &MemoryStore, account: i64, price: i64) -> OrderDetail {
        let shared = Arc::new(store.clone());
        let carts = CartService::new(Arc::clone(&shared), EventBus::disabled());
        let factory = OrderFactory::new(shared, EventBus::disabled());
        let product = store.insert_product("Item", Money::from_major(price), true).await;
        let address = store.insert_address(AccountId::new(account), "Center", "Main").await;
        let cart = carts.resolve(&TestRequester::signed_in(account)).await.unwrap();
        carts.add_item(&cart, product.id, 1).await.unwrap();
        let request = PlaceOrder { address_id: address.id, payment_method: "cash".to_string(), comment: None };
        factory.place_order(AccountId::new(account), &cart, request).await.unwrap()
    }

    fn service(store: &MemoryStore) -> OrderService<MemoryStore> {
        OrderService::new(Arc::new(store.clone()), EventBus::disabled())
    }

    #[tokio::test]
    async fn test_list_is_account_scoped_newest_first() {
        let store = MemoryStore::new();
        let first = place(&store, 1, 100).await;
        let second = place(&store, 1, 200).await;
        place(&store, 2, 300).await;

        let listed = service(&store).list_orders(AccountId::new(1)).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![second.order.id, first.order.id]);
        assert_eq!(listed[0].item_count, 1);
    }

    #[tokio::test]
    async fn test_foreign_order_is_not_found() {
        let store = MemoryStore::new();
        let theirs = place(&store, 2, 100).await;
        let svc = service(&store);

        assert!(matches!(svc.get_order(AccountId::new(1), theirs.order.id).await, Err(EcommerceError::OrderNotFound)));
        assert_eq!(svc.get_order(AccountId::new(2), theirs.order.id).await.unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_status_follows_lifecycle() {
        let store = MemoryStore::new();
        let order = place(&store, 1, 100).await.order.id;
        let svc = service(&store);

        svc.update_status(order, OrderStatus::Processing).await.unwrap();
        svc.update_status(order, OrderStatus::Delivering).await.unwrap();
        let err = svc.update_status(order, OrderStatus::Canceled).await.unwrap_err();
        assert!(matches!(
            err,
            EcommerceError::InvalidStatusTransition { from: OrderStatus::Delivering, to: OrderStatus::Canceled }
        ));

        let done = svc.update_status(order, OrderStatus::Completed).await.unwrap();
        assert_eq!(done.order.status, OrderStatus::Completed);
        assert_eq!(svc.get_order(AccountId::new(1), order).await.unwrap().order.status, OrderStatus::Completed);
        assert!(matches!(svc.update_status(OrderId::new(999), OrderStatus::Processing).await, Err(EcommerceError::OrderNotFound)));
    }
}
