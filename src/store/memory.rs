//! In-process store.
//!
//! One mutex guards the whole state, so transactions run strictly one at a
//! time. A transaction edits a private copy that replaces the shared state on
//! commit. Used by the test suite and for running the service without
//! PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{AddressBook, ProductCatalog, Store, StoreError, StoreTx};
use crate::domain::aggregates::{
    Address, Cart, CartLine, CartOwner, DeliveryRule, NewDeliveryRule, NewOrder, NewOrderLine, Order, OrderLine,
    OrderStatus, Product,
};
use crate::domain::value_objects::{
    AccountId, AddressId, CartId, DeliveryRuleId, LineId, Money, OrderId, OrderLineId, ProductId, Quantity,
    SessionToken,
};

#[derive(Clone, Default)]
struct MemoryState {
    last_id: i64,
    products: BTreeMap<ProductId, Product>,
    addresses: BTreeMap<AddressId, Address>,
    carts: BTreeMap<CartId, Cart>,
    lines: BTreeMap<LineId, CartLine>,
    rules: BTreeMap<DeliveryRuleId, DeliveryRule>,
    orders: BTreeMap<OrderId, Order>,
    order_lines: BTreeMap<OrderLineId, OrderLine>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// Row counts, for asserting that a failed operation left nothing behind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub carts: usize,
    pub cart_lines: usize,
    pub orders: usize,
    pub order_lines: usize,
    pub delivery_rules: usize,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn insert_product(&self, name: &str, price: Money, available: bool) -> Product {
        let mut state = self.state.lock().await;
        let product = Product { id: ProductId::new(state.next_id()), name: name.to_string(), price, available };
        state.products.insert(product.id, product.clone());
        product
    }

    pub async fn set_product_price(&self, id: ProductId, price: Money) {
        if let Some(p) = self.state.lock().await.products.get_mut(&id) {
            p.price = price;
        }
    }

    pub async fn set_product_available(&self, id: ProductId, available: bool) {
        if let Some(p) = self.state.lock().await.products.get_mut(&id) {
            p.available = available;
        }
    }

    /// Deletes the product. Cart lines pointing at it are left dangling and
    /// order lines lose their reference but keep their snapshot.
    pub async fn remove_product(&self, id: ProductId) {
        let mut state = self.state.lock().await;
        state.products.remove(&id);
        for line in state.order_lines.values_mut().filter(|l| l.product_id == Some(id)) {
            line.product_id = None;
        }
    }

    pub async fn insert_address(&self, account: AccountId, district: &str, street: &str) -> Address {
        let mut state = self.state.lock().await;
        let address = Address {
            id: AddressId::new(state.next_id()),
            account_id: account,
            district: district.to_string(),
            street: street.to_string(),
            house_number: None,
            floor: None,
            apartment: None,
        };
        state.addresses.insert(address.id, address.clone());
        address
    }

    pub async fn counts(&self) -> StoreCounts {
        let state = self.state.lock().await;
        StoreCounts {
            carts: state.carts.len(),
            cart_lines: state.lines.len(),
            orders: state.orders.len(),
            order_lines: state.order_lines.len(),
            delivery_rules: state.rules.len(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl ProductCatalog for MemoryTx {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.work.products.get(&id).cloned())
    }
}

#[async_trait]
impl AddressBook for MemoryTx {
    async fn get_owned_address(&mut self, account: AccountId, id: AddressId) -> Result<Option<Address>, StoreError> {
        Ok(self.work.addresses.get(&id).filter(|a| a.account_id == account).cloned())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_key(&mut self, _key: &str) -> Result<(), StoreError> {
        // Already exclusive: the whole state is held until commit or drop.
        Ok(())
    }

    async fn carts_for_account(&mut self, account: AccountId) -> Result<Vec<Cart>, StoreError> {
        Ok(self.work.carts.values().filter(|c| c.account_id == Some(account)).cloned().collect())
    }

    async fn anonymous_carts_for_session(&mut self, token: &SessionToken) -> Result<Vec<Cart>, StoreError> {
        Ok(self
            .work
            .carts
            .values()
            .filter(|c| c.account_id.is_none() && c.session_token.as_ref() == Some(token))
            .cloned()
            .collect())
    }

    async fn create_cart(&mut self, owner: &CartOwner) -> Result<Cart, StoreError> {
        let now = Utc::now();
        let (account_id, session_token) = match owner {
            CartOwner::Account(account) => (Some(*account), None),
            CartOwner::Session(token) => (None, Some(token.clone())),
        };
        let cart = Cart { id: CartId::new(self.work.next_id()), account_id, session_token, created_at: now, updated_at: now };
        self.work.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn lock_cart(&mut self, id: CartId) -> Result<Option<Cart>, StoreError> {
        Ok(self.work.carts.get(&id).cloned())
    }

    async fn delete_cart(&mut self, id: CartId) -> Result<(), StoreError> {
        self.work.carts.remove(&id);
        self.work.lines.retain(|_, l| l.cart_id != id);
        Ok(())
    }

    async fn cart_lines(&mut self, cart: CartId) -> Result<Vec<CartLine>, StoreError> {
        Ok(self.work.lines.values().filter(|l| l.cart_id == cart).cloned().collect())
    }

    async fn insert_line(&mut self, cart: CartId, product: ProductId, quantity: Quantity) -> Result<CartLine, StoreError> {
        if self.work.lines.values().any(|l| l.cart_id == cart && l.product_id == product) {
            return Err(StoreError::Conflict(format!("cart {cart} already holds product {product}")));
        }
        let line = CartLine { id: LineId::new(self.work.next_id()), cart_id: cart, product_id: product, quantity, created_at: Utc::now() };
        self.work.lines.insert(line.id, line.clone());
        Ok(line)
    }

    async fn set_line_quantity(&mut self, line: LineId, quantity: Quantity) -> Result<(), StoreError> {
        if let Some(l) = self.work.lines.get_mut(&line) {
            l.quantity = quantity;
        }
        Ok(())
    }

    async fn move_line(&mut self, line: LineId, target: CartId) -> Result<(), StoreError> {
        if let Some(l) = self.work.lines.get_mut(&line) {
            l.cart_id = target;
        }
        Ok(())
    }

    async fn delete_line(&mut self, line: LineId) -> Result<(), StoreError> {
        self.work.lines.remove(&line);
        Ok(())
    }

    async fn clear_lines(&mut self, cart: CartId) -> Result<u64, StoreError> {
        let before = self.work.lines.len();
        self.work.lines.retain(|_, l| l.cart_id != cart);
        Ok((before - self.work.lines.len()) as u64)
    }

    async fn delivery_rules(&mut self) -> Result<Vec<DeliveryRule>, StoreError> {
        Ok(self.work.rules.values().cloned().collect())
    }

    async fn insert_delivery_rule(&mut self, rule: &NewDeliveryRule) -> Result<DeliveryRule, StoreError> {
        let rule = DeliveryRule {
            id: DeliveryRuleId::new(self.work.next_id()),
            free_threshold: rule.free_threshold,
            flat_fee: rule.flat_fee,
            active: false,
        };
        self.work.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn update_delivery_rule(
        &mut self,
        id: DeliveryRuleId,
        free_threshold: Money,
        flat_fee: Money,
    ) -> Result<Option<DeliveryRule>, StoreError> {
        Ok(self.work.rules.get_mut(&id).map(|rule| {
            rule.free_threshold = free_threshold;
            rule.flat_fee = flat_fee;
            rule.clone()
        }))
    }

    async fn activate_delivery_rule(&mut self, id: DeliveryRuleId) -> Result<bool, StoreError> {
        if !self.work.rules.contains_key(&id) {
            return Ok(false);
        }
        for rule in self.work.rules.values_mut() {
            rule.active = rule.id == id;
        }
        Ok(true)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError> {
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(self.work.next_id()),
            account_id: order.account_id,
            address_id: Some(order.address_id),
            payment_method: order.payment_method,
            status: OrderStatus::New,
            total_price: order.total_price,
            delivery_cost: order.delivery_cost,
            comment: order.comment.clone(),
            created_at: now,
            updated_at: now,
        };
        self.work.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn insert_order_line(&mut self, order: OrderId, line: &NewOrderLine) -> Result<OrderLine, StoreError> {
        let line = OrderLine {
            id: OrderLineId::new(self.work.next_id()),
            order_id: order,
            product_id: Some(line.product_id),
            product_name: line.product_name.clone(),
            product_price: line.product_price,
            quantity: line.quantity,
        };
        self.work.order_lines.insert(line.id, line.clone());
        Ok(line)
    }

    async fn orders_for_account(&mut self, account: AccountId) -> Result<Vec<Order>, StoreError> {
        Ok(self.work.orders.values().rev().filter(|o| o.account_id == account).cloned().collect())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.work.orders.get(&id).cloned())
    }

    async fn order_lines(&mut self, order: OrderId) -> Result<Vec<OrderLine>, StoreError> {
        Ok(self.work.order_lines.values().filter(|l| l.order_id == order).cloned().collect())
    }

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), StoreError> {
        if let Some(order) = self.work.orders.get_mut(&id) {
            order.status = status;
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MemoryTx { mut guard, work } = self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.create_cart(&CartOwner::Account(AccountId::new(1))).await.unwrap();
        }
        assert_eq!(store.counts().await.carts, 0);

        let mut tx = store.begin().await.unwrap();
        tx.create_cart(&CartOwner::Account(AccountId::new(1))).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.counts().await.carts, 1);
    }

    #[tokio::test]
    async fn test_duplicate_line_rejected() {
        let store = MemoryStore::new();
        let product = store.insert_product("Honey", Money::from_major(10), true).await;
        let mut tx = store.begin().await.unwrap();
        let cart = tx.create_cart(&CartOwner::Account(AccountId::new(1))).await.unwrap();
        let qty = Quantity::new(1).unwrap();
        tx.insert_line(cart.id, product.id, qty).await.unwrap();
        assert!(matches!(tx.insert_line(cart.id, product.id, qty).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_activation_leaves_single_active_rule() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let a = tx.insert_delivery_rule(&NewDeliveryRule::default()).await.unwrap();
        let b = tx.insert_delivery_rule(&NewDeliveryRule::default()).await.unwrap();
        assert!(tx.activate_delivery_rule(a.id).await.unwrap());
        assert!(tx.activate_delivery_rule(b.id).await.unwrap());
        assert!(!tx.activate_delivery_rule(DeliveryRuleId::new(999)).await.unwrap());
        let active: Vec<_> = tx.delivery_rules().await.unwrap().into_iter().filter(|r| r.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);
    }
}
