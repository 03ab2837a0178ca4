//! Storage ports.
//!
//! Every service call runs inside one [`StoreTx`]. Dropping a transaction
//! without calling [`StoreTx::commit`] discards all of its writes.
//!
//! Two adapters are provided:
//! - [`postgres::PgStore`] for production, backed by `sqlx` transactions,
//!   advisory locks and `SELECT ... FOR UPDATE`.
//! - [`memory::MemoryStore`] which serializes transactions behind one mutex.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::aggregates::{
    Address, Cart, CartLine, CartOwner, DeliveryRule, NewDeliveryRule, NewOrder, NewOrderLine, Order, OrderLine,
    OrderStatus, Product,
};
use crate::domain::value_objects::{
    AccountId, AddressId, CartId, DeliveryRuleId, LineId, Money, OrderId, ProductId, Quantity, SessionToken,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// Serialization failure, deadlock or uniqueness race. Safe to retry.
    #[error("conflicting concurrent write: {0}")]
    Conflict(String),

    #[error("data corruption: {0}")]
    DataCorruption(String),

    #[error("session error: {0}")]
    Session(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            if let Some(code) = db_err.code() {
                if matches!(code.as_ref(), "40001" | "40P01" | "23505") {
                    return StoreError::Conflict(db_err.message().to_string());
                }
            }
        }
        StoreError::Database(e)
    }
}

/// Opens units of work.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// Read-only view of the product catalog.
#[async_trait]
pub trait ProductCatalog {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;
}

/// Read-only view of customers' saved addresses.
#[async_trait]
pub trait AddressBook {
    /// Returns the address only when it belongs to `account`.
    async fn get_owned_address(&mut self, account: AccountId, id: AddressId) -> Result<Option<Address>, StoreError>;
}

#[async_trait]
pub trait StoreTx: ProductCatalog + AddressBook + Send + Sized {
    /// Serializes this transaction against every other holding the same key
    /// until commit or rollback.
    async fn lock_key(&mut self, key: &str) -> Result<(), StoreError>;

    // carts

    /// Carts keyed by the account, lowest id first.
    async fn carts_for_account(&mut self, account: AccountId) -> Result<Vec<Cart>, StoreError>;
    /// Carts keyed by the token and not yet owned by an account, lowest id first.
    async fn anonymous_carts_for_session(&mut self, token: &SessionToken) -> Result<Vec<Cart>, StoreError>;
    async fn create_cart(&mut self, owner: &CartOwner) -> Result<Cart, StoreError>;
    /// Fetches the cart and holds it exclusively for the rest of the transaction.
    async fn lock_cart(&mut self, id: CartId) -> Result<Option<Cart>, StoreError>;
    /// Deletes the cart together with any lines still attached to it.
    async fn delete_cart(&mut self, id: CartId) -> Result<(), StoreError>;

    // cart lines

    /// Lines of the cart, oldest first, locked for the rest of the transaction.
    async fn cart_lines(&mut self, cart: CartId) -> Result<Vec<CartLine>, StoreError>;
    async fn insert_line(&mut self, cart: CartId, product: ProductId, quantity: Quantity) -> Result<CartLine, StoreError>;
    async fn set_line_quantity(&mut self, line: LineId, quantity: Quantity) -> Result<(), StoreError>;
    async fn move_line(&mut self, line: LineId, target: CartId) -> Result<(), StoreError>;
    async fn delete_line(&mut self, line: LineId) -> Result<(), StoreError>;
    /// Returns how many lines were removed.
    async fn clear_lines(&mut self, cart: CartId) -> Result<u64, StoreError>;

    // delivery rules

    /// All rules, lowest id first.
    async fn delivery_rules(&mut self) -> Result<Vec<DeliveryRule>, StoreError>;
    /// Inserts the rule inactive; activation is a separate step.
    async fn insert_delivery_rule(&mut self, rule: &NewDeliveryRule) -> Result<DeliveryRule, StoreError>;
    async fn update_delivery_rule(
        &mut self,
        id: DeliveryRuleId,
        free_threshold: Money,
        flat_fee: Money,
    ) -> Result<Option<DeliveryRule>, StoreError>;
    /// Marks `id` active and every other rule inactive. Returns false when
    /// `id` does not exist, in which case nothing changes.
    async fn activate_delivery_rule(&mut self, id: DeliveryRuleId) -> Result<bool, StoreError>;

    // orders

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError>;
    async fn insert_order_line(&mut self, order: OrderId, line: &NewOrderLine) -> Result<OrderLine, StoreError>;
    /// Newest first.
    async fn orders_for_account(&mut self, account: AccountId) -> Result<Vec<Order>, StoreError>;
    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;
    async fn order_lines(&mut self, order: OrderId) -> Result<Vec<OrderLine>, StoreError>;
    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}
