//! PostgreSQL store.
//!
//! # Tables
//!
//! - `product`, `address` - owned by the catalog and account services, read only here
//! - `cart`, `cart_line` - one cart per account or anonymous session token
//! - `delivery_rule` - at most one row with `is_active`
//! - `customer_order`, `order_line` - immutable order records
//!
//! Transactions run at READ COMMITTED. Identity-level serialization uses
//! transaction-scoped advisory locks; row-level work on an existing cart uses
//! `SELECT ... FOR UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::time::Duration;

use super::{AddressBook, ProductCatalog, Store, StoreError, StoreTx};
use crate::domain::aggregates::{
    Address, Cart, CartLine, CartOwner, DeliveryRule, NewDeliveryRule, NewOrder, NewOrderLine, Order, OrderLine,
    OrderStatus, Product,
};
use crate::domain::value_objects::{
    AccountId, AddressId, CartId, DeliveryRuleId, LineId, Money, OrderId, OrderLineId, PaymentMethod, ProductId,
    Quantity, SessionToken,
};

/// Create a `PostgreSQL` connection pool.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
    pub fn pool(&self) -> &PgPool { &self.pool }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, StoreError> {
        Ok(PgTx { tx: self.pool.begin().await? })
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

// =============================================================================
// Rows
// =============================================================================

#[derive(FromRow)]
struct ProductRow { id: i64, name: String, price: Decimal, available: bool }

#[derive(FromRow)]
struct AddressRow {
    id: i64,
    account_id: i64,
    district: String,
    street: String,
    house_number: Option<String>,
    floor: Option<String>,
    apartment: Option<String>,
}

#[derive(FromRow)]
struct CartRow {
    id: i64,
    account_id: Option<i64>,
    session_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CartLineRow { id: i64, cart_id: i64, product_id: i64, quantity: i32, created_at: DateTime<Utc> }

#[derive(FromRow)]
struct DeliveryRuleRow { id: i64, free_threshold: Decimal, flat_fee: Decimal, is_active: bool }

#[derive(FromRow)]
struct OrderRow {
    id: i64,
    account_id: i64,
    address_id: Option<i64>,
    payment_method: String,
    status: String,
    total_price: Decimal,
    delivery_cost: Decimal,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OrderLineRow {
    id: i64,
    order_id: i64,
    product_id: Option<i64>,
    product_name: String,
    product_price: Decimal,
    quantity: i32,
}

fn quantity_from_db(value: i32) -> Result<Quantity, StoreError> {
    u32::try_from(value)
        .ok()
        .and_then(|v| Quantity::new(v).ok())
        .ok_or_else(|| StoreError::DataCorruption(format!("invalid quantity {value}")))
}

fn quantity_to_db(q: Quantity) -> Result<i32, StoreError> {
    i32::try_from(q.value()).map_err(|_| StoreError::DataCorruption(format!("quantity {} out of range", q.value())))
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product { id: ProductId::new(r.id), name: r.name, price: Money::new(r.price), available: r.available }
    }
}

impl From<AddressRow> for Address {
    fn from(r: AddressRow) -> Self {
        Address {
            id: AddressId::new(r.id),
            account_id: AccountId::new(r.account_id),
            district: r.district,
            street: r.street,
            house_number: r.house_number,
            floor: r.floor,
            apartment: r.apartment,
        }
    }
}

impl TryFrom<CartRow> for Cart {
    type Error = StoreError;
    fn try_from(r: CartRow) -> Result<Self, StoreError> {
        let session_token = r
            .session_token
            .map(SessionToken::parse)
            .transpose()
            .map_err(|e| StoreError::DataCorruption(format!("cart {}: {e}", r.id)))?;
        Ok(Cart {
            id: CartId::new(r.id),
            account_id: r.account_id.map(AccountId::new),
            session_token,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = StoreError;
    fn try_from(r: CartLineRow) -> Result<Self, StoreError> {
        Ok(CartLine {
            id: LineId::new(r.id),
            cart_id: CartId::new(r.cart_id),
            product_id: ProductId::new(r.product_id),
            quantity: quantity_from_db(r.quantity)?,
            created_at: r.created_at,
        })
    }
}

impl From<DeliveryRuleRow> for DeliveryRule {
    fn from(r: DeliveryRuleRow) -> Self {
        DeliveryRule {
            id: DeliveryRuleId::new(r.id),
            free_threshold: Money::new(r.free_threshold),
            flat_fee: Money::new(r.flat_fee),
            active: r.is_active,
        }
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, StoreError> {
        let payment_method = r
            .payment_method
            .parse::<PaymentMethod>()
            .map_err(|m| StoreError::DataCorruption(format!("order {}: unknown payment method {m}", r.id)))?;
        let status = r
            .status
            .parse::<OrderStatus>()
            .map_err(|s| StoreError::DataCorruption(format!("order {}: unknown status {s}", r.id)))?;
        Ok(Order {
            id: OrderId::new(r.id),
            account_id: AccountId::new(r.account_id),
            address_id: r.address_id.map(AddressId::new),
            payment_method,
            status,
            total_price: Money::new(r.total_price),
            delivery_cost: Money::new(r.delivery_cost),
            comment: r.comment,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = StoreError;
    fn try_from(r: OrderLineRow) -> Result<Self, StoreError> {
        Ok(OrderLine {
            id: OrderLineId::new(r.id),
            order_id: OrderId::new(r.order_id),
            product_id: r.product_id.map(ProductId::new),
            product_name: r.product_name,
            product_price: Money::new(r.product_price),
            quantity: quantity_from_db(r.quantity)?,
        })
    }
}

const CART_COLUMNS: &str = "id, account_id, session_token, created_at, updated_at";
const LINE_COLUMNS: &str = "id, cart_id, product_id, quantity, created_at";
const RULE_COLUMNS: &str = "id, free_threshold, flat_fee, is_active";
const ORDER_COLUMNS: &str =
    "id, account_id, address_id, payment_method, status, total_price, delivery_cost, comment, created_at, updated_at";
const ORDER_LINE_COLUMNS: &str = "id, order_id, product_id, product_name, product_price, quantity";

fn carts(rows: Vec<CartRow>) -> Result<Vec<Cart>, StoreError> {
    rows.into_iter().map(Cart::try_from).collect()
}

// =============================================================================
// Ports
// =============================================================================

#[async_trait]
impl ProductCatalog for PgTx {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT id, name, price, available FROM product WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Product::from))
    }
}

#[async_trait]
impl AddressBook for PgTx {
    async fn get_owned_address(&mut self, account: AccountId, id: AddressId) -> Result<Option<Address>, StoreError> {
        let row = sqlx::query_as::<_, AddressRow>(
            "SELECT id, account_id, district, street, house_number, floor, apartment \
             FROM address WHERE id = $1 AND account_id = $2",
        )
        .bind(id.get())
        .bind(account.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Address::from))
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_key(&mut self, key: &str) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn carts_for_account(&mut self, account: AccountId) -> Result<Vec<Cart>, StoreError> {
        let rows = sqlx::query_as::<_, CartRow>(&format!(
            "SELECT {CART_COLUMNS} FROM cart WHERE account_id = $1 ORDER BY id FOR UPDATE"
        ))
        .bind(account.get())
        .fetch_all(&mut *self.tx)
        .await?;
        carts(rows)
    }

    async fn anonymous_carts_for_session(&mut self, token: &SessionToken) -> Result<Vec<Cart>, StoreError> {
        let rows = sqlx::query_as::<_, CartRow>(&format!(
            "SELECT {CART_COLUMNS} FROM cart WHERE session_token = $1 AND account_id IS NULL ORDER BY id FOR UPDATE"
        ))
        .bind(token.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        carts(rows)
    }

    async fn create_cart(&mut self, owner: &CartOwner) -> Result<Cart, StoreError> {
        let (account_id, session_token) = match owner {
            CartOwner::Account(account) => (Some(account.get()), None),
            CartOwner::Session(token) => (None, Some(token.as_str())),
        };
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "INSERT INTO cart (account_id, session_token) VALUES ($1, $2) RETURNING {CART_COLUMNS}"
        ))
        .bind(account_id)
        .bind(session_token)
        .fetch_one(&mut *self.tx)
        .await?;
        Cart::try_from(row)
    }

    async fn lock_cart(&mut self, id: CartId) -> Result<Option<Cart>, StoreError> {
        let row = sqlx::query_as::<_, CartRow>(&format!("SELECT {CART_COLUMNS} FROM cart WHERE id = $1 FOR UPDATE"))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Cart::try_from).transpose()
    }

    async fn delete_cart(&mut self, id: CartId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cart WHERE id = $1").bind(id.get()).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn cart_lines(&mut self, cart: CartId) -> Result<Vec<CartLine>, StoreError> {
        let rows = sqlx::query_as::<_, CartLineRow>(&format!(
            "SELECT {LINE_COLUMNS} FROM cart_line WHERE cart_id = $1 ORDER BY id FOR UPDATE"
        ))
        .bind(cart.get())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(CartLine::try_from).collect()
    }

    async fn insert_line(&mut self, cart: CartId, product: ProductId, quantity: Quantity) -> Result<CartLine, StoreError> {
        let row = sqlx::query_as::<_, CartLineRow>(&format!(
            "INSERT INTO cart_line (cart_id, product_id, quantity) VALUES ($1, $2, $3) RETURNING {LINE_COLUMNS}"
        ))
        .bind(cart.get())
        .bind(product.get())
        .bind(quantity_to_db(quantity)?)
        .fetch_one(&mut *self.tx)
        .await?;
        CartLine::try_from(row)
    }

    async fn set_line_quantity(&mut self, line: LineId, quantity: Quantity) -> Result<(), StoreError> {
        sqlx::query("UPDATE cart_line SET quantity = $2, updated_at = NOW() WHERE id = $1")
            .bind(line.get())
            .bind(quantity_to_db(quantity)?)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn move_line(&mut self, line: LineId, target: CartId) -> Result<(), StoreError> {
        sqlx::query("UPDATE cart_line SET cart_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(line.get())
            .bind(target.get())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_line(&mut self, line: LineId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cart_line WHERE id = $1").bind(line.get()).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn clear_lines(&mut self, cart: CartId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cart_line WHERE cart_id = $1").bind(cart.get()).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn delivery_rules(&mut self) -> Result<Vec<DeliveryRule>, StoreError> {
        let rows = sqlx::query_as::<_, DeliveryRuleRow>(&format!("SELECT {RULE_COLUMNS} FROM delivery_rule ORDER BY id"))
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(DeliveryRule::from).collect())
    }

    async fn insert_delivery_rule(&mut self, rule: &NewDeliveryRule) -> Result<DeliveryRule, StoreError> {
        let row = sqlx::query_as::<_, DeliveryRuleRow>(&format!(
            "INSERT INTO delivery_rule (free_threshold, flat_fee, is_active) VALUES ($1, $2, FALSE) RETURNING {RULE_COLUMNS}"
        ))
        .bind(rule.free_threshold.amount())
        .bind(rule.flat_fee.amount())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn update_delivery_rule(
        &mut self,
        id: DeliveryRuleId,
        free_threshold: Money,
        flat_fee: Money,
    ) -> Result<Option<DeliveryRule>, StoreError> {
        let row = sqlx::query_as::<_, DeliveryRuleRow>(&format!(
            "UPDATE delivery_rule SET free_threshold = $2, flat_fee = $3 WHERE id = $1 RETURNING {RULE_COLUMNS}"
        ))
        .bind(id.get())
        .bind(free_threshold.amount())
        .bind(flat_fee.amount())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(DeliveryRule::from))
    }

    async fn activate_delivery_rule(&mut self, id: DeliveryRuleId) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM delivery_rule WHERE id = $1 FOR UPDATE")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        if exists.is_none() {
            return Ok(false);
        }
        // Deactivate first: the partial unique index admits one active row.
        sqlx::query("UPDATE delivery_rule SET is_active = FALSE WHERE is_active AND id <> $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("UPDATE delivery_rule SET is_active = TRUE WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await?;
        Ok(true)
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO customer_order (account_id, address_id, payment_method, status, total_price, delivery_cost, comment) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.account_id.get())
        .bind(order.address_id.get())
        .bind(order.payment_method.as_str())
        .bind(OrderStatus::New.as_str())
        .bind(order.total_price.amount())
        .bind(order.delivery_cost.amount())
        .bind(order.comment.as_deref())
        .fetch_one(&mut *self.tx)
        .await?;
        Order::try_from(row)
    }

    async fn insert_order_line(&mut self, order: OrderId, line: &NewOrderLine) -> Result<OrderLine, StoreError> {
        let row = sqlx::query_as::<_, OrderLineRow>(&format!(
            "INSERT INTO order_line (order_id, product_id, product_name, product_price, quantity) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ORDER_LINE_COLUMNS}"
        ))
        .bind(order.get())
        .bind(line.product_id.get())
        .bind(&line.product_name)
        .bind(line.product_price.amount())
        .bind(quantity_to_db(line.quantity)?)
        .fetch_one(&mut *self.tx)
        .await?;
        OrderLine::try_from(row)
    }

    async fn orders_for_account(&mut self, account: AccountId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order WHERE account_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(account.get())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM customer_order WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn order_lines(&mut self, order: OrderId) -> Result<Vec<OrderLine>, StoreError> {
        let rows = sqlx::query_as::<_, OrderLineRow>(&format!(
            "SELECT {ORDER_LINE_COLUMNS} FROM order_line WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order.get())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(OrderLine::try_from).collect()
    }

    async fn set_order_status(&mut self, id: OrderId, status: OrderStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE customer_order SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.get())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
