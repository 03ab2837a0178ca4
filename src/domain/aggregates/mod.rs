//! Aggregates module
pub mod product;
pub mod cart;
pub mod order;
pub mod delivery;

pub use product::{Address, Product};
pub use cart::{plan_merge, Cart, CartLine, CartLineView, CartOwner, CartView, MergeOutcome, MergeStep};
pub use order::{NewOrder, NewOrderLine, Order, OrderDetail, OrderLine, OrderStatus, OrderSummary};
pub use delivery::{DeliveryRule, DeliveryRuleUpdate, NewDeliveryRule};
