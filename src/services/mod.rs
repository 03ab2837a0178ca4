//! Application services
//!
//! Each public operation runs as one store transaction.

pub mod cart;
pub mod checkout;
pub mod delivery;
pub mod identity;
pub mod orders;

pub use cart::CartService;
pub use checkout::{OrderFactory, PlaceOrder};
pub use delivery::DeliveryPolicy;
pub use identity::RequesterState;
pub use orders::OrderService;
