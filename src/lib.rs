//! OpenSASE Checkout
//!
//! Cart reconciliation and order placement for the OpenSASE storefront.
//!
//! ## Features
//! - Cart identity: one live cart per account or anonymous session
//! - Guest-to-account cart merge on the first authenticated request
//! - Order placement as a single transaction with delivery fee computation
//! - Delivery rule administration (single active rule)
//! - Order history and status lifecycle

use thiserror::Error;

pub mod config;
pub mod domain;
pub mod http;
pub mod services;
pub mod store;

use domain::aggregates::OrderStatus;
use store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Product is not available")]
    ProductUnavailable,

    #[error("Cart not found")]
    CartNotFound,

    #[error("Cart line not found")]
    LineNotFound,

    #[error("Address not found")]
    AddressNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Delivery rule not found")]
    DeliveryRuleNotFound,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Unsupported payment method: {0}")]
    InvalidPaymentMethod(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Concurrent modification, please retry")]
    ConcurrencyConflict,

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl EcommerceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProductNotFound
            | Self::CartNotFound
            | Self::LineNotFound
            | Self::AddressNotFound
            | Self::OrderNotFound
            | Self::DeliveryRuleNotFound => "not_found",
            Self::ProductUnavailable => "product_unavailable",
            Self::EmptyCart => "empty_cart",
            Self::InvalidPaymentMethod(_) => "invalid_payment_method",
            Self::InvalidStatusTransition { .. } => "invalid_status_transition",
            Self::Validation(_) => "validation_error",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::Storage(_) => "storage_failure",
        }
    }
}

impl From<StoreError> for EcommerceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => EcommerceError::ConcurrencyConflict,
            other => EcommerceError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
