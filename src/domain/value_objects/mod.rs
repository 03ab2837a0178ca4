//! Value Objects for carts and orders

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self { Self(value) }
            pub const fn get(self) -> i64 { self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }
    };
}

id_type!(
    /// Authenticated account, as issued by the auth gateway.
    AccountId
);
id_type!(CartId);
id_type!(
    /// Cart line identifier, exposed to clients as `line_id`.
    LineId
);
id_type!(ProductId);
id_type!(AddressId);
id_type!(OrderId);
id_type!(OrderLineId);
id_type!(DeliveryRuleId);

/// Opaque token identifying an anonymous requester's cart.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn mint() -> Self { Self(Uuid::new_v4().to_string()) }

    pub fn parse(value: impl Into<String>) -> Result<Self, SessionTokenError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() { return Err(SessionTokenError::Empty); }
        if trimmed.len() > 255 { return Err(SessionTokenError::TooLong); }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    /// Short prefix safe to put in log lines.
    pub fn redacted(&self) -> &str { self.0.get(..8).unwrap_or(&self.0) }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionTokenError {
    #[error("session token is empty")]
    Empty,
    #[error("session token is too long")]
    TooLong,
}

/// Money value object. The shop trades in a single currency, so only the
/// amount is carried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    pub fn from_major(units: i64) -> Self { Self(Decimal::from(units)) }
    /// Amount with two fractional digits, e.g. `Money::from_minor(799_999)` is 7999.99.
    pub fn from_minor(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// Line quantity; never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest quantity a single line may hold; keeps line totals inside the
    /// `NUMERIC(10,2)` money columns.
    pub const MAX: u32 = 10_000;

    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        if value > Self::MAX { return Err(QuantityError::Overflow); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn checked_add(&self, other: Quantity) -> Result<Self, QuantityError> {
        Self::new(self.0.saturating_add(other.0))
    }
    /// Sum clamped to [`Quantity::MAX`].
    pub fn saturating_add(&self, other: Quantity) -> Self {
        Self(self.0.saturating_add(other.0).min(Self::MAX))
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> u32 { q.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("quantity must be at least 1")]
    Zero,
    #[error("quantity must be at most {}", Quantity::MAX)]
    Overflow,
}

/// Supported payment methods; both are settled on delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Cash => "cash", Self::Card => "card" }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_sum_and_multiply() {
        let total: Money = [Money::from_major(10).multiply(3), Money::from_minor(50)].into_iter().sum();
        assert_eq!(total, Money::from_minor(3050));
        assert_eq!(total.to_string(), "30.50");
    }

    #[test]
    fn test_quantity_bounds() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        let q = Quantity::new(2).unwrap();
        assert_eq!(q.checked_add(Quantity::new(3).unwrap()).unwrap().value(), 5);
        assert_eq!(Quantity::new(u32::MAX), Err(QuantityError::Overflow));
        assert_eq!(Quantity::new(Quantity::MAX + 1), Err(QuantityError::Overflow));
        let max = Quantity::new(Quantity::MAX).unwrap();
        assert_eq!(max.checked_add(q), Err(QuantityError::Overflow));
        assert_eq!(max.saturating_add(q), max);
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("card".parse::<PaymentMethod>(), Ok(PaymentMethod::Card));
        assert_eq!("bitcoin".parse::<PaymentMethod>(), Err("bitcoin".to_string()));
    }

    #[test]
    fn test_session_token() {
        let token = SessionToken::mint();
        assert_eq!(token.redacted().len(), 8);
        assert_eq!(SessionToken::parse("  "), Err(SessionTokenError::Empty));
        assert_eq!(SessionToken::parse(" abc ").unwrap().as_str(), "abc");
    }
}
