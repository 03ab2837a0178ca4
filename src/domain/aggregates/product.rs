//! Catalog and address records consumed by the cart and checkout.
//!
//! Both are owned elsewhere; this crate only reads them.

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{AccountId, AddressId, Money, ProductId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub available: bool,
}

impl Product {
    /// Price contribution of `quantity` units, zero when the product can no
    /// longer be sold.
    pub fn line_total(&self, quantity: u32) -> Money {
        if self.available { self.price.multiply(quantity) } else { Money::ZERO }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub account_id: AccountId,
    pub district: String,
    pub street: String,
    pub house_number: Option<String>,
    pub floor: Option<String>,
    pub apartment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_product_contributes_nothing() {
        let mut p = Product { id: ProductId::new(1), name: "Tea".into(), price: Money::from_major(250), available: true };
        assert_eq!(p.line_total(4), Money::from_major(1000));
        p.available = false;
        assert_eq!(p.line_total(4), Money::ZERO);
    }
}
