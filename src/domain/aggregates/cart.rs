//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::{AccountId, CartId, LineId, Money, ProductId, Quantity, SessionToken};

/// Key a cart is looked up by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartOwner {
    Account(AccountId),
    Session(SessionToken),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cart {
    pub id: CartId,
    pub account_id: Option<AccountId>,
    pub session_token: Option<SessionToken>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// The active key. An account always wins over a lingering session token.
    pub fn owner(&self) -> Option<CartOwner> {
        match (&self.account_id, &self.session_token) {
            (Some(account), _) => Some(CartOwner::Account(*account)),
            (None, Some(token)) => Some(CartOwner::Session(token.clone())),
            (None, None) => None,
        }
    }

    pub fn is_owned_by(&self, account: AccountId) -> bool { self.account_id == Some(account) }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartLine {
    pub id: LineId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartProductView {
    pub name: String,
    pub price: Money,
    pub available: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartLineView {
    pub id: LineId,
    pub product_id: ProductId,
    pub product: Option<CartProductView>,
    pub quantity: u32,
    pub line_total: Money,
}

/// Read model priced against the live catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub cart_id: CartId,
    pub lines: Vec<CartLineView>,
    pub total_price: Money,
    pub total_items: u64,
}

impl CartView {
    /// Builds the view from lines paired with whatever the catalog returned.
    /// Missing or unavailable products count as zero in both totals.
    pub fn build(cart_id: CartId, lines: Vec<(CartLine, Option<Product>)>) -> Self {
        let mut total_price = Money::ZERO;
        let mut total_items = 0u64;
        let lines = lines
            .into_iter()
            .map(|(line, product)| {
                let quantity = line.quantity.value();
                let line_total = product.as_ref().map(|p| p.line_total(quantity)).unwrap_or(Money::ZERO);
                if product.as_ref().is_some_and(|p| p.available) {
                    total_price = total_price + line_total;
                    total_items += u64::from(quantity);
                }
                CartLineView {
                    id: line.id,
                    product_id: line.product_id,
                    product: product.map(|p| CartProductView { name: p.name, price: p.price, available: p.available }),
                    quantity,
                    line_total,
                }
            })
            .collect();
        Self { cart_id, lines, total_price, total_items }
    }

    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
}

/// One storage write produced by [`plan_merge`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeStep {
    /// Target already holds the product: overwrite its quantity with the sum.
    Increment { target_line: LineId, quantity: Quantity },
    /// Target lacks the product: re-parent the source line.
    Reparent { line: LineId },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub lines_moved: usize,
    pub lines_summed: usize,
}

impl MergeOutcome {
    pub fn absorb(&mut self, other: MergeOutcome) {
        self.lines_moved += other.lines_moved;
        self.lines_summed += other.lines_summed;
    }
}

/// Plans the writes that fold `source` into `target`. An empty source
/// yields no steps. Summed quantities stop at [`Quantity::MAX`].
pub fn plan_merge(source: &[CartLine], target: &[CartLine]) -> Vec<MergeStep> {
    let mut by_product: HashMap<ProductId, (LineId, Quantity)> =
        target.iter().map(|l| (l.product_id, (l.id, l.quantity))).collect();
    let mut steps = Vec::with_capacity(source.len());
    for line in source {
        match by_product.get_mut(&line.product_id) {
            Some((target_line, quantity)) => {
                *quantity = quantity.saturating_add(line.quantity);
                steps.push(MergeStep::Increment { target_line: *target_line, quantity: *quantity });
            }
            None => {
                by_product.insert(line.product_id, (line.id, line.quantity));
                steps.push(MergeStep::Reparent { line: line.id });
            }
        }
    }
    steps
}
