//! Cart resolution, merging and line mutations.
//!
//! Every public operation is one store transaction. Resolution takes an
//! advisory lock on the identity key first (`account:{id}`, then
//! `session:{token}` when merging), so concurrent requests for the same
//! identity are serialized and cannot create a second cart or merge twice.

use std::sync::Arc;

use crate::domain::aggregates::{plan_merge, Cart, CartOwner, CartView, MergeOutcome, MergeStep};
use crate::domain::events::{DomainEvent, EventBus};
use crate::domain::value_objects::{AccountId, CartId, LineId, ProductId, Quantity, SessionToken};
use crate::services::identity::RequesterState;
use crate::store::{ProductCatalog, Store, StoreTx};
use crate::{EcommerceError, Result};

fn account_lock_key(account: AccountId) -> String { format!("account:{account}") }
fn session_lock_key(token: &SessionToken) -> String { format!("session:{token}") }

pub struct CartService<S> {
    store: Arc<S>,
    events: EventBus,
}

impl<S> Clone for CartService<S> {
    fn clone(&self) -> Self { Self { store: Arc::clone(&self.store), events: self.events.clone() } }
}

/// Carts folded into a survivor during one resolution.
#[derive(Default)]
struct Absorbed {
    sources: Vec<CartId>,
    outcome: MergeOutcome,
}

impl<S: Store> CartService<S> {
    pub fn new(store: Arc<S>, events: EventBus) -> Self { Self { store, events } }

    /// Returns the one live cart for the requester, creating it on first use.
    ///
    /// An authenticated requester still carrying a guest cart token gets every
    /// guest cart under that token merged in, and the token is then dropped
    /// from the requester state so the merge runs once per login.
    #[tracing::instrument(skip_all, fields(account = ?requester.account()))]
    pub async fn resolve<R: RequesterState + ?Sized>(&self, requester: &R) -> Result<Cart> {
        match requester.account() {
            Some(account) => self.resolve_account(account, requester).await,
            None => self.resolve_session(requester).await,
        }
    }

    async fn resolve_account<R: RequesterState + ?Sized>(&self, account: AccountId, requester: &R) -> Result<Cart> {
        let pending = requester.cart_token().await?;

        let mut tx = self.store.begin().await?;
        tx.lock_key(&account_lock_key(account)).await?;
        let carts = tx.carts_for_account(account).await?;
        let (cart, mut absorbed) = collapse(&mut tx, carts, &CartOwner::Account(account)).await?;

        if let Some(token) = &pending {
            tx.lock_key(&session_lock_key(token)).await?;
            for source in tx.anonymous_carts_for_session(token).await? {
                let outcome = merge_into(&mut tx, &source, &cart).await?;
                tx.delete_cart(source.id).await?;
                absorbed.sources.push(source.id);
                absorbed.outcome.absorb(outcome);
            }
        }
        tx.commit().await?;

        if let Some(token) = &pending {
            requester.forget_cart_token().await?;
            tracing::info!(cart_id = %cart.id, token = token.redacted(), merged = absorbed.sources.len(), "guest cart token consumed at login");
        }
        self.announce(&cart, absorbed).await;
        Ok(cart)
    }

    async fn resolve_session<R: RequesterState + ?Sized>(&self, requester: &R) -> Result<Cart> {
        let token = match requester.cart_token().await? {
            Some(token) => token,
            None => {
                let token = SessionToken::mint();
                requester.remember_cart_token(&token).await?;
                tracing::debug!(token = token.redacted(), "minted guest cart token");
                token
            }
        };

        let mut tx = self.store.begin().await?;
        tx.lock_key(&session_lock_key(&token)).await?;
        let carts = tx.anonymous_carts_for_session(&token).await?;
        let (cart, absorbed) = collapse(&mut tx, carts, &CartOwner::Session(token)).await?;
        tx.commit().await?;

        self.announce(&cart, absorbed).await;
        Ok(cart)
    }

    async fn announce(&self, cart: &Cart, absorbed: Absorbed) {
        if absorbed.sources.is_empty() {
            return;
        }
        tracing::info!(
            cart_id = %cart.id,
            sources = ?absorbed.sources,
            moved = absorbed.outcome.lines_moved,
            summed = absorbed.outcome.lines_summed,
            "carts merged"
        );
        self.events
            .publish(DomainEvent::CartsMerged {
                target_cart: cart.id,
                source_carts: absorbed.sources,
                lines_moved: absorbed.outcome.lines_moved,
                lines_summed: absorbed.outcome.lines_summed,
            })
            .await;
    }

    /// Folds `source` into `target` and deletes `source`.
    ///
    /// A source that no longer exists has already been merged, so this is a
    /// no-op, as is merging a cart into itself.
    #[tracing::instrument(skip(self))]
    pub async fn merge(&self, source: CartId, target: CartId) -> Result<MergeOutcome> {
        if source == target {
            return Ok(MergeOutcome::default());
        }
        let mut tx = self.store.begin().await?;
        // Lock in id order so two opposite merges cannot deadlock.
        let (first, second) = if source < target { (source, target) } else { (target, source) };
        let first_cart = tx.lock_cart(first).await?;
        let second_cart = tx.lock_cart(second).await?;
        let (source_cart, target_cart) =
            if source < target { (first_cart, second_cart) } else { (second_cart, first_cart) };

        let target_cart = target_cart.ok_or(EcommerceError::CartNotFound)?;
        let Some(source_cart) = source_cart else {
            return Ok(MergeOutcome::default());
        };

        let outcome = merge_into(&mut tx, &source_cart, &target_cart).await?;
        tx.delete_cart(source_cart.id).await?;
        tx.commit().await?;

        self.announce(&target_cart, Absorbed { sources: vec![source_cart.id], outcome }).await;
        Ok(outcome)
    }

    pub async fn view(&self, cart: &Cart) -> Result<CartView> {
        let mut tx = self.store.begin().await?;
        let cart = lock(&mut tx, cart.id).await?;
        let view = load_view(&mut tx, cart.id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Adds `quantity` units, incrementing the existing line for the product
    /// if there is one.
    #[tracing::instrument(skip(self, cart), fields(cart_id = %cart.id))]
    pub async fn add_item(&self, cart: &Cart, product_id: ProductId, quantity: u32) -> Result<CartView> {
        let quantity = Quantity::new(quantity).map_err(|e| EcommerceError::Validation(e.to_string()))?;

        let mut tx = self.store.begin().await?;
        let cart = lock(&mut tx, cart.id).await?;
        let product = tx.get_product(product_id).await?.ok_or(EcommerceError::ProductNotFound)?;
        if !product.available {
            return Err(EcommerceError::ProductUnavailable);
        }

        let lines = tx.cart_lines(cart.id).await?;
        match lines.iter().find(|l| l.product_id == product_id) {
            Some(line) => {
                let total = line.quantity.checked_add(quantity).map_err(|e| EcommerceError::Validation(e.to_string()))?;
                tx.set_line_quantity(line.id, total).await?;
            }
            None => {
                tx.insert_line(cart.id, product_id, quantity).await?;
            }
        }

        let view = load_view(&mut tx, cart.id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Overwrites a line's quantity. Zero removes the line.
    #[tracing::instrument(skip(self, cart), fields(cart_id = %cart.id))]
    pub async fn set_quantity(&self, cart: &Cart, line_id: LineId, quantity: u32) -> Result<CartView> {
        let mut tx = self.store.begin().await?;
        let cart = lock(&mut tx, cart.id).await?;
        let lines = tx.cart_lines(cart.id).await?;
        let line = lines.iter().find(|l| l.id == line_id).ok_or(EcommerceError::LineNotFound)?;

        if quantity == 0 {
            tx.delete_line(line.id).await?;
        } else {
            let quantity = Quantity::new(quantity).map_err(|e| EcommerceError::Validation(e.to_string()))?;
            tx.set_line_quantity(line.id, quantity).await?;
        }

        let view = load_view(&mut tx, cart.id).await?;
        tx.commit().await?;
        Ok(view)
    }

    #[tracing::instrument(skip(self, cart), fields(cart_id = %cart.id))]
    pub async fn remove_item(&self, cart: &Cart, line_id: LineId) -> Result<CartView> {
        let mut tx = self.store.begin().await?;
        let cart = lock(&mut tx, cart.id).await?;
        let lines = tx.cart_lines(cart.id).await?;
        if !lines.iter().any(|l| l.id == line_id) {
            return Err(EcommerceError::LineNotFound);
        }
        tx.delete_line(line_id).await?;

        let view = load_view(&mut tx, cart.id).await?;
        tx.commit().await?;
        Ok(view)
    }

    /// Empties the cart. Clearing an empty cart is not an error.
    #[tracing::instrument(skip(self, cart), fields(cart_id = %cart.id))]
    pub async fn clear(&self, cart: &Cart) -> Result<CartView> {
        let mut tx = self.store.begin().await?;
        let cart = lock(&mut tx, cart.id).await?;
        tx.clear_lines(cart.id).await?;
        tx.commit().await?;
        Ok(CartView::build(cart.id, Vec::new()))
    }
}

async fn lock<T: StoreTx>(tx: &mut T, id: CartId) -> Result<Cart> {
    tx.lock_cart(id).await?.ok_or(EcommerceError::CartNotFound)
}

/// Keeps the lowest-id cart of `carts` (creating one for `owner` when there is
/// none) and merges the others into it.
async fn collapse<T: StoreTx>(tx: &mut T, carts: Vec<Cart>, owner: &CartOwner) -> Result<(Cart, Absorbed)> {
    let mut carts = carts.into_iter();
    let Some(survivor) = carts.next() else {
        return Ok((tx.create_cart(owner).await?, Absorbed::default()));
    };

    let mut absorbed = Absorbed::default();
    for duplicate in carts {
        tracing::warn!(survivor = %survivor.id, duplicate = %duplicate.id, "duplicate carts for one identity");
        let outcome = merge_into(tx, &duplicate, &survivor).await?;
        tx.delete_cart(duplicate.id).await?;
        absorbed.sources.push(duplicate.id);
        absorbed.outcome.absorb(outcome);
    }
    Ok((survivor, absorbed))
}

/// Moves or sums every line of `source` into `target`. Leaves `source` in place.
pub(crate) async fn merge_into<T: StoreTx>(tx: &mut T, source: &Cart, target: &Cart) -> Result<MergeOutcome> {
    let source_lines = tx.cart_lines(source.id).await?;
    if source_lines.is_empty() {
        return Ok(MergeOutcome::default());
    }
    let target_lines = tx.cart_lines(target.id).await?;
    let steps = plan_merge(&source_lines, &target_lines);

    let mut outcome = MergeOutcome::default();
    for step in steps {
        match step {
            MergeStep::Increment { target_line, quantity } => {
                tx.set_line_quantity(target_line, quantity).await?;
                outcome.lines_summed += 1;
            }
            MergeStep::Reparent { line } => {
                tx.move_line(line, target.id).await?;
                outcome.lines_moved += 1;
            }
        }
    }
    Ok(outcome)
}

/// Prices the cart's lines against the live catalog.
pub(crate) async fn load_view<T: StoreTx>(tx: &mut T, cart: CartId) -> Result<CartView> {
    let lines = tx.cart_lines(cart).await?;
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let product = tx.get_product(line.product_id).await?;
        priced.push((line, product));
    }
    Ok(CartView::build(cart, priced))
}
