//! Delivery fee policy and rule administration.

use std::sync::Arc;

use crate::domain::aggregates::delivery::validate_amounts;
use crate::domain::aggregates::{DeliveryRule, DeliveryRuleUpdate, NewDeliveryRule};
use crate::domain::events::{DomainEvent, EventBus};
use crate::domain::value_objects::{DeliveryRuleId, Money};
use crate::store::{Store, StoreError, StoreTx};
use crate::{EcommerceError, Result};

const RULES_LOCK_KEY: &str = "delivery-rules";

fn first_active(rules: Vec<DeliveryRule>) -> Option<DeliveryRule> {
    rules.into_iter().find(|r| r.active)
}

/// Returns the active rule, creating and activating the default one when no
/// rule is active.
///
/// The common case reads without locking. Only when nothing is active does it
/// take the rules lock and check again, so concurrent callers create one
/// default between them.
pub(crate) async fn ensure_active_rule<T: StoreTx>(tx: &mut T) -> Result<DeliveryRule> {
    if let Some(rule) = first_active(tx.delivery_rules().await?) {
        return Ok(rule);
    }
    tx.lock_key(RULES_LOCK_KEY).await?;
    if let Some(rule) = first_active(tx.delivery_rules().await?) {
        return Ok(rule);
    }

    let rule = tx.insert_delivery_rule(&NewDeliveryRule::default()).await?;
    tx.activate_delivery_rule(rule.id).await?;
    tracing::info!(rule_id = %rule.id, threshold = %rule.free_threshold, fee = %rule.flat_fee, "no active delivery rule, default created");
    Ok(DeliveryRule { active: true, ..rule })
}

pub struct DeliveryPolicy<S> {
    store: Arc<S>,
    events: EventBus,
}

impl<S> Clone for DeliveryPolicy<S> {
    fn clone(&self) -> Self { Self { store: Arc::clone(&self.store), events: self.events.clone() } }
}

impl<S: Store> DeliveryPolicy<S> {
    pub fn new(store: Arc<S>, events: EventBus) -> Self { Self { store, events } }

    /// Idempotent: repeated calls return the same rule.
    pub async fn get_or_create_default(&self) -> Result<DeliveryRule> {
        let mut tx = self.store.begin().await?;
        let rule = ensure_active_rule(&mut tx).await?;
        tx.commit().await?;
        Ok(rule)
    }

    pub async fn compute_fee(&self, subtotal: Money) -> Result<Money> {
        Ok(self.get_or_create_default().await?.fee_for(subtotal))
    }

    pub async fn list_rules(&self) -> Result<Vec<DeliveryRule>> {
        let mut tx = self.store.begin().await?;
        let rules = tx.delivery_rules().await?;
        tx.commit().await?;
        Ok(rules)
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_rule(&self, new: NewDeliveryRule) -> Result<DeliveryRule> {
        validate_amounts(Some(new.free_threshold), Some(new.flat_fee)).map_err(EcommerceError::Validation)?;

        let mut tx = self.store.begin().await?;
        tx.lock_key(RULES_LOCK_KEY).await?;
        let mut rule = tx.insert_delivery_rule(&new).await?;
        if new.active {
            tx.activate_delivery_rule(rule.id).await?;
            rule.active = true;
        }
        tx.commit().await?;

        tracing::info!(rule_id = %rule.id, active = rule.active, "delivery rule created");
        if rule.active {
            self.events.publish(DomainEvent::DeliveryRuleActivated { rule_id: rule.id }).await;
        }
        Ok(rule)
    }

    /// Changes only the fields present in `update`.
    #[tracing::instrument(skip(self))]
    pub async fn update_rule(&self, id: DeliveryRuleId, update: DeliveryRuleUpdate) -> Result<DeliveryRule> {
        if update.is_empty() {
            return Err(EcommerceError::Validation("no fields to update".to_string()));
        }
        validate_amounts(update.free_threshold, update.flat_fee).map_err(EcommerceError::Validation)?;

        let mut tx = self.store.begin().await?;
        tx.lock_key(RULES_LOCK_KEY).await?;
        let current = tx
            .delivery_rules()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or(EcommerceError::DeliveryRuleNotFound)?;
        let next = update.apply(&current);
        let rule = tx
            .update_delivery_rule(id, next.free_threshold, next.flat_fee)
            .await?
            .ok_or(EcommerceError::DeliveryRuleNotFound)?;
        tx.commit().await?;

        tracing::info!(rule_id = %rule.id, threshold = %rule.free_threshold, fee = %rule.flat_fee, "delivery rule updated");
        Ok(rule)
    }

    /// Makes `id` the only active rule.
    #[tracing::instrument(skip(self))]
    pub async fn activate_rule(&self, id: DeliveryRuleId) -> Result<DeliveryRule> {
        let mut tx = self.store.begin().await?;
        tx.lock_key(RULES_LOCK_KEY).await?;
        if !tx.activate_delivery_rule(id).await? {
            return Err(EcommerceError::DeliveryRuleNotFound);
        }
        let rule = first_active(tx.delivery_rules().await?)
            .filter(|r| r.id == id)
            .ok_or_else(|| StoreError::DataCorruption(format!("rule {id} not active after activation")))?;
        tx.commit().await?;

        tracing::info!(rule_id = %id, "delivery rule activated");
        self.events.publish(DomainEvent::DeliveryRuleActivated { rule_id: id }).await;
        Ok(rule)
    }
}
