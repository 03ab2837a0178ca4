//! Delivery fee rules

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{DeliveryRuleId, Money};

/// Free-delivery threshold used when no rule is configured.
pub const DEFAULT_FREE_THRESHOLD: i64 = 8000;
/// Flat fee used when no rule is configured.
pub const DEFAULT_FLAT_FEE: i64 = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryRule {
    pub id: DeliveryRuleId,
    pub free_threshold: Money,
    pub flat_fee: Money,
    pub active: bool,
}

impl DeliveryRule {
    /// Subtotals at or above the threshold ship free.
    pub fn fee_for(&self, subtotal: Money) -> Money {
        if subtotal >= self.free_threshold { Money::ZERO } else { self.flat_fee }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewDeliveryRule {
    pub free_threshold: Money,
    pub flat_fee: Money,
    #[serde(default)]
    pub active: bool,
}

impl Default for NewDeliveryRule {
    fn default() -> Self {
        Self {
            free_threshold: Money::from_major(DEFAULT_FREE_THRESHOLD),
            flat_fee: Money::from_major(DEFAULT_FLAT_FEE),
            active: true,
        }
    }
}

/// The fields an administrator may change on an existing rule.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DeliveryRuleUpdate {
    pub free_threshold: Option<Money>,
    pub flat_fee: Option<Money>,
}

impl DeliveryRuleUpdate {
    pub fn is_empty(&self) -> bool { self.free_threshold.is_none() && self.flat_fee.is_none() }

    pub fn apply(&self, rule: &DeliveryRule) -> DeliveryRule {
        DeliveryRule {
            free_threshold: self.free_threshold.unwrap_or(rule.free_threshold),
            flat_fee: self.flat_fee.unwrap_or(rule.flat_fee),
            ..rule.clone()
        }
    }
}

/// Rejects negative amounts, naming the offending field.
pub fn validate_amounts(free_threshold: Option<Money>, flat_fee: Option<Money>) -> Result<(), String> {
    if free_threshold.is_some_and(|m| m.is_negative()) {
        return Err("free_threshold must not be negative".to_string());
    }
    if flat_fee.is_some_and(|m| m.is_negative()) {
        return Err("flat_fee must not be negative".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> DeliveryRule {
        DeliveryRule {
            id: DeliveryRuleId::new(1),
            free_threshold: Money::from_major(8000),
            flat_fee: Money::from_major(1000),
            active: true,
        }
    }

    #[test]
    fn test_fee_boundary() {
        let rule = rule();
        assert_eq!(rule.fee_for(Money::from_major(8000)), Money::ZERO);
        assert_eq!(rule.fee_for(Money::from_minor(799_999)), Money::from_major(1000));
        assert_eq!(rule.fee_for(Money::from_major(5000)), Money::from_major(1000));
        assert_eq!(rule.fee_for(Money::from_major(12_000)), Money::ZERO);
    }

    #[test]
    fn test_update_only_touches_given_fields() {
        let update = DeliveryRuleUpdate { flat_fee: Some(Money::from_major(300)), ..Default::default() };
        let updated = update.apply(&rule());
        assert_eq!(updated.flat_fee, Money::from_major(300));
        assert_eq!(updated.free_threshold, Money::from_major(8000));
        assert!(!update.is_empty());
    }

    #[test]
    fn test_negative_amounts_rejected() {
        assert!(validate_amounts(Some(Money::from_major(-1)), None).is_err());
        assert!(validate_amounts(None, Some(Money::from_minor(-1))).is_err());
        assert!(validate_amounts(Some(Money::ZERO), Some(Money::ZERO)).is_ok());
    }
}
