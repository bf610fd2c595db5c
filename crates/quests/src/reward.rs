//! Quest rewards, granted once on completion.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use questline_core::DomainError;

/// Days an issued discount stays valid when the reward does not say otherwise.
pub const DEFAULT_EXPIRY_DAYS: u32 = 30;

/// Longest validity a reward may ask for, ten years.
pub const MAX_EXPIRY_DAYS: u32 = 3650;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardType {
    DiscountPercentage,
    DiscountFixed,
    FreeShipping,
    Custom,
}

impl RewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardType::DiscountPercentage => "DISCOUNT_PERCENTAGE",
            RewardType::DiscountFixed => "DISCOUNT_FIXED",
            RewardType::FreeShipping => "FREE_SHIPPING",
            RewardType::Custom => "CUSTOM",
        }
    }
}

impl core::fmt::Display for RewardType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardConfig {
    DiscountPercentage(PercentageDiscountConfig),
    DiscountFixed(FixedDiscountConfig),
    FreeShipping(FreeShippingConfig),
    Custom(CustomRewardConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentageDiscountConfig {
    /// e.g. `10` for 10% off.
    pub percentage: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_order_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedDiscountConfig {
    pub amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_order_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeShippingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_order_value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_days: Option<u32>,
}

/// Merchant-defined benefit fulfilled outside the platform's discount engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRewardConfig {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RewardConfig {
    pub fn reward_type(&self) -> RewardType {
        match self {
            RewardConfig::DiscountPercentage(_) => RewardType::DiscountPercentage,
            RewardConfig::DiscountFixed(_) => RewardType::DiscountFixed,
            RewardConfig::FreeShipping(_) => RewardType::FreeShipping,
            RewardConfig::Custom(_) => RewardType::Custom,
        }
    }

    pub fn expiry_days(&self) -> u32 {
        let days = match self {
            RewardConfig::DiscountPercentage(c) => c.expiry_days,
            RewardConfig::DiscountFixed(c) => c.expiry_days,
            RewardConfig::FreeShipping(c) => c.expiry_days,
            RewardConfig::Custom(_) => None,
        };
        days.unwrap_or(DEFAULT_EXPIRY_DAYS)
    }

    pub fn minimum_order_value(&self) -> Option<Decimal> {
        match self {
            RewardConfig::DiscountPercentage(c) => c.minimum_order_value,
            RewardConfig::DiscountFixed(c) => c.minimum_order_value,
            RewardConfig::FreeShipping(c) => c.minimum_order_value,
            RewardConfig::Custom(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            RewardConfig::DiscountPercentage(c) => {
                if c.percentage <= Decimal::ZERO || c.percentage > Decimal::ONE_HUNDRED {
                    return Err(DomainError::validation("percentage must be in (0, 100]"));
                }
                validate_common(c.minimum_order_value, c.expiry_days)
            }
            RewardConfig::DiscountFixed(c) => {
                if c.amount <= Decimal::ZERO {
                    return Err(DomainError::validation("amount must be positive"));
                }
                if c.currency.trim().is_empty() {
                    return Err(DomainError::validation("currency must not be empty"));
                }
                validate_common(c.minimum_order_value, c.expiry_days)
            }
            RewardConfig::FreeShipping(c) => validate_common(c.minimum_order_value, c.expiry_days),
            RewardConfig::Custom(c) => {
                if c.title.trim().is_empty() {
                    return Err(DomainError::validation("title must not be empty"));
                }
                Ok(())
            }
        }
    }
}

fn validate_common(minimum: Option<Decimal>, expiry_days: Option<u32>) -> Result<(), DomainError> {
    if minimum.is_some_and(|m| m < Decimal::ZERO) {
        return Err(DomainError::validation("minimumOrderValue must not be negative"));
    }
    match expiry_days {
        Some(0) => Err(DomainError::validation("expiryDays must be at least 1")),
        Some(days) if days > MAX_EXPIRY_DAYS => Err(DomainError::validation(format!(
            "expiryDays must be at most {MAX_EXPIRY_DAYS}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_defaults_to_thirty_days() {
        let reward: RewardConfig = serde_json::from_str(
            r#"{"type": "DISCOUNT_PERCENTAGE", "config": {"percentage": 10}}"#,
        )
        .unwrap();
        assert_eq!(reward.reward_type(), RewardType::DiscountPercentage);
        assert_eq!(reward.expiry_days(), DEFAULT_EXPIRY_DAYS);
        assert!(reward.validate().is_ok());
    }

    #[test]
    fn explicit_expiry_and_minimum_are_kept() {
        let reward: RewardConfig = serde_json::from_str(
            r#"{"type": "FREE_SHIPPING", "config": {"minimumOrderValue": "50.00", "expiryDays": 7}}"#,
        )
        .unwrap();
        assert_eq!(reward.expiry_days(), 7);
        assert_eq!(reward.minimum_order_value(), Some("50.00".parse().unwrap()));
    }

    #[test]
    fn expiry_is_bounded() {
        let with_expiry = |days| {
            RewardConfig::FreeShipping(FreeShippingConfig {
                minimum_order_value: None,
                expiry_days: Some(days),
            })
        };
        assert!(with_expiry(MAX_EXPIRY_DAYS).validate().is_ok());
        assert!(with_expiry(MAX_EXPIRY_DAYS + 1).validate().is_err());
        assert!(with_expiry(u32::MAX).validate().is_err());
        assert!(with_expiry(0).validate().is_err());
    }

    #[test]
    fn percentage_must_be_sensible() {
        let reward = RewardConfig::DiscountPercentage(PercentageDiscountConfig {
            percentage: "150".parse().unwrap(),
            minimum_order_value: None,
            expiry_days: None,
        });
        assert!(reward.validate().is_err());
    }
}
