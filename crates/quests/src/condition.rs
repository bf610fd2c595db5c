//! Quest conditions: a closed set of rule types, each with its own typed
//! configuration.
//!
//! Serialized adjacently tagged, e.g.
//! `{"type": "ORDER_COUNT", "config": {"targetOrderCount": 3}}`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use questline_core::{DomainError, ProductId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    OrderCount,
    TotalSpend,
    ProductCategory,
    ProductSpecific,
    TimeWindow,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::OrderCount => "ORDER_COUNT",
            ConditionType::TotalSpend => "TOTAL_SPEND",
            ConditionType::ProductCategory => "PRODUCT_CATEGORY",
            ConditionType::ProductSpecific => "PRODUCT_SPECIFIC",
            ConditionType::TimeWindow => "TIME_WINDOW",
        }
    }
}

impl core::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionConfig {
    OrderCount(OrderCountConfig),
    TotalSpend(TotalSpendConfig),
    ProductCategory(ProductCategoryConfig),
    ProductSpecific(ProductSpecificConfig),
    TimeWindow(TimeWindowConfig),
}

/// Place N paid orders, optionally within the last `time_window_days` days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCountConfig {
    pub target_order_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_days: Option<u32>,
}

/// Spend at least `target_amount` across paid orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalSpendConfig {
    pub target_amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_days: Option<u32>,
}

/// Buy at least `minimum_quantity` items of a product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCategoryConfig {
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_quantity: Option<u64>,
}

/// Buy at least `minimum_quantity` items among specific products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSpecificConfig {
    pub product_ids: Vec<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_quantity: Option<u64>,
}

/// Place a paid order between `start_date` and `end_date` (inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindowConfig {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl ConditionConfig {
    pub fn condition_type(&self) -> ConditionType {
        match self {
            ConditionConfig::OrderCount(_) => ConditionType::OrderCount,
            ConditionConfig::TotalSpend(_) => ConditionType::TotalSpend,
            ConditionConfig::ProductCategory(_) => ConditionType::ProductCategory,
            ConditionConfig::ProductSpecific(_) => ConditionType::ProductSpecific,
            ConditionConfig::TimeWindow(_) => ConditionType::TimeWindow,
        }
    }

    /// Validate the configuration against its type's schema.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            ConditionConfig::OrderCount(c) => {
                if c.target_order_count == 0 {
                    return Err(DomainError::validation("targetOrderCount must be at least 1"));
                }
                validate_window(c.time_window_days)
            }
            ConditionConfig::TotalSpend(c) => {
                if c.target_amount <= Decimal::ZERO {
                    return Err(DomainError::validation("targetAmount must be positive"));
                }
                if c.currency.trim().is_empty() {
                    return Err(DomainError::validation("currency must not be empty"));
                }
                validate_window(c.time_window_days)
            }
            ConditionConfig::ProductCategory(c) => {
                if c.category_id.trim().is_empty() {
                    return Err(DomainError::validation("categoryId must not be empty"));
                }
                validate_minimum_quantity(c.minimum_quantity)
            }
            ConditionConfig::ProductSpecific(c) => {
                if c.product_ids.is_empty() {
                    return Err(DomainError::validation("productIds must not be empty"));
                }
                validate_minimum_quantity(c.minimum_quantity)
            }
            ConditionConfig::TimeWindow(c) => {
                if c.start_date >= c.end_date {
                    return Err(DomainError::validation("startDate must be before endDate"));
                }
                Ok(())
            }
        }
    }
}

/// Upper bound for `timeWindowDays`, ten years.
pub const MAX_WINDOW_DAYS: u32 = 3650;

fn validate_window(days: Option<u32>) -> Result<(), DomainError> {
    match days {
        Some(0) => Err(DomainError::validation("timeWindowDays must be at least 1")),
        Some(days) if days > MAX_WINDOW_DAYS => Err(DomainError::validation(format!(
            "timeWindowDays must be at most {MAX_WINDOW_DAYS}"
        ))),
        _ => Ok(()),
    }
}

fn validate_minimum_quantity(quantity: Option<u64>) -> Result<(), DomainError> {
    match quantity {
        Some(0) => Err(DomainError::validation("minimumQuantity must be at least 1")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_adjacently_tagged_config() {
        let config: ConditionConfig = serde_json::from_str(
            r#"{"type": "ORDER_COUNT", "config": {"targetOrderCount": 3, "timeWindowDays": 30}}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            ConditionConfig::OrderCount(OrderCountConfig {
                target_order_count: 3,
                time_window_days: Some(30),
            })
        );
        assert_eq!(config.condition_type(), ConditionType::OrderCount);
    }

    #[test]
    fn config_shape_is_checked_per_type() {
        let wrong = serde_json::from_str::<ConditionConfig>(
            r#"{"type": "TOTAL_SPEND", "config": {"targetOrderCount": 3}}"#,
        );
        assert!(wrong.is_err());

        let unknown = serde_json::from_str::<ConditionConfig>(
            r#"{"type": "LOYALTY_POINTS", "config": {}}"#,
        );
        assert!(unknown.is_err());
    }

    #[test]
    fn validation_rejects_degenerate_targets() {
        let zero = ConditionConfig::OrderCount(OrderCountConfig {
            target_order_count: 0,
            time_window_days: None,
        });
        assert!(zero.validate().is_err());

        let empty_products = ConditionConfig::ProductSpecific(ProductSpecificConfig {
            product_ids: vec![],
            minimum_quantity: None,
        });
        assert!(empty_products.validate().is_err());

        for days in [MAX_WINDOW_DAYS + 1, 100_000_000, u32::MAX] {
            let huge_window = ConditionConfig::OrderCount(OrderCountConfig {
                target_order_count: 1,
                time_window_days: Some(days),
            });
            assert!(huge_window.validate().is_err(), "{days} days accepted");
        }
        let ten_years = ConditionConfig::OrderCount(OrderCountConfig {
            target_order_count: 1,
            time_window_days: Some(MAX_WINDOW_DAYS),
        });
        assert!(ten_years.validate().is_ok());

        let now = Utc::now();
        let inverted = ConditionConfig::TimeWindow(TimeWindowConfig {
            start_date: now,
            end_date: now - chrono::Duration::days(1),
        });
        assert!(inverted.validate().is_err());
    }
}
