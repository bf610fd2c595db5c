use chrono::{DateTime, Utc};

use crate::condition::{ConditionConfig, ConditionType, ProductCategoryConfig};
use crate::evaluator::{ConditionEvaluator, EvaluationError};
use crate::order::{LineItem, OrderEvent};
use crate::progress::Progress;

use super::{mismatch, total_quantity};

/// Adds the quantity of line items in the configured category.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProductCategoryEvaluator;

fn in_category(item: &LineItem, config: &ProductCategoryConfig) -> bool {
    let Some(product_type) = item.product_type.as_deref() else {
        return false;
    };
    product_type.eq_ignore_ascii_case(&config.category_id)
        || config
            .category_name
            .as_deref()
            .is_some_and(|name| product_type.eq_ignore_ascii_case(name))
}

impl ConditionEvaluator for ProductCategoryEvaluator {
    fn condition_type(&self) -> ConditionType {
        ConditionType::ProductCategory
    }

    fn evaluate(
        &self,
        order: &OrderEvent,
        config: &ConditionConfig,
        _progress: &Progress,
        _now: DateTime<Utc>,
    ) -> Result<u64, EvaluationError> {
        let ConditionConfig::ProductCategory(config) = config else {
            return Err(mismatch(ConditionType::ProductCategory, config));
        };
        if !order.is_paid() {
            return Ok(0);
        }
        total_quantity(order.line_items.iter().filter(|item| in_category(item, config)))
    }

    fn target_value(&self, config: &ConditionConfig) -> Result<u64, EvaluationError> {
        match config {
            ConditionConfig::ProductCategory(c) => Ok(c.minimum_quantity.unwrap_or(1)),
            other => Err(mismatch(ConditionType::ProductCategory, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::fixtures::{order, progress};

    fn config(id: &str, name: Option<&str>) -> ConditionConfig {
        ConditionConfig::ProductCategory(ProductCategoryConfig {
            category_id: id.to_string(),
            category_name: name.map(str::to_string),
            minimum_quantity: None,
        })
    }

    #[test]
    fn sums_matching_quantities() {
        let now = Utc::now();
        let inc = ProductCategoryEvaluator
            .evaluate(&order("paid", now), &config("shoes", None), &progress(1), now)
            .unwrap();
        assert_eq!(inc, 2);
    }

    #[test]
    fn matches_on_category_name_too() {
        let now = Utc::now();
        let inc = ProductCategoryEvaluator
            .evaluate(&order("paid", now), &config("gid-123", Some("Socks")), &progress(1), now)
            .unwrap();
        assert_eq!(inc, 3);
    }

    #[test]
    fn overflowing_category_quantities_are_rejected() {
        let now = Utc::now();
        let mut o = order("paid", now);
        o.line_items[1].product_type = Some("Shoes".to_string());
        o.line_items[1].quantity = u64::MAX;
        assert!(ProductCategoryEvaluator
            .evaluate(&o, &config("shoes", None), &progress(1), now)
            .is_err());
    }

    #[test]
    fn minimum_quantity_defaults_to_one() {
        assert_eq!(ProductCategoryEvaluator.target_value(&config("shoes", None)), Ok(1));
    }
}
