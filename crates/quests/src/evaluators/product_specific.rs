use chrono::{DateTime, Utc};

use crate::condition::{ConditionConfig, ConditionType};
use crate::evaluator::{ConditionEvaluator, EvaluationError};
use crate::order::OrderEvent;
use crate::progress::Progress;

use super::{mismatch, total_quantity};

/// Adds the quantity of line items for any of the listed products.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProductSpecificEvaluator;

impl ConditionEvaluator for ProductSpecificEvaluator {
    fn condition_type(&self) -> ConditionType {
        ConditionType::ProductSpecific
    }

    fn evaluate(
        &self,
        order: &OrderEvent,
        config: &ConditionConfig,
        _progress: &Progress,
        _now: DateTime<Utc>,
    ) -> Result<u64, EvaluationError> {
        let ConditionConfig::ProductSpecific(config) = config else {
            return Err(mismatch(ConditionType::ProductSpecific, config));
        };
        if !order.is_paid() {
            return Ok(0);
        }
        total_quantity(order.line_items.iter().filter(|item| {
            item.product_id
                .as_ref()
                .is_some_and(|id| config.product_ids.contains(id))
        }))
    }

    fn target_value(&self, config: &ConditionConfig) -> Result<u64, EvaluationError> {
        match config {
            ConditionConfig::ProductSpecific(c) => Ok(c.minimum_quantity.unwrap_or(1)),
            other => Err(mismatch(ConditionType::ProductSpecific, other)),
        }
    }
}
