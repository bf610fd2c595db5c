use chrono::{DateTime, Utc};

use crate::condition::{ConditionConfig, ConditionType};
use crate::evaluator::{ConditionEvaluator, EvaluationError};
use crate::order::OrderEvent;
use crate::progress::Progress;

use super::{mismatch, within_trailing_window};

/// +1 per paid order, optionally only within the last N days.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrderCountEvaluator;

impl ConditionEvaluator for OrderCountEvaluator {
    fn condition_type(&self) -> ConditionType {
        ConditionType::OrderCount
    }

    fn evaluate(
        &self,
        order: &OrderEvent,
        config: &ConditionConfig,
        _progress: &Progress,
        now: DateTime<Utc>,
    ) -> Result<u64, EvaluationError> {
        let ConditionConfig::OrderCount(config) = config else {
            return Err(mismatch(ConditionType::OrderCount, config));
        };
        if !order.is_paid() || !within_trailing_window(order, config.time_window_days, now) {
            return Ok(0);
        }
        Ok(1)
    }

    fn target_value(&self, config: &ConditionConfig) -> Result<u64, EvaluationError> {
        match config {
            ConditionConfig::OrderCount(c) => Ok(c.target_order_count),
            other => Err(mismatch(ConditionType::OrderCount, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{OrderCountConfig, TimeWindowConfig};
    use crate::evaluators::fixtures::{order, progress};
    use chrono::Duration;
    use proptest::prelude::*;

    fn config(window: Option<u32>) -> ConditionConfig {
        ConditionConfig::OrderCount(OrderCountConfig {
            target_order_count: 3,
            time_window_days: window,
        })
    }

    #[test]
    fn paid_order_counts_once() {
        let now = Utc::now();
        let inc = OrderCountEvaluator
            .evaluate(&order("paid", now), &config(None), &progress(3), now)
            .unwrap();
        assert_eq!(inc, 1);
        assert_eq!(OrderCountEvaluator.target_value(&config(None)).unwrap(), 3);
    }

    #[test]
    fn orders_outside_the_window_do_not_count() {
        let now = Utc::now();
        let old = order("paid", now - Duration::days(31));
        assert_eq!(OrderCountEvaluator.evaluate(&old, &config(Some(30)), &progress(3), now), Ok(0));

        let recent = order("paid", now - Duration::days(29));
        assert_eq!(OrderCountEvaluator.evaluate(&recent, &config(Some(30)), &progress(3), now), Ok(1));
    }

    #[test]
    fn foreign_config_is_rejected() {
        let now = Utc::now();
        let foreign = ConditionConfig::TimeWindow(TimeWindowConfig {
            start_date: now - Duration::days(1),
            end_date: now,
        });
        let err = OrderCountEvaluator
            .evaluate(&order("paid", now), &foreign, &progress(3), now)
            .unwrap_err();
        assert!(matches!(err, EvaluationError::ConfigMismatch { .. }));
    }

    proptest! {
        #[test]
        fn non_paid_orders_never_count(
            status in "[a-z_]{1,16}".prop_filter("not paid", |s| s != "paid"),
            window in proptest::option::of(1u32..365),
        ) {
            let now = Utc::now();
            let inc = OrderCountEvaluator
                .evaluate(&order(&status, now), &config(window), &progress(3), now)
                .unwrap();
            prop_assert_eq!(inc, 0);
        }
    }
}
