use chrono::{DateTime, Utc};

use crate::condition::{ConditionConfig, ConditionType};
use crate::evaluator::{ConditionEvaluator, EvaluationError};
use crate::order::OrderEvent;
use crate::progress::Progress;

use super::mismatch;

/// +1 for a paid order placed inside a fixed date range. Target is always 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeWindowEvaluator;

impl ConditionEvaluator for TimeWindowEvaluator {
    fn condition_type(&self) -> ConditionType {
        ConditionType::TimeWindow
    }

    fn evaluate(
        &self,
        order: &OrderEvent,
        config: &ConditionConfig,
        _progress: &Progress,
        _now: DateTime<Utc>,
    ) -> Result<u64, EvaluationError> {
        let ConditionConfig::TimeWindow(config) = config else {
            return Err(mismatch(ConditionType::TimeWindow, config));
        };
        let inside = config.start_date <= order.created_at && order.created_at <= config.end_date;
        Ok(u64::from(order.is_paid() && inside))
    }

    fn target_value(&self, config: &ConditionConfig) -> Result<u64, EvaluationError> {
        match config {
            ConditionConfig::TimeWindow(_) => Ok(1),
            other => Err(mismatch(ConditionType::TimeWindow, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::TimeWindowConfig;
    use crate::evaluators::fixtures::{order, progress};
    use chrono::Duration;

    #[test]
    fn window_bounds_are_inclusive() {
        let start = Utc::now() - Duration::days(7);
        let end = start + Duration::days(3);
        let config = ConditionConfig::TimeWindow(TimeWindowConfig { start_date: start, end_date: end });
        let e = TimeWindowEvaluator;
        let now = Utc::now();

        assert_eq!(e.evaluate(&order("paid", start), &config, &progress(1), now), Ok(1));
        assert_eq!(e.evaluate(&order("paid", end), &config, &progress(1), now), Ok(1));
        assert_eq!(e.evaluate(&order("paid", end + Duration::seconds(1)), &config, &progress(1), now), Ok(0));
        assert_eq!(e.evaluate(&order("paid", start - Duration::seconds(1)), &config, &progress(1), now), Ok(0));
        assert_eq!(e.evaluate(&order("pending", start), &config, &progress(1), now), Ok(0));
    }
}
