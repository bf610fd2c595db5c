use chrono::{DateTime, Utc};

use crate::condition::{ConditionConfig, ConditionType};
use crate::evaluator::{ConditionEvaluator, EvaluationError};
use crate::order::{OrderEvent, to_minor_units};
use crate::progress::Progress;

use super::{mismatch, within_trailing_window};

/// Adds the order total in minor units (cents).
///
/// Orders in another currency contribute nothing; orders without a currency
/// are assumed to be in the shop currency.
#[derive(Debug, Default, Clone, Copy)]
pub struct TotalSpendEvaluator;

impl ConditionEvaluator for TotalSpendEvaluator {
    fn condition_type(&self) -> ConditionType {
        ConditionType::TotalSpend
    }

    fn evaluate(
        &self,
        order: &OrderEvent,
        config: &ConditionConfig,
        _progress: &Progress,
        now: DateTime<Utc>,
    ) -> Result<u64, EvaluationError> {
        let ConditionConfig::TotalSpend(config) = config else {
            return Err(mismatch(ConditionType::TotalSpend, config));
        };
        if !order.is_paid() || !within_trailing_window(order, config.time_window_days, now) {
            return Ok(0);
        }
        let same_currency = order
            .currency
            .as_deref()
            .is_none_or(|c| c.eq_ignore_ascii_case(&config.currency));
        if !same_currency {
            return Ok(0);
        }
        match order.total_price {
            None => Ok(0),
            Some(total) => to_minor_units(total)
                .ok_or_else(|| EvaluationError::OrderOutOfRange(format!("total_price {total}"))),
        }
    }

    fn target_value(&self, config: &ConditionConfig) -> Result<u64, EvaluationError> {
        match config {
            ConditionConfig::TotalSpend(c) => to_minor_units(c.target_amount).ok_or_else(|| {
                EvaluationError::InvalidConfig(format!("targetAmount {} out of range", c.target_amount))
            }),
            other => Err(mismatch(ConditionType::TotalSpend, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::TotalSpendConfig;
    use crate::evaluators::fixtures::{order, progress};

    fn config(currency: &str) -> ConditionConfig {
        ConditionConfig::TotalSpend(TotalSpendConfig {
            target_amount: "100.00".parse().unwrap(),
            currency: currency.to_string(),
            time_window_days: None,
        })
    }

    #[test]
    fn adds_order_total_in_cents() {
        let now = Utc::now();
        let inc = TotalSpendEvaluator
            .evaluate(&order("paid", now), &config("usd"), &progress(10_000), now)
            .unwrap();
        assert_eq!(inc, 4550);
        assert_eq!(TotalSpendEvaluator.target_value(&config("USD")).unwrap(), 10_000);
    }

    #[test]
    fn other_currencies_do_not_count() {
        let now = Utc::now();
        assert_eq!(
            TotalSpendEvaluator.evaluate(&order("paid", now), &config("EUR"), &progress(10_000), now),
            Ok(0)
        );
    }

    #[test]
    fn missing_currency_is_accepted() {
        let now = Utc::now();
        let mut o = order("paid", now);
        o.currency = None;
        assert_eq!(TotalSpendEvaluator.evaluate(&o, &config("EUR"), &progress(10_000), now), Ok(4550));
    }

    #[test]
    fn unrepresentable_total_is_an_error() {
        let now = Utc::now();
        let mut o = order("paid", now);
        o.total_price = Some("79228162514264337593543950335".parse().unwrap());
        let err = TotalSpendEvaluator
            .evaluate(&o, &config("USD"), &progress(10_000), now)
            .unwrap_err();
        assert!(matches!(err, EvaluationError::OrderOutOfRange(_)));

        o.total_price = Some("-5.00".parse().unwrap());
        assert!(TotalSpendEvaluator.evaluate(&o, &config("USD"), &progress(10_000), now).is_err());

        o.total_price = None;
        assert_eq!(TotalSpendEvaluator.evaluate(&o, &config("USD"), &progress(10_000), now), Ok(0));
    }

    #[test]
    fn unpaid_orders_do_not_count() {
        let now = Utc::now();
        assert_eq!(
            TotalSpendEvaluator.evaluate(&order("refunded", now), &config("USD"), &progress(10_000), now),
            Ok(0)
        );
    }
}
