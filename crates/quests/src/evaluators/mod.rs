//! Built-in evaluators, one per condition type.

mod order_count;
mod product_category;
mod product_specific;
mod time_window;
mod total_spend;

pub use order_count::OrderCountEvaluator;
pub use product_category::ProductCategoryEvaluator;
pub use product_specific::ProductSpecificEvaluator;
pub use time_window::TimeWindowEvaluator;
pub use total_spend::TotalSpendEvaluator;

use chrono::{DateTime, Duration, Utc};

use crate::condition::{ConditionConfig, ConditionType};
use crate::evaluator::EvaluationError;
use crate::order::{LineItem, OrderEvent};

fn mismatch(expected: ConditionType, config: &ConditionConfig) -> EvaluationError {
    EvaluationError::ConfigMismatch {
        expected,
        actual: config.condition_type(),
    }
}

/// Total quantity across `items`; an order whose quantities overflow is rejected.
fn total_quantity<'a>(items: impl IntoIterator<Item = &'a LineItem>) -> Result<u64, EvaluationError> {
    items.into_iter().try_fold(0u64, |sum, item| {
        sum.checked_add(item.quantity)
            .ok_or_else(|| EvaluationError::OrderOutOfRange("line item quantity".to_string()))
    })
}

/// Whether `order` falls inside a trailing window of `days` ending at `now`.
/// No window, or one reaching past the earliest representable instant,
/// means every order qualifies.
fn within_trailing_window(order: &OrderEvent, days: Option<u32>, now: DateTime<Utc>) -> bool {
    let cutoff = days
        .and_then(|days| Duration::try_days(i64::from(days)))
        .and_then(|window| now.checked_sub_signed(window));
    match (days, cutoff) {
        (Some(_), Some(cutoff)) => order.placed_since(cutoff),
        _ => true,
    }
}
