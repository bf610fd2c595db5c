//! The condition evaluator contract and its type-keyed registry.
//!
//! Evaluators are pure: the order, the condition's configuration, the current
//! progress and the clock go in, an increment comes out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::condition::{ConditionConfig, ConditionType};
use crate::evaluators::{
    OrderCountEvaluator, ProductCategoryEvaluator, ProductSpecificEvaluator, TimeWindowEvaluator,
    TotalSpendEvaluator,
};
use crate::order::OrderEvent;
use crate::progress::Progress;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("no evaluator registered for condition type {0}")]
    NoEvaluator(ConditionType),

    #[error("evaluator for {expected} received a {actual} configuration")]
    ConfigMismatch {
        expected: ConditionType,
        actual: ConditionType,
    },

    #[error("invalid condition configuration: {0}")]
    InvalidConfig(String),

    /// The order carries a value the progress counter cannot hold.
    #[error("order {0} out of range")]
    OrderOutOfRange(String),
}

/// `current >= target`.
pub fn target_reached(current: u64, target: u64) -> bool {
    current >= target
}

pub trait ConditionEvaluator: Send + Sync {
    fn condition_type(&self) -> ConditionType;

    /// Increment contributed by `order`; 0 when it does not count.
    fn evaluate(
        &self,
        order: &OrderEvent,
        config: &ConditionConfig,
        progress: &Progress,
        now: DateTime<Utc>,
    ) -> Result<u64, EvaluationError>;

    fn is_completed(&self, current: u64, target: u64) -> bool {
        target_reached(current, target)
    }

    /// The numeric goal carried by `config`.
    fn target_value(&self, config: &ConditionConfig) -> Result<u64, EvaluationError>;
}

/// Maps condition types to evaluators. New types register here; the order
/// worker never matches on the type itself.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<ConditionType, Arc<dyn ConditionEvaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in evaluator.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OrderCountEvaluator));
        registry.register(Arc::new(TotalSpendEvaluator));
        registry.register(Arc::new(ProductCategoryEvaluator));
        registry.register(Arc::new(ProductSpecificEvaluator));
        registry.register(Arc::new(TimeWindowEvaluator));
        registry
    }

    /// Register (or replace) the evaluator for its condition type.
    pub fn register(&mut self, evaluator: Arc<dyn ConditionEvaluator>) {
        self.evaluators.insert(evaluator.condition_type(), evaluator);
    }

    pub fn get(&self, condition_type: ConditionType) -> Result<&Arc<dyn ConditionEvaluator>, EvaluationError> {
        self.evaluators
            .get(&condition_type)
            .ok_or(EvaluationError::NoEvaluator(condition_type))
    }

    /// Target value for `config` via its registered evaluator.
    pub fn target_value(&self, config: &ConditionConfig) -> Result<u64, EvaluationError> {
        self.get(config.condition_type())?.target_value(config)
    }

    /// Evaluate `order` against `config` via its registered evaluator.
    pub fn evaluate(
        &self,
        order: &OrderEvent,
        config: &ConditionConfig,
        progress: &Progress,
        now: DateTime<Utc>,
    ) -> Result<u64, EvaluationError> {
        self.get(config.condition_type())?.evaluate(order, config, progress, now)
    }
}

impl core::fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut types: Vec<_> = self.evaluators.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("EvaluatorRegistry").field("types", &types).finish()
    }
}
