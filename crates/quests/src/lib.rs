//! Quest domain module.
//!
//! This crate contains the business rules for quests, progress and rewards,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).
//! Time is always passed in explicitly.

pub mod condition;
pub mod evaluator;
pub mod evaluators;
pub mod order;
pub mod progress;
pub mod quest;
pub mod redemption;
pub mod reward;
pub mod shop;

pub use condition::{
    ConditionConfig, ConditionType, OrderCountConfig, ProductCategoryConfig,
    ProductSpecificConfig, TimeWindowConfig, TotalSpendConfig,
};
pub use evaluator::{ConditionEvaluator, EvaluationError, EvaluatorRegistry, target_reached};
pub use order::{LineItem, OrderCustomer, OrderDiscountCode, OrderEvent, to_minor_units};
pub use progress::{IncrementOutcome, Progress, ProgressKey, ProgressStatus};
pub use quest::{NewQuest, Quest, QuestCondition, QuestReward};
pub use redemption::{NewRedemption, Redemption, RedemptionKey, expiry_after};
pub use reward::{
    CustomRewardConfig, FixedDiscountConfig, FreeShippingConfig, PercentageDiscountConfig,
    RewardConfig, RewardType, DEFAULT_EXPIRY_DAYS, MAX_EXPIRY_DAYS,
};
pub use shop::Shop;
