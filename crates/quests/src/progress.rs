//! Per-customer progress toward a quest.
//!
//! Status moves forward only: NOT_STARTED -> IN_PROGRESS -> COMPLETED -> REWARDED,
//! with NOT_STARTED -> COMPLETED allowed when one order meets the target.
//! Once COMPLETED no increment is applied; REWARDED is terminal.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use questline_core::{CustomerId, DomainError, OrderId, QuestId, RewardId, ShopId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
    Rewarded,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "NOT_STARTED",
            ProgressStatus::InProgress => "IN_PROGRESS",
            ProgressStatus::Completed => "COMPLETED",
            ProgressStatus::Rewarded => "REWARDED",
        }
    }

    /// COMPLETED or REWARDED: no more increments.
    pub fn is_finished(&self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Rewarded)
    }
}

/// Natural unique key of a progress record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressKey {
    pub shop_id: ShopId,
    pub quest_id: QuestId,
    pub customer_id: CustomerId,
}

impl ProgressKey {
    pub fn new(shop_id: ShopId, quest_id: QuestId, customer_id: CustomerId) -> Self {
        Self { shop_id, quest_id, customer_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub shop_id: ShopId,
    pub quest_id: QuestId,
    pub customer_id: CustomerId,
    pub status: ProgressStatus,
    pub current_value: u64,
    /// Fixed when the record is created.
    pub target_value: u64,
    /// Orders that already contributed a non-zero increment.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub counted_orders: BTreeSet<OrderId>,
    pub completing_order_id: Option<OrderId>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reward_id: Option<RewardId>,
    pub rewarded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of applying one order's increment to a progress record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// Value changed. `newly_completed` is true when this increment reached the target.
    Applied { newly_completed: bool },
    /// The order contributed nothing.
    NoIncrement,
    /// The order was already counted; nothing changed.
    DuplicateOrder,
    /// Progress was already COMPLETED or REWARDED; nothing changed.
    AlreadyFinished,
}

impl Progress {
    pub fn new(key: ProgressKey, target_value: u64, now: DateTime<Utc>) -> Self {
        Self {
            shop_id: key.shop_id,
            quest_id: key.quest_id,
            customer_id: key.customer_id,
            status: ProgressStatus::NotStarted,
            current_value: 0,
            target_value,
            counted_orders: BTreeSet::new(),
            completing_order_id: None,
            completed_at: None,
            reward_id: None,
            rewarded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(self.shop_id, self.quest_id, self.customer_id.clone())
    }

    pub fn has_counted(&self, order_id: &OrderId) -> bool {
        self.counted_orders.contains(order_id)
    }

    /// Apply `amount` contributed by `order_id`, completing the record when
    /// `is_completed(current, target)` holds afterwards.
    ///
    /// Idempotent per order: the same order never counts twice, and a finished
    /// record is never touched.
    pub fn apply_increment(
        &mut self,
        order_id: &OrderId,
        amount: u64,
        now: DateTime<Utc>,
        is_completed: impl Fn(u64, u64) -> bool,
    ) -> IncrementOutcome {
        if self.status.is_finished() {
            return IncrementOutcome::AlreadyFinished;
        }
        if self.has_counted(order_id) {
            return IncrementOutcome::DuplicateOrder;
        }
        if amount == 0 {
            return IncrementOutcome::NoIncrement;
        }

        self.current_value = self.current_value.saturating_add(amount);
        self.counted_orders.insert(order_id.clone());
        self.updated_at = now;

        if is_completed(self.current_value, self.target_value) {
            self.status = ProgressStatus::Completed;
            self.completed_at = Some(now);
            self.completing_order_id = Some(order_id.clone());
            IncrementOutcome::Applied { newly_completed: true }
        } else {
            self.status = ProgressStatus::InProgress;
            IncrementOutcome::Applied { newly_completed: false }
        }
    }

    /// Whether `order_id` is the order that completed this record.
    pub fn completed_by(&self, order_id: &OrderId) -> bool {
        self.status.is_finished() && self.completing_order_id.as_ref() == Some(order_id)
    }

    /// COMPLETED -> REWARDED. Re-marking with the same reward is a no-op.
    pub fn mark_rewarded(&mut self, reward_id: RewardId, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            ProgressStatus::Completed => {
                self.status = ProgressStatus::Rewarded;
                self.reward_id = Some(reward_id);
                self.rewarded_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
            ProgressStatus::Rewarded if self.reward_id == Some(reward_id) => Ok(()),
            ProgressStatus::Rewarded => Err(DomainError::AlreadyRewarded(
                self.reward_id.map(|id| id.to_string()).unwrap_or_default(),
            )),
            status => Err(DomainError::IllegalTransition {
                from: status.as_str(),
                to: ProgressStatus::Rewarded.as_str(),
            }),
        }
    }
}
