use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use questline_core::{ConditionId, DomainError, QuestId, RewardId, ShopId};

use crate::condition::ConditionConfig;
use crate::reward::RewardConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestCondition {
    pub id: ConditionId,
    #[serde(flatten)]
    pub config: ConditionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestReward {
    pub id: RewardId,
    #[serde(flatten)]
    pub config: RewardConfig,
}

/// A merchant-defined goal.
///
/// Conditions and rewards are fixed once the quest exists; only the active
/// flag and descriptive metadata change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: QuestId,
    pub shop_id: ShopId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub conditions: Vec<QuestCondition>,
    pub rewards: Vec<QuestReward>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quest {
    /// Active and inside its optional date window.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.start_date.is_none_or(|start| start <= now)
            && self.end_date.is_none_or(|end| now <= end)
    }

    /// The condition that defines the quest's target value.
    pub fn primary_condition(&self) -> Option<&QuestCondition> {
        self.conditions.first()
    }

    /// Single-reward model: completion grants the first reward.
    pub fn first_reward(&self) -> Option<&QuestReward> {
        self.rewards.first()
    }

    pub fn reward(&self, id: RewardId) -> Option<&QuestReward> {
        self.rewards.iter().find(|r| r.id == id)
    }

    pub fn set_active(&mut self, active: bool, now: DateTime<Utc>) {
        self.is_active = active;
        self.updated_at = now;
    }
}

/// Input for creating a quest; validated before it becomes a [`Quest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    pub conditions: Vec<ConditionConfig>,
    pub rewards: Vec<RewardConfig>,
}

fn default_active() -> bool {
    true
}

impl NewQuest {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("quest name must not be empty"));
        }
        if self.conditions.is_empty() {
            return Err(DomainError::validation("a quest needs at least one condition"));
        }
        if self.rewards.is_empty() {
            return Err(DomainError::validation("a quest needs at least one reward"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(DomainError::validation("startDate must be before endDate"));
            }
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        for reward in &self.rewards {
            reward.validate()?;
        }
        Ok(())
    }

    /// Validate and assign identifiers.
    pub fn into_quest(self, shop_id: ShopId, now: DateTime<Utc>) -> Result<Quest, DomainError> {
        self.validate()?;
        Ok(Quest {
            id: QuestId::new(),
            shop_id,
            name: self.name.trim().to_string(),
            description: self.description,
            is_active: self.is_active,
            start_date: self.start_date,
            end_date: self.end_date,
            conditions: self
                .conditions
                .into_iter()
                .map(|config| QuestCondition { id: ConditionId::new(), config })
                .collect(),
            rewards: self
                .rewards
                .into_iter()
                .map(|config| QuestReward { id: RewardId::new(), config })
                .collect(),
            created_at: now,
            updated_at: now,
        })
    }
}
