use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use questline_core::{QuestId, RedemptionId, RewardId};
use questline_infra::jobs::{DeadLetterEntry, JobId, JobStats};
use questline_quests::{
    EvaluatorRegistry, Progress, ProgressStatus, Quest, QuestReward, Redemption, RewardConfig, RewardType,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShopRequest {
    pub domain: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct FailedJobsQuery {
    pub limit: Option<usize>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardSummary {
    pub id: RewardId,
    #[serde(rename = "type")]
    pub reward_type: RewardType,
    pub description: String,
}

impl RewardSummary {
    pub fn from_reward(reward: &QuestReward) -> Self {
        Self {
            id: reward.id,
            reward_type: reward.config.reward_type(),
            description: describe_reward(&reward.config),
        }
    }
}

/// A live quest with the customer's standing on it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerQuestView {
    pub id: QuestId,
    pub name: String,
    pub description: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: ProgressStatus,
    pub current_value: u64,
    pub target_value: u64,
    pub rewards: Vec<RewardSummary>,
}

impl CustomerQuestView {
    /// `None` when the quest has no condition the registry can size.
    pub fn build(quest: &Quest, progress: Option<&Progress>, evaluators: &EvaluatorRegistry) -> Option<Self> {
        let (status, current_value, target_value) = match progress {
            Some(p) => (p.status, p.current_value, p.target_value),
            None => {
                let condition = quest.primary_condition()?;
                let target = evaluators.target_value(&condition.config).ok()?;
                (ProgressStatus::InProgress, 0, target)
            }
        };

        Some(Self {
            id: quest.id,
            name: quest.name.clone(),
            description: quest.description.clone(),
            end_date: quest.end_date,
            status,
            current_value,
            target_value,
            rewards: quest.rewards.iter().map(RewardSummary::from_reward).collect(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRewardView {
    pub id: RedemptionId,
    pub quest_id: QuestId,
    pub discount_code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub redeemed: bool,
    pub expired: bool,
}

impl CustomerRewardView {
    pub fn build(redemption: &Redemption, now: DateTime<Utc>) -> Self {
        Self {
            id: redemption.id,
            quest_id: redemption.quest_id,
            discount_code: redemption.discount_code.clone(),
            issued_at: redemption.issued_at,
            expires_at: redemption.expires_at,
            redeemed: redemption.is_redeemed(),
            expired: redemption.is_expired(now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsView {
    pub queue: &'static str,
    #[serde(flatten)]
    pub stats: JobStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJobView {
    pub id: JobId,
    pub name: String,
    pub attempts: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl From<DeadLetterEntry> for FailedJobView {
    fn from(entry: DeadLetterEntry) -> Self {
        Self {
            id: entry.job.id,
            name: entry.job.name,
            attempts: entry.job.attempt,
            reason: entry.reason,
            failed_at: entry.dead_lettered_at,
            created_at: entry.job.created_at,
            payload: entry.job.payload,
        }
    }
}

// -------------------------
// Mapping helpers
// -------------------------

pub fn describe_reward(config: &RewardConfig) -> String {
    match config {
        RewardConfig::DiscountPercentage(c) => format!("{}% off your next order", c.percentage.normalize()),
        RewardConfig::DiscountFixed(c) => format!("{} {} off your next order", c.amount.normalize(), c.currency),
        RewardConfig::FreeShipping(_) => "Free shipping on your next order".to_string(),
        RewardConfig::Custom(c) => c.title.clone(),
    }
}
