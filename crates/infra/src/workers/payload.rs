//! Job payloads as they sit on the queues.

use serde::{Deserialize, Serialize};

use questline_core::{CustomerId, QuestId, RewardId, ShopId};
use questline_quests::OrderEvent;

pub const PROCESS_ORDER_JOB: &str = "process-order";
pub const ISSUE_REWARD_JOB: &str = "issue-reward";

/// `{ shopId, order }` on the order-processing queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderJob {
    pub shop_id: ShopId,
    pub order: OrderEvent,
}

/// `{ shopId, questId, customerId, rewardId }` on the reward-issuance queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardJob {
    pub shop_id: ShopId,
    pub quest_id: QuestId,
    pub customer_id: CustomerId,
    pub reward_id: RewardId,
}
