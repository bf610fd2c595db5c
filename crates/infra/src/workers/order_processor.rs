//! Order-processing worker.
//!
//! Evaluates one order against every live quest of its shop. Quests are
//! processed independently: one quest failing is recorded in the report and
//! never stops its siblings. The job as a whole fails (and is retried) only
//! when it could not do anything useful.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use questline_core::{CustomerId, OrderId, QuestId, ShopId};
use questline_quests::{EvaluationError, IncrementOutcome, OrderEvent, ProgressKey, ProgressStatus, Quest};

use crate::jobs::{Job, JobResult, QueueName};
use crate::store::StoreError;

use super::{Disposition, ISSUE_REWARD_JOB, OrderJob, RewardJob, WorkerContext};

#[derive(Debug, thiserror::Error)]
pub enum OrderJobError {
    #[error("invalid order job payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("could not load quests: {0}")]
    Quests(StoreError),
    #[error("all {0} quests failed")]
    AllQuestsFailed(usize),
    #[error("reward job not enqueued for quest {quest_id}: {error}")]
    RewardEnqueue { quest_id: QuestId, error: String },
}

impl OrderJobError {
    pub fn disposition(&self) -> Disposition {
        match self {
            OrderJobError::Payload(_) => Disposition::Park,
            OrderJobError::Quests(_)
            | OrderJobError::AllQuestsFailed(_)
            | OrderJobError::RewardEnqueue { .. } => Disposition::Retry,
        }
    }
}

/// Failure of a single quest; isolated to that quest.
#[derive(Debug, thiserror::Error)]
enum QuestError {
    #[error("quest has no condition")]
    NoCondition,
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum QuestOutcome {
    Counted {
        increment: u64,
        current_value: u64,
        target_value: u64,
        completed: bool,
    },
    /// Evaluated to zero.
    NotCounted,
    /// This order was already counted for the quest.
    Duplicate,
    /// Progress was already completed or rewarded.
    Finished,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestResult {
    pub quest_id: QuestId,
    #[serde(flatten)]
    pub outcome: QuestOutcome,
}

impl QuestResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, QuestOutcome::Failed { .. })
    }
}

/// Stored as the job result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReport {
    pub order_id: OrderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    pub results: Vec<QuestResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub completed: usize,
    pub rewards_enqueued: usize,
    pub redeemed_codes: Vec<String>,
}

impl OrderReport {
    fn skipped(order_id: OrderId, reason: &str) -> Self {
        Self {
            order_id,
            skipped: Some(reason.to_string()),
            results: Vec::new(),
            succeeded: 0,
            failed: 0,
            completed: 0,
            rewards_enqueued: 0,
            redeemed_codes: Vec::new(),
        }
    }
}

struct QuestStep {
    result: QuestResult,
    /// Reward job to enqueue for this quest.
    reward_due: bool,
}

pub struct OrderProcessor {
    ctx: WorkerContext,
}

impl OrderProcessor {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    /// Job handler entry point.
    pub fn handle(&self, job: &Job) -> JobResult {
        let result = serde_json::from_value::<OrderJob>(job.payload.clone())
            .map_err(OrderJobError::from)
            .and_then(|payload| self.process(&payload, Utc::now()));

        match result {
            Ok(report) => match serde_json::to_value(&report) {
                Ok(value) => JobResult::Success(value),
                Err(e) => JobResult::Fatal(e.to_string()),
            },
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "order job failed");
                e.disposition().into_job_result(e.to_string())
            }
        }
    }

    pub fn process(&self, job: &OrderJob, now: DateTime<Utc>) -> Result<OrderReport, OrderJobError> {
        let shop_id = job.shop_id;
        let order = &job.order;

        let Some(customer_id) = order.customer_id() else {
            info!(shop_id = %shop_id, order_id = %order.id, "order has no customer, skipped");
            return Ok(OrderReport::skipped(order.id.clone(), "no customer"));
        };

        let quests = self
            .ctx
            .quests
            .active_quests(shop_id, now)
            .map_err(OrderJobError::Quests)?;
        debug!(shop_id = %shop_id, order_id = %order.id, quests = quests.len(), "evaluating order");

        let mut results = Vec::with_capacity(quests.len());
        let mut enqueue_failure = None;
        let mut rewards_enqueued = 0;

        for quest in &quests {
            let step = match self.process_quest(shop_id, quest, customer_id, order, now) {
                Ok(step) => step,
                Err(e) => {
                    warn!(shop_id = %shop_id, quest_id = %quest.id, order_id = %order.id, error = %e, "quest evaluation failed");
                    QuestStep {
                        result: QuestResult {
                            quest_id: quest.id,
                            outcome: QuestOutcome::Failed { error: e.to_string() },
                        },
                        reward_due: false,
                    }
                }
            };

            if step.reward_due {
                match self.enqueue_reward(shop_id, quest, customer_id) {
                    Ok(true) => rewards_enqueued += 1,
                    Ok(false) => {}
                    Err(error) => {
                        warn!(shop_id = %shop_id, quest_id = %quest.id, error = %error, "reward job not enqueued");
                        enqueue_failure.get_or_insert(OrderJobError::RewardEnqueue {
                            quest_id: quest.id,
                            error,
                        });
                    }
                }
            }
            results.push(step.result);
        }

        let redeemed_codes = self.record_redemptions(shop_id, order, now);

        let failed = results.iter().filter(|r| r.is_failure()).count();
        let completed = results
            .iter()
            .filter(|r| matches!(r.outcome, QuestOutcome::Counted { completed: true, .. }))
            .count();

        if let Some(err) = enqueue_failure {
            return Err(err);
        }
        if failed > 0 && failed == results.len() {
            return Err(OrderJobError::AllQuestsFailed(failed));
        }

        info!(
            shop_id = %shop_id,
            order_id = %order.id,
            quests = results.len(),
            completed,
            failed,
            "order processed"
        );

        Ok(OrderReport {
            order_id: order.id.clone(),
            skipped: None,
            succeeded: results.len() - failed,
            results,
            failed,
            completed,
            rewards_enqueued,
            redeemed_codes,
        })
    }

    fn process_quest(
        &self,
        shop_id: ShopId,
        quest: &Quest,
        customer_id: &CustomerId,
        order: &OrderEvent,
        now: DateTime<Utc>,
    ) -> Result<QuestStep, QuestError> {
        let condition = quest.primary_condition().ok_or(QuestError::NoCondition)?;
        let target = self.ctx.evaluators.target_value(&condition.config)?;
        let key = ProgressKey::new(shop_id, quest.id, customer_id.clone());

        let progress = self.ctx.progress.get_or_create_progress(&key, target, now)?;
        if progress.status.is_finished() {
            // A redelivered completing order re-enqueues its reward; issuance dedups.
            let reward_due = progress.status == ProgressStatus::Completed && progress.completed_by(&order.id);
            return Ok(QuestStep {
                result: QuestResult {
                    quest_id: quest.id,
                    outcome: QuestOutcome::Finished,
                },
                reward_due,
            });
        }

        let evaluator = self.ctx.evaluators.get(condition.config.condition_type())?;
        let increment = evaluator.evaluate(order, &condition.config, &progress, now)?;
        if increment == 0 {
            return Ok(QuestStep {
                result: QuestResult {
                    quest_id: quest.id,
                    outcome: QuestOutcome::NotCounted,
                },
                reward_due: false,
            });
        }

        let update = self.ctx.progress.apply_increment(&key, &order.id, increment, now, &|current, target| {
            evaluator.is_completed(current, target)
        })?;
        let redelivered_completion =
            update.progress.status == ProgressStatus::Completed && update.progress.completed_by(&order.id);

        let (outcome, reward_due) = match update.outcome {
            IncrementOutcome::Applied { newly_completed } => {
                if newly_completed {
                    info!(
                        shop_id = %shop_id,
                        quest_id = %quest.id,
                        customer_id = %customer_id,
                        order_id = %order.id,
                        "quest completed"
                    );
                }
                (
                    QuestOutcome::Counted {
                        increment,
                        current_value: update.progress.current_value,
                        target_value: update.progress.target_value,
                        completed: newly_completed,
                    },
                    newly_completed,
                )
            }
            IncrementOutcome::NoIncrement => (QuestOutcome::NotCounted, false),
            IncrementOutcome::DuplicateOrder => (QuestOutcome::Duplicate, redelivered_completion),
            IncrementOutcome::AlreadyFinished => (QuestOutcome::Finished, redelivered_completion),
        };

        Ok(QuestStep {
            result: QuestResult {
                quest_id: quest.id,
                outcome,
            },
            reward_due,
        })
    }

    /// Ok(false) when the quest carries no reward.
    fn enqueue_reward(&self, shop_id: ShopId, quest: &Quest, customer_id: &CustomerId) -> Result<bool, String> {
        let Some(reward) = quest.first_reward() else {
            warn!(shop_id = %shop_id, quest_id = %quest.id, "completed quest has no reward");
            return Ok(false);
        };

        let payload = RewardJob {
            shop_id,
            quest_id: quest.id,
            customer_id: customer_id.clone(),
            reward_id: reward.id,
        };
        let job_id = self
            .ctx
            .queue
            .enqueue(QueueName::RewardIssuance, ISSUE_REWARD_JOB, &payload)
            .map_err(|e| e.to_string())?;
        info!(shop_id = %shop_id, quest_id = %quest.id, job_id = %job_id, "reward job enqueued");
        Ok(true)
    }

    /// Attach paid orders to the redemptions whose codes they used.
    fn record_redemptions(&self, shop_id: ShopId, order: &OrderEvent, now: DateTime<Utc>) -> Vec<String> {
        if !order.is_paid() {
            return Vec::new();
        }

        let mut redeemed = Vec::new();
        for discount in &order.discount_codes {
            match self.ctx.redemptions.mark_redeemed(shop_id, &discount.code, &order.id, now) {
                Ok(Some(r)) if r.redeemed_order_id.as_ref() == Some(&order.id) => {
                    debug!(shop_id = %shop_id, code = %r.discount_code, order_id = %order.id, "discount redeemed");
                    redeemed.push(r.discount_code);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(shop_id = %shop_id, code = %discount.code, error = %e, "could not record redemption");
                }
            }
        }
        redeemed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_payload_is_parked() {
        let err = OrderJobError::from(serde_json::from_str::<OrderJob>("{}").unwrap_err());
        assert_eq!(err.disposition(), Disposition::Park);
        assert_eq!(
            OrderJobError::Quests(StoreError::Unavailable("db".into())).disposition(),
            Disposition::Retry
        );
        assert_eq!(OrderJobError::AllQuestsFailed(2).disposition(), Disposition::Retry);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let result = QuestResult {
            quest_id: QuestId::new(),
            outcome: QuestOutcome::Counted {
                increment: 1,
                current_value: 2,
                target_value: 3,
                completed: false,
            },
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["outcome"], "counted");
        assert_eq!(value["currentValue"], 2);
        assert!(value.get("questId").is_some());
    }
}
