//! Reward-issuance worker.
//!
//! Check-then-write: an existing redemption for the key short-circuits the
//! job, and a redemption is persisted only after the platform returned a
//! code. A retried job therefore never issues twice once the first issuance
//! was recorded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use questline_core::{CustomerId, QuestId, RedemptionId};
use questline_quests::{
    NewRedemption, ProgressKey, ProgressStatus, Redemption, RedemptionKey, RewardType, expiry_after,
};

use crate::issuer::{DiscountSeed, IssuanceError};
use crate::jobs::{Job, JobResult};
use crate::store::{RedemptionInsert, StoreError};

use super::{Disposition, RewardJob, WorkerContext};

#[derive(Debug, thiserror::Error)]
pub enum RewardJobError {
    #[error("invalid reward job payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("shop {0} is uninstalled")]
    ShopUninstalled(String),
    #[error("progress is {0:?}, not eligible for a reward")]
    NotEligible(ProgressStatus),
    #[error("no issuer registered for {0}")]
    NoIssuer(RewardType),
    #[error("expiry of {0} days is out of range")]
    ExpiryOutOfRange(u32),
    #[error(transparent)]
    Issuance(#[from] IssuanceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RewardJobError {
    pub fn disposition(&self) -> Disposition {
        match self {
            RewardJobError::Issuance(e) if e.is_retryable() => Disposition::Retry,
            RewardJobError::Store(e) if e.is_transient() => Disposition::Retry,
            _ => Disposition::Park,
        }
    }
}

/// Stored as the job result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardOutcome {
    pub redemption_id: RedemptionId,
    pub discount_code: String,
    pub expires_at: DateTime<Utc>,
    /// False when an earlier delivery already issued the code.
    pub newly_issued: bool,
}

impl RewardOutcome {
    fn from_redemption(redemption: &Redemption, newly_issued: bool) -> Self {
        Self {
            redemption_id: redemption.id,
            discount_code: redemption.discount_code.clone(),
            expires_at: redemption.expires_at,
            newly_issued,
        }
    }
}

pub struct RewardWorker {
    ctx: WorkerContext,
}

impl RewardWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    /// Job handler entry point.
    pub fn handle(&self, job: &Job) -> JobResult {
        let result = serde_json::from_value::<RewardJob>(job.payload.clone())
            .map_err(RewardJobError::from)
            .and_then(|payload| self.process(&payload, Utc::now()));

        match result {
            Ok(outcome) => match serde_json::to_value(&outcome) {
                Ok(value) => JobResult::Success(value),
                Err(e) => JobResult::Fatal(e.to_string()),
            },
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "reward job failed");
                e.disposition().into_job_result(e.to_string())
            }
        }
    }

    pub fn process(&self, job: &RewardJob, now: DateTime<Utc>) -> Result<RewardOutcome, RewardJobError> {
        let redemption_key = RedemptionKey {
            shop_id: job.shop_id,
            quest_id: job.quest_id,
            reward_id: job.reward_id,
            customer_id: job.customer_id.clone(),
        };
        let progress_key = ProgressKey::new(job.shop_id, job.quest_id, job.customer_id.clone());

        if let Some(existing) = self.ctx.redemptions.find_redemption(&redemption_key)? {
            info!(
                shop_id = %job.shop_id,
                quest_id = %job.quest_id,
                code = %existing.discount_code,
                "reward already issued"
            );
            // An earlier delivery may have stopped between persist and this transition.
            self.mark_rewarded(&progress_key, job, now)?;
            return Ok(RewardOutcome::from_redemption(&existing, false));
        }

        let shop = self
            .ctx
            .shops
            .find_shop(job.shop_id)?
            .ok_or_else(|| RewardJobError::NotFound(format!("shop {}", job.shop_id)))?;
        if !shop.installed {
            return Err(RewardJobError::ShopUninstalled(shop.domain));
        }

        let quest = self
            .ctx
            .quests
            .get_quest(job.shop_id, job.quest_id)?
            .ok_or_else(|| RewardJobError::NotFound(format!("quest {}", job.quest_id)))?;
        let reward = quest
            .reward(job.reward_id)
            .ok_or_else(|| RewardJobError::NotFound(format!("reward {}", job.reward_id)))?;

        let progress = self
            .ctx
            .progress
            .find_progress(&progress_key)?
            .ok_or_else(|| RewardJobError::NotFound(format!("progress for quest {}", job.quest_id)))?;
        let eligible = match progress.status {
            ProgressStatus::Completed => true,
            ProgressStatus::Rewarded => progress.reward_id == Some(job.reward_id),
            _ => false,
        };
        if !eligible {
            return Err(RewardJobError::NotEligible(progress.status));
        }

        let reward_type = reward.config.reward_type();
        let issuer = self
            .ctx
            .issuers
            .get(reward_type)
            .ok_or(RewardJobError::NoIssuer(reward_type))?;

        let expiry_days = reward.config.expiry_days();
        let expires_at = expiry_after(now, expiry_days).ok_or(RewardJobError::ExpiryOutOfRange(expiry_days))?;
        let mut new = NewRedemption {
            key: redemption_key,
            discount_code: String::new(),
            platform_reference: None,
            issued_at: now,
            expires_at,
        };
        let seed = discount_seed(job.quest_id, &job.customer_id, &new);
        let issued = issuer.create_discount(&shop, &reward.config, &seed)?;
        new.discount_code = issued.code;
        new.platform_reference = issued.platform_reference;

        let (redemption, newly_issued) = match self.ctx.redemptions.create_redemption(new)? {
            RedemptionInsert::Created(r) => (r, true),
            RedemptionInsert::Existing(r) => {
                warn!(
                    shop_id = %job.shop_id,
                    quest_id = %job.quest_id,
                    code = %r.discount_code,
                    "concurrent issuance won; keeping the recorded code"
                );
                (r, false)
            }
        };

        self.mark_rewarded(&progress_key, job, now)?;

        if newly_issued {
            info!(
                shop_id = %job.shop_id,
                quest_id = %job.quest_id,
                customer_id = %job.customer_id,
                code = %redemption.discount_code,
                reward_type = %reward_type,
                expires_at = %redemption.expires_at,
                "reward issued"
            );
        }
        Ok(RewardOutcome::from_redemption(&redemption, newly_issued))
    }

    fn mark_rewarded(&self, key: &ProgressKey, job: &RewardJob, now: DateTime<Utc>) -> Result<(), RewardJobError> {
        match self.ctx.progress.mark_rewarded(key, job.reward_id, now) {
            Ok(_) => Ok(()),
            Err(e) if e.is_transient() => Err(e.into()),
            Err(e) => {
                warn!(shop_id = %job.shop_id, quest_id = %job.quest_id, error = %e, "progress not marked rewarded");
                Ok(())
            }
        }
    }
}

fn discount_seed(quest_id: QuestId, customer_id: &CustomerId, new: &NewRedemption) -> DiscountSeed {
    DiscountSeed {
        quest_id,
        customer_id: customer_id.clone(),
        issued_at: new.issued_at,
        expires_at: new.expires_at,
    }
}
