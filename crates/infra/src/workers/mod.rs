//! Pipeline workers and their pools.
//!
//! - `OrderProcessor`: consumes `process-order` jobs, updates progress and
//!   enqueues reward jobs for completed quests
//! - `RewardWorker`: consumes `issue-reward` jobs and issues discounts at most
//!   once per (shop, quest, reward, customer)
//!
//! Both run on `JobExecutor` pools sized by `QueueSettings`.

pub mod context;
pub mod order_processor;
pub mod payload;
pub mod reward_worker;

pub use context::WorkerContext;
pub use order_processor::{OrderJobError, OrderProcessor, OrderReport, QuestOutcome, QuestResult};
pub use payload::{ISSUE_REWARD_JOB, OrderJob, PROCESS_ORDER_JOB, RewardJob};
pub use reward_worker::{RewardJobError, RewardOutcome, RewardWorker};

use std::sync::Arc;

use tracing::info;

use crate::jobs::{
    ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobResult, JobStore, QueueName,
};

/// How a failed job is treated by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Retried under the queue's backoff policy.
    Retry,
    /// Parked in the failed set without further attempts.
    Park,
}

impl Disposition {
    pub fn into_job_result(self, error: String) -> JobResult {
        match self {
            Disposition::Retry => JobResult::Retry(error),
            Disposition::Park => JobResult::Fatal(error),
        }
    }
}

/// Executor for the order-processing queue with its handler registered.
pub fn order_executor(ctx: &WorkerContext) -> JobExecutor<Arc<dyn JobStore>> {
    let mut executor = JobExecutor::new(ctx.queue.store().clone(), QueueName::OrderProcessing);
    let processor = OrderProcessor::new(ctx.clone());
    executor.register_handler(PROCESS_ORDER_JOB, move |job| processor.handle(job));
    executor
}

/// Executor for the reward-issuance queue with its handler registered.
pub fn reward_executor(ctx: &WorkerContext) -> JobExecutor<Arc<dyn JobStore>> {
    let mut executor = JobExecutor::new(ctx.queue.store().clone(), QueueName::RewardIssuance);
    let worker = RewardWorker::new(ctx.clone());
    executor.register_handler(ISSUE_REWARD_JOB, move |job| worker.handle(job));
    executor
}

/// Both worker pools, running.
pub struct WorkerPools {
    order: JobExecutorHandle,
    reward: JobExecutorHandle,
}

impl WorkerPools {
    pub fn spawn(ctx: &WorkerContext) -> std::io::Result<Self> {
        let settings = ctx.queue.settings();
        let config_for = |queue: QueueName| {
            let options = settings.for_queue(queue);
            JobExecutorConfig::default()
                .with_name(queue.as_str())
                .with_max_concurrent(options.concurrency)
                .with_poll_interval(options.poll_interval)
                .with_retention(options.retention.clone())
        };

        let order = order_executor(ctx).spawn(config_for(QueueName::OrderProcessing))?;
        let reward = match reward_executor(ctx).spawn(config_for(QueueName::RewardIssuance)) {
            Ok(handle) => handle,
            Err(e) => {
                order.shutdown();
                return Err(e);
            }
        };

        info!(
            order_concurrency = settings.order.concurrency,
            reward_concurrency = settings.reward.concurrency,
            "worker pools started"
        );
        Ok(Self { order, reward })
    }

    /// (order-processing, reward-issuance)
    pub fn stats(&self) -> (ExecutorStats, ExecutorStats) {
        (self.order.stats(), self.reward.stats())
    }

    /// Stop claiming jobs and wait for in-flight ones.
    pub fn shutdown(self) {
        self.order.shutdown();
        self.reward.shutdown();
        info!("worker pools stopped");
    }
}
