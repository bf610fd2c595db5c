//! Queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::jobs::{QueueName, RetentionPolicy, RetryPolicy};

/// Behaviour of one queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Jobs processed in parallel.
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub retention: RetentionPolicy,
}

impl QueueOptions {
    fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            poll_interval: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            retention: RetentionPolicy::default(),
        }
    }
}

/// Settings for both pipeline queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub order: QueueOptions,
    pub reward: QueueOptions,
}

impl Default for QueueSettings {
    /// Orders: 5 in parallel. Rewards: 3. Both: 3 attempts, 1s exponential backoff.
    fn default() -> Self {
        Self {
            order: QueueOptions::with_concurrency(5),
            reward: QueueOptions::with_concurrency(3),
        }
    }
}

impl QueueSettings {
    pub fn for_queue(&self, queue: QueueName) -> &QueueOptions {
        match queue {
            QueueName::OrderProcessing => &self.order,
            QueueName::RewardIssuance => &self.reward,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.order.poll_interval = interval;
        self.reward.poll_interval = interval;
        self
    }

    /// Same retry policy on both queues.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.order.retry = retry.clone();
        self.reward.retry = retry;
        self
    }
}
