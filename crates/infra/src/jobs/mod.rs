//! Durable job queue with retry, backoff, retention and dead-letter handling.
//!
//! ## Components
//!
//! - `Job`: queued unit of work with payload, attempts and history
//! - `JobStore`: persistence for jobs, in memory or in redb
//! - `JobQueue`: producer handle applying each queue's retry policy
//! - `JobExecutor`: bounded worker pool consuming one queue
//!
//! Delivery is at-least-once: a job whose worker fails is delivered again
//! after backoff, so handlers must be idempotent.

pub mod executor;
pub mod queue;
pub mod redb_store;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use queue::{EnqueueError, JobQueue};
pub use redb_store::RedbJobStore;
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobId, JobResult, JobStatus, QueueName, RetentionPolicy,
    RetryPolicy,
};
