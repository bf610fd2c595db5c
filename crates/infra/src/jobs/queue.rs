//! Producer-side handle: serialize a payload and enqueue it under the
//! queue's retry policy.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::QueueSettings;

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobId, QueueName};

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("payload could not be serialized: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Cheap to clone; shared by webhooks and workers.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    settings: Arc<QueueSettings>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, settings: QueueSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn enqueue<P: Serialize>(&self, queue: QueueName, name: &str, payload: &P) -> Result<JobId, EnqueueError> {
        let payload = serde_json::to_value(payload)?;
        let policy = self.settings.for_queue(queue).retry.clone();
        let job = Job::new(queue, name, payload).with_retry_policy(policy);
        let id = self.store.enqueue(job)?;
        debug!(job_id = %id, queue = %queue, name, "job enqueued");
        Ok(id)
    }
}

impl core::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobQueue").field("settings", &self.settings).finish_non_exhaustive()
    }
}
