//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::types::{DeadLetterEntry, Job, JobId, JobStatus, QueueName, RetentionPolicy};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    /// Enqueue a new job.
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Get a job by ID.
    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Update a job.
    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest ready job of `queue`, marking it running.
    /// Returns None if no jobs are available.
    fn claim_next(&self, queue: QueueName) -> Result<Option<Job>, JobStoreError>;

    /// List jobs of a queue, optionally filtered by status variant.
    fn list_by_status(
        &self,
        queue: QueueName,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job to the dead-letter set.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    /// List dead-lettered jobs, oldest first.
    fn list_dead_letters(&self, queue: QueueName, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Retry a dead-lettered job (reset attempts, back to pending).
    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    /// Delete a dead-lettered job.
    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError>;

    /// Drop finished jobs that fall outside `retention`. Returns how many were removed.
    fn prune(&self, queue: QueueName, retention: &RetentionPolicy, now: DateTime<Utc>) -> Result<usize, JobStoreError>;

    /// Get job statistics.
    fn stats(&self, queue: QueueName) -> Result<JobStats, JobStoreError>;
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, queue: QueueName) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(queue)
    }

    fn list_by_status(
        &self,
        queue: QueueName,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_status(queue, status, limit)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(&self, queue: QueueName, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(queue, limit)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(job_id)
    }

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).delete_dead_letter(job_id)
    }

    fn prune(&self, queue: QueueName, retention: &RetentionPolicy, now: DateTime<Utc>) -> Result<usize, JobStoreError> {
        (**self).prune(queue, retention, now)
    }

    fn stats(&self, queue: QueueName) -> Result<JobStats, JobStoreError> {
        (**self).stats(queue)
    }
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Per-queue counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub waiting: usize,
    pub active: usize,
    pub delayed: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn total(&self) -> usize {
        self.waiting + self.active + self.delayed + self.completed + self.failed
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
}

fn poisoned<T>(_: T) -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn jobs(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.read().map_err(poisoned)
    }

    fn jobs_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.write().map_err(poisoned)
    }

    fn dead_letters(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobStoreError> {
        self.dead_letters.read().map_err(poisoned)
    }

    fn dead_letters_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobStoreError> {
        self.dead_letters.write().map_err(poisoned)
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        if let Some(job) = self.jobs()?.get(&job_id) {
            return Ok(Some(job.clone()));
        }
        Ok(self.dead_letters()?.get(&job_id).map(|e| e.job.clone()))
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn claim_next(&self, queue: QueueName) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let now = Utc::now();

        // Oldest ready job first (FIFO); the write lock makes the claim exclusive.
        let next = jobs
            .values()
            .filter(|j| {
                j.queue == queue
                    && matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. })
                    && j.is_ready_at(now)
            })
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running();
                job.clone()
            })
        }))
    }

    fn list_by_status(
        &self,
        queue: QueueName,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs()?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| {
                j.queue == queue
                    && status
                        .as_ref()
                        .is_none_or(|s| std::mem::discriminant(&j.status) == std::mem::discriminant(s))
            })
            .cloned()
            .collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let mut dls = self.dead_letters_mut()?;

        if !matches!(job.status, JobStatus::DeadLettered { .. }) {
            job.status = JobStatus::DeadLettered {
                error: reason.clone(),
                attempts: job.attempt,
            };
            job.updated_at = Utc::now();
        }

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));

        Ok(())
    }

    fn list_dead_letters(&self, queue: QueueName, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters()?;
        let mut result: Vec<_> = dls.values().filter(|e| e.job.queue == queue).cloned().collect();

        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let mut dls = self.dead_letters_mut()?;

        let entry = dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;

        let mut job = entry.job;
        job.reset_for_replay();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        self.dead_letters_mut()?
            .remove(&job_id)
            .map(|_| ())
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn prune(&self, queue: QueueName, retention: &RetentionPolicy, now: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let completed_cutoff = now - chrono::Duration::from_std(retention.completed_max_age).unwrap_or_default();
        let failed_cutoff = now - chrono::Duration::from_std(retention.failed_max_age).unwrap_or_default();
        let mut removed = 0;

        {
            let mut jobs = self.jobs_mut()?;
            let before = jobs.len();
            jobs.retain(|_, j| {
                !(j.queue == queue
                    && j.status == JobStatus::Completed
                    && j.finished_at.unwrap_or(j.updated_at) < completed_cutoff)
            });

            // Keep only the newest `completed_max_count` completed jobs.
            let mut completed: Vec<_> = jobs
                .values()
                .filter(|j| j.queue == queue && j.status == JobStatus::Completed)
                .map(|j| (j.finished_at.unwrap_or(j.updated_at), j.id))
                .collect();
            if completed.len() > retention.completed_max_count {
                completed.sort_unstable_by(|a, b| b.0.cmp(&a.0));
                for (_, id) in completed.split_off(retention.completed_max_count) {
                    jobs.remove(&id);
                }
            }
            removed += before - jobs.len();
        }

        let mut dls = self.dead_letters_mut()?;
        let before = dls.len();
        dls.retain(|_, e| !(e.job.queue == queue && e.dead_lettered_at < failed_cutoff));
        removed += before - dls.len();

        Ok(removed)
    }

    fn stats(&self, queue: QueueName) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs()?;
        let dls = self.dead_letters()?;
        let now = Utc::now();

        let mut stats = JobStats::default();

        for job in jobs.values().filter(|j| j.queue == queue) {
            match &job.status {
                JobStatus::Running => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::DeadLettered { .. } => stats.failed += 1,
                JobStatus::Pending | JobStatus::Failed { .. } if job.is_delayed_at(now) => stats.delayed += 1,
                JobStatus::Pending | JobStatus::Failed { .. } => stats.waiting += 1,
            }
        }

        stats.failed += dls.values().filter(|e| e.job.queue == queue).count();

        Ok(stats)
    }
}
