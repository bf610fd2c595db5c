//! redb-backed job store.
//!
//! Live jobs sit in `jobs`, parked ones in `dead_letters`, both keyed by job
//! id with JSON values. Claims run inside a write transaction, so two workers
//! never receive the same job.
//!
//! A job found `Running` when the store opens belonged to a process that
//! stopped mid-attempt. It is failed with the usual retry accounting: it is
//! either scheduled again or parked.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::store::{JobStats, JobStore, JobStoreError};
use super::types::{DeadLetterEntry, Job, JobId, JobStatus, QueueName, RetentionPolicy};
use crate::database::from_redb_errors;

type Records = TableDefinition<'static, &'static str, &'static [u8]>;

const JOBS: Records = TableDefinition::new("jobs");
const DEAD_LETTERS: Records = TableDefinition::new("dead_letters");

const INTERRUPTED: &str = "interrupted by restart";

from_redb_errors!(JobStoreError, Storage);

impl From<serde_json::Error> for JobStoreError {
    fn from(err: serde_json::Error) -> Self {
        JobStoreError::Storage(format!("corrupt job record: {err}"))
    }
}

fn load<T, R>(table: &R, key: &str) -> Result<Option<T>, JobStoreError>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    table
        .get(key)?
        .map(|guard| serde_json::from_slice(guard.value()).map_err(JobStoreError::from))
        .transpose()
}

fn put<T: Serialize>(table: &mut Table<'_, &'static str, &'static [u8]>, key: &str, value: &T) -> Result<(), JobStoreError> {
    let bytes = serde_json::to_vec(value)?;
    table.insert(key, bytes.as_slice())?;
    Ok(())
}

fn all<T, R>(table: &R) -> Result<Vec<T>, JobStoreError>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        records.push(serde_json::from_slice(value.value())?);
    }
    Ok(records)
}

fn park(dead_letters: &mut Table<'_, &'static str, &'static [u8]>, mut job: Job, reason: String) -> Result<(), JobStoreError> {
    if !matches!(job.status, JobStatus::DeadLettered { .. }) {
        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();
    }
    let id = job.id.to_string();
    put(dead_letters, &id, &DeadLetterEntry::new(job, reason))
}

#[derive(Clone)]
pub struct RedbJobStore {
    db: Arc<Database>,
}

impl RedbJobStore {
    /// Wrap `db`, creating the tables and recovering interrupted jobs.
    pub fn new(db: Arc<Database>) -> Result<Self, JobStoreError> {
        let store = Self { db };
        let recovered = store.write(|txn| {
            let mut jobs = txn.open_table(JOBS)?;
            let mut dead_letters = txn.open_table(DEAD_LETTERS)?;

            let interrupted: Vec<Job> = all::<Job, _>(&jobs)?
                .into_iter()
                .filter(|job| job.status == JobStatus::Running)
                .collect();
            for mut job in interrupted.iter().cloned() {
                let id = job.id.to_string();
                job.mark_failed(INTERRUPTED.to_string(), job.updated_at);
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    jobs.remove(id.as_str())?;
                    park(&mut dead_letters, job, INTERRUPTED.to_string())?;
                } else {
                    put(&mut jobs, &id, &job)?;
                }
            }
            Ok(interrupted.len())
        })?;
        if recovered > 0 {
            warn!(recovered, "jobs interrupted by a restart were failed for retry");
        }
        Ok(store)
    }

    pub fn arc(db: Arc<Database>) -> Result<Arc<Self>, JobStoreError> {
        Self::new(db).map(Arc::new)
    }

    /// Run `op` in a write transaction, committing only if it succeeds.
    fn write<T>(&self, op: impl FnOnce(&WriteTransaction) -> Result<T, JobStoreError>) -> Result<T, JobStoreError> {
        let txn = self.db.begin_write()?;
        let value = op(&txn)?;
        txn.commit()?;
        Ok(value)
    }

    fn read_all<T: DeserializeOwned>(&self, table: Records) -> Result<Vec<T>, JobStoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table)?;
        all(&table)
    }
}

impl core::fmt::Debug for RedbJobStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedbJobStore").finish_non_exhaustive()
    }
}

impl JobStore for RedbJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        self.write(|txn| {
            let mut jobs = txn.open_table(JOBS)?;
            let id = job.id.to_string();
            if jobs.get(id.as_str())?.is_some() {
                return Err(JobStoreError::AlreadyExists(job.id));
            }
            put(&mut jobs, &id, &job)?;
            Ok(job.id)
        })
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let txn = self.db.begin_read()?;
        let id = job_id.to_string();
        if let Some(job) = load::<Job, _>(&txn.open_table(JOBS)?, &id)? {
            return Ok(Some(job));
        }
        Ok(load::<DeadLetterEntry, _>(&txn.open_table(DEAD_LETTERS)?, &id)?.map(|entry| entry.job))
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        self.write(|txn| {
            let mut jobs = txn.open_table(JOBS)?;
            let id = job.id.to_string();
            if jobs.get(id.as_str())?.is_none() {
                return Err(JobStoreError::NotFound(job.id));
            }
            put(&mut jobs, &id, job)
        })
    }

    fn claim_next(&self, queue: QueueName) -> Result<Option<Job>, JobStoreError> {
        let now = Utc::now();
        self.write(|txn| {
            let mut jobs = txn.open_table(JOBS)?;
            let next = all::<Job, _>(&jobs)?
                .into_iter()
                .filter(|j| {
                    j.queue == queue
                        && matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. })
                        && j.is_ready_at(now)
                })
                .min_by_key(|j| (j.created_at, j.id.0));

            let Some(mut job) = next else {
                return Ok(None);
            };
            job.mark_running();
            put(&mut jobs, &job.id.to_string(), &job)?;
            Ok(Some(job))
        })
    }

    fn list_by_status(
        &self,
        queue: QueueName,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let mut result: Vec<Job> = self
            .read_all::<Job>(JOBS)?
            .into_iter()
            .filter(|j| {
                j.queue == queue
                    && status
                        .as_ref()
                        .is_none_or(|s| std::mem::discriminant(&j.status) == std::mem::discriminant(s))
            })
            .collect();
        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        self.write(|txn| {
            let mut jobs = txn.open_table(JOBS)?;
            let mut dead_letters = txn.open_table(DEAD_LETTERS)?;
            jobs.remove(job.id.to_string().as_str())?;
            park(&mut dead_letters, job, reason)
        })
    }

    fn list_dead_letters(&self, queue: QueueName, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let mut result: Vec<DeadLetterEntry> = self
            .read_all::<DeadLetterEntry>(DEAD_LETTERS)?
            .into_iter()
            .filter(|e| e.job.queue == queue)
            .collect();
        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        self.write(|txn| {
            let mut jobs = txn.open_table(JOBS)?;
            let mut dead_letters = txn.open_table(DEAD_LETTERS)?;
            let id = job_id.to_string();
            let entry = load::<DeadLetterEntry, _>(&dead_letters, &id)?.ok_or(JobStoreError::NotFound(job_id))?;
            dead_letters.remove(id.as_str())?;

            let mut job = entry.job;
            job.reset_for_replay();
            put(&mut jobs, &id, &job)?;
            Ok(job)
        })
    }

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        self.write(|txn| {
            let mut dead_letters = txn.open_table(DEAD_LETTERS)?;
            let removed = dead_letters.remove(job_id.to_string().as_str())?.is_some();
            if removed { Ok(()) } else { Err(JobStoreError::NotFound(job_id)) }
        })
    }

    fn prune(&self, queue: QueueName, retention: &RetentionPolicy, now: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let completed_cutoff = now - chrono::Duration::from_std(retention.completed_max_age).unwrap_or_default();
        let failed_cutoff = now - chrono::Duration::from_std(retention.failed_max_age).unwrap_or_default();

        self.write(|txn| {
            let mut jobs = txn.open_table(JOBS)?;
            let mut dead_letters = txn.open_table(DEAD_LETTERS)?;

            let mut completed: Vec<(DateTime<Utc>, JobId)> = all::<Job, _>(&jobs)?
                .into_iter()
                .filter(|j| j.queue == queue && j.status == JobStatus::Completed)
                .map(|j| (j.finished_at.unwrap_or(j.updated_at), j.id))
                .collect();
            // Newest first; everything past the count limit or the age cutoff goes.
            completed.sort_unstable_by(|a, b| b.0.cmp(&a.0));
            let doomed: Vec<JobId> = completed
                .iter()
                .enumerate()
                .filter(|(rank, (finished, _))| *rank >= retention.completed_max_count || *finished < completed_cutoff)
                .map(|(_, (_, id))| *id)
                .collect();
            for id in &doomed {
                jobs.remove(id.to_string().as_str())?;
            }

            let expired: Vec<JobId> = all::<DeadLetterEntry, _>(&dead_letters)?
                .into_iter()
                .filter(|e| e.job.queue == queue && e.dead_lettered_at < failed_cutoff)
                .map(|e| e.job.id)
                .collect();
            for id in &expired {
                dead_letters.remove(id.to_string().as_str())?;
            }

            Ok(doomed.len() + expired.len())
        })
    }

    fn stats(&self, queue: QueueName) -> Result<JobStats, JobStoreError> {
        let txn = self.db.begin_read()?;
        let jobs: Vec<Job> = all(&txn.open_table(JOBS)?)?;
        let dead_letters: Vec<DeadLetterEntry> = all(&txn.open_table(DEAD_LETTERS)?)?;
        let now = Utc::now();

        let mut stats = JobStats::default();
        for job in jobs.iter().filter(|j| j.queue == queue) {
            match &job.status {
                JobStatus::Running => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::DeadLettered { .. } => stats.failed += 1,
                JobStatus::Pending | JobStatus::Failed { .. } if job.is_delayed_at(now) => stats.delayed += 1,
                JobStatus::Pending | JobStatus::Failed { .. } => stats.waiting += 1,
            }
        }
        stats.failed += dead_letters.iter().filter(|e| e.job.queue == queue).count();
        Ok(stats)
    }
}
