//! Job executor with retry, backoff and a bounded worker pool.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::store::JobStore;
use super::types::{Job, JobResult, JobStatus, QueueName, RetentionPolicy};

/// Job handler function type.
pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

/// Job executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often idle workers poll for new jobs
    pub poll_interval: Duration,
    /// Worker threads, i.e. jobs in flight at once
    pub max_concurrent: usize,
    /// Name for logging and thread names
    pub name: String,
    pub retention: RetentionPolicy,
    /// How often finished jobs are pruned
    pub prune_interval: Duration,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_concurrent: 1,
            name: "job-executor".to_string(),
            retention: RetentionPolicy::default(),
            prune_interval: Duration::from_secs(60),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }
}

/// Handle to control a running executor pool.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: Arc<AtomicBool>,
    joins: Vec<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for in-flight jobs to finish.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for join in self.joins {
            let _ = join.join();
        }
    }

    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

/// Background job executor for one queue.
///
/// Claims ready jobs from the store, runs them with the handler registered
/// under the job's name, and applies retry, backoff and dead-lettering.
pub struct JobExecutor<S: JobStore> {
    store: S,
    queue: QueueName,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S, queue: QueueName) -> Self {
        Self {
            store,
            queue,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a job name; `*` matches any name.
    pub fn register_handler<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    fn get_handler(&self, name: &str) -> Option<&JobHandler> {
        self.handlers.get(name).or_else(|| self.handlers.get("*"))
    }

    /// Spawn `config.max_concurrent` worker threads.
    pub fn spawn(self, config: JobExecutorConfig) -> std::io::Result<JobExecutorHandle>
    where
        S: Send,
    {
        let executor = Arc::new(self);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let started = Instant::now();

        info!(
            executor = %config.name,
            queue = %executor.queue,
            workers = config.max_concurrent,
            "job executor started"
        );

        let mut joins = Vec::with_capacity(config.max_concurrent);
        for worker in 0..config.max_concurrent {
            let executor = executor.clone();
            let shutdown_flag = shutdown.clone();
            let stats = stats.clone();
            let config = config.clone();
            let spawned = thread::Builder::new()
                .name(format!("{}-{worker}", config.name))
                .spawn(move || worker_loop(&executor, &config, worker, &shutdown_flag, &stats, started));
            match spawned {
                Ok(join) => joins.push(join),
                Err(e) => {
                    // Stop whatever already started before reporting.
                    shutdown.store(true, Ordering::SeqCst);
                    for join in joins {
                        let _ = join.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(JobExecutorHandle { shutdown, joins, stats })
    }

    /// Execute a claimed job and persist its outcome.
    pub fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        let Some(handler) = self.get_handler(&job.name) else {
            let error = format!("no handler for job: {}", job.name);
            warn!(job_id = %job.id, queue = %self.queue, error = %error, "no handler for job");
            job.mark_fatal(error.clone(), Utc::now());
            self.store.update(job).map_err(|e| e.to_string())?;
            self.store.dead_letter(job.clone(), error.clone()).map_err(|e| e.to_string())?;
            return Err(error);
        };

        let started = Utc::now();

        // A panicking handler is a failed delivery; the job still retries and parks.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(job)))
            .unwrap_or_else(|payload| {
                let error = format!("handler panicked: {}", panic_message(payload.as_ref()));
                error!(job_id = %job.id, queue = %self.queue, error = %error, "job handler panicked");
                JobResult::Retry(error)
            });

        match outcome {
            JobResult::Success(output) => {
                job.mark_completed(started, output);
                self.store.update(job).map_err(|e| e.to_string())?;
                debug!(job_id = %job.id, queue = %self.queue, "job completed");
                Ok(())
            }
            JobResult::Retry(error) => {
                job.mark_failed(error.clone(), started);
                self.store.update(job).map_err(|e| e.to_string())?;

                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, queue = %self.queue, error = %error, attempts = job.attempt, "job out of attempts, parked");
                    self.store.dead_letter(job.clone(), error.clone()).map_err(|e| e.to_string())?;
                } else {
                    info!(job_id = %job.id, queue = %self.queue, error = %error, attempt = job.attempt, "job failed, retry scheduled");
                }
                Err(error)
            }
            JobResult::Fatal(error) => {
                job.mark_fatal(error.clone(), started);
                self.store.update(job).map_err(|e| e.to_string())?;
                warn!(job_id = %job.id, queue = %self.queue, error = %error, "job failed permanently, parked");
                self.store.dead_letter(job.clone(), error.clone()).map_err(|e| e.to_string())?;
                Err(error)
            }
        }
    }

    /// Run ready jobs on the calling thread until none is left.
    ///
    /// Jobs waiting out a backoff are not ready and end the run. Returns the
    /// number of jobs executed.
    pub fn run_until_idle(&self) -> Result<usize, String> {
        let mut executed = 0;
        while let Some(mut job) = self.store.claim_next(self.queue).map_err(|e| e.to_string())? {
            let _ = self.execute_one(&mut job);
            executed += 1;
        }
        Ok(executed)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn worker_loop<S: JobStore + 'static>(
    executor: &JobExecutor<S>,
    config: &JobExecutorConfig,
    worker: usize,
    shutdown: &AtomicBool,
    stats: &Mutex<ExecutorStats>,
    started: Instant,
) {
    let mut last_prune = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = started.elapsed().as_secs();
        }

        // One worker owns retention.
        if worker == 0 && last_prune.elapsed() >= config.prune_interval {
            match executor.store.prune(executor.queue, &config.retention, Utc::now()) {
                Ok(0) => {}
                Ok(removed) => debug!(executor = %config.name, removed, "pruned finished jobs"),
                Err(e) => warn!(executor = %config.name, error = %e, "job pruning failed"),
            }
            last_prune = Instant::now();
        }

        match executor.store.claim_next(executor.queue) {
            Ok(Some(mut job)) => {
                debug!(
                    executor = %config.name,
                    job_id = %job.id,
                    name = %job.name,
                    attempt = job.attempt,
                    "claimed job"
                );

                if let Ok(mut s) = stats.lock() {
                    s.current_running += 1;
                }

                let result = executor.execute_one(&mut job);

                if let Ok(mut s) = stats.lock() {
                    s.current_running = s.current_running.saturating_sub(1);
                    s.jobs_processed += 1;
                    match &result {
                        Ok(()) => s.jobs_succeeded += 1,
                        Err(_) => {
                            s.jobs_failed += 1;
                            if matches!(job.status, JobStatus::DeadLettered { .. }) {
                                s.jobs_dead_lettered += 1;
                            }
                        }
                    }
                }
            }
            Ok(None) => thread::sleep(config.poll_interval),
            Err(e) => {
                error!(executor = %config.name, error = %e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    debug!(executor = %config.name, worker, "job worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::RetryPolicy;
    use std::sync::atomic::AtomicUsize;

    fn immediate_retries(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::ZERO)
    }

    #[test]
    fn execute_successful_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone(), QueueName::OrderProcessing);

        executor.register_handler("process-order", |_job| JobResult::Success(serde_json::json!({"ok": 1})));

        let job = Job::new(QueueName::OrderProcessing, "process-order", serde_json::json!({}));
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next(QueueName::OrderProcessing).unwrap().unwrap();
        let result = executor.execute_one(&mut claimed);

        assert!(result.is_ok());
        assert!(matches!(claimed.status, JobStatus::Completed));
        assert_eq!(claimed.result, Some(serde_json::json!({"ok": 1})));
    }

    #[test]
    fn retries_then_parks() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone(), QueueName::RewardIssuance);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        executor.register_handler("issue-reward", move |_job| {
            seen.fetch_add(1, Ordering::SeqCst);
            JobResult::Retry("issuer unavailable".to_string())
        });

        let job = Job::new(QueueName::RewardIssuance, "issue-reward", serde_json::json!({}))
            .with_retry_policy(immediate_retries(3));
        let id = store.enqueue(job).unwrap();

        assert_eq!(executor.run_until_idle().unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let parked = store.list_dead_letters(QueueName::RewardIssuance, 10).unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].job.id, id);
        assert!(matches!(parked[0].job.status, JobStatus::DeadLettered { attempts: 3, .. }));
    }

    #[test]
    fn backoff_stops_the_synchronous_run() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone(), QueueName::OrderProcessing);
        executor.register_handler("*", |_job| JobResult::Retry("store unavailable".to_string()));

        store
            .enqueue(Job::new(QueueName::OrderProcessing, "process-order", serde_json::json!({})))
            .unwrap();

        // Default policy waits 1s before the second delivery.
        assert_eq!(executor.run_until_idle().unwrap(), 1);
        assert_eq!(store.stats(QueueName::OrderProcessing).unwrap().delayed, 1);
    }

    #[test]
    fn fatal_parks_without_retry() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone(), QueueName::RewardIssuance);
        executor.register_handler("*", |_job| JobResult::Fatal("quest not found".to_string()));

        store
            .enqueue(
                Job::new(QueueName::RewardIssuance, "issue-reward", serde_json::json!({}))
                    .with_retry_policy(immediate_retries(3)),
            )
            .unwrap();

        assert_eq!(executor.run_until_idle().unwrap(), 1);
        assert_eq!(store.stats(QueueName::RewardIssuance).unwrap().failed, 1);
    }

    #[test]
    fn panicking_handler_is_retried_then_parked() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone(), QueueName::OrderProcessing);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        executor.register_handler("process-order", move |_job| {
            seen.fetch_add(1, Ordering::SeqCst);
            panic!("`DateTime - TimeDelta` overflowed");
        });

        let id = store
            .enqueue(
                Job::new(QueueName::OrderProcessing, "process-order", serde_json::json!({}))
                    .with_retry_policy(immediate_retries(2)),
            )
            .unwrap();

        assert_eq!(executor.run_until_idle().unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stats = store.stats(QueueName::OrderProcessing).unwrap();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.failed, 1);
        let parked = store.list_dead_letters(QueueName::OrderProcessing, 10).unwrap();
        assert_eq!(parked[0].job.id, id);
        assert!(parked[0].reason.contains("overflowed"), "reason: {}", parked[0].reason);
    }

    #[test]
    fn pool_worker_survives_a_panicking_handler() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone(), QueueName::RewardIssuance);
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        executor.register_handler("issue-reward", move |job| {
            if job.payload["boom"] == true {
                panic!("boom");
            }
            counter.fetch_add(1, Ordering::SeqCst);
            JobResult::Success(serde_json::Value::Null)
        });

        store
            .enqueue(
                Job::new(QueueName::RewardIssuance, "issue-reward", serde_json::json!({ "boom": true }))
                    .with_retry_policy(RetryPolicy::no_retry()),
            )
            .unwrap();
        store
            .enqueue(Job::new(QueueName::RewardIssuance, "issue-reward", serde_json::json!({ "boom": false })))
            .unwrap();

        let handle = executor
            .spawn(
                JobExecutorConfig::default()
                    .with_name("rewards-test")
                    .with_max_concurrent(1)
                    .with_poll_interval(Duration::from_millis(5)),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while done.load(Ordering::SeqCst) < 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        handle.shutdown();

        // One worker thread handled both jobs, so it outlived the panic.
        assert_eq!(done.load(Ordering::SeqCst), 1);
        let stats = store.stats(QueueName::RewardIssuance).unwrap();
        assert_eq!((stats.active, stats.completed, stats.failed), (0, 1, 1));
    }

    #[test]
    fn unknown_job_name_is_parked() {
        let store = Arc::new(InMemoryJobStore::new());
        let executor = JobExecutor::new(store.clone(), QueueName::OrderProcessing);

        store
            .enqueue(Job::new(QueueName::OrderProcessing, "mystery", serde_json::json!({})))
            .unwrap();

        assert_eq!(executor.run_until_idle().unwrap(), 1);
        assert_eq!(store.list_dead_letters(QueueName::OrderProcessing, 10).unwrap().len(), 1);
    }

    #[test]
    fn pool_drains_queue_and_shuts_down() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone(), QueueName::OrderProcessing);
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        executor.register_handler("process-order", move |_job| {
            counter.fetch_add(1, Ordering::SeqCst);
            JobResult::Success(serde_json::Value::Null)
        });

        for i in 0..20 {
            store
                .enqueue(Job::new(QueueName::OrderProcessing, "process-order", serde_json::json!({ "i": i })))
                .unwrap();
        }

        let handle = executor
            .spawn(
                JobExecutorConfig::default()
                    .with_name("orders-test")
                    .with_max_concurrent(5)
                    .with_poll_interval(Duration::from_millis(5)),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while done.load(Ordering::SeqCst) < 20 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let stats = handle.stats();
        handle.shutdown();

        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert_eq!(store.stats(QueueName::OrderProcessing).unwrap().completed, 20);
        assert!(stats.jobs_processed <= 20);
    }
}
