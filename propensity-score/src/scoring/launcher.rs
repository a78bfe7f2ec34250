//! Submission of scoring jobs.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::persister::ScoreSink;
use super::registry::JobRegistry;
use super::runner::JobRunner;
use super::source::RecordSource;
use super::state::JobState;
use crate::{Error, Result};
use crate::config::{BatchConfig, WorkerPoolConfig};
use crate::domain::JobKey;
use crate::rules::RuleSet;

/// Entry point for starting jobs.
///
/// Submissions for a key that is already registered return the current
/// state without starting new work, whatever that state is. New jobs run in
/// the background on a pool bounded by `max_concurrent_jobs`; jobs beyond
/// capacity wait in `starting` until a slot frees up.
pub struct JobLauncher {
    registry: Arc<JobRegistry>,
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn ScoreSink>,
    rules: RuleSet,
    batch: BatchConfig,
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Launched jobs that have not finished.
    active_jobs: Arc<AtomicUsize>,
    /// Task set for job runners. `None` once shut down.
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl JobLauncher {
    pub fn new(
        registry: Arc<JobRegistry>,
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn ScoreSink>,
        rules: RuleSet,
        batch: BatchConfig,
        pool: WorkerPoolConfig,
    ) -> Self {
        let max_jobs = pool.max_concurrent_jobs.max(1);
        info!(
            max_concurrent_jobs = max_jobs,
            block_size = batch.block_size,
            rules = rules.len(),
            "Job launcher ready"
        );

        Self {
            registry,
            source,
            sink,
            rules,
            batch,
            semaphore: Arc::new(Semaphore::new(max_jobs)),
            active_jobs: Arc::new(AtomicUsize::new(0)),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Submit a job for the `YYYY-MM-DD` range `[start, end]`.
    ///
    /// Returns immediately with a snapshot of the job state. Malformed dates
    /// and calls made outside a Tokio runtime produce an error and register
    /// nothing; failures inside the job show up in its state.
    pub fn submit(&self, start: &str, end: &str) -> Result<JobState> {
        let key = JobKey::derive(start, end)?;
        self.submit_key(key)
    }

    /// Submit a job for an already derived key.
    pub fn submit_key(&self, key: JobKey) -> Result<JobState> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Runtime(format!("cannot launch job {key}: {e}")))?;

        let (snapshot, created) = self.registry.get_or_create(key);
        if !created {
            debug!(
                job_key = %key,
                status = %snapshot.status,
                "Job already registered, returning current state"
            );
            return Ok(snapshot);
        }

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            warn!(job_key = %key, "Launcher is shut down, job will not run");
            let failed = fail_job(&self.registry, &key, "launcher shut down");
            return Ok(failed.unwrap_or(snapshot));
        };

        // Drop results of jobs that already finished
        while join_set.try_join_next().is_some() {}

        let runner = JobRunner::new(
            key,
            self.registry.clone(),
            self.source.clone(),
            self.sink.clone(),
            self.rules.clone(),
            self.batch.block_size,
        );
        let semaphore = self.semaphore.clone();
        let registry = self.registry.clone();
        let active = ActiveJob::enter(self.active_jobs.clone());

        info!(job_key = %key, "Scoring job submitted");

        join_set.spawn_on(
            async move {
                let _active = active;
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await;

                // A panicking rule model only takes down the inner task.
                if let Err(e) = tokio::spawn(runner.run()).await {
                    let reason = if e.is_panic() {
                        format!("job panicked: {}", panic_message(e.into_panic()))
                    } else {
                        "job task was cancelled".to_string()
                    };
                    error!(job_key = %key, reason = %reason, "Scoring job aborted");
                    fail_job(&registry, &key, reason);
                }
            },
            &handle,
        );

        Ok(snapshot)
    }

    /// Number of launched jobs that have not finished yet.
    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::SeqCst)
    }

    /// Get the number of free worker slots.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for every launched job to reach a terminal status.
    ///
    /// Jobs keep running to completion; nothing is cancelled. Jobs submitted
    /// afterwards are failed immediately.
    pub async fn shutdown(&self) {
        info!(active = self.active_jobs(), "Waiting for scoring jobs to finish");

        // Take the join set out of the mutex before awaiting
        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while let Some(result) = join_set.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Scoring job task did not finish cleanly");
                }
            }
        }

        info!("All scoring jobs finished");
    }
}

/// Counts a launched job until the guard is dropped, even on panic.
struct ActiveJob(Arc<AtomicUsize>);

impl ActiveJob {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Move a job to `error`, logging when the registry refuses.
fn fail_job(registry: &JobRegistry, key: &JobKey, reason: impl Into<String>) -> Option<JobState> {
    let reason = reason.into();
    match registry.update(key, |s| s.fail(reason)) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(job_key = %key, error = %e, "Failed to record job failure");
            None
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
