//! Execution of a single scoring job.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::evaluator::RuleEvaluator;
use super::persister::{BatchPersister, ScoreSink};
use super::registry::JobRegistry;
use super::source::RecordSource;
use super::state::JobStatus;
use crate::domain::{JobKey, LeaveRecord};
use crate::rules::RuleSet;
use crate::{Error, Result};

/// Drives one job from `starting` to a terminal status.
///
/// All progress goes through the registry; the runner keeps no private copy
/// of the job state.
pub struct JobRunner {
    key: JobKey,
    registry: Arc<JobRegistry>,
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn ScoreSink>,
    rules: RuleSet,
    evaluator: RuleEvaluator,
    block_size: usize,
}

impl JobRunner {
    pub fn new(
        key: JobKey,
        registry: Arc<JobRegistry>,
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn ScoreSink>,
        rules: RuleSet,
        block_size: usize,
    ) -> Self {
        Self {
            key,
            registry,
            source,
            sink,
            rules,
            evaluator: RuleEvaluator::new(),
            block_size,
        }
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// Run the job to completion and return its terminal status.
    ///
    /// Structural failures move the job to `error` with the failure as
    /// reason; they are never returned to the caller.
    pub async fn run(self) -> JobStatus {
        let started = Instant::now();

        match self.execute().await {
            Ok(status) => {
                info!(
                    job_key = %self.key,
                    status = %status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Scoring job finished"
                );
                status
            }
            Err(e) => {
                error!(job_key = %self.key, error = %e, "Scoring job failed");
                let reason = e.to_string();
                if let Err(update_err) = self.registry.update(&self.key, |s| s.fail(reason)) {
                    warn!(
                        job_key = %self.key,
                        error = %update_err,
                        "Failed to record job failure"
                    );
                }
                JobStatus::Error
            }
        }
    }

    async fn execute(&self) -> Result<JobStatus> {
        self.registry
            .update(&self.key, |s| s.transition(JobStatus::Extracting))?;

        let records = self
            .source
            .fetch(self.key.range())
            .await
            .map_err(|e| match e {
                Error::Extraction(_) => e,
                other => Error::Extraction(other.to_string()),
            })?;

        let total = records.len() as u64;
        debug!(job_key = %self.key, total, "Records extracted");

        if records.is_empty() {
            self.registry.update(&self.key, |s| {
                s.total = Some(0);
                s.transition(JobStatus::Completed)
            })?;
            info!(job_key = %self.key, "No records in range");
            return Ok(JobStatus::Completed);
        }

        self.registry.update(&self.key, |s| {
            s.total = Some(total);
            Ok(())
        })?;

        self.check_required_fields(&records)?;

        self.registry.update(&self.key, |s| {
            s.begin_models(self.rules.ids());
            s.transition(JobStatus::Executing)
        })?;

        let mut persister = BatchPersister::new(self.sink.clone(), self.block_size);

        for record in &records {
            for model in self.rules.iter() {
                match self.evaluator.evaluate(record, model.as_ref()) {
                    Ok(score) => {
                        let flushed = persister.add(score).await;
                        self.registry.update(&self.key, |s| {
                            s.record_success(model.id());
                            if let Some(outcome) = flushed {
                                s.persist_failures += outcome.failed as u64;
                            }
                            Ok(())
                        })?;
                    }
                    Err(failure) => {
                        warn!(
                            job_key = %self.key,
                            record_id = %record.id,
                            rule_id = %model.id(),
                            reason = %failure,
                            "Rule evaluation failed, skipping pair"
                        );
                        self.registry.update(&self.key, |s| {
                            s.record_failure(model.id());
                            Ok(())
                        })?;
                    }
                }
            }
        }

        let flushed = persister.flush_remainder().await;
        let stats = persister.stats();

        self.registry.update(&self.key, |s| {
            if let Some(outcome) = flushed {
                s.persist_failures += outcome.failed as u64;
            }
            s.transition(JobStatus::Completed)
        })?;

        info!(
            job_key = %self.key,
            total,
            blocks = stats.blocks,
            written = stats.written,
            persist_failures = stats.failed,
            "Scores persisted"
        );

        Ok(JobStatus::Completed)
    }

    /// Reject the batch if a record lacks a field every model depends on.
    fn check_required_fields(&self, records: &[LeaveRecord]) -> Result<()> {
        let required = self.rules.required_by_all();
        if required.is_empty() {
            return Ok(());
        }

        for record in records {
            if let Some(field) = required.iter().find(|field| !record.has(**field)) {
                return Err(Error::MissingField {
                    record_id: record.id.clone(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}
