//! Scoring service wiring.

use std::sync::Arc;
use tracing::info;

use super::launcher::JobLauncher;
use super::persister::ScoreSink;
use super::registry::JobRegistry;
use super::source::RecordSource;
use super::state::JobState;
use super::status::{JobLookup, StatusReporter};
use crate::Result;
use crate::config::AppConfig;
use crate::database::DbPool;
use crate::database::repositories::{SqlxRecordSource, SqlxScoreSink};
use crate::rules::RuleSet;

/// Facade over the job registry, launcher and status reporter.
pub struct ScoringService {
    registry: Arc<JobRegistry>,
    launcher: JobLauncher,
    reporter: StatusReporter,
    rules: RuleSet,
}

impl ScoringService {
    /// Build the service on top of the SQLite record source and score sink.
    pub fn from_pool(pool: DbPool, config: &AppConfig, rules: RuleSet) -> Self {
        info!("Initializing scoring service");
        Self::with_collaborators(
            Arc::new(SqlxRecordSource::new(pool.clone())),
            Arc::new(SqlxScoreSink::new(pool)),
            rules,
            config,
        )
    }

    /// Build the service with explicit collaborators.
    pub fn with_collaborators(
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn ScoreSink>,
        rules: RuleSet,
        config: &AppConfig,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let launcher = JobLauncher::new(
            registry.clone(),
            source,
            sink,
            rules.clone(),
            config.batch.clone(),
            config.worker_pool.clone(),
        );
        let reporter = StatusReporter::new(registry.clone());

        Self {
            registry,
            launcher,
            reporter,
            rules,
        }
    }

    /// Submit a job for `[start, end]`; see [`JobLauncher::submit`].
    pub fn submit(&self, start: &str, end: &str) -> Result<JobState> {
        self.launcher.submit(start, end)
    }

    /// Query the job for `[start, end]`; see [`StatusReporter::query`].
    pub fn query(&self, start: &str, end: &str) -> Result<JobLookup> {
        self.reporter.query(start, end)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn launcher(&self) -> &JobLauncher {
        &self.launcher
    }

    /// Wait for every submitted job to finish.
    pub async fn shutdown(&self) {
        self.launcher.shutdown().await;
    }
}
