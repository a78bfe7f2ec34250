//! Job status and progress state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::RuleId;
use crate::{Error, Result};

/// Lifecycle status of a scoring job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Registered, waiting for a worker.
    Starting,
    /// Fetching records for the range.
    Extracting,
    /// Evaluating records against rule models.
    Executing,
    /// Every pair processed and the last block flushed.
    Completed,
    /// Aborted by a structural failure.
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Extracting => "extracting",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Extracting)
                | (Self::Starting, Self::Error)
                | (Self::Extracting, Self::Executing)
                | (Self::Extracting, Self::Completed)
                | (Self::Extracting, Self::Error)
                | (Self::Executing, Self::Completed)
                | (Self::Executing, Self::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress record of one job.
///
/// Values handed out by the registry are independent copies; mutating one
/// never affects the stored state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub status: JobStatus,
    /// Number of records extracted, known once extraction finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Records scored so far, per rule model.
    #[serde(default)]
    pub per_model_count: BTreeMap<RuleId, u64>,
    /// Records a rule model could not score.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_model_failures: BTreeMap<RuleId, u64>,
    /// Scores the sink rejected.
    #[serde(default)]
    pub persist_failures: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobState {
    /// A freshly registered job.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            status: JobStatus::Starting,
            total: None,
            per_model_count: BTreeMap::new(),
            per_model_failures: BTreeMap::new(),
            persist_failures: 0,
            error_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move to `error` with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Error)?;
        self.error_reason = Some(reason.into());
        Ok(())
    }

    /// Zero the counter of every model so pollers see all of them.
    pub fn begin_models<'a>(&mut self, ids: impl IntoIterator<Item = &'a RuleId>) {
        for id in ids {
            self.per_model_count.entry(id.clone()).or_insert(0);
        }
    }

    pub fn record_success(&mut self, id: &RuleId) {
        *self.per_model_count.entry(id.clone()).or_insert(0) += 1;
    }

    pub fn record_failure(&mut self, id: &RuleId) {
        *self.per_model_failures.entry(id.clone()).or_insert(0) += 1;
    }

    pub fn count_for(&self, id: &RuleId) -> u64 {
        self.per_model_count.get(id).copied().unwrap_or(0)
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}
