//! Read path for job progress.

use serde::Serialize;
use std::sync::Arc;

use super::registry::JobRegistry;
use super::state::JobState;
use crate::Result;
use crate::domain::JobKey;

/// Body returned for a key with no registered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotFoundState {
    pub status: &'static str,
}

impl Default for NotFoundState {
    fn default() -> Self {
        Self {
            status: "not_found",
        }
    }
}

/// Outcome of a status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobLookup {
    Found(JobState),
    NotFound(NotFoundState),
}

impl JobLookup {
    pub fn state(&self) -> Option<&JobState> {
        match self {
            Self::Found(state) => Some(state),
            Self::NotFound(_) => None,
        }
    }

    pub fn into_state(self) -> Option<JobState> {
        match self {
            Self::Found(state) => Some(state),
            Self::NotFound(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_some_and(JobState::is_terminal)
    }
}

/// Answers status queries with isolated copies of the registry state.
#[derive(Clone)]
pub struct StatusReporter {
    registry: Arc<JobRegistry>,
}

impl StatusReporter {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Query the job for the `YYYY-MM-DD` range `[start, end]`.
    pub fn query(&self, start: &str, end: &str) -> Result<JobLookup> {
        let key = JobKey::derive(start, end)?;
        Ok(self.query_key(&key))
    }

    pub fn query_key(&self, key: &JobKey) -> JobLookup {
        match self.registry.snapshot(key) {
            Some(state) => JobLookup::Found(state),
            None => JobLookup::NotFound(NotFoundState::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_unknown_key_is_not_found() {
        let reporter = StatusReporter::new(Arc::new(JobRegistry::new()));
        let lookup = reporter.query("2024-01-01", "2024-01-31").unwrap();

        assert_eq!(lookup, JobLookup::NotFound(NotFoundState::default()));
        assert_eq!(
            serde_json::to_value(&lookup).unwrap(),
            serde_json::json!({ "status": "not_found" })
        );
    }

    #[test]
    fn test_found_serializes_as_state() {
        let registry = Arc::new(JobRegistry::new());
        let key = JobKey::derive("2024-01-01", "2024-01-31").unwrap();
        registry.get_or_create(key);

        let lookup = StatusReporter::new(registry).query_key(&key);
        assert!(!lookup.is_terminal());
        assert_eq!(serde_json::to_value(&lookup).unwrap()["status"], "starting");
    }

    #[test]
    fn test_malformed_query_rejected() {
        let reporter = StatusReporter::new(Arc::new(JobRegistry::new()));
        let err = reporter.query("yesterday", "2024-01-31").unwrap_err();
        assert!(matches!(err, Error::InvalidRange(_)));
    }
}
