//! Concurrent registry of job states.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::state::JobState;
use crate::domain::JobKey;
use crate::{Error, Result};

/// Single source of truth for job progress.
///
/// Backed by a sharded concurrent map so jobs on different keys never
/// contend on one lock. Entries are kept for the lifetime of the process.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobKey, JobState>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the state for `key`, registering a `starting` job if absent.
    ///
    /// Returns `(snapshot, created)`. Among concurrent callers for the same
    /// key exactly one observes `created == true`.
    pub fn get_or_create(&self, key: JobKey) -> (JobState, bool) {
        match self.jobs.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let state = JobState::new();
                let snapshot = state.clone();
                entry.insert(state);
                (snapshot, true)
            }
        }
    }

    /// Get an independent copy of the state for `key`.
    pub fn snapshot(&self, key: &JobKey) -> Option<JobState> {
        self.jobs.get(key).map(|entry| entry.value().clone())
    }

    /// Apply `mutator` to the state for `key` under exclusive access.
    ///
    /// The mutator works on a copy which replaces the stored state only when
    /// it returns `Ok`, so readers never observe a half-applied update.
    /// Terminal states reject further updates.
    pub fn update<F>(&self, key: &JobKey, mutator: F) -> Result<JobState>
    where
        F: FnOnce(&mut JobState) -> Result<()>,
    {
        let mut entry = self
            .jobs
            .get_mut(key)
            .ok_or_else(|| Error::not_found("Job", key.to_string()))?;

        if entry.is_terminal() {
            return Err(Error::JobFinalized(key.to_string()));
        }

        let mut next = entry.value().clone();
        mutator(&mut next)?;
        next.updated_at = Utc::now();
        *entry = next;

        Ok(entry.value().clone())
    }

    /// Get the number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RuleId;
    use crate::scoring::JobStatus;
    use std::sync::Arc;

    fn key() -> JobKey {
        JobKey::derive("2024-01-01", "2024-01-31").unwrap()
    }

    #[test]
    fn test_get_or_create_once() {
        let registry = JobRegistry::new();
        let (state, created) = registry.get_or_create(key());
        assert!(created);
        assert_eq!(state.status, JobStatus::Starting);

        let (_, created) = registry.get_or_create(key());
        assert!(!created);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_get_or_create_single_creator() {
        let registry = Arc::new(JobRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.get_or_create(key()).1)
            })
            .collect();

        let creators = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(creators, 1);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let registry = JobRegistry::new();
        registry.get_or_create(key());

        let mut snapshot = registry.snapshot(&key()).unwrap();
        snapshot.status = JobStatus::Completed;
        snapshot.record_success(&RuleId::new("rn_1"));

        let stored = registry.snapshot(&key()).unwrap();
        assert_eq!(stored.status, JobStatus::Starting);
        assert!(stored.per_model_count.is_empty());
    }

    #[test]
    fn test_failed_mutator_leaves_state_untouched() {
        let registry = JobRegistry::new();
        registry.get_or_create(key());

        let result = registry.update(&key(), |state| {
            state.record_success(&RuleId::new("rn_1"));
            state.transition(JobStatus::Completed)
        });
        assert!(result.is_err());
        assert!(registry.snapshot(&key()).unwrap().per_model_count.is_empty());
    }

    #[test]
    fn test_terminal_state_is_immutable() {
        let registry = JobRegistry::new();
        registry.get_or_create(key());
        registry
            .update(&key(), |state| state.fail("extraction failed"))
            .unwrap();

        let err = registry
            .update(&key(), |state| {
                state.total = Some(10);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::JobFinalized(_)));
        assert_eq!(registry.snapshot(&key()).unwrap().total, None);
    }

    #[test]
    fn test_update_unknown_key() {
        let registry = JobRegistry::new();
        let err = registry.update(&key(), |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
