//! Background batch scoring engine.
//!
//! The engine is responsible for:
//! - Deriving a job key from a date range and deduplicating submissions
//! - Running at most one background job per key on a bounded worker pool
//! - Evaluating every record against every rule model in a fixed order
//! - Persisting scores to a sink in fixed-size blocks
//! - Exposing isolated snapshots of live job progress to pollers

mod evaluator;
mod launcher;
mod persister;
mod registry;
mod runner;
mod service;
mod source;
mod state;
mod status;

pub use evaluator::RuleEvaluator;
pub use launcher::JobLauncher;
pub use persister::{BatchPersister, FlushOutcome, PersistStats, ScoreSink};
pub use registry::JobRegistry;
pub use runner::JobRunner;
pub use service::ScoringService;
pub use source::RecordSource;
pub use state::{JobState, JobStatus};
pub use status::{JobLookup, NotFoundState, StatusReporter};
