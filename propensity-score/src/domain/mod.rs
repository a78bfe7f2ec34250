//! Domain layer for propensity-score.
//!
//! This module contains the records being scored, the scores they produce,
//! and the value objects identifying a batch job.

pub mod record;
pub mod score;
pub mod value_objects;

pub use record::{LeaveRecord, RecordField};
pub use score::Score;
pub use value_objects::*;
