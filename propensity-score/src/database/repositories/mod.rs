//! Repository implementations backing the scoring engine.

pub mod record;
pub mod score;

pub use record::SqlxRecordSource;
pub use score::{ScoreDetail, SqlxScoreSink};
