//! Rule model trait and related types.

use thiserror::Error;

use crate::domain::{LeaveRecord, RecordField, RuleId};

/// Reason a single (record, rule) evaluation produced no score.
///
/// Failures are local to one pair: the job keeps going and only that score
/// is left unwritten.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationFailure {
    #[error("missing field '{0}'")]
    MissingField(RecordField),

    #[error("record excluded: {0}")]
    Excluded(String),

    #[error("{0}")]
    Rejected(String),
}

/// Trait for rule models.
///
/// Implementations must be pure: they read the record and their own
/// configuration and compute a score. Persistence is the caller's job.
pub trait RuleModel: Send + Sync {
    /// Stable identifier used for progress counters and score storage.
    fn id(&self) -> &RuleId;

    /// Optional record fields this model cannot work without.
    fn required_fields(&self) -> &[RecordField] {
        &[]
    }

    /// Score one record.
    fn evaluate(&self, record: &LeaveRecord) -> Result<f64, EvaluationFailure>;

    /// JSON description of the model's configuration.
    fn describe(&self) -> serde_json::Value {
        serde_json::json!({ "id": self.id() })
    }
}
