//! Evaluation of one record against one rule model.

use crate::domain::{LeaveRecord, Score};
use crate::rules::{EvaluationFailure, RuleModel};

/// Runs a rule model over a record and packages the result as a [`Score`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEvaluator;

impl RuleEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one (record, model) pair.
    ///
    /// A failure is scoped to this pair and carries the reason.
    pub fn evaluate(
        &self,
        record: &LeaveRecord,
        model: &dyn RuleModel,
    ) -> Result<Score, EvaluationFailure> {
        let value = model.evaluate(record)?;
        if !value.is_finite() {
            return Err(EvaluationFailure::Rejected(format!(
                "non-finite score {value}"
            )));
        }

        Ok(Score::new(
            record.id.clone(),
            record.folio.clone(),
            model.id().clone(),
            value,
        ))
    }
}
