//! Score produced by one rule model for one record.

use serde::{Deserialize, Serialize};

use super::RuleId;

/// A score keyed by `(record_id, rule_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub record_id: String,
    pub folio: String,
    pub rule_id: RuleId,
    pub value: f64,
}

impl Score {
    pub fn new(
        record_id: impl Into<String>,
        folio: impl Into<String>,
        rule_id: RuleId,
        value: f64,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            folio: folio.into(),
            rule_id,
            value,
        }
    }
}
