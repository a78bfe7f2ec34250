//! Threshold business rule over specialty, diagnosis and rest days.

use serde::{Deserialize, Serialize};

use super::traits::{EvaluationFailure, RuleModel};
use crate::domain::{LeaveRecord, RecordField, RuleId};

/// Licenses granting more rest days than this are excluded from scoring.
pub const DEFAULT_MAX_REST_DAYS: i64 = 365;

const REQUIRED_FIELDS: &[RecordField] = &[RecordField::RestDays, RecordField::DiagnosisCode];

fn default_max_rest_days() -> i64 {
    DEFAULT_MAX_REST_DAYS
}

/// Data definition of a business rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRuleDefinition {
    pub id: RuleId,
    /// Professional specialties the rule applies to.
    pub specialties: Vec<String>,
    /// Diagnosis code prefix the rule applies to.
    pub diagnosis_prefix: String,
    /// Minimum rest days for the rule to fire.
    pub min_rest_days: i64,
    #[serde(default = "default_max_rest_days")]
    pub max_rest_days: i64,
}

impl BusinessRuleDefinition {
    /// Built-in rules shipped with the service.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self {
                id: RuleId::new("rn_1"),
                specialties: vec!["MEDICINA GENERAL".to_string(), "PSIQUIATRIA".to_string()],
                diagnosis_prefix: "F".to_string(),
                min_rest_days: 30,
                max_rest_days: DEFAULT_MAX_REST_DAYS,
            },
            Self {
                id: RuleId::new("rn_2"),
                specialties: vec!["TRAUMATOLOGIA".to_string()],
                diagnosis_prefix: "M".to_string(),
                min_rest_days: 15,
                max_rest_days: DEFAULT_MAX_REST_DAYS,
            },
        ]
    }
}

/// Scores `1.0` when the record's specialty is accepted, its diagnosis code
/// starts with the configured prefix and its rest days reach the minimum;
/// `0.0` otherwise.
#[derive(Debug, Clone)]
pub struct BusinessRule {
    definition: BusinessRuleDefinition,
}

impl BusinessRule {
    pub fn new(definition: BusinessRuleDefinition) -> Self {
        Self { definition }
    }
}

impl RuleModel for BusinessRule {
    fn id(&self) -> &RuleId {
        &self.definition.id
    }

    fn required_fields(&self) -> &[RecordField] {
        REQUIRED_FIELDS
    }

    fn evaluate(&self, record: &LeaveRecord) -> Result<f64, EvaluationFailure> {
        let def = &self.definition;

        let rest_days = record
            .rest_days
            .ok_or(EvaluationFailure::MissingField(RecordField::RestDays))?;
        if rest_days > def.max_rest_days {
            return Err(EvaluationFailure::Excluded(format!(
                "rest days {} exceed limit of {}",
                rest_days, def.max_rest_days
            )));
        }

        let diagnosis = record
            .diagnosis_code
            .as_deref()
            .ok_or(EvaluationFailure::MissingField(RecordField::DiagnosisCode))?;
        // Missing specialty never matches
        let specialty = record.specialty.as_deref().unwrap_or("");

        let hit = def.specialties.iter().any(|s| s == specialty)
            && diagnosis.starts_with(&def.diagnosis_prefix)
            && rest_days >= def.min_rest_days;

        Ok(if hit { 1.0 } else { 0.0 })
    }

    fn describe(&self) -> serde_json::Value {
        serde_json::to_value(&self.definition)
            .unwrap_or_else(|_| serde_json::json!({ "id": self.id() }))
    }
}
