//! Leave claim records scored by the rule models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One leave claim selected for scoring.
///
/// Optional fields mirror nullable source columns; rule models declare which
/// of them they need through [`RecordField`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaveRecord {
    /// License identifier.
    pub id: String,
    /// Grouping folio.
    pub folio: String,
    /// Granted rest days.
    pub rest_days: Option<i64>,
    /// Date the license was issued.
    pub issued_at: Option<NaiveDate>,
    /// First day of rest.
    pub rest_start: Option<NaiveDate>,
    /// Specialty of the issuing professional.
    pub specialty: Option<String>,
    /// Principal diagnosis code.
    pub diagnosis_code: Option<String>,
}

impl LeaveRecord {
    pub fn new(id: impl Into<String>, folio: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            folio: folio.into(),
            rest_days: None,
            issued_at: None,
            rest_start: None,
            specialty: None,
            diagnosis_code: None,
        }
    }

    pub fn with_rest_days(mut self, days: i64) -> Self {
        self.rest_days = Some(days);
        self
    }

    pub fn with_issued_at(mut self, date: NaiveDate) -> Self {
        self.issued_at = Some(date);
        self
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    pub fn with_diagnosis_code(mut self, code: impl Into<String>) -> Self {
        self.diagnosis_code = Some(code.into());
        self
    }

    /// Check whether an optional field carries a value.
    pub fn has(&self, field: RecordField) -> bool {
        match field {
            RecordField::RestDays => self.rest_days.is_some(),
            RecordField::IssuedAt => self.issued_at.is_some(),
            RecordField::RestStart => self.rest_start.is_some(),
            RecordField::Specialty => self.specialty.is_some(),
            RecordField::DiagnosisCode => self.diagnosis_code.is_some(),
        }
    }
}

/// Optional record fields a rule model may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    RestDays,
    IssuedAt,
    RestStart,
    Specialty,
    DiagnosisCode,
}

impl RecordField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RestDays => "rest_days",
            Self::IssuedAt => "issued_at",
            Self::RestStart => "rest_start",
            Self::Specialty => "specialty",
            Self::DiagnosisCode => "diagnosis_code",
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
