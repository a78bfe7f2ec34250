//! Ordered registry of rule models.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::business::{BusinessRule, BusinessRuleDefinition};
use super::traits::RuleModel;
use crate::domain::{RecordField, RuleId};
use crate::{Error, Result};

/// Immutable, ordered collection of rule models.
///
/// Iteration order is registration order; the job runner relies on it to
/// process pairs deterministically.
#[derive(Clone)]
pub struct RuleSet {
    models: Arc<Vec<Arc<dyn RuleModel>>>,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl RuleSet {
    /// Build a set from explicit models.
    ///
    /// Fails on an empty list or duplicate ids.
    pub fn new(models: Vec<Arc<dyn RuleModel>>) -> Result<Self> {
        if models.is_empty() {
            return Err(Error::config("at least one rule model is required"));
        }

        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.id().clone()) {
                return Err(Error::config(format!(
                    "duplicate rule model id '{}'",
                    model.id()
                )));
            }
        }

        Ok(Self {
            models: Arc::new(models),
        })
    }

    /// Build a set of business rules from their definitions.
    pub fn from_definitions(definitions: Vec<BusinessRuleDefinition>) -> Result<Self> {
        Self::new(
            definitions
                .into_iter()
                .map(|def| Arc::new(BusinessRule::new(def)) as Arc<dyn RuleModel>)
                .collect(),
        )
    }

    /// The built-in business rules.
    pub fn builtin() -> Result<Self> {
        Self::from_definitions(BusinessRuleDefinition::builtin())
    }

    /// Load business rule definitions from a JSON array on disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let definitions: Vec<BusinessRuleDefinition> = serde_json::from_str(&content)?;
        info!(
            path = %path.display(),
            count = definitions.len(),
            "Loaded rule definitions"
        );
        Self::from_definitions(definitions)
    }

    /// Load from `path` when given, otherwise use the built-in rules.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RuleModel>> {
        self.models.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &RuleId> {
        self.models.iter().map(|m| m.id())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Fields required by every model in the set.
    ///
    /// A record missing one of these cannot be scored by any model, which
    /// the runner treats as a structural failure of the whole job.
    pub fn required_by_all(&self) -> Vec<RecordField> {
        let mut iter = self.models.iter();
        let Some(first) = iter.next() else {
            return Vec::new();
        };

        let mut common: Vec<RecordField> = first.required_fields().to_vec();
        for model in iter {
            common.retain(|field| model.required_fields().contains(field));
        }
        common
    }

    /// JSON descriptions of every model, in order.
    pub fn describe(&self) -> Vec<serde_json::Value> {
        self.models.iter().map(|m| m.describe()).collect()
    }
}
