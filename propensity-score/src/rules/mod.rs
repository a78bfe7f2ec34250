//! Rule models applied to leave records.
//!
//! Rule models are registered explicitly: either the built-in business rules
//! or definitions loaded as plain data from a JSON file. Nothing executable is
//! ever loaded from disk.

mod business;
mod set;
mod traits;

pub use business::{BusinessRule, BusinessRuleDefinition, DEFAULT_MAX_REST_DAYS};
pub use set::RuleSet;
pub use traits::{EvaluationFailure, RuleModel};
