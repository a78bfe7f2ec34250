//! Domain value objects.
//!
//! Value objects are immutable objects that represent concepts in the domain
//! and are defined by their attributes rather than identity.

mod date_range;
mod rule_id;

pub use date_range::{DATE_FORMAT, DateRange, JobKey};
pub use rule_id::RuleId;
