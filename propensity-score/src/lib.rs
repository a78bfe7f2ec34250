//! propensity-score library crate.
//!
//! Background batch scoring of leave records: jobs keyed by a date range
//! evaluate every record against every registered rule model and persist
//! the scores in blocks, while callers poll a live progress snapshot.

pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod rules;
pub mod scoring;

pub use error::{Error, Result};
