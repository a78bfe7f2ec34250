//! Application configuration.
//!
//! Values come from the process environment (a `.env` file is loaded first
//! when present) and may be overridden by command line flags.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Result};

/// Default number of scores per persisted block.
pub const DEFAULT_BLOCK_SIZE: usize = 100;

/// Default number of jobs allowed to run at the same time.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:propensity.db?mode=rwc";

/// Configuration for score persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scores buffered before a block is flushed to the sink.
    pub block_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Configuration for the job worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum jobs executing concurrently. Further jobs wait in `starting`.
    pub max_concurrent_jobs: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Directory for rotated log files; console only when unset.
    pub log_dir: Option<PathBuf>,
    /// JSON file with rule definitions; built-in rules when unset.
    pub rules_path: Option<PathBuf>,
    pub batch: BatchConfig,
    pub worker_pool: WorkerPoolConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_dir: None,
            rules_path: None,
            batch: BatchConfig::default(),
            worker_pool: WorkerPoolConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            log_dir: lookup("LOG_DIR").map(PathBuf::from),
            rules_path: lookup("RULES_PATH").map(PathBuf::from),
            batch: BatchConfig {
                block_size: parse_var(&lookup, "SCORE_BLOCK_SIZE", defaults.batch.block_size)?,
            },
            worker_pool: WorkerPoolConfig {
                max_concurrent_jobs: parse_var(
                    &lookup,
                    "MAX_CONCURRENT_JOBS",
                    defaults.worker_pool.max_concurrent_jobs,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.batch.block_size == 0 {
            return Err(Error::config("SCORE_BLOCK_SIZE must be at least 1"));
        }
        if self.worker_pool.max_concurrent_jobs == 0 {
            return Err(Error::config("MAX_CONCURRENT_JOBS must be at least 1"));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("{name}='{raw}' is invalid: {e}"))),
        None => Ok(default),
    }
}
