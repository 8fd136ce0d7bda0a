//! Configuration management for the election engine
//!
//! Loads settings from environment variables with validation and defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default bound on local retries of a conflicting ballot commit
const DEFAULT_MAX_COMMIT_RETRIES: u32 = 3;

/// Ballot commit behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    /// How many times a ballot commit is retried locally after an internal
    /// storage conflict before the conflict is surfaced to the caller.
    /// This is the only automatic retry in the system.
    pub max_commit_retries: u32,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: DEFAULT_MAX_COMMIT_RETRIES,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub commit: CommitConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let max_commit_retries = std::env::var("BALLOT_MAX_COMMIT_RETRIES")
            .unwrap_or_else(|_| DEFAULT_MAX_COMMIT_RETRIES.to_string())
            .parse()
            .map_err(|_| Error::internal("Invalid BALLOT_MAX_COMMIT_RETRIES"))?;

        if max_commit_retries == 0 {
            return Err(Error::internal(
                "BALLOT_MAX_COMMIT_RETRIES must be at least 1",
            ));
        }

        let logging = LoggingConfig {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
        };

        Ok(Self {
            commit: CommitConfig { max_commit_retries },
            logging,
        })
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        Self {
            commit: CommitConfig {
                max_commit_retries: 2,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            commit: CommitConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}
