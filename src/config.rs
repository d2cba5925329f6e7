//! Store configuration.
//!
//! Values are supplied by whoever constructs the store. [`StoreConfig::from_env`]
//! reads them from `TICKETD_*` environment variables, falling back to the
//! defaults below for anything unset or unparsable.

use std::{env, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::definitions::ticket_id::ID_SPACE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory holding the `pending/` and `paid/` namespaces
    pub data_dir: PathBuf,
    /// Maximum number of ticket ids ever issued
    pub id_limit: usize,
    /// Clock samples tried before giving up on a colliding id
    pub retry_budget: u32,
    /// Smallest accepted line item amount (minor units)
    pub min_amount: u64,
    /// Largest accepted order total (minor units)
    pub max_amount: u64,
    /// Allocation requests that may wait for the worker at once
    pub queue_depth: usize,
    /// How long a caller waits for the allocation worker
    pub allocation_timeout: Duration,
    /// Currency code charged at checkout
    pub currency: String,
    /// Prefix of the card statement descriptor, followed by the ticket id
    pub statement_prefix: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("min_amount ({min}) is larger than max_amount ({max})")]
    AmountBounds { min: u64, max: u64 },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("id_limit {limit} exceeds the {space} available ticket ids")]
    IdSpace { limit: usize, space: usize },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            id_limit: 1000,
            retry_budget: 3,
            min_amount: 5,
            max_amount: 10_000,
            queue_depth: 64,
            allocation_timeout: Duration::from_secs(5),
            currency: "dkk".to_string(),
            statement_prefix: "Ild i Gilden".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: env::var("TICKETD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            id_limit: env::var("TICKETD_ID_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.id_limit),
            retry_budget: env::var("TICKETD_RETRY_BUDGET")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_budget),
            min_amount: env::var("TICKETD_MIN_AMOUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_amount),
            max_amount: env::var("TICKETD_MAX_AMOUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_amount),
            queue_depth: env::var("TICKETD_QUEUE_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.queue_depth),
            allocation_timeout: env::var("TICKETD_ALLOCATION_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.allocation_timeout),
            currency: env::var("TICKETD_CURRENCY").unwrap_or(defaults.currency),
            statement_prefix: env::var("TICKETD_STATEMENT_PREFIX")
                .unwrap_or(defaults.statement_prefix),
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_amount > self.max_amount {
            return Err(ConfigError::AmountBounds {
                min: self.min_amount,
                max: self.max_amount,
            });
        }
        if self.id_limit == 0 {
            return Err(ConfigError::Zero("id_limit"));
        }
        if self.id_limit > ID_SPACE {
            return Err(ConfigError::IdSpace {
                limit: self.id_limit,
                space: ID_SPACE,
            });
        }
        if self.retry_budget == 0 {
            return Err(ConfigError::Zero("retry_budget"));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Zero("queue_depth"));
        }
        Ok(())
    }
}
