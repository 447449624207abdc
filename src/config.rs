//! Runtime configuration.
//!
//! Every section has defaults, so an empty JSON object (or no file at all)
//! yields a working setup with the three sample transfer routes.

use crate::application::route::RouteDefinition;
use crate::error::{Result, TransferError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DEAD_LETTER_QUEUE: &str = "DLQ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub dead_letter_queue: String,
    /// Maximum number of messages a single queue may hold. Unbounded when
    /// unset.
    pub max_depth: Option<usize>,
    /// Rollbacks a message survives before it is dead-lettered.
    pub max_redeliveries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dead_letter_queue: DEFAULT_DEAD_LETTER_QUEUE.to_string(),
            max_depth: None,
            max_redeliveries: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub lock_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 1_000,
        }
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub poll_timeout_ms: u64,
    /// Log every step of every exchange at debug level.
    pub trace: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            trace: false,
        }
    }
}

impl ExecutorConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queues: QueueConfig,
    pub ledger: LedgerConfig,
    pub executor: ExecutorConfig,
    pub routes: Vec<RouteDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queues: QueueConfig::default(),
            ledger: LedgerConfig::default(),
            executor: ExecutorConfig::default(),
            routes: RouteDefinition::samples("foo", "bar"),
        }
    }
}

impl Config {
    /// Loads and validates a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queues.dead_letter_queue.trim().is_empty() {
            return Err(TransferError::ConfigError(
                "dead_letter_queue must not be empty".to_string(),
            ));
        }
        if self.queues.max_depth == Some(0) {
            return Err(TransferError::ConfigError(
                "max_depth must be greater than zero".to_string(),
            ));
        }

        let mut sources = HashSet::new();
        for route in &self.routes {
            if route.from == self.queues.dead_letter_queue {
                return Err(TransferError::ConfigError(format!(
                    "route '{}' consumes from the dead-letter queue",
                    route.name
                )));
            }
            // One consumer per queue keeps processing sequential per queue.
            if !sources.insert(route.from.as_str()) {
                return Err(TransferError::ConfigError(format!(
                    "queue '{}' is consumed by more than one route",
                    route.from
                )));
            }
        }
        Ok(())
    }
}
