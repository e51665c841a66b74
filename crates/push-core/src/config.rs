//! Broker configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default number of workers.
pub const DEFAULT_SCALE: usize = 1;

/// Default number of notifications a worker dispatches per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Errors raised while loading or validating a [`BrokerConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },
}

/// Tuning for a [`Broker`](crate::Broker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Number of workers brought up by `start`.
    pub scale: usize,
    /// Upper bound on notifications pulled by one worker at a time.
    pub max_batch_size: usize,
    /// Queue capacity; `None` leaves the queue unbounded.
    pub max_queue_size: Option<usize>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_queue_size: None,
        }
    }
}

impl BrokerConfig {
    /// Load broker config from environment variables, falling back to defaults.
    ///
    /// A `.env` file in the working directory is honored.
    ///
    /// Supported env vars:
    /// - `PUSH_BROKER_SCALE` (e.g. "4")
    /// - `PUSH_BROKER_MAX_BATCH` (e.g. "100")
    /// - `PUSH_BROKER_MAX_QUEUE` (e.g. "10000"; empty or "0" means unbounded)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("PUSH_BROKER_SCALE") {
            config.scale = parse_usize("PUSH_BROKER_SCALE", &value)?;
        }

        if let Some(value) = lookup("PUSH_BROKER_MAX_BATCH") {
            config.max_batch_size = parse_usize("PUSH_BROKER_MAX_BATCH", &value)?;
        }

        if let Some(value) = lookup("PUSH_BROKER_MAX_QUEUE")
            && !value.trim().is_empty()
        {
            let capacity = parse_usize("PUSH_BROKER_MAX_QUEUE", &value)?;
            config.max_queue_size = (capacity > 0).then_some(capacity);
        }

        config.validate()?;
        debug!(
            scale = config.scale,
            max_batch_size = config.max_batch_size,
            max_queue_size = ?config.max_queue_size,
            "Loaded broker config"
        );
        Ok(config)
    }

    /// Check that every size is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scale == 0 {
            return Err(ConfigError::MustBePositive { field: "scale" });
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_batch_size",
            });
        }
        if self.max_queue_size == Some(0) {
            return Err(ConfigError::MustBePositive {
                field: "max_queue_size",
            });
        }
        Ok(())
    }

    pub fn with_scale(mut self, scale: usize) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_max_queue_size(mut self, max_queue_size: Option<usize>) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }
}

fn parse_usize(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
}
