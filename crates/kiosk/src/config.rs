//! Controller configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! { "password_limit": 3, "tick_interval_ms": 1000, "queue_capacity": 64 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KioskError, Result};

pub const DEFAULT_PASSWORD_LIMIT: u32 = 3;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Password attempts allowed per challenge.
    pub password_limit: u32,
    /// Session timer period in milliseconds.
    pub tick_interval_ms: u64,
    /// Capacity of the dispatcher queue.
    pub queue_capacity: usize,
    /// Log the user out locally when the countdown reaches zero. Off by
    /// default: the backend sends its own TIMEOUT.
    pub logout_on_expiry: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            password_limit: DEFAULT_PASSWORD_LIMIT,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            logout_on_expiry: false,
        }
    }
}

impl ControllerConfig {
    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_password_limit(mut self, limit: u32) -> Self {
        self.password_limit = limit;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_logout_on_expiry(mut self, enabled: bool) -> Self {
        self.logout_on_expiry = enabled;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.password_limit == 0 {
            return Err(KioskError::Config("password_limit must be at least 1".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(KioskError::Config("tick_interval_ms must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(KioskError::Config("queue_capacity must be positive".into()));
        }
        Ok(())
    }
}
