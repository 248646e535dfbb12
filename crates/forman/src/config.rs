//! Scheduler configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FormanError;

/// Forman configuration
///
/// # Example
///
/// ```
/// use fleet_forman::FormanConfig;
/// use std::time::Duration;
///
/// let config = FormanConfig::new(8)
///     .with_queue_capacity(16)
///     .with_shutdown_timeout(Duration::from_secs(10));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormanConfig {
    /// Number of workers, fixed for the lifetime of the scheduler
    pub concurrency: usize,

    /// Capacity of the hand-off queue between producers and the dispatcher
    ///
    /// Producers wait in `submit` once this many requests are in flight
    /// towards the dispatcher.
    pub queue_capacity: usize,

    /// How long `shutdown` waits for in-flight invocations
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for FormanConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            queue_capacity: 1,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl FormanConfig {
    /// Create a configuration with the given number of workers
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    /// Set the hand-off queue capacity (at least 1)
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), FormanError> {
        if self.concurrency == 0 {
            return Err(FormanError::InvalidConcurrency(self.concurrency));
        }
        if self.queue_capacity == 0 {
            return Err(FormanError::InvalidQueueCapacity);
        }
        Ok(())
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
