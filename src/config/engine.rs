use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

use crate::Result;

/// Subscription engine tuning knobs.
///
/// The defaults match the intervals the watchers were designed around; they
/// are configurable mainly so tests can shrink them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Bounded capacity of each subscription's output queue
    pub queue_capacity: usize,
    /// Field-granularity change poll interval in milliseconds
    pub field_poll_interval_ms: u64,
    /// Batch window of the on-change delta publisher in milliseconds
    pub table_batch_interval_ms: u64,
    /// Upper bound on a single keyspace-notification receive in milliseconds
    pub notify_receive_timeout_ms: u64,
    /// Smallest sample interval the engine grants in milliseconds
    pub min_sample_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            field_poll_interval_ms: 200,
            table_batch_interval_ms: 100,
            notify_receive_timeout_ms: 500,
            min_sample_interval_ms: 200,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Message("queue_capacity must be > 0".to_string()).into());
        }
        if self.field_poll_interval_ms == 0
            || self.table_batch_interval_ms == 0
            || self.min_sample_interval_ms == 0
        {
            return Err(
                ConfigError::Message("engine intervals must be > 0".to_string()).into(),
            );
        }
        Ok(())
    }

    pub fn field_poll_interval(&self) -> Duration {
        Duration::from_millis(self.field_poll_interval_ms)
    }

    pub fn table_batch_interval(&self) -> Duration {
        Duration::from_millis(self.table_batch_interval_ms)
    }

    pub fn notify_receive_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_receive_timeout_ms)
    }

    pub fn min_sample_interval(&self) -> Duration {
        Duration::from_millis(self.min_sample_interval_ms)
    }
}
