use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::OspreyError;

/// Scatter-gather executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of partition tasks running concurrently (admission
    /// gate capacity). Fixed for the lifetime of the executor.
    #[serde(default = "default_max_concurrent_partition_queries")]
    pub max_concurrent_partition_queries: usize,

    /// Per-partition statement timeout in milliseconds (0 = no timeout).
    /// When set, each partition's store call is raced against this deadline;
    /// a partition that misses it surfaces a timeout annotated with its id.
    #[serde(default)]
    pub partition_timeout_ms: u64,
}

fn default_max_concurrent_partition_queries() -> usize {
    20
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_partition_queries: default_max_concurrent_partition_queries(),
            partition_timeout_ms: 0,
        }
    }
}

impl ExecutorConfig {
    /// Validate contract constraints the type system cannot express.
    pub fn validate(&self) -> Result<(), OspreyError> {
        if self.max_concurrent_partition_queries == 0 {
            return Err(OspreyError::invariant(
                "max_concurrent_partition_queries must be at least 1",
            ));
        }
        Ok(())
    }

    /// The per-partition deadline, or `None` when disabled.
    pub fn partition_timeout(&self) -> Option<Duration> {
        (self.partition_timeout_ms > 0).then(|| Duration::from_millis(self.partition_timeout_ms))
    }
}
