use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Ingest-side reconnect behavior
///
/// A dropped source link is expected to be transient, so receivers retry
/// forever; the jittered delay only keeps a flapping link from spinning.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IngestConfig {
    /// Lower bound of the randomized reconnect delay
    #[serde(default = "default_backoff_min")]
    pub reconnect_backoff_min_in_ms: u64,

    /// Upper bound of the randomized reconnect delay
    #[serde(default = "default_backoff_max")]
    pub reconnect_backoff_max_in_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_min_in_ms: default_backoff_min(),
            reconnect_backoff_max_in_ms: default_backoff_max(),
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_backoff_min_in_ms < 1 {
            return Err(Error::Config(ConfigError::Message(
                "ingest.reconnect_backoff_min_in_ms must be at least 1ms".into(),
            )));
        }
        if self.reconnect_backoff_max_in_ms <= self.reconnect_backoff_min_in_ms {
            return Err(Error::Config(ConfigError::Message(
                "ingest.reconnect_backoff_max_in_ms must exceed the minimum".into(),
            )));
        }
        Ok(())
    }

    /// (min, max) in milliseconds, for the receiver's jittered delay
    pub fn backoff_range(&self) -> (u64, u64) {
        (self.reconnect_backoff_min_in_ms, self.reconnect_backoff_max_in_ms)
    }
}

fn default_backoff_min() -> u64 {
    50
}

fn default_backoff_max() -> u64 {
    2_000
}
