use std::collections::HashMap;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Admission bounds for one slot buffer
///
/// Exceeding either bound makes `get_writable` fail rather than grow
/// unbounded; ingest drops the chunk and retries on the next one.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BufferCapacity {
    /// Maximum number of slots the buffer may hold
    #[serde(default = "default_max_slots")]
    pub max_slots: usize,

    /// Maximum size of a single chunk in bytes
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
}

impl Default for BufferCapacity {
    fn default() -> Self {
        Self {
            max_slots: default_max_slots(),
            max_chunk_bytes: default_max_chunk_bytes(),
        }
    }
}

impl BufferCapacity {
    pub fn validate(&self) -> Result<()> {
        if self.max_slots == 0 {
            return Err(Error::Config(ConfigError::Message(
                "buffers: max_slots must be greater than 0".into(),
            )));
        }
        if self.max_chunk_bytes == 0 {
            return Err(Error::Config(ConfigError::Message(
                "buffers: max_chunk_bytes must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

/// Per-type buffer bounds with a default fallback
///
/// Buffers are created lazily on first reference; the bound applied is the
/// per-type entry if one is configured, the default otherwise.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct BufferSettings {
    /// Bounds applied to types with no explicit entry
    #[serde(default)]
    pub default: BufferCapacity,

    /// Per-type overrides keyed by type name
    #[serde(default)]
    pub types: HashMap<String, BufferCapacity>,
}

impl BufferSettings {
    pub fn capacity_for(
        &self,
        data_type: &str,
    ) -> BufferCapacity {
        self.types.get(data_type).copied().unwrap_or(self.default)
    }

    pub fn validate(&self) -> Result<()> {
        self.default.validate()?;
        for (name, capacity) in &self.types {
            capacity.validate().map_err(|_| {
                Error::Config(ConfigError::Message(format!(
                    "buffers.types.{name}: bounds must be greater than 0"
                )))
            })?;
        }
        Ok(())
    }
}

fn default_max_slots() -> usize {
    8
}

fn default_max_chunk_bytes() -> usize {
    4 * 1024 * 1024
}
