//! Configuration management for the broker.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation

mod buffer;
mod ingest;
mod server;

pub use buffer::*;
pub use ingest::*;
pub use server::*;

#[cfg(test)]
mod config_test;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the broker process
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with `BROKER__` prefix (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct BrokerConfig {
    /// Client-facing server parameters
    pub server: ServerConfig,
    /// Per-type slot buffer admission bounds
    pub buffers: BufferSettings,
    /// Ingest-side reconnect behavior
    pub ingest: IngestConfig,
}

impl Debug for BrokerConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("BrokerConfig").field("server", &self.server).finish()
    }
}

impl BrokerConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Later sources override earlier ones:
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `BROKER__` prefix (highest priority)
    ///
    /// # Note
    /// This method does NOT validate the configuration. Validation is deferred
    /// to allow further overrides via `with_override_config()`. Callers MUST
    /// call `validate()` before using the configuration.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("BROKER")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config) // No validation - deferred to validate()
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("BROKER")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config) // No validation - deferred to validate()
    }

    /// Validates configuration and returns the validated instance.
    ///
    /// Consumes self and validates all subsystems. Must be called after all
    /// configuration overrides so the final values are checked.
    pub fn validate(self) -> Result<Self> {
        self.server.validate()?;
        self.buffers.validate()?;
        self.ingest.validate()?;
        Ok(self)
    }
}
