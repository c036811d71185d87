//! Configuration for the telemetry service.
//!
//! Hierarchical loading in the usual order: defaults from code, an optional
//! file named by `CONFIG_PATH`, then environment variables with the
//! `TELEMETRY` prefix (highest priority). Validation is a separate step so
//! callers can apply overrides first.

mod engine;
mod service;
mod store;
mod tls;

pub use engine::*;
pub use service::*;
pub use store::*;
pub use tls::*;

#[cfg(test)]
mod config_test;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the telemetry service.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TelemetryConfig {
    /// RPC listener and client authentication
    pub service: ServiceConfig,
    /// TLS material locations
    pub tls: TlsConfig,
    /// Backing key/value server connection
    pub store: StoreConfig,
    /// Subscription engine tuning
    pub engine: EngineConfig,
}

impl TelemetryConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` (if set)
    /// 3. Environment variables with `TELEMETRY__` prefix (highest priority)
    ///
    /// Callers must run `validate()` after all overrides are applied.
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("TELEMETRY")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies overrides from a file, keeping environment variables on top.
    pub fn with_override_config(&self, path: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("TELEMETRY")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates all subsystems and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.service.validate()?;
        self.tls.validate()?;
        self.engine.validate()?;
        Ok(self)
    }
}
