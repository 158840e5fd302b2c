//! Runtime settings for the queued façades.
//!
//! Loaded from `CQRS__`-prefixed environment variables, e.g.
//! `CQRS__APPLICATION_NAME=billing`, `CQRS__NAMING__STRATEGY=shared`,
//! `CQRS__NAMING__QUEUE_NAME=commands`, `CQRS__VISIBILITY_TIMEOUT_MS=30000`.

use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::naming::{PerTypeQueueNaming, QueueNamingStrategy, SharedQueueNaming};
use crate::transport::QueueOptions;

const ENV_PREFIX: &str = "CQRS";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingKind {
    #[default]
    PerType,
    Shared,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NamingSettings {
    #[serde(default)]
    pub strategy: NamingKind,
    /// Fixed queue name, required by the shared strategy.
    #[serde(default)]
    pub queue_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub application_name: String,
    #[serde(default)]
    pub naming: NamingSettings,
    #[serde(default = "default_visibility_timeout_ms")]
    pub visibility_timeout_ms: u64,
    #[serde(default = "default_wait_time_ms")]
    pub wait_time_ms: u64,
}

fn default_visibility_timeout_ms() -> u64 {
    1_800_000
}

fn default_wait_time_ms() -> u64 {
    5_000
}

impl Settings {
    /// Load settings from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(config)
    }

    /// Deserialize settings from an already built configuration.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        if settings.naming.strategy == NamingKind::Shared && settings.naming.queue_name.is_none() {
            return Err(ConfigError::Message(
                "naming.queue_name is required for the shared naming strategy".to_string(),
            ));
        }
        Ok(settings)
    }

    pub fn naming_strategy(&self) -> Box<dyn QueueNamingStrategy> {
        match (&self.naming.strategy, &self.naming.queue_name) {
            (NamingKind::Shared, Some(queue_name)) => Box::new(SharedQueueNaming::new(
                self.application_name.clone(),
                queue_name.clone(),
            )),
            _ => Box::new(PerTypeQueueNaming::new(self.application_name.clone())),
        }
    }

    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            visibility_timeout: Duration::from_millis(self.visibility_timeout_ms),
            wait_time: Duration::from_millis(self.wait_time_ms),
        }
    }
}
