//! Actor System Configuration
//!
//! Layered configuration: defaults, then an optional TOML file, then
//! environment variables (`ACTOR_DISPATCHER_THROUGHPUT`,
//! `ACTOR_SUPERVISION__MAX_RETRIES`, ...).

use crate::error::ActorError;
use crate::pid::LOCAL_ADDRESS;
use crate::supervision::{default_decider, OneForOneStrategy};
use anyhow::Context as _;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default environment variable prefix
pub const ENV_PREFIX: &str = "ACTOR";

/// Restart threshold and window for the system-level strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionConfig {
    /// Restarts tolerated inside the window before a child is stopped
    pub max_retries: u32,
    /// Length of the failure window in milliseconds
    pub within_ms: u64,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            within_ms: 10_000,
        }
    }
}

impl SupervisionConfig {
    pub fn within(&self) -> Duration {
        Duration::from_millis(self.within_ms)
    }

    /// One-for-one strategy that restarts on any error within these limits
    pub fn one_for_one(&self) -> OneForOneStrategy {
        OneForOneStrategy::new(self.max_retries, self.within(), default_decider())
    }
}

/// Actor system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorSystemConfig {
    /// Address stamped into every local PID
    pub address: String,
    /// User messages drained per mailbox turn
    pub dispatcher_throughput: usize,
    pub dead_letter_logging: bool,
    pub supervision: SupervisionConfig,
}

impl Default for ActorSystemConfig {
    fn default() -> Self {
        Self {
            address: LOCAL_ADDRESS.to_string(),
            dispatcher_throughput: crate::dispatcher::DEFAULT_THROUGHPUT,
            dead_letter_logging: true,
            supervision: SupervisionConfig::default(),
        }
    }
}

impl ActorSystemConfig {
    /// Load defaults, then `path` if given, then `<env_prefix>_*` variables
    pub fn load(path: Option<&Path>, env_prefix: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(env_prefix.unwrap_or(ENV_PREFIX))
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to build actor system configuration")?
            .try_deserialize()
            .context("Failed to deserialize actor system configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.address.trim().is_empty() {
            return Err(ActorError::configuration(
                "address must not be empty",
                Some("address"),
            ));
        }
        if self.dispatcher_throughput == 0 {
            return Err(ActorError::configuration(
                "dispatcher_throughput must be at least 1",
                Some("dispatcher_throughput"),
            ));
        }
        Ok(())
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_throughput(mut self, throughput: usize) -> Self {
        self.dispatcher_throughput = throughput;
        self
    }

    pub fn with_supervision(mut self, max_retries: u32, within: Duration) -> Self {
        self.supervision = SupervisionConfig {
            max_retries,
            within_ms: within.as_millis() as u64,
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ActorSystemConfig::default();
        assert_eq!(config.address, "nonhost");
        assert_eq!(config.dispatcher_throughput, 300);
        assert_eq!(config.supervision.max_retries, 10);
        assert_eq!(config.supervision.within(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = ActorSystemConfig::default().with_throughput(0).validate().unwrap_err();
        assert_eq!(err.category(), "configuration");

        let err = ActorSystemConfig::default().with_address("  ").validate().unwrap_err();
        assert!(err.to_string().contains("address"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "address = \"node-a:9000\"\ndispatcher_throughput = 64\n\n[supervision]\nmax_retries = 3"
        )
        .unwrap();

        let config = ActorSystemConfig::load(Some(file.path()), Some("ACTOR_TEST_FILE")).unwrap();
        assert_eq!(config.address, "node-a:9000");
        assert_eq!(config.dispatcher_throughput, 64);
        assert_eq!(config.supervision.max_retries, 3);
        // Unset keys keep their defaults.
        assert_eq!(config.supervision.within_ms, 10_000);
        assert!(config.dead_letter_logging);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("ACTOR_TEST_ENV_DISPATCHER_THROUGHPUT", "17");
        std::env::set_var("ACTOR_TEST_ENV_SUPERVISION__WITHIN_MS", "2500");

        let config = ActorSystemConfig::load(None, Some("ACTOR_TEST_ENV")).unwrap();
        assert_eq!(config.dispatcher_throughput, 17);
        assert_eq!(config.supervision.within_ms, 2500);

        std::env::remove_var("ACTOR_TEST_ENV_DISPATCHER_THROUGHPUT");
        std::env::remove_var("ACTOR_TEST_ENV_SUPERVISION__WITHIN_MS");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(ActorSystemConfig::load(Some(&missing), Some("ACTOR_TEST_MISSING")).is_err());
    }
}
