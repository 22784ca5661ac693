//! # stackd Configuration System
//!
//! YAML-based configuration with environment-specific overrides.
//!
//! ## Architecture
//!
//! - **Single Source of Truth**: all tunables come from `config/stackd-config.yaml`
//! - **Environment Awareness**: a top-level `development`/`test`/`production`
//!   section is merged over the base document
//! - **Explicit Validation**: invalid values fail loading instead of silently
//!   falling back
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stackd_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let attempts = manager.config().orchestration.default_max_attempts;
//! let ping_interval = manager.config().polling.ping_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring stackd-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StackdConfig {
    /// Workflow composition defaults and on-disk state location
    pub orchestration: OrchestrationConfig,

    /// Bounded polling loops (provider state waits, reachability)
    pub polling: PollingConfig,

    /// Entity history log settings
    pub history: HistoryConfig,

    /// Injected TTL cache settings
    pub cache: CacheConfig,

    /// Lifecycle event channel settings
    pub events: EventsConfig,

    /// Log output settings
    pub logging: LoggingConfig,

    /// Environment this configuration was resolved for
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Attempts given to each retryable task unless a request overrides it
    pub default_max_attempts: u32,
    /// Launch hosts in parallel rather than one at a time
    pub parallel_launch: bool,
    /// Run stack orchestration as part of LAUNCH
    pub provision_on_launch: bool,
    /// Directory holding per-stack map, pillar and orchestrate files
    pub stack_root: PathBuf,
    /// Directory holding per-environment orchestrate files
    pub environment_root: PathBuf,
    /// Salt pillar environment orchestration runs with
    pub pillar_env: String,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            parallel_launch: true,
            provision_on_launch: true,
            stack_root: PathBuf::from("/var/lib/stackd/stacks"),
            environment_root: PathBuf::from("/var/lib/stackd/environments"),
            pillar_env: "base".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between provider state queries
    pub state_wait_interval_ms: u64,
    /// Overall bound on a provider state wait
    pub state_wait_timeout_seconds: u64,
    /// Consecutive provider query failures tolerated during a wait
    pub state_wait_max_failures: u32,
    /// Bound on waiting for provider-confirmed termination before group cleanup
    pub termination_wait_timeout_seconds: u64,
    /// Delay between reachability pings
    pub ping_interval_ms: u64,
    /// Ping rounds tolerated before hosts are declared unreachable
    pub ping_max_failures: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            state_wait_interval_ms: 5_000,
            state_wait_timeout_seconds: 900,
            state_wait_max_failures: 10,
            termination_wait_timeout_seconds: 600,
            ping_interval_ms: 5_000,
            ping_max_failures: 60,
        }
    }
}

impl PollingConfig {
    pub fn state_wait_interval(&self) -> Duration {
        Duration::from_millis(self.state_wait_interval_ms)
    }

    pub fn state_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.state_wait_timeout_seconds)
    }

    pub fn termination_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.termination_wait_timeout_seconds)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Longest message stored in an entity history log
    pub max_message_length: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_message_length: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_capacity: u64,
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            default_ttl_seconds: 300,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_directory: PathBuf,
    /// Also write JSON logs to a file under `log_directory`
    pub file_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("log"),
            file_output: false,
        }
    }
}

impl StackdConfig {
    /// Reject values that would make workflows misbehave
    pub fn validate(&self) -> ConfigResult<()> {
        if self.orchestration.default_max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.default_max_attempts",
                "0",
                "at least one attempt is required",
            ));
        }
        if self.orchestration.pillar_env.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "orchestration.pillar_env",
                "",
                "pillar environment must not be empty",
            ));
        }
        if self.polling.state_wait_interval_ms == 0 || self.polling.ping_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "polling",
                "0",
                "polling intervals must be greater than zero",
            ));
        }
        if self.polling.ping_max_failures == 0 || self.polling.state_wait_max_failures == 0 {
            return Err(ConfigurationError::invalid_value(
                "polling",
                "0",
                "failure thresholds must be greater than zero",
            ));
        }
        if self.history.max_message_length < 32 {
            return Err(ConfigurationError::invalid_value(
                "history.max_message_length",
                self.history.max_message_length.to_string(),
                "history messages must allow at least 32 characters",
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "0",
                "event channel needs capacity",
            ));
        }
        Ok(())
    }
}
