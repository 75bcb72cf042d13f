//! Scheduler configuration.
//!
//! Built once at startup (profile defaults, then TOML, then environment) and
//! handed to `HandlerBuilder`. Nothing reads configuration after that.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::domain::Exchanges;

const PRODUCTION_PROFILE: &str = include_str!("../config/production.toml");
const TEST_PROFILE: &str = include_str!("../config/test.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown profile '{0}', expected one of: default, production, test")]
    UnknownProfile(String),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Table holding `Requires` rows.
    pub required_task_table: String,
    /// Table holding `WaitsOn` rows.
    pub dependent_task_table: String,
    /// Storage account of both tables.
    pub store_account: Option<String>,
    /// Durable consumer queue name; `None` means an exclusive queue.
    pub listener_queue_name: Option<String>,
    pub stats_component: String,
    /// Messages handled concurrently.
    pub prefetch: usize,
    /// Relation operations in flight per message.
    pub parallelism: usize,
    /// Key under `task.extra` holding the dependency list.
    pub extra_key: String,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            required_task_table: "RequiredTasks".to_string(),
            dependent_task_table: "DependentTasks".to_string(),
            store_account: None,
            listener_queue_name: None,
            stats_component: "scheduler".to_string(),
            prefetch: 50,
            parallelism: 200,
            extra_key: "waitFor".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub base_url: Option<String>,
    pub exchange_prefix: String,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            base_url: None,
            exchange_prefix: "exchange/taskcluster-queue/v1/".to_string(),
        }
    }
}

/// Event source credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseSection {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub scheduler: SchedulerSection,
    pub queue: QueueSection,
    pub pulse: PulseSection,
}

impl SchedulerConfig {
    /// Parse config from a TOML string; missing keys take default values.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load one of the built-in profiles.
    pub fn profile(name: &str) -> Result<Self, ConfigError> {
        match name {
            "default" => Self::from_toml(""),
            "production" => Self::from_toml(PRODUCTION_PROFILE),
            "test" => Self::from_toml(TEST_PROFILE),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }

    /// Exchanges carrying task-defined / task-completed messages.
    pub fn exchanges(&self) -> Exchanges {
        Exchanges::with_prefix(&self.queue.exchange_prefix)
    }

    /// Apply environment variable overrides.
    ///
    /// Convention: `TETHER_SECTION_KEY` overrides `section.key`.
    /// - `TETHER_SCHEDULER_STORE_ACCOUNT` -> `scheduler.store_account`
    /// - `TETHER_SCHEDULER_PREFETCH` -> `scheduler.prefetch`
    /// - `TETHER_SCHEDULER_PARALLELISM` -> `scheduler.parallelism`
    /// - `TETHER_QUEUE_BASE_URL` -> `queue.base_url`
    /// - `TETHER_PULSE_USERNAME` -> `pulse.username`
    /// - `TETHER_PULSE_PASSWORD` -> `pulse.password`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TETHER_SCHEDULER_STORE_ACCOUNT") {
            self.scheduler.store_account = Some(v);
        }
        if let Ok(v) = std::env::var("TETHER_SCHEDULER_PREFETCH")
            && let Ok(n) = v.parse::<usize>()
        {
            self.scheduler.prefetch = n;
        }
        if let Ok(v) = std::env::var("TETHER_SCHEDULER_PARALLELISM")
            && let Ok(n) = v.parse::<usize>()
        {
            self.scheduler.parallelism = n;
        }
        if let Ok(v) = std::env::var("TETHER_QUEUE_BASE_URL") {
            self.queue.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("TETHER_PULSE_USERNAME") {
            self.pulse.username = Some(v);
        }
        if let Ok(v) = std::env::var("TETHER_PULSE_PASSWORD") {
            self.pulse.password = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if s.prefetch == 0 {
            return Err(ConfigError::Invalid("scheduler.prefetch must be at least 1".into()));
        }
        if s.parallelism == 0 {
            return Err(ConfigError::Invalid("scheduler.parallelism must be at least 1".into()));
        }
        if s.extra_key.trim().is_empty() {
            return Err(ConfigError::Invalid("scheduler.extra_key must not be empty".into()));
        }
        if s.required_task_table.is_empty() || s.dependent_task_table.is_empty() {
            return Err(ConfigError::Invalid("table names must not be empty".into()));
        }
        if s.required_task_table == s.dependent_task_table {
            return Err(ConfigError::Invalid(format!(
                "both relations point at table '{}'",
                s.required_task_table
            )));
        }
        Ok(())
    }
}
