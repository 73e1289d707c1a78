//! Configuration loading and typed config structures for a Lockstep run.
//!
//! A run is configured from a YAML file (conventionally
//! `lockstep-config.yaml` at the project root). Every section and field is
//! optional; anything left out takes the default documented on the field.
//!
//! The environment variable `LOCKSTEP_MAX_TICKS` overrides
//! `simulation.max_ticks` when set.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Environment variable that overrides [`SimulationBoundsConfig::max_ticks`].
pub const MAX_TICKS_ENV: &str = "LOCKSTEP_MAX_TICKS";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override held a value that could not be parsed.
    #[error("invalid value `{value}` for {variable}")]
    Override {
        /// The environment variable name.
        variable: &'static str,
        /// The offending value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level kernel configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct KernelConfig {
    /// Run boundaries.
    #[serde(default)]
    pub simulation: SimulationBoundsConfig,

    /// Time-step driver behaviour.
    #[serde(default)]
    pub driver: DriverConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Demonstration scenario settings, used by the engine binary.
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

impl KernelConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Override`] if an override variable is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Override`] if a variable is set to a value
    /// that cannot be parsed.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Override`] if a variable is set to a value
    /// that cannot be parsed.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(MAX_TICKS_ENV) {
            self.simulation.max_ticks =
                value.trim().parse().map_err(|_err| ConfigError::Override {
                    variable: MAX_TICKS_ENV,
                    value,
                })?;
        }
        Ok(())
    }
}

/// Simulation boundary configuration.
///
/// A value of 0 for either limit means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimulationBoundsConfig {
    /// Maximum number of ticks before the run completes (0 = unlimited).
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Maximum wall-clock seconds before the run completes (0 = unlimited).
    #[serde(default)]
    pub max_real_time_seconds: u64,
}

impl Default for SimulationBoundsConfig {
    fn default() -> Self {
        Self {
            max_ticks: default_max_ticks(),
            max_real_time_seconds: 0,
        }
    }
}

/// What the driver does when a component or an action fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run, identifying the failing component.
    #[default]
    Abort,
    /// Record the failure and keep going.
    Continue,
}

/// How participant step hooks are run within a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One after another in registration order.
    #[default]
    Sequential,
    /// In parallel on scoped worker threads, joined before the tick ends.
    Concurrent,
}

/// Time-step driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DriverConfig {
    /// Real-time milliseconds to wait between ticks (0 = no wait).
    #[serde(default)]
    pub tick_interval_ms: u64,

    /// Sequential or concurrent participant execution.
    #[serde(default)]
    pub execution: ExecutionMode,

    /// Policy when a participant or plugin hook fails.
    #[serde(default)]
    pub component_failure: FailurePolicy,

    /// Policy when an action handler fails during a tick.
    #[serde(default = "default_action_failure")]
    pub action_failure: FailurePolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 0,
            execution: ExecutionMode::default(),
            component_failure: FailurePolicy::default(),
            action_failure: default_action_failure(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Settings for the engine's demonstration scenario.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScenarioConfig {
    /// Number of walkers to spawn.
    #[serde(default = "default_walkers")]
    pub walkers: u32,

    /// Number of cells on the ring the walkers move around.
    #[serde(default = "default_ring_size")]
    pub ring_size: u32,

    /// Seed for the walkers' random number generators.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Whether to record shared state into the in-memory database.
    #[serde(default = "default_true")]
    pub record_state: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            walkers: default_walkers(),
            ring_size: default_ring_size(),
            seed: default_seed(),
            record_state: true,
        }
    }
}

const fn default_max_ticks() -> u64 {
    100
}

const fn default_action_failure() -> FailurePolicy {
    FailurePolicy::Continue
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_walkers() -> u32 {
    4
}

const fn default_ring_size() -> u32 {
    12
}

const fn default_seed() -> u64 {
    42
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = KernelConfig::default();
        assert_eq!(config.simulation.max_ticks, 100);
        assert_eq!(config.driver.component_failure, FailurePolicy::Abort);
        assert_eq!(config.driver.action_failure, FailurePolicy::Continue);
        assert_eq!(config.driver.execution, ExecutionMode::Sequential);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.scenario.walkers, 4);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
simulation:
  max_ticks: 250
  max_real_time_seconds: 60

driver:
  tick_interval_ms: 20
  execution: concurrent
  component_failure: continue
  action_failure: abort

logging:
  level: "lockstep_env=debug,info"
  format: json

scenario:
  walkers: 9
  ring_size: 30
  seed: 7
  record_state: false
"#;
        let config = KernelConfig::parse(yaml).unwrap();
        assert_eq!(config.simulation.max_ticks, 250);
        assert_eq!(config.simulation.max_real_time_seconds, 60);
        assert_eq!(config.driver.tick_interval_ms, 20);
        assert_eq!(config.driver.execution, ExecutionMode::Concurrent);
        assert_eq!(config.driver.component_failure, FailurePolicy::Continue);
        assert_eq!(config.driver.action_failure, FailurePolicy::Abort);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.scenario.ring_size, 30);
        assert!(!config.scenario.record_state);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = KernelConfig::parse("driver:\n  execution: concurrent\n").unwrap();
        assert_eq!(config.driver.execution, ExecutionMode::Concurrent);
        // Everything else uses defaults
        assert_eq!(config.driver.component_failure, FailurePolicy::Abort);
        assert_eq!(config.simulation.max_ticks, 100);
    }

    #[test]
    fn parse_empty_yaml() {
        assert_eq!(KernelConfig::parse("").unwrap(), KernelConfig::default());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = KernelConfig::parse("driver:\n  component_failure: shrug\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn max_ticks_override() {
        let mut config = KernelConfig::default();
        config
            .apply_overrides_from(|name| (name == MAX_TICKS_ENV).then(|| " 12 ".to_owned()))
            .unwrap();
        assert_eq!(config.simulation.max_ticks, 12);
    }

    #[test]
    fn malformed_override_is_an_error() {
        let mut config = KernelConfig::default();
        let err = config
            .apply_overrides_from(|_| Some("lots".to_owned()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Override { variable: MAX_TICKS_ENV, ref value } if value == "lots"));
        assert_eq!(config.simulation.max_ticks, 100);
    }

    #[test]
    fn absent_override_changes_nothing() {
        let mut config = KernelConfig::default();
        config.apply_overrides_from(|_| None).unwrap();
        assert_eq!(config, KernelConfig::default());
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("lockstep-config.yaml");
        if path.exists() {
            let config = KernelConfig::parse(&std::fs::read_to_string(&path).unwrap());
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
