//! Run configuration.
//!
//! The run configuration is embedded in every [`StepContext`](crate::StepContext)
//! under `config:` and can also be loaded on its own.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading a configuration file
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error parsing JSON
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Executor name not recognized
    #[error("Unknown executor type: '{0}'")]
    UnknownExecutorType(String),
}

pub(crate) fn is_json_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Executor strategy used to run a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    /// Not set; executors refuse to run such a step
    #[default]
    Unspecified,
    /// Drive a driver plugin in-process
    Native,
    /// Hand the step to an external load-testing binary
    Process,
}

impl fmt::Display for ExecutorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorType::Unspecified => write!(f, "unspecified"),
            ExecutorType::Native => write!(f, "native"),
            ExecutorType::Process => write!(f, "process"),
        }
    }
}

impl FromStr for ExecutorType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" => Ok(ExecutorType::Native),
            "process" => Ok(ExecutorType::Process),
            _ => Err(ConfigError::UnknownExecutorType(s.to_string())),
        }
    }
}

/// Driver plugin launch settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Path of the plugin executable (run through `sh -c`)
    pub path: String,

    /// Extra arguments appended to the command line
    #[serde(default)]
    pub args: Vec<String>,
}

impl DriverConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }
}

/// Settings of the native executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeExecutorConfig {
    /// Concurrent transactions per unit (floored to 2)
    #[serde(default)]
    pub max_parallelism: usize,

    /// Cancel sibling work on the first failure
    #[serde(default)]
    pub cancel_on_error: bool,
}

/// Telemetry export settings passed to the external binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtlpExport {
    /// OTLP gRPC endpoint (`localhost:4317` when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_endpoint: Option<String>,

    /// Metric name prefix (`k6_` when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_prefix: Option<String>,
}

/// Settings of the process executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExecutorConfig {
    /// External load-testing binary
    pub binary_path: String,

    /// Script handed to the binary's `run` command
    pub script_path: String,

    /// Extra arguments appended after the generated ones
    #[serde(default)]
    pub binary_args: Vec<String>,

    /// Telemetry export; no OTEL variables are set when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_export: Option<OtlpExport>,
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log output style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    /// Human readable, colored
    #[default]
    Development,
    /// Compact, no ANSI escapes
    Production,
}

impl LogMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogMode::Development => "development",
            LogMode::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub mode: LogMode,
}

/// Run-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Seed for deterministic data generation
    #[serde(default)]
    pub seed: u64,

    /// Driver plugin settings (required by the native executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverConfig>,

    /// Native executor settings (required by the native executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_executor: Option<NativeExecutorConfig>,

    /// Process executor settings (required by the process executor)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_executor: Option<ProcessExecutorConfig>,

    #[serde(default)]
    pub logger: LoggerConfig,

    /// Capacity of the queue between a unit's transaction stream and its pool
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,
}

fn default_handoff_capacity() -> usize {
    64
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            driver: None,
            native_executor: None,
            process_executor: None,
            logger: LoggerConfig::default(),
            handoff_capacity: default_handoff_capacity(),
        }
    }
}

impl RunConfig {
    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the driver configuration.
    pub fn with_driver(mut self, driver: DriverConfig) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the native executor configuration.
    pub fn with_native_executor(mut self, native: NativeExecutorConfig) -> Self {
        self.native_executor = Some(native);
        self
    }

    /// Set the process executor configuration.
    pub fn with_process_executor(mut self, process: ProcessExecutorConfig) -> Self {
        self.process_executor = Some(process);
        self
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if is_json_path(path) {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_type_from_str() {
        assert_eq!("native".parse::<ExecutorType>().unwrap(), ExecutorType::Native);
        assert_eq!("PROCESS".parse::<ExecutorType>().unwrap(), ExecutorType::Process);
        let err = "jmeter".parse::<ExecutorType>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown executor type: 'jmeter'");
        assert_eq!(ExecutorType::default(), ExecutorType::Unspecified);
    }

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::from_yaml("seed: 7").unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.handoff_capacity, 64);
        assert_eq!(config.logger.level, LogLevel::Info);
        assert_eq!(config.logger.mode, LogMode::Development);
        assert!(config.driver.is_none());
        assert!(config.native_executor.is_none());
    }

    #[test]
    fn test_run_config_full() {
        let config = RunConfig::from_yaml(
            r#"
driver:
  path: /usr/local/bin/driver
  args: ["--dsn", "postgres://localhost"]
native_executor:
  max_parallelism: 16
  cancel_on_error: true
process_executor:
  binary_path: k6
  script_path: bench.js
  otlp_export:
    grpc_endpoint: collector:4317
logger:
  level: debug
  mode: production
handoff_capacity: 8
"#,
        )
        .unwrap();

        assert_eq!(config.driver.unwrap().args.len(), 2);
        let native = config.native_executor.unwrap();
        assert_eq!(native.max_parallelism, 16);
        assert!(native.cancel_on_error);
        let process = config.process_executor.unwrap();
        assert_eq!(
            process.otlp_export.unwrap().grpc_endpoint.as_deref(),
            Some("collector:4317")
        );
        assert_eq!(config.logger.level.as_str(), "debug");
        assert_eq!(config.logger.mode.as_str(), "production");
        assert_eq!(config.handoff_capacity, 8);
    }

    #[test]
    fn test_run_config_json() {
        let config = RunConfig::default().with_seed(3);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(RunConfig::from_json(&json).unwrap(), config);
    }
}
