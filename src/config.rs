//! Configuration for the event triage engine.

use crate::core::router::FailurePolicy;
use crate::resolver::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::source::DEFAULT_ACCEPT_PREFIX;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the triage pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Debounce period: the window closes after this long with no arrivals
    pub window_ms: u64,

    /// Optional hard cap on total window lifetime (safety valve against a
    /// sustained sub-period trickle)
    pub max_window_ms: Option<u64>,

    /// What to do with an ambiguous window when resolution fails
    pub failure_policy: FailurePolicy,

    /// Payload prefix a transport message must carry to become an event
    pub accept_prefix: String,

    /// Resolution backend invocation
    pub resolver: ResolverConfig,

    /// Path of the output record log (JSON lines)
    pub output_path: PathBuf,

    /// Path for telemetry rows and other engine data
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("event-triage");

        Self {
            window_ms: crate::core::WindowAggregator::DEFAULT_WINDOW_MS,
            max_window_ms: None,
            failure_policy: FailurePolicy::default(),
            accept_prefix: DEFAULT_ACCEPT_PREFIX.to_string(),
            resolver: ResolverConfig::default(),
            output_path: data_dir.join("records.jsonl"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("event-triage")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(parent) = self.output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Debounce period as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Window lifetime cap as a `Duration`, if configured.
    pub fn max_window(&self) -> Option<Duration> {
        self.max_window_ms.map(Duration::from_millis)
    }
}

/// Invocation of the external resolution backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Program to run for one resolution attempt (camera + inference)
    pub command: Option<PathBuf>,
    /// Extra arguments passed to the program
    pub args: Vec<String>,
    /// Threshold applied when the backend reports only a confidence score
    pub confidence_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window_ms, 1000);
        assert_eq!(config.max_window_ms, None);
        assert_eq!(config.failure_policy, FailurePolicy::Drop);
        assert_eq!(config.resolver.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn test_round_trip_serialization() {
        let mut config = Config::default();
        config.window_ms = 500;
        config.failure_policy = FailurePolicy::EmitUnresolved;

        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.window_ms, 500);
        assert_eq!(parsed.failure_policy, FailurePolicy::EmitUnresolved);
    }

    #[test]
    fn test_failure_policy_wire_form() {
        let json = serde_json::to_string(&FailurePolicy::EmitUnresolved).unwrap();
        assert_eq!(json, "\"emit_unresolved\"");
    }
}
