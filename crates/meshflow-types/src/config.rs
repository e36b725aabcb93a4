//! Engine configuration types for meshflow.
//!
//! `EngineConfig` represents the `config.toml` that bounds concurrency, graph
//! size, retry budgets, timeouts and backoff for every run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine-wide settings shared by validation and execution.
///
/// All fields have sensible defaults, so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of nodes executing at once.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Largest graph the validator accepts.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,

    /// Attempts per target when neither node nor descriptor sets one.
    #[serde(default = "default_retry_limit")]
    pub default_retry_limit: u32,

    /// Optional upper bound on any resolved per-target attempt budget.
    /// Budgets are used as resolved when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_limit: Option<u32>,

    /// Per-attempt timeout when the descriptor does not set one.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Wall-clock bound on a whole run. Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_deadline_ms: Option<u64>,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_max_parallelism() -> usize {
    8
}

fn default_max_nodes() -> usize {
    256
}

fn default_retry_limit() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallelism: default_max_parallelism(),
            max_nodes: default_max_nodes(),
            default_retry_limit: default_retry_limit(),
            max_retry_limit: None,
            default_timeout_ms: default_timeout_ms(),
            run_deadline_ms: None,
            backoff: BackoffConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_ms.map(Duration::from_millis)
    }
}

/// Exponential backoff between attempts on the same target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiply each delay by a random factor in [0.8, 1.2].
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_jitter() -> bool {
    true
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_parallelism, 8);
        assert_eq!(config.max_nodes, 256);
        assert_eq!(config.default_retry_limit, 3);
        assert!(config.max_retry_limit.is_none());
        assert_eq!(config.default_timeout_ms, 5_000);
        assert!(config.run_deadline().is_none());
        assert_eq!(config.backoff.base_delay_ms, 200);
        assert_eq!(config.backoff.max_delay_ms, 5_000);
        assert!(config.backoff.jitter);
    }

    #[test]
    fn test_engine_config_deserialize_with_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
max_parallelism = 2
max_retry_limit = 4
run_deadline_ms = 30000

[backoff]
base_delay_ms = 50
jitter = false
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_parallelism, 2);
        assert_eq!(config.max_nodes, 256);
        assert_eq!(config.max_retry_limit, Some(4));
        assert_eq!(config.run_deadline(), Some(Duration::from_secs(30)));
        assert_eq!(config.backoff.base_delay_ms, 50);
        assert_eq!(config.backoff.max_delay_ms, 5_000);
        assert!(!config.backoff.jitter);
    }

    #[test]
    fn test_engine_config_serde_roundtrip() {
        let config = EngineConfig {
            run_deadline_ms: Some(1_500),
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
