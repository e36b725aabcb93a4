//! Engine configuration loader for meshflow.
//!
//! Reads a TOML file and deserializes it into [`EngineConfig`]. Falls back to
//! sensible defaults when the file is missing or malformed.

use std::path::Path;

use meshflow_types::config::EngineConfig;

/// Minimum number of concurrently executing nodes (safety floor).
const MIN_PARALLELISM: usize = 1;

/// Largest permit count a tokio semaphore accepts.
const MAX_PARALLELISM: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Load engine configuration from `path`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but cannot be read or parsed, logs a warning and returns the default.
/// - Otherwise returns the parsed config.
pub async fn load_engine_config(path: &Path) -> EngineConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            EngineConfig::default()
        }
    }
}

/// Resolve the effective parallelism.
///
/// A command-line override wins over the config file. The result is kept
/// within `[1, Semaphore::MAX_PERMITS]` regardless of source.
pub fn resolve_parallelism(config: &EngineConfig, cli_override: Option<usize>) -> usize {
    cli_override
        .unwrap_or(config.max_parallelism)
        .clamp(MIN_PARALLELISM, MAX_PARALLELISM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(&tmp.path().join("config.toml")).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        tokio::fs::write(
            &config_path,
            r#"
max_parallelism = 4
default_timeout_ms = 2500
run_deadline_ms = 60000

[backoff]
max_delay_ms = 1000
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(&config_path).await;
        assert_eq!(config.max_parallelism, 4);
        assert_eq!(config.default_timeout_ms, 2_500);
        assert_eq!(config.run_deadline_ms, Some(60_000));
        assert_eq!(config.backoff.max_delay_ms, 1_000);
        assert_eq!(config.backoff.base_delay_ms, 200);
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        tokio::fs::write(&config_path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(&config_path).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn resolve_parallelism_override_wins() {
        let config = EngineConfig::default();
        assert_eq!(resolve_parallelism(&config, Some(3)), 3);
        assert_eq!(resolve_parallelism(&config, None), 8);
    }

    #[test]
    fn resolve_parallelism_enforces_minimum() {
        let config = EngineConfig {
            max_parallelism: 0,
            ..EngineConfig::default()
        };
        assert_eq!(resolve_parallelism(&config, None), MIN_PARALLELISM);
        assert_eq!(resolve_parallelism(&config, Some(0)), MIN_PARALLELISM);
    }

    #[test]
    fn resolve_parallelism_enforces_maximum() {
        let config = EngineConfig {
            max_parallelism: usize::MAX,
            ..EngineConfig::default()
        };
        assert_eq!(resolve_parallelism(&config, None), MAX_PARALLELISM);
        assert_eq!(resolve_parallelism(&config, Some(usize::MAX)), MAX_PARALLELISM);
    }
}
