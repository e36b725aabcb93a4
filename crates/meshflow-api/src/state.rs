//! Shared application state for CLI commands.
//!
//! Loads the engine configuration and service registry once, then builds the
//! engine on demand for commands that validate or execute graphs.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use meshflow_core::directory::InMemoryDirectory;
use meshflow_core::dispatch::CallDispatcher;
use meshflow_core::workflow::engine::Engine;
use meshflow_infra::config::{load_engine_config, resolve_parallelism};
use meshflow_infra::http_dispatcher::HttpDispatcher;
use meshflow_infra::registry::load_registry;
use meshflow_types::config::EngineConfig;

pub struct AppState {
    pub config: EngineConfig,
    pub directory: Arc<InMemoryDirectory>,
}

impl AppState {
    /// Load config (defaults when no path is given) and the registry file.
    pub async fn load(registry: &Path, config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => load_engine_config(path).await,
            None => EngineConfig::default(),
        };
        let directory = load_registry(registry)
            .await
            .context("Failed to load service registry")?;

        tracing::debug!(
            registry = %registry.display(),
            services = directory.len(),
            max_parallelism = config.max_parallelism,
            "application state loaded"
        );

        Ok(Self {
            config,
            directory: Arc::new(directory),
        })
    }

    /// Apply command-line overrides on top of the loaded config.
    pub fn apply_overrides(&mut self, parallelism: Option<usize>, deadline_ms: Option<u64>) {
        self.config.max_parallelism = resolve_parallelism(&self.config, parallelism);
        if deadline_ms.is_some() {
            self.config.run_deadline_ms = deadline_ms;
        }
    }

    /// Engine that dispatches over HTTP.
    pub fn http_engine(&self) -> Result<Engine> {
        let dispatcher: Arc<dyn CallDispatcher> =
            Arc::new(HttpDispatcher::new().context("Failed to build HTTP client")?);
        Ok(self.engine_with(dispatcher))
    }

    pub fn engine_with(&self, dispatcher: Arc<dyn CallDispatcher>) -> Engine {
        Engine::new(self.directory.clone(), dispatcher, self.config.clone())
    }
}
