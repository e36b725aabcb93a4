//! Engine facade: validate candidate graphs and execute validated ones.
//!
//! The engine owns the shared, read-only collaborators (directory,
//! dispatcher, config). Every `execute` call creates a fresh run id, tracer
//! and context, so nothing leaks between runs.

use std::sync::Arc;
use std::time::Duration;

use meshflow_types::config::EngineConfig;
use meshflow_types::graph::CandidateGraph;
use meshflow_types::run::RunResult;
use serde_json::Value;
use uuid::Uuid;

use super::scheduler::Scheduler;
use super::tracer::ExecutionTracer;
use super::validator::{GraphValidator, ValidatedGraph, ValidationError};
use crate::directory::ServiceDirectory;
use crate::dispatch::CallDispatcher;

pub struct Engine {
    directory: Arc<dyn ServiceDirectory>,
    validator: GraphValidator,
    scheduler: Scheduler,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        directory: Arc<dyn ServiceDirectory>,
        dispatcher: Arc<dyn CallDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            directory,
            validator: GraphValidator::from_config(&config),
            scheduler: Scheduler::new(dispatcher, &config),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn directory(&self) -> &dyn ServiceDirectory {
        self.directory.as_ref()
    }

    /// Validate a planner graph against the directory.
    pub fn validate(&self, graph: &CandidateGraph) -> Result<ValidatedGraph, ValidationError> {
        let result = self.validator.validate(graph, self.directory.as_ref());
        match &result {
            Ok(validated) => tracing::debug!(
                graph = graph.name.as_deref().unwrap_or("<unnamed>"),
                nodes = validated.len(),
                levels = validated.levels().len(),
                "graph validated"
            ),
            Err(err) => tracing::info!(
                graph = graph.name.as_deref().unwrap_or("<unnamed>"),
                kind = err.kind(),
                error = %err,
                "graph rejected"
            ),
        }
        result
    }

    /// Execute a validated graph using the configured run deadline.
    pub async fn execute(&self, graph: &ValidatedGraph, payload: Value) -> RunResult {
        self.execute_with_deadline(graph, payload, self.config.run_deadline())
            .await
    }

    /// Execute with an explicit deadline, overriding the configured one.
    pub async fn execute_with_deadline(
        &self,
        graph: &ValidatedGraph,
        payload: Value,
        deadline: Option<Duration>,
    ) -> RunResult {
        let tracer = Arc::new(ExecutionTracer::new(Uuid::now_v7()));
        self.scheduler
            .execute(graph, payload, tracer, deadline)
            .await
    }
}
