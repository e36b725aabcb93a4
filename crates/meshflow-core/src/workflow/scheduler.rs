//! Dependency-driven concurrent executor.
//!
//! Nodes run as soon as every dependency has succeeded, not level by level.
//! Each ready node is spawned into a `tokio::JoinSet` and holds one semaphore
//! permit for its whole attempt sequence. The scheduler loop:
//!
//! 1. Spawns the entry nodes (lowest level first, then by id).
//! 2. Waits for the next node task or the run deadline.
//! 3. On success, spawns dependents whose dependencies have all succeeded.
//! 4. On failure, marks every pending transitive dependent `skipped`.
//! 5. On deadline, cancels the run token; tasks observe it at their next
//!    suspension point (permit wait, call, backoff sleep).
//!
//! `execute` never returns an error: every outcome is folded into the
//! `RunResult` and its trace.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::FutureExt;
use meshflow_types::config::EngineConfig;
use meshflow_types::graph::NodeSpec;
use meshflow_types::run::{
    AttemptErrorKind, AttemptOutcome, AttemptRecord, ExecutionTrace, NodeReport, NodeStatus,
    RunResult, RunStatus, TerminalReason,
};
use meshflow_types::service::ServiceDescriptor;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::ExecutionContext;
use super::policy::{AttemptPlan, Backoff, CursorStep, PolicyResolver};
use super::schema::check_conformance;
use super::tracer::ExecutionTracer;
use super::validator::ValidatedGraph;
use crate::dispatch::CallDispatcher;

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Executes validated graphs against a call dispatcher.
///
/// Holds no per-run state; one scheduler can drive many runs.
pub struct Scheduler {
    dispatcher: Arc<dyn CallDispatcher>,
    policy: PolicyResolver,
    backoff: Backoff,
    max_parallelism: usize,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<dyn CallDispatcher>, config: &EngineConfig) -> Self {
        Self {
            dispatcher,
            policy: PolicyResolver::from_config(config),
            backoff: Backoff::new(config.backoff.clone()),
            max_parallelism: config.max_parallelism.clamp(1, Semaphore::MAX_PERMITS),
        }
    }

    /// Run `graph` to completion with `payload` as the run input.
    ///
    /// Attempts and transitions go to `tracer`, which is finalized into the
    /// returned trace.
    pub async fn execute(
        &self,
        graph: &ValidatedGraph,
        payload: Value,
        tracer: Arc<ExecutionTracer>,
        deadline: Option<Duration>,
    ) -> RunResult {
        let run_id = tracer.run_id();
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            run_id = %run_id,
            nodes = graph.len(),
            max_parallelism = self.max_parallelism,
            deadline_ms = deadline.map(|d| d.as_millis() as u64),
            "workflow run started"
        );

        let mut run = Run {
            scheduler: self,
            graph,
            handles: RunHandles {
                ctx: Arc::new(ExecutionContext::new(run_id, payload, graph.node_ids())),
                tracer: Arc::clone(&tracer),
            },
            slots: Arc::new(Semaphore::new(self.max_parallelism)),
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            reasons: HashMap::new(),
        };

        let entry = graph.entry_nodes().into_iter().map(String::from).collect();
        run.spawn_ready(entry);

        let deadline_at = deadline.map(|d| tokio::time::Instant::now() + d);
        let deadline_sleep = async move {
            match deadline_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline_sleep);

        while !run.tasks.is_empty() {
            tokio::select! {
                _ = &mut deadline_sleep, if !run.cancel.is_cancelled() => {
                    warn!(run_id = %run_id, "run deadline exceeded, cancelling in-flight nodes");
                    run.cancel.cancel();
                }
                joined = run.tasks.join_next() => match joined {
                    Some(Ok((node_id, outcome))) => run.on_node_finished(node_id, outcome),
                    Some(Err(err)) => {
                        tracing::error!(run_id = %run_id, error = %err, "node task aborted");
                    }
                    None => break,
                },
            }
        }

        run.sweep_unfinished();
        let (ctx, reasons) = (Arc::clone(&run.handles.ctx), run.reasons);

        let nodes: BTreeMap<String, NodeReport> = graph
            .node_ids()
            .map(|id| {
                let report = NodeReport {
                    status: ctx.status(id).unwrap_or(NodeStatus::Skipped),
                    attempts: tracer.attempt_count(id),
                    reason: reasons.get(id).cloned(),
                };
                (id.to_string(), report)
            })
            .collect();
        let status = RunStatus::from_reports(nodes.values());

        let trace = match tracer.finalize(nodes.clone()) {
            Ok(trace) => trace,
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "trace unavailable, returning node reports only");
                ExecutionTrace {
                    run_id,
                    attempts: Vec::new(),
                    transitions: Vec::new(),
                    nodes,
                }
            }
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        let result = RunResult {
            run_id,
            status,
            outputs: ctx.outputs(),
            trace,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        };

        let (succeeded, failed, skipped) = result.partition();
        info!(
            run_id = %run_id,
            status = %status,
            succeeded,
            failed,
            skipped,
            duration_ms,
            "workflow run finished"
        );
        result
    }
}

// ---------------------------------------------------------------------------
// Per-run bookkeeping
// ---------------------------------------------------------------------------

/// How a node task ended.
#[derive(Debug)]
enum NodeOutcome {
    Succeeded,
    Failed(TerminalReason),
    /// The run deadline fired before the node finished.
    Cancelled,
}

/// Shared handles a node task needs to report progress.
#[derive(Clone)]
struct RunHandles {
    ctx: Arc<ExecutionContext>,
    tracer: Arc<ExecutionTracer>,
}

impl RunHandles {
    fn transition(&self, node_id: &str, to: NodeStatus) {
        if let Some(from) = self.ctx.set_status(node_id, to) {
            if from != to {
                self.tracer.record_transition(node_id, from, to);
            }
        }
    }
}

struct Run<'g> {
    scheduler: &'g Scheduler,
    graph: &'g ValidatedGraph,
    handles: RunHandles,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
    tasks: JoinSet<(String, NodeOutcome)>,
    reasons: HashMap<String, TerminalReason>,
}

impl Run<'_> {
    /// Mark nodes ready and spawn them, lowest level first, then by id.
    fn spawn_ready(&mut self, mut ready: Vec<String>) {
        let graph = self.graph;
        ready.sort_by_key(|id| (graph.level(id).unwrap_or(0), id.clone()));

        for node_id in ready {
            let (Some(node), Some(descriptor)) = (graph.node(&node_id), graph.descriptor(&node_id))
            else {
                continue;
            };
            let plan = self.scheduler.policy.resolve(node, descriptor);
            self.handles.transition(&node_id, NodeStatus::Ready);

            debug!(
                run_id = %self.handles.ctx.run_id(),
                node_id = %node_id,
                service = %descriptor.name,
                targets = plan.targets.len(),
                max_attempts = plan.max_total_attempts(),
                "node ready"
            );

            let job = NodeJob {
                node: node.clone(),
                descriptor: Arc::clone(descriptor),
                plan,
                run: self.handles.clone(),
                dispatcher: Arc::clone(&self.scheduler.dispatcher),
                backoff: self.scheduler.backoff.clone(),
                slots: Arc::clone(&self.slots),
                cancel: self.cancel.clone(),
            };

            self.tasks.spawn(async move {
                let outcome = AssertUnwindSafe(job.run())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        NodeOutcome::Failed(TerminalReason::Panicked {
                            message: panic_message(panic.as_ref()),
                        })
                    });
                (node_id, outcome)
            });
        }
    }

    fn on_node_finished(&mut self, node_id: String, outcome: NodeOutcome) {
        let run_id = self.handles.ctx.run_id();
        match outcome {
            NodeOutcome::Succeeded => {
                self.handles.transition(&node_id, NodeStatus::Succeeded);
                if self.cancel.is_cancelled() {
                    return;
                }
                let graph = self.graph;
                let ready = graph
                    .dependents(&node_id)
                    .iter()
                    .filter(|id| {
                        self.handles.ctx.status(id) == Some(NodeStatus::Pending)
                            && self.handles.ctx.all_succeeded(graph.dependencies(id))
                    })
                    .cloned()
                    .collect();
                self.spawn_ready(ready);
            }
            NodeOutcome::Failed(reason) => {
                warn!(run_id = %run_id, node_id = %node_id, reason = %reason, "node failed");
                self.handles.transition(&node_id, NodeStatus::Failed);
                self.reasons.insert(node_id.clone(), reason);
                self.skip_dependents(&node_id);
            }
            NodeOutcome::Cancelled => {
                self.handles.transition(&node_id, NodeStatus::Skipped);
                self.reasons
                    .insert(node_id, TerminalReason::DeadlineExceeded);
            }
        }
    }

    /// Skip every pending transitive dependent of a failed node.
    fn skip_dependents(&mut self, failed: &str) {
        let graph = self.graph;
        let mut queue: VecDeque<&str> = graph.dependents(failed).iter().map(String::as_str).collect();
        while let Some(node_id) = queue.pop_front() {
            if self.handles.ctx.status(node_id) != Some(NodeStatus::Pending) {
                continue;
            }
            debug!(node_id, upstream = failed, "skipping node after upstream failure");
            self.handles.transition(node_id, NodeStatus::Skipped);
            self.reasons.insert(
                node_id.to_string(),
                TerminalReason::UpstreamFailed {
                    node: failed.to_string(),
                },
            );
            queue.extend(graph.dependents(node_id).iter().map(String::as_str));
        }
    }

    /// Close out nodes left non-terminal once no task remains.
    fn sweep_unfinished(&mut self) {
        let deadline_hit = self.cancel.is_cancelled();
        for node_id in self.graph.node_ids() {
            if self
                .handles
                .ctx
                .status(node_id)
                .is_some_and(NodeStatus::is_terminal)
            {
                continue;
            }
            let (status, reason) = if deadline_hit {
                (NodeStatus::Skipped, TerminalReason::DeadlineExceeded)
            } else {
                (
                    NodeStatus::Failed,
                    TerminalReason::Panicked {
                        message: "node task aborted".to_string(),
                    },
                )
            };
            self.handles.transition(node_id, status);
            self.reasons.insert(node_id.to_string(), reason);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Node task
// ---------------------------------------------------------------------------

/// Everything one node task owns.
struct NodeJob {
    node: NodeSpec,
    descriptor: Arc<ServiceDescriptor>,
    plan: AttemptPlan,
    run: RunHandles,
    dispatcher: Arc<dyn CallDispatcher>,
    backoff: Backoff,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl NodeJob {
    async fn run(self) -> NodeOutcome {
        let run_id = self.run.ctx.run_id();
        let node_id = self.node.id.as_str();

        let _slot = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return NodeOutcome::Cancelled,
            permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return NodeOutcome::Cancelled,
            },
        };
        self.run.transition(node_id, NodeStatus::Running);

        let request = match self.run.ctx.build_request(&self.node) {
            Ok(request) => request,
            Err(detail) => return NodeOutcome::Failed(TerminalReason::InvalidInput { detail }),
        };

        let mut cursor = self.plan.cursor();
        loop {
            let Some(target) = self.plan.target(cursor.target_index()) else {
                return NodeOutcome::Failed(TerminalReason::Exhausted {
                    last_error: "attempt plan has no targets".to_string(),
                });
            };

            debug!(
                run_id = %run_id,
                node_id,
                endpoint = %target.endpoint,
                attempt = cursor.attempt(),
                sequence = cursor.sequence(),
                "dispatching attempt"
            );

            let started_at = Utc::now();
            let clock = Instant::now();
            let call = tokio::time::timeout(
                self.plan.timeout,
                self.dispatcher
                    .call(&target.endpoint, &request, self.plan.timeout),
            );
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = call => Some(result),
            };
            let cancelled = result.is_none();

            let (outcome, output) = match result {
                None => (
                    AttemptOutcome::Error {
                        kind: AttemptErrorKind::Cancelled,
                        message: "run deadline exceeded".to_string(),
                    },
                    None,
                ),
                Some(Err(_elapsed)) => (AttemptOutcome::Timeout, None),
                Some(Ok(Err(err))) => (err.to_outcome(), None),
                Some(Ok(Ok(value))) => {
                    match check_conformance(&value, &self.descriptor.output_schema) {
                        Ok(()) => (AttemptOutcome::Success, Some(value)),
                        Err(detail) => (
                            AttemptOutcome::Error {
                                kind: AttemptErrorKind::SchemaMismatch,
                                message: detail,
                            },
                            None,
                        ),
                    }
                }
            };

            self.run.tracer.record(AttemptRecord {
                node_id: node_id.to_string(),
                service: self.descriptor.name.clone(),
                endpoint: target.endpoint.clone(),
                target_index: cursor.target_index(),
                attempt: cursor.attempt(),
                sequence: cursor.sequence(),
                started_at,
                finished_at: Utc::now(),
                outcome: outcome.clone(),
                latency_ms: clock.elapsed().as_millis() as u64,
            });

            if let Some(output) = output {
                self.run.ctx.record_output(node_id, output);
                debug!(
                    run_id = %run_id,
                    node_id,
                    endpoint = %target.endpoint,
                    attempts = cursor.sequence(),
                    "node succeeded"
                );
                return NodeOutcome::Succeeded;
            }
            if cancelled {
                return NodeOutcome::Cancelled;
            }

            warn!(
                run_id = %run_id,
                node_id,
                endpoint = %target.endpoint,
                attempt = cursor.attempt(),
                error = %outcome,
                "attempt failed"
            );

            let failed_attempt = cursor.attempt();
            match cursor.advance() {
                CursorStep::Retry => {
                    let delay = self.backoff.delay(failed_attempt);
                    debug!(
                        run_id = %run_id,
                        node_id,
                        backoff_ms = delay.as_millis() as u64,
                        "retrying after backoff"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return NodeOutcome::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                CursorStep::Fallback => {
                    let next = self
                        .plan
                        .target(cursor.target_index())
                        .map(|t| t.endpoint.as_str())
                        .unwrap_or_default();
                    warn!(
                        run_id = %run_id,
                        node_id,
                        failed_endpoint = %target.endpoint,
                        endpoint = next,
                        "endpoint exhausted, trying next fallback"
                    );
                }
                CursorStep::Exhausted => {
                    return NodeOutcome::Failed(TerminalReason::Exhausted {
                        last_error: outcome.to_string(),
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
