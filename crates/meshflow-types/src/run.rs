//! Run-time types: node statuses, attempt records, traces and run results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Node status
// ---------------------------------------------------------------------------

/// Lifecycle of a node within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Ready => "ready",
            NodeStatus::Running => "running",
            NodeStatus::Succeeded => "succeeded",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

/// Why a single call attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptErrorKind {
    /// Connection or I/O failure.
    Transport,
    /// Non-success response status.
    Status,
    /// Response body could not be decoded.
    InvalidResponse,
    /// Output did not conform to the service's output schema.
    SchemaMismatch,
    /// The run deadline fired while the call was in flight.
    Cancelled,
}

impl std::fmt::Display for AttemptErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttemptErrorKind::Transport => "transport",
            AttemptErrorKind::Status => "status",
            AttemptErrorKind::InvalidResponse => "invalid_response",
            AttemptErrorKind::SchemaMismatch => "schema_mismatch",
            AttemptErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Error {
        kind: AttemptErrorKind,
        message: String,
    },
    Timeout,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Success => f.write_str("success"),
            AttemptOutcome::Error { kind, message } => write!(f, "{kind}: {message}"),
            AttemptOutcome::Timeout => f.write_str("timeout"),
        }
    }
}

/// One call attempt against one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub node_id: String,
    pub service: String,
    pub endpoint: String,
    /// 0 = primary endpoint, 1.. = fallbacks in order.
    pub target_index: usize,
    /// 1-based attempt number within the target.
    pub attempt: u32,
    /// 1-based attempt number across all targets of the node.
    pub sequence: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// A node status change, in the order the scheduler applied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTransition {
    pub node_id: String,
    pub from: NodeStatus,
    pub to: NodeStatus,
    pub at: DateTime<Utc>,
}

/// Why a node ended without succeeding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminalReason {
    /// Every target in the attempt plan failed.
    Exhausted { last_error: String },
    /// The request could not be assembled from the node's bindings.
    InvalidInput { detail: String },
    /// A transitive dependency failed.
    UpstreamFailed { node: String },
    /// The run deadline passed before the node finished.
    DeadlineExceeded,
    /// The node task panicked.
    Panicked { message: String },
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalReason::Exhausted { last_error } => {
                write!(f, "attempts exhausted (last error: {last_error})")
            }
            TerminalReason::InvalidInput { detail } => write!(f, "invalid input: {detail}"),
            TerminalReason::UpstreamFailed { node } => write!(f, "upstream node '{node}' failed"),
            TerminalReason::DeadlineExceeded => f.write_str("run deadline exceeded"),
            TerminalReason::Panicked { message } => write!(f, "node task panicked: {message}"),
        }
    }
}

/// Terminal summary for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub status: NodeStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<TerminalReason>,
}

/// Ordered, immutable record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub run_id: Uuid,
    /// Ordered by start time, ties broken by record order.
    pub attempts: Vec<AttemptRecord>,
    pub transitions: Vec<NodeTransition>,
    pub nodes: BTreeMap<String, NodeReport>,
}

impl ExecutionTrace {
    pub fn attempts_for<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a AttemptRecord> {
        self.attempts.iter().filter(move |a| a.node_id == node_id)
    }

    pub fn transitions_for<'a>(
        &'a self,
        node_id: &'a str,
    ) -> impl Iterator<Item = &'a NodeTransition> {
        self.transitions.iter().filter(move |t| t.node_id == node_id)
    }
}

// ---------------------------------------------------------------------------
// Run result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Partial,
    Failed,
    DeadlineExceeded,
}

impl RunStatus {
    /// Derive the run status from the terminal node partition.
    ///
    /// Any node skipped by the deadline makes the run `deadline_exceeded`.
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a NodeReport>) -> Self {
        let mut total = 0usize;
        let mut succeeded = 0usize;
        for report in reports {
            if report.reason == Some(TerminalReason::DeadlineExceeded) {
                return RunStatus::DeadlineExceeded;
            }
            total += 1;
            if report.status == NodeStatus::Succeeded {
                succeeded += 1;
            }
        }
        if succeeded == total {
            RunStatus::Succeeded
        } else if succeeded > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
            RunStatus::DeadlineExceeded => "deadline_exceeded",
        };
        f.write_str(s)
    }
}

/// Everything a caller gets back from one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Outputs of succeeded nodes.
    pub outputs: BTreeMap<String, Value>,
    pub trace: ExecutionTrace,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn node(&self, node_id: &str) -> Option<&NodeReport> {
        self.trace.nodes.get(node_id)
    }

    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.node(node_id).map(|r| r.status)
    }

    /// Count of nodes in each terminal state: (succeeded, failed, skipped).
    pub fn partition(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for report in self.trace.nodes.values() {
            match report.status {
                NodeStatus::Succeeded => counts.0 += 1,
                NodeStatus::Failed => counts.1 += 1,
                NodeStatus::Skipped => counts.2 += 1,
                _ => {}
            }
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
