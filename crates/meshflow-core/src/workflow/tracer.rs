//! Execution tracer: append-only record of attempts and node transitions.
//!
//! Node tasks record attempts concurrently; the scheduler records status
//! transitions. `finalize` hands back an ordered, immutable `ExecutionTrace`
//! exactly once.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use meshflow_types::run::{AttemptRecord, ExecutionTrace, NodeReport, NodeStatus, NodeTransition};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceError {
    #[error("trace for run {0} was already finalized")]
    AlreadyFinalized(Uuid),
}

#[derive(Debug, Default)]
struct TraceBuffer {
    attempts: Vec<(u64, AttemptRecord)>,
    transitions: Vec<NodeTransition>,
    next_sequence: u64,
    finalized: bool,
}

/// Thread-safe trace accumulator for one run.
#[derive(Debug)]
pub struct ExecutionTracer {
    run_id: Uuid,
    buffer: Mutex<TraceBuffer>,
}

impl ExecutionTracer {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            buffer: Mutex::new(TraceBuffer::default()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn buffer(&self) -> MutexGuard<'_, TraceBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an attempt record.
    pub fn record(&self, record: AttemptRecord) {
        let mut buffer = self.buffer();
        if buffer.finalized {
            tracing::warn!(
                run_id = %self.run_id,
                node_id = %record.node_id,
                "attempt recorded after trace was finalized; dropping"
            );
            return;
        }
        let sequence = buffer.next_sequence;
        buffer.next_sequence += 1;
        buffer.attempts.push((sequence, record));
    }

    /// Append a node status transition.
    pub fn record_transition(&self, node_id: &str, from: NodeStatus, to: NodeStatus) {
        let mut buffer = self.buffer();
        if buffer.finalized {
            tracing::warn!(
                run_id = %self.run_id,
                node_id,
                "transition recorded after trace was finalized; dropping"
            );
            return;
        }
        buffer.transitions.push(NodeTransition {
            node_id: node_id.to_string(),
            from,
            to,
            at: Utc::now(),
        });
    }

    /// Number of attempts recorded so far for a node.
    pub fn attempt_count(&self, node_id: &str) -> u32 {
        let count = self
            .buffer()
            .attempts
            .iter()
            .filter(|(_, r)| r.node_id == node_id)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Produce the ordered trace. Attempts are sorted by start time, ties
    /// broken by record order.
    pub fn finalize(
        &self,
        nodes: BTreeMap<String, NodeReport>,
    ) -> Result<ExecutionTrace, TraceError> {
        let mut buffer = self.buffer();
        if buffer.finalized {
            return Err(TraceError::AlreadyFinalized(self.run_id));
        }
        buffer.finalized = true;

        let mut attempts = std::mem::take(&mut buffer.attempts);
        attempts.sort_by(|(seq_a, a), (seq_b, b)| {
            a.started_at.cmp(&b.started_at).then(seq_a.cmp(seq_b))
        });

        Ok(ExecutionTrace {
            run_id: self.run_id,
            attempts: attempts.into_iter().map(|(_, r)| r).collect(),
            transitions: std::mem::take(&mut buffer.transitions),
            nodes,
        })
    }
}
