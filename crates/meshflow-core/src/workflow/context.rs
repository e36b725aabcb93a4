//! Per-run execution context: payload, output slots and node status table.
//!
//! `ExecutionContext` is shared between the scheduler loop and node tasks.
//! Outputs live in a `DashMap` with exactly one writer per key (the node's own
//! task); only the status table sits behind a mutex.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use meshflow_types::graph::{InputBinding, NodeSpec};
use meshflow_types::run::NodeStatus;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Mutable state of one run.
#[derive(Debug)]
pub struct ExecutionContext {
    run_id: Uuid,
    payload: Value,
    outputs: DashMap<String, Value>,
    status: Mutex<HashMap<String, NodeStatus>>,
}

impl ExecutionContext {
    /// Create a context with every node `pending`.
    pub fn new<'a>(run_id: Uuid, payload: Value, node_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let status = node_ids
            .into_iter()
            .map(|id| (id.to_string(), NodeStatus::Pending))
            .collect();
        Self {
            run_id,
            payload,
            outputs: DashMap::new(),
            status: Mutex::new(status),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    // -----------------------------------------------------------------------
    // Outputs
    // -----------------------------------------------------------------------

    /// Store a node's output. Each slot is written once; returns `false` if
    /// the slot was already filled.
    pub fn record_output(&self, node_id: &str, output: Value) -> bool {
        match self.outputs.entry(node_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(output);
                true
            }
        }
    }

    pub fn output(&self, node_id: &str) -> Option<Value> {
        self.outputs.get(node_id).map(|v| v.value().clone())
    }

    pub fn outputs(&self) -> BTreeMap<String, Value> {
        self.outputs
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Status table
    // -----------------------------------------------------------------------

    fn status_table(&self) -> MutexGuard<'_, HashMap<String, NodeStatus>> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.status_table().get(node_id).copied()
    }

    /// Set a node's status, returning the previous one.
    pub fn set_status(&self, node_id: &str, to: NodeStatus) -> Option<NodeStatus> {
        self.status_table().insert(node_id.to_string(), to)
    }

    pub fn statuses(&self) -> BTreeMap<String, NodeStatus> {
        self.status_table()
            .iter()
            .map(|(id, s)| (id.clone(), *s))
            .collect()
    }

    /// Whether every listed node has succeeded.
    pub fn all_succeeded<'a>(&self, node_ids: impl IntoIterator<Item = &'a String>) -> bool {
        let table = self.status_table();
        node_ids
            .into_iter()
            .all(|id| table.get(id) == Some(&NodeStatus::Succeeded))
    }

    // -----------------------------------------------------------------------
    // Request building
    // -----------------------------------------------------------------------

    /// Assemble the request body for a node from its bindings.
    ///
    /// A node without bindings receives the run payload unchanged; otherwise
    /// the request is an object with one entry per bound input.
    pub fn build_request(&self, node: &NodeSpec) -> Result<Value, String> {
        if node.inputs.is_empty() {
            return Ok(self.payload.clone());
        }
        let mut request = Map::new();
        for (field, binding) in &node.inputs {
            request.insert(field.clone(), self.resolve_binding(binding)?);
        }
        Ok(Value::Object(request))
    }

    fn resolve_binding(&self, binding: &InputBinding) -> Result<Value, String> {
        match binding {
            InputBinding::Literal { value } => Ok(value.clone()),
            InputBinding::Payload { field: None } => Ok(self.payload.clone()),
            InputBinding::Payload { field: Some(field) } => self
                .payload
                .get(field)
                .cloned()
                .ok_or_else(|| format!("run payload has no field '{field}'")),
            InputBinding::Node { node, field } => {
                let output = self
                    .outputs
                    .get(node)
                    .ok_or_else(|| format!("no output recorded for node '{node}'"))?;
                output
                    .get(field)
                    .cloned()
                    .ok_or_else(|| format!("output of node '{node}' has no field '{field}'"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn context(payload: Value) -> ExecutionContext {
        ExecutionContext::new(Uuid::now_v7(), payload, ["fetch", "enrich"])
    }

    #[test]
    fn test_output_slot_written_once() {
        let ctx = context(json!({}));
        assert!(ctx.record_output("fetch", json!({"id": 1})));
        assert!(!ctx.record_output("fetch", json!({"id": 2})));
        assert_eq!(ctx.output("fetch"), Some(json!({"id": 1})));
        assert_eq!(ctx.outputs().len(), 1);
    }

    #[test]
    fn test_status_transitions() {
        let ctx = context(json!({}));
        assert_eq!(ctx.status("fetch"), Some(NodeStatus::Pending));
        assert_eq!(
            ctx.set_status("fetch", NodeStatus::Running),
            Some(NodeStatus::Pending)
        );
        ctx.set_status("fetch", NodeStatus::Succeeded);
        assert!(ctx.all_succeeded(&["fetch".to_string()]));
        assert!(!ctx.all_succeeded(&["fetch".to_string(), "enrich".to_string()]));
        assert_eq!(ctx.statuses().len(), 2);
    }

    #[test]
    fn test_request_without_bindings_is_payload() {
        let ctx = context(json!({"user_id": "u1"}));
        let request = ctx.build_request(&NodeSpec::new("fetch", "svc")).unwrap();
        assert_eq!(request, json!({"user_id": "u1"}));
    }

    #[test]
    fn test_request_from_bindings() {
        let ctx = context(json!({"user_id": "u1", "other": true}));
        ctx.record_output("fetch", json!({"id": 42, "name": "Ada"}));

        let node = NodeSpec::new("enrich", "svc")
            .with_input("id", InputBinding::node("fetch", "id"))
            .with_input("user", InputBinding::payload_field("user_id"))
            .with_input("mode", InputBinding::literal("full"))
            .with_input("all", InputBinding::payload());
        let request = ctx.build_request(&node).unwrap();
        assert_eq!(
            request,
            json!({
                "id": 42,
                "user": "u1",
                "mode": "full",
                "all": {"user_id": "u1", "other": true},
            })
        );
    }

    #[test]
    fn test_unresolvable_bindings() {
        let ctx = context(json!({}));
        let node = NodeSpec::new("enrich", "svc").with_input("q", InputBinding::payload_field("q"));
        assert_eq!(
            ctx.build_request(&node).unwrap_err(),
            "run payload has no field 'q'"
        );

        let node = NodeSpec::new("enrich", "svc").with_input("id", InputBinding::node("fetch", "id"));
        assert!(ctx.build_request(&node).unwrap_err().contains("no output recorded"));

        ctx.record_output("fetch", json!({"name": "Ada"}));
        assert_eq!(
            ctx.build_request(&node).unwrap_err(),
            "output of node 'fetch' has no field 'id'"
        );
    }
}
