//! Candidate graph types produced by the planner.
//!
//! A candidate graph is a list of nodes, each naming a service and mapping its
//! input fields to bindings. Edges are never written down explicitly: a node
//! depends on every node its bindings name.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors from parsing a planner document.
#[derive(Debug, thiserror::Error)]
pub enum GraphParseError {
    #[error("invalid graph document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A planner-produced workflow graph. Untrusted until validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateGraph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl CandidateGraph {
    pub fn new(nodes: Vec<NodeSpec>) -> Self {
        Self { name: None, nodes }
    }

    /// Parse a planner JSON document.
    pub fn from_json(document: &str) -> Result<Self, GraphParseError> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Derived `(upstream, downstream)` edges, deduplicated and sorted.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges = BTreeSet::new();
        for node in &self.nodes {
            for upstream in node.upstream_nodes() {
                edges.insert((upstream.to_string(), node.id.clone()));
            }
        }
        edges.into_iter().collect()
    }
}

/// One service call in a candidate graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    /// Registry name of the service to call.
    pub service: String,
    /// Input field name -> where its value comes from.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputBinding>,
    /// Overrides the descriptor's per-target attempt budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,
    /// Overrides the descriptor's fallback list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_endpoints: Option<Vec<String>>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            inputs: BTreeMap::new(),
            retry_limit: None,
            fallback_endpoints: None,
        }
    }

    pub fn with_input(mut self, field: impl Into<String>, binding: InputBinding) -> Self {
        self.inputs.insert(field.into(), binding);
        self
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = Some(limit);
        self
    }

    pub fn with_fallbacks<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_endpoints = Some(endpoints.into_iter().map(Into::into).collect());
        self
    }

    /// Distinct ids of nodes this node's bindings read from.
    pub fn upstream_nodes(&self) -> BTreeSet<&str> {
        self.inputs
            .values()
            .filter_map(|b| match b {
                InputBinding::Node { node, .. } => Some(node.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Source of one input field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum InputBinding {
    /// A constant value.
    Literal { value: Value },
    /// The whole run payload, or one top-level field of it.
    Payload {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    /// A named output field of an upstream node.
    Node { node: String, field: String },
}

impl InputBinding {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    pub fn payload() -> Self {
        Self::Payload { field: None }
    }

    pub fn payload_field(field: impl Into<String>) -> Self {
        Self::Payload {
            field: Some(field.into()),
        }
    }

    pub fn node(node: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Node {
            node: node.into(),
            field: field.into(),
        }
    }
}

impl std::fmt::Display for InputBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputBinding::Literal { value } => write!(f, "literal {value}"),
            InputBinding::Payload { field: None } => write!(f, "payload"),
            InputBinding::Payload { field: Some(k) } => write!(f, "payload.{k}"),
            InputBinding::Node { node, field } => write!(f, "{node}.{field}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_planner_document() {
        let doc = r#"{
            "name": "enrich-user",
            "nodes": [
                { "id": "fetch", "service": "user-fetch",
                  "inputs": { "user_id": { "from": "payload", "field": "user_id" } } },
                { "id": "enrich", "service": "user-enrich",
                  "inputs": {
                      "id": { "from": "node", "node": "fetch", "field": "id" },
                      "mode": { "from": "literal", "value": "full" }
                  },
                  "retry_limit": 2 }
            ]
        }"#;
        let graph = CandidateGraph::from_json(doc).unwrap();
        assert_eq!(graph.name.as_deref(), Some("enrich-user"));
        assert_eq!(graph.nodes.len(), 2);

        let enrich = graph.node("enrich").unwrap();
        assert_eq!(enrich.retry_limit, Some(2));
        assert_eq!(enrich.inputs["id"], InputBinding::node("fetch", "id"));
        assert_eq!(enrich.inputs["mode"], InputBinding::literal("full"));
        assert_eq!(
            graph.node("fetch").unwrap().inputs["user_id"],
            InputBinding::payload_field("user_id")
        );
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = CandidateGraph::from_json("{ not json").unwrap_err();
        assert!(err.to_string().starts_with("invalid graph document"));

        let err = CandidateGraph::from_json(r#"{"nodes":[{"id":"a"}]}"#).unwrap_err();
        assert!(err.to_string().contains("service"));
    }

    #[test]
    fn test_edges_are_derived_and_deduplicated() {
        let graph = CandidateGraph::new(vec![
            NodeSpec::new("a", "svc"),
            NodeSpec::new("b", "svc")
                .with_input("x", InputBinding::node("a", "x"))
                .with_input("y", InputBinding::node("a", "y")),
            NodeSpec::new("c", "svc")
                .with_input("x", InputBinding::node("b", "x"))
                .with_input("p", InputBinding::payload()),
        ]);
        assert_eq!(
            graph.edges(),
            vec![
                ("a".to_string(), "b".to_string()),
                ("b".to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn test_binding_display() {
        assert_eq!(InputBinding::node("fetch", "id").to_string(), "fetch.id");
        assert_eq!(InputBinding::payload().to_string(), "payload");
        assert_eq!(InputBinding::payload_field("q").to_string(), "payload.q");
    }

    #[test]
    fn test_binding_serializes_with_tag() {
        let json = serde_json::to_value(InputBinding::payload()).unwrap();
        assert_eq!(json, serde_json::json!({ "from": "payload" }));
    }
}
