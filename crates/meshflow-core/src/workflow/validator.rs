//! Graph validation: structure, service resolution, cycle detection and
//! schema compatibility.
//!
//! Uses `petgraph` to model binding-derived edges as a directed graph.
//! Topological sort detects cycles, strongly connected components name the
//! offending members, and depth-based levels order ready-node dispatch.
//!
//! Checks run in a fixed order and stop at the first violation, so the same
//! graph and directory always produce the same error.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use meshflow_types::config::EngineConfig;
use meshflow_types::graph::{CandidateGraph, InputBinding, NodeSpec};
use meshflow_types::service::{FieldType, ServiceDescriptor};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;

use super::schema::{is_assignable, value_matches, value_type};
use crate::directory::ServiceDirectory;

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Reasons a candidate graph is rejected. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("graph has {count} nodes, limit is {limit}")]
    GraphTooLarge { count: usize, limit: usize },

    #[error("node id '{node_id}' is used more than once")]
    DuplicateNode { node_id: String },

    #[error("invalid node '{node_id}': {detail}")]
    InvalidNode { node_id: String, detail: String },

    #[error("node '{node_id}' binds input '{field}' to unknown node '{dependency}'")]
    UnknownDependency {
        node_id: String,
        field: String,
        dependency: String,
    },

    #[error("node '{node_id}' references unknown service '{service}'")]
    UnknownService { node_id: String, service: String },

    #[error("graph contains a cycle through: {}", cycle_members.join(", "))]
    CyclicGraph { cycle_members: Vec<String> },

    #[error("schema mismatch on {edge}: expected {expected}, found {found}")]
    SchemaMismatch {
        node_id: String,
        edge: String,
        expected: String,
        found: String,
    },

    #[error("node '{node_id}' does not bind required input '{field}'")]
    MissingInput { node_id: String, field: String },

    #[error("graph has no entry point")]
    NoEntryPoint,
}

impl ValidationError {
    /// Stable machine-readable name of the violation.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::GraphTooLarge { .. } => "graph_too_large",
            ValidationError::DuplicateNode { .. } => "duplicate_node",
            ValidationError::InvalidNode { .. } => "invalid_node",
            ValidationError::UnknownDependency { .. } => "unknown_dependency",
            ValidationError::UnknownService { .. } => "unknown_service",
            ValidationError::CyclicGraph { .. } => "cyclic_graph",
            ValidationError::SchemaMismatch { .. } => "schema_mismatch",
            ValidationError::MissingInput { .. } => "missing_input",
            ValidationError::NoEntryPoint => "no_entry_point",
        }
    }

    /// The node the violation is attributed to, when there is one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ValidationError::DuplicateNode { node_id }
            | ValidationError::InvalidNode { node_id, .. }
            | ValidationError::UnknownDependency { node_id, .. }
            | ValidationError::UnknownService { node_id, .. }
            | ValidationError::SchemaMismatch { node_id, .. }
            | ValidationError::MissingInput { node_id, .. } => Some(node_id),
            ValidationError::GraphTooLarge { .. }
            | ValidationError::CyclicGraph { .. }
            | ValidationError::NoEntryPoint => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ValidatedGraph
// ---------------------------------------------------------------------------

/// A candidate graph proven executable against a directory.
///
/// Only the validator constructs one, so holding a `ValidatedGraph` means every
/// service resolved, the edges are acyclic and every binding type-checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedGraph {
    graph: CandidateGraph,
    descriptors: BTreeMap<String, Arc<ServiceDescriptor>>,
    dependencies: BTreeMap<String, Vec<String>>,
    dependents: BTreeMap<String, Vec<String>>,
    levels: BTreeMap<String, usize>,
}

impl ValidatedGraph {
    pub fn graph(&self) -> &CandidateGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.graph.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.nodes.is_empty()
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeSpec> {
        self.graph.node(node_id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.nodes.iter().map(|n| n.id.as_str())
    }

    /// Resolved descriptor for a node's service.
    pub fn descriptor(&self, node_id: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.descriptors.get(node_id)
    }

    /// Nodes this node reads from, sorted.
    pub fn dependencies(&self, node_id: &str) -> &[String] {
        self.dependencies
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Nodes that read from this node, sorted.
    pub fn dependents(&self, node_id: &str) -> &[String] {
        self.dependents
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Topological level: 0 for entry nodes, otherwise one more than the
    /// deepest dependency.
    pub fn level(&self, node_id: &str) -> Option<usize> {
        self.levels.get(node_id).copied()
    }

    /// Node ids grouped by level, each group sorted.
    pub fn levels(&self) -> Vec<Vec<String>> {
        let max_level = self.levels.values().copied().max().unwrap_or(0);
        let mut grouped = vec![Vec::new(); max_level + 1];
        for (id, level) in &self.levels {
            grouped[*level].push(id.clone());
        }
        grouped
    }

    /// Nodes with no dependencies, sorted.
    pub fn entry_nodes(&self) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Sum of advisory descriptor costs over all nodes.
    pub fn estimated_cost(&self) -> f64 {
        self.descriptors.values().map(|d| d.cost).sum()
    }
}

// ---------------------------------------------------------------------------
// GraphValidator
// ---------------------------------------------------------------------------

/// Stateless validator; the only knob is the graph size limit.
#[derive(Debug, Clone)]
pub struct GraphValidator {
    max_nodes: usize,
}

impl Default for GraphValidator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl GraphValidator {
    pub fn new(max_nodes: usize) -> Self {
        Self { max_nodes }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_nodes)
    }

    /// Prove `graph` executable against `directory`, or report the first
    /// violation.
    ///
    /// Order: structure, service resolution, acyclicity, schema
    /// compatibility, entry point.
    pub fn validate(
        &self,
        graph: &CandidateGraph,
        directory: &dyn ServiceDirectory,
    ) -> Result<ValidatedGraph, ValidationError> {
        self.check_structure(graph)?;
        let descriptors = resolve_services(graph, directory)?;
        let order = topological_order(graph)?;
        for node in &graph.nodes {
            check_node_schemas(node, &descriptors)?;
        }

        let dependencies: BTreeMap<String, Vec<String>> = graph
            .nodes
            .iter()
            .map(|n| {
                let deps = n.upstream_nodes().into_iter().map(String::from).collect();
                (n.id.clone(), deps)
            })
            .collect();

        if !dependencies.values().any(Vec::is_empty) {
            return Err(ValidationError::NoEntryPoint);
        }

        let mut dependents: BTreeMap<String, Vec<String>> = graph
            .nodes
            .iter()
            .map(|n| (n.id.clone(), Vec::new()))
            .collect();
        for (id, deps) in &dependencies {
            for dep in deps {
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(id.clone());
                }
            }
        }
        for list in dependents.values_mut() {
            list.sort();
        }

        // Depth in topological order: entry nodes are level 0
        let mut levels: BTreeMap<String, usize> = BTreeMap::new();
        for id in order {
            let level = dependencies[id.as_str()]
                .iter()
                .map(|dep| levels.get(dep).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            levels.insert(id, level);
        }

        Ok(ValidatedGraph {
            graph: graph.clone(),
            descriptors,
            dependencies,
            dependents,
            levels,
        })
    }

    fn check_structure(&self, graph: &CandidateGraph) -> Result<(), ValidationError> {
        if graph.nodes.len() > self.max_nodes {
            return Err(ValidationError::GraphTooLarge {
                count: graph.nodes.len(),
                limit: self.max_nodes,
            });
        }

        let mut seen = BTreeSet::new();
        for node in &graph.nodes {
            if node.id.trim().is_empty() {
                return Err(ValidationError::InvalidNode {
                    node_id: node.id.clone(),
                    detail: "node id must not be empty".to_string(),
                });
            }
            if !seen.insert(node.id.as_str()) {
                return Err(ValidationError::DuplicateNode {
                    node_id: node.id.clone(),
                });
            }
        }

        for node in &graph.nodes {
            for (field, binding) in &node.inputs {
                if let InputBinding::Node { node: upstream, .. } = binding {
                    if !seen.contains(upstream.as_str()) {
                        return Err(ValidationError::UnknownDependency {
                            node_id: node.id.clone(),
                            field: field.clone(),
                            dependency: upstream.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Resolve every node's service, keyed by node id.
fn resolve_services(
    graph: &CandidateGraph,
    directory: &dyn ServiceDirectory,
) -> Result<BTreeMap<String, Arc<ServiceDescriptor>>, ValidationError> {
    graph
        .nodes
        .iter()
        .map(|node| {
            directory
                .lookup(&node.service)
                .map(|d| (node.id.clone(), d))
                .ok_or_else(|| ValidationError::UnknownService {
                    node_id: node.id.clone(),
                    service: node.service.clone(),
                })
        })
        .collect()
}

/// Topological order of node ids, or the members of a cycle.
fn topological_order(graph: &CandidateGraph) -> Result<Vec<String>, ValidationError> {
    let mut dag = DiGraph::<&str, ()>::new();
    let indices: HashMap<&str, _> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), dag.add_node(n.id.as_str())))
        .collect();

    // Edge from dependency -> dependent
    for node in &graph.nodes {
        for upstream in node.upstream_nodes() {
            dag.add_edge(indices[upstream], indices[node.id.as_str()], ());
        }
    }

    match toposort(&dag, None) {
        Ok(sorted) => Ok(sorted.into_iter().map(|i| dag[i].to_string()).collect()),
        Err(cycle) => {
            let culprit = cycle.node_id();
            let mut cycle_members: Vec<String> = tarjan_scc(&dag)
                .into_iter()
                .find(|scc| scc.contains(&culprit))
                .unwrap_or_else(|| vec![culprit])
                .into_iter()
                .map(|i| dag[i].to_string())
                .collect();
            cycle_members.sort();
            Err(ValidationError::CyclicGraph { cycle_members })
        }
    }
}

/// Type-check a node's bindings and required inputs.
fn check_node_schemas(
    node: &NodeSpec,
    descriptors: &BTreeMap<String, Arc<ServiceDescriptor>>,
) -> Result<(), ValidationError> {
    let input_schema = &descriptors[node.id.as_str()].input_schema;

    for (field, binding) in &node.inputs {
        let expected = input_schema.field_type(field).unwrap_or(FieldType::Any);
        match binding {
            InputBinding::Node {
                node: upstream,
                field: output_field,
            } => {
                let output_schema = &descriptors[upstream.as_str()].output_schema;
                if output_schema.is_open() {
                    continue;
                }
                let found = match output_schema.field_type(output_field) {
                    Some(found) if is_assignable(found, expected) => continue,
                    Some(found) => found.to_string(),
                    None => "undeclared field".to_string(),
                };
                return Err(ValidationError::SchemaMismatch {
                    node_id: node.id.clone(),
                    edge: format!("{upstream}.{output_field} -> {}.{field}", node.id),
                    expected: expected.to_string(),
                    found,
                });
            }
            InputBinding::Literal { value } => {
                if !value_matches(value, expected) {
                    return Err(ValidationError::SchemaMismatch {
                        node_id: node.id.clone(),
                        edge: format!("literal -> {}.{field}", node.id),
                        expected: expected.to_string(),
                        found: value_type(value).to_string(),
                    });
                }
            }
            // Payload shape is only known at run time.
            InputBinding::Payload { .. } => {}
        }
    }

    for field in &input_schema.required {
        if !node.inputs.contains_key(field) {
            return Err(ValidationError::MissingInput {
                node_id: node.id.clone(),
                field: field.clone(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
