//! `meshflow validate`: check a planner graph against the registry.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::json;

use meshflow_core::workflow::validator::{GraphValidator, ValidatedGraph, ValidationError};
use meshflow_infra::graph_loader::load_graph_file;

use super::OutputMode;
use crate::state::AppState;

pub async fn validate_graph(state: &AppState, path: &Path, output: OutputMode) -> Result<()> {
    let graph = load_graph_file(path)
        .await
        .context("Failed to load planner graph")?;
    let validator = GraphValidator::from_config(&state.config);

    match validator.validate(&graph, state.directory.as_ref()) {
        Ok(validated) => {
            match output {
                OutputMode::Json => {
                    println!("{}", serde_json::to_string_pretty(&validated_json(&validated))?)
                }
                OutputMode::Styled => print_validated(&validated),
                OutputMode::Quiet => {}
            }
            Ok(())
        }
        Err(err) => {
            if output == OutputMode::Json {
                println!("{}", serde_json::to_string_pretty(&rejection_json(&err))?);
            }
            bail!("Graph rejected ({}): {err}", err.kind())
        }
    }
}

fn validated_json(validated: &ValidatedGraph) -> serde_json::Value {
    json!({
        "valid": true,
        "name": validated.graph().name,
        "nodes": validated.len(),
        "entry_nodes": validated.entry_nodes(),
        "levels": validated.levels(),
        "estimated_cost": validated.estimated_cost(),
    })
}

fn rejection_json(err: &ValidationError) -> serde_json::Value {
    json!({
        "valid": false,
        "kind": err.kind(),
        "node_id": err.node_id(),
        "error": err.to_string(),
    })
}

fn print_validated(validated: &ValidatedGraph) {
    let name = validated.graph().name.as_deref().unwrap_or("<unnamed>");
    println!(
        "{} Graph '{}' is valid ({} nodes)",
        style("✓").green().bold(),
        style(name).cyan(),
        validated.len()
    );

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Level").fg(Color::Cyan),
            Cell::new("Node"),
            Cell::new("Service"),
            Cell::new("Depends on"),
        ]);

    for (level, ids) in validated.levels().iter().enumerate() {
        for id in ids {
            let service = validated
                .node(id)
                .map(|n| n.service.as_str())
                .unwrap_or("-");
            let deps = validated.dependencies(id);
            let deps = if deps.is_empty() {
                "-".to_string()
            } else {
                deps.join(", ")
            };
            table.add_row(vec![
                Cell::new(level),
                Cell::new(id),
                Cell::new(service),
                Cell::new(deps),
            ]);
        }
    }

    println!("{table}");
    println!();
    println!(
        "{}",
        style(format!(
            "Entry nodes: {}  Estimated cost: {:.2}",
            validated.entry_nodes().join(", "),
            validated.estimated_cost()
        ))
        .dim()
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use meshflow_core::directory::InMemoryDirectory;
    use meshflow_types::graph::{CandidateGraph, InputBinding, NodeSpec};
    use meshflow_types::service::ServiceDescriptor;

    use super::*;

    fn directory() -> Arc<InMemoryDirectory> {
        Arc::new(
            InMemoryDirectory::new()
                .with_service(ServiceDescriptor::new("fetch", "http://fetch").with_cost(1.5))
                .with_service(ServiceDescriptor::new("rank", "http://rank").with_cost(0.5)),
        )
    }

    #[test]
    fn validated_json_reports_shape() {
        let graph = CandidateGraph::new(vec![
            NodeSpec::new("a", "fetch"),
            NodeSpec::new("b", "rank").with_input("items", InputBinding::node("a", "items")),
        ]);
        let directory = directory();
        let validated = GraphValidator::new(16)
            .validate(&graph, directory.as_ref())
            .unwrap();

        let value = validated_json(&validated);
        assert_eq!(value["valid"], true);
        assert_eq!(value["nodes"], 2);
        assert_eq!(value["entry_nodes"], json!(["a"]));
        assert_eq!(value["levels"], json!([["a"], ["b"]]));
        assert_eq!(value["estimated_cost"], 2.0);
    }

    #[test]
    fn rejection_json_names_kind_and_node() {
        let graph = CandidateGraph::new(vec![NodeSpec::new("a", "missing")]);
        let directory = directory();
        let err = GraphValidator::new(16)
            .validate(&graph, directory.as_ref())
            .unwrap_err();

        let value = rejection_json(&err);
        assert_eq!(value["valid"], false);
        assert_eq!(value["kind"], err.kind());
        assert_eq!(value["node_id"], "a");
    }
}
