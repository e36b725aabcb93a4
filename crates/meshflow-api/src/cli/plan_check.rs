//! `meshflow plan-check`: summarize a planner graph without a registry.
//!
//! Only parsing happens here. Service resolution, cycle detection and
//! schema checks need `validate`.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;

use meshflow_infra::graph_loader::load_graph_file;
use meshflow_types::graph::CandidateGraph;

use super::OutputMode;

#[derive(Debug, Serialize)]
struct PlanSummary {
    name: Option<String>,
    nodes: usize,
    services: BTreeSet<String>,
    edges: Vec<(String, String)>,
    entry_nodes: Vec<String>,
}

fn summarize(graph: &CandidateGraph) -> PlanSummary {
    PlanSummary {
        name: graph.name.clone(),
        nodes: graph.nodes.len(),
        services: graph.nodes.iter().map(|n| n.service.clone()).collect(),
        edges: graph.edges(),
        entry_nodes: graph
            .nodes
            .iter()
            .filter(|n| n.upstream_nodes().is_empty())
            .map(|n| n.id.clone())
            .collect(),
    }
}

pub async fn plan_check(path: &Path, output: OutputMode) -> Result<()> {
    let graph = load_graph_file(path)
        .await
        .context("Failed to load planner graph")?;
    let summary = summarize(&graph);

    match output {
        OutputMode::Quiet => return Ok(()),
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }
        OutputMode::Styled => {}
    }

    println!(
        "Graph '{}': {} node(s), {} edge(s), {} service(s)",
        style(summary.name.as_deref().unwrap_or("<unnamed>")).cyan(),
        summary.nodes,
        summary.edges.len(),
        summary.services.len()
    );
    for (from, to) in &summary.edges {
        println!("  {from} {} {to}", style("→").dim());
    }
    println!(
        "{}",
        style(format!("Entry nodes: {}", summary.entry_nodes.join(", "))).dim()
    );
    Ok(())
}
