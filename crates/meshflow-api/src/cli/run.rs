//! `meshflow run`: validate then execute a planner graph over HTTP.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;

use meshflow_infra::graph_loader::load_graph_file;
use meshflow_types::run::{RunResult, RunStatus};

use super::{OutputMode, format_node_status, format_run_status};
use crate::state::AppState;

pub async fn run_graph(
    state: &AppState,
    path: &Path,
    payload: Value,
    output: OutputMode,
) -> Result<()> {
    let graph = load_graph_file(path)
        .await
        .context("Failed to load planner graph")?;
    let engine = state.http_engine()?;

    let validated = match engine.validate(&graph) {
        Ok(validated) => validated,
        Err(err) => bail!("Graph rejected ({}): {err}", err.kind()),
    };

    if output == OutputMode::Styled {
        println!(
            "{} Executing {} node(s) with parallelism {}",
            style("▶").cyan().bold(),
            validated.len(),
            engine.config().max_parallelism
        );
    }

    let result = engine.execute(&validated, payload).await;

    match output {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputMode::Styled => print_result(&result),
        OutputMode::Quiet => {}
    }

    if result.status != RunStatus::Succeeded {
        bail!("Run {} finished with status {}", result.run_id, result.status);
    }
    Ok(())
}

fn print_result(result: &RunResult) {
    let mut nodes = Table::new();
    nodes
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Attempts"),
            Cell::new("Detail"),
        ]);

    for (id, report) in &result.trace.nodes {
        let detail = report
            .reason
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        nodes.add_row(vec![
            Cell::new(id),
            format_node_status(report.status),
            Cell::new(report.attempts),
            Cell::new(detail),
        ]);
    }
    println!("{nodes}");

    if !result.trace.attempts.is_empty() {
        let mut attempts = Table::new();
        attempts
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("#").fg(Color::Cyan),
                Cell::new("Node"),
                Cell::new("Endpoint"),
                Cell::new("Outcome"),
                Cell::new("Latency"),
            ]);

        for a in &result.trace.attempts {
            let outcome = if a.outcome.is_success() {
                Cell::new(a.outcome.to_string()).fg(Color::Green)
            } else {
                Cell::new(a.outcome.to_string()).fg(Color::Red)
            };
            attempts.add_row(vec![
                Cell::new(a.sequence),
                Cell::new(&a.node_id),
                Cell::new(&a.endpoint),
                outcome,
                Cell::new(format!("{}ms", a.latency_ms)),
            ]);
        }
        println!();
        println!("{attempts}");
    }

    let (succeeded, failed, skipped) = result.partition();
    println!();
    println!(
        "Run {} {} in {}ms",
        style(result.run_id.to_string().chars().take(8).collect::<String>()).dim(),
        format_run_status(result.status),
        result.duration_ms
    );
    println!(
        "{}",
        style(format!(
            "{succeeded} succeeded, {failed} failed, {skipped} skipped"
        ))
        .dim()
    );
}
