//! `meshflow services`: list registry contents.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use meshflow_core::directory::ServiceDirectory;

use super::OutputMode;
use crate::state::AppState;

pub fn list_services(state: &AppState, output: OutputMode) -> Result<()> {
    let services = state.directory.list();

    match output {
        OutputMode::Quiet => return Ok(()),
        OutputMode::Json => {
            let descriptors: Vec<_> = services.iter().map(|d| d.as_ref()).collect();
            println!("{}", serde_json::to_string_pretty(&descriptors)?);
            return Ok(());
        }
        OutputMode::Styled => {}
    }

    if services.is_empty() {
        println!("{}", style("No services registered.").dim());
        return Ok(());
    }

    let defaults = &state.config;
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Endpoint"),
            Cell::new("Fallbacks"),
            Cell::new("Retries"),
            Cell::new("Timeout"),
            Cell::new("Cost"),
        ]);

    for d in &services {
        let retries = match d.retry_limit {
            Some(limit) => limit.to_string(),
            None => format!("{} (default)", defaults.default_retry_limit),
        };
        let timeout = match d.timeout_ms {
            Some(ms) => format!("{ms}ms"),
            None => format!("{}ms (default)", defaults.default_timeout_ms),
        };

        table.add_row(vec![
            Cell::new(&d.name),
            Cell::new(&d.endpoint),
            Cell::new(d.fallback_endpoints.len()),
            Cell::new(retries),
            Cell::new(timeout),
            Cell::new(format!("{:.2}", d.cost)),
        ]);
    }

    println!("{table}");
    println!();
    println!("{}", style(format!("{} service(s)", services.len())).dim());
    Ok(())
}
