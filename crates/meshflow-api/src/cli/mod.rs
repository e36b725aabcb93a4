//! CLI command definitions for the `meshflow` binary.
//!
//! Uses clap derive macros for argument parsing. Every command reads a
//! registry and/or a planner graph from disk; output is styled tables by
//! default, JSON with `--json`, nothing on success with `--quiet`.

pub mod plan_check;
pub mod run;
pub mod services;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use serde_json::Value;

use meshflow_types::run::{NodeStatus, RunStatus};

/// Validate and execute service workflow graphs.
#[derive(Parser)]
#[command(name = "meshflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors (`--json` output is still printed).
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Engine config file (TOML).
    #[arg(long, global = true, env = "MESHFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the services in a registry.
    #[command(alias = "ls")]
    Services {
        /// Service registry file (JSON or TOML).
        #[arg(long, env = "MESHFLOW_REGISTRY")]
        registry: PathBuf,
    },

    /// Validate a planner graph against a registry.
    Validate {
        /// Service registry file (JSON or TOML).
        #[arg(long, env = "MESHFLOW_REGISTRY")]
        registry: PathBuf,

        /// Planner graph JSON file.
        graph: PathBuf,
    },

    /// Validate and execute a planner graph.
    Run {
        /// Service registry file (JSON or TOML).
        #[arg(long, env = "MESHFLOW_REGISTRY")]
        registry: PathBuf,

        /// Planner graph JSON file.
        graph: PathBuf,

        /// Inline JSON payload for the run.
        #[arg(long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// Read the JSON payload from a file.
        #[arg(long)]
        payload_file: Option<PathBuf>,

        /// Maximum concurrent service calls (overrides config).
        #[arg(long)]
        parallelism: Option<usize>,

        /// Whole-run deadline in milliseconds (overrides config).
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Parse a planner graph and summarize its shape without a registry.
    PlanCheck {
        /// Planner graph JSON file.
        graph: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// How command handlers report results on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Tables and styled text.
    Styled,
    /// Pretty-printed JSON.
    Json,
    /// Nothing on success; failures still surface as errors.
    Quiet,
}

impl OutputMode {
    /// `--json` wins over `--quiet`.
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            OutputMode::Json
        } else if quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Styled
        }
    }
}

/// Resolve the run payload: inline JSON, a JSON file, or `{}`.
pub async fn load_payload(inline: Option<&str>, file: Option<&Path>) -> Result<Value> {
    let raw = match (inline, file) {
        (Some(_), Some(_)) => bail!("--payload and --payload-file are mutually exclusive"),
        (Some(text), None) => text.to_string(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read payload file {}", path.display()))?,
        (None, None) => return Ok(Value::Object(Default::default())),
    };
    serde_json::from_str(&raw).context("Payload is not valid JSON")
}

pub fn format_node_status(status: NodeStatus) -> Cell {
    match status {
        NodeStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        NodeStatus::Ready => Cell::new("ready").fg(Color::Yellow),
        NodeStatus::Running => Cell::new("running").fg(Color::Blue),
        NodeStatus::Succeeded => Cell::new("succeeded").fg(Color::Green),
        NodeStatus::Failed => Cell::new("failed").fg(Color::Red),
        NodeStatus::Skipped => Cell::new("skipped").fg(Color::DarkYellow),
    }
}

pub fn format_run_status(status: RunStatus) -> console::StyledObject<String> {
    let text = status.to_string();
    match status {
        RunStatus::Succeeded => console::style(text).green().bold(),
        RunStatus::Partial => console::style(text).yellow().bold(),
        RunStatus::Failed => console::style(text).red().bold(),
        RunStatus::DeadlineExceeded => console::style(text).magenta().bold(),
    }
}
