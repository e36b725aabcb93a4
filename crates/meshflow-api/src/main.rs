//! meshflow CLI entry point.
//!
//! Binary name: `meshflow`
//!
//! Parses CLI arguments, initializes tracing, loads configuration and the
//! service registry, then dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, OutputMode};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = meshflow_observe::tracing_setup::verbosity_filter(cli.quiet, cli.verbose);
    if let Err(e) = meshflow_observe::tracing_setup::init_tracing(filter, cli.otel) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = dispatch(cli).await;
    meshflow_observe::tracing_setup::shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone();
    let output = OutputMode::from_flags(cli.json, cli.quiet);

    match cli.command {
        // Shell completions don't need app state
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "meshflow", &mut std::io::stdout());
            Ok(())
        }

        Commands::PlanCheck { graph } => cli::plan_check::plan_check(&graph, output).await,

        Commands::Services { registry } => {
            let state = AppState::load(&registry, config_path.as_deref()).await?;
            cli::services::list_services(&state, output)
        }

        Commands::Validate { registry, graph } => {
            let state = AppState::load(&registry, config_path.as_deref()).await?;
            cli::validate::validate_graph(&state, &graph, output).await
        }

        Commands::Run {
            registry,
            graph,
            payload,
            payload_file,
            parallelism,
            deadline_ms,
        } => {
            let mut state = AppState::load(&registry, config_path.as_deref()).await?;
            state.apply_overrides(parallelism, deadline_ms);
            let payload = cli::load_payload(payload.as_deref(), payload_file.as_deref()).await?;
            cli::run::run_graph(&state, &graph, payload, output).await
        }
    }
}
