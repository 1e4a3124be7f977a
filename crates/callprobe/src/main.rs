//! # callprobe
//!
//! Runs scripted voice-dialog test calls from the command line.
//!
//! ## Overview
//!
//! Each scenario file names a dialog to call, the dialog documents it may
//! reach and the steps a driver performs: listening for prompts, speaking,
//! keying DTMF and expecting the dialog to hang up. Scenarios run
//! concurrently, each on its own call, and a JSON report is printed per
//! scenario.
//!
//! ## Architecture
//!
//! This is Layer 3 - the binary that ties together:
//! - callprobe-core: Core types, errors and configuration
//! - callprobe-sync: Blocking handoff primitives
//! - callprobe-session: The synchronous call façade
//! - callprobe-script: Scripted dialog sessions

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use callprobe::{scenario_schema, Cli, Command, RunArgs, Scenario, ScenarioRunner};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Schema { draft07 } => {
            let schema = scenario_schema(Command::schema_draft(draft07));
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Command::Run(args) => return run(args).await,
    }

    Ok(ExitCode::SUCCESS)
}

async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let config = args.load_config()?;

    // Initialize logging; stdout is reserved for the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "callprobe v{} running {} scenario(s), up to {} at a time",
        env!("CARGO_PKG_VERSION"),
        args.scenarios.len(),
        config.call.max_concurrent_calls
    );

    let scenarios = args
        .scenarios
        .iter()
        .map(|path| {
            Scenario::from_file(path)
                .with_context(|| format!("failed to load scenario {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let reports = ScenarioRunner::new(config).run_all(scenarios).await;
    println!("{}", serde_json::to_string_pretty(&reports)?);

    let failed = reports.iter().filter(|report| !report.passed).count();
    if failed > 0 {
        tracing::error!("{} of {} scenario(s) failed", failed, reports.len());
        return Ok(ExitCode::FAILURE);
    }

    tracing::info!("All {} scenario(s) passed", reports.len());
    Ok(ExitCode::SUCCESS)
}
