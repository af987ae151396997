//! nodeflow CLI entry point.
//!
//! Binary name: `nodeflow`
//!
//! Parses CLI arguments, loads configuration, then dispatches to the
//! command handler. Only commands that touch persistence open the database.

mod cli;
mod state;

use std::process::ExitCode;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands, HistoryCommand};
use nodeflow_infra::config::{default_config_path, load_engine_config, resolve_data_dir};
use nodeflow_observe::tracing_setup::{init_tracing, shutdown_tracing};
use nodeflow_types::result::WorkflowStatus;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Shell completions need neither config nor logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "nodeflow", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let data_dir = resolve_data_dir();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(&data_dir));
    let config = load_engine_config(&config_path).await;

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    init_tracing(&config.logging, filter)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let outcome = dispatch(cli, config, data_dir).await;
    shutdown_tracing();
    outcome
}

async fn dispatch(
    cli: Cli,
    config: nodeflow_types::config::EngineConfig,
    data_dir: std::path::PathBuf,
) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Validate { file } => {
            cli::definition::validate(&file, cli.json, cli.quiet)?;
        }

        Commands::Plan { file } => {
            cli::definition::plan(&file, cli.json)?;
        }

        Commands::Run(args) => {
            let state = AppState::init(config, data_dir).await?;
            let status = cli::run::run(&state, args, cli.json, cli.quiet).await?;
            if status != WorkflowStatus::Completed {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Register { file, id } => {
            let state = AppState::init(config, data_dir).await?;
            cli::definition::register(&state, &file, &id, cli.json).await?;
        }

        Commands::History { command, limit } => {
            let state = AppState::init(config, data_dir).await?;
            match command {
                Some(HistoryCommand::Show { run_id }) => {
                    cli::history::show(&state, &run_id, cli.json).await?;
                }
                None => cli::history::list(&state, limit, cli.json).await?,
            }
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(ExitCode::SUCCESS)
}
