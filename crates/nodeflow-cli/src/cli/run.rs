//! `nodeflow run`: execute a workflow from a file or the registry.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use nodeflow_core::repository::execution::ExecutionRepository;
use nodeflow_types::event::EngineEvent;
use nodeflow_types::result::{NodeResult, NodeStatus, SkipReason, WorkflowExecutionResult, WorkflowStatus};
use nodeflow_types::workflow::{ExecutionOptions, ParallelErrorStrategy};

use super::definition::load_graph;
use crate::state::AppState;

#[derive(Args)]
pub struct RunArgs {
    /// Workflow definition (.json, .yaml or .yml).
    #[arg(required_unless_present = "id", conflicts_with = "id")]
    pub file: Option<PathBuf>,

    /// Run a registered definition instead of a file.
    #[arg(long)]
    pub id: Option<String>,

    /// Run input as a JSON object.
    #[arg(long, conflicts_with = "input_file")]
    pub input: Option<String>,

    /// Read the run input from a JSON file.
    #[arg(long)]
    pub input_file: Option<PathBuf>,

    /// Overall run timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum attempts per node.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Error strategy: fail_fast, continue or collect.
    #[arg(long)]
    pub strategy: Option<ParallelErrorStrategy>,

    /// Run nodes one at a time.
    #[arg(long)]
    pub sequential: bool,
}

impl RunArgs {
    fn options(&self) -> ExecutionOptions {
        ExecutionOptions {
            timeout_seconds: self.timeout,
            max_retries: self.max_retries,
            parallel_error_strategy: self.strategy,
            enable_parallel_execution: self.sequential.then_some(false),
            ..ExecutionOptions::default()
        }
    }
}

/// Execute the workflow. Returns the terminal status for the exit code.
pub async fn run(state: &AppState, args: RunArgs, json: bool, quiet: bool) -> Result<WorkflowStatus> {
    let input = read_input(args.input.as_deref(), args.input_file.as_deref()).await?;
    let definition = match (&args.file, &args.id) {
        (Some(file), _) => load_graph(file)?.0,
        (None, Some(id)) => state
            .repo
            .load_definition(id)
            .await
            .with_context(|| format!("Workflow '{id}' not found"))?,
        (None, None) => bail!("Pass a definition file or --id"),
    };

    let engine = state.engine();
    let run_id = Uuid::now_v7();

    let progress = (!json && !quiet).then(|| {
        let events = engine.event_bus().subscribe();
        tokio::spawn(print_progress(events, run_id))
    });

    let run = engine.execute_with_run_id(run_id, &definition, input, args.options());
    tokio::pin!(run);
    let finished = tokio::select! {
        result = &mut run => Some(result),
        Ok(()) = tokio::signal::ctrl_c() => None,
    };
    let result = match finished {
        Some(result) => result?,
        None => {
            eprintln!("  {} cancelling run {run_id}", style("!").yellow().bold());
            engine.cancel(run_id);
            run.await?
        }
    };

    if let Some(handle) = progress {
        // The printer stops at RunFinished.
        handle.await.ok();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !quiet {
        print_result(&result);
    }
    Ok(result.status)
}

/// Run input from `--input`, `--input-file`, or an empty object.
async fn read_input(inline: Option<&str>, file: Option<&Path>) -> Result<Map<String, Value>> {
    let raw = match (inline, file) {
        (Some(raw), _) => raw.to_string(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => return Ok(Map::new()),
    };
    match serde_json::from_str::<Value>(&raw).context("Run input is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("Run input must be a JSON object, got {other}"),
    }
}

async fn print_progress(mut events: broadcast::Receiver<EngineEvent>, run_id: Uuid) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if event.run_id() != run_id {
            continue;
        }
        match event {
            EngineEvent::NodeStarted {
                node_name, attempt, ..
            } if attempt == 1 => {
                eprintln!("  {} {}", style("›").dim(), node_name);
            }
            EngineEvent::NodeRetrying {
                node_id,
                attempt,
                delay_ms,
                error,
                ..
            } => {
                eprintln!(
                    "  {} {node_id} attempt {attempt} failed ({error}), retrying in {delay_ms}ms",
                    style("↻").yellow()
                );
            }
            EngineEvent::NodeCompleted {
                node_name,
                duration_ms,
                ..
            } => {
                eprintln!("  {} {node_name} ({duration_ms}ms)", style("✓").green());
            }
            EngineEvent::NodeFailed {
                node_name, error, ..
            } => {
                eprintln!("  {} {node_name}: {error}", style("✗").red());
            }
            EngineEvent::RunFinished { .. } => break,
            _ => {}
        }
    }
}

/// Styled summary of a terminal result: status, node table, output.
pub fn print_result(result: &WorkflowExecutionResult) {
    println!();
    println!(
        "  {} Run {} {}",
        status_mark(result.status),
        style(result.run_id).dim(),
        styled_status(result.status)
    );
    println!(
        "  Duration: {}ms   Tokens: {}",
        result.total_duration_ms, result.total_tokens
    );
    if let Some(error) = &result.error {
        println!("  Error: {}", style(error).red());
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Node").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Status"),
            Cell::new("Attempts"),
            Cell::new("Duration"),
            Cell::new("Detail"),
        ]);

    for node in &result.node_results {
        table.add_row(node_row(node));
    }
    for skipped in &result.skipped_nodes {
        let detail = match &skipped.reason {
            SkipReason::UpstreamFailed { dependency } => format!("upstream '{dependency}' failed"),
            SkipReason::BranchNotTaken => "branch not taken".to_string(),
        };
        table.add_row(vec![
            Cell::new(&skipped.node_name),
            Cell::new(""),
            Cell::new("skipped").fg(Color::Yellow),
            Cell::new(0),
            Cell::new(""),
            Cell::new(detail),
        ]);
    }
    for node_id in &result.unreached_nodes {
        table.add_row(vec![
            Cell::new(node_id),
            Cell::new(""),
            Cell::new("unreached").fg(Color::DarkGrey),
            Cell::new(0),
            Cell::new(""),
            Cell::new(""),
        ]);
    }
    println!("{table}");

    if !result.output.is_null() {
        println!();
        println!("  {}", style("── Output ──").dim());
        match &result.output {
            Value::String(text) => println!("{text}"),
            other => println!(
                "{}",
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
            ),
        }
    }
    for file in &result.output_files {
        println!("  {} {} ({} bytes)", style("↳").dim(), file.url, file.size);
    }
    println!();
}

fn node_row(node: &NodeResult) -> Vec<Cell> {
    let status = match node.status {
        NodeStatus::Success => Cell::new("success").fg(Color::Green),
        NodeStatus::Error => Cell::new("error").fg(Color::Red),
    };
    let detail = match (&node.error, &node.token_usage) {
        (Some(error), _) => error.clone(),
        (None, Some(usage)) => format!("{} tokens", usage.total_tokens),
        (None, None) => String::new(),
    };
    vec![
        Cell::new(&node.node_name),
        Cell::new(node.node_type.as_str()),
        status,
        Cell::new(node.attempts),
        Cell::new(format!("{}ms", node.duration_ms)),
        Cell::new(detail),
    ]
}

fn styled_status(status: WorkflowStatus) -> console::StyledObject<&'static str> {
    match status {
        WorkflowStatus::Completed => style(status.as_str()).green(),
        WorkflowStatus::Failed => style(status.as_str()).red(),
        WorkflowStatus::Cancelled | WorkflowStatus::Timeout => style(status.as_str()).yellow(),
        WorkflowStatus::Pending | WorkflowStatus::Running => style(status.as_str()).dim(),
    }
}

fn status_mark(status: WorkflowStatus) -> console::StyledObject<&'static str> {
    match status {
        WorkflowStatus::Completed => style("✓").green().bold(),
        WorkflowStatus::Failed => style("✗").red().bold(),
        _ => style("!").yellow().bold(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::{Cli, Commands};

    #[tokio::test]
    async fn input_must_be_an_object() {
        let map = read_input(Some(r#"{"需求描述": "test"}"#), None).await.unwrap();
        assert_eq!(map["需求描述"], "test");

        assert!(read_input(Some("[1, 2]"), None).await.is_err());
        assert!(read_input(Some("not json"), None).await.is_err());
        assert!(read_input(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn input_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(&path, r#"{"score": 7}"#).unwrap();

        let map = read_input(None, Some(&path)).await.unwrap();
        assert_eq!(map["score"], 7);
    }

    #[test]
    fn run_flags_become_options() {
        let cli = Cli::parse_from([
            "nodeflow",
            "run",
            "flow.json",
            "--timeout",
            "30",
            "--max-retries",
            "2",
            "--strategy",
            "collect",
            "--sequential",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let options = args.options();
        assert_eq!(options.timeout_seconds, Some(30));
        assert_eq!(options.max_retries, Some(2));
        assert_eq!(options.parallel_error_strategy, Some(ParallelErrorStrategy::Collect));
        assert_eq!(options.enable_parallel_execution, Some(false));
    }

    #[test]
    fn run_needs_a_source() {
        assert!(Cli::try_parse_from(["nodeflow", "run"]).is_err());
        assert!(Cli::try_parse_from(["nodeflow", "run", "--id", "wf"]).is_ok());
    }
}
