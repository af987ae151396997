//! `nodeflow history`: persisted runs.

use anyhow::{Context, Result, anyhow};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use nodeflow_types::result::WorkflowStatus;

use super::run::print_result;
use crate::state::AppState;

pub async fn list(state: &AppState, limit: u32, json: bool) -> Result<()> {
    let runs = state
        .repo
        .list_executions(limit)
        .await
        .context("Failed to list runs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!();
        println!("  No runs recorded yet.");
        println!(
            "  Start one with: {}",
            style("nodeflow run <file.json>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run ID").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Mode"),
            Cell::new("Started"),
            Cell::new("Duration"),
            Cell::new("Tokens"),
            Cell::new("Error"),
        ]);

    for run in &runs {
        table.add_row(vec![
            Cell::new(run.run_id),
            Cell::new(run.status.as_str()).fg(status_color(run.status)),
            Cell::new(format!("{:?}", run.mode).to_lowercase()),
            Cell::new(run.started_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(format!("{}ms", run.total_duration_ms)),
            Cell::new(run.total_tokens),
            Cell::new(run.error.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn status_color(status: WorkflowStatus) -> Color {
    match status {
        WorkflowStatus::Completed => Color::Green,
        WorkflowStatus::Failed => Color::Red,
        WorkflowStatus::Cancelled | WorkflowStatus::Timeout => Color::Yellow,
        WorkflowStatus::Pending | WorkflowStatus::Running => Color::DarkGrey,
    }
}

pub async fn show(state: &AppState, run_id: &str, json: bool) -> Result<()> {
    let run_id: Uuid = run_id
        .parse()
        .with_context(|| format!("'{run_id}' is not a run UUID"))?;

    let result = state
        .repo
        .get_execution(&run_id)
        .await
        .context("Failed to load run")?;
    let logs = state
        .repo
        .list_node_logs(&run_id)
        .await
        .context("Failed to load node logs")?;

    match (result, json) {
        (Some(result), true) => println!("{}", serde_json::to_string_pretty(&result)?),
        (Some(result), false) => print_result(&result),
        // Node logs are appended before the terminal row exists.
        (None, _) if !logs.is_empty() => {
            if json {
                println!("{}", serde_json::to_string_pretty(&logs)?);
            } else {
                println!();
                println!(
                    "  Run {} has no terminal result; {} node log(s) recorded:",
                    style(run_id).dim(),
                    logs.len()
                );
                for log in &logs {
                    println!(
                        "  - {} [{}] {}",
                        log.node_name,
                        log.node_type,
                        log.error.as_deref().unwrap_or("ok")
                    );
                }
                println!();
            }
        }
        (None, _) => return Err(anyhow!("Run {run_id} not found")),
    }
    Ok(())
}
