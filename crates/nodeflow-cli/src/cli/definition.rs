//! Definition commands: validate, plan, register.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use nodeflow_core::workflow::definition::load_definition_file;
use nodeflow_core::workflow::graph::WorkflowGraph;
use nodeflow_types::workflow::WorkflowDefinition;

use crate::state::AppState;

/// Parse a definition file and build its graph.
pub fn load_graph(file: &Path) -> Result<(WorkflowDefinition, WorkflowGraph)> {
    let def = load_definition_file(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let graph = WorkflowGraph::build(&def)
        .with_context(|| format!("Workflow '{}' is not valid", def.display_name()))?;
    Ok((def, graph))
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub fn validate(file: &Path, json: bool, quiet: bool) -> Result<()> {
    let (def, graph) = load_graph(file)?;

    if json {
        let out = serde_json::json!({
            "valid": true,
            "name": def.display_name(),
            "nodes": graph.node_count(),
            "edges": def.edges.len(),
            "levels": graph
                .levels()
                .map(|level| level.iter().map(|node| node.name.clone()).collect::<Vec<_>>())
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    println!();
    println!(
        "  {} Workflow '{}' is valid",
        style("✓").green().bold(),
        style(def.display_name()).cyan()
    );
    println!("  Nodes:  {}", graph.node_count());
    println!("  Edges:  {}", def.edges.len());
    println!("  Levels: {}", graph.level_count());
    for (index, level) in graph.levels().enumerate() {
        let names: Vec<&str> = level.iter().map(|node| node.name.as_str()).collect();
        println!("    {} {}", style(index).dim(), names.join(", "));
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

pub fn plan(file: &Path, json: bool) -> Result<()> {
    let (def, graph) = load_graph(file)?;

    if json {
        let levels: Vec<Vec<serde_json::Value>> = graph
            .levels()
            .map(|level| {
                level
                    .iter()
                    .map(|node| {
                        serde_json::json!({
                            "id": node.id,
                            "name": node.name,
                            "type": node.node_type().as_str(),
                        })
                    })
                    .collect()
            })
            .collect();
        let out = serde_json::json!({
            "name": def.display_name(),
            "levels": levels,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Level").fg(Color::Cyan),
            Cell::new("Id"),
            Cell::new("Name"),
            Cell::new("Type"),
            Cell::new("Depends on"),
        ]);

    for (index, level) in graph.levels().enumerate() {
        for node in level {
            let deps: Vec<&str> = graph
                .predecessors(&node.id)
                .iter()
                .map(|p| p.name.as_str())
                .collect();
            table.add_row(vec![
                Cell::new(index),
                Cell::new(&node.id),
                Cell::new(&node.name),
                Cell::new(node.node_type().as_str()),
                Cell::new(deps.join(", ")),
            ]);
        }
    }

    println!();
    println!("  {}", style(def.display_name()).cyan().bold());
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

pub async fn register(state: &AppState, file: &Path, id: &str, json: bool) -> Result<()> {
    let (def, graph) = load_graph(file)?;

    state
        .repo
        .save_definition(id, &def)
        .await
        .with_context(|| format!("Failed to save workflow '{id}'"))?;

    if json {
        let out = serde_json::json!({
            "id": id,
            "name": def.name,
            "nodes": graph.node_count(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!(
            "  {} Registered workflow '{}'",
            style("*").green().bold(),
            style(def.display_name()).cyan()
        );
        println!("  ID: {id}");
        println!("  Nodes: {}", graph.node_count());
        println!();
        println!(
            "  Run it with: {}",
            style(format!("nodeflow run --id {id}")).dim()
        );
        println!();
    }
    Ok(())
}
