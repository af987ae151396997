//! CLI command definitions for the `nodeflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod definition;
pub mod history;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run and inspect node-based workflows.
#[derive(Parser)]
#[command(name = "nodeflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to <data dir>/config.toml).
    #[arg(long, global = true, env = "NODEFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that a definition file parses and forms a valid graph.
    Validate {
        /// Workflow definition (.json, .yaml or .yml).
        file: PathBuf,
    },

    /// Show the execution levels of a definition.
    Plan {
        /// Workflow definition (.json, .yaml or .yml).
        file: PathBuf,
    },

    /// Execute a workflow and print its result.
    Run(run::RunArgs),

    /// Store a definition so it can be run with `run --id`.
    Register {
        /// Workflow definition (.json, .yaml or .yml).
        file: PathBuf,

        /// Id to store the definition under.
        #[arg(long)]
        id: String,
    },

    /// List or inspect persisted runs.
    History {
        #[command(subcommand)]
        command: Option<HistoryCommand>,

        /// Maximum number of runs to list.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum HistoryCommand {
    /// Show one run with its node logs.
    Show {
        /// Run UUID.
        run_id: String,
    },
}
