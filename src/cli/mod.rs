//! Command-line interface.
//!
//! Thin front end over [`Orchestrator`]: argument parsing, report
//! rendering and exit codes live here, orchestration semantics do not.
//! The CLI always drives the [`DryRunConnector`]; real control-plane
//! connectors are supplied by programs embedding the library.

use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::config::Project;
use crate::connector::DryRunConnector;
use crate::orchestrator::Orchestrator;
use crate::scheduler::{Action, ExecutionReport, Scheduler, StackOutcome};

/// Output format for execution reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, colored.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Declarative infrastructure-deployment orchestrator.
#[derive(Debug, Parser)]
#[command(name = "stackctl", version, about)]
pub struct Cli {
    /// Project root directory (containing `config/`).
    #[arg(short, long, global = true, default_value = ".")]
    pub directory: PathBuf,

    /// Maximum number of stacks launching concurrently within a batch.
    #[arg(short = 'j', long, global = true)]
    pub max_parallel: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Deploy stacks (targets plus their transitive dependencies).
    Launch {
        /// Stacks to deploy; empty selects the whole project.
        targets: Vec<String>,

        /// Report format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Tear down stacks (targets plus their transitive dependents).
    Delete {
        /// Stacks to delete; empty selects the whole project.
        targets: Vec<String>,

        /// Skip the confirmation requirement.
        #[arg(short, long)]
        yes: bool,

        /// Report format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the dependency graph.
    Graph,

    /// Load, extract and graph-check the project without executing.
    Validate,
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let project = Project::load(&self.directory)?;
        let orchestrator = Orchestrator::new(project, Arc::new(DryRunConnector));

        match self.command {
            Commands::Launch { targets, format } => {
                let report =
                    run(&orchestrator, &targets, Action::Deploy, self.max_parallel).await?;
                finish(report, format)
            }
            Commands::Delete { targets, yes, format } => {
                if !yes {
                    bail!("deletion is destructive; re-run with --yes to confirm");
                }
                let report =
                    run(&orchestrator, &targets, Action::Teardown, self.max_parallel).await?;
                finish(report, format)
            }
            Commands::Graph => {
                let prepared = orchestrator.prepare()?;
                for edge in prepared.graph.edges() {
                    println!("{} -> {}  [{:?}]", edge.dependent, edge.dependency, edge.origin);
                }
                // Trees rooted at stacks nothing depends on.
                for id in prepared.graph.stacks() {
                    if prepared.graph.dependents_of(&id).is_empty() {
                        print!("{}", prepared.graph.to_tree_string(&id));
                    }
                }
                Ok(())
            }
            Commands::Validate => {
                let prepared = orchestrator.prepare()?;
                println!(
                    "{} {} stacks, {} dependency edges, no cycles",
                    "ok:".green().bold(),
                    prepared.graph.node_count(),
                    prepared.graph.edge_count()
                );
                Ok(())
            }
        }
    }
}

async fn run(
    orchestrator: &Orchestrator,
    targets: &[String],
    action: Action,
    max_parallel: Option<usize>,
) -> Result<ExecutionReport> {
    let mut scheduler = Scheduler::new(orchestrator.connector()).with_progress(true);
    if let Some(limit) = max_parallel {
        scheduler = scheduler.with_max_parallel(limit);
    }

    // Ctrl-C stops admission of further batches; in-flight stacks run to
    // their natural completion.
    let cancel = scheduler.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing in-flight stacks");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    Ok(orchestrator.execute(&scheduler, targets, action).await?)
}

fn finish(report: ExecutionReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    if report.is_success() {
        Ok(())
    } else {
        bail!("{} stacks did not complete", count_incomplete(&report))
    }
}

fn count_incomplete(report: &ExecutionReport) -> usize {
    report.outcomes.values().filter(|o| !matches!(o, StackOutcome::Complete)).count()
}

fn print_report(report: &ExecutionReport) {
    for (id, outcome) in &report.outcomes {
        match outcome {
            StackOutcome::Complete => {
                println!("{} {}", format!("{id}:").bold(), "COMPLETE".green())
            }
            StackOutcome::Failed { error } => {
                println!("{} {} {}", format!("{id}:").bold(), "FAILED".red(), error.dimmed())
            }
            StackOutcome::Skipped { because } => println!(
                "{} {} {}",
                format!("{id}:").bold(),
                "SKIPPED".yellow(),
                format!("(ancestor '{because}' did not complete)").dimmed()
            ),
            StackOutcome::NotRun => {
                println!("{} {}", format!("{id}:").bold(), "NOT RUN".yellow())
            }
        }
    }
}
