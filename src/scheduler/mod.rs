//! Execution scheduler: batched, concurrent, failure-propagating.
//!
//! Given a dependency graph and a requested action, the scheduler computes
//! the induced subgraph the request needs (a deploy pulls in transitive
//! dependencies, a teardown pulls in transitive dependents), then runs it
//! in batches: every not-yet-terminal stack whose scheduling-direction
//! predecessors are all complete is admitted together, bounded by a
//! concurrency limit, and the next batch is recomputed only after the
//! current one settles.
//!
//! Recomputing after each settle (rather than walking one static
//! topological order) is what makes partial failure work: a failure marks
//! every transitive dependent skipped before the next batch is chosen, and
//! a `stack_output` resolver only ever runs inside a launch task, at which
//! point its dependency has been observed complete.
//!
//! The control loop is single-threaded: launch tasks run concurrently via
//! `buffer_unordered` but only report their outcome back; every lifecycle
//! transition is applied by the loop itself. An admitted batch is `Queued`
//! and moves to `Launching` one concurrency-bounded chunk at a time, so a
//! cancellation can still spare the queued remainder of a large batch.

use futures::{StreamExt, stream};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::connector::{CloudConnector, ResolvedStack};
use crate::core::{Result, StackctlError};
use crate::graph::DependencyGraph;
use crate::resolver::ExtractedStack;
use crate::stack::{Stack, StackId, StackStatus};

/// What an execution request does with each scheduled stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create or update stacks; dependencies run first.
    Deploy,
    /// Delete stacks; dependents run first.
    Teardown,
}

/// Final outcome of one stack in an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackOutcome {
    /// Launched and completed successfully.
    Complete,
    /// Launched (or attempted resolution) and failed.
    Failed {
        /// The originating error, rendered.
        error: String,
    },
    /// Never admitted because an ancestor failed or was skipped.
    Skipped {
        /// The ancestor whose failure propagated here.
        because: StackId,
    },
    /// Never started: the invocation was cancelled first.
    NotRun,
}

/// Per-stack outcomes of one execution request, plus the batches as they
/// were admitted.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// The requested action.
    pub action: Action,
    /// Final outcome per scheduled stack.
    pub outcomes: BTreeMap<StackId, StackOutcome>,
    /// Stacks in admission order, grouped by batch.
    pub batches: Vec<Vec<StackId>>,
}

impl ExecutionReport {
    /// True when every scheduled stack completed.
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(|o| matches!(o, StackOutcome::Complete))
    }

    /// Stacks that failed, with their originating errors.
    pub fn failures(&self) -> Vec<(&StackId, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(id, o)| match o {
                StackOutcome::Failed { error } => Some((id, error.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Render a human-readable summary table.
    pub fn render(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for (id, outcome) in &self.outcomes {
            let line = match outcome {
                StackOutcome::Complete => format!("{id}: COMPLETE"),
                StackOutcome::Failed { error } => format!("{id}: FAILED ({error})"),
                StackOutcome::Skipped { because } => {
                    format!("{id}: SKIPPED (ancestor '{because}' did not complete)")
                }
                StackOutcome::NotRun => format!("{id}: NOT RUN (cancelled)"),
            };
            writeln!(out, "{line}").expect("writing to String cannot fail");
        }
        out
    }
}

/// Drives stacks through their lifecycle against the cloud connector.
pub struct Scheduler {
    connector: Arc<dyn CloudConnector>,
    max_parallel: usize,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
}

impl Scheduler {
    /// A scheduler with unbounded batch concurrency and no progress bar.
    pub fn new(connector: Arc<dyn CloudConnector>) -> Self {
        Self { connector, max_parallel: usize::MAX, cancel: Arc::new(AtomicBool::new(false)), show_progress: false }
    }

    /// Bound the number of concurrently launching stacks within a batch.
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Show an indicatif progress bar while executing.
    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Flag that stops admission of further batches when set. In-flight
    /// stacks run to their natural completion; unstarted stacks are
    /// reported as not run.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Execute `action` over `targets` and everything the graph says the
    /// request needs, honoring edges and propagating failure. An empty
    /// `targets` list executes the whole graph.
    pub async fn execute(
        &self,
        graph: &DependencyGraph,
        stacks: &BTreeMap<StackId, Arc<Stack>>,
        extracted: &HashMap<StackId, ExtractedStack>,
        targets: &[StackId],
        action: Action,
    ) -> Result<ExecutionReport> {
        let selected = self.induced_subset(graph, targets, action);
        let mut status: HashMap<StackId, StackStatus> =
            selected.iter().map(|id| (id.clone(), StackStatus::Pending)).collect();
        let mut errors: HashMap<StackId, String> = HashMap::new();
        let mut skip_cause: HashMap<StackId, StackId> = HashMap::new();
        let mut batches: Vec<Vec<StackId>> = Vec::new();

        let bar = self.progress_bar(selected.len() as u64, action);

        while status.values().any(|s| !s.is_terminal()) {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!("execution cancelled; abandoning unstarted stacks");
                break;
            }

            let batch = self.next_batch(graph, &status, &selected, action);
            if batch.is_empty() {
                // Impossible on a graph that passed cycle detection.
                let remaining = status.values().filter(|s| !s.is_terminal()).count();
                return Err(StackctlError::SchedulerDeadlock { remaining });
            }

            tracing::info!(?action, batch = ?batch, "admitting batch");
            for id in &batch {
                status.insert(id.clone(), StackStatus::Queued);
            }
            batches.push(batch.clone());

            // The batch is dispatched in concurrency-bounded chunks: a chunk
            // moves Queued -> Launching when it has slots, later chunks wait
            // their turn. Cancellation between chunks leaves the remainder
            // Queued, never started.
            for chunk in batch.chunks(self.max_parallel.min(batch.len())) {
                if self.cancel.load(Ordering::SeqCst) {
                    break;
                }
                for id in chunk {
                    status.insert(id.clone(), StackStatus::Launching);
                }

                let settled: Vec<(StackId, Result<()>)> = stream::iter(chunk.to_vec())
                    .map(|id| {
                        let stack = stacks.get(&id).cloned();
                        let extracted = extracted.get(&id);
                        async move {
                            let outcome = match stack {
                                Some(stack) => self.run_stack(&stack, extracted, action).await,
                                // A graph node the caller supplied no stack
                                // for fails its own launch.
                                None => Err(StackctlError::StackNotFound {
                                    stack: id.to_string(),
                                }),
                            };
                            (id, outcome)
                        }
                    })
                    .buffer_unordered(self.max_parallel)
                    .collect()
                    .await;

                for (id, outcome) in settled {
                    match outcome {
                        Ok(()) => {
                            tracing::debug!(stack = %id, "complete");
                            status.insert(id, StackStatus::Complete);
                        }
                        Err(err) => {
                            tracing::error!(stack = %id, error = %err, "failed");
                            errors.insert(id.clone(), err.to_string());
                            status.insert(id.clone(), StackStatus::Failed);
                            self.propagate_skips(
                                graph, &id, action, &selected, &mut status, &mut skip_cause,
                            );
                        }
                    }
                    bar.inc(1);
                }
            }
            let done = status.values().filter(|s| s.is_terminal()).count();
            bar.set_message(format!("{done}/{} stacks settled", selected.len()));
        }
        bar.finish_and_clear();

        let outcomes = status
            .into_iter()
            .map(|(id, state)| {
                let outcome = match state {
                    StackStatus::Complete => StackOutcome::Complete,
                    StackStatus::Failed => StackOutcome::Failed {
                        error: errors.remove(&id).unwrap_or_else(|| "unknown error".to_string()),
                    },
                    StackStatus::Skipped => StackOutcome::Skipped {
                        because: skip_cause
                            .remove(&id)
                            .unwrap_or_else(|| id.clone()),
                    },
                    // Cancelled before admission.
                    _ => StackOutcome::NotRun,
                };
                (id, outcome)
            })
            .collect();

        Ok(ExecutionReport { action, outcomes, batches })
    }

    /// The minimal stack set the request touches: targets plus transitive
    /// dependencies (deploy) or transitive dependents (teardown). An empty
    /// target list selects every stack in the graph.
    fn induced_subset(
        &self,
        graph: &DependencyGraph,
        targets: &[StackId],
        action: Action,
    ) -> HashSet<StackId> {
        if targets.is_empty() {
            return graph.stacks().into_iter().collect();
        }
        let mut selected: HashSet<StackId> = targets.iter().cloned().collect();
        for target in targets {
            let closure = match action {
                Action::Deploy => graph.transitive_dependencies(target),
                Action::Teardown => graph.transitive_dependents(target),
            };
            selected.extend(closure);
        }
        selected
    }

    /// Scheduling-direction predecessors of `stack`: the stacks that must
    /// complete before it may launch under `action`.
    fn predecessors(
        &self,
        graph: &DependencyGraph,
        stack: &StackId,
        action: Action,
    ) -> Vec<StackId> {
        match action {
            Action::Deploy => graph.dependencies_of(stack),
            Action::Teardown => graph.dependents_of(stack),
        }
    }

    /// Stacks eligible for the next batch, sorted for deterministic
    /// admission order.
    fn next_batch(
        &self,
        graph: &DependencyGraph,
        status: &HashMap<StackId, StackStatus>,
        selected: &HashSet<StackId>,
        action: Action,
    ) -> Vec<StackId> {
        let mut batch: Vec<StackId> = status
            .iter()
            .filter(|(_, state)| **state == StackStatus::Pending)
            .filter(|(id, _)| {
                self.predecessors(graph, id, action)
                    .iter()
                    .filter(|p| selected.contains(*p))
                    .all(|p| status.get(p) == Some(&StackStatus::Complete))
            })
            .map(|(id, _)| id.clone())
            .collect();
        batch.sort();
        batch
    }

    /// Mark every not-yet-terminal transitive successor of `failed` as
    /// skipped, recording the originating ancestor.
    fn propagate_skips(
        &self,
        graph: &DependencyGraph,
        failed: &StackId,
        action: Action,
        selected: &HashSet<StackId>,
        status: &mut HashMap<StackId, StackStatus>,
        skip_cause: &mut HashMap<StackId, StackId>,
    ) {
        let successors = match action {
            Action::Deploy => graph.transitive_dependents(failed),
            Action::Teardown => graph.transitive_dependencies(failed),
        };
        for id in successors {
            if !selected.contains(&id) {
                continue;
            }
            let state = status.get(&id).copied();
            if matches!(state, Some(StackStatus::Pending | StackStatus::Queued)) {
                tracing::warn!(stack = %id, ancestor = %failed, "skipping dependent");
                status.insert(id.clone(), StackStatus::Skipped);
                skip_cause.entry(id).or_insert_with(|| failed.clone());
            }
        }
    }

    /// Resolve (deploy only) and hand the stack to the connector.
    async fn run_stack(
        &self,
        stack: &Arc<Stack>,
        extracted: Option<&ExtractedStack>,
        action: Action,
    ) -> Result<()> {
        match action {
            Action::Deploy => {
                // Resolution happens here, strictly after every dependency
                // has been observed complete; each pending value is
                // evaluated exactly once per use.
                let resolved = match extracted {
                    Some(extracted) => resolve_extracted(stack, extracted).await?,
                    None => ResolvedStack {
                        parameters: BTreeMap::new(),
                        user_data: serde_yaml::Value::Null,
                        template_path: stack.config.template_path.clone(),
                    },
                };
                self.connector.launch(stack, resolved).await
            }
            Action::Teardown => self.connector.teardown(stack).await,
        }
    }

    /// The connector this scheduler drives.
    pub fn connector(&self) -> &Arc<dyn CloudConnector> {
        &self.connector
    }

    fn progress_bar(&self, total: u64, action: Action) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                .expect("static template is valid"),
        );
        bar.set_message(match action {
            Action::Deploy => "deploying",
            Action::Teardown => "tearing down",
        });
        bar
    }
}

/// Evaluate every pending value in the extracted trees and assemble the
/// payload the connector receives.
async fn resolve_extracted(stack: &Arc<Stack>, extracted: &ExtractedStack) -> Result<ResolvedStack> {
    let mut parameters = BTreeMap::new();
    for (name, value) in &extracted.parameters {
        parameters.insert(name.clone(), value.resolve().await?);
    }
    let user_data = extracted.user_data.resolve().await?;
    Ok(ResolvedStack { parameters, user_data, template_path: stack.config.template_path.clone() })
}

#[cfg(test)]
mod tests;
