//! Orchestration facade: the surface the CLI (or any front end) drives.
//!
//! Wires the pieces together in data-flow order: project configs go
//! through the extractor (producing pending resolvers and dependency
//! edges), the edges build a [`DependencyGraph`], and the scheduler drives
//! the cloud connector over that graph. The resolver registry is owned
//! here - constructed once at startup, populated from plugin discovery,
//! and passed explicitly to extraction, never reached through globals.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::config::Project;
use crate::connector::CloudConnector;
use crate::core::Result;
use crate::graph::DependencyGraph;
use crate::resolver::{
    ExtractedStack, PluginDiscovery, ResolutionContext, ResolverRegistry, extract,
};
use crate::scheduler::{Action, ExecutionReport, Scheduler};
use crate::stack::{Stack, StackId};

/// A project after extraction and graph construction, ready to execute.
///
/// Derived and disposable: rebuilt per invocation, never cached across
/// runs.
#[derive(Debug)]
pub struct PreparedProject {
    /// All stacks, shared with extraction contexts and the scheduler.
    pub stacks: BTreeMap<StackId, Arc<Stack>>,
    /// Per-stack config trees with pending resolvers in place.
    pub extracted: HashMap<StackId, ExtractedStack>,
    /// The validated, acyclic dependency graph.
    pub graph: DependencyGraph,
}

/// Owns a loaded project, the resolver registry and the connector handle.
pub struct Orchestrator {
    project: Project,
    registry: ResolverRegistry,
    connector: Arc<dyn CloudConnector>,
}

impl Orchestrator {
    /// Orchestrator with the built-in resolvers.
    pub fn new(project: Project, connector: Arc<dyn CloudConnector>) -> Self {
        Self { project, registry: ResolverRegistry::with_builtins(), connector }
    }

    /// Replace the registry wholesale (e.g. for a curated resolver set).
    #[must_use]
    pub fn with_registry(mut self, registry: ResolverRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register resolvers from a plugin discovery source. Call before
    /// [`Orchestrator::prepare`]; later registrations win over built-ins.
    pub fn discover_plugins(&mut self, discovery: &dyn PluginDiscovery) {
        self.registry.extend(discovery);
    }

    /// The loaded project.
    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Handle to the connector this orchestrator resolves and launches
    /// against.
    pub fn connector(&self) -> Arc<dyn CloudConnector> {
        Arc::clone(&self.connector)
    }

    /// Extract every stack and build the dependency graph.
    ///
    /// This is the fail-fast boundary: unknown resolver tags, dangling
    /// stack references and dependency cycles are all reported here,
    /// before anything launches.
    pub fn prepare(&self) -> Result<PreparedProject> {
        let stacks: BTreeMap<StackId, Arc<Stack>> = self
            .project
            .stacks
            .iter()
            .map(|(id, stack)| (id.clone(), Arc::new(stack.clone())))
            .collect();
        let known: Arc<BTreeSet<StackId>> = Arc::new(stacks.keys().cloned().collect());

        let mut extracted = HashMap::with_capacity(stacks.len());
        let mut edges = Vec::new();
        for (id, stack) in &stacks {
            let context = ResolutionContext {
                stack: Arc::clone(stack),
                project_root: self.project.root.clone(),
                connector: Arc::clone(&self.connector),
                known_stacks: Arc::clone(&known),
            };
            let (tree, stack_edges) = extract(stack, &self.registry, &context)?;
            tracing::debug!(stack = %id, edges = stack_edges.len(), "extracted");
            extracted.insert(id.clone(), tree);
            edges.extend(stack_edges);
        }

        let graph = DependencyGraph::build(stacks.keys().cloned(), &edges)?;
        Ok(PreparedProject { stacks, extracted, graph })
    }

    /// Prepare, then execute `action` over `targets` with `scheduler`.
    ///
    /// Empty `targets` selects the whole project.
    pub async fn execute(
        &self,
        scheduler: &Scheduler,
        targets: &[String],
        action: Action,
    ) -> Result<ExecutionReport> {
        let targets = self.project.resolve_targets(targets)?;
        let prepared = self.prepare()?;
        scheduler
            .execute(&prepared.graph, &prepared.stacks, &prepared.extracted, &targets, action)
            .await
    }
}
