use super::*;
use crate::config::{StackConfig, StackGroupConfig};
use crate::connector::mock::MockConnector;
use crate::resolver::{ResolutionContext, ResolverRegistry, extract};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

struct Scenario {
    stacks: BTreeMap<StackId, Arc<Stack>>,
    extracted: HashMap<StackId, crate::resolver::ExtractedStack>,
    graph: DependencyGraph,
    connector: Arc<MockConnector>,
}

impl Scenario {
    /// Build a project from `(id, yaml)` pairs, extract everything and
    /// construct the graph, with a mock connector behind it all.
    fn new(configs: &[(&str, &str)]) -> Self {
        let connector =
            Arc::new(MockConnector::new().with_launch_delay(Duration::from_millis(10)));
        let known: Arc<BTreeSet<StackId>> =
            Arc::new(configs.iter().map(|(id, _)| StackId::new(id)).collect());

        let registry = ResolverRegistry::with_builtins();
        let mut stacks = BTreeMap::new();
        let mut extracted = HashMap::new();
        let mut edges = Vec::new();

        for (id, yaml) in configs {
            let config: StackConfig = serde_yaml::from_str(yaml).unwrap();
            let stack = Arc::new(Stack {
                id: StackId::new(id),
                config,
                group: StackGroupConfig::default(),
            });
            let context = ResolutionContext {
                stack: Arc::clone(&stack),
                project_root: PathBuf::from("."),
                connector: connector.clone() as Arc<dyn CloudConnector>,
                known_stacks: Arc::clone(&known),
            };
            let (tree, stack_edges) = extract(&stack, &registry, &context).unwrap();
            extracted.insert(stack.id.clone(), tree);
            edges.extend(stack_edges);
            stacks.insert(stack.id.clone(), stack);
        }

        let graph = DependencyGraph::build(stacks.keys().cloned(), &edges).unwrap();
        Self { stacks, extracted, graph, connector }
    }

    async fn run(&self, scheduler: &Scheduler, targets: &[&str], action: Action) -> ExecutionReport {
        let targets: Vec<StackId> = targets.iter().map(StackId::new).collect();
        scheduler
            .execute(&self.graph, &self.stacks, &self.extracted, &targets, action)
            .await
            .unwrap()
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.connector.clone() as Arc<dyn CloudConnector>)
    }
}

/// The canonical three-stack setup: `b` reads an output of `a` through a
/// resolver, `c` is independent of both.
fn abc() -> Scenario {
    let scenario = Scenario::new(&[
        ("a", "{}"),
        ("b", "parameters:\n  VpcId: !stack_output a.yaml::VpcId\n"),
        ("c", "{}"),
    ]);
    scenario.connector.set_outputs("a", [("VpcId", "vpc-1")]);
    scenario
}

#[tokio::test]
async fn independent_stacks_share_the_first_batch() {
    let scenario = abc();
    let report = scenario.run(&scenario.scheduler(), &[], Action::Deploy).await;

    assert!(report.is_success());
    assert_eq!(report.batches.len(), 2);
    assert_eq!(report.batches[0], vec![StackId::new("a"), StackId::new("c")]);
    assert_eq!(report.batches[1], vec![StackId::new("b")]);

    // b launches only after a settled.
    let launches = scenario.connector.launches();
    let a_pos = launches.iter().position(|s| s == &StackId::new("a")).unwrap();
    let b_pos = launches.iter().position(|s| s == &StackId::new("b")).unwrap();
    assert!(a_pos < b_pos);
}

#[tokio::test]
async fn stack_output_resolves_from_completed_dependency() {
    let scenario = abc();
    let report = scenario.run(&scenario.scheduler(), &[], Action::Deploy).await;
    assert!(report.is_success());

    // The mock rejects output fetches for stacks it has not completed, so
    // a resolved value proves the ordering guarantee held.
    let resolved = scenario.connector.resolved_for("b").unwrap();
    assert_eq!(
        resolved.parameters.get("VpcId"),
        Some(&serde_yaml::Value::String("vpc-1".into()))
    );
}

#[tokio::test]
async fn failure_skips_dependents_but_not_independents() {
    let scenario = abc();
    scenario.connector.fail_on("a");
    let report = scenario.run(&scenario.scheduler(), &[], Action::Deploy).await;

    assert!(!report.is_success());
    assert!(matches!(report.outcomes[&StackId::new("a")], StackOutcome::Failed { .. }));
    assert_eq!(
        report.outcomes[&StackId::new("b")],
        StackOutcome::Skipped { because: StackId::new("a") }
    );
    assert_eq!(report.outcomes[&StackId::new("c")], StackOutcome::Complete);

    // b never entered Launching.
    assert!(!scenario.connector.launches().contains(&StackId::new("b")));
}

#[tokio::test]
async fn deploy_target_pulls_in_transitive_dependencies_only() {
    let scenario = abc();
    let report = scenario.run(&scenario.scheduler(), &["b"], Action::Deploy).await;

    assert!(report.is_success());
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.contains_key(&StackId::new("a")));
    assert!(report.outcomes.contains_key(&StackId::new("b")));
    // c is untouched by the request.
    assert!(!scenario.connector.launches().contains(&StackId::new("c")));
}

#[tokio::test]
async fn teardown_schedules_dependents_first() {
    let scenario = abc();
    let report = scenario.run(&scenario.scheduler(), &["a"], Action::Teardown).await;

    assert!(report.is_success());
    // Tearing down a pulls in b (its dependent); b goes first.
    assert_eq!(report.batches[0], vec![StackId::new("b")]);
    assert_eq!(report.batches[1], vec![StackId::new("a")]);
    let teardowns = scenario.connector.teardowns();
    assert_eq!(teardowns, vec![StackId::new("b"), StackId::new("a")]);
}

#[tokio::test]
async fn teardown_failure_skips_the_dependency_side() {
    let scenario = abc();
    scenario.connector.fail_on("b");
    let report = scenario.run(&scenario.scheduler(), &["a"], Action::Teardown).await;

    assert!(matches!(report.outcomes[&StackId::new("b")], StackOutcome::Failed { .. }));
    // a must not be deleted while its dependent still exists.
    assert_eq!(
        report.outcomes[&StackId::new("a")],
        StackOutcome::Skipped { because: StackId::new("b") }
    );
    assert!(!scenario.connector.teardowns().contains(&StackId::new("a")));
}

#[tokio::test]
async fn concurrency_limit_bounds_in_flight_launches() {
    let scenario = Scenario::new(&[("a", "{}"), ("b", "{}"), ("c", "{}")]);
    let scheduler = scenario.scheduler().with_max_parallel(1);
    let report = scenario.run(&scheduler, &[], Action::Deploy).await;

    assert!(report.is_success());
    assert_eq!(report.batches.len(), 1);
    assert_eq!(scenario.connector.max_in_flight(), 1);
}

#[tokio::test]
async fn unbounded_batch_overlaps_launches() {
    let scenario = Scenario::new(&[("a", "{}"), ("b", "{}"), ("c", "{}")]);
    let report = scenario.run(&scenario.scheduler(), &[], Action::Deploy).await;

    assert!(report.is_success());
    assert!(scenario.connector.max_in_flight() > 1);
}

#[tokio::test]
async fn empty_target_list_runs_the_whole_graph() {
    let scenario = abc();
    let report = scenario.run(&scenario.scheduler(), &[], Action::Deploy).await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(scenario.connector.launches().len(), 3);
    assert!(report.is_success());
}

#[tokio::test]
async fn graph_stack_missing_from_the_map_fails_without_panicking() {
    let scenario = Scenario::new(&[("a", "{}")]);
    let graph =
        DependencyGraph::build([StackId::new("a"), StackId::new("ghost")], &[]).unwrap();
    let scheduler = scenario.scheduler();
    let report = scheduler
        .execute(&graph, &scenario.stacks, &scenario.extracted, &[], Action::Deploy)
        .await
        .unwrap();

    assert_eq!(report.outcomes[&StackId::new("a")], StackOutcome::Complete);
    assert!(matches!(
        report.outcomes[&StackId::new("ghost")],
        StackOutcome::Failed { .. }
    ));
}

#[tokio::test]
async fn cancellation_mid_batch_leaves_queued_stacks_unstarted() {
    let scenario = Scenario::new(&[("a", "{}"), ("b", "{}"), ("c", "{}")]);
    let scheduler = scenario.scheduler().with_max_parallel(1);
    let cancel = scheduler.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        cancel.store(true, Ordering::SeqCst);
    });
    let report = scenario.run(&scheduler, &[], Action::Deploy).await;

    // At least the tail of the batch was still queued when the flag flipped.
    assert!(scenario.connector.launches().len() < 3);
    let not_run =
        report.outcomes.values().filter(|o| matches!(o, StackOutcome::NotRun)).count();
    assert!(not_run >= 1);
    assert!(!report.is_success());
}

#[tokio::test]
async fn cancellation_reports_unstarted_stacks_as_not_run() {
    let scenario = abc();
    let scheduler = scenario.scheduler();
    scheduler.cancel_handle().store(true, Ordering::SeqCst);
    let report = scenario.run(&scheduler, &[], Action::Deploy).await;

    assert!(scenario.connector.launches().is_empty());
    assert!(report.outcomes.values().all(|o| matches!(o, StackOutcome::NotRun)));
}

#[tokio::test]
async fn diamond_deploys_in_dependency_order() {
    // d <- b <- a, d <- c <- a
    let scenario = Scenario::new(&[
        ("a", "dependencies: [b, c]\n"),
        ("b", "dependencies: [d]\n"),
        ("c", "dependencies: [d]\n"),
        ("d", "{}"),
    ]);
    let report = scenario.run(&scenario.scheduler(), &[], Action::Deploy).await;

    assert!(report.is_success());
    assert_eq!(report.batches[0], vec![StackId::new("d")]);
    assert_eq!(report.batches[1], vec![StackId::new("b"), StackId::new("c")]);
    assert_eq!(report.batches[2], vec![StackId::new("a")]);
}

#[tokio::test]
async fn missing_output_fails_the_consuming_stack_only() {
    let scenario = Scenario::new(&[
        ("a", "{}"),
        ("b", "parameters:\n  X: !stack_output a::Nope\n"),
        ("c", "{}"),
    ]);
    // a completes but exposes no outputs.
    let report = scenario.run(&scenario.scheduler(), &[], Action::Deploy).await;

    assert_eq!(report.outcomes[&StackId::new("a")], StackOutcome::Complete);
    assert_eq!(report.outcomes[&StackId::new("c")], StackOutcome::Complete);
    let StackOutcome::Failed { error } = &report.outcomes[&StackId::new("b")] else {
        panic!("expected b to fail");
    };
    assert!(error.contains("Nope"));
}

#[test]
fn report_render_lists_every_state() {
    let report = ExecutionReport {
        action: Action::Deploy,
        outcomes: BTreeMap::from([
            (StackId::new("a"), StackOutcome::Failed { error: "boom".into() }),
            (StackId::new("b"), StackOutcome::Skipped { because: StackId::new("a") }),
            (StackId::new("c"), StackOutcome::Complete),
        ]),
        batches: vec![],
    };
    let rendered = report.render();
    assert!(rendered.contains("a: FAILED (boom)"));
    assert!(rendered.contains("b: SKIPPED (ancestor 'a' did not complete)"));
    assert!(rendered.contains("c: COMPLETE"));
    assert!(!report.is_success());
    assert_eq!(report.failures().len(), 1);
}
