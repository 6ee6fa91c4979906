//! End-to-end tests: real config trees on disk, mock control plane.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use stackctl::config::Project;
use stackctl::connector::mock::MockConnector;
use stackctl::core::StackctlError;
use stackctl::orchestrator::Orchestrator;
use stackctl::scheduler::{Action, Scheduler, StackOutcome};
use stackctl::stack::StackId;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A small but realistic project: vpc at the bottom, database reading the
/// vpc id through a resolver, application depending on both, monitoring
/// independent of everything.
fn sample_project(root: &Path) {
    write(root, "config/config.yaml", "project_code: acme\nregion: eu-west-1\n");
    write(root, "config/network/vpc.yaml", "template_path: templates/vpc.yaml\n");
    write(
        root,
        "config/database.yaml",
        "template_path: templates/db.yaml\nparameters:\n  VpcId: !stack_output network/vpc.yaml::VpcId\n",
    );
    write(
        root,
        "config/application.yaml",
        concat!(
            "template_path: templates/app.yaml\n",
            "dependencies:\n  - database.yaml\n",
            "parameters:\n  Endpoint: !stack_output database.yaml::Endpoint\n",
        ),
    );
    write(root, "config/monitoring.yaml", "template_path: templates/mon.yaml\n");
}

fn orchestrator(root: &Path, connector: Arc<MockConnector>) -> Orchestrator {
    let project = Project::load(root).unwrap();
    Orchestrator::new(project, connector)
}

#[tokio::test]
async fn full_deploy_respects_resolver_derived_order() {
    let tmp = TempDir::new().unwrap();
    sample_project(tmp.path());

    let connector = Arc::new(MockConnector::new());
    connector.set_outputs("network/vpc", [("VpcId", "vpc-42")]);
    connector.set_outputs("database", [("Endpoint", "db.internal:5432")]);

    let orchestrator = orchestrator(tmp.path(), connector.clone());
    let scheduler = Scheduler::new(connector.clone());
    let report = scheduler_execute(&orchestrator, &scheduler, &[], Action::Deploy).await;

    assert!(report.is_success(), "report: {}", report.render());
    // vpc before database before application.
    let launches = connector.launches();
    let pos = |name: &str| launches.iter().position(|s| s == &StackId::new(name)).unwrap();
    assert!(pos("network/vpc") < pos("database"));
    assert!(pos("database") < pos("application"));

    // Resolved values flowed through to the connector.
    let db = connector.resolved_for("database").unwrap();
    assert_eq!(db.parameters["VpcId"], serde_yaml::Value::String("vpc-42".into()));
    let app = connector.resolved_for("application").unwrap();
    assert_eq!(app.parameters["Endpoint"], serde_yaml::Value::String("db.internal:5432".into()));
}

#[tokio::test]
async fn vpc_failure_cascades_while_monitoring_deploys() {
    let tmp = TempDir::new().unwrap();
    sample_project(tmp.path());

    let connector = Arc::new(MockConnector::new());
    connector.fail_on("network/vpc");

    let orchestrator = orchestrator(tmp.path(), connector.clone());
    let scheduler = Scheduler::new(connector.clone());
    let report = scheduler_execute(&orchestrator, &scheduler, &[], Action::Deploy).await;

    assert!(matches!(
        report.outcomes[&StackId::new("network/vpc")],
        StackOutcome::Failed { .. }
    ));
    assert!(matches!(
        report.outcomes[&StackId::new("database")],
        StackOutcome::Skipped { .. }
    ));
    assert!(matches!(
        report.outcomes[&StackId::new("application")],
        StackOutcome::Skipped { .. }
    ));
    assert_eq!(report.outcomes[&StackId::new("monitoring")], StackOutcome::Complete);
}

#[tokio::test]
async fn targeted_deploy_builds_only_the_needed_subgraph() {
    let tmp = TempDir::new().unwrap();
    sample_project(tmp.path());

    let connector = Arc::new(MockConnector::new());
    connector.set_outputs("network/vpc", [("VpcId", "vpc-42")]);

    let orchestrator = orchestrator(tmp.path(), connector.clone());
    let scheduler = Scheduler::new(connector.clone());
    let report = scheduler_execute(
        &orchestrator,
        &scheduler,
        &["database".to_string()],
        Action::Deploy,
    )
    .await;

    assert!(report.is_success());
    assert_eq!(report.outcomes.len(), 2);
    assert!(!connector.launches().contains(&StackId::new("application")));
    assert!(!connector.launches().contains(&StackId::new("monitoring")));
}

#[tokio::test]
async fn cycle_aborts_before_anything_launches() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "config/a.yaml",
        "parameters:\n  X: !stack_output b.yaml::Out\n",
    );
    write(
        tmp.path(),
        "config/b.yaml",
        "parameters:\n  Y: !stack_output a.yaml::Out\n",
    );

    let connector = Arc::new(MockConnector::new());
    let orchestrator = orchestrator(tmp.path(), connector.clone());
    let err = orchestrator.prepare().unwrap_err();

    let StackctlError::CircularDependency { cycle } = err else {
        panic!("expected CircularDependency, got {err}");
    };
    assert_eq!(cycle.first(), cycle.last());
    assert!(connector.launches().is_empty());
}

#[tokio::test]
async fn unknown_resolver_tag_fails_at_prepare_time() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "config/a.yaml", "parameters:\n  X: !vault_secret db/password\n");

    let connector = Arc::new(MockConnector::new());
    let orchestrator = orchestrator(tmp.path(), connector.clone());
    let err = orchestrator.prepare().unwrap_err();
    assert!(
        matches!(err, StackctlError::UnknownResolver { ref name, .. } if name == "vault_secret")
    );
    assert!(connector.launches().is_empty());
}

#[tokio::test]
async fn file_resolver_reads_project_relative_files() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "data/teams.json", r#"["HR","Governance"]"#);
    write(
        tmp.path(),
        "config/a.yaml",
        "sceptre_user_data:\n  teams: !file data/teams.json\n",
    );

    let connector = Arc::new(MockConnector::new());
    let orchestrator = orchestrator(tmp.path(), connector.clone());
    let scheduler = Scheduler::new(connector.clone());
    let report = scheduler_execute(&orchestrator, &scheduler, &[], Action::Deploy).await;

    assert!(report.is_success());
    let resolved = connector.resolved_for("a").unwrap();
    let teams = resolved.user_data.get("teams").unwrap().as_sequence().unwrap();
    assert_eq!(teams.len(), 2);
    assert_eq!(teams[0], serde_yaml::Value::String("HR".into()));
}

#[tokio::test]
async fn full_teardown_reverses_the_deploy_order() {
    let tmp = TempDir::new().unwrap();
    sample_project(tmp.path());

    let connector = Arc::new(MockConnector::new());
    connector.set_outputs("network/vpc", [("VpcId", "vpc-42")]);
    connector.set_outputs("database", [("Endpoint", "db.internal:5432")]);

    let orchestrator = orchestrator(tmp.path(), connector.clone());
    let scheduler = Scheduler::new(connector.clone());
    let deploy = scheduler_execute(&orchestrator, &scheduler, &[], Action::Deploy).await;
    assert!(deploy.is_success());

    let teardown = scheduler_execute(&orchestrator, &scheduler, &[], Action::Teardown).await;
    assert!(teardown.is_success());

    let order = connector.teardowns();
    let pos = |name: &str| order.iter().position(|s| s == &StackId::new(name)).unwrap();
    assert!(pos("application") < pos("database"));
    assert!(pos("database") < pos("network/vpc"));
}

async fn scheduler_execute(
    orchestrator: &Orchestrator,
    scheduler: &Scheduler,
    targets: &[String],
    action: Action,
) -> stackctl::scheduler::ExecutionReport {
    orchestrator.execute(scheduler, targets, action).await.unwrap()
}
