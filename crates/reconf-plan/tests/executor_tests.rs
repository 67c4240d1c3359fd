use reconf_plan::action::{Action, ShutdownNode};
use reconf_plan::error::ExecutorError;
use reconf_plan::executor::{dispatch, ExecutorConfig, PlanExecutor};
use reconf_plan::monitor::PlanMonitor;
use reconf_plan::plan::Plan;
use reconf_test_utils::*;
use std::sync::Arc;
use std::time::Duration;

fn executor(plan: Plan, visitor: Arc<RecordingVisitor>) -> PlanExecutor {
    let monitor = Arc::new(PlanMonitor::new(plan).unwrap());
    PlanExecutor::new(monitor, visitor)
}

#[tokio::test]
async fn test_visits_every_action_once() {
    let s = monitor_scenario();
    let visitor = Arc::new(RecordingVisitor::new());
    let exec = executor(s.plan.clone(), visitor.clone());

    let report = exec.run().await.unwrap();
    assert_eq!(report.executed, 4);
    assert_eq!(report.commit_order.len(), 4);
    assert_eq!(visitor.journal().len(), 4);
    assert!(exec.monitor().is_over());
    assert_eq!(exec.monitor().current_model(), s.plan.result().unwrap());

    let pos = |a: &Action| report.commit_order.iter().position(|x| x == a).unwrap();
    assert!(pos(&s.boot_n3) < pos(&s.migrate_vm1));
}

#[tokio::test]
async fn test_independent_effects_overlap() {
    let s = monitor_scenario();
    let visitor = Arc::new(RecordingVisitor::new().with_delay(Duration::from_millis(5)));
    let report = executor(s.plan, visitor).run().await.unwrap();
    assert_eq!(report.peak_in_flight, 3);
}

#[tokio::test]
async fn test_max_in_flight_is_honored() {
    let visitor = Arc::new(RecordingVisitor::new().with_delay(Duration::from_millis(1)));
    let exec = executor(complex_plan(), visitor)
        .with_config(ExecutorConfig::default().with_max_in_flight(1));
    let report = exec.run().await.unwrap();
    assert_eq!(report.executed, 6);
    assert_eq!(report.peak_in_flight, 1);
}

#[tokio::test]
async fn test_visitor_failure_is_propagated() {
    let s = monitor_scenario();
    let visitor = Arc::new(RecordingVisitor::new().failing_on("bootNode"));
    let exec = executor(s.plan.clone(), visitor);
    match exec.run().await {
        Err(ExecutorError::Visit { action, .. }) => assert_eq!(*action, s.boot_n3),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!exec.monitor().is_over());
}

#[tokio::test]
async fn test_infeasible_commit_is_fatal() {
    let s = monitor_scenario();
    let mut plan = Plan::new(s.plan.origin().clone());
    // n2 still hosts vm2
    plan.add(act(ShutdownNode::new(N2), 0, 1));
    let exec = executor(plan, Arc::new(RecordingVisitor::new()));
    let err = exec.run().await.unwrap_err();
    assert!(matches!(err, ExecutorError::Commit(_)));
}

#[tokio::test]
async fn test_dispatch_routes_by_kind() {
    let s = monitor_scenario();
    let visitor = RecordingVisitor::new();
    dispatch(&visitor, &s.migrate_vm2).await.unwrap();
    dispatch(&visitor, &s.boot_vm3).await.unwrap();
    assert_eq!(
        visitor.journal(),
        vec!["migrate(vm=vm2, from=n2, to=n1)", "bootVM(vm=vm3, on=n1)"]
    );
}
