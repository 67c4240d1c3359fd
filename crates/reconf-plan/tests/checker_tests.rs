use reconf_model::Model;
use reconf_plan::action::{BootNode, BootVm, Event, Hook, MigrateVm, ShutdownNode};
use reconf_plan::applier::{DependencyBasedApplier, PlanApplier, TimeBasedApplier};
use reconf_plan::checker::{ConstraintChecker, PlanChecker};
use reconf_plan::error::{ApplyError, Violation};
use reconf_plan::plan::Plan;
use reconf_plan::test_harness::NestingChecker;
use reconf_test_utils::*;
use std::sync::Arc;

fn checker_with(c: &Arc<RecordingChecker>) -> PlanChecker {
    let mut checker = PlanChecker::new();
    assert!(checker.add_checker(c.clone()));
    checker
}

#[test]
fn test_callbacks_follow_time() {
    let s = monitor_scenario();
    let rec = Arc::new(RecordingChecker::new("rec"));
    checker_with(&rec).check(&s.plan).unwrap();

    assert_eq!(
        rec.calls(),
        vec![
            "startsWith",
            "start bootNode(node=n3)",
            "start bootVM(vm=vm3, on=n1)",
            "end bootNode(node=n3)",
            "end bootVM(vm=vm3, on=n1)",
            "start migrate(vm=vm1, from=n1, to=n3)",
            "start migrate(vm=vm2, from=n2, to=n1)",
            "end migrate(vm=vm1, from=n1, to=n3)",
            "end migrate(vm=vm2, from=n2, to=n1)",
            "endsWith",
        ]
    );
}

#[test]
fn test_ends_precede_starts_at_same_moment() {
    let p = complex_plan();
    let rec = Arc::new(RecordingChecker::new("rec"));
    checker_with(&rec).check(&p).unwrap();

    let calls = rec.calls();
    let pos = |s: &str| calls.iter().position(|c| c == s).unwrap();
    // migrate vm2 ends at 3 when boot n4 starts
    assert!(pos("end migrate(vm=vm2, from=n1, to=n2)") < pos("start bootNode(node=n4)"));
    // boot n4 ends at 5 when shutdown n1 starts
    assert!(pos("end bootNode(node=n4)") < pos("start shutdownNode(node=n1)"));
}

#[test]
fn test_events_are_consumed_around_the_action() {
    let s = monitor_scenario();
    let mut mo = s.plan.origin().clone();
    mo.attach(reconf_model::ShareableResource::new("cpu"));
    let a = act(MigrateVm::new(VM1, N1, N2), 0, 2)
        .with_event(Hook::Pre, Event::Allocate { vm: VM1, resource: "cpu".into(), amount: 1 })
        .with_event(Hook::Post, Event::Allocate { vm: VM1, resource: "cpu".into(), amount: 2 });
    let mut p = Plan::new(mo);
    p.add(a);

    let rec = Arc::new(RecordingChecker::new("rec"));
    checker_with(&rec).check(&p).unwrap();
    assert_eq!(
        rec.calls(),
        vec![
            "startsWith",
            "consume allocate(vm=vm1, rc=cpu, amount=1)",
            "start migrate(vm=vm1, from=n1, to=n2) @pre={allocate(vm=vm1, rc=cpu, amount=1)} @post={allocate(vm=vm1, rc=cpu, amount=2)}",
            "end migrate(vm=vm1, from=n1, to=n2) @pre={allocate(vm=vm1, rc=cpu, amount=1)} @post={allocate(vm=vm1, rc=cpu, amount=2)}",
            "consume allocate(vm=vm1, rc=cpu, amount=2)",
            "endsWith",
        ]
    );
}

#[test]
fn test_discrete_violations() {
    let s = monitor_scenario();

    let at_origin = Arc::new(RecordingChecker::new("origin").rejecting_origin());
    match checker_with(&at_origin).check(&s.plan) {
        Err(Violation::Discrete { constraint, at_origin, model }) => {
            assert_eq!(constraint, "origin");
            assert!(at_origin);
            assert_eq!(&*model, s.plan.origin());
        }
        other => panic!("unexpected {other:?}"),
    }

    let at_end = Arc::new(RecordingChecker::new("result").rejecting_result());
    match checker_with(&at_end).check(&s.plan) {
        Err(Violation::Discrete { at_origin, model, .. }) => {
            assert!(!at_origin);
            assert_eq!(*model, s.plan.result().unwrap());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_continuous_violation_names_the_action() {
    let s = monitor_scenario();
    let rec = Arc::new(RecordingChecker::new("noMigration").rejecting_start_of("migrate"));
    match checker_with(&rec).check(&s.plan) {
        Err(Violation::Continuous { constraint, action, model }) => {
            assert_eq!(constraint, "noMigration");
            assert_eq!(*action, s.migrate_vm1);
            assert!(model.mapping().is_online(N3));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_inconsistent_plan() {
    let s = monitor_scenario();
    let mut p = Plan::new(s.plan.origin().clone());
    p.add(act(ShutdownNode::new(N1), 0, 1));
    let rec = Arc::new(RecordingChecker::new("rec"));
    assert!(matches!(
        checker_with(&rec).check(&p),
        Err(Violation::Inconsistent { source: ApplyError::Precondition { .. } })
    ));
}

/// `n2` offline, `vm1` ready
fn cold_origin() -> Model {
    let mut mo = Model::new();
    mo.mapping_mut().add_online_node(N1);
    mo.mapping_mut().add_offline_node(N2).unwrap();
    mo.mapping_mut().add_ready_vm(VM1);
    mo
}

#[test]
fn test_overlapping_intervals_follow_the_appliers() {
    // the VM boots inside the node boot interval and ends first
    let mut p = Plan::new(cold_origin());
    p.add(act(BootNode::new(N2), 0, 10));
    p.add(act(BootVm::new(VM1, N2), 2, 3));
    let expected = TimeBasedApplier.apply(&p).unwrap();
    assert_eq!(DependencyBasedApplier.apply(&p).unwrap(), expected);

    let rec = Arc::new(RecordingChecker::new("rec"));
    let mut checker = checker_with(&rec);
    assert!(checker.add_checker(Arc::new(NestingChecker::default())));
    checker.check(&p).unwrap();
    assert_eq!(
        rec.calls(),
        vec![
            "startsWith",
            "start bootNode(node=n2)",
            "start bootVM(vm=vm1, on=n2)",
            "end bootVM(vm=vm1, on=n2)",
            "end bootNode(node=n2)",
            "endsWith",
        ]
    );
    assert_eq!(expected.mapping().vm_location(VM1), Some(N2));
}

#[test]
fn test_zero_length_actions_nest() {
    // inserted against the dependency, which orders simultaneous callbacks
    let mut p = Plan::with_applier(cold_origin(), Arc::new(DependencyBasedApplier));
    p.add(act(BootVm::new(VM1, N2), 3, 3));
    p.add(act(BootNode::new(N2), 3, 3));
    assert!(p.is_applyable());

    let rec = Arc::new(RecordingChecker::new("rec"));
    let mut checker = checker_with(&rec);
    assert!(checker.add_checker(Arc::new(NestingChecker::default())));
    checker.check(&p).unwrap();
    assert_eq!(
        rec.calls(),
        vec![
            "startsWith",
            "start bootNode(node=n2)",
            "end bootNode(node=n2)",
            "start bootVM(vm=vm1, on=n2)",
            "end bootVM(vm=vm1, on=n2)",
            "endsWith",
        ]
    );
}

#[test]
fn test_registration() {
    let a: Arc<dyn ConstraintChecker> = Arc::new(RecordingChecker::new("a"));
    let mut checker = PlanChecker::new();
    assert!(checker.is_empty());
    assert!(checker.add_checker(a.clone()));
    assert!(!checker.add_checker(a.clone()));
    assert!(checker.remove_checker(&a));
    assert!(!checker.remove_checker(&a));
    assert!(checker.check(&Plan::new(Model::new())).is_ok());
}
