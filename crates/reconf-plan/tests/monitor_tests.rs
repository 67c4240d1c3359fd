//! Monitor behaviour on the reference scenario:
//! `n1`, `n2` online, `n3` offline, `vm3` ready, `vm1` on `n1`, `vm2` on `n2`;
//! boot `n3` [0,3], boot `vm3` on `n1` [0,3], migrate `vm1` to `n3` [4,5],
//! migrate `vm2` to `n1` [4,7].

use reconf_plan::error::CommitError;
use reconf_plan::monitor::PlanMonitor;
use reconf_plan::state_machine::ActionState;
use reconf_test_utils::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_initial_feasible_set() {
    let s = monitor_scenario();
    let m = PlanMonitor::new(s.plan.clone()).unwrap();

    assert_eq!(
        m.feasible_actions(),
        vec![&s.boot_n3, &s.boot_vm3, &s.migrate_vm2]
    );
    assert_eq!(m.waiting_actions(), vec![&s.migrate_vm1]);
    assert!(m.is_blocked(&s.migrate_vm1));
    assert!(!m.is_over());
}

#[test]
fn test_full_run() {
    let s = monitor_scenario();
    let m = PlanMonitor::new(s.plan.clone()).unwrap();

    for a in [&s.boot_n3, &s.boot_vm3, &s.migrate_vm2] {
        assert!(m.begin(a));
    }
    assert!(m.commit(&s.boot_vm3).unwrap().is_empty());
    assert!(m.commit(&s.migrate_vm2).unwrap().is_empty());
    assert!(m.is_blocked(&s.migrate_vm1));
    assert_eq!(m.commit(&s.boot_n3).unwrap(), vec![&s.migrate_vm1]);
    assert_eq!(m.state(&s.migrate_vm1), Some(ActionState::Feasible));

    assert!(!m.is_over());
    assert!(m.begin(&s.migrate_vm1));
    assert!(m.commit(&s.migrate_vm1).unwrap().is_empty());
    assert!(m.is_over());

    let mo = m.current_model();
    assert_eq!(mo, s.plan.result().unwrap());
    assert_eq!(mo.mapping().vm_location(VM1), Some(N3));
    assert_eq!(mo.mapping().vm_location(VM2), Some(N1));
    assert_eq!(mo.mapping().vm_location(VM3), Some(N1));
}

#[test]
fn test_commit_without_begin_is_fatal() {
    let s = monitor_scenario();
    let m = PlanMonitor::new(s.plan.clone()).unwrap();

    let err = m.commit(&s.boot_n3).unwrap_err();
    assert!(matches!(err, CommitError::NotStarted(_)));
    assert_eq!(err.action(), &s.boot_n3);
    assert_eq!(m.state(&s.boot_n3), Some(ActionState::Feasible));
    assert_eq!(m.committed_count(), 0);
}

#[test]
fn test_double_commit_is_fatal() {
    let s = monitor_scenario();
    let m = PlanMonitor::new(s.plan.clone()).unwrap();
    assert!(m.begin(&s.boot_vm3));
    m.commit(&s.boot_vm3).unwrap();
    assert!(matches!(
        m.commit(&s.boot_vm3),
        Err(CommitError::AlreadyCommitted(_))
    ));
    assert_eq!(m.committed_count(), 1);
}

#[test]
fn test_waiting_excludes_running() {
    let s = monitor_scenario();
    let m = PlanMonitor::new(s.plan.clone()).unwrap();
    assert!(m.begin(&s.boot_n3));
    assert_eq!(m.waiting_actions(), vec![&s.migrate_vm1]);
    assert_eq!(m.running_actions(), vec![&s.boot_n3]);
}

#[test]
fn test_concurrent_drivers() {
    let s = monitor_scenario();
    let m = Arc::new(PlanMonitor::new(s.plan.clone()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                let mut done = 0;
                while !m.is_over() {
                    let feasible: Vec<_> = m
                        .wait_for_feasible(Duration::from_millis(20))
                        .into_iter()
                        .cloned()
                        .collect();
                    for a in feasible {
                        if m.begin(&a) {
                            m.commit(&a).unwrap();
                            done += 1;
                        }
                    }
                }
                done
            })
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 4);
    assert!(m.is_over());
    assert_eq!(m.current_model(), s.plan.result().unwrap());
}

#[test]
fn test_waiter_is_woken_by_commit() {
    let s = monitor_scenario();
    let m = Arc::new(PlanMonitor::new(s.plan.clone()).unwrap());
    for a in [&s.boot_n3, &s.boot_vm3, &s.migrate_vm2] {
        assert!(m.begin(a));
    }

    let waiter = {
        let m = Arc::clone(&m);
        thread::spawn(move || {
            m.wait_for_feasible(Duration::from_secs(5))
                .into_iter()
                .cloned()
                .collect::<Vec<_>>()
        })
    };
    thread::sleep(Duration::from_millis(20));
    m.commit(&s.boot_n3).unwrap();

    assert_eq!(waiter.join().unwrap(), vec![s.migrate_vm1.clone()]);
}
