//! Testing utilities for the reconf workspace
//!
//! Shared fixtures, recording visitors and recording checkers.

#![allow(missing_docs)]

use parking_lot::Mutex;
use reconf_model::{Model, NodeId, ShareableResource, VmId};
use reconf_plan::action::{
    Action, ActionKind, Allocate, BootNode, BootVm, Event, ForgeVm, KillVm, MigrateVm, ResumeVm,
    ShutdownNode, ShutdownVm, SuspendVm,
};
use reconf_plan::checker::ConstraintChecker;
use reconf_plan::executor::ActionVisitor;
use reconf_plan::plan::Plan;
use std::time::Duration;

pub const N1: NodeId = NodeId(1);
pub const N2: NodeId = NodeId(2);
pub const N3: NodeId = NodeId(3);
pub const N4: NodeId = NodeId(4);
pub const N5: NodeId = NodeId(5);

pub const VM1: VmId = VmId(1);
pub const VM2: VmId = VmId(2);
pub const VM3: VmId = VmId(3);
pub const VM4: VmId = VmId(4);
pub const VM5: VmId = VmId(5);

/// Build an action, panicking on a reversed interval
pub fn act(kind: impl Into<ActionKind>, start: u32, end: u32) -> Action {
    Action::new(kind, start, end).unwrap()
}

/// The reference monitoring scenario
///
/// `n1`, `n2` online, `n3` offline, `vm3` ready, `vm1` on `n1`, `vm2` on `n2`.
#[derive(Debug, Clone)]
pub struct MonitorScenario {
    pub plan: Plan,
    pub boot_n3: Action,
    pub boot_vm3: Action,
    pub migrate_vm1: Action,
    pub migrate_vm2: Action,
}

impl MonitorScenario {
    pub fn all(&self) -> [&Action; 4] {
        [
            &self.boot_n3,
            &self.boot_vm3,
            &self.migrate_vm1,
            &self.migrate_vm2,
        ]
    }
}

pub fn monitor_scenario() -> MonitorScenario {
    let mut mo = Model::new();
    let map = mo.mapping_mut();
    map.add_online_node(N1);
    map.add_online_node(N2);
    map.add_offline_node(N3).unwrap();
    map.add_ready_vm(VM3);
    map.add_running_vm(VM1, N1).unwrap();
    map.add_running_vm(VM2, N2).unwrap();

    let boot_n3 = act(BootNode::new(N3), 0, 3);
    let boot_vm3 = act(BootVm::new(VM3, N1), 0, 3);
    let migrate_vm1 = act(MigrateVm::new(VM1, N1, N3), 4, 5);
    let migrate_vm2 = act(MigrateVm::new(VM2, N2, N1), 4, 7);

    let mut plan = Plan::new(mo);
    for a in [&boot_n3, &boot_vm3, &migrate_vm1, &migrate_vm2] {
        plan.add(a.clone());
    }
    MonitorScenario {
        plan,
        boot_n3,
        boot_vm3,
        migrate_vm1,
        migrate_vm2,
    }
}

/// A six-action plan mixing boots, migrations, an allocation and a shutdown
pub fn complex_plan() -> Plan {
    let mut mo = Model::new();
    let map = mo.mapping_mut();
    map.add_online_node(N1);
    map.add_online_node(N2);
    map.add_online_node(N3);
    map.add_offline_node(N4).unwrap();
    map.add_running_vm(VM1, N3).unwrap();
    map.add_running_vm(VM2, N1).unwrap();
    map.add_running_vm(VM3, N2).unwrap();
    map.add_running_vm(VM4, N2).unwrap();
    let mut cpu = ShareableResource::new("cpu");
    cpu.set_consumption(VM3, 3);
    mo.attach(cpu);

    let mut plan = Plan::new(mo);
    plan.add(act(BootNode::new(N4), 3, 5));
    plan.add(act(MigrateVm::new(VM1, N3, N4), 6, 7));
    plan.add(act(Allocate::new(VM3, N2, "cpu", 7), 8, 9));
    plan.add(act(MigrateVm::new(VM2, N1, N2), 1, 3));
    plan.add(act(MigrateVm::new(VM4, N2, N3), 1, 7));
    plan.add(act(ShutdownNode::new(N1), 5, 7));
    plan
}

/// Visitor journaling every effect it performs
#[derive(Debug, Default)]
pub struct RecordingVisitor {
    journal: Mutex<Vec<String>>,
    delay: Option<Duration>,
    fail_on: Option<&'static str>,
}

impl RecordingVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep that long in every effect
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every action of that kind name
    pub fn failing_on(mut self, kind: &'static str) -> Self {
        self.fail_on = Some(kind);
        self
    }

    /// Performed effects, in completion order
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    async fn record(&self, kind: ActionKind) -> anyhow::Result<()> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail_on == Some(kind.name()) {
            anyhow::bail!("refusing {kind}");
        }
        self.journal.lock().push(kind.to_string());
        Ok(())
    }
}

#[async_trait::async_trait]
impl ActionVisitor for RecordingVisitor {
    async fn boot_node(&self, op: &BootNode) -> anyhow::Result<()> {
        self.record((*op).into()).await
    }

    async fn shutdown_node(&self, op: &ShutdownNode) -> anyhow::Result<()> {
        self.record((*op).into()).await
    }

    async fn boot_vm(&self, op: &BootVm) -> anyhow::Result<()> {
        self.record((*op).into()).await
    }

    async fn shutdown_vm(&self, op: &ShutdownVm) -> anyhow::Result<()> {
        self.record((*op).into()).await
    }

    async fn suspend_vm(&self, op: &SuspendVm) -> anyhow::Result<()> {
        self.record((*op).into()).await
    }

    async fn resume_vm(&self, op: &ResumeVm) -> anyhow::Result<()> {
        self.record((*op).into()).await
    }

    async fn migrate_vm(&self, op: &MigrateVm) -> anyhow::Result<()> {
        self.record((*op).into()).await
    }

    async fn kill_vm(&self, op: &KillVm) -> anyhow::Result<()> {
        self.record((*op).into()).await
    }

    async fn forge_vm(&self, op: &ForgeVm) -> anyhow::Result<()> {
        self.record((*op).into()).await
    }

    async fn allocate(&self, op: &Allocate) -> anyhow::Result<()> {
        self.record(op.clone().into()).await
    }
}

/// Checker journaling every callback, optionally rejecting some of them
#[derive(Debug, Default)]
pub struct RecordingChecker {
    name: String,
    calls: Mutex<Vec<String>>,
    reject_origin: bool,
    reject_result: bool,
    reject_start_of: Option<&'static str>,
}

impl RecordingChecker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn rejecting_origin(mut self) -> Self {
        self.reject_origin = true;
        self
    }

    pub fn rejecting_result(mut self) -> Self {
        self.reject_result = true;
        self
    }

    /// Reject the start of every action of that kind name
    pub fn rejecting_start_of(mut self, kind: &'static str) -> Self {
        self.reject_start_of = Some(kind);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl ConstraintChecker for RecordingChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn starts_with(&self, _mo: &Model) -> bool {
        self.calls.lock().push("startsWith".into());
        !self.reject_origin
    }

    fn start(&self, action: &Action) -> bool {
        self.calls.lock().push(format!("start {action}"));
        self.reject_start_of != Some(action.kind().name())
    }

    fn end(&self, action: &Action) -> bool {
        self.calls.lock().push(format!("end {action}"));
        true
    }

    fn consume(&self, event: &Event) -> bool {
        self.calls.lock().push(format!("consume {event}"));
        true
    }

    fn ends_with(&self, _mo: &Model) -> bool {
        self.calls.lock().push("endsWith".into());
        !self.reject_result
    }
}
