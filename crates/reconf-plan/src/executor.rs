//! Plan execution
//!
//! The executor drives a [`PlanMonitor`]: every feasible action is begun and
//! handed to an injected [`ActionVisitor`] performing the real effect. The
//! effects run concurrently as futures polled by [`PlanExecutor::run`]; as
//! soon as one completes the action is committed, which may release others.
//!
//! The executor performs no retry. A visitor failure or a refused commit
//! stops the run.

use crate::action::{
    Action, ActionKind, Allocate, BootNode, BootVm, ForgeVm, KillVm, MigrateVm, ResumeVm,
    ShutdownNode, ShutdownVm, SuspendVm,
};
use crate::error::ExecutorError;
use crate::monitor::PlanMonitor;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Performs the real effect of each kind of action
///
/// Every method defaults to a no-op success.
#[async_trait::async_trait]
pub trait ActionVisitor: Send + Sync {
    /// Turn a node on
    async fn boot_node(&self, _op: &BootNode) -> anyhow::Result<()> {
        Ok(())
    }

    /// Turn a node off
    async fn shutdown_node(&self, _op: &ShutdownNode) -> anyhow::Result<()> {
        Ok(())
    }

    /// Start a VM
    async fn boot_vm(&self, _op: &BootVm) -> anyhow::Result<()> {
        Ok(())
    }

    /// Stop a VM
    async fn shutdown_vm(&self, _op: &ShutdownVm) -> anyhow::Result<()> {
        Ok(())
    }

    /// Suspend a VM
    async fn suspend_vm(&self, _op: &SuspendVm) -> anyhow::Result<()> {
        Ok(())
    }

    /// Resume a VM
    async fn resume_vm(&self, _op: &ResumeVm) -> anyhow::Result<()> {
        Ok(())
    }

    /// Migrate a VM
    async fn migrate_vm(&self, _op: &MigrateVm) -> anyhow::Result<()> {
        Ok(())
    }

    /// Destroy a VM
    async fn kill_vm(&self, _op: &KillVm) -> anyhow::Result<()> {
        Ok(())
    }

    /// Declare a VM
    async fn forge_vm(&self, _op: &ForgeVm) -> anyhow::Result<()> {
        Ok(())
    }

    /// Change a resource allocation
    async fn allocate(&self, _op: &Allocate) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Route an action to the visitor method matching its kind
///
/// # Errors
/// Returns the visitor failure.
pub async fn dispatch(visitor: &dyn ActionVisitor, action: &Action) -> anyhow::Result<()> {
    match action.kind() {
        ActionKind::BootNode(op) => visitor.boot_node(op).await,
        ActionKind::ShutdownNode(op) => visitor.shutdown_node(op).await,
        ActionKind::BootVm(op) => visitor.boot_vm(op).await,
        ActionKind::ShutdownVm(op) => visitor.shutdown_vm(op).await,
        ActionKind::SuspendVm(op) => visitor.suspend_vm(op).await,
        ActionKind::ResumeVm(op) => visitor.resume_vm(op).await,
        ActionKind::MigrateVm(op) => visitor.migrate_vm(op).await,
        ActionKind::KillVm(op) => visitor.kill_vm(op).await,
        ActionKind::ForgeVm(op) => visitor.forge_vm(op).await,
        ActionKind::Allocate(op) => visitor.allocate(op).await,
    }
}

/// Executor settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of effects in flight, 0 for no limit
    pub max_in_flight: usize,
}

impl ExecutorConfig {
    /// Set the maximum number of effects in flight
    #[inline]
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    fn has_room(&self, in_flight: usize) -> bool {
        self.max_in_flight == 0 || in_flight < self.max_in_flight
    }
}

/// Outcome of a complete run
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// Number of committed actions
    pub executed: usize,
    /// Actions in commit order
    pub commit_order: Vec<Action>,
    /// Highest number of effects in flight at once
    pub peak_in_flight: usize,
    /// Wall-clock duration
    pub elapsed_ms: u64,
}

/// Drives a monitored plan to completion
pub struct PlanExecutor {
    monitor: Arc<PlanMonitor>,
    visitor: Arc<dyn ActionVisitor>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("monitor", &self.monitor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PlanExecutor {
    /// Create an executor with the default configuration
    #[must_use]
    pub fn new(monitor: Arc<PlanMonitor>, visitor: Arc<dyn ActionVisitor>) -> Self {
        Self {
            monitor,
            visitor,
            config: ExecutorConfig::default(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// The driven monitor
    #[inline]
    #[must_use]
    pub fn monitor(&self) -> &Arc<PlanMonitor> {
        &self.monitor
    }

    /// Execute every action of the plan exactly once
    ///
    /// # Errors
    /// - `ExecutorError::Visit` when the visitor fails; effects still in
    ///   flight are dropped
    /// - `ExecutorError::Commit` when the monitor refuses a commit
    /// - `ExecutorError::Stalled` when nothing runs and nothing is feasible
    ///   although the plan is not over
    pub async fn run(&self) -> Result<ExecutionReport, ExecutorError> {
        let started = Instant::now();
        let mut report = ExecutionReport::default();
        let mut in_flight = FuturesUnordered::new();
        tracing::info!(actions = self.monitor.plan().size(), "execution started");

        loop {
            for action in self.monitor.feasible_actions() {
                if !self.config.has_room(in_flight.len()) {
                    break;
                }
                if !self.monitor.begin(action) {
                    continue;
                }
                let visitor = Arc::clone(&self.visitor);
                let action = action.clone();
                in_flight.push(async move {
                    let outcome = dispatch(visitor.as_ref(), &action).await;
                    (action, outcome)
                });
                report.peak_in_flight = report.peak_in_flight.max(in_flight.len());
            }

            let Some((action, outcome)) = in_flight.next().await else {
                if self.monitor.is_over() {
                    break;
                }
                let waiting = self.monitor.waiting_actions().len();
                tracing::warn!(waiting, "execution stalled");
                return Err(ExecutorError::Stalled { waiting });
            };

            if let Err(source) = outcome {
                tracing::warn!(%action, error = %source, "visitor failed");
                return Err(ExecutorError::Visit {
                    action: Box::new(action),
                    source,
                });
            }
            self.monitor.commit(&action)?;
            report.executed += 1;
            report.commit_order.push(action);
        }

        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            executed = report.executed,
            peak_in_flight = report.peak_in_flight,
            elapsed_ms = report.elapsed_ms,
            "execution finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Plan;
    use parking_lot::Mutex;
    use reconf_model::{Model, NodeId, VmId};

    #[derive(Default)]
    struct Journal(Mutex<Vec<String>>);

    #[async_trait::async_trait]
    impl ActionVisitor for Journal {
        async fn boot_node(&self, op: &BootNode) -> anyhow::Result<()> {
            self.0.lock().push(format!("boot {}", op.node));
            Ok(())
        }

        async fn boot_vm(&self, op: &BootVm) -> anyhow::Result<()> {
            self.0.lock().push(format!("start {}", op.vm));
            Ok(())
        }
    }

    struct Broken;

    #[async_trait::async_trait]
    impl ActionVisitor for Broken {
        async fn boot_node(&self, op: &BootNode) -> anyhow::Result<()> {
            anyhow::bail!("no power on {}", op.node)
        }
    }

    fn monitor() -> Arc<PlanMonitor> {
        let mut mo = Model::new();
        mo.mapping_mut().add_offline_node(NodeId(1)).unwrap();
        mo.mapping_mut().add_ready_vm(VmId(1));
        let mut p = Plan::new(mo);
        p.add(Action::new(BootVm::new(VmId(1), NodeId(1)), 3, 4).unwrap());
        p.add(Action::new(BootNode::new(NodeId(1)), 0, 3).unwrap());
        Arc::new(PlanMonitor::new(p).unwrap())
    }

    #[tokio::test]
    async fn runs_in_dependency_order() {
        let journal = Arc::new(Journal::default());
        let exec = PlanExecutor::new(monitor(), journal.clone());
        let report = exec.run().await.unwrap();

        assert_eq!(report.executed, 2);
        assert_eq!(report.peak_in_flight, 1);
        assert!(exec.monitor().is_over());
        assert_eq!(*journal.0.lock(), vec!["boot n1", "start vm1"]);
    }

    #[tokio::test]
    async fn visitor_failure_stops_the_run() {
        let exec = PlanExecutor::new(monitor(), Arc::new(Broken));
        let err = exec.run().await.unwrap_err();
        assert!(matches!(err, ExecutorError::Visit { .. }));
        assert_eq!(exec.monitor().committed_count(), 0);
    }

    #[test]
    fn config_builder() {
        let cfg = ExecutorConfig::default().with_max_in_flight(4);
        assert_eq!(cfg.max_in_flight, 4);
        assert!(cfg.has_room(3));
        assert!(!cfg.has_room(4));
        assert!(ExecutorConfig::default().has_room(1000));
    }
}
