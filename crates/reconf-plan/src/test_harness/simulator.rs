//! Plan simulator
//!
//! Generates random consistent plans and drives each of them through every
//! component. Invariants checked per plan:
//! - both appliers accept the plan and agree on the result
//! - every dependency ends no later than its dependent starts
//! - the executor commits every action exactly once and ends on the applier
//!   result
//! - the checker sees properly nested start/end callbacks

use super::generator::{GeneratorConfig, PlanGenerator};
use crate::action::{
    Action, Allocate, BootNode, BootVm, ForgeVm, KillVm, MigrateVm, ResumeVm, ShutdownNode,
    ShutdownVm, SuspendVm,
};
use crate::applier::{DependencyBasedApplier, PlanApplier, TimeBasedApplier};
use crate::checker::{ConstraintChecker, PlanChecker};
use crate::executor::{ActionVisitor, ExecutorConfig, PlanExecutor};
use crate::monitor::PlanMonitor;
use crate::plan::Plan;
use parking_lot::Mutex;
use reconf_model::Model;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Simulator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Number of plans to generate
    pub plans: u64,
    /// Shape of each plan
    pub generator: GeneratorConfig,
    /// Executor settings
    pub executor: ExecutorConfig,
    /// Stop at the first violation
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            plans: 100,
            generator: GeneratorConfig::default(),
            executor: ExecutorConfig::default(),
            stop_on_first_violation: true,
        }
    }
}

impl SimulatorConfig {
    /// Set the seed
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of plans
    #[must_use]
    pub fn with_plans(mut self, plans: u64) -> Self {
        self.plans = plans;
        self
    }

    /// Set the plan shape
    #[must_use]
    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    /// Bound the number of effects in flight
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.executor = self.executor.with_max_in_flight(max);
        self
    }
}

/// An invariant broken while simulating
#[derive(Debug, Clone)]
pub enum SimulationViolation {
    /// An applier rejected a consistent plan
    Unapplyable {
        /// Plan number
        plan: u64,
        /// Applier name
        applier: &'static str,
        /// Failure
        error: String,
    },
    /// The appliers disagree on the result
    Disagreement {
        /// Plan number
        plan: u64,
    },
    /// A dependency does not end before its dependent starts
    LateDependency {
        /// Plan number
        plan: u64,
        /// The dependency
        dependency: String,
        /// The dependent
        action: String,
    },
    /// The executor failed or stopped early
    Execution {
        /// Plan number
        plan: u64,
        /// Failure
        error: String,
    },
    /// The executor ended on another model than the appliers
    Divergence {
        /// Plan number
        plan: u64,
    },
    /// The checker rejected the plan
    Check {
        /// Plan number
        plan: u64,
        /// Failure
        error: String,
    },
}

/// Counters for one run
#[derive(Debug, Clone, Default)]
pub struct SimulatorStats {
    /// Plans generated
    pub plans: u64,
    /// Actions across all plans
    pub actions: u64,
    /// Dependency edges across all plans
    pub dependencies: u64,
    /// Plans fully executed
    pub executions_succeeded: u64,
    /// Plans accepted by the checker
    pub checks_passed: u64,
    /// Highest number of effects in flight
    pub peak_in_flight: usize,
    /// Visitor calls
    pub visits: u64,
}

/// Final report
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    /// Configuration used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: SimulatorStats,
    /// Broken invariants
    pub violations: Vec<SimulationViolation>,
}

impl SimulatorReport {
    /// Whether no invariant was broken
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Human readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        let s = &self.stats;
        let _ = writeln!(out, "=== Plan Simulator Report ===\n");
        let _ = writeln!(out, "Seed: {}", self.config.seed);
        let _ = writeln!(out, "Plans: {}", s.plans);
        let _ = writeln!(out, "Actions: {}", s.actions);
        let _ = writeln!(out, "Dependencies: {}", s.dependencies);
        let _ = writeln!(out, "Executions Succeeded: {}", s.executions_succeeded);
        let _ = writeln!(out, "Checks Passed: {}", s.checks_passed);
        let _ = writeln!(out, "Visits: {}", s.visits);
        let _ = writeln!(out, "Peak In Flight: {}", s.peak_in_flight);
        let _ = writeln!(out, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            let _ = writeln!(out, "\n=== Violations ===");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(out, "{}. {v:?}", i + 1);
            }
        }

        let _ = writeln!(
            out,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        out
    }
}

/// Visitor yielding to the scheduler so that effects complete out of order
#[derive(Debug, Default)]
pub struct ShufflingVisitor {
    visits: AtomicU64,
}

impl ShufflingVisitor {
    /// Number of effects performed
    #[must_use]
    pub fn visits(&self) -> u64 {
        self.visits.load(Ordering::Relaxed)
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let n = self.visits.fetch_add(1, Ordering::Relaxed);
        for _ in 0..(n * 7 % 5) {
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ActionVisitor for ShufflingVisitor {
    async fn boot_node(&self, _op: &BootNode) -> anyhow::Result<()> {
        self.tick().await
    }

    async fn shutdown_node(&self, _op: &ShutdownNode) -> anyhow::Result<()> {
        self.tick().await
    }

    async fn boot_vm(&self, _op: &BootVm) -> anyhow::Result<()> {
        self.tick().await
    }

    async fn shutdown_vm(&self, _op: &ShutdownVm) -> anyhow::Result<()> {
        self.tick().await
    }

    async fn suspend_vm(&self, _op: &SuspendVm) -> anyhow::Result<()> {
        self.tick().await
    }

    async fn resume_vm(&self, _op: &ResumeVm) -> anyhow::Result<()> {
        self.tick().await
    }

    async fn migrate_vm(&self, _op: &MigrateVm) -> anyhow::Result<()> {
        self.tick().await
    }

    async fn kill_vm(&self, _op: &KillVm) -> anyhow::Result<()> {
        self.tick().await
    }

    async fn forge_vm(&self, _op: &ForgeVm) -> anyhow::Result<()> {
        self.tick().await
    }

    async fn allocate(&self, _op: &Allocate) -> anyhow::Result<()> {
        self.tick().await
    }
}

/// Checker rejecting an action that starts twice or ends without starting
#[derive(Debug, Default)]
pub struct NestingChecker {
    open: Mutex<HashSet<Action>>,
}

impl ConstraintChecker for NestingChecker {
    fn name(&self) -> &str {
        "nesting"
    }

    fn starts_with(&self, _mo: &Model) -> bool {
        self.open.lock().clear();
        true
    }

    fn start(&self, action: &Action) -> bool {
        self.open.lock().insert(action.clone())
    }

    fn end(&self, action: &Action) -> bool {
        self.open.lock().remove(action)
    }

    fn ends_with(&self, mo: &Model) -> bool {
        let map = mo.mapping();
        self.open.lock().is_empty()
            && map
                .offline_nodes()
                .all(|n| map.hosted_vms(n).is_empty())
    }
}

/// Run the plan simulator
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut generator = PlanGenerator::new(config.seed, config.generator.clone());
    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();

    let mut checker = PlanChecker::new();
    checker.add_checker(Arc::new(NestingChecker::default()));

    for id in 0..config.plans {
        let plan = generator.generate();
        stats.plans += 1;
        stats.actions += plan.size() as u64;

        let found = simulate_plan(id, &plan, &config, &checker, &mut stats).await;
        if !found.is_empty() {
            tracing::warn!(plan = id, violations = found.len(), "invariant broken");
            violations.extend(found);
            if config.stop_on_first_violation {
                break;
            }
        }
    }

    tracing::info!(
        plans = stats.plans,
        actions = stats.actions,
        violations = violations.len(),
        "simulation finished"
    );
    SimulatorReport {
        config,
        stats,
        violations,
    }
}

async fn simulate_plan(
    id: u64,
    plan: &Plan,
    config: &SimulatorConfig,
    checker: &PlanChecker,
    stats: &mut SimulatorStats,
) -> Vec<SimulationViolation> {
    let mut found = Vec::new();

    let by_time = TimeBasedApplier.apply(plan);
    let by_deps = DependencyBasedApplier.apply(plan);
    let expected = match (by_time, by_deps) {
        (Ok(a), Ok(b)) => {
            if a != b {
                found.push(SimulationViolation::Disagreement { plan: id });
            }
            a
        }
        (Err(e), _) => {
            found.push(SimulationViolation::Unapplyable {
                plan: id,
                applier: TimeBasedApplier.name(),
                error: e.to_string(),
            });
            return found;
        }
        (_, Err(e)) => {
            found.push(SimulationViolation::Unapplyable {
                plan: id,
                applier: DependencyBasedApplier.name(),
                error: e.to_string(),
            });
            return found;
        }
    };

    let monitor = match PlanMonitor::new(plan.clone()) {
        Ok(m) => Arc::new(m),
        Err(e) => {
            found.push(SimulationViolation::Execution {
                plan: id,
                error: e.to_string(),
            });
            return found;
        }
    };

    let graph = monitor.graph();
    stats.dependencies += graph.edge_count() as u64;
    for action in graph.actions() {
        for dep in graph.dependencies(action) {
            if dep.end() > action.start() {
                found.push(SimulationViolation::LateDependency {
                    plan: id,
                    dependency: dep.to_string(),
                    action: action.to_string(),
                });
            }
        }
    }

    let visitor = Arc::new(ShufflingVisitor::default());
    let executor = PlanExecutor::new(Arc::clone(&monitor), visitor.clone())
        .with_config(config.executor.clone());
    match executor.run().await {
        Ok(report) if report.executed == plan.size() => {
            stats.executions_succeeded += 1;
            stats.peak_in_flight = stats.peak_in_flight.max(report.peak_in_flight);
            if monitor.current_model() != expected {
                found.push(SimulationViolation::Divergence { plan: id });
            }
        }
        Ok(report) => found.push(SimulationViolation::Execution {
            plan: id,
            error: format!("{} of {} actions executed", report.executed, plan.size()),
        }),
        Err(e) => found.push(SimulationViolation::Execution {
            plan: id,
            error: e.to_string(),
        }),
    }
    stats.visits += visitor.visits();

    match checker.check(plan) {
        Ok(()) => stats.checks_passed += 1,
        Err(e) => found.push(SimulationViolation::Check {
            plan: id,
            error: e.to_string(),
        }),
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_run_passes() {
        let report = run_simulator(SimulatorConfig::default().with_plans(30)).await;
        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.plans, 30);
        assert_eq!(report.stats.executions_succeeded, 30);
        assert_eq!(report.stats.checks_passed, 30);
    }

    #[tokio::test]
    async fn bounded_parallelism_passes() {
        let config = SimulatorConfig::default()
            .with_seed(9)
            .with_plans(20)
            .with_max_in_flight(2);
        let report = run_simulator(config).await;
        assert!(report.passed(), "{}", report.generate_text());
        assert!(report.stats.peak_in_flight <= 2);
    }

    #[test]
    fn report_text() {
        let report = SimulatorReport {
            config: SimulatorConfig::default(),
            stats: SimulatorStats::default(),
            violations: vec![SimulationViolation::Disagreement { plan: 3 }],
        };
        let text = report.generate_text();
        assert!(text.contains("Seed: 42"));
        assert!(text.contains("Disagreement"));
        assert!(text.contains("FAIL"));
    }
}
