//! Seeded generation of consistent plans
//!
//! Plans are built in three phases so that they are applyable by
//! construction and every precondition is covered by a dependency:
//! 1. offline nodes are booted
//! 2. each VM performs at most one transition toward a node available after
//!    phase 1, optionally with a hooked allocation
//! 3. nodes left empty are turned off
//!
//! Every action lasts at least one unit, so the dependency graph is acyclic.

use crate::action::{
    Action, Allocate, BootNode, BootVm, Event, ForgeVm, Hook, KillVm, MigrateVm, ResumeVm,
    ShutdownNode, ShutdownVm, SuspendVm,
};
use crate::plan::Plan;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use reconf_model::{Model, NodeId, ShareableResource, VmId, VmState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Resource attached to every generated model
pub const CPU: &str = "cpu";

/// Shape of the generated plans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Number of nodes
    pub nodes: u32,
    /// Number of VMs in the origin
    pub vms: u32,
    /// Probability for a node to be offline in the origin
    pub offline_ratio: f64,
    /// Longest action
    pub max_duration: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            nodes: 5,
            vms: 8,
            offline_ratio: 0.3,
            max_duration: 4,
        }
    }
}

impl GeneratorConfig {
    /// Set the number of nodes
    #[must_use]
    pub fn with_nodes(mut self, nodes: u32) -> Self {
        self.nodes = nodes.max(1);
        self
    }

    /// Set the number of VMs
    #[must_use]
    pub fn with_vms(mut self, vms: u32) -> Self {
        self.vms = vms;
        self
    }
}

/// Random plan source
#[derive(Debug)]
pub struct PlanGenerator {
    rng: StdRng,
    config: GeneratorConfig,
}

impl PlanGenerator {
    /// Create a generator
    #[must_use]
    pub fn new(seed: u64, config: GeneratorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    /// Produce the next plan
    pub fn generate(&mut self) -> Plan {
        let origin = self.origin();
        let mut plan = Plan::new(origin.clone());
        let max = self.config.max_duration.max(1);

        // phase 1
        let mut available: Vec<NodeId> = origin.mapping().online_nodes().collect();
        let offline: Vec<NodeId> = origin.mapping().offline_nodes().collect();
        for node in offline {
            if self.rng.gen_bool(0.7) {
                plan.add(self.timed(BootNode::new(node), 0, 2));
                available.push(node);
            }
        }

        // phase 2
        let base = 2 + max;
        let mut pinned: BTreeSet<NodeId> = BTreeSet::new();
        let vms: Vec<VmId> = origin.mapping().all_vms().collect();
        for vm in vms {
            let Some(state) = origin.mapping().vm_state(vm) else {
                continue;
            };
            if let Some(action) = self.transition(vm, state, &available, &mut pinned, base) {
                plan.add(action);
            }
        }
        if self.rng.gen_bool(0.5) {
            let vm = VmId(self.config.vms + 1);
            plan.add(self.timed(ForgeVm::new(vm), base, base + 3));
        }

        // phase 3
        let Ok(result) = plan.result() else {
            return plan;
        };
        let base = base + 3 + max;
        let candidates: Vec<NodeId> = result.mapping().online_nodes().collect();
        for node in candidates {
            if result.mapping().hosted_vms(node).is_empty()
                && !pinned.contains(&node)
                && self.rng.gen_bool(0.5)
            {
                plan.add(self.timed(ShutdownNode::new(node), base, base + 2));
            }
        }
        plan
    }

    fn origin(&mut self) -> Model {
        let mut mo = Model::new();
        let mut online = Vec::new();
        for i in 1..=self.config.nodes.max(1) {
            let node = NodeId(i);
            if i > 1 && self.rng.gen_bool(self.config.offline_ratio.clamp(0.0, 1.0)) {
                mo.mapping_mut().add_offline_node(node).ok();
            } else {
                mo.mapping_mut().add_online_node(node);
                online.push(node);
            }
        }

        let mut cpu = ShareableResource::with_defaults(CPU, 8, 1);
        for i in 1..=self.config.vms {
            let vm = VmId(i);
            let host = online.choose(&mut self.rng).copied().unwrap_or(NodeId(1));
            match self.rng.gen_range(0..100) {
                0..=69 => {
                    mo.mapping_mut().add_running_vm(vm, host).ok();
                    cpu.set_consumption(vm, self.rng.gen_range(1..=4));
                }
                70..=84 => {
                    mo.mapping_mut().add_sleeping_vm(vm, host).ok();
                }
                _ => mo.mapping_mut().add_ready_vm(vm),
            }
        }
        mo.attach(cpu);
        mo
    }

    /// Nodes a VM suspends or resumes from are `pinned`: they keep hosting an
    /// image or release it without a dependency, so they are never turned off.
    fn transition(
        &mut self,
        vm: VmId,
        state: VmState,
        available: &[NodeId],
        pinned: &mut BTreeSet<NodeId>,
        base: u32,
    ) -> Option<Action> {
        let dst = *available.choose(&mut self.rng)?;
        match state {
            VmState::Running(host) => match self.rng.gen_range(0..6) {
                0 => Some(self.timed(ShutdownVm::new(vm, host), base, base + 3)),
                1 => {
                    pinned.insert(host);
                    Some(self.timed(SuspendVm::new(vm, host, host), base, base + 3))
                }
                2 | 3 if dst != host => {
                    let mut a = self.timed(MigrateVm::new(vm, host, dst), base, base + 3);
                    if self.rng.gen_bool(0.3) {
                        a.add_event(
                            Hook::Post,
                            Event::Allocate {
                                vm,
                                resource: CPU.to_string(),
                                amount: self.rng.gen_range(1..=4),
                            },
                        );
                    }
                    Some(a)
                }
                4 => {
                    let amount = self.rng.gen_range(0..=4);
                    Some(self.timed(Allocate::new(vm, host, CPU, amount), base, base + 3))
                }
                _ => None,
            },
            VmState::Sleeping(host) => match self.rng.gen_range(0..3) {
                0 => {
                    pinned.insert(host);
                    Some(self.timed(ResumeVm::new(vm, host, dst), base, base + 3))
                }
                1 => Some(self.timed(KillVm::new(vm, Some(host)), base, base + 3)),
                _ => None,
            },
            VmState::Ready => match self.rng.gen_range(0..3) {
                0 => Some(self.timed(BootVm::new(vm, dst), base, base + 3)),
                1 => Some(self.timed(KillVm::new(vm, None), base, base + 3)),
                _ => None,
            },
        }
    }

    /// An action starting in `[lo, hi]` and lasting at least one unit
    fn timed(&mut self, kind: impl Into<crate::action::ActionKind>, lo: u32, hi: u32) -> Action {
        let start = self.rng.gen_range(lo..=hi);
        let duration = self.rng.gen_range(1..=self.config.max_duration.max(1));
        Action::with_duration(kind, start, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_plan() {
        let mut a = PlanGenerator::new(7, GeneratorConfig::default());
        let mut b = PlanGenerator::new(7, GeneratorConfig::default());
        for _ in 0..5 {
            let (pa, pb) = (a.generate(), b.generate());
            assert_eq!(pa.origin(), pb.origin());
            assert_eq!(pa.actions(), pb.actions());
        }
    }

    #[test]
    fn generated_plans_are_applyable() {
        let mut gen = PlanGenerator::new(1, GeneratorConfig::default().with_nodes(6).with_vms(12));
        for _ in 0..50 {
            let plan = gen.generate();
            assert!(plan.is_applyable(), "{}", plan.describe());
        }
    }
}
