//! Precedence inference between the actions of a plan
//!
//! Each action is classified per node as either *freeing* (its completion
//! releases room or brings the node up) or *demanding* (its start needs that
//! room or that node). An action depends on every action freeing the node it
//! demands that ends no later than it starts. Actions overlapping in time
//! never depend on each other: overlapping claims are already resource
//! compatible by construction.

use crate::action::{Action, ActionKind};
use crate::error::ExtractError;
use indexmap::{IndexMap, IndexSet};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use reconf_model::{Model, NodeId};
use std::collections::HashMap;

/// Node-level effect of an action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Footprint {
    frees: Option<NodeId>,
    demands: Option<NodeId>,
}

impl Footprint {
    fn frees(node: NodeId) -> Self {
        Self {
            frees: Some(node),
            demands: None,
        }
    }

    fn demands(node: NodeId) -> Self {
        Self {
            frees: None,
            demands: Some(node),
        }
    }
}

fn footprint(origin: &Model, action: &Action) -> Result<Footprint, ExtractError> {
    let fp = match action.kind() {
        ActionKind::BootNode(a) => Footprint::frees(a.node),
        ActionKind::ShutdownNode(a) => Footprint::demands(a.node),
        ActionKind::BootVm(a) => Footprint::demands(a.dst),
        ActionKind::ResumeVm(a) => Footprint::demands(a.dst),
        ActionKind::ShutdownVm(a) => Footprint::frees(a.host),
        ActionKind::SuspendVm(a) => Footprint::frees(a.src),
        ActionKind::MigrateVm(a) => Footprint {
            frees: Some(a.src),
            demands: Some(a.dst),
        },
        ActionKind::KillVm(a) => Footprint {
            frees: a.host,
            demands: None,
        },
        ActionKind::ForgeVm(_) => Footprint::default(),
        ActionKind::Allocate(a) => {
            let rc = origin
                .resource(&a.resource)
                .ok_or_else(|| ExtractError::UnknownResource {
                    action: Box::new(action.clone()),
                    resource: a.resource.clone(),
                })?;
            if a.amount > rc.consumption(a.vm) {
                Footprint::demands(a.host)
            } else {
                Footprint::frees(a.host)
            }
        }
    };
    Ok(fp)
}

/// Compute the dependencies of a set of actions against their origin model
///
/// Duplicated actions are considered once.
///
/// # Errors
/// - `ExtractError::UnknownResource` if an allocation targets a resource the
///   origin does not carry; no graph is produced in that case
pub fn extract<'a>(
    origin: &Model,
    actions: impl IntoIterator<Item = &'a Action>,
) -> Result<DependencyGraph, ExtractError> {
    let actions: IndexSet<Action> = actions.into_iter().cloned().collect();
    let mut freeing: HashMap<NodeId, Vec<usize>> = HashMap::new();
    let mut demanding: Vec<(usize, NodeId)> = Vec::new();

    for (idx, action) in actions.iter().enumerate() {
        let fp = footprint(origin, action)?;
        if let Some(n) = fp.frees {
            freeing.entry(n).or_default().push(idx);
        }
        if let Some(n) = fp.demands {
            demanding.push((idx, n));
        }
    }

    let mut graph = DiGraphMap::new();
    for idx in 0..actions.len() {
        graph.add_node(idx);
    }
    for (idx, node) in demanding {
        let Some(freeings) = freeing.get(&node) else {
            continue;
        };
        let start = actions[idx].start();
        for &dep in freeings {
            if dep != idx && actions[dep].end() <= start {
                graph.add_edge(dep, idx, ());
            }
        }
    }

    tracing::trace!(
        actions = actions.len(),
        edges = graph.edge_count(),
        "dependencies extracted"
    );
    Ok(DependencyGraph { actions, graph })
}

/// Precedence graph over a set of actions
///
/// Actions are addressed by their position in [`DependencyGraph::actions`].
/// An edge `a -> b` means `a` must be done before `b` may start.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    actions: IndexSet<Action>,
    graph: DiGraphMap<usize, ()>,
}

impl DependencyGraph {
    /// The actions, in extraction order
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &IndexSet<Action> {
        &self.actions
    }

    /// Number of actions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the graph has no action
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of dependency edges
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Position of an action
    #[must_use]
    pub fn index_of(&self, action: &Action) -> Option<usize> {
        self.actions.get_index_of(action)
    }

    /// Action at a position
    #[must_use]
    pub fn action(&self, idx: usize) -> Option<&Action> {
        self.actions.get_index(idx)
    }

    /// Positions of the actions `idx` depends on
    pub fn dependencies_of(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph.neighbors_directed(idx, Direction::Incoming)
    }

    /// Positions of the actions depending on `idx`
    pub fn dependents_of(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph.neighbors_directed(idx, Direction::Outgoing)
    }

    /// Actions that must be done before `action` starts
    ///
    /// Empty for an action outside the graph.
    #[must_use]
    pub fn dependencies(&self, action: &Action) -> Vec<&Action> {
        self.resolve(action, Direction::Incoming)
    }

    /// Actions waiting for `action`
    #[must_use]
    pub fn dependents(&self, action: &Action) -> Vec<&Action> {
        self.resolve(action, Direction::Outgoing)
    }

    fn resolve(&self, action: &Action, dir: Direction) -> Vec<&Action> {
        let Some(idx) = self.index_of(action) else {
            return Vec::new();
        };
        let mut out: Vec<usize> = self.graph.neighbors_directed(idx, dir).collect();
        out.sort_unstable();
        out.into_iter().filter_map(|i| self.action(i)).collect()
    }

    /// Every action with its dependencies
    #[must_use]
    pub fn to_map(&self) -> IndexMap<&Action, Vec<&Action>> {
        self.actions
            .iter()
            .map(|a| (a, self.dependencies(a)))
            .collect()
    }

    /// Whether the graph has no cycle
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// A precedence-compatible order of positions, `None` on a cycle
    #[must_use]
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        toposort(&self.graph, None).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Allocate, BootNode, BootVm, MigrateVm, ShutdownNode};
    use reconf_model::{ShareableResource, VmId};

    fn n(i: u32) -> NodeId {
        NodeId(i)
    }

    fn vm(i: u32) -> VmId {
        VmId(i)
    }

    fn act(kind: impl Into<ActionKind>, start: u32, end: u32) -> Action {
        Action::new(kind, start, end).unwrap()
    }

    #[test]
    fn disjoint_actions_are_independent() {
        let mut mo = Model::new();
        for i in 0..6 {
            mo.mapping_mut().add_online_node(n(i));
        }
        let actions = vec![
            act(MigrateVm::new(vm(0), n(0), n(1)), 0, 5),
            act(MigrateVm::new(vm(1), n(2), n(3)), 0, 5),
            act(MigrateVm::new(vm(2), n(4), n(5)), 2, 6),
        ];
        let g = extract(&mo, &actions).unwrap();
        assert_eq!(g.edge_count(), 0);
        for a in &actions {
            assert!(g.dependencies(a).is_empty());
        }
    }

    #[test]
    fn boot_then_host() {
        let mo = Model::new();
        let boot = act(BootNode::new(n(4)), 0, 5);
        let start = act(BootVm::new(vm(1), n(4)), 5, 7);
        let g = extract(&mo, [&boot, &start]).unwrap();
        assert_eq!(g.dependencies(&start), vec![&boot]);
        assert!(g.dependencies(&boot).is_empty());
        assert_eq!(g.dependents(&boot), vec![&start]);
    }

    #[test]
    fn overlap_yields_no_edge() {
        let mo = Model::new();
        let m1 = act(MigrateVm::new(vm(0), n(1), n(0)), 0, 5);
        let m3 = act(MigrateVm::new(vm(3), n(5), n(1)), 0, 2);
        let m4 = act(MigrateVm::new(vm(4), n(5), n(1)), 7, 9);
        let g = extract(&mo, [&m1, &m3, &m4]).unwrap();
        assert!(g.dependencies(&m1).is_empty());
        assert!(g.dependencies(&m3).is_empty());
        assert_eq!(g.dependencies(&m4), vec![&m1]);
    }

    #[test]
    fn shutdown_waits_for_evacuation() {
        let mo = Model::new();
        let m3 = act(MigrateVm::new(vm(3), n(5), n(1)), 0, 2);
        let s1 = act(ShutdownNode::new(n(5)), 3, 7);
        let g = extract(&mo, [&m3, &s1]).unwrap();
        assert_eq!(g.dependencies(&s1), vec![&m3]);
    }

    #[test]
    fn allocation_direction_matters() {
        let mut mo = Model::new();
        let mut rc = ShareableResource::new("cpu");
        rc.set_consumption(vm(0), 3).set_consumption(vm(1), 5);
        mo.attach(rc);

        let grow = act(Allocate::new(vm(0), n(0), "cpu", 5), 5, 7);
        let shrink = act(Allocate::new(vm(1), n(0), "cpu", 3), 0, 3);
        let g = extract(&mo, [&grow, &shrink]).unwrap();
        assert_eq!(g.dependencies(&grow), vec![&shrink]);
        assert!(g.dependencies(&shrink).is_empty());
    }

    #[test]
    fn unknown_resource_fails_extraction() {
        let mo = Model::new();
        let a = act(Allocate::new(vm(0), n(0), "mem", 5), 0, 1);
        assert!(matches!(
            extract(&mo, [&a]),
            Err(ExtractError::UnknownResource { resource, .. }) if resource == "mem"
        ));
    }

    #[test]
    fn topological_order_respects_edges() {
        let mo = Model::new();
        let boot = act(BootNode::new(n(4)), 0, 5);
        let start = act(BootVm::new(vm(1), n(4)), 5, 7);
        let g = extract(&mo, [&start, &boot]).unwrap();
        assert!(g.is_acyclic());
        let order = g.topological_order().unwrap();
        let pos = |i: usize| order.iter().position(|x| *x == i).unwrap();
        assert!(pos(g.index_of(&boot).unwrap()) < pos(g.index_of(&start).unwrap()));
    }
}
