//! Placement of VMs on nodes

use crate::error::ModelError;
use crate::{NodeId, NodeState, VmId, VmState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Node states and VM placement
///
/// A VM is hosted by at most one node, and only online nodes may host
/// VMs. Both rules are enforced by the mutators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    nodes: BTreeMap<NodeId, NodeState>,
    vms: BTreeMap<VmId, VmState>,
}

impl Mapping {
    /// Create an empty mapping
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node online, adding it when unknown
    pub fn add_online_node(&mut self, node: NodeId) {
        self.nodes.insert(node, NodeState::Online);
    }

    /// Declare a node offline, adding it when unknown
    ///
    /// # Errors
    /// - `ModelError::NodeNotEmpty` if the node hosts VMs
    pub fn add_offline_node(&mut self, node: NodeId) -> Result<(), ModelError> {
        let count = self.hosted_vms(node).len();
        if count > 0 {
            return Err(ModelError::NodeNotEmpty { node, count });
        }
        self.nodes.insert(node, NodeState::Offline);
        Ok(())
    }

    /// Set a VM running on a node
    ///
    /// # Errors
    /// - `ModelError::UnknownNode` / `ModelError::NodeNotOnline` if the
    ///   node cannot host the VM
    pub fn add_running_vm(&mut self, vm: VmId, node: NodeId) -> Result<(), ModelError> {
        self.ensure_online(node)?;
        self.vms.insert(vm, VmState::Running(node));
        Ok(())
    }

    /// Set a VM sleeping on a node
    ///
    /// # Errors
    /// - `ModelError::UnknownNode` / `ModelError::NodeNotOnline` if the
    ///   node cannot host the VM
    pub fn add_sleeping_vm(&mut self, vm: VmId, node: NodeId) -> Result<(), ModelError> {
        self.ensure_online(node)?;
        self.vms.insert(vm, VmState::Sleeping(node));
        Ok(())
    }

    /// Set a VM ready, removing it from its host if any
    pub fn add_ready_vm(&mut self, vm: VmId) {
        self.vms.insert(vm, VmState::Ready);
    }

    /// Remove a VM. Returns `false` if it was unknown
    pub fn remove_vm(&mut self, vm: VmId) -> bool {
        self.vms.remove(&vm).is_some()
    }

    /// Remove a node. Returns `Ok(false)` if it was unknown
    ///
    /// # Errors
    /// - `ModelError::NodeNotEmpty` if the node hosts VMs
    pub fn remove_node(&mut self, node: NodeId) -> Result<bool, ModelError> {
        let count = self.hosted_vms(node).len();
        if count > 0 {
            return Err(ModelError::NodeNotEmpty { node, count });
        }
        Ok(self.nodes.remove(&node).is_some())
    }

    /// Give a VM a new identifier, keeping its state
    ///
    /// # Errors
    /// - `ModelError::UnknownVm` if `old` is not in the mapping
    /// - `ModelError::DuplicateVm` if `new` is already in the mapping
    pub fn substitute_vm(&mut self, old: VmId, new: VmId) -> Result<(), ModelError> {
        if self.vms.contains_key(&new) {
            return Err(ModelError::DuplicateVm(new));
        }
        let state = self.vms.remove(&old).ok_or(ModelError::UnknownVm(old))?;
        self.vms.insert(new, state);
        Ok(())
    }

    fn ensure_online(&self, node: NodeId) -> Result<(), ModelError> {
        match self.nodes.get(&node) {
            Some(NodeState::Online) => Ok(()),
            Some(NodeState::Offline) => Err(ModelError::NodeNotOnline(node)),
            None => Err(ModelError::UnknownNode(node)),
        }
    }

    /// State of a node, `None` when unknown
    #[inline]
    #[must_use]
    pub fn node_state(&self, node: NodeId) -> Option<NodeState> {
        self.nodes.get(&node).copied()
    }

    /// State of a VM, `None` when unknown
    #[inline]
    #[must_use]
    pub fn vm_state(&self, vm: VmId) -> Option<VmState> {
        self.vms.get(&vm).copied()
    }

    /// Whether the node is online
    #[must_use]
    pub fn is_online(&self, node: NodeId) -> bool {
        self.node_state(node) == Some(NodeState::Online)
    }

    /// Whether the node is offline
    #[must_use]
    pub fn is_offline(&self, node: NodeId) -> bool {
        self.node_state(node) == Some(NodeState::Offline)
    }

    /// Whether the VM is running somewhere
    #[must_use]
    pub fn is_running(&self, vm: VmId) -> bool {
        matches!(self.vm_state(vm), Some(VmState::Running(_)))
    }

    /// Whether the VM is sleeping somewhere
    #[must_use]
    pub fn is_sleeping(&self, vm: VmId) -> bool {
        matches!(self.vm_state(vm), Some(VmState::Sleeping(_)))
    }

    /// Whether the VM is ready
    #[must_use]
    pub fn is_ready(&self, vm: VmId) -> bool {
        self.vm_state(vm) == Some(VmState::Ready)
    }

    /// Host of a running or sleeping VM
    #[must_use]
    pub fn vm_location(&self, vm: VmId) -> Option<NodeId> {
        self.vm_state(vm).and_then(VmState::host)
    }

    /// Whether the node is declared
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Whether the VM is declared
    #[must_use]
    pub fn contains_vm(&self, vm: VmId) -> bool {
        self.vms.contains_key(&vm)
    }

    /// Online nodes, in identifier order
    pub fn online_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes_in(NodeState::Online)
    }

    /// Offline nodes, in identifier order
    pub fn offline_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes_in(NodeState::Offline)
    }

    fn nodes_in(&self, state: NodeState) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(move |(_, s)| **s == state)
            .map(|(n, _)| *n)
    }

    /// Every declared node
    pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Every declared VM
    pub fn all_vms(&self) -> impl Iterator<Item = VmId> + '_ {
        self.vms.keys().copied()
    }

    /// VMs running on a node
    #[must_use]
    pub fn running_vms(&self, node: NodeId) -> Vec<VmId> {
        self.vms_where(|s| s == VmState::Running(node))
    }

    /// VMs sleeping on a node
    #[must_use]
    pub fn sleeping_vms(&self, node: NodeId) -> Vec<VmId> {
        self.vms_where(|s| s == VmState::Sleeping(node))
    }

    /// VMs running or sleeping on a node
    #[must_use]
    pub fn hosted_vms(&self, node: NodeId) -> Vec<VmId> {
        self.vms_where(|s| s.host() == Some(node))
    }

    /// VMs in the ready state
    #[must_use]
    pub fn ready_vms(&self) -> Vec<VmId> {
        self.vms_where(|s| s == VmState::Ready)
    }

    fn vms_where(&self, pred: impl Fn(VmState) -> bool) -> Vec<VmId> {
        self.vms
            .iter()
            .filter(|(_, s)| pred(**s))
            .map(|(v, _)| *v)
            .collect()
    }

    /// Number of declared nodes
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of declared VMs
    #[inline]
    #[must_use]
    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (node, state) in &self.nodes {
            match state {
                NodeState::Offline => writeln!(f, "({node})")?,
                NodeState::Online => {
                    write!(f, "{node}:")?;
                    for vm in self.running_vms(*node) {
                        write!(f, " {vm}")?;
                    }
                    for vm in self.sleeping_vms(*node) {
                        write!(f, " ({vm})")?;
                    }
                    writeln!(f)?;
                }
            }
        }
        write!(f, "READY")?;
        for vm in self.ready_vms() {
            write!(f, " {vm}")?;
        }
        Ok(())
    }
}
