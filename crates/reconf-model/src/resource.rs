//! Shareable resources

use crate::{NodeId, VmId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A resource provided by nodes and consumed by VMs
///
/// Elements without an explicit value get the default capacity or
/// consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareableResource {
    id: String,
    default_capacity: u32,
    default_consumption: u32,
    consumptions: BTreeMap<VmId, u32>,
    capacities: BTreeMap<NodeId, u32>,
}

impl ShareableResource {
    /// Create a resource with zero defaults
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_defaults(id, 0, 0)
    }

    /// Create a resource with explicit defaults
    #[must_use]
    pub fn with_defaults(
        id: impl Into<String>,
        default_capacity: u32,
        default_consumption: u32,
    ) -> Self {
        Self {
            id: id.into(),
            default_capacity,
            default_consumption,
            consumptions: BTreeMap::new(),
            capacities: BTreeMap::new(),
        }
    }

    /// Resource identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Consumption of a VM
    #[must_use]
    pub fn consumption(&self, vm: VmId) -> u32 {
        self.consumptions
            .get(&vm)
            .copied()
            .unwrap_or(self.default_consumption)
    }

    /// Capacity of a node
    #[must_use]
    pub fn capacity(&self, node: NodeId) -> u32 {
        self.capacities
            .get(&node)
            .copied()
            .unwrap_or(self.default_capacity)
    }

    /// Set the consumption of a VM
    pub fn set_consumption(&mut self, vm: VmId, amount: u32) -> &mut Self {
        self.consumptions.insert(vm, amount);
        self
    }

    /// Set the capacity of a node
    pub fn set_capacity(&mut self, node: NodeId, amount: u32) -> &mut Self {
        self.capacities.insert(node, amount);
        self
    }

    /// Whether the VM has an explicit consumption
    #[must_use]
    pub fn consumption_defined(&self, vm: VmId) -> bool {
        self.consumptions.contains_key(&vm)
    }

    /// Whether the node has an explicit capacity
    #[must_use]
    pub fn capacity_defined(&self, node: NodeId) -> bool {
        self.capacities.contains_key(&node)
    }

    /// Drop the explicit consumption of a VM
    pub fn unset_vm(&mut self, vm: VmId) -> bool {
        self.consumptions.remove(&vm).is_some()
    }

    /// Drop the explicit capacity of a node
    pub fn unset_node(&mut self, node: NodeId) -> bool {
        self.capacities.remove(&node).is_some()
    }

    /// Move the explicit consumption of `old` to `new`
    ///
    /// Returns `false` when `old` had no explicit consumption.
    pub fn substitute_vm(&mut self, old: VmId, new: VmId) -> bool {
        match self.consumptions.remove(&old) {
            Some(amount) => {
                self.consumptions.insert(new, amount);
                true
            }
            None => false,
        }
    }

    /// Sum of the consumptions of some VMs
    ///
    /// With `undef` set, VMs without an explicit value count for the default.
    pub fn sum_consumptions<'a>(&self, vms: impl IntoIterator<Item = &'a VmId>, undef: bool) -> u64 {
        vms.into_iter()
            .filter_map(|vm| match self.consumptions.get(vm) {
                Some(v) => Some(u64::from(*v)),
                None if undef => Some(u64::from(self.default_consumption)),
                None => None,
            })
            .sum()
    }

    /// Sum of the capacities of some nodes
    ///
    /// With `undef` set, nodes without an explicit value count for the default.
    pub fn sum_capacities<'a>(&self, nodes: impl IntoIterator<Item = &'a NodeId>, undef: bool) -> u64 {
        nodes
            .into_iter()
            .filter_map(|n| match self.capacities.get(n) {
                Some(v) => Some(u64::from(*v)),
                None if undef => Some(u64::from(self.default_capacity)),
                None => None,
            })
            .sum()
    }
}
