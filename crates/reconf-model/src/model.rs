//! Configuration: mapping plus attached resources

use crate::{Mapping, ShareableResource, VmId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A full configuration of the fleet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    mapping: Mapping,
    resources: BTreeMap<String, ShareableResource>,
}

impl Model {
    /// Create an empty model
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a model around an existing mapping
    #[inline]
    #[must_use]
    pub fn with_mapping(mapping: Mapping) -> Self {
        Self {
            mapping,
            resources: BTreeMap::new(),
        }
    }

    /// The placement
    #[inline]
    #[must_use]
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// The placement, mutably
    #[inline]
    pub fn mapping_mut(&mut self) -> &mut Mapping {
        &mut self.mapping
    }

    /// Attach a resource. Returns `false` if one with the same id was replaced
    pub fn attach(&mut self, rc: ShareableResource) -> bool {
        self.resources.insert(rc.id().to_string(), rc).is_none()
    }

    /// Detach a resource by id
    pub fn detach(&mut self, id: &str) -> Option<ShareableResource> {
        self.resources.remove(id)
    }

    /// Look up a resource by id
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&ShareableResource> {
        self.resources.get(id)
    }

    /// Look up a resource by id, mutably
    pub fn resource_mut(&mut self, id: &str) -> Option<&mut ShareableResource> {
        self.resources.get_mut(id)
    }

    /// Attached resources, by id
    pub fn resources(&self) -> impl Iterator<Item = &ShareableResource> {
        self.resources.values()
    }

    /// Drop every explicit consumption of a VM
    pub fn forget_vm(&mut self, vm: VmId) {
        for rc in self.resources.values_mut() {
            rc.unset_vm(vm);
        }
    }

    /// Rename a VM in every attached resource
    pub fn substitute_vm_in_resources(&mut self, old: VmId, new: VmId) {
        for rc in self.resources.values_mut() {
            rc.substitute_vm(old, new);
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mapping)?;
        for rc in self.resources.values() {
            write!(f, "\n{}", rc.id())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeId;
    use pretty_assertions::assert_eq;

    fn sample() -> Model {
        let mut mo = Model::new();
        mo.mapping_mut().add_online_node(NodeId(1));
        mo.mapping_mut().add_running_vm(VmId(1), NodeId(1)).unwrap();
        let mut rc = ShareableResource::new("cpu");
        rc.set_consumption(VmId(1), 2);
        mo.attach(rc);
        mo
    }

    #[test]
    fn attach_and_lookup() {
        let mut mo = sample();
        assert_eq!(mo.resource("cpu").map(|r| r.consumption(VmId(1))), Some(2));
        assert!(mo.resource("mem").is_none());
        assert!(!mo.attach(ShareableResource::new("cpu")));
        assert!(mo.detach("cpu").is_some());
        assert!(mo.resource("cpu").is_none());
    }

    #[test]
    fn clones_are_independent() {
        let origin = sample();
        let mut copy = origin.clone();
        copy.mapping_mut().add_ready_vm(VmId(1));
        assert!(origin.mapping().is_running(VmId(1)));
        assert!(copy.mapping().is_ready(VmId(1)));
        assert_ne!(origin, copy);
    }

    #[test]
    fn resource_bookkeeping_follows_vm() {
        let mut mo = sample();
        mo.substitute_vm_in_resources(VmId(1), VmId(7));
        assert_eq!(mo.resource("cpu").map(|r| r.consumption(VmId(7))), Some(2));
        mo.forget_vm(VmId(7));
        assert_eq!(
            mo.resource("cpu").map(|r| r.consumption_defined(VmId(7))),
            Some(false)
        );
    }

    #[test]
    fn serializes_to_json() {
        let mo = sample();
        let json = serde_json::to_string(&mo).unwrap();
        let back: Model = serde_json::from_str(&json).unwrap();
        assert_eq!(mo, back);
    }
}
