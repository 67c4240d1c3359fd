//! Element identifiers and states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a physical node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifier of a virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VmId(pub u32);

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vm{}", self.0)
    }
}

/// Power state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// The node can host VMs
    Online,
    /// The node is powered down
    Offline,
}

/// State of a VM, with its host when it has one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VmState {
    /// Known but not placed anywhere
    Ready,
    /// Running on a node
    Running(NodeId),
    /// Suspended, its image stored on a node
    Sleeping(NodeId),
}

impl VmState {
    /// Node hosting the VM, if any
    #[inline]
    #[must_use]
    pub fn host(self) -> Option<NodeId> {
        match self {
            Self::Ready => None,
            Self::Running(n) | Self::Sleeping(n) => Some(n),
        }
    }
}
