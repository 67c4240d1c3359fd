//! Error types for model mutations

use crate::{NodeId, VmId};

/// A mutation refused by the model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// The node is not part of the mapping
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The VM is not part of the mapping
    #[error("unknown VM {0}")]
    UnknownVm(VmId),

    /// The node must be online to host a VM
    #[error("node {0} is not online")]
    NodeNotOnline(NodeId),

    /// The node still hosts running or sleeping VMs
    #[error("node {node} still hosts {count} VM(s)")]
    NodeNotEmpty {
        /// The hosting node
        node: NodeId,
        /// Number of hosted VMs
        count: usize,
    },

    /// The VM identifier is already in use
    #[error("VM {0} already exists")]
    DuplicateVm(VmId),
}
