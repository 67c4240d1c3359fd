//! Reconf Model
//!
//! The configuration a reconfiguration plan starts from and produces:
//! - [`Mapping`]: online/offline nodes and the state and host of every VM
//! - [`ShareableResource`]: a named resource with per-VM consumptions and
//!   per-node capacities
//! - [`Model`]: a mapping plus the resources attached to it
//!
//! The model is deliberately small. Operations of a plan mutate it through the
//! methods exposed here and never look deeper than the placement of a VM or
//! the status of a node.
//!
//! # Example
//!
//! ```rust
//! use reconf_model::{Model, NodeId, VmId};
//!
//! let mut mo = Model::new();
//! let (n1, vm1) = (NodeId(1), VmId(1));
//! mo.mapping_mut().add_online_node(n1);
//! mo.mapping_mut().add_running_vm(vm1, n1).unwrap();
//! assert_eq!(mo.mapping().vm_location(vm1), Some(n1));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod element;
mod error;
mod mapping;
mod model;
mod resource;

pub use element::{NodeId, NodeState, VmId, VmState};
pub use error::ModelError;
pub use mapping::Mapping;
pub use model::Model;
pub use resource::ShareableResource;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
