//! Reconf Plan
//!
//! Execution core of reconfiguration plans: a set of timed actions moving a
//! fleet of nodes and VMs from an origin [`Model`](reconf_model::Model) to a
//! target one.
//!
//! - [`action`]: timed operations and their hooked events
//! - [`dependency`]: which actions must finish before others start
//! - [`plan`]: the plan container
//! - [`applier`]: time-based and dependency-based replay
//! - [`monitor`]: thread-safe `begin`/`commit` state machine
//! - [`executor`]: drives a monitor through an injected visitor
//! - [`checker`]: replays a plan under external constraint checkers
//!
//! # Quick Start
//!
//! ```rust
//! use reconf_plan::prelude::*;
//! use reconf_model::{Model, NodeId, VmId};
//!
//! let mut mo = Model::new();
//! mo.mapping_mut().add_offline_node(NodeId(1)).unwrap();
//! mo.mapping_mut().add_ready_vm(VmId(1));
//!
//! let boot = Action::new(BootNode::new(NodeId(1)), 0, 3).unwrap();
//! let start = Action::new(BootVm::new(VmId(1), NodeId(1)), 3, 5).unwrap();
//! let mut plan = Plan::new(mo);
//! plan.add(boot.clone());
//! plan.add(start.clone());
//!
//! let monitor = PlanMonitor::new(plan).unwrap();
//! assert!(monitor.is_blocked(&start));
//! assert!(monitor.begin(&boot));
//! assert_eq!(monitor.commit(&boot).unwrap(), vec![&start]);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod action;
pub mod applier;
pub mod checker;
pub mod comparator;
pub mod dependency;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod plan;
pub mod state_machine;

pub mod test_harness;

pub use error::{
    ActionError, ApplyError, CommitError, ExecutorError, ExtractError, PreconditionError,
    ReconfError, Violation,
};

/// Common imports
pub mod prelude {
    pub use crate::action::{
        Action, ActionKind, Allocate, BootNode, BootVm, Event, ForgeVm, Hook, Instant, KillVm,
        MigrateVm, ResumeVm, ShutdownNode, ShutdownVm, SuspendVm,
    };
    pub use crate::applier::{DependencyBasedApplier, PlanApplier, TimeBasedApplier};
    pub use crate::checker::{ConstraintChecker, PlanChecker};
    pub use crate::comparator::TimedComparator;
    pub use crate::dependency::{extract, DependencyGraph};
    pub use crate::error::{
        ActionError, ApplyError, CommitError, ExecutorError, ExtractError, PreconditionError,
        ReconfError, Violation,
    };
    pub use crate::executor::{dispatch, ActionVisitor, ExecutionReport, ExecutorConfig, PlanExecutor};
    pub use crate::monitor::PlanMonitor;
    pub use crate::plan::Plan;
    pub use crate::state_machine::ActionState;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
