//! Error types for plan handling
//!
//! One enum per concern:
//! - building actions ([`ActionError`]) and applying them ([`PreconditionError`])
//! - extracting dependencies ([`ExtractError`])
//! - replaying a plan ([`ApplyError`])
//! - driving the monitor ([`CommitError`]) and the executor ([`ExecutorError`])
//! - checking a plan against external constraints ([`Violation`])
//!
//! [`ReconfError`] aggregates them for callers that do not care which layer
//! failed.

use crate::action::{Action, Instant};
use reconf_model::{Model, ModelError, NodeId, VmId};

/// Refused action construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// The action would end before it starts
    #[error("invalid interval [{start}, {end}]: end precedes start")]
    InvalidInterval {
        /// Requested start
        start: Instant,
        /// Requested end
        end: Instant,
    },
}

/// A precondition that does not hold on the model an action is applied to
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    /// The node must be offline
    #[error("node {0} is not offline")]
    NodeNotOffline(NodeId),

    /// The node must be online
    #[error("node {0} is not online")]
    NodeNotOnline(NodeId),

    /// The VM must be ready
    #[error("VM {0} is not ready")]
    VmNotReady(VmId),

    /// The VM must be running on the given node
    #[error("VM {vm} is not running on {node}")]
    VmNotRunningOn {
        /// The VM
        vm: VmId,
        /// The expected host
        node: NodeId,
    },

    /// The VM must be sleeping on the given node
    #[error("VM {vm} is not sleeping on {node}")]
    VmNotSleepingOn {
        /// The VM
        vm: VmId,
        /// The expected host
        node: NodeId,
    },

    /// The VM is not where the action expects it
    #[error("VM {vm} is not hosted by {}", node.map_or_else(|| "nobody".to_string(), |n| n.to_string()))]
    VmNotHostedBy {
        /// The VM
        vm: VmId,
        /// The expected host, `None` for a ready VM
        node: Option<NodeId>,
    },

    /// The VM does not exist
    #[error("unknown VM {0}")]
    UnknownVm(VmId),

    /// The VM identifier is already taken
    #[error("VM {0} already exists")]
    VmAlreadyExists(VmId),

    /// No resource with that identifier is attached
    #[error("resource '{0}' is not attached")]
    UnknownResource(String),

    /// The mapping refused the mutation
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Failure to compute the dependencies of an action set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// An allocation targets a resource the origin does not know
    #[error("{action}: resource '{resource}' is not attached to the origin")]
    UnknownResource {
        /// The offending allocation
        action: Box<Action>,
        /// Resource identifier
        resource: String,
    },
}

/// Failure to replay a plan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// An action could not be applied
    #[error("unable to apply {action}: {source}")]
    Precondition {
        /// The failing action
        action: Box<Action>,
        /// What did not hold
        source: PreconditionError,
    },

    /// The dependency graph is undefined for this plan
    #[error("dependency extraction failed: {0}")]
    Extract(#[from] ExtractError),

    /// No remaining action can ever become feasible
    #[error("deadlock: {pending} action(s) can never start")]
    Deadlock {
        /// Number of actions left
        pending: usize,
    },
}

/// Illegal commit on a plan monitor
///
/// A commit asserts that an action really finished, so every refusal is a
/// programming fault in the driving logic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    /// The action is not part of the monitored plan
    #[error("{0} is not part of the plan")]
    UnknownAction(Box<Action>),

    /// The action was never begun
    #[error("{0} was not started")]
    NotStarted(Box<Action>),

    /// The action was already committed
    #[error("{0} was already committed")]
    AlreadyCommitted(Box<Action>),

    /// The action cannot be applied to the current model
    #[error("unable to commit {action}: {precondition}")]
    Infeasible {
        /// The committed action
        action: Box<Action>,
        /// What did not hold
        precondition: PreconditionError,
        /// Model at failure time
        model: Box<Model>,
    },
}

impl CommitError {
    /// The action the commit was about
    #[must_use]
    pub fn action(&self) -> &Action {
        match self {
            Self::UnknownAction(a) | Self::NotStarted(a) | Self::AlreadyCommitted(a) => a,
            Self::Infeasible { action, .. } => action,
        }
    }

    /// Model snapshot, when available
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        match self {
            Self::Infeasible { model, .. } => Some(model),
            _ => None,
        }
    }
}

/// Failure while executing a plan
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The injected visitor failed to perform an action
    #[error("visitor failed on {action}: {source}")]
    Visit {
        /// The action being performed
        action: Box<Action>,
        /// Visitor error
        #[source]
        source: anyhow::Error,
    },

    /// The monitor refused a commit
    #[error("commit refused: {0}")]
    Commit(#[from] CommitError),

    /// Nothing is running and nothing is feasible, yet the plan is not over
    #[error("execution stalled with {waiting} blocked action(s)")]
    Stalled {
        /// Number of blocked actions
        waiting: usize,
    },
}

/// A plan rejected by an external constraint checker
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    /// The origin or the resulting model is not satisfying
    #[error("{constraint} is not satisfied by the {} model", if *at_origin { "origin" } else { "resulting" })]
    Discrete {
        /// Name of the checker
        constraint: String,
        /// Offending model
        model: Box<Model>,
        /// `true` for the origin, `false` for the result
        at_origin: bool,
    },

    /// A boundary of an action is not satisfying
    #[error("{constraint} is violated by {action}")]
    Continuous {
        /// Name of the checker
        constraint: String,
        /// The offending action
        action: Box<Action>,
        /// Model at that moment
        model: Box<Model>,
    },

    /// The plan itself cannot be replayed
    #[error("inconsistent plan: {source}")]
    Inconsistent {
        /// Replay failure
        source: ApplyError,
    },
}

impl Violation {
    /// Model at the point of violation
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        match self {
            Self::Discrete { model, .. } | Self::Continuous { model, .. } => Some(model),
            Self::Inconsistent { .. } => None,
        }
    }

    /// Name of the violated constraint
    #[must_use]
    pub fn constraint(&self) -> Option<&str> {
        match self {
            Self::Discrete { constraint, .. } | Self::Continuous { constraint, .. } => {
                Some(constraint)
            }
            Self::Inconsistent { .. } => None,
        }
    }
}

/// Any error raised by this crate
#[derive(Debug, thiserror::Error)]
pub enum ReconfError {
    /// Action construction
    #[error("action error: {0}")]
    Action(#[from] ActionError),

    /// Model mutation
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Dependency extraction
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Plan replay
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Monitor commit
    #[error("commit error: {0}")]
    Commit(#[from] CommitError),

    /// Plan execution
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Constraint check
    #[error("violation: {0}")]
    Violation(#[from] Violation),
}

impl ReconfError {
    /// Whether the error reveals a fault in the driving logic rather than an
    /// unapplyable plan
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Commit(_) | Self::Extract(_) | Self::Executor(ExecutorError::Commit(_))
        )
    }
}
