//! Strategies computing the model a plan leads to
//!
//! - [`TimeBasedApplier`]: best-effort, trusts timestamps and replays by start
//! - [`DependencyBasedApplier`]: replays in an order compatible with the
//!   dependency graph

mod dependency;
mod time;

pub use dependency::DependencyBasedApplier;
pub use time::TimeBasedApplier;

use crate::action::Action;
use crate::error::{ApplyError, PreconditionError};
use crate::plan::Plan;
use reconf_model::Model;

/// Strategy turning a plan into its resulting model
///
/// Implementations must agree on the result of every plan they both accept.
pub trait PlanApplier: Send + Sync + std::fmt::Debug {
    /// Replay the plan on a copy of its origin
    ///
    /// # Errors
    /// - `ApplyError::Precondition` when an action cannot be applied
    /// - `ApplyError::Extract` / `ApplyError::Deadlock` for strategies
    ///   needing the dependency graph
    fn apply(&self, plan: &Plan) -> Result<Model, ApplyError>;

    /// One line per action, in replay order
    fn describe(&self, plan: &Plan) -> String;

    /// Strategy name
    fn name(&self) -> &'static str;
}

pub(crate) fn precondition(action: &Action, source: PreconditionError) -> ApplyError {
    ApplyError::Precondition {
        action: Box::new(action.clone()),
        source,
    }
}
