//! Reconfiguration plan container

use crate::action::{Action, Instant};
use crate::applier::{PlanApplier, TimeBasedApplier};
use crate::dependency::{self, DependencyGraph};
use crate::error::{ApplyError, ExtractError};
use indexmap::IndexSet;
use reconf_model::Model;
use std::fmt;
use std::sync::Arc;

/// A set of timed actions anchored to the model they start from
///
/// Actions are unique and kept in insertion order. The result of the plan is
/// computed by the configured [`PlanApplier`], time-based unless told
/// otherwise.
#[derive(Debug, Clone)]
pub struct Plan {
    origin: Model,
    actions: IndexSet<Action>,
    applier: Arc<dyn PlanApplier>,
}

impl Plan {
    /// Create an empty plan using the time-based applier
    #[must_use]
    pub fn new(origin: Model) -> Self {
        Self::with_applier(origin, Arc::new(TimeBasedApplier))
    }

    /// Create an empty plan using a specific applier
    #[must_use]
    pub fn with_applier(origin: Model, applier: Arc<dyn PlanApplier>) -> Self {
        Self {
            origin,
            actions: IndexSet::new(),
            applier,
        }
    }

    /// Replace the applier
    pub fn set_applier(&mut self, applier: Arc<dyn PlanApplier>) {
        self.applier = applier;
    }

    /// The configured applier
    #[must_use]
    pub fn applier(&self) -> &Arc<dyn PlanApplier> {
        &self.applier
    }

    /// The model the plan starts from
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &Model {
        &self.origin
    }

    /// Add an action. Returns `false` if an equal action is already present
    pub fn add(&mut self, action: Action) -> bool {
        self.actions.insert(action)
    }

    /// Whether an equal action is part of the plan
    #[must_use]
    pub fn contains(&self, action: &Action) -> bool {
        self.actions.contains(action)
    }

    /// Actions in insertion order
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &IndexSet<Action> {
        &self.actions
    }

    /// Actions by ascending start, ties kept in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        let mut sorted: Vec<&Action> = self.actions.iter().collect();
        sorted.sort_by_key(|a| a.start());
        sorted.into_iter()
    }

    /// Latest end among the actions, 0 when empty
    #[must_use]
    pub fn duration(&self) -> Instant {
        self.actions.iter().map(Action::end).max().unwrap_or(0)
    }

    /// Number of actions
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.actions.len()
    }

    /// Whether the plan has no action
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Compute the resulting model with the configured applier
    ///
    /// An empty plan yields a copy of the origin.
    ///
    /// # Errors
    /// Returns the applier failure.
    pub fn result(&self) -> Result<Model, ApplyError> {
        if self.is_empty() {
            return Ok(self.origin.clone());
        }
        self.applier.apply(self)
    }

    /// Whether the configured applier can process every action
    #[must_use]
    pub fn is_applyable(&self) -> bool {
        match self.result() {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "plan is not applyable");
                false
            }
        }
    }

    /// Human readable trace from the configured applier
    #[must_use]
    pub fn describe(&self) -> String {
        self.applier.describe(self)
    }

    /// Dependencies between the actions, positions follow [`Plan::actions`]
    ///
    /// # Errors
    /// Returns the extraction failure.
    pub fn dependencies(&self) -> Result<DependencyGraph, ExtractError> {
        dependency::extract(&self.origin, &self.actions)
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Action;
    type IntoIter = std::vec::IntoIter<&'a Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{BootNode, BootVm, ShutdownNode};
    use reconf_model::{NodeId, VmId};

    fn origin() -> Model {
        let mut mo = Model::new();
        mo.mapping_mut().add_online_node(NodeId(1));
        mo.mapping_mut().add_offline_node(NodeId(2)).unwrap();
        mo.mapping_mut().add_ready_vm(VmId(1));
        mo
    }

    #[test]
    fn empty_plan() {
        let p = Plan::new(origin());
        assert_eq!(p.duration(), 0);
        assert_eq!(p.size(), 0);
        assert_eq!(p.result().unwrap(), origin());
        assert!(p.is_applyable());
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut p = Plan::new(origin());
        let a = Action::new(BootNode::new(NodeId(2)), 0, 3).unwrap();
        assert!(p.add(a.clone()));
        assert!(!p.add(a));
        assert_eq!(p.size(), 1);
        assert_eq!(p.duration(), 3);
    }

    #[test]
    fn iteration_is_start_ordered_and_stable() {
        let mut p = Plan::new(origin());
        let late = Action::new(ShutdownNode::new(NodeId(1)), 5, 6).unwrap();
        let first = Action::new(BootNode::new(NodeId(2)), 0, 3).unwrap();
        let second = Action::new(BootVm::new(VmId(1), NodeId(1)), 0, 1).unwrap();
        p.add(late.clone());
        p.add(first.clone());
        p.add(second.clone());
        let order: Vec<&Action> = p.iter().collect();
        assert_eq!(order, vec![&first, &second, &late]);
        assert_eq!(p.duration(), 6);
    }

    #[test]
    fn unapplyable_plan_is_reported() {
        let mut p = Plan::new(origin());
        p.add(Action::new(BootVm::new(VmId(1), NodeId(2)), 0, 1).unwrap());
        assert!(!p.is_applyable());
        assert!(p.result().is_err());
    }
}
