//! Live, thread-safe progress of a plan
//!
//! The monitor gates every action behind its dependencies. `begin` and
//! `commit` are the only transitions:
//!
//! ```text
//! Blocked --(last dependency committed)--> Feasible --begin--> Running --commit--> Done
//! ```
//!
//! The state table is guarded by a single mutex, the actual effect of an
//! action runs outside of it between `begin` and `commit`. Every commit
//! applies the action to the monitor's model and wakes up the callers
//! waiting in [`PlanMonitor::wait_for_feasible`].

use crate::action::Action;
use crate::dependency::DependencyGraph;
use crate::error::{CommitError, ExtractError};
use crate::plan::Plan;
use crate::state_machine::{validate_transition, ActionState};
use parking_lot::{Condvar, Mutex};
use reconf_model::Model;
use std::time::Duration;

#[derive(Debug)]
struct MonitorState {
    states: Vec<ActionState>,
    /// Number of dependencies not done yet, per action
    pending: Vec<usize>,
    model: Model,
    committed: usize,
}

/// Tracks which actions of a plan are blocked, feasible, running or done
#[derive(Debug)]
pub struct PlanMonitor {
    plan: Plan,
    graph: DependencyGraph,
    state: Mutex<MonitorState>,
    released: Condvar,
}

impl PlanMonitor {
    /// Start monitoring a plan from its origin
    ///
    /// # Errors
    /// Returns the extraction failure when the dependencies are undefined.
    pub fn new(plan: Plan) -> Result<Self, ExtractError> {
        let graph = plan.dependencies()?;
        let pending: Vec<usize> = (0..graph.len())
            .map(|i| graph.dependencies_of(i).count())
            .collect();
        let states = pending.iter().map(|n| ActionState::initial(*n)).collect();
        let model = plan.origin().clone();
        tracing::debug!(
            actions = graph.len(),
            dependencies = graph.edge_count(),
            "monitor created"
        );
        Ok(Self {
            plan,
            graph,
            state: Mutex::new(MonitorState {
                states,
                pending,
                model,
                committed: 0,
            }),
            released: Condvar::new(),
        })
    }

    /// The monitored plan
    #[inline]
    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// The dependencies gating the actions
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Start an action
    ///
    /// Returns `false`, without any change, unless the action is feasible.
    pub fn begin(&self, action: &Action) -> bool {
        let Some(idx) = self.graph.index_of(action) else {
            return false;
        };
        let mut st = self.state.lock();
        if validate_transition(st.states[idx], ActionState::Running).is_err() {
            return false;
        }
        st.states[idx] = ActionState::Running;
        tracing::debug!(%action, "begin");
        true
    }

    /// Assert that a begun action finished
    ///
    /// The action is applied to the current model, marked done, and the
    /// actions for which it was the last unmet dependency become feasible.
    ///
    /// Returns the released actions.
    ///
    /// # Errors
    /// - `CommitError::UnknownAction` if the action is not part of the plan
    /// - `CommitError::NotStarted` if it was never begun
    /// - `CommitError::AlreadyCommitted` on a second commit
    /// - `CommitError::Infeasible` if it cannot be applied to the current
    ///   model; the action stays running and the model is unchanged
    pub fn commit(&self, action: &Action) -> Result<Vec<&Action>, CommitError> {
        let Some(idx) = self.graph.index_of(action) else {
            tracing::warn!(%action, "commit of an unknown action");
            return Err(CommitError::UnknownAction(Box::new(action.clone())));
        };

        let mut st = self.state.lock();
        match st.states[idx] {
            ActionState::Running => {}
            ActionState::Done => {
                tracing::warn!(%action, "action already committed");
                return Err(CommitError::AlreadyCommitted(Box::new(action.clone())));
            }
            ActionState::Blocked | ActionState::Feasible => {
                tracing::warn!(%action, "commit of an action not started");
                return Err(CommitError::NotStarted(Box::new(action.clone())));
            }
        }

        let mut next = st.model.clone();
        if let Err(precondition) = action.apply(&mut next) {
            tracing::warn!(%action, error = %precondition, "unable to apply committed action");
            return Err(CommitError::Infeasible {
                action: Box::new(action.clone()),
                precondition,
                model: Box::new(st.model.clone()),
            });
        }
        st.model = next;
        st.states[idx] = ActionState::Done;
        st.committed += 1;

        let mut released: Vec<usize> = Vec::new();
        for dep in self.graph.dependents_of(idx) {
            st.pending[dep] -= 1;
            if st.pending[dep] == 0 && st.states[dep] == ActionState::Blocked {
                st.states[dep] = ActionState::Feasible;
                released.push(dep);
            }
        }
        released.sort_unstable();
        tracing::debug!(%action, released = released.len(), "commit");
        drop(st);

        self.released.notify_all();
        Ok(released
            .into_iter()
            .filter_map(|i| self.graph.action(i))
            .collect())
    }

    /// Current state of an action, `None` if it is not part of the plan
    #[must_use]
    pub fn state(&self, action: &Action) -> Option<ActionState> {
        let idx = self.graph.index_of(action)?;
        Some(self.state.lock().states[idx])
    }

    /// Whether the action still waits for a dependency
    #[must_use]
    pub fn is_blocked(&self, action: &Action) -> bool {
        self.state(action) == Some(ActionState::Blocked)
    }

    /// Actions that may begin, by start, end, then insertion order
    #[must_use]
    pub fn feasible_actions(&self) -> Vec<&Action> {
        let st = self.state.lock();
        self.feasible_locked(&st)
    }

    /// Actions waiting for a dependency; running ones are not included
    #[must_use]
    pub fn waiting_actions(&self) -> Vec<&Action> {
        self.in_state(ActionState::Blocked)
    }

    /// Actions begun but not committed
    #[must_use]
    pub fn running_actions(&self) -> Vec<&Action> {
        self.in_state(ActionState::Running)
    }

    /// Whether every action was committed
    #[must_use]
    pub fn is_over(&self) -> bool {
        self.state.lock().committed == self.graph.len()
    }

    /// Number of committed actions
    #[must_use]
    pub fn committed_count(&self) -> usize {
        self.state.lock().committed
    }

    /// Copy of the model as of the last commit
    #[must_use]
    pub fn current_model(&self) -> Model {
        self.state.lock().model.clone()
    }

    /// Block until some action is feasible, the plan is over, or the timeout
    /// elapses. Returns the feasible actions, possibly none.
    #[must_use]
    pub fn wait_for_feasible(&self, timeout: Duration) -> Vec<&Action> {
        let deadline = std::time::Instant::now() + timeout;
        let mut st = self.state.lock();
        loop {
            let feasible = self.feasible_locked(&st);
            if !feasible.is_empty() || st.committed == self.graph.len() {
                return feasible;
            }
            if self.released.wait_until(&mut st, deadline).timed_out() {
                return self.feasible_locked(&st);
            }
        }
    }

    fn feasible_locked(&self, st: &MonitorState) -> Vec<&Action> {
        let mut out: Vec<(u32, u32, usize)> = st
            .states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == ActionState::Feasible)
            .filter_map(|(i, _)| self.graph.action(i).map(|a| (a.start(), a.end(), i)))
            .collect();
        out.sort_unstable();
        out.into_iter()
            .filter_map(|(_, _, i)| self.graph.action(i))
            .collect()
    }

    fn in_state(&self, wanted: ActionState) -> Vec<&Action> {
        let st = self.state.lock();
        st.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == wanted)
            .filter_map(|(i, _)| self.graph.action(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{BootNode, BootVm, ShutdownNode};
    use reconf_model::{NodeId, VmId};

    fn plan() -> (Plan, Action, Action) {
        let mut mo = Model::new();
        mo.mapping_mut().add_offline_node(NodeId(1)).unwrap();
        mo.mapping_mut().add_ready_vm(VmId(1));
        let boot = Action::new(BootNode::new(NodeId(1)), 0, 2).unwrap();
        let start = Action::new(BootVm::new(VmId(1), NodeId(1)), 2, 4).unwrap();
        let mut p = Plan::new(mo);
        p.add(start.clone());
        p.add(boot.clone());
        (p, boot, start)
    }

    #[test]
    fn initial_states_follow_dependencies() {
        let (p, boot, start) = plan();
        let m = PlanMonitor::new(p).unwrap();
        assert_eq!(m.state(&boot), Some(ActionState::Feasible));
        assert_eq!(m.state(&start), Some(ActionState::Blocked));
        assert_eq!(m.feasible_actions(), vec![&boot]);
        assert_eq!(m.waiting_actions(), vec![&start]);
        assert!(!m.is_over());
    }

    #[test]
    fn begin_is_gated() {
        let (p, boot, start) = plan();
        let m = PlanMonitor::new(p).unwrap();
        assert!(!m.begin(&start));
        assert!(m.begin(&boot));
        assert!(!m.begin(&boot));
        assert_eq!(m.running_actions(), vec![&boot]);
        assert!(m.waiting_actions().iter().all(|a| *a != &boot));

        let stranger = Action::new(ShutdownNode::new(NodeId(9)), 0, 1).unwrap();
        assert!(!m.begin(&stranger));
        assert_eq!(m.state(&stranger), None);
    }

    #[test]
    fn commit_releases_and_updates_the_model() {
        let (p, boot, start) = plan();
        let m = PlanMonitor::new(p).unwrap();
        assert!(m.begin(&boot));
        assert_eq!(m.commit(&boot).unwrap(), vec![&start]);
        assert!(m.current_model().mapping().is_online(NodeId(1)));
        assert!(m.begin(&start));
        assert!(m.commit(&start).unwrap().is_empty());
        assert!(m.is_over());
        assert_eq!(m.committed_count(), 2);
        assert_eq!(
            m.current_model().mapping().vm_location(VmId(1)),
            Some(NodeId(1))
        );
    }

    #[test]
    fn illegal_commits_are_errors() {
        let (p, boot, _) = plan();
        let m = PlanMonitor::new(p).unwrap();
        assert!(matches!(m.commit(&boot), Err(CommitError::NotStarted(_))));
        assert_eq!(m.state(&boot), Some(ActionState::Feasible));

        assert!(m.begin(&boot));
        m.commit(&boot).unwrap();
        assert!(matches!(m.commit(&boot), Err(CommitError::AlreadyCommitted(_))));

        let stranger = Action::new(ShutdownNode::new(NodeId(9)), 0, 1).unwrap();
        assert!(matches!(m.commit(&stranger), Err(CommitError::UnknownAction(_))));
    }

    #[test]
    fn infeasible_commit_keeps_running() {
        let mut mo = Model::new();
        mo.mapping_mut().add_online_node(NodeId(1));
        let mut p = Plan::new(mo.clone());
        let boot = Action::new(BootNode::new(NodeId(1)), 0, 1).unwrap();
        p.add(boot.clone());

        let m = PlanMonitor::new(p).unwrap();
        assert!(m.begin(&boot));
        match m.commit(&boot) {
            Err(CommitError::Infeasible { model, .. }) => assert_eq!(*model, mo),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(m.state(&boot), Some(ActionState::Running));
        assert_eq!(m.current_model(), mo);
    }

    #[test]
    fn wait_returns_on_timeout() {
        let (p, boot, _) = plan();
        let m = PlanMonitor::new(p).unwrap();
        assert!(m.begin(&boot));
        assert!(m.wait_for_feasible(Duration::from_millis(10)).is_empty());
    }
}
