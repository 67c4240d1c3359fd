//! Replay a plan under external constraint checkers
//!
//! Moments are swept in increasing order. At each moment the actions ending
//! there are closed first (`end`, then their POST events), then the actions
//! starting there are opened (their PRE events, then `start`). A zero-length
//! action is closed right after it is opened. Since an action only depends on
//! actions ending no later than its start, every dependency is closed before
//! its dependents open.
//!
//! The models handed to the checkers come from a replay in the order of the
//! [`DependencyBasedApplier`]: closing an action replays every action up to
//! it in that order, so the checker accepts exactly the plans the applier
//! accepts.

use crate::action::{Action, Event, Hook};
use crate::applier::{precondition, DependencyBasedApplier};
use crate::dependency::DependencyGraph;
use crate::error::{ApplyError, Violation};
use crate::plan::Plan;
use reconf_model::Model;
use std::fmt;
use std::sync::Arc;

/// Observer validating a constraint along a plan
///
/// Every callback accepts by default. Checkers keeping state across
/// callbacks use interior mutability.
pub trait ConstraintChecker: Send + Sync {
    /// Name of the checked constraint
    fn name(&self) -> &str;

    /// Whether the origin model satisfies the constraint
    fn starts_with(&self, _mo: &Model) -> bool {
        true
    }

    /// An action starts
    fn start(&self, _action: &Action) -> bool {
        true
    }

    /// An action ends
    fn end(&self, _action: &Action) -> bool {
        true
    }

    /// An event hooked to an action occurs
    fn consume(&self, _event: &Event) -> bool {
        true
    }

    /// Whether the resulting model satisfies the constraint
    fn ends_with(&self, _mo: &Model) -> bool {
        true
    }
}

/// Checks plans against a set of constraint checkers
#[derive(Clone, Default)]
pub struct PlanChecker {
    checkers: Vec<Arc<dyn ConstraintChecker>>,
}

impl fmt::Debug for PlanChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.checkers.iter().map(|c| c.name()))
            .finish()
    }
}

fn same(a: &Arc<dyn ConstraintChecker>, b: &Arc<dyn ConstraintChecker>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

impl PlanChecker {
    /// Create a checker without any constraint
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a checker. Returns `false` if this instance is already registered
    pub fn add_checker(&mut self, checker: Arc<dyn ConstraintChecker>) -> bool {
        if self.checkers.iter().any(|c| same(c, &checker)) {
            return false;
        }
        self.checkers.push(checker);
        true
    }

    /// Unregister a checker. Returns `false` if it was not registered
    pub fn remove_checker(&mut self, checker: &Arc<dyn ConstraintChecker>) -> bool {
        let before = self.checkers.len();
        self.checkers.retain(|c| !same(c, checker));
        self.checkers.len() != before
    }

    /// Number of registered checkers
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    /// Whether no checker is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Replay the plan, stopping at the first violation
    ///
    /// Does nothing when no checker is registered.
    ///
    /// # Errors
    /// - `Violation::Discrete` when the origin or the result is rejected
    /// - `Violation::Continuous` when an action boundary or an event is rejected
    /// - `Violation::Inconsistent` when the plan cannot be replayed in
    ///   dependency order
    pub fn check(&self, plan: &Plan) -> Result<(), Violation> {
        if self.checkers.is_empty() {
            return Ok(());
        }
        let mut replay = Replay::new(plan).map_err(inconsistent)?;
        self.check_model(&replay.model, true)?;

        let mut starts: Vec<&Action> = plan.actions().iter().collect();
        starts.sort_by_key(|a| (a.start(), a.end(), replay.rank(a)));
        let mut ends: Vec<&Action> = plan
            .actions()
            .iter()
            .filter(|a| a.start() < a.end())
            .collect();
        ends.sort_by_key(|a| (a.end(), a.start(), replay.rank(a)));

        let (mut si, mut ei) = (0, 0);
        while si < starts.len() || ei < ends.len() {
            let moment = match (starts.get(si), ends.get(ei)) {
                (Some(s), Some(e)) => s.start().min(e.end()),
                (Some(s), None) => s.start(),
                (None, Some(e)) => e.end(),
                (None, None) => break,
            };

            while let Some(a) = ends.get(ei).filter(|a| a.end() == moment) {
                ei += 1;
                self.close(a, &mut replay)?;
            }
            while let Some(a) = starts.get(si).filter(|a| a.start() == moment) {
                si += 1;
                self.open(a, &replay.model)?;
                if a.end() == moment {
                    self.close(a, &mut replay)?;
                }
            }
        }

        replay.finish().map_err(inconsistent)?;
        self.check_model(&replay.model, false)
    }

    fn open(&self, action: &Action, mo: &Model) -> Result<(), Violation> {
        self.consume_events(action, Hook::Pre, mo)?;
        for c in &self.checkers {
            if !c.start(action) {
                return Err(continuous(c.as_ref(), action, mo));
            }
        }
        Ok(())
    }

    fn close(&self, action: &Action, replay: &mut Replay) -> Result<(), Violation> {
        replay.reach(action).map_err(inconsistent)?;
        for c in &self.checkers {
            if !c.end(action) {
                return Err(continuous(c.as_ref(), action, &replay.model));
            }
        }
        self.consume_events(action, Hook::Post, &replay.model)
    }

    fn consume_events(&self, action: &Action, hook: Hook, mo: &Model) -> Result<(), Violation> {
        for event in action.events(hook) {
            for c in &self.checkers {
                if !c.consume(event) {
                    return Err(continuous(c.as_ref(), action, mo));
                }
            }
        }
        Ok(())
    }

    fn check_model(&self, mo: &Model, at_origin: bool) -> Result<(), Violation> {
        for c in &self.checkers {
            let ok = if at_origin {
                c.starts_with(mo)
            } else {
                c.ends_with(mo)
            };
            if !ok {
                tracing::warn!(constraint = c.name(), at_origin, "discrete violation");
                return Err(Violation::Discrete {
                    constraint: c.name().to_string(),
                    model: Box::new(mo.clone()),
                    at_origin,
                });
            }
        }
        Ok(())
    }
}

/// Replay of a plan in dependency order, advanced as actions end
struct Replay {
    graph: DependencyGraph,
    order: Vec<usize>,
    /// Position of each action in `order`
    rank: Vec<usize>,
    next: usize,
    model: Model,
}

impl Replay {
    fn new(plan: &Plan) -> Result<Self, ApplyError> {
        let graph = plan.dependencies()?;
        let order = DependencyBasedApplier::order(&graph)?;
        let mut rank = vec![0; order.len()];
        for (pos, idx) in order.iter().enumerate() {
            rank[*idx] = pos;
        }
        Ok(Self {
            graph,
            order,
            rank,
            next: 0,
            model: plan.origin().clone(),
        })
    }

    fn rank(&self, action: &Action) -> usize {
        self.graph
            .index_of(action)
            .map_or(usize::MAX, |idx| self.rank[idx])
    }

    /// Replay every action up to and including `action`
    fn reach(&mut self, action: &Action) -> Result<(), ApplyError> {
        let target = self.rank(action);
        while self.next <= target && self.next < self.order.len() {
            self.step()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ApplyError> {
        while self.next < self.order.len() {
            self.step()?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), ApplyError> {
        let idx = self.order[self.next];
        self.next += 1;
        if let Some(action) = self.graph.action(idx) {
            action
                .apply(&mut self.model)
                .map_err(|e| precondition(action, e))?;
        }
        Ok(())
    }
}

fn inconsistent(source: ApplyError) -> Violation {
    tracing::warn!(error = %source, "inconsistent plan");
    Violation::Inconsistent { source }
}

fn continuous(c: &dyn ConstraintChecker, action: &Action, mo: &Model) -> Violation {
    tracing::warn!(constraint = c.name(), %action, "continuous violation");
    Violation::Continuous {
        constraint: c.name().to_string(),
        action: Box::new(action.clone()),
        model: Box::new(mo.clone()),
    }
}
