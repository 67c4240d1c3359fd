use super::{precondition, PlanApplier};
use crate::action::Action;
use crate::comparator::TimedComparator;
use crate::error::ApplyError;
use crate::plan::Plan;
use reconf_model::Model;
use std::fmt::Write;

/// Replay actions by start, then end, then insertion order
///
/// Timestamp-trusting: the dependency graph is ignored, so a plan whose
/// timestamps do not encode the real precedence can fail here although it
/// is valid.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeBasedApplier;

impl TimeBasedApplier {
    fn ordered(plan: &Plan) -> Vec<&Action> {
        let cmp = TimedComparator::default();
        let mut actions: Vec<&Action> = plan.actions().iter().collect();
        actions.sort_by(|a, b| cmp.total(a, b));
        actions
    }
}

impl PlanApplier for TimeBasedApplier {
    fn apply(&self, plan: &Plan) -> Result<Model, ApplyError> {
        let mut mo = plan.origin().clone();
        for action in Self::ordered(plan) {
            action
                .apply(&mut mo)
                .map_err(|e| precondition(action, e))?;
        }
        Ok(mo)
    }

    fn describe(&self, plan: &Plan) -> String {
        let mut out = String::new();
        for a in Self::ordered(plan) {
            let _ = writeln!(out, "{}:{} {a}", a.start(), a.end());
        }
        out
    }

    fn name(&self) -> &'static str {
        "time-based"
    }
}
