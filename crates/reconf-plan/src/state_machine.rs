//! Lifecycle of an action inside a plan monitor

use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionState {
    /// At least one dependency is not done
    Blocked,
    /// Every dependency is done, not begun yet
    Feasible,
    /// Begun, not committed yet
    Running,
    /// Committed
    Done,
}

impl ActionState {
    /// Initial state given the number of dependencies
    #[inline]
    #[must_use]
    pub fn initial(dependencies: usize) -> Self {
        if dependencies == 0 {
            Self::Feasible
        } else {
            Self::Blocked
        }
    }

    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Blocked => "blocked",
            Self::Feasible => "feasible",
            Self::Running => "running",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// A transition outside of [`allowed_transitions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    /// Current state
    pub from: ActionState,
    /// Requested state
    pub to: ActionState,
}

/// Check a transition against the lifecycle table
///
/// # Errors
/// Returns `TransitionError` when `to` is not reachable from `from` in one step.
pub fn validate_transition(from: ActionState, to: ActionState) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// States reachable in one step
#[must_use]
pub fn allowed_transitions(from: ActionState) -> &'static [ActionState] {
    use ActionState::*;
    match from {
        Blocked => &[Feasible],
        Feasible => &[Running],
        Running => &[Done],
        Done => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ActionState::*;

    #[test]
    fn forward_path_is_legal() {
        assert!(validate_transition(Blocked, Feasible).is_ok());
        assert!(validate_transition(Feasible, Running).is_ok());
        assert!(validate_transition(Running, Done).is_ok());
    }

    #[test]
    fn shortcuts_and_rollbacks_are_illegal() {
        assert_eq!(
            validate_transition(Blocked, Running),
            Err(TransitionError { from: Blocked, to: Running })
        );
        assert!(validate_transition(Feasible, Done).is_err());
        assert!(validate_transition(Running, Feasible).is_err());
        assert!(validate_transition(Done, Done).is_err());
    }

    #[test]
    fn only_done_is_terminal() {
        assert!(Done.is_terminal());
        assert!(!Running.is_terminal());
        assert_eq!(ActionState::initial(0), Feasible);
        assert_eq!(ActionState::initial(2), Blocked);
    }
}
