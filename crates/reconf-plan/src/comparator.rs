//! Time-based ordering of actions

use crate::action::Action;
use std::cmp::Ordering;

/// Compare actions by their interval
///
/// With `start_based`, actions are compared by start then end; otherwise by
/// end then start. Simultaneous actions (same start and same end) compare
/// `Equal` when `simultaneous_equal` is set and are left undefined (`None`)
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedComparator {
    /// Primary key is the start instant
    pub start_based: bool,
    /// Simultaneous actions compare equal instead of undefined
    pub simultaneous_equal: bool,
}

impl Default for TimedComparator {
    fn default() -> Self {
        Self {
            start_based: true,
            simultaneous_equal: true,
        }
    }
}

impl TimedComparator {
    /// Create a comparator
    #[inline]
    #[must_use]
    pub fn new(start_based: bool, simultaneous_equal: bool) -> Self {
        Self {
            start_based,
            simultaneous_equal,
        }
    }

    /// Compare two actions
    #[must_use]
    pub fn compare(&self, a: &Action, b: &Action) -> Option<Ordering> {
        if a.is_simultaneous(b) {
            return self.simultaneous_equal.then_some(Ordering::Equal);
        }
        Some(if self.start_based {
            a.start().cmp(&b.start()).then(a.end().cmp(&b.end()))
        } else {
            a.end().cmp(&b.end()).then(a.start().cmp(&b.start()))
        })
    }

    /// Total order usable with `sort_by`; simultaneous actions are `Equal`
    #[must_use]
    pub fn total(&self, a: &Action, b: &Action) -> Ordering {
        self.compare(a, b).unwrap_or(Ordering::Equal)
    }
}
