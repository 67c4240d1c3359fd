use super::{precondition, PlanApplier};
use crate::action::Action;
use crate::dependency::DependencyGraph;
use crate::error::ApplyError;
use crate::plan::Plan;
use reconf_model::Model;
use std::collections::BTreeSet;
use std::fmt::Write;

/// Replay actions in an order compatible with their dependencies
///
/// An action is replayed once all its dependencies are; among the ready
/// actions the earliest start wins, then the earliest end, then insertion
/// order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyBasedApplier;

type Key = (u32, u32, usize);

fn key(graph: &DependencyGraph, idx: usize) -> Option<Key> {
    graph.action(idx).map(|a| (a.start(), a.end(), idx))
}

impl DependencyBasedApplier {
    /// Positions of the actions in replay order
    pub(crate) fn order(graph: &DependencyGraph) -> Result<Vec<usize>, ApplyError> {
        let mut pending: Vec<usize> = (0..graph.len())
            .map(|i| graph.dependencies_of(i).count())
            .collect();
        let mut ready: BTreeSet<Key> = pending
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .filter_map(|(i, _)| key(graph, i))
            .collect();

        let mut order = Vec::with_capacity(graph.len());
        while let Some((_, _, idx)) = ready.pop_first() {
            order.push(idx);
            for next in graph.dependents_of(idx) {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.extend(key(graph, next));
                }
            }
        }

        if order.len() < graph.len() {
            return Err(ApplyError::Deadlock {
                pending: graph.len() - order.len(),
            });
        }
        Ok(order)
    }
}

impl PlanApplier for DependencyBasedApplier {
    fn apply(&self, plan: &Plan) -> Result<Model, ApplyError> {
        let graph = plan.dependencies()?;
        let mut mo = plan.origin().clone();
        for idx in Self::order(&graph)? {
            let Some(action) = graph.action(idx) else {
                continue;
            };
            action
                .apply(&mut mo)
                .map_err(|e| precondition(action, e))?;
        }
        Ok(mo)
    }

    fn describe(&self, plan: &Plan) -> String {
        let graph = match plan.dependencies() {
            Ok(g) => g,
            Err(err) => return format!("unable to extract dependencies: {err}\n"),
        };
        let order = match Self::order(&graph) {
            Ok(o) => o,
            Err(err) => return format!("{err}\n"),
        };

        let mut out = String::new();
        for idx in order {
            let Some(a) = graph.action(idx) else {
                continue;
            };
            let deps: Vec<String> = graph
                .dependencies(a)
                .into_iter()
                .map(Action::to_string)
                .collect();
            let _ = writeln!(
                out,
                "{{{}}} -> {}:{} {a}",
                deps.join(", "),
                a.start(),
                a.end()
            );
        }
        out
    }

    fn name(&self) -> &'static str {
        "dependency-based"
    }
}
