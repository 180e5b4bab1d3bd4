//! Circular dependency diagnostics for formula structures.
//!
//! Cycles are never rejected: recalculation tolerates them and stops at its
//! iteration cap. This module only answers "is this structure part of a
//! loop, and through which structures", for callers that want to surface it.

use std::collections::HashSet;

use super::{Dependency, DependencyGraph};

/// Detect a cycle reachable from `start`.
///
/// `resolve` maps a dependency (cell, range, named structure, table column)
/// to the ids of the formula structures that produce its content.
/// Returns Some(cycle_path) ending with the repeated id, None otherwise.
pub fn detect_cycle<F>(start: &str, graph: &DependencyGraph, resolve: F) -> Option<Vec<String>>
where
    F: Fn(&Dependency) -> Vec<String>,
{
    let mut visiting: HashSet<String> = HashSet::new();
    let mut done: HashSet<String> = HashSet::new();
    let mut path: Vec<String> = Vec::new();
    // Frame: (id, precedents still to visit).
    let mut stack: Vec<(String, Vec<String>)> = Vec::new();

    visiting.insert(start.to_string());
    path.push(start.to_string());
    stack.push((start.to_string(), precedents(start, graph, &resolve)));

    while let Some((_, pending)) = stack.last_mut() {
        let Some(next) = pending.pop() else {
            if let Some((id, _)) = stack.pop() {
                visiting.remove(&id);
                done.insert(id);
                path.pop();
            }
            continue;
        };
        if visiting.contains(&next) {
            path.push(next);
            return Some(path);
        }
        if done.contains(&next) {
            continue;
        }
        let deps = precedents(&next, graph, &resolve);
        visiting.insert(next.clone());
        path.push(next.clone());
        stack.push((next, deps));
    }

    None
}

fn precedents<F>(id: &str, graph: &DependencyGraph, resolve: &F) -> Vec<String>
where
    F: Fn(&Dependency) -> Vec<String>,
{
    let Some(node) = graph.node(id) else {
        return Vec::new();
    };
    let mut out: Vec<String> = node
        .dependencies
        .iter()
        .flat_map(resolve)
        .filter(|dep_id| graph.contains(dep_id))
        .collect();
    out.sort();
    out.dedup();
    // Popped from the back, so reverse to visit in sorted order.
    out.reverse();
    out
}
