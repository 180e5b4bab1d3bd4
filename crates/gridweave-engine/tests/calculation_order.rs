//! Property tests for dependency ordering.

use gridweave_engine::engine::{Dependency, DependencyGraph, Position};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn id(n: usize) -> String {
    format!("s{}", n)
}

proptest! {
    /// Whatever the edge set (cycles included), ordering terminates and
    /// returns each candidate exactly once.
    #[test]
    fn topological_sort_is_a_permutation(
        edges in proptest::collection::vec((0usize..12, 0usize..12), 0..40),
        picked in proptest::collection::btree_set(0usize..12, 0..12),
    ) {
        let mut graph = DependencyGraph::new();
        for node in 0..12 {
            let deps: Vec<Dependency> = edges
                .iter()
                .filter(|(from, _)| *from == node)
                .map(|(_, to)| Dependency::structure(id(*to)))
                .collect();
            graph.add_formula(&id(node), "=x", deps);
        }

        let candidates: BTreeSet<String> = picked.iter().map(|n| id(*n)).collect();
        let order = graph.topological_sort(&candidates);

        let as_set: BTreeSet<String> = order.iter().cloned().collect();
        prop_assert_eq!(order.len(), candidates.len());
        prop_assert_eq!(as_set, candidates);
    }

    /// Without cycles, every candidate appears after the candidates it names.
    #[test]
    fn acyclic_order_respects_edges(
        edges in proptest::collection::vec((0usize..10, 0usize..10), 0..30),
    ) {
        let mut graph = DependencyGraph::new();
        // Keep only edges pointing to a lower id: guaranteed acyclic.
        for node in 0..10 {
            let deps: Vec<Dependency> = edges
                .iter()
                .filter(|(from, to)| *from == node && to < from)
                .map(|(_, to)| Dependency::structure(id(*to)))
                .collect();
            graph.add_formula(&id(node), "=x", deps);
        }
        let candidates: BTreeSet<String> = (0..10).map(id).collect();
        let report = graph.topological_sort_report(&candidates);
        prop_assert!(!report.cycle_detected);

        let position = |s: &str| report.order.iter().position(|o| o == s);
        for (from, to) in edges.iter().filter(|(f, t)| t < f) {
            prop_assert!(position(&id(*to)) < position(&id(*from)));
        }
    }
}

#[test]
fn mutual_cycle_order_terminates() {
    let mut graph = DependencyGraph::new();
    graph.add_formula("a", "=b", vec![Dependency::structure("b"), Dependency::cell(0, 0)]);
    graph.add_formula("b", "=a", vec![Dependency::structure("a"), Dependency::cell(0, 0)]);

    let mut order = graph.calculation_order(&[Position::new(0, 0)]);
    order.sort();
    assert_eq!(order, vec!["a".to_string(), "b".to_string()]);
}
