//! Reverse dependency index and calculation ordering.
//!
//! Nodes are structures that carry a formula. For every dependency a formula
//! declares, the graph keeps a reverse entry `dependency key -> dependent
//! structure ids`, so "who must recompute when X changes" is a map lookup.
//!
//! Ordering is a DFS over `structure` edges only. Cycles are tolerated: a
//! back-edge is treated as already satisfied, so the returned order is always
//! a permutation of the candidates but is not a true dependency order when a
//! cycle exists. The recalculation loop bounds the damage.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

use super::deps::{Dependency, cell_key, structure_key, table_column_key};
use super::position::{Position, Rect};

/// A formula registered for one structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormulaNode {
    pub formula: String,
    pub dependencies: Vec<Dependency>,
}

/// A named structure that spatially contains a changed cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub name: String,
    /// Header of the column holding the cell, when the container is a table.
    pub table_column: Option<String>,
}

/// Order plus whether a back-edge was seen while producing it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CalculationOrder {
    pub order: Vec<String>,
    pub cycle_detected: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, FormulaNode>,
    dependents: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the formula of a structure.
    pub fn add_formula(&mut self, id: &str, formula: &str, dependencies: Vec<Dependency>) {
        self.remove_formula(id);
        for dep in &dependencies {
            self.dependents
                .entry(dep.key())
                .or_default()
                .insert(id.to_string());
        }
        self.nodes.insert(
            id.to_string(),
            FormulaNode {
                formula: formula.to_string(),
                dependencies,
            },
        );
    }

    /// Drop a structure's formula and every reverse entry it contributed.
    pub fn remove_formula(&mut self, id: &str) -> Option<FormulaNode> {
        let node = self.nodes.remove(id)?;
        for dep in &node.dependencies {
            let key = dep.key();
            if let Some(ids) = self.dependents.get_mut(&key) {
                ids.remove(id);
                if ids.is_empty() {
                    self.dependents.remove(&key);
                }
            }
        }
        Some(node)
    }

    /// Move a node to a new id, keeping its formula and dependencies, and
    /// rewrite `structure` references to the old id.
    pub fn rename(&mut self, old_id: &str, new_id: &str) {
        if let Some(node) = self.remove_formula(old_id) {
            self.add_formula(new_id, &node.formula, node.dependencies);
        }
        let old_key = structure_key(old_id);
        let Some(referrers) = self.dependents.get(&old_key).cloned() else {
            return;
        };
        for referrer in referrers {
            if let Some(node) = self.nodes.get(&referrer).cloned() {
                let deps = node
                    .dependencies
                    .into_iter()
                    .map(|dep| match dep {
                        Dependency::Structure { id } if id == old_id => Dependency::structure(new_id),
                        other => other,
                    })
                    .collect();
                self.add_formula(&referrer, &node.formula, deps);
            }
        }
    }

    pub fn node(&self, id: &str) -> Option<&FormulaNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Ids of every structure with a registered formula, sorted.
    pub fn formula_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn lookup(&self, key: &str) -> HashSet<String> {
        self.dependents.get(key).cloned().unwrap_or_default()
    }

    pub fn dependents_of_cell(&self, pos: Position) -> HashSet<String> {
        self.lookup(&cell_key(pos.row, pos.col))
    }

    pub fn dependents_of_structure(&self, id: &str) -> HashSet<String> {
        self.lookup(&structure_key(id))
    }

    pub fn dependents_of_table_column(&self, table: &str, column: &str) -> HashSet<String> {
        self.lookup(&table_column_key(table, column))
    }

    /// Dependents of any column of the named table.
    pub fn dependents_of_table(&self, table: &str) -> HashSet<String> {
        let prefix = format!("tableColumn:{}:", table);
        self.dependents
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Dependents of the exact range key plus every range dependency whose
    /// rectangle overlaps `[start, end]`. Linear in the number of range keys.
    pub fn dependents_of_range(&self, start: Position, end: Position) -> HashSet<String> {
        let query = Rect::spanning(start, end);
        let mut out = self.lookup(&Dependency::range(query.start, query.end).key());
        for (key, ids) in &self.dependents {
            if !key.starts_with("range:") {
                continue;
            }
            let Some(rect) = Dependency::from_key(key).and_then(|d| d.rect()) else {
                continue;
            };
            if rect.intersects(&query) {
                out.extend(ids.iter().cloned());
            }
        }
        out
    }

    /// Direct dependents of a changed cell: exact cell references plus any
    /// range reference covering it.
    fn dependents_touching(&self, pos: Position) -> HashSet<String> {
        let mut out = self.dependents_of_cell(pos);
        out.extend(self.dependents_of_range(pos, pos));
        out
    }

    /// Structures to recompute after `changed` cells were edited.
    pub fn calculation_order(&self, changed: &[Position]) -> Vec<String> {
        let candidates: BTreeSet<String> = changed
            .iter()
            .flat_map(|pos| self.dependents_touching(*pos))
            .collect();
        self.topological_sort(&candidates)
    }

    /// Like [`calculation_order`](Self::calculation_order), additionally
    /// pulling in dependents of every named structure containing a changed
    /// cell (and of the table column it sits in).
    pub fn enhanced_calculation_order<F>(&self, changed: &[Position], containers: F) -> Vec<String>
    where
        F: Fn(Position) -> Vec<Container>,
    {
        self.enhanced_calculation_order_report(changed, containers).order
    }

    pub fn enhanced_calculation_order_report<F>(
        &self,
        changed: &[Position],
        containers: F,
    ) -> CalculationOrder
    where
        F: Fn(Position) -> Vec<Container>,
    {
        let mut candidates: BTreeSet<String> = BTreeSet::new();
        for pos in changed {
            candidates.extend(self.dependents_touching(*pos));
            for container in containers(*pos) {
                candidates.extend(self.dependents_of_structure(&container.id));
                if let Some(column) = &container.table_column {
                    candidates.extend(self.dependents_of_table_column(&container.name, column));
                }
            }
        }
        self.topological_sort_report(&candidates)
    }

    /// Order `candidates` so that, absent cycles, every structure comes after
    /// the structures it references by name.
    pub fn topological_sort(&self, candidates: &BTreeSet<String>) -> Vec<String> {
        self.topological_sort_report(candidates).order
    }

    /// Iterative post-order DFS over `structure` edges restricted to
    /// `candidates`. A back-edge is skipped and flagged, never an error.
    pub fn topological_sort_report(&self, candidates: &BTreeSet<String>) -> CalculationOrder {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut on_stack: HashSet<&str> = HashSet::new();
        let mut result = CalculationOrder::default();

        for root in candidates {
            if visited.contains(root.as_str()) {
                continue;
            }
            // Frame: (node, index of next dependency to look at).
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            on_stack.insert(root.as_str());

            while let Some((current, next)) = stack.pop() {
                let deps = self.structure_edges(current, candidates);
                if next < deps.len() {
                    stack.push((current, next + 1));
                    let dep = deps[next];
                    if on_stack.contains(dep) {
                        result.cycle_detected = true;
                        continue;
                    }
                    if visited.contains(dep) {
                        continue;
                    }
                    on_stack.insert(dep);
                    stack.push((dep, 0));
                } else {
                    on_stack.remove(current);
                    if visited.insert(current) {
                        result.order.push(current.to_string());
                    }
                }
            }
        }

        result
    }

    fn structure_edges<'a>(&'a self, id: &str, candidates: &BTreeSet<String>) -> Vec<&'a str> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        node.dependencies
            .iter()
            .filter_map(|dep| match dep {
                Dependency::Structure { id } if candidates.contains(id) => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.dependents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_add_and_replace_formula() {
        let mut graph = DependencyGraph::new();
        graph.add_formula("b1", "=A1+1", vec![Dependency::cell(0, 0)]);
        assert_eq!(graph.dependents_of_cell(Position::new(0, 0)), HashSet::from(["b1".to_string()]));

        graph.add_formula("b1", "=C1", vec![Dependency::cell(0, 2)]);
        assert!(graph.dependents_of_cell(Position::new(0, 0)).is_empty());
        assert_eq!(graph.dependents_of_cell(Position::new(0, 2)).len(), 1);
        assert_eq!(graph.node("b1").map(|n| n.formula.as_str()), Some("=C1"));
    }

    #[test]
    fn test_remove_formula_cleans_reverse_map() {
        let mut graph = DependencyGraph::new();
        graph.add_formula("x", "=SUM(A1:A3)", vec![Dependency::range(Position::new(0, 0), Position::new(2, 0))]);
        assert!(graph.remove_formula("x").is_some());
        assert!(graph.dependents.is_empty());
        assert!(graph.remove_formula("x").is_none());
    }

    #[test]
    fn test_range_overlap_scan() {
        let mut graph = DependencyGraph::new();
        graph.add_formula("total", "=SUM(A1:A3)", vec![Dependency::range(Position::new(0, 0), Position::new(2, 0))]);
        assert!(graph.dependents_of_range(Position::new(1, 0), Position::new(1, 0)).contains("total"));
        assert!(graph.dependents_of_range(Position::new(3, 0), Position::new(5, 5)).is_empty());
        assert_eq!(graph.calculation_order(&[Position::new(2, 0)]), vec!["total".to_string()]);
    }

    #[test]
    fn test_topological_sort_follows_structure_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_formula("c", "=b", vec![Dependency::structure("b")]);
        graph.add_formula("b", "=a", vec![Dependency::structure("a")]);
        graph.add_formula("a", "=A1", vec![Dependency::cell(0, 0)]);
        let order = graph.topological_sort(&set(&["c", "b", "a"]));
        assert_eq!(order, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_topological_sort_tolerates_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_formula("a", "=b", vec![Dependency::structure("b")]);
        graph.add_formula("b", "=a", vec![Dependency::structure("a")]);
        let report = graph.topological_sort_report(&set(&["a", "b"]));
        assert!(report.cycle_detected);
        let mut sorted = report.order.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_enhanced_order_includes_container_dependents() {
        let mut graph = DependencyGraph::new();
        graph.add_formula("total", "=SUM(prices)", vec![Dependency::structure("arr")]);
        graph.add_formula("qty_sum", "=SUM(t[Qty])", vec![Dependency::table_column("t", "Qty")]);

        assert!(graph.calculation_order(&[Position::new(3, 0)]).is_empty());

        let order = graph.enhanced_calculation_order(&[Position::new(3, 0)], |_| {
            vec![
                Container {
                    id: "arr".into(),
                    name: "prices".into(),
                    table_column: None,
                },
                Container {
                    id: "tbl".into(),
                    name: "t".into(),
                    table_column: Some("Qty".into()),
                },
            ]
        });
        assert_eq!(order, vec!["qty_sum".to_string(), "total".to_string()]);
    }

    #[test]
    fn test_rename_rekeys_node_and_referrers() {
        let mut graph = DependencyGraph::new();
        graph.add_formula("old", "=A1", vec![Dependency::cell(0, 0)]);
        graph.add_formula("user", "=old", vec![Dependency::structure("old")]);
        graph.rename("old", "new");
        assert!(graph.node("old").is_none());
        assert!(graph.node("new").is_some());
        assert!(graph.dependents_of_structure("new").contains("user"));
        assert!(graph.dependents_of_structure("old").is_empty());
    }
}
