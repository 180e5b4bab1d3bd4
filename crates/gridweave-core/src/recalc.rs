//! Recalculation: evaluate formulas and write their results back.
//!
//! A pass computes the calculation order for the dirty coordinates and
//! recomputes each structure once. Structures whose visible values changed
//! make their own coordinates, and those of their dependents, dirty for the
//! next pass. Passes repeat until nothing changes or the iteration cap is
//! reached, which is how formula cycles terminate.

use std::collections::{BTreeSet, HashSet};

use log::warn;

use gridweave_engine::engine::{DependencyGraph, FormulaEngine, FormulaValue, Position};

use crate::error::{GridweaveError, Result};
use crate::store::Snapshot;
use crate::structure::{StructureId, StructureKind};

/// Summary of one recalculation run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecalcReport {
    pub iterations: usize,
    /// False when the iteration cap stopped a still-changing run.
    pub converged: bool,
    /// Structures whose visible values changed, sorted.
    pub changed: Vec<StructureId>,
}

#[derive(Clone, Debug, Default)]
pub struct RecalcOutcome {
    pub snapshot: Snapshot,
    pub report: RecalcReport,
}

/// Re-evaluate the formula of `id` against `snapshot`.
///
/// Returns the new snapshot and whether any visible value changed. An error
/// result is recorded on the structure and counts as unchanged.
pub fn recalculate_structure(
    id: &str,
    snapshot: &Snapshot,
    graph: &mut DependencyGraph,
) -> Result<(Snapshot, bool)> {
    if !snapshot.store.contains(id) {
        return Err(GridweaveError::MissingStructure(id.to_string()));
    }
    let mut next = snapshot.clone();
    let changed = recalculate_in_place(id, &mut next, graph);
    Ok((next, changed))
}

pub(crate) fn recalculate_in_place(id: &str, snapshot: &mut Snapshot, graph: &mut DependencyGraph) -> bool {
    let Some(formula) = snapshot.get(id).and_then(|s| s.formula.clone()) else {
        graph.remove_formula(id);
        return false;
    };

    let (value, dependencies) = {
        let mut engine = FormulaEngine::new(&*snapshot);
        let value = engine.evaluate_formula(&formula);
        (value, engine.take_dependencies())
    };
    graph.add_formula(id, &formula, dependencies);

    let Some(mut structure) = snapshot.get(id).cloned() else {
        return false;
    };

    if let FormulaValue::Error(message) = &value {
        warn!("Formula error in {id}: {message}");
        structure.formula_error = Some(message.clone());
        snapshot.replace(structure);
        return false;
    }
    structure.formula_error = None;

    if let StructureKind::Cell { value: text } = &mut structure.kind {
        let display = value.to_display();
        let changed = *text != display;
        *text = display;
        snapshot.replace(structure);
        return changed;
    }

    let slots = structure.item_ids();
    snapshot.replace(structure);
    let mut changed = false;
    for (i, slot) in slots.iter().enumerate() {
        let text = match &value {
            FormulaValue::Range(items) => match items.get(i) {
                Some(item) => item.to_display(),
                None => break,
            },
            other => other.to_display(),
        };
        changed |= write_cell(snapshot, slot.as_str(), text);
    }
    changed
}

fn write_cell(snapshot: &mut Snapshot, id: &str, text: String) -> bool {
    let Some(cell) = snapshot.store.get_mut(id) else {
        return false;
    };
    match &mut cell.kind {
        StructureKind::Cell { value } if *value != text => {
            *value = text;
            true
        }
        _ => false,
    }
}

/// Recalculate everything affected by edits at `changed`.
pub fn trigger_recalculation(
    changed: &[Position],
    snapshot: &Snapshot,
    graph: &mut DependencyGraph,
    max_iterations: usize,
) -> RecalcOutcome {
    let mut next = snapshot.clone();
    let mut dirty: Vec<Position> = changed.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let mut report = RecalcReport::default();
    let mut changed_ids: BTreeSet<StructureId> = BTreeSet::new();

    while report.iterations < max_iterations {
        report.iterations += 1;
        let order = graph.enhanced_calculation_order(&dirty, |pos| next.containers_at(pos));
        if order.is_empty() {
            report.converged = true;
            break;
        }

        let mut processed: HashSet<String> = HashSet::new();
        let mut next_dirty: BTreeSet<Position> = BTreeSet::new();
        for id in order {
            if !processed.insert(id.clone()) {
                continue;
            }
            if !recalculate_in_place(&id, &mut next, graph) {
                continue;
            }
            if let Some(s) = next.get(&id) {
                next_dirty.extend(s.rect().cells());
            }
            for dependent in graph.dependents_of_structure(&id) {
                if let Some(s) = next.get(&dependent) {
                    next_dirty.extend(s.rect().cells());
                }
            }
            changed_ids.insert(StructureId::from(id));
        }

        if next_dirty.is_empty() {
            report.converged = true;
            break;
        }
        dirty = next_dirty.into_iter().collect();
    }

    if !report.converged {
        warn!(
            "Recalculation stopped after {} iterations; values may still be changing (circular reference?)",
            report.iterations
        );
    }
    report.changed = changed_ids.into_iter().collect();
    RecalcOutcome { snapshot: next, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridBounds;
    use crate::placement::{insert_structure, set_cell_value};
    use crate::store::get_cell_value;
    use crate::structure::{StructureType, create_structure};
    use gridweave_engine::engine::Dimensions;
    use pretty_assertions::assert_eq;

    fn pos(a1: &str) -> Position {
        Position::from_a1(a1).unwrap()
    }

    fn with_formula(snap: &Snapshot, at: &str, formula: &str) -> (Snapshot, StructureId) {
        let (mut snap, id) = set_cell_value(snap, pos(at), "", GridBounds::default()).unwrap();
        let mut cell = snap.get(id.as_str()).unwrap().clone();
        cell.formula = Some(formula.to_string());
        snap.replace(cell);
        (snap, id)
    }

    #[test]
    fn test_recalculate_cell() {
        let (snap, _) = set_cell_value(&Snapshot::new(), pos("A1"), "4", GridBounds::default()).unwrap();
        let (snap, id) = with_formula(&snap, "B1", "=A1*2");
        let mut graph = DependencyGraph::new();
        let (next, changed) = recalculate_structure(id.as_str(), &snap, &mut graph).unwrap();
        assert!(changed);
        assert_eq!(get_cell_value(pos("B1"), &next), "8");
        assert!(graph.dependents_of_cell(pos("A1")).contains(id.as_str()));
        let (_, again) = recalculate_structure(id.as_str(), &next, &mut graph).unwrap();
        assert!(!again);
    }

    #[test]
    fn test_error_is_recorded_not_written() {
        let (snap, id) = with_formula(&Snapshot::new(), "A1", "=1/0");
        let mut graph = DependencyGraph::new();
        let (next, changed) = recalculate_structure(id.as_str(), &snap, &mut graph).unwrap();
        assert!(!changed);
        let cell = next.get(id.as_str()).unwrap();
        assert_eq!(cell.formula_error.as_deref(), Some("Division by zero"));
        assert_eq!(cell.cell_value(), Some(""));
    }

    #[test]
    fn test_array_range_is_distributed() {
        let bounds = GridBounds::default();
        let mut snap = Snapshot::new();
        for (at, v) in [("A1", "1"), ("A2", "2"), ("A3", "3")] {
            snap = set_cell_value(&snap, pos(at), v, bounds).unwrap().0;
        }
        let mut array = create_structure(StructureType::Array, None, pos("C1"), Dimensions::new(3, 1)).unwrap();
        array.formula = Some("=A1:A3".to_string());
        let array_id = array.id.clone();
        snap = insert_structure(&snap, array, bounds).unwrap();
        for at in ["C1", "C2", "C3"] {
            snap = set_cell_value(&snap, pos(at), "", bounds).unwrap().0;
        }

        let mut graph = DependencyGraph::new();
        let (next, changed) = recalculate_structure(array_id.as_str(), &snap, &mut graph).unwrap();
        assert!(changed);
        let values: Vec<String> = ["C1", "C2", "C3"].iter().map(|a| get_cell_value(pos(a), &next)).collect();
        assert_eq!(values, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_trigger_follows_chain() {
        let (snap, _) = set_cell_value(&Snapshot::new(), pos("A1"), "1", GridBounds::default()).unwrap();
        let (snap, b1) = with_formula(&snap, "B1", "=A1+1");
        let (snap, c1) = with_formula(&snap, "C1", "=B1+1");
        let mut graph = DependencyGraph::new();
        let (snap, _) = recalculate_structure(b1.as_str(), &snap, &mut graph).unwrap();
        let (snap, _) = recalculate_structure(c1.as_str(), &snap, &mut graph).unwrap();

        let (snap, _) = set_cell_value(&snap, pos("A1"), "10", GridBounds::default()).unwrap();
        let out = trigger_recalculation(&[pos("A1")], &snap, &mut graph, 50);
        assert_eq!(get_cell_value(pos("B1"), &out.snapshot), "11");
        assert_eq!(get_cell_value(pos("C1"), &out.snapshot), "12");
        assert!(out.report.converged);
        assert_eq!(out.report.changed.len(), 2);
    }

    #[test]
    fn test_error_during_cascade_keeps_prior_value() {
        let (snap, _) = set_cell_value(&Snapshot::new(), pos("A1"), "2", GridBounds::default()).unwrap();
        let (snap, b1) = with_formula(&snap, "B1", "=10/A1");
        let mut graph = DependencyGraph::new();
        let (snap, _) = recalculate_structure(b1.as_str(), &snap, &mut graph).unwrap();
        assert_eq!(get_cell_value(pos("B1"), &snap), "5");

        let (snap, _) = set_cell_value(&snap, pos("A1"), "0", GridBounds::default()).unwrap();
        let out = trigger_recalculation(&[pos("A1")], &snap, &mut graph, 50);
        assert_eq!(get_cell_value(pos("B1"), &out.snapshot), "5");
        assert_eq!(
            out.snapshot.get(b1.as_str()).and_then(|s| s.formula_error.clone()),
            Some("Division by zero".to_string())
        );
        assert!(out.report.changed.is_empty());
        assert!(out.report.converged);
    }

    #[test]
    fn test_incrementing_cycle_hits_the_cap() {
        let (snap, a1) = with_formula(&Snapshot::new(), "A1", "=B1+1");
        let (snap, b1) = with_formula(&snap, "B1", "=A1+1");
        let mut graph = DependencyGraph::new();
        let (snap, _) = recalculate_structure(a1.as_str(), &snap, &mut graph).unwrap();
        let (snap, _) = recalculate_structure(b1.as_str(), &snap, &mut graph).unwrap();

        let out = trigger_recalculation(&[pos("A1"), pos("B1")], &snap, &mut graph, 50);
        assert_eq!(out.report.iterations, 50);
        assert!(!out.report.converged);
    }
}
