use std::collections::BTreeSet;

use log::debug;

use gridweave_engine::engine::{
    Dependency, Dimensions, FormulaEngine, FormulaValue, Position, detect_cycle,
};

use super::Document;
use crate::error::{GridweaveError, Result};
use crate::mutation::{Direction, expand_structure_with_pushing, move_structure_recursively};
use crate::placement::{delete_structure, insert_structure, set_cell_value};
use crate::recalc::{RecalcReport, recalculate_in_place, trigger_recalculation};
use crate::store::{Snapshot, get_cell_value, get_structure_at_position, get_structures_at_position};
use crate::structure::{Structure, StructureId, StructureType, create_structure};
use crate::template::{instantiate_template, set_template_override};

fn cells_of(structure: &Structure) -> Vec<Position> {
    structure.rect().cells().collect()
}

impl Document {
    pub fn structure(&self, id: &str) -> Option<&Structure> {
        self.snapshot.get(id)
    }

    pub fn get_cell_value(&self, pos: Position) -> String {
        get_cell_value(pos, &self.snapshot)
    }

    pub fn structure_at(&self, pos: Position) -> Option<&Structure> {
        get_structure_at_position(pos, &self.snapshot)
    }

    pub fn structures_at(&self, pos: Position) -> Vec<&Structure> {
        get_structures_at_position(pos, &self.snapshot)
    }

    /// Evaluate formula text against the current document without storing it.
    pub fn evaluate(&self, formula: &str) -> FormulaValue {
        FormulaEngine::new(&self.snapshot).evaluate_formula(formula)
    }

    fn ensure_name_free(&self, name: Option<&str>, except: Option<&str>) -> Result<()> {
        let Some(name) = name else {
            return Ok(());
        };
        match self.snapshot.store.find_by_name(name) {
            Some(owner) if Some(owner.id.as_str()) != except => {
                Err(GridweaveError::DuplicateName(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Run the cascade from `changed` and adopt its result.
    fn recalculate_from(&mut self, changed: &[Position]) -> RecalcReport {
        let out = trigger_recalculation(
            changed,
            &self.snapshot,
            &mut self.graph,
            self.config.max_recalc_iterations,
        );
        self.snapshot = out.snapshot;
        out.report
    }

    /// Evaluate one structure's formula in place, then cascade from its cells.
    fn recalculate_structure_and_dependents(&mut self, id: &str) -> RecalcReport {
        recalculate_in_place(id, &mut self.snapshot, &mut self.graph);
        let cells = self.snapshot.get(id).map(cells_of).unwrap_or_default();
        self.recalculate_from(&cells)
    }

    /// Create and place a new structure. Returns its id.
    pub fn create_structure(
        &mut self,
        kind: StructureType,
        name: Option<&str>,
        position: Position,
        dimensions: Dimensions,
    ) -> Result<StructureId> {
        self.ensure_name_free(name, None)?;
        let structure = create_structure(kind, name, position, dimensions)?;
        let id = structure.id.clone();
        let cells = cells_of(&structure);
        let next = insert_structure(&self.snapshot, structure, self.config.bounds())?;
        self.commit(next);
        self.recalculate_from(&cells);
        Ok(id)
    }

    /// Write user input at `pos`: text starting with `=` becomes the cell's
    /// formula, anything else its literal value.
    pub fn set_cell(&mut self, pos: Position, input: &str) -> Result<RecalcReport> {
        if input.starts_with('=') {
            let current = self.snapshot.cell_at(pos).and_then(Structure::cell_value).unwrap_or("").to_string();
            let (next, id) = set_cell_value(&self.snapshot, pos, &current, self.config.bounds())?;
            if next != self.snapshot {
                self.commit(next);
            }
            return self.set_formula(id.as_str(), Some(input));
        }

        let (mut next, id) = set_cell_value(&self.snapshot, pos, input, self.config.bounds())?;
        if let Some(mut cell) = next.get(id.as_str()).cloned()
            && cell.formula.is_some()
        {
            cell.formula = None;
            cell.formula_error = None;
            next.replace(cell);
            self.graph.remove_formula(id.as_str());
        }
        self.commit(next);
        Ok(self.recalculate_from(&[pos]))
    }

    /// Attach, replace or (with None) remove the formula of any structure.
    pub fn set_formula(&mut self, id: &str, formula: Option<&str>) -> Result<RecalcReport> {
        let mut structure = self
            .snapshot
            .get(id)
            .cloned()
            .ok_or_else(|| GridweaveError::MissingStructure(id.to_string()))?;
        structure.formula = formula.map(str::to_string);
        structure.formula_error = None;
        let cells = cells_of(&structure);

        let mut next = self.snapshot.clone();
        next.replace(structure);
        if formula.is_none() {
            self.graph.remove_formula(id);
            self.commit(next);
            return Ok(self.recalculate_from(&cells));
        }
        if self.snapshot != next {
            self.commit(next);
        }
        Ok(self.recalculate_structure_and_dependents(id))
    }

    /// Remove a structure and its formula.
    pub fn delete_structure(&mut self, id: &str) -> Result<RecalcReport> {
        let cells = self.snapshot.get(id).map(cells_of).unwrap_or_default();
        let next = delete_structure(&self.snapshot, id)?;
        self.graph.remove_formula(id);
        self.commit(next);
        Ok(self.recalculate_from(&cells))
    }

    /// Set or clear a structure's name. Names are unique.
    pub fn rename_structure(&mut self, id: &str, name: Option<&str>) -> Result<RecalcReport> {
        self.ensure_name_free(name, Some(id))?;
        let mut structure = self
            .snapshot
            .get(id)
            .cloned()
            .ok_or_else(|| GridweaveError::MissingStructure(id.to_string()))?;
        structure.name = name.map(str::to_string);
        let mut next = self.snapshot.clone();
        next.replace(structure);
        self.commit(next);
        // Formulas refer to names textually; re-evaluate them all.
        Ok(self.recalculate_all())
    }

    /// Move a structure (with nested content) so it starts at `target`.
    pub fn move_structure(&mut self, id: &str, target: Position, overwrite_existing: bool) -> Result<RecalcReport> {
        let structure = self
            .snapshot
            .get(id)
            .cloned()
            .ok_or_else(|| GridweaveError::MissingStructure(id.to_string()))?;
        let out = move_structure_recursively(&structure, target, &self.snapshot, overwrite_existing, self.config.bounds())?;

        let mut changed: BTreeSet<Position> = BTreeSet::new();
        changed.extend(structure.rect().cells());
        if let Some(s) = out.snapshot.get(id) {
            changed.extend(s.rect().cells());
        }
        for (old, new) in &out.renamed {
            self.graph.rename(old.as_str(), new.as_str());
        }
        for removed in &out.removed {
            self.graph.remove_formula(removed.as_str());
        }
        self.commit(out.snapshot);
        debug!("Moved {id} to {target}");
        let changed: Vec<Position> = changed.into_iter().collect();
        Ok(self.recalculate_from(&changed))
    }

    /// Grow an array or table, pushing whatever is in the way.
    pub fn expand_structure(&mut self, id: &str, direction: Direction, amount: usize) -> Result<RecalcReport> {
        let out = expand_structure_with_pushing(id, direction, amount, &self.snapshot, self.config.bounds())?;

        let mut changed: BTreeSet<Position> = BTreeSet::new();
        for touched in std::iter::once(id).chain(out.pushed.iter().map(StructureId::as_str)) {
            for snap in [&self.snapshot, &out.snapshot] {
                if let Some(s) = snap.get(touched) {
                    changed.extend(s.rect().cells());
                }
            }
        }
        for (old, new) in &out.renamed {
            self.graph.rename(old.as_str(), new.as_str());
        }
        self.commit(out.snapshot);
        let changed: Vec<Position> = changed.into_iter().collect();
        Ok(self.recalculate_from(&changed))
    }

    /// Stamp a template from the document's library. Returns the instance id.
    pub fn instantiate_template(
        &mut self,
        template_id: &str,
        position: Position,
        name: Option<&str>,
    ) -> Result<StructureId> {
        self.ensure_name_free(name, None)?;
        let out = instantiate_template(
            &self.templates,
            template_id,
            position,
            name,
            &self.snapshot,
            self.config.bounds(),
        )?;
        self.commit(out.snapshot);
        for id in &out.created {
            if self.snapshot.get(id.as_str()).is_some_and(|s| s.formula.is_some()) {
                recalculate_in_place(id.as_str(), &mut self.snapshot, &mut self.graph);
            }
        }
        let cells = self.snapshot.get(out.instance_id.as_str()).map(cells_of).unwrap_or_default();
        self.recalculate_from(&cells);
        Ok(out.instance_id)
    }

    /// Override one relative cell of a template instance.
    pub fn set_template_override(&mut self, instance_id: &str, rel: Position, value: &str) -> Result<RecalcReport> {
        let (next, cell_id) = set_template_override(instance_id, rel, value, &self.snapshot, self.config.bounds())?;
        let cells = next.get(cell_id.as_str()).map(cells_of).unwrap_or_default();
        self.commit(next);
        Ok(self.recalculate_from(&cells))
    }

    /// Re-evaluate every formula, then cascade until stable.
    pub fn recalculate_all(&mut self) -> RecalcReport {
        let ids: Vec<StructureId> = self
            .snapshot
            .store
            .ids()
            .into_iter()
            .filter(|id| self.snapshot.get(id.as_str()).is_some_and(|s| s.formula.is_some()))
            .collect();
        let mut cells = BTreeSet::new();
        for id in &ids {
            recalculate_in_place(id.as_str(), &mut self.snapshot, &mut self.graph);
            if let Some(s) = self.snapshot.get(id.as_str()) {
                cells.extend(s.rect().cells());
            }
        }
        let cells: Vec<Position> = cells.into_iter().collect();
        self.recalculate_from(&cells)
    }

    /// Formula structures feeding `dep`.
    fn producers(&self, dep: &Dependency) -> Vec<String> {
        let ids: Vec<StructureId> = match dep {
            Dependency::Structure { id } => vec![StructureId::from(id.as_str())],
            Dependency::TableColumn { table, .. } => self
                .snapshot
                .store
                .find_by_name(table)
                .map(|t| vec![t.id.clone()])
                .unwrap_or_default(),
            other => other
                .rect()
                .map(|rect| self.snapshot.index.ids_in_rect(&rect))
                .unwrap_or_default(),
        };
        ids.into_iter()
            .map(|id| id.to_string())
            .filter(|id| self.graph.contains(id))
            .collect()
    }

    /// A formula cycle through `id`, as the path of structure ids ending with
    /// the repeated one.
    pub fn detect_cycle(&self, id: &str) -> Option<Vec<StructureId>> {
        detect_cycle(id, &self.graph, |dep| self.producers(dep))
            .map(|path| path.into_iter().map(StructureId::from).collect())
    }

    /// Current snapshot; edits never mutate a snapshot handed out here.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pos(a1: &str) -> Position {
        Position::from_a1(a1).unwrap()
    }

    #[test]
    fn test_set_cell_formula_and_cascade() {
        let mut doc = Document::default();
        doc.set_cell(pos("A1"), "2").unwrap();
        doc.set_cell(pos("B1"), "=A1*3").unwrap();
        assert_eq!(doc.get_cell_value(pos("B1")), "6");
        let report = doc.set_cell(pos("A1"), "5").unwrap();
        assert_eq!(doc.get_cell_value(pos("B1")), "15");
        assert!(report.converged);
    }

    #[test]
    fn test_literal_clears_formula() {
        let mut doc = Document::default();
        doc.set_cell(pos("A1"), "=1+1").unwrap();
        let id = doc.structure_at(pos("A1")).unwrap().id.clone();
        assert!(doc.graph.contains(id.as_str()));
        doc.set_cell(pos("A1"), "plain").unwrap();
        assert!(!doc.graph.contains(id.as_str()));
        assert_eq!(doc.get_cell_value(pos("A1")), "plain");
    }

    #[test]
    fn test_named_structure_formula() {
        let mut doc = Document::default();
        let array = doc
            .create_structure(StructureType::Array, Some("xs"), pos("A1"), Dimensions::new(3, 1))
            .unwrap();
        for (at, v) in [("A1", "1"), ("A2", "2"), ("A3", "3")] {
            doc.set_cell(pos(at), v).unwrap();
        }
        doc.set_cell(pos("C1"), "=SUM(xs)").unwrap();
        assert_eq!(doc.get_cell_value(pos("C1")), "6");
        doc.set_cell(pos("A2"), "10").unwrap();
        assert_eq!(doc.get_cell_value(pos("C1")), "14");

        let err = doc.create_structure(StructureType::Cell, Some("xs"), pos("E1"), Dimensions::new(1, 1));
        assert!(matches!(err, Err(GridweaveError::DuplicateName(_))));
        assert!(doc.structure(array.as_str()).is_some());
    }

    #[test]
    fn test_detect_cycle() {
        let mut doc = Document::default();
        doc.set_cell(pos("A1"), "=B1").unwrap();
        doc.set_cell(pos("B1"), "=A1").unwrap();
        let a1 = doc.structure_at(pos("A1")).unwrap().id.clone();
        let path = doc.detect_cycle(a1.as_str()).unwrap();
        assert_eq!(path.first(), Some(&a1));
        assert_eq!(path.last(), Some(&a1));
        assert_eq!(path.len(), 3);
    }
}
