//! Spatial index from grid coordinates to the structures covering them.

use std::collections::{HashMap, HashSet};

use gridweave_engine::engine::{Position, Rect};

use crate::store::StructureStore;
use crate::structure::{Structure, StructureId, hierarchy_order};

/// Maps every occupied coordinate to the ids of the structures covering it.
///
/// A position with no structures has no entry; an id appears under exactly
/// the coordinates of its structure's rectangle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PositionIndex {
    cells: HashMap<Position, Vec<StructureId>>,
}

impl PositionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// New index with `structure` recorded under every coordinate it covers.
    pub fn add(&self, structure: &Structure) -> PositionIndex {
        let mut next = self.clone();
        next.insert(structure);
        next
    }

    /// New index with `structure` removed from every coordinate it covers.
    pub fn remove(&self, structure: &Structure) -> PositionIndex {
        let mut next = self.clone();
        next.evict(structure);
        next
    }

    pub(crate) fn insert(&mut self, structure: &Structure) {
        for pos in structure.rect().cells() {
            let ids = self.cells.entry(pos).or_default();
            if !ids.contains(&structure.id) {
                ids.push(structure.id.clone());
            }
        }
    }

    pub(crate) fn evict(&mut self, structure: &Structure) {
        for pos in structure.rect().cells() {
            if let Some(ids) = self.cells.get_mut(&pos) {
                ids.retain(|id| *id != structure.id);
                if ids.is_empty() {
                    self.cells.remove(&pos);
                }
            }
        }
    }

    pub fn ids_at(&self, pos: Position) -> &[StructureId] {
        self.cells.get(&pos).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct ids touching `rect`, in first-seen row-major order.
    pub fn ids_in_rect(&self, rect: &Rect) -> Vec<StructureId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for pos in rect.cells() {
            for id in self.ids_at(pos) {
                if seen.insert(id.clone()) {
                    out.push(id.clone());
                }
            }
        }
        out
    }

    /// Structures covering `pos`, outermost first.
    pub fn structures_at<'a>(&self, pos: Position, store: &'a StructureStore) -> Vec<&'a Structure> {
        let mut out: Vec<&Structure> = self
            .ids_at(pos)
            .iter()
            .filter_map(|id| store.get(id.as_str()))
            .collect();
        out.sort_by(|a, b| hierarchy_order(a, b));
        out
    }

    pub fn occupied(&self) -> impl Iterator<Item = (&Position, &[StructureId])> {
        self.cells.iter().map(|(pos, ids)| (pos, ids.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{StructureType, create_structure};
    use gridweave_engine::engine::Dimensions;

    #[test]
    fn test_add_is_pure() {
        let table = create_structure(StructureType::Table, None, Position::new(1, 1), Dimensions::new(2, 2)).unwrap();
        let empty = PositionIndex::new();
        let index = empty.add(&table);
        assert!(empty.is_empty());
        assert_eq!(index.ids_at(Position::new(2, 2)), &[table.id.clone()]);
        assert!(index.ids_at(Position::new(0, 0)).is_empty());
        assert_eq!(index.occupied().count(), 4);
    }

    #[test]
    fn test_remove_drops_empty_entries() {
        let cell = Structure::cell(Position::new(0, 0), "x");
        let index = PositionIndex::new().add(&cell).add(&cell);
        assert_eq!(index.ids_at(Position::new(0, 0)).len(), 1);
        let index = index.remove(&cell);
        assert!(index.is_empty());
    }

    #[test]
    fn test_ids_in_rect_dedups() {
        let table = create_structure(StructureType::Table, None, Position::new(0, 0), Dimensions::new(2, 2)).unwrap();
        let cell = Structure::cell(Position::new(1, 1), "");
        let index = PositionIndex::new().add(&table).add(&cell);
        let ids = index.ids_in_rect(&Rect::new(Position::new(0, 0), Dimensions::new(2, 2)));
        assert_eq!(ids, vec![table.id, cell.id]);
    }
}
