//! Structure storage and the immutable document snapshot.
//!
//! A [`Snapshot`] pairs the [`StructureStore`] with its [`PositionIndex`].
//! Mutating operations take `&Snapshot` and return a new one; callers keep
//! the old value for comparison.

use std::collections::HashMap;

use gridweave_engine::engine::{
    Container, FormulaContext, FormulaError, NamedContent, NamedStructure, Position,
};

use crate::index::PositionIndex;
use crate::structure::{Structure, StructureId, StructureKind};

/// Id → structure map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructureStore {
    structures: HashMap<StructureId, Structure>,
}

impl StructureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Structure> {
        self.structures.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.structures.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Structure> {
        self.structures.values()
    }

    /// Ids in sorted order.
    pub fn ids(&self) -> Vec<StructureId> {
        let mut ids: Vec<StructureId> = self.structures.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// New store with `structure` inserted (or replaced).
    pub fn with(&self, structure: Structure) -> StructureStore {
        let mut next = self.clone();
        next.put(structure);
        next
    }

    /// New store without `id`.
    pub fn without(&self, id: &str) -> StructureStore {
        let mut next = self.clone();
        next.take(id);
        next
    }

    pub(crate) fn put(&mut self, structure: Structure) {
        self.structures.insert(structure.id.clone(), structure);
    }

    pub(crate) fn take(&mut self, id: &str) -> Option<Structure> {
        self.structures.remove(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Structure> {
        self.structures.get_mut(id)
    }

    /// Structure carrying `name`. Names are unique within a document; on a
    /// duplicate the smallest id wins.
    pub fn find_by_name(&self, name: &str) -> Option<&Structure> {
        self.structures
            .values()
            .filter(|s| s.name.as_deref() == Some(name))
            .min_by(|a, b| a.id.cmp(&b.id))
    }
}

/// The document state: structures plus their spatial index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub store: StructureStore,
    pub index: PositionIndex,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Structure> {
        self.store.get(id)
    }

    /// Store and index a structure in place.
    pub(crate) fn place(&mut self, structure: Structure) {
        self.index.insert(&structure);
        self.store.put(structure);
    }

    /// Remove a structure from store and index in place.
    pub(crate) fn unplace(&mut self, id: &str) -> Option<Structure> {
        let structure = self.store.take(id)?;
        self.index.evict(&structure);
        Some(structure)
    }

    /// Replace a structure whose rectangle did not change.
    pub(crate) fn replace(&mut self, structure: Structure) {
        self.store.put(structure);
    }

    /// Empty every slot that references `id` in any array or table.
    pub(crate) fn clear_slots_referencing(&mut self, id: &str) {
        let holders: Vec<StructureId> = self
            .store
            .iter()
            .filter(|s| s.holds_item(id))
            .map(|s| s.id.clone())
            .collect();
        for holder in holders {
            if let Some(s) = self.store.get_mut(holder.as_str()) {
                s.clear_item(id);
            }
        }
    }

    /// All structures covering `pos`, outermost first.
    pub fn structures_at(&self, pos: Position) -> Vec<&Structure> {
        self.index.structures_at(pos, &self.store)
    }

    /// The Cell structure at `pos`, if any.
    pub fn cell_at(&self, pos: Position) -> Option<&Structure> {
        self.structures_at(pos).into_iter().rev().find(|s| s.is_cell())
    }

    /// Column headers of a table, taken from its last column-header row.
    pub fn table_headers(&self, table: &Structure) -> Vec<String> {
        let StructureKind::Table {
            col_header_levels, ..
        } = &table.kind
        else {
            return Vec::new();
        };
        if *col_header_levels == 0 {
            return Vec::new();
        }
        let header_row = table.start_position.row + col_header_levels - 1;
        (0..table.dimensions.cols)
            .map(|c| get_cell_value(Position::new(header_row, table.start_position.col + c), self))
            .collect()
    }

    /// Header → column offset. The first occurrence of a repeated header wins.
    pub fn table_column_map(&self, table: &Structure) -> HashMap<String, usize> {
        let mut map = HashMap::new();
        for (c, header) in self.table_headers(table).into_iter().enumerate() {
            if !header.is_empty() {
                map.entry(header).or_insert(c);
            }
        }
        map
    }

    /// Values under a table column, header rows skipped.
    pub fn table_column_values(&self, table: &Structure, column: &str) -> Option<Vec<String>> {
        let StructureKind::Table {
            col_header_levels, ..
        } = &table.kind
        else {
            return None;
        };
        let c = *self.table_column_map(table).get(column)?;
        let col = table.start_position.col + c;
        Some(
            (*col_header_levels..table.dimensions.rows)
                .map(|r| get_cell_value(Position::new(table.start_position.row + r, col), self))
                .collect(),
        )
    }

    /// Visible values of every coordinate of `structure`, row-major.
    pub fn values_of(&self, structure: &Structure) -> Vec<String> {
        structure
            .rect()
            .cells()
            .map(|pos| get_cell_value(pos, self))
            .collect()
    }

    /// Named structures covering `pos`, with the table column when relevant.
    pub fn containers_at(&self, pos: Position) -> Vec<Container> {
        self.structures_at(pos)
            .into_iter()
            .filter_map(|s| {
                let name = s.name.clone()?;
                let table_column = match s.kind {
                    StructureKind::Table { .. } => self
                        .table_headers(s)
                        .get(pos.col - s.start_position.col)
                        .filter(|h| !h.is_empty())
                        .cloned(),
                    _ => None,
                };
                Some(Container {
                    id: s.id.to_string(),
                    name,
                    table_column,
                })
            })
            .collect()
    }
}

/// Every structure covering `pos`, outermost first.
pub fn get_structures_at_position(pos: Position, snapshot: &Snapshot) -> Vec<&Structure> {
    snapshot.structures_at(pos)
}

/// The single structure a user addresses at `pos`: templates give way to
/// whatever they contain, otherwise the outermost wins.
pub fn get_structure_at_position(pos: Position, snapshot: &Snapshot) -> Option<&Structure> {
    let all = snapshot.structures_at(pos);
    if all.len() > 1 {
        all.into_iter().find(|s| !s.is_template())
    } else {
        all.into_iter().next()
    }
}

/// Visible text at `pos`: the cell covering it, else a template override,
/// else empty.
pub fn get_cell_value(pos: Position, snapshot: &Snapshot) -> String {
    let structures = snapshot.structures_at(pos);
    if let Some(value) = structures.iter().rev().find_map(|s| s.cell_value()) {
        return value.to_string();
    }
    for s in &structures {
        if let StructureKind::Template { overrides, .. } = &s.kind {
            let rel = Position::new(pos.row - s.start_position.row, pos.col - s.start_position.col);
            if let Some(value) = overrides.get(&rel.key()) {
                return value.clone();
            }
        }
    }
    String::new()
}

impl FormulaContext for Snapshot {
    fn cell_value(&self, pos: Position) -> String {
        get_cell_value(pos, self)
    }

    fn named_structure(&self, name: &str) -> Option<NamedStructure> {
        let s = self.store.find_by_name(name)?;
        let content = match &s.kind {
            StructureKind::Cell { value } => NamedContent::Scalar(value.clone()),
            StructureKind::Array { .. } | StructureKind::Table { .. } => {
                NamedContent::List(self.values_of(s))
            }
            StructureKind::Template { .. } => NamedContent::Opaque,
        };
        Some(NamedStructure {
            id: s.id.to_string(),
            content,
        })
    }

    fn table_column(&self, table: &str, column: &str) -> Result<Vec<String>, FormulaError> {
        let t = self
            .store
            .find_by_name(table)
            .filter(|s| matches!(s.kind, StructureKind::Table { .. }))
            .ok_or_else(|| FormulaError::TableNotFound(table.to_string()))?;
        self.table_column_values(t, column)
            .ok_or_else(|| FormulaError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{StructureType, create_structure};
    use gridweave_engine::engine::Dimensions;
    use pretty_assertions::assert_eq;

    fn snapshot_with(structures: Vec<Structure>) -> Snapshot {
        let mut snap = Snapshot::new();
        for s in structures {
            snap.place(s);
        }
        snap
    }

    #[test]
    fn test_store_is_copy_on_write() {
        let cell = Structure::cell(Position::new(0, 0), "1");
        let empty = StructureStore::new();
        let one = empty.with(cell.clone());
        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert!(one.without(cell.id.as_str()).is_empty());
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn test_structure_at_prefers_content_over_template() {
        let tpl = create_structure(StructureType::Template("t".into()), None, Position::new(0, 0), Dimensions::new(2, 2)).unwrap();
        let cell = Structure::cell(Position::new(1, 1), "v");
        let snap = snapshot_with(vec![tpl.clone(), cell.clone()]);
        assert_eq!(get_structure_at_position(Position::new(1, 1), &snap).map(|s| &s.id), Some(&cell.id));
        assert_eq!(get_structure_at_position(Position::new(0, 0), &snap).map(|s| &s.id), Some(&tpl.id));
        assert_eq!(get_structures_at_position(Position::new(1, 1), &snap).len(), 2);
        assert!(get_structure_at_position(Position::new(5, 5), &snap).is_none());
    }

    #[test]
    fn test_cell_value_falls_back_to_override() {
        let mut tpl = create_structure(StructureType::Template("t".into()), None, Position::new(2, 2), Dimensions::new(2, 2)).unwrap();
        if let StructureKind::Template { overrides, .. } = &mut tpl.kind {
            overrides.insert("1-0".to_string(), "over".to_string());
        }
        let snap = snapshot_with(vec![tpl]);
        assert_eq!(get_cell_value(Position::new(3, 2), &snap), "over");
        assert_eq!(get_cell_value(Position::new(2, 2), &snap), "");
    }

    #[test]
    fn test_table_column_lookup() {
        let mut table = create_structure(StructureType::Table, Some("sales"), Position::new(0, 0), Dimensions::new(3, 2)).unwrap();
        let cells = [
            (0, 0, "item"),
            (0, 1, "amount"),
            (1, 0, "a"),
            (1, 1, "10"),
            (2, 0, "b"),
            (2, 1, "32"),
        ];
        let mut structures = Vec::new();
        for (r, c, v) in cells {
            let cell = Structure::cell(Position::new(r, c), v);
            table.set_slot(Position::new(r, c), Some(cell.id.clone()));
            structures.push(cell);
        }
        structures.push(table);
        let snap = snapshot_with(structures);

        assert_eq!(snap.table_column("sales", "amount"), Ok(vec!["10".to_string(), "32".to_string()]));
        assert_eq!(
            snap.table_column("sales", "price"),
            Err(FormulaError::ColumnNotFound { table: "sales".into(), column: "price".into() })
        );
        assert_eq!(snap.table_column("nope", "amount"), Err(FormulaError::TableNotFound("nope".into())));

        let containers = snap.containers_at(Position::new(2, 1));
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].table_column.as_deref(), Some("amount"));

        match snap.named_structure("sales").map(|n| n.content) {
            Some(NamedContent::List(values)) => assert_eq!(values.len(), 6),
            other => panic!("unexpected {other:?}"),
        }
    }
}
