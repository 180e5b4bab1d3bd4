//! Structures: the objects that occupy rectangles of the grid.
//!
//! Every structure carries an id, a start position, dimensions, an optional
//! name and an optional formula. The variant-specific payload lives in
//! [`StructureKind`]:
//!
//! - `Cell` holds a single text value.
//! - `Array` is a one-dimensional run of cell slots.
//! - `Table` is a two-dimensional grid of cell slots with header rows/columns.
//! - `Template` is an instance of a saved template; its content lives in
//!   ordinary structures nested inside its rectangle.
//!
//! Slots (`item_ids`) are weak links: a slot may be empty, and the referenced
//! cell is an independent entry of the store.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use gridweave_engine::engine::{Dimensions, Position, Rect};

use crate::error::{GridweaveError, Result};

/// Opaque, document-unique structure id.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructureId(String);

impl StructureId {
    /// Mint a fresh id such as `cell-6f1c…`.
    pub fn mint(prefix: &str) -> StructureId {
        StructureId(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StructureId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StructureId {
    fn from(s: &str) -> Self {
        StructureId(s.to_string())
    }
}

impl From<String> for StructureId {
    fn from(s: String) -> Self {
        StructureId(s)
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayDirection {
    Horizontal,
    Vertical,
}

/// What an array's slots hold: plain cells, or instances of one template.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArrayContent {
    #[default]
    Cells,
    Template(String),
}

impl From<String> for ArrayContent {
    fn from(s: String) -> Self {
        if s == "cells" {
            ArrayContent::Cells
        } else {
            ArrayContent::Template(s)
        }
    }
}

impl From<ArrayContent> for String {
    fn from(c: ArrayContent) -> Self {
        match c {
            ArrayContent::Cells => "cells".to_string(),
            ArrayContent::Template(id) => id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StructureKind {
    Cell {
        #[serde(default)]
        value: String,
    },
    #[serde(rename_all = "camelCase")]
    Array {
        direction: ArrayDirection,
        #[serde(default)]
        content_type: ArrayContent,
        item_ids: Vec<Option<StructureId>>,
    },
    #[serde(rename_all = "camelCase")]
    Table {
        item_ids: Vec<Vec<Option<StructureId>>>,
        col_header_levels: usize,
        row_header_levels: usize,
    },
    #[serde(rename_all = "camelCase")]
    Template {
        template_id: String,
        /// Values keyed by `"row-col"` relative to the instance origin.
        #[serde(default)]
        overrides: BTreeMap<String, String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Structure {
    pub id: StructureId,
    pub start_position: Position,
    pub dimensions: Dimensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Message of the last evaluation error, cleared on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_error: Option<String>,
    #[serde(flatten)]
    pub kind: StructureKind,
}

/// The type requested from [`create_structure`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StructureType {
    Cell,
    Array,
    Table,
    /// Instance of the template with this id.
    Template(String),
}

impl Structure {
    /// A 1x1 cell holding `value`.
    pub fn cell(position: Position, value: impl Into<String>) -> Structure {
        Structure {
            id: StructureId::mint("cell"),
            start_position: position,
            dimensions: Dimensions::new(1, 1),
            name: None,
            formula: None,
            formula_error: None,
            kind: StructureKind::Cell { value: value.into() },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            StructureKind::Cell { .. } => "cell",
            StructureKind::Array { .. } => "array",
            StructureKind::Table { .. } => "table",
            StructureKind::Template { .. } => "template",
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.start_position, self.dimensions)
    }

    /// Like [`rect`](Self::rect) but `None` when the far corner overflows.
    pub fn checked_rect(&self) -> Option<Rect> {
        Rect::checked_new(self.start_position, self.dimensions)
    }

    pub fn is_cell(&self) -> bool {
        matches!(self.kind, StructureKind::Cell { .. })
    }

    pub fn is_template(&self) -> bool {
        matches!(self.kind, StructureKind::Template { .. })
    }

    /// Arrays and tables own cell slots.
    pub fn is_container(&self) -> bool {
        matches!(self.kind, StructureKind::Array { .. } | StructureKind::Table { .. })
    }

    pub fn cell_value(&self) -> Option<&str> {
        match &self.kind {
            StructureKind::Cell { value } => Some(value),
            _ => None,
        }
    }

    /// Populated slot ids, row-major.
    pub fn item_ids(&self) -> Vec<StructureId> {
        match &self.kind {
            StructureKind::Array { item_ids, .. } => item_ids.iter().flatten().cloned().collect(),
            StructureKind::Table { item_ids, .. } => {
                item_ids.iter().flatten().flatten().cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    /// True when some slot references `id`.
    pub fn holds_item(&self, id: &str) -> bool {
        self.slot_ids().any(|slot| slot == id)
    }

    fn slot_ids(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match &self.kind {
            StructureKind::Array { item_ids, .. } => {
                Box::new(item_ids.iter().flatten().map(StructureId::as_str))
            }
            StructureKind::Table { item_ids, .. } => {
                Box::new(item_ids.iter().flatten().flatten().map(StructureId::as_str))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    /// The slot covering `pos`, as `(row, col)` into `item_ids` (arrays use
    /// a single index, reported as the column).
    fn slot_index(&self, pos: Position) -> Option<(usize, usize)> {
        if !self.rect().contains(pos) {
            return None;
        }
        let r = pos.row - self.start_position.row;
        let c = pos.col - self.start_position.col;
        match &self.kind {
            StructureKind::Array { direction, .. } => match direction {
                ArrayDirection::Vertical => Some((0, r)),
                ArrayDirection::Horizontal => Some((0, c)),
            },
            StructureKind::Table { .. } => Some((r, c)),
            _ => None,
        }
    }

    /// Id in the slot covering `pos`.
    pub fn slot_at(&self, pos: Position) -> Option<&StructureId> {
        let (r, c) = self.slot_index(pos)?;
        match &self.kind {
            StructureKind::Array { item_ids, .. } => item_ids.get(c)?.as_ref(),
            StructureKind::Table { item_ids, .. } => item_ids.get(r)?.get(c)?.as_ref(),
            _ => None,
        }
    }

    /// Put `id` into the slot covering `pos`. Returns false when `pos` has no slot.
    pub fn set_slot(&mut self, pos: Position, id: Option<StructureId>) -> bool {
        let Some((r, c)) = self.slot_index(pos) else {
            return false;
        };
        let slot = match &mut self.kind {
            StructureKind::Array { item_ids, .. } => item_ids.get_mut(c),
            StructureKind::Table { item_ids, .. } => item_ids.get_mut(r).and_then(|row| row.get_mut(c)),
            _ => None,
        };
        match slot {
            Some(slot) => {
                *slot = id;
                true
            }
            None => false,
        }
    }

    /// Empty every slot referencing `id`. Returns whether anything changed.
    pub fn clear_item(&mut self, id: &str) -> bool {
        let mut cleared = false;
        let mut clear = |slot: &mut Option<StructureId>| {
            if slot.as_ref().is_some_and(|s| s.as_str() == id) {
                *slot = None;
                cleared = true;
            }
        };
        match &mut self.kind {
            StructureKind::Array { item_ids, .. } => item_ids.iter_mut().for_each(&mut clear),
            StructureKind::Table { item_ids, .. } => {
                item_ids.iter_mut().flatten().for_each(&mut clear)
            }
            _ => {}
        }
        cleared
    }

    /// Rewrite slot ids through `map`; ids missing from it become empty slots.
    pub fn remap_items<F>(&mut self, map: F)
    where
        F: Fn(&StructureId) -> Option<StructureId>,
    {
        let remap = |slot: &mut Option<StructureId>| {
            *slot = slot.as_ref().and_then(&map);
        };
        match &mut self.kind {
            StructureKind::Array { item_ids, .. } => item_ids.iter_mut().for_each(remap),
            StructureKind::Table { item_ids, .. } => item_ids.iter_mut().flatten().for_each(remap),
            _ => {}
        }
    }
}

/// Build a new structure with a freshly minted id.
///
/// Arrays must be a single row or a single column; a single column makes a
/// vertical array, anything else horizontal. Cells are always 1x1. Tables
/// start with one column-header row and no row headers.
pub fn create_structure(
    kind: StructureType,
    name: Option<&str>,
    start: Position,
    dimensions: Dimensions,
) -> Result<Structure> {
    if dimensions.rows == 0 || dimensions.cols == 0 {
        return Err(GridweaveError::InvalidDimensions {
            kind: type_label(&kind),
            rows: dimensions.rows,
            cols: dimensions.cols,
        });
    }

    let (prefix, dimensions, kind) = match kind {
        StructureType::Cell => (
            "cell",
            Dimensions::new(1, 1),
            StructureKind::Cell {
                value: String::new(),
            },
        ),
        StructureType::Array => {
            if dimensions.rows != 1 && dimensions.cols != 1 {
                return Err(GridweaveError::InvalidDimensions {
                    kind: "array",
                    rows: dimensions.rows,
                    cols: dimensions.cols,
                });
            }
            let direction = if dimensions.cols == 1 && dimensions.rows > 1 {
                ArrayDirection::Vertical
            } else {
                ArrayDirection::Horizontal
            };
            let len = dimensions.rows.max(dimensions.cols);
            (
                "array",
                dimensions,
                StructureKind::Array {
                    direction,
                    content_type: ArrayContent::Cells,
                    item_ids: vec![None; len],
                },
            )
        }
        StructureType::Table => (
            "table",
            dimensions,
            StructureKind::Table {
                item_ids: vec![vec![None; dimensions.cols]; dimensions.rows],
                col_header_levels: 1,
                row_header_levels: 0,
            },
        ),
        StructureType::Template(template_id) => (
            "template",
            dimensions,
            StructureKind::Template {
                template_id,
                overrides: BTreeMap::new(),
            },
        ),
    };

    Ok(Structure {
        id: StructureId::mint(prefix),
        start_position: start,
        dimensions,
        name: name.map(str::to_string),
        formula: None,
        formula_error: None,
        kind,
    })
}

fn type_label(kind: &StructureType) -> &'static str {
    match kind {
        StructureType::Cell => "cell",
        StructureType::Array => "array",
        StructureType::Table => "table",
        StructureType::Template(_) => "template",
    }
}

fn type_rank(s: &Structure) -> u8 {
    match s.kind {
        StructureKind::Template { .. } => 0,
        StructureKind::Array { .. } => 1,
        StructureKind::Table { .. } => 2,
        StructureKind::Cell { .. } => 3,
    }
}

/// Outermost first: larger area, then top-left start, then template before
/// array before table before cell. Ties fall back to the id so the order is
/// total.
pub fn hierarchy_order(a: &Structure, b: &Structure) -> Ordering {
    b.dimensions
        .area()
        .cmp(&a.dimensions.area())
        .then(a.start_position.row.cmp(&b.start_position.row))
        .then(a.start_position.col.cmp(&b.start_position.col))
        .then(type_rank(a).cmp(&type_rank(b)))
        .then_with(|| a.id.cmp(&b.id))
}

/// True when `inner` sits inside `outer` and comes after it in hierarchy order.
pub fn is_nested_in(inner: &Structure, outer: &Structure) -> bool {
    inner.id != outer.id
        && outer.rect().contains_rect(&inner.rect())
        && hierarchy_order(outer, inner) == Ordering::Less
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_array_direction() {
        let v = create_structure(StructureType::Array, None, Position::new(0, 0), Dimensions::new(3, 1)).unwrap();
        assert!(matches!(v.kind, StructureKind::Array { direction: ArrayDirection::Vertical, ref item_ids, .. } if item_ids.len() == 3));
        let h = create_structure(StructureType::Array, None, Position::new(0, 0), Dimensions::new(1, 4)).unwrap();
        assert!(matches!(h.kind, StructureKind::Array { direction: ArrayDirection::Horizontal, .. }));
        assert!(v.id.as_str().starts_with("array-"));
    }

    #[test]
    fn test_create_rejects_two_dimensional_array() {
        let err = create_structure(StructureType::Array, None, Position::new(0, 0), Dimensions::new(2, 2));
        assert!(matches!(err, Err(GridweaveError::InvalidDimensions { kind: "array", .. })));
    }

    #[test]
    fn test_create_cell_is_single_slot() {
        let c = create_structure(StructureType::Cell, Some("x"), Position::new(2, 2), Dimensions::new(5, 5)).unwrap();
        assert_eq!(c.dimensions, Dimensions::new(1, 1));
        assert_eq!(c.name.as_deref(), Some("x"));
    }

    #[test]
    fn test_create_table_defaults() {
        let t = create_structure(StructureType::Table, None, Position::new(0, 0), Dimensions::new(3, 2)).unwrap();
        match t.kind {
            StructureKind::Table { item_ids, col_header_levels, row_header_levels } => {
                assert_eq!(item_ids.len(), 3);
                assert_eq!(item_ids[0].len(), 2);
                assert_eq!((col_header_levels, row_header_levels), (1, 0));
            }
            _ => panic!("expected table"),
        }
    }

    #[test]
    fn test_hierarchy_order() {
        let table = create_structure(StructureType::Table, None, Position::new(0, 0), Dimensions::new(2, 2)).unwrap();
        let tpl = create_structure(StructureType::Template("t".into()), None, Position::new(0, 0), Dimensions::new(2, 2)).unwrap();
        let cell = Structure::cell(Position::new(0, 0), "");
        let mut all = vec![cell.clone(), table.clone(), tpl.clone()];
        all.sort_by(hierarchy_order);
        let kinds: Vec<_> = all.iter().map(Structure::type_name).collect();
        assert_eq!(kinds, vec!["template", "table", "cell"]);
        assert!(is_nested_in(&cell, &table));
        assert!(!is_nested_in(&table, &cell));
    }

    #[test]
    fn test_slots() {
        let mut t = create_structure(StructureType::Table, None, Position::new(1, 1), Dimensions::new(2, 2)).unwrap();
        assert!(t.set_slot(Position::new(2, 2), Some("c1".into())));
        assert!(!t.set_slot(Position::new(0, 0), Some("c2".into())));
        assert_eq!(t.slot_at(Position::new(2, 2)).map(StructureId::as_str), Some("c1"));
        assert!(t.holds_item("c1"));
        assert!(t.clear_item("c1"));
        assert!(t.item_ids().is_empty());
    }

    #[test]
    fn test_serde_shape() {
        let mut a = create_structure(StructureType::Array, Some("xs"), Position::new(0, 1), Dimensions::new(1, 2)).unwrap();
        a.id = "array-1".into();
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "array");
        assert_eq!(json["direction"], "horizontal");
        assert_eq!(json["contentType"], "cells");
        assert_eq!(json["startPosition"]["col"], 1);
        assert_eq!(json["itemIds"], serde_json::json!([null, null]));
        let back: Structure = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);
    }
}
