//! Template libraries and template instances.
//!
//! A template is stored content (structures plus `cellData`) keyed by a
//! template id. Instantiating it stamps a Template structure covering the
//! content's bounding box and fresh copies of every stored structure,
//! translated so the content's top-left corner lands on the requested
//! position.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::debug;

use gridweave_engine::engine::{Dimensions, Position};

use crate::config::GridBounds;
use crate::error::{GridweaveError, Result};
use crate::placement::{absorb_cell, can_place, set_cell_value};
use crate::storage::StoredContent;
use crate::storage::json::read_json_file;
use crate::store::Snapshot;
use crate::structure::{Structure, StructureId, StructureKind, StructureType, create_structure};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateLibrary {
    templates: BTreeMap<String, StoredContent>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&read_json_file(path)?)
    }

    pub fn get(&self, template_id: &str) -> Option<&StoredContent> {
        self.templates.get(template_id)
    }

    pub fn insert(&mut self, template_id: impl Into<String>, content: StoredContent) {
        self.templates.insert(template_id.into(), content);
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// A freshly stamped instance.
#[derive(Clone, Debug)]
pub struct TemplateInstance {
    pub snapshot: Snapshot,
    pub instance_id: StructureId,
    /// Ids of the copied content, including cells created for `cellData`.
    pub created: Vec<StructureId>,
}

/// Stamp `template_id` at `position`.
///
/// The instance needs empty ground: it may not overlap anything already on
/// the grid.
pub fn instantiate_template(
    library: &TemplateLibrary,
    template_id: &str,
    position: Position,
    name: Option<&str>,
    snapshot: &Snapshot,
    bounds: GridBounds,
) -> Result<TemplateInstance> {
    let content = library
        .get(template_id)
        .ok_or_else(|| GridweaveError::TemplateNotFound(template_id.to_string()))?;

    let origin = content.origin();
    let dimensions = content
        .extent()
        .map(|end| Dimensions::new(end.row - origin.row + 1, end.col - origin.col + 1))
        .unwrap_or_default();
    let instance = create_structure(
        StructureType::Template(template_id.to_string()),
        name,
        position,
        dimensions,
    )?;
    can_place(&instance, snapshot, bounds)?;

    let place_at = |p: Position| Position::new(p.row - origin.row + position.row, p.col - origin.col + position.col);

    let fresh: HashMap<StructureId, StructureId> = content
        .structures
        .iter()
        .map(|(id, s)| (id.clone(), StructureId::mint(s.type_name())))
        .collect();

    let mut next = snapshot.clone();
    let instance_id = instance.id.clone();
    next.place(instance);

    let mut created = Vec::new();
    for (old_id, stored) in &content.structures {
        let Some(new_id) = fresh.get(old_id) else {
            continue;
        };
        let mut copy = stored.clone();
        copy.id = new_id.clone();
        copy.start_position = place_at(stored.start_position);
        copy.formula_error = None;
        copy.remap_items(|id| fresh.get(id).cloned());
        created.push(copy.id.clone());
        next.place(copy);
    }

    for (key, value) in &content.cell_data {
        let Some(rel) = Position::from_key(key) else {
            continue;
        };
        let pos = place_at(rel);
        match next.cell_at(pos).map(|c| c.id.clone()) {
            Some(id) => {
                if let Some(cell) = next.store.get_mut(id.as_str()) {
                    cell.kind = StructureKind::Cell { value: value.clone() };
                }
            }
            None => {
                let cell = Structure::cell(pos, value.clone());
                absorb_cell(&mut next, &cell);
                created.push(cell.id.clone());
                next.place(cell);
            }
        }
    }

    debug!("Instantiated template {template_id} at {position} with {} structure(s)", created.len());
    Ok(TemplateInstance {
        snapshot: next,
        instance_id,
        created,
    })
}

/// Record `value` for the cell at `rel` (relative to the instance origin)
/// and write it into the nested content. Returns the new snapshot and the
/// id of the cell holding the value.
pub fn set_template_override(
    instance_id: &str,
    rel: Position,
    value: &str,
    snapshot: &Snapshot,
    bounds: GridBounds,
) -> Result<(Snapshot, StructureId)> {
    let instance = snapshot
        .get(instance_id)
        .ok_or_else(|| GridweaveError::MissingStructure(instance_id.to_string()))?;
    if !instance.is_template() {
        return Err(GridweaveError::NotATemplate(instance_id.to_string()));
    }
    if rel.row >= instance.dimensions.rows || rel.col >= instance.dimensions.cols {
        return Err(GridweaveError::OutOfBounds {
            rect: format!("{rel} within {}", instance.rect()),
            max_rows: instance.dimensions.rows,
            max_cols: instance.dimensions.cols,
        });
    }
    let pos = Position::new(instance.start_position.row + rel.row, instance.start_position.col + rel.col);
    set_cell_value(snapshot, pos, value, bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{get_cell_value, get_structure_at_position};
    use pretty_assertions::assert_eq;

    const LIBRARY: &str = r#"{
        "invoice": {
            "structures": [
                ["t-table", {
                    "type": "table", "id": "t-table",
                    "startPosition": {"row": 10, "col": 3},
                    "dimensions": {"rows": 2, "cols": 2},
                    "itemIds": [["t-head", null], [null, null]],
                    "colHeaderLevels": 1, "rowHeaderLevels": 0
                }],
                ["t-head", {
                    "type": "cell", "id": "t-head",
                    "startPosition": {"row": 10, "col": 3},
                    "dimensions": {"rows": 1, "cols": 1},
                    "value": "item"
                }]
            ],
            "cellData": {"11-3": "widget"}
        }
    }"#;

    fn library() -> TemplateLibrary {
        TemplateLibrary::from_json(LIBRARY).unwrap()
    }

    #[test]
    fn test_instantiate_copies_content() {
        let out = instantiate_template(&library(), "invoice", Position::new(0, 0), Some("inv"), &Snapshot::new(), GridBounds::default()).unwrap();
        let instance = out.snapshot.get(out.instance_id.as_str()).unwrap();
        assert_eq!(instance.dimensions, Dimensions::new(2, 2));
        assert_eq!(get_cell_value(Position::new(0, 0), &out.snapshot), "item");
        assert_eq!(get_cell_value(Position::new(1, 0), &out.snapshot), "widget");
        assert_eq!(out.created.len(), 3);
        assert!(out.snapshot.get("t-table").is_none());

        let table = get_structure_at_position(Position::new(0, 1), &out.snapshot).unwrap();
        assert_eq!(table.type_name(), "table");
        assert_eq!(table.item_ids().len(), 2);
    }

    #[test]
    fn test_instantiate_needs_empty_ground() {
        let (snap, _) = set_cell_value(&Snapshot::new(), Position::new(1, 1), "x", GridBounds::default()).unwrap();
        let err = instantiate_template(&library(), "invoice", Position::new(0, 0), None, &snap, GridBounds::default());
        assert!(matches!(err, Err(GridweaveError::PlacementConflict { kind: "template", .. })));
        let err = instantiate_template(&library(), "missing", Position::new(0, 0), None, &snap, GridBounds::default());
        assert!(matches!(err, Err(GridweaveError::TemplateNotFound(_))));
    }

    #[test]
    fn test_override_updates_content_and_map() {
        let out = instantiate_template(&library(), "invoice", Position::new(4, 4), None, &Snapshot::new(), GridBounds::default()).unwrap();
        let (snap, _) = set_template_override(out.instance_id.as_str(), Position::new(1, 1), "9.99", &out.snapshot, GridBounds::default()).unwrap();
        assert_eq!(get_cell_value(Position::new(5, 5), &snap), "9.99");
        match &snap.get(out.instance_id.as_str()).unwrap().kind {
            StructureKind::Template { overrides, .. } => assert_eq!(overrides.get("1-1").map(String::as_str), Some("9.99")),
            _ => panic!("expected template"),
        }
        let err = set_template_override(out.instance_id.as_str(), Position::new(2, 0), "x", &snap, GridBounds::default());
        assert!(matches!(err, Err(GridweaveError::OutOfBounds { .. })));
    }
}
