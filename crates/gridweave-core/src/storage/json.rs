//! JSON document and template files.
//!
//! Documents and template entries share one shape:
//!
//! ```json
//! {
//!   "structures": [["cell-1", {"type": "cell", "id": "cell-1", ...}], ...],
//!   "cellData": {"0-0": "42"}
//! }
//! ```
//!
//! `cellData` keys are `"row-col"`. A template library is an object mapping
//! template ids to entries of this shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use gridweave_engine::engine::Position;

use crate::config::GridBounds;
use crate::error::{GridweaveError, Result};
use crate::placement::set_cell_value;
use crate::store::Snapshot;
use crate::structure::{Structure, StructureId};

/// Largest file we are willing to parse.
const MAX_FILE_BYTES: u64 = 16 * 1_048_576;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContent {
    #[serde(default)]
    pub structures: Vec<(StructureId, Structure)>,
    #[serde(default)]
    pub cell_data: BTreeMap<String, String>,
}

impl StoredContent {
    /// Top-left corner of everything the content touches.
    pub fn origin(&self) -> Position {
        let starts = self
            .structures
            .iter()
            .map(|(_, s)| s.start_position)
            .chain(self.cell_data.keys().filter_map(|k| Position::from_key(k)));
        starts
            .reduce(|a, b| Position::new(a.row.min(b.row), a.col.min(b.col)))
            .unwrap_or_default()
    }

    /// Bottom-right corner of everything the content touches.
    pub fn extent(&self) -> Option<Position> {
        self.structures
            .iter()
            .map(|(_, s)| s.rect().end)
            .chain(self.cell_data.keys().filter_map(|k| Position::from_key(k)))
            .reduce(|a, b| Position::new(a.row.max(b.row), a.col.max(b.col)))
    }
}

pub fn parse_content(json: &str) -> Result<StoredContent> {
    Ok(serde_json::from_str(json)?)
}

pub(crate) fn read_json_file(path: &Path) -> Result<String> {
    let meta = std::fs::metadata(path)?;
    if meta.len() > MAX_FILE_BYTES {
        return Err(GridweaveError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Refusing to read {}: file too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_FILE_BYTES
            ),
        )));
    }
    Ok(std::fs::read_to_string(path)?)
}

pub fn read_content(path: &Path) -> Result<StoredContent> {
    parse_content(&read_json_file(path)?)
}

pub fn write_content(path: &Path, content: &StoredContent) -> Result<()> {
    let json = serde_json::to_string_pretty(content)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Serialize a snapshot; structures sorted by id, non-empty cell values
/// mirrored into `cellData`.
pub fn content_from_snapshot(snapshot: &Snapshot) -> StoredContent {
    let mut structures: Vec<(StructureId, Structure)> =
        snapshot.store.iter().map(|s| (s.id.clone(), s.clone())).collect();
    structures.sort_by(|a, b| a.0.cmp(&b.0));
    let cell_data = structures
        .iter()
        .filter_map(|(_, s)| {
            let value = s.cell_value()?;
            (!value.is_empty()).then(|| (s.start_position.key(), value.to_string()))
        })
        .collect();
    StoredContent {
        structures,
        cell_data,
    }
}

/// Rebuild a snapshot from stored content. Every structure must fit the
/// grid; `cellData` entries are written afterwards.
pub fn snapshot_from_content(content: &StoredContent, bounds: GridBounds) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    for (id, structure) in &content.structures {
        let mut structure = structure.clone();
        structure.id = id.clone();
        let out_of_bounds = |rect: String| GridweaveError::OutOfBounds {
            rect,
            max_rows: bounds.max_rows,
            max_cols: bounds.max_cols,
        };
        let rect = structure
            .checked_rect()
            .ok_or_else(|| out_of_bounds(format!("{} + {:?}", structure.start_position, structure.dimensions)))?;
        if !rect.within_bounds(bounds.max_rows, bounds.max_cols) {
            return Err(out_of_bounds(rect.to_string()));
        }
        snapshot.place(structure);
    }
    for (key, value) in &content.cell_data {
        let Some(pos) = Position::from_key(key) else {
            continue;
        };
        if snapshot.cell_at(pos).and_then(Structure::cell_value) == Some(value.as_str()) {
            continue;
        }
        snapshot = set_cell_value(&snapshot, pos, value, bounds)?.0;
    }
    Ok(snapshot)
}
