//! Placement rules and the simple snapshot edits built on them.
//!
//! Rules checked by [`can_place`]:
//!
//! - the rectangle lies inside the grid;
//! - nothing is placed on a template instance, and a template instance is
//!   placed only on empty ground;
//! - a cell may land inside an array or table (it is absorbed into the
//!   covering slot) but never on another cell;
//! - arrays and tables never overlap anything.

use gridweave_engine::engine::Position;

use crate::config::GridBounds;
use crate::error::{GridweaveError, Result};
use crate::store::Snapshot;
use crate::structure::{Structure, StructureId, StructureKind};

/// Check whether `candidate` may be added to `snapshot`. Its own id (when
/// already present) is ignored.
pub fn can_place(candidate: &Structure, snapshot: &Snapshot, bounds: GridBounds) -> Result<()> {
    let rect = candidate.rect();
    if !rect.within_bounds(bounds.max_rows, bounds.max_cols) {
        return Err(GridweaveError::OutOfBounds {
            rect: rect.to_string(),
            max_rows: bounds.max_rows,
            max_cols: bounds.max_cols,
        });
    }

    for id in snapshot.index.ids_in_rect(&rect) {
        if id == candidate.id {
            continue;
        }
        let Some(other) = snapshot.get(id.as_str()) else {
            continue;
        };
        let allowed = candidate.is_cell() && other.is_container();
        if !allowed {
            return Err(GridweaveError::PlacementConflict {
                kind: candidate.type_name(),
                rect: rect.to_string(),
                occupant: other.id.to_string(),
            });
        }
    }
    Ok(())
}

/// Validate and add `structure`. A cell landing inside arrays or tables is
/// linked into their covering slots.
pub fn insert_structure(snapshot: &Snapshot, structure: Structure, bounds: GridBounds) -> Result<Snapshot> {
    can_place(&structure, snapshot, bounds)?;
    let mut next = snapshot.clone();
    if structure.is_cell() {
        absorb_cell(&mut next, &structure);
    }
    next.place(structure);
    Ok(next)
}

/// Link a cell into every array/table slot covering its position.
pub(crate) fn absorb_cell(snapshot: &mut Snapshot, cell: &Structure) {
    let pos = cell.start_position;
    let holders: Vec<StructureId> = snapshot
        .structures_at(pos)
        .into_iter()
        .filter(|s| s.is_container() && s.slot_at(pos).is_none())
        .map(|s| s.id.clone())
        .collect();
    for holder in holders {
        if let Some(s) = snapshot.store.get_mut(holder.as_str()) {
            s.set_slot(pos, Some(cell.id.clone()));
        }
    }
}

/// Set the literal text at `pos`, creating a cell when none exists there.
///
/// Inside a template instance the value is also recorded as an override.
/// Returns the new snapshot and the id of the cell holding the value.
pub fn set_cell_value(
    snapshot: &Snapshot,
    pos: Position,
    value: &str,
    bounds: GridBounds,
) -> Result<(Snapshot, StructureId)> {
    if pos.row >= bounds.max_rows || pos.col >= bounds.max_cols {
        return Err(GridweaveError::OutOfBounds {
            rect: pos.to_string(),
            max_rows: bounds.max_rows,
            max_cols: bounds.max_cols,
        });
    }

    let mut next = snapshot.clone();
    record_override(&mut next, pos, value);

    if let Some(existing) = snapshot.cell_at(pos) {
        let mut cell = existing.clone();
        cell.kind = StructureKind::Cell {
            value: value.to_string(),
        };
        let id = cell.id.clone();
        next.replace(cell);
        return Ok((next, id));
    }

    // Template content is exempt from the occupancy rules.
    let cell = Structure::cell(pos, value);
    let id = cell.id.clone();
    absorb_cell(&mut next, &cell);
    next.place(cell);
    Ok((next, id))
}

fn record_override(snapshot: &mut Snapshot, pos: Position, value: &str) {
    let instances: Vec<StructureId> = snapshot
        .structures_at(pos)
        .into_iter()
        .filter(|s| s.is_template())
        .map(|s| s.id.clone())
        .collect();
    for id in instances {
        if let Some(s) = snapshot.store.get_mut(id.as_str()) {
            let rel = Position::new(pos.row - s.start_position.row, pos.col - s.start_position.col);
            if let StructureKind::Template { overrides, .. } = &mut s.kind {
                overrides.insert(rel.key(), value.to_string());
            }
        }
    }
}

/// Remove a structure. Slots referencing it are emptied; its own slot cells
/// stay in place as free cells.
pub fn delete_structure(snapshot: &Snapshot, id: &str) -> Result<Snapshot> {
    if !snapshot.store.contains(id) {
        return Err(GridweaveError::MissingStructure(id.to_string()));
    }
    let mut next = snapshot.clone();
    next.unplace(id);
    next.clear_slots_referencing(id);
    Ok(next)
}
