//! Moving structures together with everything nested inside them.

use std::collections::{HashMap, HashSet};

use log::debug;

use gridweave_engine::engine::Position;

use crate::config::GridBounds;
use crate::error::{GridweaveError, Result};
use crate::placement::{absorb_cell, can_place};
use crate::store::Snapshot;
use crate::structure::{Structure, StructureId, is_nested_in};

/// Result of relocating structures.
#[derive(Clone, Debug, Default)]
pub struct MoveOutcome {
    pub snapshot: Snapshot,
    /// Ids translated in place.
    pub moved: Vec<StructureId>,
    /// Slot cells of a moving array or table are re-created: `(old, new)`.
    pub renamed: Vec<(StructureId, StructureId)>,
    /// Structures deleted to make room at the destination.
    pub removed: Vec<StructureId>,
}

impl MoveOutcome {
    fn unchanged(snapshot: &Snapshot) -> Self {
        MoveOutcome {
            snapshot: snapshot.clone(),
            ..Default::default()
        }
    }
}

/// How a relocation treats whatever already sits at the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Landing {
    /// Reject destinations that break placement rules.
    Checked { overwrite: bool },
    /// The caller already cleared the destination.
    Trusted,
}

/// Ids that travel with `structure`: everything inside its rectangle that
/// follows it in hierarchy order, plus the cells in its slots.
pub fn nested_structures(structure: &Structure, snapshot: &Snapshot) -> Vec<StructureId> {
    let mut seen: HashSet<StructureId> = HashSet::new();
    let mut out = Vec::new();
    for id in snapshot.index.ids_in_rect(&structure.rect()) {
        if let Some(other) = snapshot.get(id.as_str())
            && is_nested_in(other, structure)
            && seen.insert(id.clone())
        {
            out.push(id);
        }
    }
    for id in structure.item_ids() {
        if snapshot.store.contains(id.as_str()) && seen.insert(id.clone()) {
            out.push(id);
        }
    }
    out
}

/// Move `structure` so that it starts at `target`, carrying its nested
/// content along.
///
/// With `overwrite_existing`, structures entirely covered by the destination
/// are deleted first; otherwise any conflict at the destination is an error.
pub fn move_structure_recursively(
    structure: &Structure,
    target: Position,
    snapshot: &Snapshot,
    overwrite_existing: bool,
    bounds: GridBounds,
) -> Result<MoveOutcome> {
    let delta = (
        target.row as i64 - structure.start_position.row as i64,
        target.col as i64 - structure.start_position.col as i64,
    );
    relocate(
        snapshot,
        std::slice::from_ref(&structure.id),
        delta,
        Landing::Checked {
            overwrite: overwrite_existing,
        },
        bounds,
    )
}

/// Translate `movers` and their nested content by `delta` as one batch.
pub(crate) fn relocate(
    snapshot: &Snapshot,
    movers: &[StructureId],
    delta: (i64, i64),
    landing: Landing,
    bounds: GridBounds,
) -> Result<MoveOutcome> {
    if delta == (0, 0) || movers.is_empty() {
        return Ok(MoveOutcome::unchanged(snapshot));
    }
    let (dr, dc) = delta;

    let mut seen: HashSet<StructureId> = HashSet::new();
    let mut moving: Vec<StructureId> = Vec::new();
    for id in movers {
        let s = snapshot
            .get(id.as_str())
            .ok_or_else(|| GridweaveError::MissingStructure(id.to_string()))?;
        for member in std::iter::once(id.clone()).chain(nested_structures(s, snapshot)) {
            if seen.insert(member.clone()) {
                moving.push(member);
            }
        }
    }

    for id in &moving {
        let Some(s) = snapshot.get(id.as_str()) else {
            continue;
        };
        let fits = s
            .rect()
            .translate(dr, dc)
            .is_some_and(|r| r.within_bounds(bounds.max_rows, bounds.max_cols));
        if !fits {
            return Err(match landing {
                Landing::Trusted => GridweaveError::PushOutOfBounds { id: id.to_string() },
                Landing::Checked { .. } => GridweaveError::OutOfBounds {
                    rect: format!("{} moved by ({dr}, {dc})", s.rect()),
                    max_rows: bounds.max_rows,
                    max_cols: bounds.max_cols,
                },
            });
        }
    }

    let mut next = snapshot.clone();
    let mut taken: HashMap<StructureId, Structure> = HashMap::new();
    for id in &moving {
        if let Some(s) = next.unplace(id.as_str()) {
            taken.insert(id.clone(), s);
        }
    }

    let mut removed = Vec::new();
    if let Landing::Checked { overwrite } = landing {
        if overwrite {
            for id in movers {
                let Some(dest) = taken.get(id).and_then(|s| s.rect().translate(dr, dc)) else {
                    continue;
                };
                for victim in next.index.ids_in_rect(&dest) {
                    let covered = next
                        .get(victim.as_str())
                        .is_some_and(|v| dest.contains_rect(&v.rect()));
                    if covered {
                        next.unplace(victim.as_str());
                        next.clear_slots_referencing(victim.as_str());
                        removed.push(victim);
                    }
                }
            }
        }
        for id in movers {
            if let Some(s) = taken.get(id) {
                let mut landed = s.clone();
                landed.start_position = shifted(s.start_position, dr, dc)?;
                can_place(&landed, &next, bounds)?;
            }
        }
    }

    let slot_cells: HashSet<StructureId> = taken
        .values()
        .filter(|s| s.is_container())
        .flat_map(Structure::item_ids)
        .filter(|id| taken.contains_key(id))
        .collect();

    let mut moved = Vec::new();
    let mut renamed = Vec::new();
    let mut landed: Vec<Structure> = Vec::new();
    for id in &moving {
        if slot_cells.contains(id) {
            continue;
        }
        let Some(original) = taken.get(id) else {
            continue;
        };
        let mut s = original.clone();
        s.start_position = shifted(s.start_position, dr, dc)?;
        if s.is_container() {
            let mut fresh: HashMap<StructureId, StructureId> = HashMap::new();
            for child_id in original.item_ids() {
                let Some(child) = taken.get(&child_id) else {
                    continue;
                };
                let mut copy = child.clone();
                copy.id = StructureId::mint(child.type_name());
                copy.start_position = shifted(child.start_position, dr, dc)?;
                fresh.insert(child_id.clone(), copy.id.clone());
                renamed.push((child_id, copy.id.clone()));
                landed.push(copy);
            }
            s.remap_items(|old| fresh.get(old).cloned());
        }
        moved.push(s.id.clone());
        landed.push(s);
    }

    for s in landed {
        next.place(s);
    }

    // Free cells are relinked: old slots emptied, covering slots filled.
    for id in &moved {
        let Some(s) = next.get(id.as_str()).cloned() else {
            continue;
        };
        if !s.is_cell() {
            continue;
        }
        next.clear_slots_referencing(id.as_str());
        absorb_cell(&mut next, &s);
    }

    debug!(
        "Relocated {} structure(s) by ({dr}, {dc}); {} slot cell(s) re-created, {} removed",
        moved.len(),
        renamed.len(),
        removed.len()
    );

    Ok(MoveOutcome {
        snapshot: next,
        moved,
        renamed,
        removed,
    })
}

fn shifted(pos: Position, dr: i64, dc: i64) -> Result<Position> {
    pos.offset(dr, dc)
        .ok_or_else(|| GridweaveError::DirectionConstraint(format!("{pos} cannot move by ({dr}, {dc})")))
}
