//! Growing arrays and tables, pushing whatever is in the way.
//!
//! Expansion claims a strip of `amount` rows or columns next to one edge of
//! the structure. Structures in that strip are pushed by the same amount in
//! the same direction, and so is everything they in turn run into. If any
//! pushed structure would leave the grid, nothing changes.

use std::collections::{HashSet, VecDeque};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use gridweave_engine::engine::{Dimensions, Position, Rect};

use super::relocate::{Landing, MoveOutcome, relocate};
use crate::config::GridBounds;
use crate::error::{GridweaveError, Result};
use crate::store::Snapshot;
use crate::structure::{ArrayDirection, Structure, StructureId, StructureKind, hierarchy_order, is_nested_in};

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Row/column offset of a shift by `amount` cells.
    pub fn delta(self, amount: usize) -> (i64, i64) {
        let n = amount as i64;
        match self {
            Direction::Up => (-n, 0),
            Direction::Down => (n, 0),
            Direction::Left => (0, -n),
            Direction::Right => (0, n),
        }
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }
}

impl std::str::FromStr for Direction {
    type Err = GridweaveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(GridweaveError::DirectionConstraint(format!("Unknown direction: {other}"))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExpandOutcome {
    pub snapshot: Snapshot,
    /// Structures moved out of the way, outermost members only.
    pub pushed: Vec<StructureId>,
    /// Slot cells re-created while pushing arrays or tables.
    pub renamed: Vec<(StructureId, StructureId)>,
}

fn check_expandable(structure: &Structure, direction: Direction) -> Result<()> {
    match &structure.kind {
        StructureKind::Cell { .. } | StructureKind::Template { .. } => Err(GridweaveError::NotResizable {
            kind: structure.type_name(),
        }),
        StructureKind::Array {
            direction: ArrayDirection::Horizontal,
            ..
        } if direction.is_vertical() => Err(GridweaveError::DirectionConstraint(
            "Horizontal arrays can only expand left or right".to_string(),
        )),
        StructureKind::Array {
            direction: ArrayDirection::Vertical,
            ..
        } if !direction.is_vertical() => Err(GridweaveError::DirectionConstraint(
            "Vertical arrays can only expand up or down".to_string(),
        )),
        _ => Ok(()),
    }
}

/// The strip claimed by growing `structure` by `amount` towards `direction`.
/// None when it would cross row or column zero.
pub fn expansion_rect(structure: &Structure, direction: Direction, amount: usize) -> Option<Rect> {
    if amount == 0 {
        return None;
    }
    let rect = structure.rect();
    let dims = structure.dimensions;
    let (start, size) = match direction {
        Direction::Down => (Position::new(rect.end.row + 1, rect.start.col), Dimensions::new(amount, dims.cols)),
        Direction::Up => (
            Position::new(rect.start.row.checked_sub(amount)?, rect.start.col),
            Dimensions::new(amount, dims.cols),
        ),
        Direction::Right => (Position::new(rect.start.row, rect.end.col + 1), Dimensions::new(dims.rows, amount)),
        Direction::Left => (
            Position::new(rect.start.row, rect.start.col.checked_sub(amount)?),
            Dimensions::new(dims.rows, amount),
        ),
    };
    Some(Rect::new(start, size))
}

/// Structures strictly containing `structure`.
fn ancestors(structure: &Structure, snapshot: &Snapshot) -> HashSet<StructureId> {
    snapshot
        .structures_at(structure.start_position)
        .into_iter()
        .filter(|other| is_nested_in(structure, other))
        .map(|other| other.id.clone())
        .collect()
}

/// Ids of `candidates` ordered outermost first.
fn in_hierarchy_order(mut candidates: Vec<StructureId>, snapshot: &Snapshot) -> Vec<StructureId> {
    candidates.sort_by(|a, b| match (snapshot.get(a.as_str()), snapshot.get(b.as_str())) {
        (Some(x), Some(y)) => hierarchy_order(x, y),
        _ => a.cmp(b),
    });
    candidates
}

/// Structures occupying the strip an expansion would claim. The expanding
/// structure, its own slot cells and anything enclosing it never collide.
pub fn detect_expansion_collisions(
    structure: &Structure,
    direction: Direction,
    amount: usize,
    snapshot: &Snapshot,
) -> Vec<StructureId> {
    let Some(strip) = expansion_rect(structure, direction, amount) else {
        return Vec::new();
    };
    let own: HashSet<StructureId> = structure.item_ids().into_iter().collect();
    let enclosing = ancestors(structure, snapshot);
    let hits = snapshot
        .index
        .ids_in_rect(&strip)
        .into_iter()
        .filter(|id| *id != structure.id && !own.contains(id) && !enclosing.contains(id))
        .collect();
    in_hierarchy_order(hits, snapshot)
}

/// Grow `structure` without looking at what is in the way.
pub fn expand_structure_normally(
    structure: &Structure,
    direction: Direction,
    amount: usize,
    snapshot: &Snapshot,
    bounds: GridBounds,
) -> Result<Snapshot> {
    check_expandable(structure, direction)?;
    if amount == 0 {
        return Ok(snapshot.clone());
    }
    let strip = expansion_rect(structure, direction, amount)
        .filter(|r| r.within_bounds(bounds.max_rows, bounds.max_cols))
        .ok_or_else(|| GridweaveError::OutOfBounds {
            rect: format!("{} grown {amount} {direction:?}", structure.rect()),
            max_rows: bounds.max_rows,
            max_cols: bounds.max_cols,
        })?;

    let mut grown = structure.clone();
    grown.start_position = Position::new(
        structure.start_position.row.min(strip.start.row),
        structure.start_position.col.min(strip.start.col),
    );
    if direction.is_vertical() {
        grown.dimensions.rows += amount;
    } else {
        grown.dimensions.cols += amount;
    }

    let prepend = matches!(direction, Direction::Up | Direction::Left);
    match &mut grown.kind {
        StructureKind::Array { item_ids, .. } => {
            if prepend {
                item_ids.splice(0..0, std::iter::repeat_n(None, amount));
            } else {
                item_ids.extend(std::iter::repeat_n(None, amount));
            }
        }
        StructureKind::Table { item_ids, .. } => {
            let cols = grown.dimensions.cols;
            match direction {
                Direction::Down => item_ids.extend(std::iter::repeat_n(vec![None; cols], amount)),
                Direction::Up => {
                    item_ids.splice(0..0, std::iter::repeat_n(vec![None; cols], amount));
                }
                Direction::Right => item_ids
                    .iter_mut()
                    .for_each(|row| row.extend(std::iter::repeat_n(None, amount))),
                Direction::Left => item_ids.iter_mut().for_each(|row| {
                    row.splice(0..0, std::iter::repeat_n(None, amount));
                }),
            }
        }
        _ => {}
    }

    let mut next = snapshot.clone();
    next.index.evict(structure);
    next.index.insert(&grown);
    next.replace(grown);
    Ok(next)
}

/// Everything that has to move for the strip to become free: the initial
/// collisions, then whatever each of them runs into once shifted, and so on.
///
/// Members nested inside another member are dropped; they move with it.
pub fn find_structures_in_push_chain(
    initial: &[StructureId],
    expanding: &Structure,
    direction: Direction,
    amount: usize,
    snapshot: &Snapshot,
) -> Vec<StructureId> {
    let (dr, dc) = direction.delta(amount);

    let mut visited: HashSet<StructureId> = ancestors(expanding, snapshot);
    visited.insert(expanding.id.clone());
    visited.extend(super::nested_structures(expanding, snapshot));

    let mut chain: Vec<StructureId> = Vec::new();
    let mut queue: VecDeque<StructureId> = in_hierarchy_order(initial.to_vec(), snapshot).into();
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(s) = snapshot.get(id.as_str()) else {
            continue;
        };
        chain.push(id);
        let travelling: HashSet<StructureId> = super::nested_structures(s, snapshot).into_iter().collect();
        let enclosing = ancestors(s, snapshot);
        let Some(landing) = s.rect().translate(dr, dc) else {
            continue;
        };
        let hits: Vec<StructureId> = snapshot
            .index
            .ids_in_rect(&landing)
            .into_iter()
            .filter(|hit| !visited.contains(hit) && !travelling.contains(hit) && !enclosing.contains(hit))
            .collect();
        queue.extend(in_hierarchy_order(hits, snapshot));
    }

    let members: Vec<&Structure> = chain.iter().filter_map(|id| snapshot.get(id.as_str())).collect();
    chain
        .iter()
        .filter(|id| {
            snapshot.get(id.as_str()).is_some_and(|s| {
                !members.iter().any(|outer| is_nested_in(s, outer))
            })
        })
        .cloned()
        .collect()
}

/// Fails when any chain member would leave the grid once shifted.
pub fn validate_push_operation(
    chain: &[StructureId],
    direction: Direction,
    amount: usize,
    snapshot: &Snapshot,
    bounds: GridBounds,
) -> Result<()> {
    let (dr, dc) = direction.delta(amount);
    for id in chain {
        let s = snapshot
            .get(id.as_str())
            .ok_or_else(|| GridweaveError::MissingStructure(id.to_string()))?;
        let fits = s
            .rect()
            .translate(dr, dc)
            .is_some_and(|r| r.within_bounds(bounds.max_rows, bounds.max_cols));
        if !fits {
            warn!("Push rejected: {id} at {} would leave the grid", s.rect());
            return Err(GridweaveError::PushOutOfBounds { id: id.to_string() });
        }
    }
    Ok(())
}

/// Shift every chain member (with its nested content) by `amount`.
pub fn push_structures(
    chain: &[StructureId],
    direction: Direction,
    amount: usize,
    snapshot: &Snapshot,
    bounds: GridBounds,
) -> Result<MoveOutcome> {
    relocate(snapshot, chain, direction.delta(amount), Landing::Trusted, bounds)
}

/// Grow the structure `id` by `amount` towards `direction`, pushing
/// colliding structures out of the way.
pub fn expand_structure_with_pushing(
    id: &str,
    direction: Direction,
    amount: usize,
    snapshot: &Snapshot,
    bounds: GridBounds,
) -> Result<ExpandOutcome> {
    let structure = snapshot
        .get(id)
        .ok_or_else(|| GridweaveError::MissingStructure(id.to_string()))?;
    check_expandable(structure, direction)?;
    if amount == 0 {
        return Ok(ExpandOutcome {
            snapshot: snapshot.clone(),
            ..Default::default()
        });
    }

    let collisions = detect_expansion_collisions(structure, direction, amount, snapshot);
    if collisions.is_empty() {
        return Ok(ExpandOutcome {
            snapshot: expand_structure_normally(structure, direction, amount, snapshot, bounds)?,
            ..Default::default()
        });
    }

    let chain = find_structures_in_push_chain(&collisions, structure, direction, amount, snapshot);
    validate_push_operation(&chain, direction, amount, snapshot, bounds)?;
    debug!("Expanding {id} {direction:?} by {amount}: pushing {} structure(s)", chain.len());

    let pushed = push_structures(&chain, direction, amount, snapshot, bounds)?;
    let expanded = expand_structure_normally(structure, direction, amount, &pushed.snapshot, bounds)?;
    Ok(ExpandOutcome {
        snapshot: expanded,
        pushed: chain,
        renamed: pushed.renamed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::{insert_structure, set_cell_value};
    use crate::store::get_cell_value;
    use crate::structure::{StructureType, create_structure};
    use pretty_assertions::assert_eq;

    fn b() -> GridBounds {
        GridBounds::default()
    }

    fn pos(a1: &str) -> Position {
        Position::from_a1(a1).unwrap()
    }

    fn place(snap: &Snapshot, kind: StructureType, at: &str, rows: usize, cols: usize) -> (Snapshot, StructureId) {
        let s = create_structure(kind, None, pos(at), Dimensions::new(rows, cols)).unwrap();
        let id = s.id.clone();
        (insert_structure(snap, s, b()).unwrap(), id)
    }

    #[test]
    fn test_expansion_rect() {
        let s = create_structure(StructureType::Table, None, pos("B2"), Dimensions::new(2, 3)).unwrap();
        assert_eq!(expansion_rect(&s, Direction::Down, 2).map(|r| r.to_string()), Some("B4:D5".to_string()));
        assert_eq!(expansion_rect(&s, Direction::Left, 1).map(|r| r.to_string()), Some("A2:A3".to_string()));
        assert_eq!(expansion_rect(&s, Direction::Up, 2), None);
    }

    #[test]
    fn test_direction_constraints() {
        let (snap, id) = place(&Snapshot::new(), StructureType::Array, "A1", 1, 3);
        let err = expand_structure_with_pushing(id.as_str(), Direction::Down, 1, &snap, b());
        assert!(matches!(err, Err(GridweaveError::DirectionConstraint(_))));
        let (snap, cell) = set_cell_value(&snap, pos("E5"), "x", b()).unwrap();
        let err = expand_structure_with_pushing(cell.as_str(), Direction::Down, 1, &snap, b());
        assert!(matches!(err, Err(GridweaveError::NotResizable { kind: "cell" })));
    }

    #[test]
    fn test_expand_up_prepends_slots() {
        let (snap, id) = place(&Snapshot::new(), StructureType::Array, "A3", 2, 1);
        let (snap, first) = set_cell_value(&snap, pos("A3"), "a", b()).unwrap();
        let out = expand_structure_with_pushing(id.as_str(), Direction::Up, 2, &snap, b()).unwrap();
        let grown = out.snapshot.get(id.as_str()).unwrap();
        assert_eq!(grown.start_position, pos("A1"));
        match &grown.kind {
            StructureKind::Array { item_ids, .. } => {
                assert_eq!(item_ids.len(), 4);
                assert_eq!(item_ids[2].as_ref(), Some(&first));
            }
            _ => panic!("expected array"),
        }
        assert_eq!(out.snapshot.index.ids_at(pos("A1")), &[id.clone()]);
    }

    #[test]
    fn test_no_collision_equals_normal_expansion() {
        let (snap, id) = place(&Snapshot::new(), StructureType::Table, "A1", 2, 2);
        let structure = snap.get(id.as_str()).unwrap().clone();
        let normal = expand_structure_normally(&structure, Direction::Right, 1, &snap, b()).unwrap();
        let pushed = expand_structure_with_pushing(id.as_str(), Direction::Right, 1, &snap, b()).unwrap();
        assert_eq!(pushed.snapshot, normal);
        assert!(pushed.pushed.is_empty());
    }

    #[test]
    fn test_push_chain_cascades() {
        let (snap, array) = place(&Snapshot::new(), StructureType::Array, "A1", 2, 1);
        let (snap, c3) = set_cell_value(&snap, pos("A3"), "3", b()).unwrap();
        let (snap, c4) = set_cell_value(&snap, pos("A4"), "4", b()).unwrap();
        let (snap, other) = set_cell_value(&snap, pos("B3"), "side", b()).unwrap();

        let out = expand_structure_with_pushing(array.as_str(), Direction::Down, 1, &snap, b()).unwrap();
        assert_eq!(out.pushed, vec![c3.clone(), c4.clone()]);
        assert_eq!(out.snapshot.get(c3.as_str()).unwrap().start_position, pos("A4"));
        assert_eq!(out.snapshot.get(c4.as_str()).unwrap().start_position, pos("A5"));
        assert_eq!(out.snapshot.get(other.as_str()).unwrap().start_position, pos("B3"));
        assert_eq!(get_cell_value(pos("A3"), &out.snapshot), "");
        assert_eq!(out.snapshot.get(array.as_str()).unwrap().dimensions, Dimensions::new(3, 1));
    }

    #[test]
    fn test_push_off_grid_changes_nothing() {
        let bounds = GridBounds { max_rows: 4, max_cols: 4 };
        let s = create_structure(StructureType::Array, None, pos("A1"), Dimensions::new(2, 1)).unwrap();
        let id = s.id.clone();
        let snap = insert_structure(&Snapshot::new(), s, bounds).unwrap();
        let (snap, _) = set_cell_value(&snap, pos("A3"), "3", bounds).unwrap();
        let (snap, last) = set_cell_value(&snap, pos("A4"), "4", bounds).unwrap();

        let err = expand_structure_with_pushing(id.as_str(), Direction::Down, 1, &snap, bounds);
        match err {
            Err(GridweaveError::PushOutOfBounds { id }) => assert_eq!(id, last.to_string()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_pushed_table_keeps_values() {
        let (snap, array) = place(&Snapshot::new(), StructureType::Array, "A1", 1, 2);
        let (snap, table) = place(&snap, StructureType::Table, "C1", 2, 2);
        let (snap, _) = set_cell_value(&snap, pos("C1"), "head", b()).unwrap();

        let out = expand_structure_with_pushing(array.as_str(), Direction::Right, 1, &snap, b()).unwrap();
        assert_eq!(out.pushed, vec![table.clone()]);
        assert_eq!(out.renamed.len(), 1);
        assert_eq!(get_cell_value(pos("D1"), &out.snapshot), "head");
        assert_eq!(get_cell_value(pos("C1"), &out.snapshot), "");
        assert_eq!(out.snapshot.get(table.as_str()).unwrap().start_position, pos("D1"));
    }
}
