//! Structural edits: moving structures and growing them.
//!
//! Both entry points are pure: they read a [`Snapshot`](crate::Snapshot) and
//! return a new one, or an error leaving the input untouched.

mod expand;
mod relocate;

pub use expand::{
    Direction, ExpandOutcome, detect_expansion_collisions, expand_structure_normally,
    expand_structure_with_pushing, expansion_rect, find_structures_in_push_chain, push_structures,
    validate_push_operation,
};
pub use relocate::{MoveOutcome, move_structure_recursively, nested_structures};
