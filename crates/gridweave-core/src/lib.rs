//! gridweave-core - Structure-based document model + storage.
//!
//! The grid holds structures (cells, arrays, tables, template instances)
//! rather than free-form cells. Everything here is built from pure
//! functions over an immutable [`Snapshot`]; [`Document`] is the stateful
//! session that strings them together with dependency tracking and
//! recalculation.

pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod mutation;
pub mod placement;
pub mod recalc;
pub mod storage;
pub mod store;
pub mod structure;
pub mod template;

pub use config::{EngineConfig, GridBounds};
pub use document::Document;
pub use error::{GridweaveError, Result};
pub use index::PositionIndex;
pub use mutation::{Direction, ExpandOutcome, MoveOutcome};
pub use recalc::{RecalcOutcome, RecalcReport, recalculate_structure, trigger_recalculation};
pub use store::{
    Snapshot, StructureStore, get_cell_value, get_structure_at_position, get_structures_at_position,
};
pub use structure::{
    ArrayContent, ArrayDirection, Structure, StructureId, StructureKind, StructureType,
    create_structure,
};
pub use template::{TemplateInstance, TemplateLibrary, instantiate_template, set_template_override};

pub use gridweave_engine::engine::{Dimensions, Position};
