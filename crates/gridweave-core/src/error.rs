//! Error types for Gridweave core.

use thiserror::Error;

/// Errors returned by document mutation and storage.
///
/// Mutations that cannot be applied (missing ids, out-of-bounds pushes,
/// occupied targets) report the reason here; the snapshot passed in is left
/// untouched.
#[derive(Error, Debug)]
pub enum GridweaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Structure not found: {0}")]
    MissingStructure(String),

    #[error("Invalid dimensions {rows}x{cols} for {kind}")]
    InvalidDimensions {
        kind: &'static str,
        rows: usize,
        cols: usize,
    },

    #[error("{rect} is outside the grid ({max_rows} rows x {max_cols} columns)")]
    OutOfBounds {
        rect: String,
        max_rows: usize,
        max_cols: usize,
    },

    #[error("Cannot push {id}: it would leave the grid")]
    PushOutOfBounds { id: String },

    #[error("Cannot place {kind} at {rect}: occupied by {occupant}")]
    PlacementConflict {
        kind: &'static str,
        rect: String,
        occupant: String,
    },

    #[error("{0}")]
    DirectionConstraint(String),

    #[error("{kind} structures cannot be resized")]
    NotResizable { kind: &'static str },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("{0} is not a template instance")]
    NotATemplate(String),

    #[error("Name already in use: {0}")]
    DuplicateName(String),

    #[error("No file path set")]
    NoFilePath,
}

pub type Result<T> = std::result::Result<T, GridweaveError>;
