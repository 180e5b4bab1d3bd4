//! References a formula makes to other content.
//!
//! Dependencies are discovered while a formula is evaluated (see
//! [`FormulaEngine`](super::FormulaEngine)) rather than by scanning the text,
//! so they always match what the evaluator actually read.
//!
//! Each dependency has a stable string key used by the reverse index in
//! [`DependencyGraph`](super::DependencyGraph):
//! - `cell:r:c`
//! - `range:r1:c1:r2:c2`
//! - `structure:id`
//! - `tableColumn:name:col`

use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::{Position, Rect};

/// A single reference recorded during evaluation.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Dependency {
    Cell { row: usize, col: usize },
    Range { start: Position, end: Position },
    Structure { id: String },
    TableColumn { table: String, column: String },
}

impl Dependency {
    pub fn cell(row: usize, col: usize) -> Dependency {
        Dependency::Cell { row, col }
    }

    pub fn range(start: Position, end: Position) -> Dependency {
        let rect = Rect::spanning(start, end);
        Dependency::Range {
            start: rect.start,
            end: rect.end,
        }
    }

    pub fn structure(id: impl Into<String>) -> Dependency {
        Dependency::Structure { id: id.into() }
    }

    pub fn table_column(table: impl Into<String>, column: impl Into<String>) -> Dependency {
        Dependency::TableColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Reverse-index key for this dependency.
    pub fn key(&self) -> String {
        match self {
            Dependency::Cell { row, col } => cell_key(*row, *col),
            Dependency::Range { start, end } => {
                format!("range:{}:{}:{}:{}", start.row, start.col, end.row, end.col)
            }
            Dependency::Structure { id } => structure_key(id),
            Dependency::TableColumn { table, column } => table_column_key(table, column),
        }
    }

    /// Parse a reverse-index key back into a dependency.
    pub fn from_key(key: &str) -> Option<Dependency> {
        let (kind, rest) = key.split_once(':')?;
        match kind {
            "cell" => {
                let (row, col) = rest.split_once(':')?;
                Some(Dependency::cell(row.parse().ok()?, col.parse().ok()?))
            }
            "range" => {
                let parts: Vec<usize> = rest
                    .split(':')
                    .map(|p| p.parse().ok())
                    .collect::<Option<Vec<_>>>()?;
                let [r1, c1, r2, c2] = parts.as_slice() else {
                    return None;
                };
                Some(Dependency::range(Position::new(*r1, *c1), Position::new(*r2, *c2)))
            }
            "structure" => Some(Dependency::structure(rest)),
            "tableColumn" => {
                // Table names cannot contain ':' (they are identifiers); the column may.
                let (table, column) = rest.split_once(':')?;
                Some(Dependency::table_column(table, column))
            }
            _ => None,
        }
    }

    /// The rectangle covered by a cell or range dependency.
    pub fn rect(&self) -> Option<Rect> {
        match self {
            Dependency::Cell { row, col } => {
                let pos = Position::new(*row, *col);
                Some(Rect::spanning(pos, pos))
            }
            Dependency::Range { start, end } => Some(Rect::spanning(*start, *end)),
            _ => None,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

pub fn cell_key(row: usize, col: usize) -> String {
    format!("cell:{}:{}", row, col)
}

pub fn structure_key(id: &str) -> String {
    format!("structure:{}", id)
}

pub fn table_column_key(table: &str, column: &str) -> String {
    format!("tableColumn:{}:{}", table, column)
}
