//! Markdown export of visible values

use std::fmt::Write as _;
use std::path::Path;

use gridweave_engine::engine::Position;

use crate::store::{Snapshot, get_cell_value};

/// Write the occupied part of the grid to a markdown file
pub fn write_markdown(path: &Path, snapshot: &Snapshot) -> std::io::Result<()> {
    std::fs::write(path, markdown_content(snapshot))
}

/// Render the occupied bounding box as a markdown table
pub fn markdown_content(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let Some((min, max)) = find_grid_bounds(snapshot) else {
        out.push_str("# Sheet\n\n*Empty spreadsheet*\n");
        return out;
    };

    out.push_str("# Sheet\n\n");

    // Header with column letters
    out.push_str("|   |");
    for col in min.col..=max.col {
        let _ = write!(out, " {} |", Position::col_to_letters(col));
    }
    out.push('\n');

    out.push_str("|---|");
    for _ in min.col..=max.col {
        out.push_str("---|");
    }
    out.push('\n');

    for row in min.row..=max.row {
        let _ = write!(out, "| {} |", row + 1); // 1-based row numbers
        for col in min.col..=max.col {
            let display = get_cell_value(Position::new(row, col), snapshot);
            let _ = write!(out, " {} |", escape_markdown(&display));
        }
        out.push('\n');
    }
    out
}

/// Top-left and bottom-right of every indexed coordinate
fn find_grid_bounds(snapshot: &Snapshot) -> Option<(Position, Position)> {
    let mut bounds: Option<(Position, Position)> = None;
    for (pos, _) in snapshot.index.occupied() {
        bounds = Some(match bounds {
            None => (*pos, *pos),
            Some((min, max)) => (
                Position::new(min.row.min(pos.row), min.col.min(pos.col)),
                Position::new(max.row.max(pos.row), max.col.max(pos.col)),
            ),
        });
    }
    bounds
}

/// Escape special markdown characters in cell content
fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ").replace('\r', "")
}
