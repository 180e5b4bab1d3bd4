//! Grid coordinates and rectangles.
//!
//! Provides bidirectional conversion between spreadsheet-style cell references
//! (e.g., "A1", "B2", "AA100") and zero-indexed row/column coordinates, plus
//! the rectangle arithmetic used by the spatial index and mutation code.
//!
//! # Examples
//!
//! ```ignore
//! let pos = Position::from_a1("B3").unwrap();
//! assert_eq!(pos.col, 1);  // 0-indexed
//! assert_eq!(pos.row, 2);
//! assert_eq!(pos.to_string(), "B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// A grid coordinate (0-indexed).
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Position {
        Position { row, col }
    }

    /// Parse a reference in spreadsheet notation (e.g., "A1", "b2", "AA10").
    /// Returns None if the input is invalid.
    pub fn from_a1(name: &str) -> Option<Position> {
        let caps = a1_re().captures(name)?;
        let letters = &caps["letters"];
        let numbers = &caps["numbers"];

        let mut col_acc = 0usize;
        for c in letters.to_ascii_uppercase().bytes() {
            let digit = (c - b'A') as usize + 1;
            col_acc = col_acc.checked_mul(26)?.checked_add(digit)?;
        }
        let col = col_acc.checked_sub(1)?;

        let row = numbers.parse::<usize>().ok()?.checked_sub(1)?;

        Some(Position::new(row, col))
    }

    /// Convert column index to spreadsheet-style letters (0 -> A, 25 -> Z, 26 -> AA).
    pub fn col_to_letters(col: usize) -> String {
        let mut result = String::new();
        let mut n = col as u128 + 1;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        result
    }

    /// Offset by a signed delta. None if either coordinate would go negative.
    pub fn offset(&self, delta_row: i64, delta_col: i64) -> Option<Position> {
        let row = i64::try_from(self.row).ok()?.checked_add(delta_row)?;
        let col = i64::try_from(self.col).ok()?.checked_add(delta_col)?;
        if row < 0 || col < 0 {
            return None;
        }
        Some(Position::new(row as usize, col as usize))
    }

    /// Key used by position-keyed value maps (`"row-col"`).
    pub fn key(&self) -> String {
        format!("{}-{}", self.row, self.col)
    }

    /// Inverse of [`Position::key`].
    pub fn from_key(key: &str) -> Option<Position> {
        let (row, col) = key.split_once('-')?;
        Some(Position::new(row.trim().parse().ok()?, col.trim().parse().ok()?))
    }
}

fn a1_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?<letters>[A-Za-z]+)(?<numbers>[0-9]+)$").expect("A1 regex must compile")
    })
}

impl std::str::FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_a1(s).ok_or_else(|| format!("Invalid cell reference: {}", s))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Position::col_to_letters(self.col), self.row + 1)
    }
}

/// Size of a structure in cells. Both extents are at least 1.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub rows: usize,
    pub cols: usize,
}

impl Dimensions {
    pub fn new(rows: usize, cols: usize) -> Dimensions {
        Dimensions { rows, cols }
    }

    pub fn area(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Dimensions::new(1, 1)
    }
}

/// Inclusive rectangle `[start, end]` on the grid.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Rect {
    pub start: Position,
    pub end: Position,
}

impl Rect {
    /// Saturates at the edge of `usize`; use [`Rect::checked_new`] where the
    /// input is untrusted.
    pub fn new(start: Position, dimensions: Dimensions) -> Rect {
        let rows = dimensions.rows.max(1);
        let cols = dimensions.cols.max(1);
        Rect {
            start,
            end: Position::new(
                start.row.saturating_add(rows - 1),
                start.col.saturating_add(cols - 1),
            ),
        }
    }

    /// `None` when the far corner does not fit in `usize`.
    pub fn checked_new(start: Position, dimensions: Dimensions) -> Option<Rect> {
        let rows = dimensions.rows.max(1);
        let cols = dimensions.cols.max(1);
        Some(Rect {
            start,
            end: Position::new(start.row.checked_add(rows - 1)?, start.col.checked_add(cols - 1)?),
        })
    }

    /// Rectangle spanning two corners in any order.
    pub fn spanning(a: Position, b: Position) -> Rect {
        Rect {
            start: Position::new(a.row.min(b.row), a.col.min(b.col)),
            end: Position::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.end.row - self.start.row + 1, self.end.col - self.start.col + 1)
    }

    pub fn area(&self) -> usize {
        self.dimensions().area()
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.row >= self.start.row
            && pos.row <= self.end.row
            && pos.col >= self.start.col
            && pos.col <= self.end.col
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.contains(other.start) && self.contains(other.end)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    pub fn translate(&self, delta_row: i64, delta_col: i64) -> Option<Rect> {
        Some(Rect {
            start: self.start.offset(delta_row, delta_col)?,
            end: self.end.offset(delta_row, delta_col)?,
        })
    }

    /// True when the rectangle lies inside `[0, max_rows) x [0, max_cols)`.
    pub fn within_bounds(&self, max_rows: usize, max_cols: usize) -> bool {
        self.end.row < max_rows && self.end.col < max_cols
    }

    /// Every coordinate in the rectangle, row-major.
    pub fn cells(&self) -> impl Iterator<Item = Position> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |row| (self.start.col..=self.end.col).map(move |col| Position::new(row, col)))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}
