//! Typed formula results and their display form.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// The kind tag of a [`FormulaValue`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueKind {
    Number,
    Boolean,
    String,
    Error,
    Empty,
    Reference,
    Range,
}

/// Result of evaluating a formula.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "UPPERCASE")]
pub enum FormulaValue {
    Number(f64),
    Boolean(bool),
    String(String),
    Error(String),
    Empty,
    /// A structure referenced by name whose content has no scalar/list form.
    Reference(String),
    /// Flattened (row-major) values of a range, array, table or table column.
    Range(Vec<FormulaValue>),
}

impl FormulaValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            FormulaValue::Number(_) => ValueKind::Number,
            FormulaValue::Boolean(_) => ValueKind::Boolean,
            FormulaValue::String(_) => ValueKind::String,
            FormulaValue::Error(_) => ValueKind::Error,
            FormulaValue::Empty => ValueKind::Empty,
            FormulaValue::Reference(_) => ValueKind::Reference,
            FormulaValue::Range(_) => ValueKind::Range,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    /// Interpret stored cell text: missing/blank is empty, numeric-looking
    /// text is a number, anything else is a string.
    pub fn from_cell_text(text: &str) -> FormulaValue {
        if text.is_empty() {
            return FormulaValue::Empty;
        }
        match parse_numeric(text) {
            Some(n) => FormulaValue::Number(n),
            None => FormulaValue::String(text.to_string()),
        }
    }

    /// Numeric content used by aggregates: numbers and parseable strings.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::String(s) => parse_numeric(s),
            _ => None,
        }
    }

    /// Text written back into a cell's `value`.
    pub fn to_display(&self) -> String {
        match self {
            FormulaValue::Number(n) => format_number(*n),
            FormulaValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Error(msg) => format!("#ERROR: {}", msg),
            FormulaValue::Empty => String::new(),
            FormulaValue::Reference(name) => name.clone(),
            FormulaValue::Range(items) => items
                .iter()
                .map(FormulaValue::to_display)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

fn numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("numeric regex must compile")
    })
}

/// Parse numeric-looking text. Rejects `inf`, `NaN` and other forms
/// `f64::from_str` would otherwise accept.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if !numeric_re().is_match(trimmed) {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Format a number for display.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "#NAN!".to_string()
    } else if n.is_infinite() {
        "#INF!".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}
