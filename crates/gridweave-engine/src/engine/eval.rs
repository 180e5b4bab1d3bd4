//! Formula parsing and evaluation.
//!
//! The formula language is deliberately small. A trimmed expression is tried
//! against these forms, in order:
//!
//! 1. numeric literal
//! 2. double-quoted string
//! 3. `FUNC(args…)` call (see [`crate::functions`])
//! 4. single cell reference (`A1`)
//! 5. range reference (`A1:B2`)
//! 6. table column reference (`table[col]` or `table["col name"]`)
//! 7. a structure referenced by its name
//! 8. arithmetic fallback
//!
//! The arithmetic fallback splits at the first top-level occurrence of `+`,
//! then `-`, then `*`, then `/` (checked in that order), keeping everything
//! after the split point as the right operand. There is no operator
//! precedence and no parenthesised grouping other than function-call syntax,
//! so `10-2-3` evaluates as `10-(2-3)`. Stored formulas rely on this
//! behaviour. A chain of one operator is split in a single step and folded
//! from the right, so long sums do not count against the nesting limit.
//!
//! `IF` evaluates its condition first and then only the selected branch.

use regex::Regex;
use std::sync::OnceLock;

use super::deps::Dependency;
use super::error::{FormulaError, Result};
use super::position::{Position, Rect};
use super::value::{FormulaValue, parse_numeric};
use crate::functions;

/// Largest range a single reference may expand to.
const MAX_RANGE_CELLS: usize = 1_000_000;

/// Recursion guard for nested calls.
const MAX_DEPTH: usize = 64;

/// Content of a structure looked up by name.
#[derive(Clone, Debug, PartialEq)]
pub enum NamedContent {
    /// A single value (a Cell).
    Scalar(String),
    /// Values of an Array or Table, row-major.
    List(Vec<String>),
    /// Something with no value form (a template instance).
    Opaque,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NamedStructure {
    pub id: String,
    pub content: NamedContent,
}

/// Read access to the document a formula is evaluated against.
pub trait FormulaContext {
    /// Visible text at a coordinate; empty when nothing is there.
    fn cell_value(&self, pos: Position) -> String;

    /// Look up a structure by its name.
    fn named_structure(&self, name: &str) -> Option<NamedStructure>;

    /// Values of a table column with header rows skipped.
    fn table_column(&self, table: &str, column: &str) -> Result<Vec<String>>;
}

/// Evaluates formula text against a [`FormulaContext`], recording the
/// dependencies touched by the most recent evaluation.
pub struct FormulaEngine<'a, C: FormulaContext + ?Sized> {
    context: &'a C,
    dependencies: Vec<Dependency>,
}

impl<'a, C: FormulaContext + ?Sized> FormulaEngine<'a, C> {
    pub fn new(context: &'a C) -> Self {
        FormulaEngine {
            context,
            dependencies: Vec::new(),
        }
    }

    /// Evaluate a formula, optionally prefixed with `=`.
    ///
    /// Never fails: every problem is returned as [`FormulaValue::Error`].
    /// Dependencies from any previous call are discarded first.
    pub fn evaluate_formula(&mut self, text: &str) -> FormulaValue {
        self.dependencies.clear();
        let trimmed = text.trim();
        let expr = trimmed.strip_prefix('=').unwrap_or(trimmed).trim();
        if expr.is_empty() {
            return FormulaValue::Empty;
        }
        match self.evaluate(expr, 0) {
            Ok(FormulaValue::Error(msg)) => FormulaValue::Error(msg),
            Ok(value) => value,
            Err(err) => FormulaValue::Error(err.to_string()),
        }
    }

    /// Dependencies discovered by the last [`evaluate_formula`](Self::evaluate_formula) call.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn take_dependencies(&mut self) -> Vec<Dependency> {
        std::mem::take(&mut self.dependencies)
    }

    fn record(&mut self, dep: Dependency) {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
    }

    fn evaluate(&mut self, expr: &str, depth: usize) -> Result<FormulaValue> {
        if depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep);
        }
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(FormulaError::Unparseable(String::new()));
        }

        if let Some(n) = parse_numeric(expr) {
            return Ok(FormulaValue::Number(n));
        }

        if let Some(caps) = string_re().captures(expr) {
            return Ok(FormulaValue::String(caps[1].to_string()));
        }

        if let Some((name, inner)) = split_call(expr) {
            return self.call(name, inner, depth);
        }

        if let Some(pos) = Position::from_a1(expr) {
            self.record(Dependency::cell(pos.row, pos.col));
            return Ok(FormulaValue::from_cell_text(&self.context.cell_value(pos)));
        }

        if let Some(caps) = range_re().captures(expr) {
            let start = Position::from_a1(&caps[1])
                .ok_or_else(|| FormulaError::InvalidReference(caps[1].to_string()))?;
            let end = Position::from_a1(&caps[2])
                .ok_or_else(|| FormulaError::InvalidReference(caps[2].to_string()))?;
            return self.range(start, end, expr);
        }

        if let Some(caps) = table_column_re().captures(expr) {
            let table = caps[1].trim().to_string();
            let column = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            self.record(Dependency::table_column(table.clone(), column.clone()));
            let values = self.context.table_column(&table, &column)?;
            return Ok(FormulaValue::Range(
                values.iter().map(|v| FormulaValue::from_cell_text(v)).collect(),
            ));
        }

        if let Some(named) = self.context.named_structure(expr) {
            self.record(Dependency::structure(named.id.clone()));
            return Ok(match named.content {
                NamedContent::Scalar(text) => FormulaValue::from_cell_text(&text),
                NamedContent::List(items) => {
                    FormulaValue::Range(items.iter().map(|v| FormulaValue::from_cell_text(v)).collect())
                }
                NamedContent::Opaque => FormulaValue::Reference(expr.to_string()),
            });
        }

        self.arithmetic(expr, depth)
    }

    fn call(&mut self, name: &str, inner: &str, depth: usize) -> Result<FormulaValue> {
        let builtin =
            functions::lookup(name).ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;
        let arg_texts = split_args(inner);
        if builtin.name == "IF" {
            return self.conditional(&arg_texts, depth);
        }
        let mut args = Vec::new();
        for arg in arg_texts {
            args.push(self.evaluate(arg, depth + 1)?);
        }
        builtin.apply(&args)
    }

    /// `IF(cond, a, b)`: an error in the branch not taken is never seen.
    fn conditional(&mut self, args: &[&str], depth: usize) -> Result<FormulaValue> {
        if !(2..=3).contains(&args.len()) {
            return Err(FormulaError::Arity {
                function: "IF",
                expected: "2 or 3",
                got: args.len(),
            });
        }
        let condition = self.evaluate(args[0], depth + 1)?;
        if let FormulaValue::Error(msg) = &condition {
            return Err(FormulaError::Propagated(msg.clone()));
        }
        if functions::is_truthy(&condition) {
            self.evaluate(args[1], depth + 1)
        } else {
            match args.get(2) {
                Some(branch) => self.evaluate(branch, depth + 1),
                None => Ok(FormulaValue::Boolean(false)),
            }
        }
    }

    fn range(&mut self, start: Position, end: Position, text: &str) -> Result<FormulaValue> {
        let rect = Rect::spanning(start, end);
        if rect.area() > MAX_RANGE_CELLS {
            return Err(FormulaError::InvalidReference(text.to_string()));
        }
        self.record(Dependency::range(rect.start, rect.end));
        let values = rect
            .cells()
            .map(|pos| FormulaValue::from_cell_text(&self.context.cell_value(pos)))
            .collect();
        Ok(FormulaValue::Range(values))
    }

    fn arithmetic(&mut self, expr: &str, depth: usize) -> Result<FormulaValue> {
        for op in ['+', '-', '*', '/'] {
            let parts = split_operator(expr, op);
            if parts.len() < 2 {
                continue;
            }
            let mut operands = Vec::with_capacity(parts.len());
            for part in parts {
                // No part contains `op`, so it falls through to a later operator.
                let value = self.evaluate(part, depth)?;
                operands.push(operand(&value)?);
            }
            return fold_right(op, &operands).map(FormulaValue::Number);
        }
        Err(FormulaError::Unparseable(expr.to_string()))
    }
}

/// `a op (b op (c op d))` for the operands of one split.
fn fold_right(op: char, operands: &[f64]) -> Result<f64> {
    let Some((&last, rest)) = operands.split_last() else {
        return Err(FormulaError::Unparseable(String::new()));
    };
    rest.iter().rev().try_fold(last, |right, &left| match op {
        '+' => Ok(left + right),
        '-' => Ok(left - right),
        '*' => Ok(left * right),
        _ if right == 0.0 => Err(FormulaError::DivisionByZero),
        _ => Ok(left / right),
    })
}

/// Coerce an arithmetic operand to a number.
fn operand(value: &FormulaValue) -> Result<f64> {
    match value {
        FormulaValue::Number(n) => Ok(*n),
        FormulaValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        FormulaValue::Empty => Ok(0.0),
        FormulaValue::String(s) => parse_numeric(s).ok_or_else(|| FormulaError::NotANumber(s.clone())),
        FormulaValue::Error(msg) => Err(FormulaError::Propagated(msg.clone())),
        FormulaValue::Range(items) if items.len() == 1 => operand(&items[0]),
        other => Err(FormulaError::NotANumber(other.to_display())),
    }
}

fn string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^"([^"]*)"$"#).expect("string literal regex must compile"))
}

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z]+[0-9]+)\s*:\s*([A-Za-z]+[0-9]+)$").expect("range regex must compile")
    })
}

fn table_column_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^([A-Za-z_][A-Za-z0-9_ ]*?)\s*\[\s*(?:"([^"]*)"|([^\]"]+))\s*\]$"#)
            .expect("table column regex must compile")
    })
}

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("call regex must compile"))
}

/// Split `NAME(inner)` when the opening parenthesis closes at the very end.
/// `SUM(A1,A2)+SUM(B1,B2)` is not a call; it falls through to arithmetic.
fn split_call(expr: &str) -> Option<(&str, &str)> {
    let caps = call_re().captures(expr)?;
    let name = caps.get(1)?.as_str();
    let open = caps.get(0)?.end() - 1;
    if !expr.ends_with(')') {
        return None;
    }
    let close = matching_paren(expr, open)?;
    if close != expr.len() - 1 {
        return None;
    }
    Some((name, &expr[open + 1..close]))
}

fn matching_paren(expr: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (idx, ch) in expr.char_indices().skip_while(|(i, _)| *i < open) {
        match ch {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split call arguments at top-level commas.
fn split_args(inner: &str) -> Vec<&str> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut start = 0;
    for (idx, ch) in inner.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '(' | '[' if !in_string => depth += 1,
            ')' | ']' if !in_string => depth -= 1,
            ',' if !in_string && depth == 0 => {
                args.push(&inner[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    args.push(&inner[start..]);
    args
}

/// Split `expr` at every top-level occurrence of `op`, outside strings,
/// calls and brackets. A `+`/`-` with no operand before it is a sign, and so
/// is one following the exponent marker of a number (`1e-5`).
fn split_operator(expr: &str, op: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut prev: Option<char> = None;
    let mut start = 0;
    for (idx, ch) in expr.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '(' | '[' if !in_string => depth += 1,
            ')' | ']' if !in_string => depth -= 1,
            c if c == op && !in_string && depth == 0 => {
                let is_sign = matches!(op, '+' | '-')
                    && (matches!(prev, None | Some('+' | '-' | '*' | '/' | '(' | ','))
                        || ends_in_exponent_marker(&expr[..idx]));
                if !is_sign {
                    parts.push(&expr[start..idx]);
                    start = idx + op.len_utf8();
                }
            }
            _ => {}
        }
        if !ch.is_whitespace() {
            prev = Some(ch);
        }
    }
    parts.push(&expr[start..]);
    parts
}

/// True when `before` ends with a numeric literal's mantissa and `e`/`E`.
/// `A1e` and `rate` are names, not numbers.
fn ends_in_exponent_marker(before: &str) -> bool {
    let Some(mantissa) = before.strip_suffix(['e', 'E']) else {
        return false;
    };
    let token_start = mantissa
        .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map_or(0, |i| i + 1);
    let token = &mantissa[token_start..];
    if !token.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    !mantissa[..token_start]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
}
