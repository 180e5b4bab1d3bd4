//! Formula evaluation errors.
//!
//! These never escape [`FormulaEngine::evaluate_formula`](super::FormulaEngine::evaluate_formula):
//! they are rendered into [`FormulaValue::Error`](super::FormulaValue::Error).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("{function} expects {expected} arguments, got {got}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Value is not a number: {0}")]
    NotANumber(String),

    #[error("{0} of an empty set of numbers")]
    EmptyNumericSet(&'static str),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("Unable to evaluate expression: {0}")]
    Unparseable(String),

    #[error("Formula is nested too deeply")]
    TooDeep,

    /// An operand already evaluated to an error; its message is propagated.
    #[error("{0}")]
    Propagated(String),
}

pub type Result<T> = std::result::Result<T, FormulaError>;
