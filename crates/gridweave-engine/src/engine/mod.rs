//! Formula engine API.
//!
//! This module provides the formula machinery shared by the document model:
//!
//! - [`Position`], [`Dimensions`], [`Rect`] - Grid coordinates (A1 notation ↔ row/col)
//! - [`FormulaValue`] - Typed evaluation results
//! - [`Dependency`] - References recorded while evaluating
//! - [`FormulaEngine`] / [`FormulaContext`] - Parse and evaluate formula text
//! - [`DependencyGraph`] - Reverse dependency index and calculation order
//! - [`detect_cycle`] - Circular dependency diagnostics

mod cycle;
mod deps;
mod error;
mod eval;
mod graph;
mod position;
mod value;

pub use cycle::detect_cycle;
pub use deps::{Dependency, cell_key, structure_key, table_column_key};
pub use error::{FormulaError, Result};
pub use eval::{FormulaContext, FormulaEngine, NamedContent, NamedStructure};
pub use graph::{CalculationOrder, Container, DependencyGraph, FormulaNode};
pub use position::{Dimensions, Position, Rect};
pub use value::{FormulaValue, ValueKind, format_number, parse_numeric};
