//! Built-in spreadsheet functions and their metadata.
//!
//! Conventions:
//! - Spreadsheet-facing built-in names are ALL CAPS (e.g. `SUM`, `AVERAGE`).
//! - Lookup is case-insensitive; the evaluator upper-cases the call name.
//! - If you add a new built-in, add its entry to `BUILTINS`; nothing else
//!   needs registering.

use crate::engine::{FormulaError, FormulaValue, Result};

pub struct Builtin {
    pub name: &'static str,
    #[allow(dead_code)]
    pub description: &'static str,
    apply: fn(&[FormulaValue]) -> Result<FormulaValue>,
}

impl Builtin {
    pub fn apply(&self, args: &[FormulaValue]) -> Result<FormulaValue> {
        (self.apply)(args)
    }
}

pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "SUM",
        description: "Sum of numeric values",
        apply: sum,
    },
    Builtin {
        name: "AVERAGE",
        description: "Average of numeric values",
        apply: average,
    },
    Builtin {
        name: "COUNT",
        description: "Count of numeric values",
        apply: count,
    },
    Builtin {
        name: "MAX",
        description: "Largest numeric value",
        apply: max,
    },
    Builtin {
        name: "MIN",
        description: "Smallest numeric value",
        apply: min,
    },
    Builtin {
        name: "IF",
        description: "IF(condition, when_true, when_false)",
        apply: if_fn,
    },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    let upper = name.to_ascii_uppercase();
    BUILTINS.iter().find(|b| b.name == upper)
}

/// Flatten the numeric content of all arguments: numbers, numeric strings and
/// the numeric members of ranges. Errors anywhere are propagated.
fn collect_numbers(args: &[FormulaValue]) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Error(msg) => return Err(FormulaError::Propagated(msg.clone())),
            FormulaValue::Range(items) => {
                for item in items {
                    if let FormulaValue::Error(msg) = item {
                        return Err(FormulaError::Propagated(msg.clone()));
                    }
                    if let Some(n) = item.as_number() {
                        out.push(n);
                    }
                }
            }
            other => {
                if let Some(n) = other.as_number() {
                    out.push(n);
                }
            }
        }
    }
    Ok(out)
}

fn sum(args: &[FormulaValue]) -> Result<FormulaValue> {
    let nums = collect_numbers(args)?;
    Ok(FormulaValue::Number(nums.iter().sum()))
}

fn average(args: &[FormulaValue]) -> Result<FormulaValue> {
    let nums = collect_numbers(args)?;
    if nums.is_empty() {
        return Err(FormulaError::EmptyNumericSet("AVERAGE"));
    }
    Ok(FormulaValue::Number(nums.iter().sum::<f64>() / nums.len() as f64))
}

fn count(args: &[FormulaValue]) -> Result<FormulaValue> {
    let nums = collect_numbers(args)?;
    Ok(FormulaValue::Number(nums.len() as f64))
}

fn max(args: &[FormulaValue]) -> Result<FormulaValue> {
    collect_numbers(args)?
        .into_iter()
        .reduce(f64::max)
        .map(FormulaValue::Number)
        .ok_or(FormulaError::EmptyNumericSet("MAX"))
}

fn min(args: &[FormulaValue]) -> Result<FormulaValue> {
    collect_numbers(args)?
        .into_iter()
        .reduce(f64::min)
        .map(FormulaValue::Number)
        .ok_or(FormulaError::EmptyNumericSet("MIN"))
}

/// Truthiness used by `IF`: non-zero numbers, booleans as-is, and the string
/// `"true"` (any case). Everything else is false.
pub fn is_truthy(value: &FormulaValue) -> bool {
    match value {
        FormulaValue::Number(n) => *n != 0.0,
        FormulaValue::Boolean(b) => *b,
        FormulaValue::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn if_fn(args: &[FormulaValue]) -> Result<FormulaValue> {
    if args.len() < 2 || args.len() > 3 {
        return Err(FormulaError::Arity {
            function: "IF",
            expected: "2 or 3",
            got: args.len(),
        });
    }
    if let FormulaValue::Error(msg) = &args[0] {
        return Err(FormulaError::Propagated(msg.clone()));
    }
    if is_truthy(&args[0]) {
        Ok(args[1].clone())
    } else {
        Ok(args.get(2).cloned().unwrap_or(FormulaValue::Boolean(false)))
    }
}
