//! PFields: composable, time-varying parameter values
//!
//! A [`PField`] yields a value for any sample index. Fields compose through
//! binary operators into expression trees; children are shared through
//! [`Handle`]s (`Arc`), so one sub-expression can feed many parents and
//! outlive any of them. Fields are immutable once built, which makes a
//! field unable to become its own ancestor: every tree is acyclic.

use crate::error::EngineError;
use crate::gen::FunctionTable;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Result of dividing by zero (and of `%` by a divisor that truncates to 0)
pub const DIVIDE_BY_ZERO_SENTINEL: f64 = 999999999999999999.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Plus,
    Minus,
    Mul,
    Div,
    /// Both operands truncated to integers first
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Plus => a + b,
            BinaryOp::Minus => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => {
                if b == 0.0 {
                    DIVIDE_BY_ZERO_SENTINEL
                } else {
                    a / b
                }
            }
            BinaryOp::Mod => match (a as i64).checked_rem(b as i64) {
                Some(r) => r as f64,
                None => DIVIDE_BY_ZERO_SENTINEL,
            },
            BinaryOp::Pow => a.powf(b),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
        }
    }
}

impl FromStr for BinaryOp {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" | "plus" => Ok(BinaryOp::Plus),
            "-" | "minus" => Ok(BinaryOp::Minus),
            "*" | "mul" => Ok(BinaryOp::Mul),
            "/" | "div" => Ok(BinaryOp::Div),
            "%" | "mod" => Ok(BinaryOp::Mod),
            "^" | "**" | "pow" => Ok(BinaryOp::Pow),
            other => Err(EngineError::InvalidOperator(other.to_owned())),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A gen table stretched over a number of frames
#[derive(Debug, Clone)]
pub struct TableField {
    table: Arc<FunctionTable>,
    frames: u64,
}

#[derive(Debug, Clone)]
pub enum PField {
    Const(f64),
    Table(TableField),
    Binary {
        left: Handle,
        right: Handle,
        op: BinaryOp,
    },
}

impl PField {
    pub fn constant(value: f64) -> Handle {
        Handle::new(PField::Const(value))
    }

    /// `frames` is the span the table is stretched across (at least 1)
    pub fn table(table: Arc<FunctionTable>, frames: u64) -> Handle {
        Handle::new(PField::Table(TableField {
            table,
            frames: frames.max(1),
        }))
    }

    pub fn binary(left: &Handle, right: &Handle, op: BinaryOp) -> Handle {
        Handle::new(PField::Binary {
            left: left.clone(),
            right: right.clone(),
            op,
        })
    }

    /// Value at sample `index`
    pub fn value_at(&self, index: u64) -> f64 {
        match self {
            PField::Const(v) => *v,
            PField::Table(field) => {
                let fraction = index as f64 / field.frames as f64;
                table_at_fraction(&field.table, fraction)
            }
            PField::Binary { left, right, op } => op.apply(left.value_at(index), right.value_at(index)),
        }
    }

    /// Value at a position in `[0, 1]` across the field's span
    pub fn value_at_fraction(&self, fraction: f64) -> f64 {
        match self {
            PField::Const(v) => *v,
            PField::Table(field) => table_at_fraction(&field.table, fraction),
            PField::Binary { left, right, op } => {
                op.apply(left.value_at_fraction(fraction), right.value_at_fraction(fraction))
            }
        }
    }

    /// Span in frames: 1 for constants, the longest child for operators
    pub fn len(&self) -> u64 {
        match self {
            PField::Const(_) => 1,
            PField::Table(field) => field.frames,
            PField::Binary { left, right, .. } => left.len().max(right.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// True if `other` appears anywhere in this tree (including as the root)
    pub fn contains(&self, other: &Handle) -> bool {
        if std::ptr::eq(self, other.as_ref()) {
            return true;
        }
        match self {
            PField::Binary { left, right, .. } => left.contains(other) || right.contains(other),
            _ => false,
        }
    }
}

/// Linear interpolation across the table; clamps outside `[0, 1]`
fn table_at_fraction(table: &FunctionTable, fraction: f64) -> f64 {
    let samples = table.samples();
    if samples.is_empty() {
        return 0.0;
    }
    let last = samples.len() - 1;
    let pos = fraction.clamp(0.0, 1.0) * last as f64;
    let i = (pos as usize).min(last);
    let next = (i + 1).min(last);
    let frac = pos - i as f64;
    samples[i] as f64 + (samples[next] as f64 - samples[i] as f64) * frac
}

/// Shared reference to a [`PField`]: clone to take a reference, drop to
/// release it
#[derive(Debug, Clone)]
pub struct Handle(Arc<PField>);

impl Handle {
    pub fn new(field: PField) -> Self {
        Handle(Arc::new(field))
    }

    /// Number of live references, including this one
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::ops::Deref for Handle {
    type Target = PField;

    fn deref(&self) -> &PField {
        &self.0
    }
}

impl AsRef<PField> for Handle {
    fn as_ref(&self) -> &PField {
        &self.0
    }
}

impl From<f64> for Handle {
    fn from(value: f64) -> Self {
        PField::constant(value)
    }
}
