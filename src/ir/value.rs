//! SSA value identities.

use std::fmt;

use crate::ir::Literal;

/// An operand of an IR statement.
///
/// Statement results are named by the index of the defining statement, so an
/// `Ssa(i)` operand refers to whatever statement `i` computes. While a body has
/// pending insertions, indices at or beyond the statement count refer to the pending
/// nodes in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A function parameter (0-based)
    Argument(usize),
    /// The result of the statement at this index
    Ssa(usize),
    /// A constant
    Literal(Literal),
    /// A mutable local variable; only valid before SSA construction
    Slot(usize),
    /// A value that is statically undefined on every path reaching its use
    Undef,
}

impl Value {
    /// The `nothing` constant.
    #[must_use]
    pub const fn nothing() -> Self {
        Value::Literal(Literal::Nothing)
    }

    /// A boolean constant.
    #[must_use]
    pub const fn bool(b: bool) -> Self {
        Value::Literal(Literal::Bool(b))
    }

    /// An integer constant.
    #[must_use]
    pub const fn int(i: i64) -> Self {
        Value::Literal(Literal::Int(i))
    }

    /// Returns the statement index if this is an SSA reference.
    #[must_use]
    pub const fn as_ssa(&self) -> Option<usize> {
        match self {
            Value::Ssa(idx) => Some(*idx),
            _ => None,
        }
    }

    /// Returns the slot number if this is a slot reference.
    #[must_use]
    pub const fn as_slot(&self) -> Option<usize> {
        match self {
            Value::Slot(slot) => Some(*slot),
            _ => None,
        }
    }

    /// Returns `true` for the boolean constant `b`.
    #[must_use]
    pub fn is_bool(&self, b: bool) -> bool {
        matches!(self, Value::Literal(Literal::Bool(x)) if *x == b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Argument(n) => write!(f, "_{n}"),
            Value::Ssa(idx) => write!(f, "%{idx}"),
            Value::Literal(lit) => write!(f, "{lit}"),
            Value::Slot(n) => write!(f, "@slot{n}"),
            Value::Undef => write!(f, "#undef"),
        }
    }
}

impl From<Literal> for Value {
    fn from(lit: Literal) -> Self {
        Value::Literal(lit)
    }
}
