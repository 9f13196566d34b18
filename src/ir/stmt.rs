//! Statements and expressions of the instruction stream.
//!
//! A [`Stmt`] is one entry of the instruction stream. Control transfer targets are
//! statement indices before structural conversion and block indices afterwards; phi
//! edges follow the same rule. Expressions ([`Expr`]) are the value-producing
//! right-hand sides.

use std::{fmt, sync::Arc};

use crate::ir::{Builtin, Intrinsic, IrType, Value};

/// Key identifying a compiled callee in the code cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CalleeKey(pub Arc<str>);

impl CalleeKey {
    /// Creates a key from a name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        CalleeKey(Arc::from(name))
    }

    /// Returns the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CalleeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CalleeKey {
    fn from(name: &str) -> Self {
        CalleeKey::new(name)
    }
}

/// The function being called by an [`Expr::Call`].
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// A leaf primitive
    Intrinsic(Intrinsic),
    /// A runtime builtin
    Builtin(Builtin),
    /// An ordinary function resolved at run time by name
    Generic(Arc<str>),
    /// Dynamic dispatch through a function value
    Dynamic(Value),
}

impl fmt::Display for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Intrinsic(i) => write!(f, "Intrinsics.{i}"),
            Callee::Builtin(b) => write!(f, "Core.{b}"),
            Callee::Generic(name) => write!(f, "{name}"),
            Callee::Dynamic(v) => write!(f, "{v}"),
        }
    }
}

/// A value-producing expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A plain operand
    Value(Value),
    /// A call resolved at run time
    Call {
        /// The function
        callee: Callee,
        /// Arguments, excluding the callee
        args: Vec<Value>,
    },
    /// A statically resolved call to a compiled callee
    Invoke {
        /// The resolved callee
        target: CalleeKey,
        /// Arguments
        args: Vec<Value>,
    },
    /// A call into foreign code
    Foreign {
        /// The foreign symbol
        name: Arc<str>,
        /// Arguments
        args: Vec<Value>,
    },
    /// Allocation of a new object of type `ty` from field values
    New {
        /// The allocated type
        ty: IrType,
        /// Field values, in declaration order
        args: Vec<Value>,
    },
    /// Whether bounds checking is enabled at this point; `inbounds` is `true` once the
    /// surrounding context has explicitly disabled checking
    Boundscheck {
        /// Bounds checking has been explicitly disabled
        inbounds: bool,
    },
    /// Whether a slot holds a value; only valid before SSA construction
    IsDefined(usize),
    /// Raise an undefined-variable error naming `slot` unless `cond` is true
    ThrowUndefIfNot {
        /// The undefined slot
        slot: usize,
        /// Definedness condition
        cond: Value,
    },
    /// The exception currently being handled
    TheException,
}

impl Expr {
    /// Creates a call to a builtin.
    #[must_use]
    pub fn builtin(builtin: Builtin, args: Vec<Value>) -> Self {
        Expr::Call {
            callee: Callee::Builtin(builtin),
            args,
        }
    }

    /// Creates a call to an intrinsic.
    #[must_use]
    pub fn intrinsic(intrinsic: Intrinsic, args: Vec<Value>) -> Self {
        Expr::Call {
            callee: Callee::Intrinsic(intrinsic),
            args,
        }
    }

    /// Creates a call to an ordinary function.
    #[must_use]
    pub fn generic(name: &str, args: Vec<Value>) -> Self {
        Expr::Call {
            callee: Callee::Generic(Arc::from(name)),
            args,
        }
    }

    /// Returns the builtin this expression calls, if any.
    #[must_use]
    pub fn called_builtin(&self) -> Option<Builtin> {
        match self {
            Expr::Call {
                callee: Callee::Builtin(b),
                ..
            } => Some(*b),
            _ => None,
        }
    }

    /// Returns `true` if this is a call to `builtin`.
    #[must_use]
    pub fn is_call_to(&self, builtin: Builtin) -> bool {
        self.called_builtin() == Some(builtin)
    }

    /// Returns the argument list of call-like expressions.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        match self {
            Expr::Call { args, .. }
            | Expr::Invoke { args, .. }
            | Expr::Foreign { args, .. }
            | Expr::New { args, .. } => args,
            _ => &[],
        }
    }

    /// Calls `f` on every value operand, including a dynamic callee.
    pub fn for_each_operand(&self, mut f: impl FnMut(&Value)) {
        match self {
            Expr::Value(v) => f(v),
            Expr::Call { callee, args } => {
                if let Callee::Dynamic(v) = callee {
                    f(v);
                }
                args.iter().for_each(f);
            }
            Expr::Invoke { args, .. } | Expr::Foreign { args, .. } | Expr::New { args, .. } => {
                args.iter().for_each(f);
            }
            Expr::ThrowUndefIfNot { cond, .. } => f(cond),
            Expr::Boundscheck { .. } | Expr::IsDefined(_) | Expr::TheException => {}
        }
    }

    /// Calls `f` on every value operand, mutably.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        match self {
            Expr::Value(v) => f(v),
            Expr::Call { callee, args } => {
                if let Callee::Dynamic(v) = callee {
                    f(v);
                }
                args.iter_mut().for_each(f);
            }
            Expr::Invoke { args, .. } | Expr::Foreign { args, .. } | Expr::New { args, .. } => {
                args.iter_mut().for_each(f);
            }
            Expr::ThrowUndefIfNot { cond, .. } => f(cond),
            Expr::Boundscheck { .. } | Expr::IsDefined(_) | Expr::TheException => {}
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Value]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Value(v) => write!(f, "{v}"),
            Expr::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::Invoke { target, args } => {
                write!(f, "invoke {target}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::Foreign { name, args } => {
                write!(f, "foreigncall :{name}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::New { ty, args } => {
                write!(f, "new {ty}(")?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::Boundscheck { inbounds } => {
                if *inbounds {
                    write!(f, "boundscheck(false)")
                } else {
                    write!(f, "boundscheck")
                }
            }
            Expr::IsDefined(slot) => write!(f, "isdefined(@slot{slot})"),
            Expr::ThrowUndefIfNot { slot, cond } => {
                write!(f, "throw_undef_if_not(@slot{slot}, {cond})")
            }
            Expr::TheException => write!(f, "the_exception"),
        }
    }
}

/// A merge of values flowing in along different predecessor edges.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhiNode {
    /// Predecessor of each incoming edge
    pub edges: Vec<usize>,
    /// Value arriving along the edge at the same position
    pub values: Vec<Value>,
}

impl PhiNode {
    /// Creates an empty phi.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an incoming edge.
    pub fn push(&mut self, edge: usize, value: Value) {
        self.edges.push(edge);
        self.values.push(value);
    }

    /// Returns the number of incoming edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if the phi has no incoming edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Returns the value arriving from `edge`.
    #[must_use]
    pub fn value_for(&self, edge: usize) -> Option<&Value> {
        self.edges
            .iter()
            .position(|&e| e == edge)
            .map(|i| &self.values[i])
    }

    /// Removes every incoming edge for which `keep` returns `false`.
    pub fn retain_edges(&mut self, mut keep: impl FnMut(usize) -> bool) {
        let mut i = 0;
        while i < self.edges.len() {
            if keep(self.edges[i]) {
                i += 1;
            } else {
                self.edges.remove(i);
                self.values.remove(i);
            }
        }
    }
}

/// Function-level annotations that carry no run-time semantics.
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
    /// Loop optimization hints
    LoopInfo,
    /// Start (`true`) or end (`false`) of an inbounds region
    Inbounds(bool),
    /// Any other named hint
    Hint(Arc<str>),
}

/// One entry of the instruction stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// No operation
    Nop,
    /// Evaluate an expression; the statement's value is its result
    Expr(Expr),
    /// Assign to a slot; only valid before SSA construction
    SlotStore {
        /// Target slot
        slot: usize,
        /// Assigned value
        value: Expr,
    },
    /// Assign to a global binding
    GlobalStore {
        /// Binding name
        binding: Arc<str>,
        /// Assigned value
        value: Expr,
    },
    /// Mark a slot as freshly undefined; only valid before SSA construction
    NewVar(usize),
    /// Unconditional jump
    Goto(usize),
    /// Jump to `dest` unless `cond` is true, else fall through
    GotoIfNot {
        /// Branch condition
        cond: Value,
        /// Target when the condition is false
        dest: usize,
    },
    /// Return a value; `None` marks an unreachable point
    Return(Option<Value>),
    /// Phi node
    Phi(PhiNode),
    /// Enter an exception handling region
    Enter {
        /// Handler entered when the region throws
        catch_dest: usize,
    },
    /// Leave an exception handling region
    Leave,
    /// Code coverage marker
    Coverage,
    /// Function-level annotation
    Meta(Meta),
}

impl Stmt {
    /// The explicit unreachable marker.
    pub const UNREACHABLE: Stmt = Stmt::Return(None);

    /// Returns `true` for statements that end a basic block.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            Stmt::Goto(_) | Stmt::GotoIfNot { .. } | Stmt::Return(_) | Stmt::Enter { .. }
        )
    }

    /// Returns `true` for the explicit unreachable marker.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Stmt::Return(None))
    }

    /// Returns the expression evaluated by this statement, if any.
    #[must_use]
    pub fn expr(&self) -> Option<&Expr> {
        match self {
            Stmt::Expr(e) | Stmt::SlotStore { value: e, .. } | Stmt::GlobalStore { value: e, .. } => {
                Some(e)
            }
            _ => None,
        }
    }

    /// Returns the phi node if this is one.
    #[must_use]
    pub fn as_phi(&self) -> Option<&PhiNode> {
        match self {
            Stmt::Phi(phi) => Some(phi),
            _ => None,
        }
    }

    /// Calls `f` on every value operand.
    pub fn for_each_operand(&self, mut f: impl FnMut(&Value)) {
        match self {
            Stmt::Expr(e) | Stmt::SlotStore { value: e, .. } | Stmt::GlobalStore { value: e, .. } => {
                e.for_each_operand(f);
            }
            Stmt::GotoIfNot { cond, .. } => f(cond),
            Stmt::Return(Some(v)) => f(v),
            Stmt::Phi(phi) => phi.values.iter().for_each(f),
            Stmt::Nop
            | Stmt::NewVar(_)
            | Stmt::Goto(_)
            | Stmt::Return(None)
            | Stmt::Enter { .. }
            | Stmt::Leave
            | Stmt::Coverage
            | Stmt::Meta(_) => {}
        }
    }

    /// Calls `f` on every value operand, mutably.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        match self {
            Stmt::Expr(e) | Stmt::SlotStore { value: e, .. } | Stmt::GlobalStore { value: e, .. } => {
                e.for_each_operand_mut(f);
            }
            Stmt::GotoIfNot { cond, .. } => f(cond),
            Stmt::Return(Some(v)) => f(v),
            Stmt::Phi(phi) => phi.values.iter_mut().for_each(f),
            Stmt::Nop
            | Stmt::NewVar(_)
            | Stmt::Goto(_)
            | Stmt::Return(None)
            | Stmt::Enter { .. }
            | Stmt::Leave
            | Stmt::Coverage
            | Stmt::Meta(_) => {}
        }
    }

    /// Collects the statement indices referenced by SSA operands.
    #[must_use]
    pub fn ssa_uses(&self) -> Vec<usize> {
        let mut uses = Vec::new();
        self.for_each_operand(|v| {
            if let Value::Ssa(idx) = v {
                uses.push(*idx);
            }
        });
        uses
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}

impl From<Expr> for Stmt {
    fn from(expr: Expr) -> Self {
        Stmt::Expr(expr)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Nop => write!(f, "nothing"),
            Stmt::Expr(e) => write!(f, "{e}"),
            Stmt::SlotStore { slot, value } => write!(f, "@slot{slot} = {value}"),
            Stmt::GlobalStore { binding, value } => write!(f, "global {binding} = {value}"),
            Stmt::NewVar(slot) => write!(f, "newvar @slot{slot}"),
            Stmt::Goto(target) => write!(f, "goto #{target}"),
            Stmt::GotoIfNot { cond, dest } => write!(f, "goto #{dest} if not {cond}"),
            Stmt::Return(Some(v)) => write!(f, "return {v}"),
            Stmt::Return(None) => write!(f, "unreachable"),
            Stmt::Phi(phi) => {
                write!(f, "φ (")?;
                for (i, (edge, value)) in phi.edges.iter().zip(&phi.values).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "#{edge} => {value}")?;
                }
                write!(f, ")")
            }
            Stmt::Enter { catch_dest } => write!(f, "enter #{catch_dest}"),
            Stmt::Leave => write!(f, "leave"),
            Stmt::Coverage => write!(f, "code_coverage_effect"),
            Stmt::Meta(meta) => write!(f, "meta {meta:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operands_include_dynamic_callee() {
        let stmt = Stmt::Expr(Expr::Call {
            callee: Callee::Dynamic(Value::Ssa(0)),
            args: vec![Value::Argument(1), Value::int(2), Value::Ssa(3)],
        });
        assert_eq!(stmt.ssa_uses(), vec![0, 3]);
    }

    #[test]
    fn test_operands_mut_rewrites_phi_values() {
        let mut phi = PhiNode::new();
        phi.push(1, Value::Ssa(2));
        phi.push(2, Value::Ssa(4));
        let mut stmt = Stmt::Phi(phi);
        stmt.for_each_operand_mut(|v| {
            if let Value::Ssa(idx) = v {
                *idx += 10;
            }
        });
        assert_eq!(stmt.ssa_uses(), vec![12, 14]);
    }

    #[test]
    fn test_phi_retain_edges() {
        let mut phi = PhiNode::new();
        phi.push(0, Value::int(1));
        phi.push(1, Value::int(2));
        phi.push(2, Value::int(3));
        phi.retain_edges(|e| e != 1);
        assert_eq!(phi.edges, vec![0, 2]);
        assert_eq!(phi.value_for(2), Some(&Value::int(3)));
        assert_eq!(phi.value_for(1), None);
    }

    #[test]
    fn test_terminators() {
        assert!(Stmt::Goto(1).is_terminator());
        assert!(Stmt::UNREACHABLE.is_terminator());
        assert!(Stmt::UNREACHABLE.is_unreachable());
        assert!(!Stmt::Nop.is_terminator());
        assert!(Stmt::Enter { catch_dest: 3 }.is_terminator());
    }

    #[test]
    fn test_display() {
        let stmt = Stmt::Expr(Expr::builtin(
            Builtin::Getfield,
            vec![Value::Argument(0), Value::int(1)],
        ));
        assert_eq!(stmt.to_string(), "Core.getfield(_0, 1)");
        assert_eq!(
            Stmt::GotoIfNot {
                cond: Value::Ssa(1),
                dest: 3
            }
            .to_string(),
            "goto #3 if not %1"
        );
    }
}
