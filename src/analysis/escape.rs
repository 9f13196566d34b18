//! Escape query interface and a flow-insensitive local implementation.
//!
//! Effect refinement asks one question of escape analysis: can memory reachable
//! from a given value be observed after the function returns? The analysis itself is
//! pluggable through [`EscapeAnalyzer`]; [`LocalEscapeAnalyzer`] is a small
//! conservative implementation that makes the crate usable without an external one.
//!
//! Summaries of already compiled callees are reached through [`EscapeCache`], which
//! the shared code cache implements.

use crate::{
    ir::{Builtin, Callee, CalleeKey, Expr, IrCode, Stmt, Value},
    Result,
};

/// How far a value may escape, ordered from least to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum EscapeInfo {
    /// Never observable outside the function
    #[default]
    NoEscape,
    /// Visible to the caller only because it was passed in as an argument
    ArgEscape,
    /// Returned to the caller
    ReturnEscape,
    /// May be observed anywhere
    AllEscape,
}

impl EscapeInfo {
    /// Least upper bound.
    #[must_use]
    pub fn join(self, other: EscapeInfo) -> EscapeInfo {
        self.max(other)
    }

    /// Returns `true` if the value does not escape, disregarding the caller's own
    /// view of its arguments.
    #[must_use]
    pub fn is_local(self) -> bool {
        matches!(self, EscapeInfo::NoEscape | EscapeInfo::ArgEscape)
    }
}

/// Escape information of a compiled callee's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgEscapeSummary {
    /// Escape of each parameter, in order
    pub args: Vec<EscapeInfo>,
}

/// Escape information for every argument and statement of one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeState {
    args: Vec<EscapeInfo>,
    values: Vec<EscapeInfo>,
}

impl EscapeState {
    /// Creates a state where arguments are [`EscapeInfo::ArgEscape`] and statement
    /// results [`EscapeInfo::NoEscape`].
    #[must_use]
    pub fn new(nargs: usize, nvalues: usize) -> Self {
        Self {
            args: vec![EscapeInfo::ArgEscape; nargs],
            values: vec![EscapeInfo::NoEscape; nvalues],
        }
    }

    /// Returns the escape of `value`; constants never escape and anything unknown
    /// escapes everywhere.
    #[must_use]
    pub fn get(&self, value: &Value) -> EscapeInfo {
        match value {
            Value::Argument(n) => self.args.get(*n).copied().unwrap_or(EscapeInfo::AllEscape),
            Value::Ssa(idx) => self.values.get(*idx).copied().unwrap_or(EscapeInfo::AllEscape),
            Value::Literal(_) | Value::Undef => EscapeInfo::NoEscape,
            Value::Slot(_) => EscapeInfo::AllEscape,
        }
    }

    /// Raises the escape of `value` to at least `info`. Returns `true` on change.
    pub fn raise(&mut self, value: &Value, info: EscapeInfo) -> bool {
        let entry = match value {
            Value::Argument(n) => self.args.get_mut(*n),
            Value::Ssa(idx) => self.values.get_mut(*idx),
            _ => None,
        };
        match entry {
            Some(entry) if *entry < info => {
                *entry = info;
                true
            }
            _ => false,
        }
    }

    /// Returns the parameter summary for callers of this body.
    #[must_use]
    pub fn arg_summary(&self) -> ArgEscapeSummary {
        ArgEscapeSummary {
            args: self.args.clone(),
        }
    }
}

/// Lookup of callee escape summaries by key.
pub trait EscapeCache {
    /// Returns the summary of `key`, or `None` if the callee is unknown.
    fn arg_escapes(&self, key: &CalleeKey) -> Option<ArgEscapeSummary>;
}

/// An escape cache that knows no callee.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyEscapeCache;

impl EscapeCache for EmptyEscapeCache {
    fn arg_escapes(&self, _key: &CalleeKey) -> Option<ArgEscapeSummary> {
        None
    }
}

/// The escape query consumed by effect refinement.
pub trait EscapeAnalyzer: Send + Sync {
    /// Analyzes `ir`, whose first `nargs` arguments are the function's parameters.
    ///
    /// # Errors
    ///
    /// Implementations report their own failures as [`crate::Error::Transform`].
    fn analyze_escapes(
        &self,
        ir: &IrCode,
        nargs: usize,
        cache: &dyn EscapeCache,
    ) -> Result<EscapeState>;
}

/// Flow-insensitive escape analysis over a single body.
///
/// Escape flows backward from uses to operands until a fixpoint: a returned value
/// is [`EscapeInfo::ReturnEscape`]; values stored into allocations, tuples and phis
/// inherit the escape of the container; anything handed to unknown code escapes
/// everywhere. Statically resolved callees are consulted through the cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEscapeAnalyzer;

impl EscapeAnalyzer for LocalEscapeAnalyzer {
    fn analyze_escapes(
        &self,
        ir: &IrCode,
        nargs: usize,
        cache: &dyn EscapeCache,
    ) -> Result<EscapeState> {
        ir.ensure_compacted()?;
        let mut state = EscapeState::new(nargs, ir.len());
        loop {
            let mut changed = false;
            for (idx, stmt) in ir.stmts.stmts.iter().enumerate() {
                let own = state.get(&Value::Ssa(idx));
                changed |= propagate(ir, stmt, own, &mut state, cache);
            }
            if !changed {
                break;
            }
        }
        Ok(state)
    }
}

fn propagate(
    ir: &IrCode,
    stmt: &Stmt,
    own: EscapeInfo,
    state: &mut EscapeState,
    cache: &dyn EscapeCache,
) -> bool {
    let mut changed = false;
    match stmt {
        Stmt::Return(Some(value)) => changed |= state.raise(value, EscapeInfo::ReturnEscape),
        Stmt::Phi(phi) => {
            for value in &phi.values {
                changed |= state.raise(value, own);
            }
        }
        Stmt::GlobalStore { value, .. } => {
            value.for_each_operand(|v| changed |= state.raise(v, EscapeInfo::AllEscape));
        }
        Stmt::Expr(expr) => changed |= propagate_expr(ir, expr, own, state, cache),
        _ => {}
    }
    changed
}

fn propagate_expr(
    ir: &IrCode,
    expr: &Expr,
    own: EscapeInfo,
    state: &mut EscapeState,
    cache: &dyn EscapeCache,
) -> bool {
    let mut changed = false;
    match expr {
        Expr::Value(v) => changed |= state.raise(v, own),
        Expr::New { args, .. } => changed |= raise_all(state, args, own),
        Expr::Call {
            callee: Callee::Builtin(builtin),
            args,
        } => match builtin {
            Builtin::Tuple | Builtin::Svec => changed |= raise_all(state, args, own),
            Builtin::Getfield | Builtin::Typeassert => {
                changed |= raise_all(state, &args[..args.len().min(1)], own);
            }
            Builtin::Ifelse => {
                changed |= raise_all(state, &args[args.len().min(1)..], own);
            }
            Builtin::Setfield | Builtin::Modifyfield => {
                let container = args.first().map_or(EscapeInfo::AllEscape, |obj| {
                    if is_local_allocation(ir, obj) {
                        state.get(obj)
                    } else {
                        EscapeInfo::AllEscape
                    }
                });
                changed |= raise_all(state, &args[args.len().min(2)..], container);
            }
            Builtin::Egal | Builtin::Isa | Builtin::Typeof | Builtin::Nfields => {}
            _ => changed |= raise_all(state, args, EscapeInfo::AllEscape),
        },
        Expr::Call {
            callee: Callee::Intrinsic(intrinsic),
            args,
        } => {
            if intrinsic.reads_memory() || intrinsic.writes_memory() {
                changed |= raise_all(state, args, EscapeInfo::AllEscape);
            }
        }
        Expr::Call { .. } | Expr::Foreign { .. } => {
            expr.for_each_operand(|v| changed |= state.raise(v, EscapeInfo::AllEscape));
        }
        Expr::Invoke { target, args } => {
            let summary = cache.arg_escapes(target);
            for (i, arg) in args.iter().enumerate() {
                let param = summary
                    .as_ref()
                    .and_then(|s| s.args.get(i).copied())
                    .unwrap_or(EscapeInfo::AllEscape);
                changed |= match param {
                    EscapeInfo::NoEscape | EscapeInfo::ArgEscape => false,
                    EscapeInfo::ReturnEscape => state.raise(arg, own),
                    EscapeInfo::AllEscape => state.raise(arg, EscapeInfo::AllEscape),
                };
            }
        }
        Expr::Boundscheck { .. }
        | Expr::IsDefined(_)
        | Expr::ThrowUndefIfNot { .. }
        | Expr::TheException => {}
    }
    changed
}

fn raise_all(state: &mut EscapeState, values: &[Value], info: EscapeInfo) -> bool {
    values.iter().fold(false, |acc, v| state.raise(v, info) | acc)
}

fn is_local_allocation(ir: &IrCode, value: &Value) -> bool {
    matches!(
        value.as_ssa().and_then(|idx| ir.stmt(idx)),
        Some(Stmt::Expr(Expr::New { .. }))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        Cfg, Instruction, InstructionStream, IrType, StmtFlags, StmtRange, StructType,
    };

    fn straight_line(stmts: Vec<Stmt>, nargs: usize) -> IrCode {
        let n = stmts.len();
        let stream: InstructionStream = stmts
            .into_iter()
            .map(|s| Instruction::new(s, IrType::Any, 0, StmtFlags::empty()))
            .collect();
        let cfg = Cfg::from_block_ranges(vec![StmtRange::new(0, n)], &stream.stmts).expect("cfg");
        IrCode::new(stream, cfg, vec![IrType::Any; nargs])
    }

    fn boxed() -> IrType {
        IrType::Struct(StructType::new("Box", true, vec![("x", IrType::Any)]))
    }

    #[test]
    fn test_unreturned_allocation_stays_local() {
        let ir = straight_line(
            vec![
                Stmt::Expr(Expr::New {
                    ty: boxed(),
                    args: vec![Value::Argument(0)],
                }),
                Stmt::Expr(Expr::builtin(
                    Builtin::Getfield,
                    vec![Value::Ssa(0), Value::int(0)],
                )),
                Stmt::Return(Some(Value::nothing())),
            ],
            1,
        );
        let state = LocalEscapeAnalyzer
            .analyze_escapes(&ir, 1, &EmptyEscapeCache)
            .expect("analysis");
        assert_eq!(state.get(&Value::Ssa(0)), EscapeInfo::NoEscape);
        assert!(state.get(&Value::Argument(0)).is_local());
    }

    #[test]
    fn test_returned_allocation_escapes_its_fields() {
        let ir = straight_line(
            vec![
                Stmt::Expr(Expr::New {
                    ty: boxed(),
                    args: vec![Value::Argument(0)],
                }),
                Stmt::Return(Some(Value::Ssa(0))),
            ],
            1,
        );
        let state = LocalEscapeAnalyzer
            .analyze_escapes(&ir, 1, &EmptyEscapeCache)
            .expect("analysis");
        assert_eq!(state.get(&Value::Ssa(0)), EscapeInfo::ReturnEscape);
        assert_eq!(state.get(&Value::Argument(0)), EscapeInfo::ReturnEscape);
        assert_eq!(
            state.arg_summary().args,
            vec![EscapeInfo::ReturnEscape]
        );
    }

    struct OneCallee;

    impl EscapeCache for OneCallee {
        fn arg_escapes(&self, key: &CalleeKey) -> Option<ArgEscapeSummary> {
            (key.as_str() == "inspect").then(|| ArgEscapeSummary {
                args: vec![EscapeInfo::ArgEscape],
            })
        }
    }

    #[test]
    fn test_invoke_consults_cache() {
        let invoke = |name: &str| {
            Stmt::Expr(Expr::Invoke {
                target: CalleeKey::new(name),
                args: vec![Value::Ssa(0)],
            })
        };
        let ir = straight_line(
            vec![
                Stmt::Expr(Expr::New {
                    ty: boxed(),
                    args: vec![Value::nothing()],
                }),
                invoke("inspect"),
                Stmt::Return(None),
            ],
            0,
        );
        let state = LocalEscapeAnalyzer.analyze_escapes(&ir, 0, &OneCallee).expect("analysis");
        assert_eq!(state.get(&Value::Ssa(0)), EscapeInfo::NoEscape);

        let ir = straight_line(
            vec![
                Stmt::Expr(Expr::New {
                    ty: boxed(),
                    args: vec![Value::nothing()],
                }),
                invoke("unknown"),
                Stmt::Return(None),
            ],
            0,
        );
        let state = LocalEscapeAnalyzer.analyze_escapes(&ir, 0, &OneCallee).expect("analysis");
        assert_eq!(state.get(&Value::Ssa(0)), EscapeInfo::AllEscape);
    }

    #[test]
    fn test_store_into_argument_escapes() {
        let ir = straight_line(
            vec![
                Stmt::Expr(Expr::New {
                    ty: boxed(),
                    args: vec![Value::nothing()],
                }),
                Stmt::Expr(Expr::builtin(
                    Builtin::Setfield,
                    vec![Value::Argument(0), Value::int(0), Value::Ssa(0)],
                )),
                Stmt::Return(None),
            ],
            1,
        );
        let state = LocalEscapeAnalyzer
            .analyze_escapes(&ir, 1, &EmptyEscapeCache)
            .expect("analysis");
        assert_eq!(state.get(&Value::Ssa(0)), EscapeInfo::AllEscape);
        assert_eq!(EscapeInfo::NoEscape.join(EscapeInfo::ReturnEscape), EscapeInfo::ReturnEscape);
    }
}
