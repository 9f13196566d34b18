//! Per-statement effect classification.
//!
//! [`stmt_effect_flags`] derives the `(consistent, removable, nothrow)` triple of a
//! statement from its shape and operand types. It is how flags are computed for
//! statements the optimizer creates itself, where inference never ran.

use crate::{
    effects::{Effects, MemoryScope},
    ir::{Builtin, Callee, Expr, Intrinsic, IrType, Literal, Stmt, StmtFlags, Value, ValueTypes},
    Result,
};

/// Classifies a statement as `(consistent, removable, nothrow)`.
///
/// `removable` means effect-free and nothrow: an unused result may be deleted.
/// `rt` is the statement's inferred type.
///
/// # Errors
///
/// Propagates operand lookup failures, such as a slot in a slot-free body.
pub fn stmt_effect_flags(
    stmt: &Stmt,
    rt: &IrType,
    env: &impl ValueTypes,
) -> Result<(bool, bool, bool)> {
    match stmt {
        Stmt::Nop | Stmt::Phi(_) | Stmt::NewVar(_) | Stmt::Meta(_) => Ok((true, true, true)),
        Stmt::Return(_) | Stmt::Enter { .. } | Stmt::Goto(_) | Stmt::Leave | Stmt::Coverage => {
            Ok((true, false, true))
        }
        Stmt::GotoIfNot { cond, .. } => {
            let ty = env.value_type(cond)?;
            Ok((true, false, ty.is_subtype(&IrType::Bool)))
        }
        Stmt::GlobalStore { .. } => Ok((false, false, false)),
        Stmt::Expr(expr) | Stmt::SlotStore { value: expr, .. } => expr_effect_flags(expr, rt, env),
    }
}

fn expr_effect_flags(expr: &Expr, rt: &IrType, env: &impl ValueTypes) -> Result<(bool, bool, bool)> {
    match expr {
        Expr::Value(v) => {
            env.value_type(v)?;
            Ok((true, true, true))
        }
        Expr::Call {
            callee: Callee::Intrinsic(intrinsic),
            args,
        } => {
            let (consistent, effect_free, nothrow) = intrinsic_effects(*intrinsic, args, env)?;
            Ok((consistent, effect_free && nothrow, nothrow))
        }
        Expr::Call {
            callee: Callee::Builtin(builtin),
            args,
        } => {
            let (consistent, effect_free, nothrow) = builtin_effects(*builtin, args, rt, env)?;
            Ok((consistent, effect_free && nothrow, nothrow))
        }
        Expr::Call { .. } | Expr::Invoke { .. } | Expr::Foreign { .. } => Ok((false, false, false)),
        Expr::New { ty, args } => new_expr_effect_flags(ty, args, env),
        // The bounds-check state depends on the context the body is inlined into.
        Expr::Boundscheck { .. } | Expr::TheException => Ok((false, true, true)),
        Expr::IsDefined(_) => Ok((true, true, true)),
        Expr::ThrowUndefIfNot { cond, .. } => {
            let nothrow = cond.is_bool(true)
                || matches!(env.value_type(cond)?, IrType::Const(Literal::Bool(true)));
            Ok((true, nothrow, nothrow))
        }
    }
}

fn intrinsic_effects(
    intrinsic: Intrinsic,
    args: &[Value],
    env: &impl ValueTypes,
) -> Result<(bool, bool, bool)> {
    for arg in args {
        env.value_type(arg)?;
    }
    let Some(info) = intrinsic.info() else {
        return Ok((false, false, false));
    };
    if args.len() < info.min_args || args.len() > info.max_args {
        return Ok((false, false, false));
    }
    let consistent = !intrinsic.reads_memory();
    let effect_free = !intrinsic.writes_memory();
    let nothrow = if intrinsic.is_division() {
        matches!(
            env.value_type(&args[1])?,
            IrType::Const(Literal::Int(d)) if d != 0 && d != -1
        )
    } else {
        !intrinsic.reads_memory() && !intrinsic.writes_memory()
    };
    Ok((consistent, effect_free, nothrow))
}

/// Returns `(consistent, effect_free, nothrow)` for a builtin call.
fn builtin_effects(
    builtin: Builtin,
    args: &[Value],
    rt: &IrType,
    env: &impl ValueTypes,
) -> Result<(bool, bool, bool)> {
    let types = args
        .iter()
        .map(|arg| env.value_type(arg))
        .collect::<Result<Vec<IrType>>>()?;
    let arity = |n: usize| types.len() == n;
    Ok(match builtin {
        Builtin::Tuple | Builtin::Svec => (true, true, true),
        Builtin::Egal | Builtin::Isa => (true, true, arity(2)),
        Builtin::Typeof | Builtin::Nfields => (true, true, arity(1)),
        Builtin::Ifelse => (true, true, arity(3) && types[0].is_subtype(&IrType::Bool)),
        Builtin::Getfield => getfield_effects(&types, rt),
        Builtin::Typeassert => {
            let nothrow = arity(2)
                && matches!(&types[1], IrType::Type(asserted) if types[0].is_subtype(asserted));
            (true, true, nothrow)
        }
        Builtin::Throw => (true, true, false),
        Builtin::ApplyType | Builtin::Memoryrefnew => (true, true, false),
        Builtin::Getglobal
        | Builtin::Arrayref
        | Builtin::Memoryrefget
        | Builtin::MemoryrefIsassigned => (false, true, false),
        Builtin::Setfield
        | Builtin::Setglobal
        | Builtin::Memoryrefset
        | Builtin::Arrayset
        | Builtin::Modifyfield
        | Builtin::Finalizer => (false, false, false),
    })
}

/// `getfield(obj, field[, boundscheck])`; fields are addressed by 0-based position or
/// by name.
fn getfield_effects(types: &[IrType], rt: &IrType) -> (bool, bool, bool) {
    if !(2..=3).contains(&types.len()) {
        return (false, true, false);
    }
    let obj = types[0].widen();
    let consistent = obj.is_known() && !obj.is_mutable();
    let field = match (&types[1], &obj) {
        (IrType::Const(Literal::Int(i)), _) => usize::try_from(*i).ok(),
        (IrType::Const(Literal::Symbol(name)), IrType::Struct(st)) => st.field_index(name),
        _ => None,
    };
    let in_bounds = field.is_some_and(|i| obj.field_count().is_some_and(|count| i < count));
    let flag_ok = types.len() == 2 || types[2].is_subtype(&IrType::Bool);
    let nothrow = in_bounds && flag_ok && !rt.is_bottom();
    (consistent, true, nothrow)
}

/// Classifies `new ty(args...)`.
///
/// Allocation succeeds without throwing when `ty` is a struct type with at least as
/// many fields as arguments and every argument fits its field type. The result is
/// never consistent: every execution produces a distinct object.
///
/// # Errors
///
/// Propagates operand lookup failures.
pub fn new_expr_effect_flags(
    ty: &IrType,
    args: &[Value],
    env: &impl ValueTypes,
) -> Result<(bool, bool, bool)> {
    let IrType::Struct(st) = ty else {
        return Ok((false, false, false));
    };
    if st.fields.len() < args.len() {
        return Ok((false, false, false));
    }
    for (arg, (_, field_ty)) in args.iter().zip(&st.fields) {
        if !env.value_type(arg)?.is_subtype(field_ty) {
            return Ok((false, false, false));
        }
    }
    Ok((false, true, true))
}

/// Derives statement flags from `stmt_effect_flags`.
///
/// Statements other than calls are never a source of undefined behavior and get
/// [`StmtFlags::NOUB`]. Lookup failures yield no flags.
pub fn recompute_effects_flags(stmt: &Stmt, rt: &IrType, env: &impl ValueTypes) -> StmtFlags {
    let mut flags = stmt_effect_flags(stmt, rt, env)
        .map(|(consistent, removable, nothrow)| {
            StmtFlags::from_effect_triple(consistent, removable, nothrow)
        })
        .unwrap_or_default();
    let is_call = matches!(
        stmt.expr(),
        Some(Expr::Call { .. } | Expr::Invoke { .. } | Expr::Foreign { .. })
    );
    if !is_call {
        flags |= StmtFlags::NOUB;
    }
    flags
}

/// Converts a callee's effect summary into flags for a call statement.
#[must_use]
pub fn flags_for_effects(effects: &Effects) -> StmtFlags {
    let mut flags = StmtFlags::empty();
    if effects.is_consistent() {
        flags |= StmtFlags::CONSISTENT;
    }
    if effects.is_effect_free() {
        flags |= StmtFlags::EFFECT_FREE;
    } else if effects.is_effect_free_if_inaccessiblememonly() {
        flags |= StmtFlags::EFIIMO;
    }
    if effects.is_nothrow() {
        flags |= StmtFlags::NOTHROW;
    }
    if effects.inaccessiblememonly == MemoryScope::OrArgMem {
        flags |= StmtFlags::INACCESSIBLEMEM_OR_ARGMEM;
    }
    if effects.is_noub() {
        flags |= StmtFlags::NOUB;
    }
    flags
}
