use crate::{
    config::OptimizerConfig,
    cost::{InlineCost, MAX_INLINE_COST, MIN_INLINE_COST},
    ir::{
        jump_target, Builtin, Callee, Expr, IrCode, IrType, Stmt, StmtFlags, Value, ValueTypes,
    },
    Result,
};

/// Cost of a call that dispatches dynamically or through `invoke`.
pub const UNKNOWN_CALL_COST: i64 = 20;

/// Cost of a foreign call.
pub const FOREIGN_CALL_COST: i64 = 20;

/// Cost of an assignment to a global binding, excluding its right-hand side.
pub const GLOBAL_STORE_COST: i64 = 20;

/// Cost of a backward branch.
pub const BACKEDGE_COST: i64 = 40;

/// Adds two costs, saturating instead of overflowing.
///
/// The result is never smaller than either input.
#[must_use]
pub fn plus_saturate(a: i64, b: i64) -> i64 {
    a.max(b).max(a.saturating_add(b))
}

/// Clamps an accumulated body cost into `[MIN_INLINE_COST, MAX_INLINE_COST]`.
#[must_use]
pub fn inline_cost_clamp(cost: i64) -> InlineCost {
    if cost >= i64::from(MAX_INLINE_COST) {
        MAX_INLINE_COST
    } else if cost <= i64::from(MIN_INLINE_COST) {
        MIN_INLINE_COST
    } else {
        InlineCost::try_from(cost).unwrap_or(MAX_INLINE_COST)
    }
}

/// Returns the cost of expression `expr`.
///
/// `idx` is the statement computing `expr`, or `None` for an expression nested in a
/// store, whose result type is unknown.
///
/// # Errors
///
/// Propagates operand type lookup failures.
pub fn statement_cost(
    expr: &Expr,
    idx: Option<usize>,
    ir: &IrCode,
    config: &OptimizerConfig,
) -> Result<i64> {
    let never_returns = idx.is_some_and(|i| ir.stmts.types.get(i).is_some_and(IrType::is_bottom));
    let error_path = idx.is_some_and(|i| {
        ir.stmts
            .flags
            .get(i)
            .is_some_and(|flags| flags.has(StmtFlags::THROW_BLOCK))
    });

    match expr {
        Expr::Call {
            callee: Callee::Intrinsic(intrinsic),
            ..
        } => Ok(intrinsic
            .info()
            .map_or(config.inline_nonleaf_penalty, |info| info.cost)),
        Expr::Call {
            callee: Callee::Builtin(builtin),
            args,
        } => builtin_cost(*builtin, args, ir, config),
        Expr::Call {
            callee: Callee::Generic(_),
            ..
        } => Ok(if never_returns {
            0
        } else if error_path {
            config.inline_error_path_cost
        } else {
            config.inline_nonleaf_penalty
        }),
        Expr::Call {
            callee: Callee::Dynamic(_),
            ..
        }
        | Expr::Invoke { .. } => Ok(if never_returns { 0 } else { UNKNOWN_CALL_COST }),
        Expr::Foreign { .. } => Ok(if never_returns { 0 } else { FOREIGN_CALL_COST }),
        Expr::Value(_)
        | Expr::New { .. }
        | Expr::Boundscheck { .. }
        | Expr::IsDefined(_)
        | Expr::ThrowUndefIfNot { .. }
        | Expr::TheException => Ok(0),
    }
}

fn builtin_cost(
    builtin: Builtin,
    args: &[Value],
    ir: &IrCode,
    config: &OptimizerConfig,
) -> Result<i64> {
    let first_known = || -> Result<bool> {
        match args.first() {
            Some(arg) => Ok(ir.value_type(arg)?.is_known()),
            None => Ok(false),
        }
    };
    match builtin {
        Builtin::Arrayref | Builtin::Arrayset if args.len() >= 2 => {
            Ok(if first_known()? { 4 } else { config.inline_nonleaf_penalty })
        }
        Builtin::Memoryrefget | Builtin::MemoryrefIsassigned if args.len() >= 2 => {
            Ok(if first_known()? { 1 } else { config.inline_nonleaf_penalty })
        }
        Builtin::Memoryrefset if args.len() >= 2 => {
            Ok(if first_known()? { 5 } else { config.inline_nonleaf_penalty })
        }
        Builtin::Typeassert if args.len() == 2 => {
            Ok(if matches!(ir.value_type(&args[1])?, IrType::Type(_)) {
                1
            } else {
                4
            })
        }
        _ => Ok(builtin.table_cost().unwrap_or(UNKNOWN_CALL_COST)),
    }
}

/// Returns the cost of statement `idx`, including branches.
///
/// Forward branches are free since the skipped code is counted anyway; backward
/// branches cost [`BACKEDGE_COST`]. An exception region costs `i64::MAX`.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidIr`] for a statement or jump target that does not
/// exist, and propagates operand type lookup failures.
pub fn statement_or_branch_cost(ir: &IrCode, idx: usize, config: &OptimizerConfig) -> Result<i64> {
    let stmt = ir
        .stmts
        .stmts
        .get(idx)
        .ok_or_else(|| invalid_ir!("statement {} out of range", idx))?;
    match stmt {
        Stmt::Expr(expr) => statement_cost(expr, Some(idx), ir, config),
        Stmt::SlotStore { value, .. } => nested_cost(0, value, ir, config),
        Stmt::GlobalStore { value, .. } => nested_cost(GLOBAL_STORE_COST, value, ir, config),
        Stmt::Goto(_) | Stmt::GotoIfNot { .. } => {
            let Some(target) = jump_target(stmt) else {
                return Ok(0);
            };
            let dest = ir
                .cfg
                .blocks
                .get(target)
                .ok_or_else(|| invalid_ir!("statement {} jumps to missing block {}", idx, target))?;
            Ok(if dest.stmts.start < idx { BACKEDGE_COST } else { 0 })
        }
        Stmt::Enter { .. } => Ok(i64::MAX),
        Stmt::Nop
        | Stmt::NewVar(_)
        | Stmt::Return(_)
        | Stmt::Phi(_)
        | Stmt::Leave
        | Stmt::Coverage
        | Stmt::Meta(_) => Ok(0),
    }
}

fn nested_cost(base: i64, value: &Expr, ir: &IrCode, config: &OptimizerConfig) -> Result<i64> {
    if matches!(value, Expr::Value(_)) {
        return Ok(base);
    }
    Ok(plus_saturate(base, statement_cost(value, None, ir, config)?))
}

/// Computes the inlining cost of `ir`.
///
/// The scan stops as soon as the running total exceeds `threshold`, in which case
/// the body gets [`MAX_INLINE_COST`].
///
/// # Errors
///
/// Propagates failures of [`statement_or_branch_cost`].
pub fn inline_cost_model(ir: &IrCode, config: &OptimizerConfig, threshold: i64) -> Result<InlineCost> {
    let mut body_cost = 0i64;
    for idx in 0..ir.len() {
        body_cost = plus_saturate(body_cost, statement_or_branch_cost(ir, idx, config)?);
        if body_cost > threshold {
            return Ok(MAX_INLINE_COST);
        }
    }
    Ok(inline_cost_clamp(body_cost))
}
