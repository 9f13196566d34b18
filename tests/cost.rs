//! Inlining cost and decision tests.
//!
//! Bodies are built with `CodeBuilder`, optimized with the default pipeline and the
//! resulting inlining decision is checked against the configured thresholds.

use std::sync::Arc;

use proptest::prelude::*;
use ssaopt::{
    cost::{
        inline_cost_clamp, plus_saturate, InlineDecision, NoInlineReason, MAX_INLINE_COST,
        MIN_INLINE_COST,
    },
    ir::{
        Builtin, Callee, CodeBuilder, CodeInfo, Expr, InlineDeclaration, Intrinsic, IrType,
        SignatureKind, Stmt, StmtFlags, Value,
    },
    optimize, OptimizerConfig, Result,
};

/// Statement shapes used to grow bodies.
#[derive(Debug, Clone, Copy)]
enum Op {
    Add,
    Mul,
    Foreign,
    GlobalStore,
    Generic,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Add),
        Just(Op::Mul),
        Just(Op::Foreign),
        Just(Op::GlobalStore),
        Just(Op::Generic),
    ]
}

fn emit(b: &mut CodeBuilder, op: Op) {
    match op {
        Op::Add => {
            b.expr(
                Expr::intrinsic(Intrinsic::AddInt, vec![Value::Argument(0), Value::int(1)]),
                IrType::Int,
            );
        }
        Op::Mul => {
            b.expr(
                Expr::intrinsic(Intrinsic::MulInt, vec![Value::Argument(0), Value::Argument(0)]),
                IrType::Int,
            );
        }
        Op::Foreign => {
            b.expr(
                Expr::Foreign {
                    name: "puts".into(),
                    args: vec![],
                },
                IrType::Int,
            );
        }
        Op::GlobalStore => {
            b.push(
                Stmt::GlobalStore {
                    binding: Arc::from("counter"),
                    value: Expr::Value(Value::Argument(0)),
                },
                IrType::Any,
            );
        }
        Op::Generic => {
            b.expr(Expr::generic("g", vec![]), IrType::Any);
        }
    }
}

fn body(name: &str, ops: &[Op]) -> CodeInfo {
    let mut b = CodeBuilder::new(name, &[IrType::Int]);
    for &op in ops {
        emit(&mut b, op);
    }
    b.ret(Value::Argument(0));
    b.finish().expect("non-empty body")
}

/// A chain of `n` integer additions returning the last sum.
fn adds(b: &mut CodeBuilder, n: usize) {
    let mut acc = Value::Argument(0);
    for _ in 0..n {
        acc = b.expr(
            Expr::intrinsic(Intrinsic::AddInt, vec![acc, Value::int(1)]),
            IrType::Int,
        );
    }
    b.ret(acc);
}

fn decision(code: &CodeInfo, config: &OptimizerConfig) -> Result<InlineDecision> {
    let result = optimize(code, config)?;
    Ok(result.inlining.expect("pipeline ran to completion"))
}

#[test]
fn test_small_body_is_clamped_to_minimum() -> Result<()> {
    let mut b = CodeBuilder::new("inc", &[IrType::Int]);
    adds(&mut b, 1);
    let code = b.finish()?;

    let decision = decision(&code, &OptimizerConfig::default())?;
    assert_eq!(decision, InlineDecision::Cost(MIN_INLINE_COST));
    assert!(decision.is_inlineable());
    Ok(())
}

#[test]
fn test_threshold_is_inclusive() -> Result<()> {
    let mut b = CodeBuilder::new("at_threshold", &[IrType::Int]);
    adds(&mut b, 100);
    let code = b.finish()?;
    assert_eq!(
        decision(&code, &OptimizerConfig::default())?,
        InlineDecision::Cost(100)
    );

    let mut b = CodeBuilder::new("over_threshold", &[IrType::Int]);
    adds(&mut b, 101);
    let code = b.finish()?;
    let over = decision(&code, &OptimizerConfig::default())?;
    assert_eq!(over, InlineDecision::Cost(MAX_INLINE_COST));
    assert!(!over.is_inlineable());
    Ok(())
}

#[test]
fn test_configured_threshold() -> Result<()> {
    let mut b = CodeBuilder::new("f", &[IrType::Int]);
    adds(&mut b, 30);
    let code = b.finish()?;

    let strict = OptimizerConfig::default().with_inline_cost_threshold(20);
    assert_eq!(
        decision(&code, &strict)?,
        InlineDecision::Cost(MAX_INLINE_COST)
    );
    assert_eq!(
        decision(&code, &OptimizerConfig::default())?,
        InlineDecision::Cost(30)
    );
    Ok(())
}

#[test]
fn test_hot_operation_raises_threshold() -> Result<()> {
    let build = |top_module: bool| {
        let mut b = CodeBuilder::new("iterate", &[IrType::Int]);
        b.top_module(top_module);
        adds(&mut b, 150);
        b.finish()
    };
    let config = OptimizerConfig::default();
    assert_eq!(decision(&build(true)?, &config)?, InlineDecision::Cost(150));
    assert_eq!(
        decision(&build(false)?, &config)?,
        InlineDecision::Cost(MAX_INLINE_COST)
    );
    Ok(())
}

#[test]
fn test_tuple_return_bonus() -> Result<()> {
    let build = |rettype: IrType| {
        let mut b = CodeBuilder::new("pair", &[IrType::Int]);
        b.rettype(rettype);
        adds(&mut b, 200);
        b.finish()
    };
    let config = OptimizerConfig::default();
    assert_eq!(
        decision(&build(IrType::Tuple(vec![IrType::Any, IrType::Int]))?, &config)?,
        InlineDecision::Cost(200)
    );
    assert_eq!(
        decision(&build(IrType::Tuple(vec![IrType::Int, IrType::Int]))?, &config)?,
        InlineDecision::Cost(MAX_INLINE_COST)
    );
    Ok(())
}

#[test]
fn test_declarations() -> Result<()> {
    let config = OptimizerConfig::default();
    let build = |declared: InlineDeclaration, kind: SignatureKind, rettype: IrType| {
        let mut b = CodeBuilder::new("f", &[IrType::Int]);
        b.declared(declared).signature_kind(kind).rettype(rettype);
        adds(&mut b, 500);
        b.finish()
    };

    let inline = build(InlineDeclaration::Inline, SignatureKind::Positional, IrType::Int)?;
    assert_eq!(decision(&inline, &config)?, InlineDecision::Always);
    assert_eq!(InlineDecision::Always.cost(), MIN_INLINE_COST);

    let noinline = build(InlineDeclaration::NoInline, SignatureKind::Positional, IrType::Int)?;
    assert_eq!(
        decision(&noinline, &config)?,
        InlineDecision::Never(NoInlineReason::DeclaredNoInline)
    );

    let other = build(InlineDeclaration::Inline, SignatureKind::Other, IrType::Int)?;
    assert_eq!(
        decision(&other, &config)?,
        InlineDecision::Never(NoInlineReason::UnsupportedSignature)
    );
    Ok(())
}

#[test]
fn test_never_returning_body() -> Result<()> {
    let mut b = CodeBuilder::new("fail", &[IrType::Int]);
    b.rettype(IrType::Bottom);
    b.expr(Expr::generic("error", vec![]), IrType::Bottom);
    b.unreachable();
    let code = b.finish()?;

    let decision = decision(&code, &OptimizerConfig::default())?;
    assert_eq!(decision, InlineDecision::Never(NoInlineReason::NeverReturns));
    assert_eq!(decision.cost(), MAX_INLINE_COST);
    Ok(())
}

/// `c ? 1 : <arm>`, where the second arm calls `string(1)` and then either throws
/// or returns.
fn guarded(throws: bool) -> Result<CodeInfo> {
    let mut b = CodeBuilder::new("checked", &[IrType::Bool]);
    let fail = b.new_label();
    b.goto_if_not(Value::Argument(0), fail);
    b.ret(Value::int(1));
    b.bind(fail);
    let msg = b.expr(Expr::generic("string", vec![Value::int(1)]), IrType::Any);
    if throws {
        b.expr(Expr::builtin(Builtin::Throw, vec![msg]), IrType::Bottom);
    } else {
        b.ret(msg);
    }
    b.finish()
}

#[test]
fn test_call_on_throwing_arm_pays_error_path_cost() -> Result<()> {
    let result = optimize(&guarded(true)?, &OptimizerConfig::default())?;
    let call = result
        .ir
        .stmts
        .stmts
        .iter()
        .position(|stmt| {
            matches!(
                stmt,
                Stmt::Expr(Expr::Call {
                    callee: Callee::Generic(_),
                    ..
                })
            )
        })
        .expect("string call");
    assert!(result.ir.stmts.has_flag(call, StmtFlags::THROW_BLOCK));
    assert_eq!(result.inlining, Some(InlineDecision::Cost(20)));
    assert!(result.inlining.is_some_and(|d| d.is_inlineable()));

    let config = OptimizerConfig::default().with_error_path_cost(35);
    assert_eq!(
        decision(&guarded(true)?, &config)?,
        InlineDecision::Cost(35)
    );
    Ok(())
}

#[test]
fn test_call_on_returning_arm_pays_nonleaf_penalty() -> Result<()> {
    let result = optimize(&guarded(false)?, &OptimizerConfig::default())?;
    let flagged = (0..result.ir.len())
        .filter(|&idx| result.ir.stmts.has_flag(idx, StmtFlags::THROW_BLOCK))
        .count();
    assert_eq!(flagged, 0);
    assert_eq!(result.inlining, Some(InlineDecision::Cost(MAX_INLINE_COST)));
    Ok(())
}

#[test]
fn test_exception_region_is_never_inlineable() -> Result<()> {
    let mut b = CodeBuilder::new("guarded", &[IrType::Int]);
    let handler = b.new_label();
    b.enter(handler);
    b.ret(Value::int(1));
    b.bind(handler);
    b.ret(Value::int(2));
    let code = b.finish()?;

    let result = optimize(&code, &OptimizerConfig::default())?;
    assert_eq!(result.inline_cost(), Some(MAX_INLINE_COST));
    Ok(())
}

#[test]
fn test_loop_backedge_is_charged() -> Result<()> {
    // while c { h() }
    let mut b = CodeBuilder::new("spin", &[IrType::Bool]);
    let head = b.new_label();
    let exit = b.new_label();
    b.expr(Expr::Value(Value::Argument(0)), IrType::Bool);
    b.bind(head);
    b.goto_if_not(Value::Argument(0), exit);
    b.expr(
        Expr::Foreign {
            name: "tick".into(),
            args: vec![],
        },
        IrType::Int,
    );
    b.goto(head);
    b.bind(exit);
    b.ret(Value::nothing());
    let code = b.finish()?;

    assert_eq!(
        decision(&code, &OptimizerConfig::default())?,
        InlineDecision::Cost(60)
    );
    Ok(())
}

proptest! {
    #[test]
    fn test_plus_saturate_never_shrinks(a in any::<i64>(), b in any::<i64>()) {
        let sum = plus_saturate(a, b);
        prop_assert!(sum >= a);
        prop_assert!(sum >= b);
        if a >= 0 && b >= 0 {
            prop_assert_eq!(sum, a.saturating_add(b));
        }
    }

    #[test]
    fn test_clamp_is_monotone(a in any::<i64>(), b in any::<i64>()) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let clamped_lo = inline_cost_clamp(lo);
        prop_assert!(clamped_lo >= MIN_INLINE_COST);
        prop_assert!(clamped_lo <= inline_cost_clamp(hi));
    }

    #[test]
    fn test_adding_a_statement_never_lowers_cost(
        ops in prop::collection::vec(op_strategy(), 0..24),
        extra in op_strategy(),
    ) {
        let config = OptimizerConfig::default();
        let mut grown = ops.clone();
        grown.push(extra);

        let before = optimize(&body("f", &ops), &config).expect("optimize").inline_cost();
        let after = optimize(&body("f", &grown), &config).expect("optimize").inline_cost();
        prop_assert!(before.is_some() && after.is_some());
        prop_assert!(before <= after);
    }
}
