//! End-to-end pipeline tests.
//!
//! Every test builds inferred bodies with `CodeBuilder` and runs them through an
//! `Optimizer`, checking the optimized body, the refined effects, the inlining
//! cost and the events the passes recorded.

use std::sync::Arc;

use ssaopt::{
    effects::{stmt_effect_flags, Effects},
    ir::{
        CalleeKey, CodeBuilder, CodeInfo, Expr, Intrinsic, IrCode, IrType, StmtFlags, Stmt,
        StructType, Value,
    },
    optimizer::{BodyTransform, CachedCode, CalleeSplicer, CodeCache, EventKind},
    Error, OptimizerConfig, Optimizer, PassName, Result,
};

/// Replaces an inlined call by its first argument.
struct ForwardFirstArgument;

impl CalleeSplicer for ForwardFirstArgument {
    fn try_splice_callee(
        &self,
        caller: &mut IrCode,
        site: usize,
        _callee: &CachedCode,
    ) -> Result<bool> {
        let Some(Stmt::Expr(Expr::Invoke { args, .. })) = caller.stmt(site) else {
            return Ok(false);
        };
        let Some(first) = args.first().cloned() else {
            return Ok(false);
        };
        caller.stmts.set_stmt(site, Stmt::Expr(Expr::Value(first)));
        Ok(true)
    }
}

/// An SROA stand-in that always fails.
struct FailingTransform;

impl BodyTransform for FailingTransform {
    fn transform(&self, _ir: &mut IrCode) -> Result<bool> {
        Err(Error::Transform {
            pass: "SROA",
            message: "unsupported aggregate".to_string(),
        })
    }
}

/// An ADCE stand-in that only checks it received compacted IR.
struct RequireCompacted;

impl BodyTransform for RequireCompacted {
    fn transform(&self, ir: &mut IrCode) -> Result<bool> {
        ir.ensure_compacted()?;
        Ok(false)
    }
}

fn optimizer() -> Optimizer {
    Optimizer::new(OptimizerConfig::default().with_verification(true))
}

/// `inc(x) = x + 1`
fn inc() -> Result<CodeInfo> {
    let mut b = CodeBuilder::new("inc", &[IrType::Int]);
    b.rettype(IrType::Int);
    let sum = b.expr(
        Expr::intrinsic(Intrinsic::AddInt, vec![Value::Argument(0), Value::int(1)]),
        IrType::Int,
    );
    b.ret(sum);
    b.finish()
}

/// `caller(x) = inc(x)`, optionally with call-site flags.
fn caller(flags: Option<StmtFlags>) -> Result<CodeInfo> {
    let mut b = CodeBuilder::new("caller", &[IrType::Int]);
    let call = Expr::Invoke {
        target: CalleeKey::new("inc"),
        args: vec![Value::Argument(0)],
    };
    let result = match flags {
        Some(flags) => b.expr_with_flags(call, IrType::Int, flags),
        None => b.expr(call, IrType::Int),
    };
    b.ret(result);
    b.finish()
}

#[test]
fn test_single_assignment_has_no_phi() -> Result<()> {
    let mut b = CodeBuilder::new("f", &[IrType::Bool]);
    let x = b.slot("x", IrType::Int);
    let join = b.new_label();
    b.store(x, Expr::generic("g", vec![]));
    b.goto_if_not(Value::Argument(0), join);
    b.expr(Expr::generic("h", vec![]), IrType::Any);
    b.bind(join);
    b.ret(Value::Slot(x));
    let code = b.finish()?;

    let opt = optimizer();
    let result = opt.optimize(&code)?;
    assert_eq!(result.ir.phi_count(), 0);
    assert_eq!(opt.events().count_kind(EventKind::PhiInserted), 0);
    Ok(())
}

#[test]
fn test_two_arm_merge_has_one_phi() -> Result<()> {
    let mut b = CodeBuilder::new("f", &[IrType::Bool]);
    let x = b.slot("x", IrType::Int);
    let other = b.new_label();
    let join = b.new_label();
    b.goto_if_not(Value::Argument(0), other);
    b.store(x, Expr::generic("g", vec![]));
    b.goto(join);
    b.bind(other);
    b.store(x, Expr::generic("h", vec![]));
    b.bind(join);
    b.ret(Value::Slot(x));
    let code = b.finish()?;

    let opt = optimizer();
    let result = opt.optimize(&code)?;
    assert_eq!(result.ir.phi_count(), 1);
    let phi = result
        .ir
        .stmts
        .stmts
        .iter()
        .find_map(Stmt::as_phi)
        .expect("phi");
    assert_eq!(phi.len(), 2);
    assert_eq!(opt.events().count_kind(EventKind::PhiInserted), 1);
    Ok(())
}

#[test]
fn test_foreign_call_with_dead_arm() -> Result<()> {
    // if c { return puts() } else { error() }
    let mut b = CodeBuilder::new("f", &[IrType::Bool]);
    let fail = b.new_label();
    b.goto_if_not(Value::Argument(0), fail);
    let call = b.expr(
        Expr::Foreign {
            name: "puts".into(),
            args: vec![],
        },
        IrType::Int,
    );
    b.ret(call);
    b.bind(fail);
    b.expr(Expr::generic("error", vec![]), IrType::Bottom);
    b.unreachable();
    let code = b.finish()?;

    let result = optimizer().optimize(&code)?;
    assert_eq!(result.inline_cost(), Some(20));
    assert!(!result.effects.is_nothrow());
    Ok(())
}

#[test]
fn test_constructor_is_effect_free_and_nothrow() -> Result<()> {
    let point = IrType::Struct(StructType::new(
        "Point",
        false,
        vec![("x", IrType::Int), ("y", IrType::Int)],
    ));
    let mut b = CodeBuilder::new("Point", &[IrType::Int, IrType::Int]);
    b.rettype(point.clone());
    b.effects(Effects {
        terminates: true,
        ..Effects::UNKNOWN
    });
    let obj = b.expr(
        Expr::New {
            ty: point.clone(),
            args: vec![Value::Argument(0), Value::Argument(1)],
        },
        point.clone(),
    );
    b.ret(obj);
    let code = b.finish()?;

    let result = optimizer().optimize(&code)?;
    let new = &result.ir.stmts.stmts[0];
    assert!(matches!(new, Stmt::Expr(Expr::New { .. })));
    assert_eq!(
        stmt_effect_flags(new, &point, &result.ir)?,
        (false, true, true)
    );
    assert!(!result.effects.is_consistent());
    assert!(result.effects.is_effect_free());
    assert!(result.effects.is_nothrow());
    Ok(())
}

#[test]
fn test_compiled_callee_is_inlined() -> Result<()> {
    let opt = optimizer().with_splicer(ForwardFirstArgument);
    let callee = opt.optimize(&inc()?)?;
    assert!(callee.inlining.is_some_and(|d| d.is_inlineable()));
    assert!(opt.cache().contains(&CalleeKey::new("inc")));

    let result = opt.optimize(&caller(None)?)?;
    assert_eq!(opt.events().count_kind(EventKind::CalleeInlined), 1);
    assert_eq!(
        result.ir.stmts.stmts[0],
        Stmt::Expr(Expr::Value(Value::Argument(0)))
    );
    Ok(())
}

#[test]
fn test_inlining_declined() -> Result<()> {
    // callee unknown
    let opt = optimizer().with_splicer(ForwardFirstArgument);
    opt.optimize(&caller(None)?)?;
    let declined: Vec<_> = opt.events().filter_kind(EventKind::InlineDeclined).collect();
    assert_eq!(declined.len(), 1);
    assert_eq!(declined[0].message, "callee has not been compiled");
    assert_eq!(declined[0].location, Some(0));

    // call site marked noinline
    let opt = optimizer().with_splicer(ForwardFirstArgument);
    opt.optimize(&inc()?)?;
    let result = opt.optimize(&caller(Some(StmtFlags::NOINLINE))?)?;
    assert!(!opt.events().has(EventKind::CalleeInlined));
    assert!(opt
        .events()
        .filter_kind(EventKind::InlineDeclined)
        .any(|e| e.message == "call site is marked noinline"));
    assert!(matches!(
        result.ir.stmts.stmts[0],
        Stmt::Expr(Expr::Invoke { .. })
    ));
    Ok(())
}

#[test]
fn test_shared_cache_between_optimizers() -> Result<()> {
    let cache = Arc::new(CodeCache::new());
    optimizer().with_cache(Arc::clone(&cache)).optimize(&inc()?)?;

    let opt = optimizer()
        .with_cache(Arc::clone(&cache))
        .with_splicer(ForwardFirstArgument);
    opt.optimize(&caller(None)?)?;
    assert!(opt.events().has(EventKind::CalleeInlined));
    assert_eq!(cache.len(), 2);
    Ok(())
}

#[test]
fn test_stop_after_leaves_partial_result() -> Result<()> {
    let opt = Optimizer::new(OptimizerConfig::default().stop_after(PassName::Sroa));
    let result = opt.optimize(&inc()?)?;
    assert_eq!(result.stopped_after, Some(PassName::Sroa));
    assert!(!result.is_complete());
    assert!(result.inlining.is_none());
    assert!(!opt.cache().contains(&CalleeKey::new("inc")));
    assert!(opt.events().has(EventKind::PipelineStopped));
    Ok(())
}

#[test]
fn test_collaborator_failure_is_reported() -> Result<()> {
    let opt = optimizer().with_sroa(FailingTransform);
    match opt.optimize(&inc()?) {
        Err(Error::Transform { pass, message }) => {
            assert_eq!(pass, "SROA");
            assert_eq!(message, "unsupported aggregate");
        }
        other => panic!("expected a transform error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_adce_receives_compacted_body() -> Result<()> {
    let opt = optimizer().with_adce(RequireCompacted);
    let result = opt.optimize(&caller(None)?)?;
    assert!(result.is_complete());
    Ok(())
}

#[test]
fn test_optimize_all_in_parallel() -> Result<()> {
    let codes = (0..16)
        .map(|i| {
            let mut b = CodeBuilder::new(&format!("f{i}"), &[IrType::Int]);
            let x = b.slot("x", IrType::Int);
            b.store(
                x,
                Expr::intrinsic(Intrinsic::MulInt, vec![Value::Argument(0), Value::int(i)]),
            );
            b.ret(Value::Slot(x));
            b.finish()
        })
        .collect::<Result<Vec<_>>>()?;

    let opt = optimizer();
    let results = opt.optimize_all(&codes);
    assert_eq!(results.len(), codes.len());
    for (code, result) in codes.iter().zip(results) {
        let result = result?;
        assert!(result.is_complete());
        assert!(opt.cache().contains(&code.method.key()));
    }
    assert_eq!(opt.cache().len(), 16);
    assert_eq!(opt.events().count_kind(EventKind::CostComputed), 16);
    Ok(())
}
