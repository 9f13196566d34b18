//! Packaging of an optimized body.

use std::sync::Arc;

use tracing::trace;

use crate::{
    analysis::ArgEscapeSummary,
    config::OptimizerConfig,
    cost::{decide_inlining, InlineCost, InlineDecision},
    effects::{Effects, RefinementOutcome},
    ir::{CodeInfo, IrCode},
    optimizer::{CachedCode, PassName},
    Result,
};

/// The result of optimizing one body.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedCode {
    /// The optimized body
    pub ir: IrCode,
    /// Effects of the body; refined when the pipeline completed
    pub effects: Effects,
    /// The inlining verdict; `None` when the pipeline stopped early
    pub inlining: Option<InlineDecision>,
    /// Parameter escape summary, if escape analysis ran
    pub arg_escapes: Option<ArgEscapeSummary>,
    /// The pass after which the pipeline stopped early, if it did
    pub stopped_after: Option<PassName>,
}

impl OptimizedCode {
    /// Wraps the partial body of a pipeline run that stopped early.
    pub(crate) fn partial(ir: IrCode, code: &CodeInfo, stopped_after: PassName) -> Self {
        Self {
            ir,
            effects: code.ipo_effects,
            inlining: None,
            arg_escapes: None,
            stopped_after: Some(stopped_after),
        }
    }

    /// Returns `true` if every pipeline stage ran.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stopped_after.is_none()
    }

    /// Returns the inlining cost, if it was decided.
    #[must_use]
    pub fn inline_cost(&self) -> Option<InlineCost> {
        self.inlining.map(|d| d.cost())
    }

    /// Returns the entry published to the code cache for this body.
    ///
    /// The body itself is only kept when callers may inline it.
    #[must_use]
    pub fn cache_entry(&self, code: &CodeInfo) -> Option<CachedCode> {
        let decision = self.inlining?;
        Some(CachedCode {
            cost: decision.cost(),
            effects: self.effects,
            rettype: code.rettype.clone(),
            arg_escapes: self.arg_escapes.clone(),
            body: decision
                .is_inlineable()
                .then(|| Arc::new(self.ir.clone())),
        })
    }
}

/// Decides the final inlineability of the optimized body `ir`.
///
/// Combines the refined effects with the inlining decision of [`decide_inlining`],
/// then widens the statement types of the published body: constant types are
/// replaced by the type of their constant.
///
/// # Errors
///
/// Propagates failures of the cost model.
pub fn finish(
    mut ir: IrCode,
    code: &CodeInfo,
    refinement: RefinementOutcome,
    config: &OptimizerConfig,
) -> Result<OptimizedCode> {
    let decision = decide_inlining(&ir, &code.method, &code.rettype, config)?;
    let widened = widen_types(&mut ir);
    trace!(body = %code.method.name, widened, "finished body");
    Ok(OptimizedCode {
        ir,
        effects: refinement.effects,
        inlining: Some(decision),
        arg_escapes: refinement.arg_escapes,
        stopped_after: None,
    })
}

/// Widens every statement type in place; returns how many changed.
fn widen_types(ir: &mut IrCode) -> usize {
    let mut changed = 0;
    for ty in &mut ir.stmts.types {
        let widened = ty.widen();
        if widened != *ty {
            *ty = widened;
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cost::{NoInlineReason, MAX_INLINE_COST},
        ir::{
            compact, Builtin, CodeBuilder, Expr, InlineDeclaration, Intrinsic, IrType, Literal, Value,
        },
        ssa::{convert_to_ircode, slot2reg},
    };

    fn optimized(declared: InlineDeclaration) -> Result<(IrCode, CodeInfo)> {
        let mut b = CodeBuilder::new("f", &[IrType::Int]);
        b.declared(declared);
        let v = b.expr(
            Expr::intrinsic(Intrinsic::AddInt, vec![Value::Argument(0), Value::int(1)]),
            IrType::Int,
        );
        b.ret(v);
        let code = b.finish()?;
        let mut ir = convert_to_ircode(&code, false)?;
        slot2reg(&mut ir, &code)?;
        compact(&mut ir)?;
        Ok((ir, code))
    }

    fn unrefined(code: &CodeInfo) -> RefinementOutcome {
        RefinementOutcome {
            effects: code.ipo_effects,
            refined: false,
            abandoned: false,
            arg_escapes: None,
        }
    }

    #[test]
    fn test_finish_costs_small_body() -> Result<()> {
        let (ir, code) = optimized(InlineDeclaration::Default)?;
        let out = finish(ir, &code, unrefined(&code), &OptimizerConfig::default())?;
        assert!(out.is_complete());
        assert!(matches!(out.inlining, Some(InlineDecision::Cost(_))));
        let entry = out.cache_entry(&code).expect("entry");
        assert!(entry.is_inlineable());
        assert!(entry.body.is_some());
        Ok(())
    }

    #[test]
    fn test_finish_declared_noinline() -> Result<()> {
        let (ir, code) = optimized(InlineDeclaration::NoInline)?;
        let out = finish(ir, &code, unrefined(&code), &OptimizerConfig::default())?;
        assert_eq!(
            out.inlining,
            Some(InlineDecision::Never(NoInlineReason::DeclaredNoInline))
        );
        assert_eq!(out.inline_cost(), Some(MAX_INLINE_COST));
        let entry = out.cache_entry(&code).expect("entry");
        assert!(entry.body.is_none());
        Ok(())
    }

    #[test]
    fn test_finish_widens_constant_types() -> Result<()> {
        let mut b = CodeBuilder::new("pair", &[IrType::Int]);
        let two = b.expr(
            Expr::intrinsic(Intrinsic::AddInt, vec![Value::int(1), Value::int(1)]),
            IrType::Const(Literal::Int(2)),
        );
        let pair = b.expr(
            Expr::builtin(Builtin::Tuple, vec![two, Value::Argument(0)]),
            IrType::Tuple(vec![IrType::Const(Literal::Int(2)), IrType::Int]),
        );
        b.ret(pair);
        let code = b.finish()?;
        let mut ir = convert_to_ircode(&code, false)?;
        slot2reg(&mut ir, &code)?;
        compact(&mut ir)?;

        let out = finish(ir, &code, unrefined(&code), &OptimizerConfig::default())?;
        assert_eq!(out.ir.stmts.types[0], IrType::Int);
        assert_eq!(
            out.ir.stmts.types[1],
            IrType::Tuple(vec![IrType::Int, IrType::Int])
        );
        assert!(!out
            .ir
            .stmts
            .types
            .iter()
            .any(|ty| matches!(ty, IrType::Const(_))));
        Ok(())
    }

    #[test]
    fn test_partial_has_no_cache_entry() -> Result<()> {
        let (ir, code) = optimized(InlineDeclaration::Default)?;
        let out = OptimizedCode::partial(ir, &code, PassName::Sroa);
        assert!(!out.is_complete());
        assert!(out.cache_entry(&code).is_none());
        assert_eq!(out.effects, code.ipo_effects);
        Ok(())
    }
}
