use std::fmt;

use crate::{
    config::OptimizerConfig,
    cost::{inline_cost_model, is_inlineable, InlineCost, MAX_INLINE_COST, MIN_INLINE_COST},
    ir::{InlineDeclaration, IrCode, IrType, MethodInfo, SignatureKind, StmtFlags},
    Result,
};

/// Why a body can never be inlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoInlineReason {
    /// The method is declared "never inline"
    DeclaredNoInline,
    /// The signature is not a plain positional or variadic one
    UnsupportedSignature,
    /// The body never returns and is not declared "always inline"
    NeverReturns,
}

impl fmt::Display for NoInlineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NoInlineReason::DeclaredNoInline => "declared noinline",
            NoInlineReason::UnsupportedSignature => "unsupported signature",
            NoInlineReason::NeverReturns => "never returns",
        };
        f.write_str(text)
    }
}

/// The final inlining verdict for a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineDecision {
    /// The body must not be inlined
    Never(NoInlineReason),
    /// The body is declared "always inline" and its signature is concrete
    Always,
    /// The body was costed
    Cost(InlineCost),
}

impl InlineDecision {
    /// Returns the inlining cost recorded for this decision.
    #[must_use]
    pub fn cost(&self) -> InlineCost {
        match self {
            InlineDecision::Never(_) => MAX_INLINE_COST,
            InlineDecision::Always => MIN_INLINE_COST,
            InlineDecision::Cost(cost) => *cost,
        }
    }

    /// Returns `true` if callers may inline the body.
    #[must_use]
    pub fn is_inlineable(&self) -> bool {
        is_inlineable(self.cost())
    }
}

/// Returns the reason `method` may never be inlined, if any.
#[must_use]
pub fn forced_noinline(method: &MethodInfo, rettype: &IrType) -> Option<NoInlineReason> {
    let declared = method.declared;
    if declared == InlineDeclaration::NoInline {
        return Some(NoInlineReason::DeclaredNoInline);
    }
    if method.signature.kind == SignatureKind::Other {
        return Some(NoInlineReason::UnsupportedSignature);
    }
    if declared != InlineDeclaration::Inline && rettype.is_bottom() {
        return Some(NoInlineReason::NeverReturns);
    }
    None
}

/// Returns the cost threshold below which the body of `method` is inlined.
///
/// The base threshold is raised for non-concrete tuple returns, multiplied by twenty
/// for declared-inline methods and by five for the hot standard operations.
#[must_use]
pub fn cost_threshold(method: &MethodInfo, rettype: &IrType, config: &OptimizerConfig) -> i64 {
    let base = config.inline_cost_threshold;
    let mut threshold = base;
    if rettype.is_tuple() && !rettype.widen().is_concrete() {
        threshold = threshold.saturating_add(config.inline_tupleret_bonus);
    }
    if method.declared == InlineDeclaration::Inline {
        threshold = threshold.saturating_add(base.saturating_mul(19));
    }
    if method.is_top_module && config.is_hot_operation(&method.name) {
        threshold = threshold.saturating_add(base.saturating_mul(4));
    }
    threshold
}

/// Decides whether the optimized body `ir` of `method` may be inlined.
///
/// # Errors
///
/// Propagates failures of the cost model.
pub fn decide_inlining(
    ir: &IrCode,
    method: &MethodInfo,
    rettype: &IrType,
    config: &OptimizerConfig,
) -> Result<InlineDecision> {
    if let Some(reason) = forced_noinline(method, rettype) {
        return Ok(InlineDecision::Never(reason));
    }
    if method.declared == InlineDeclaration::Inline && method.signature.is_concrete() {
        return Ok(InlineDecision::Always);
    }
    let threshold = cost_threshold(method, rettype, config);
    Ok(InlineDecision::Cost(inline_cost_model(ir, config, threshold)?))
}

/// Returns `true` if a call site with flags `stmt_flags` may inline a callee whose
/// cached cost is `callee_cost`.
///
/// A call-site "always inline" hint wins over the callee's own cost.
#[must_use]
pub fn src_inlining_policy(callee_cost: Option<InlineCost>, stmt_flags: StmtFlags) -> bool {
    if stmt_flags.has(StmtFlags::NOINLINE) {
        return false;
    }
    stmt_flags.has(StmtFlags::INLINE) || callee_cost.is_some_and(is_inlineable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, Expr, Instruction, InstructionStream, Stmt, StmtRange, Value};

    fn method(declared: InlineDeclaration) -> MethodInfo {
        let mut method = MethodInfo::new("f", vec![IrType::Int]);
        method.declared = declared;
        method
    }

    fn calling_body() -> IrCode {
        let stream: InstructionStream = [
            (Stmt::Expr(Expr::generic("helper", vec![])), IrType::Int),
            (Stmt::Return(Some(Value::Ssa(0))), IrType::Any),
        ]
        .into_iter()
        .map(|(s, ty)| Instruction::new(s, ty, 0, StmtFlags::empty()))
        .collect();
        let cfg = Cfg::from_block_ranges(vec![StmtRange::new(0, 2)], &stream.stmts).expect("cfg");
        IrCode::new(stream, cfg, vec![IrType::Int])
    }

    #[test]
    fn test_forced_noinline() {
        assert_eq!(
            forced_noinline(&method(InlineDeclaration::NoInline), &IrType::Int),
            Some(NoInlineReason::DeclaredNoInline)
        );
        assert_eq!(
            forced_noinline(&method(InlineDeclaration::Default), &IrType::Bottom),
            Some(NoInlineReason::NeverReturns)
        );
        assert_eq!(
            forced_noinline(&method(InlineDeclaration::Inline), &IrType::Bottom),
            None
        );
        let mut other = method(InlineDeclaration::Inline);
        other.signature.kind = SignatureKind::Other;
        assert_eq!(
            forced_noinline(&other, &IrType::Int),
            Some(NoInlineReason::UnsupportedSignature)
        );
    }

    #[test]
    fn test_threshold_bonuses() {
        let config = OptimizerConfig::default();
        assert_eq!(
            cost_threshold(&method(InlineDeclaration::Default), &IrType::Int, &config),
            100
        );
        assert_eq!(
            cost_threshold(&method(InlineDeclaration::Inline), &IrType::Int, &config),
            2000
        );
        let tuple = IrType::Tuple(vec![IrType::Int, IrType::Any]);
        assert_eq!(
            cost_threshold(&method(InlineDeclaration::Default), &tuple, &config),
            350
        );

        let mut iterate = MethodInfo::new("iterate", vec![]);
        iterate.is_top_module = true;
        assert_eq!(cost_threshold(&iterate, &IrType::Int, &config), 500);
        iterate.is_top_module = false;
        assert_eq!(cost_threshold(&iterate, &IrType::Int, &config), 100);
    }

    #[test]
    fn test_declared_inline_with_concrete_signature_skips_costing() {
        let config = OptimizerConfig::default();
        let ir = calling_body();
        let decision =
            decide_inlining(&ir, &method(InlineDeclaration::Inline), &IrType::Int, &config)
                .expect("decision");
        assert_eq!(decision, InlineDecision::Always);
        assert_eq!(decision.cost(), MIN_INLINE_COST);

        let decision =
            decide_inlining(&ir, &method(InlineDeclaration::Default), &IrType::Int, &config)
                .expect("decision");
        assert_eq!(decision, InlineDecision::Cost(MAX_INLINE_COST));
        assert!(!decision.is_inlineable());
    }

    #[test]
    fn test_src_inlining_policy() {
        assert!(src_inlining_policy(Some(30), StmtFlags::empty()));
        assert!(!src_inlining_policy(Some(MAX_INLINE_COST), StmtFlags::empty()));
        assert!(src_inlining_policy(Some(MAX_INLINE_COST), StmtFlags::INLINE));
        assert!(!src_inlining_policy(None, StmtFlags::empty()));
        assert!(!src_inlining_policy(Some(30), StmtFlags::NOINLINE));
    }
}
