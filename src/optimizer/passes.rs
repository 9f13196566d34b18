//! The built-in pipeline stages.

use tracing::{debug, trace};

use crate::{
    cost::src_inlining_policy,
    ir::{compact, Expr, IrCode, Stmt, StmtFlags},
    optimizer::{EventKind, OptPass, PassContext, PassName},
    ssa::slot2reg,
    Result,
};

/// Replaces slots by SSA values and phi nodes.
pub struct Slot2RegPass;

impl OptPass for Slot2RegPass {
    fn name(&self) -> PassName {
        PassName::Slot2reg
    }

    fn run(&self, ir: &mut IrCode, ctx: &PassContext<'_>) -> Result<bool> {
        let stats = slot2reg(ir, ctx.code)?;
        let method = ctx.method();
        for _ in 0..stats.phis_inserted + stats.definedness_phis {
            ctx.events
                .record(EventKind::PhiInserted)
                .method(method.clone())
                .pass(self.name().as_str());
        }
        for _ in 0..stats.undef_checks {
            ctx.events
                .record(EventKind::NodeInserted)
                .method(method.clone())
                .message("undefined-variable check")
                .pass(self.name().as_str());
        }
        Ok(stats.slots > 0 || !ir.new_nodes.is_empty())
    }

    fn description(&self) -> &'static str {
        "Construct SSA form: rename slots and insert phi nodes"
    }
}

/// Applies pending insertions and removes dead blocks and unused no-ops.
pub struct CompactPass {
    name: PassName,
}

impl CompactPass {
    /// Creates the compaction stage `name` of the pipeline.
    #[must_use]
    pub fn new(name: PassName) -> Self {
        Self { name }
    }
}

impl OptPass for CompactPass {
    fn name(&self) -> PassName {
        self.name
    }

    fn run(&self, ir: &mut IrCode, ctx: &PassContext<'_>) -> Result<bool> {
        let stats = compact(ir)?;
        let method = ctx.method();
        let pass = self.name.as_str();
        let record = |kind: EventKind, count: usize| {
            for _ in 0..count {
                ctx.events.record(kind).method(method.clone()).pass(pass);
            }
        };
        record(EventKind::BlockEliminated, stats.blocks_removed);
        record(EventKind::StatementEliminated, stats.stmts_removed);
        record(EventKind::NodeInserted, stats.nodes_inserted);
        trace!(
            pass,
            blocks = stats.blocks_removed,
            stmts = stats.stmts_removed,
            inserted = stats.nodes_inserted,
            "compacted"
        );
        Ok(stats.changed())
    }

    fn description(&self) -> &'static str {
        "Apply pending insertions and delete unreachable blocks"
    }
}

/// Offers every resolved call site to the inliner.
///
/// A site is inlined only if the call-site policy allows it and the callee has a
/// cached body; sites are visited from last to first so that a splice never moves
/// a site still to be visited.
pub struct InliningPass;

impl InliningPass {
    fn call_sites(ir: &IrCode) -> Vec<usize> {
        ir.stmts
            .stmts
            .iter()
            .enumerate()
            .filter(|(_, stmt)| matches!(stmt, Stmt::Expr(Expr::Invoke { .. })))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn decline(ctx: &PassContext<'_>, site: usize, reason: &str) {
        debug!(method = %ctx.code.method.name, site, reason, "inlining declined");
        ctx.events
            .record(EventKind::InlineDeclined)
            .at(ctx.method(), site)
            .message(reason)
            .pass(PassName::Inlining.as_str());
    }
}

impl OptPass for InliningPass {
    fn name(&self) -> PassName {
        PassName::Inlining
    }

    fn should_run(&self, ir: &IrCode, _ctx: &PassContext<'_>) -> bool {
        ir.stmts
            .stmts
            .iter()
            .any(|stmt| matches!(stmt, Stmt::Expr(Expr::Invoke { .. })))
    }

    fn run(&self, ir: &mut IrCode, ctx: &PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for site in Self::call_sites(ir).into_iter().rev() {
            let Some(Stmt::Expr(Expr::Invoke { target, .. })) = ir.stmt(site) else {
                continue;
            };
            let target = target.clone();
            let flags = ir
                .stmts
                .flags
                .get(site)
                .copied()
                .unwrap_or_else(StmtFlags::empty);

            let callee = ctx.cache.get(&target);
            if !src_inlining_policy(callee.as_ref().map(|c| c.cost), flags) {
                let reason = if flags.has(StmtFlags::NOINLINE) {
                    "call site is marked noinline"
                } else if callee.is_none() {
                    "callee has not been compiled"
                } else {
                    "callee is not inlineable"
                };
                Self::decline(ctx, site, reason);
                continue;
            }
            let Some(callee) = callee.filter(|c| c.body.is_some()) else {
                Self::decline(ctx, site, "no callee body available");
                continue;
            };

            if ctx
                .collaborators
                .splicer
                .try_splice_callee(ir, site, &callee)?
            {
                ctx.events
                    .record(EventKind::CalleeInlined)
                    .at(ctx.method(), site)
                    .message(format!("inlined {target}"))
                    .pass(self.name().as_str());
                changed = true;
            } else {
                Self::decline(ctx, site, "splice not applicable");
            }
        }
        Ok(changed)
    }

    fn description(&self) -> &'static str {
        "Inline statically resolved callees below the cost threshold"
    }
}

/// Scalar replacement of aggregates, delegated to the configured transform.
pub struct SroaPass;

impl OptPass for SroaPass {
    fn name(&self) -> PassName {
        PassName::Sroa
    }

    fn run(&self, ir: &mut IrCode, ctx: &PassContext<'_>) -> Result<bool> {
        ctx.collaborators.sroa.transform(ir)
    }

    fn description(&self) -> &'static str {
        "Scalar replacement of aggregates"
    }
}

/// Aggressive dead code elimination, delegated to the configured transform.
pub struct AdcePass;

impl OptPass for AdcePass {
    fn name(&self) -> PassName {
        PassName::Adce
    }

    fn run(&self, ir: &mut IrCode, ctx: &PassContext<'_>) -> Result<bool> {
        ctx.collaborators.adce.transform(ir)
    }

    fn description(&self) -> &'static str {
        "Aggressive dead code elimination"
    }
}
