//! Ordered execution of the pipeline stages.

use tracing::debug;

use crate::{
    ir::{verify_ir, IrCode},
    optimizer::{
        AdcePass, CompactPass, EventKind, InliningPass, OptPass, PassContext, PassName,
        SroaPass, Slot2RegPass,
    },
    ssa::convert_to_ircode,
    Result,
};

/// The body a pipeline run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    /// The resulting body
    pub ir: IrCode,
    /// The pass after which the run stopped early, if it did
    pub stopped_after: Option<PassName>,
    /// Whether any pass after conversion changed the body
    pub changed: bool,
}

/// A fixed sequence of passes.
///
/// Every run starts with structural conversion, which is the only stage whose input
/// is the inferred body rather than [`IrCode`]. The remaining stages follow in the
/// order they were added. After every stage the body is consistent, so a run that
/// stops early returns a usable body.
pub struct Pipeline {
    passes: Vec<Box<dyn OptPass>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl Pipeline {
    /// The standard pipeline: `convert`, `slot2reg`, `compact 1`, `Inlining`,
    /// `compact 2`, `SROA`, `ADCE`, `compact 3`.
    #[must_use]
    pub fn standard() -> Self {
        Self::with_passes(vec![
            Box::new(Slot2RegPass),
            Box::new(CompactPass::new(PassName::Compact1)),
            Box::new(InliningPass),
            Box::new(CompactPass::new(PassName::Compact2)),
            Box::new(SroaPass),
            Box::new(AdcePass),
            Box::new(CompactPass::new(PassName::Compact3)),
        ])
    }

    /// Creates a pipeline running `passes` after structural conversion.
    #[must_use]
    pub fn with_passes(passes: Vec<Box<dyn OptPass>>) -> Self {
        Self { passes }
    }

    /// Returns the stage names in execution order, conversion included.
    #[must_use]
    pub fn names(&self) -> Vec<PassName> {
        std::iter::once(PassName::Convert)
            .chain(self.passes.iter().map(|p| p.name()))
            .collect()
    }

    /// Returns the number of stages, conversion included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len() + 1
    }

    /// Always `false`: a pipeline contains at least the conversion stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Runs the pipeline on `ctx.code`.
    ///
    /// # Errors
    ///
    /// Returns the first error of a stage, or of verification when
    /// [`crate::OptimizerConfig::verify_ir`] is set.
    pub fn run(&self, ctx: &PassContext<'_>) -> Result<PipelineRun> {
        let mut ir = convert_to_ircode(ctx.code, ctx.config.insert_coverage)?;
        if self.completed(&ir, PassName::Convert, 1, ctx)? {
            return Ok(PipelineRun {
                ir,
                stopped_after: Some(PassName::Convert),
                changed: false,
            });
        }

        let mut changed = false;
        for (i, pass) in self.passes.iter().enumerate() {
            let name = pass.name();
            if pass.should_run(&ir, ctx) {
                debug!(method = %ctx.code.method.name, pass = %name, "running pass");
                changed |= pass.run(&mut ir, ctx)?;
            } else {
                debug!(method = %ctx.code.method.name, pass = %name, "pass skipped");
            }
            if self.completed(&ir, name, i + 2, ctx)? {
                return Ok(PipelineRun {
                    ir,
                    stopped_after: Some(name),
                    changed,
                });
            }
        }

        Ok(PipelineRun {
            ir,
            stopped_after: None,
            changed,
        })
    }

    /// Verifies and logs a completed stage; returns `true` if the run stops here.
    fn completed(
        &self,
        ir: &IrCode,
        name: PassName,
        ordinal: usize,
        ctx: &PassContext<'_>,
    ) -> Result<bool> {
        if ctx.config.verify_ir {
            verify_ir(ir, name == PassName::Convert)?;
        }
        ctx.events
            .record(EventKind::PassCompleted)
            .method(ctx.method())
            .pass(name.as_str());

        let stop = ctx
            .config
            .stop_after
            .is_some_and(|stop| stop.matches(name, ordinal));
        if stop {
            debug!(method = %ctx.code.method.name, pass = %name, ordinal, "pipeline stopped");
            ctx.events
                .record(EventKind::PipelineStopped)
                .method(ctx.method())
                .message(format!("stopped after {name}"))
                .pass(name.as_str());
        }
        Ok(stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::OptimizerConfig,
        ir::{CodeBuilder, Expr, IrType, Stmt, Value},
        optimizer::{CodeCache, Collaborators, EventLog},
    };

    fn branchy() -> crate::ir::CodeInfo {
        let mut b = CodeBuilder::new("f", &[IrType::Bool]);
        let x = b.slot("x", IrType::Int);
        let other = b.new_label();
        let join = b.new_label();
        b.goto_if_not(Value::Argument(0), other);
        b.store(x, Expr::generic("f", vec![]));
        b.goto(join);
        b.bind(other);
        b.store(x, Expr::generic("g", vec![]));
        b.bind(join);
        b.ret(Value::Slot(x));
        b.finish().expect("code")
    }

    fn run_with(config: &OptimizerConfig, events: &EventLog) -> Result<PipelineRun> {
        let code = branchy();
        let cache = CodeCache::new();
        let collaborators = Collaborators::default();
        let ctx = PassContext {
            code: &code,
            config,
            cache: &cache,
            events,
            collaborators: &collaborators,
        };
        Pipeline::standard().run(&ctx)
    }

    #[test]
    fn test_standard_order() {
        let names = Pipeline::standard().names();
        assert_eq!(
            names,
            vec![
                PassName::Convert,
                PassName::Slot2reg,
                PassName::Compact1,
                PassName::Inlining,
                PassName::Compact2,
                PassName::Sroa,
                PassName::Adce,
                PassName::Compact3,
            ]
        );
        assert_eq!(Pipeline::standard().len(), 8);
    }

    #[test]
    fn test_full_run() -> Result<()> {
        let events = EventLog::new();
        let config = OptimizerConfig::default().with_verification(true);
        let run = run_with(&config, &events)?;
        assert!(run.stopped_after.is_none());
        assert!(run.ir.new_nodes.is_empty());
        assert_eq!(run.ir.phi_count(), 1);
        assert_eq!(events.count_kind(EventKind::PassCompleted), 8);
        assert_eq!(events.count_kind(EventKind::PhiInserted), 1);
        assert!(!events.has(EventKind::PipelineStopped));
        Ok(())
    }

    #[test]
    fn test_stop_after_convert_keeps_slots() -> Result<()> {
        let events = EventLog::new();
        let config = OptimizerConfig::default().stop_after(PassName::Convert);
        let run = run_with(&config, &events)?;
        assert_eq!(run.stopped_after, Some(PassName::Convert));
        assert!(run
            .ir
            .stmts
            .stmts
            .iter()
            .any(|s| matches!(s, Stmt::SlotStore { .. })));
        assert!(events.has(EventKind::PipelineStopped));
        Ok(())
    }

    #[test]
    fn test_stop_after_ordinal() -> Result<()> {
        let events = EventLog::new();
        let config = OptimizerConfig::default().stop_after_ordinal(2);
        let run = run_with(&config, &events)?;
        assert_eq!(run.stopped_after, Some(PassName::Slot2reg));
        assert!(!run.ir.new_nodes.is_empty());
        assert_eq!(events.count_kind(EventKind::PassCompleted), 2);
        Ok(())
    }
}
