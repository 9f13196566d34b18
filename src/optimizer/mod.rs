//! The optimization pipeline and its driver.
//!
//! An [`Optimizer`] takes inferred bodies ([`crate::ir::CodeInfo`]) through a fixed
//! sequence of passes, refines their effects and decides whether callers may inline
//! them:
//!
//! ```text
//! convert → slot2reg → compact 1 → Inlining → compact 2 → SROA → ADCE → compact 3
//!                                                                         │
//!                                   refine_effects → finish → CodeCache ◄─┘
//! ```
//!
//! # Key Components
//!
//! - [`Pipeline`] - ordered passes with early termination ([`crate::config::StopAfter`])
//! - [`OptPass`] - the pass trait; [`CalleeSplicer`] and [`BodyTransform`] plug in the
//!   inliner, SROA and ADCE
//! - [`CodeCache`] - compiled bodies shared between concurrently optimized bodies
//! - [`EventLog`] - what every pass did
//! - [`finish`] - the final inlining decision
//!
//! # Concurrency
//!
//! Each body is optimized on its own; the only shared mutable state is the
//! [`CodeCache`] and the [`EventLog`], both of which take shared references.
//! [`Optimizer::optimize_all`] spreads bodies over the rayon thread pool.
//!
//! # Usage
//!
//! ```rust
//! use ssaopt::ir::{CodeBuilder, Expr, IrType, Value};
//! use ssaopt::{optimize, OptimizerConfig};
//!
//! # fn main() -> ssaopt::Result<()> {
//! let mut b = CodeBuilder::new("twice", &[IrType::Int]);
//! let x = b.slot("x", IrType::Int);
//! b.store(x, Value::Argument(0));
//! b.ret(Value::Slot(x));
//! let code = b.finish()?;
//!
//! let result = optimize(&code, &OptimizerConfig::default())?;
//! assert!(result.is_complete());
//! assert_eq!(result.ir.phi_count(), 0);
//! # Ok(())
//! # }
//! ```

mod cache;
mod context;
mod events;
mod finish;
mod pass;
mod passes;
mod pipeline;

use std::sync::Arc;

use rayon::prelude::*;
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::debug;

use crate::{
    analysis::EscapeAnalyzer,
    config::OptimizerConfig,
    effects::refine_effects,
    ir::CodeInfo,
    Result,
};

pub use cache::{CachedCode, CodeCache};
pub use context::{Collaborators, PassContext};
pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter};
pub use finish::{finish, OptimizedCode};
pub use pass::{BodyTransform, CalleeSplicer, IdentityTransform, NoSplicing, OptPass};
pub use passes::{AdcePass, CompactPass, InliningPass, SroaPass, Slot2RegPass};
pub use pipeline::{Pipeline, PipelineRun};

/// Names of the stages of the standard pipeline, in execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumCount,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
pub enum PassName {
    /// Structural conversion into blocks
    #[strum(serialize = "convert")]
    Convert,
    /// SSA construction
    #[strum(serialize = "slot2reg")]
    Slot2reg,
    /// First compaction
    #[strum(serialize = "compact 1")]
    Compact1,
    /// Inlining
    #[strum(serialize = "Inlining")]
    Inlining,
    /// Second compaction
    #[strum(serialize = "compact 2")]
    Compact2,
    /// Scalar replacement of aggregates
    #[strum(serialize = "SROA")]
    Sroa,
    /// Aggressive dead code elimination
    #[strum(serialize = "ADCE")]
    Adce,
    /// Final compaction
    #[strum(serialize = "compact 3")]
    Compact3,
}

impl PassName {
    /// Returns the display name of the stage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Returns the 1-based position of the stage in the standard pipeline.
    #[must_use]
    pub fn ordinal(self) -> usize {
        PassName::iter().position(|p| p == self).map_or(PassName::COUNT, |i| i + 1)
    }
}

/// Drives bodies through the pipeline and publishes the results.
///
/// The optimizer owns its configuration, collaborators and event log; the code
/// cache is shared so that several optimizers, or several runs, can see each
/// other's results.
pub struct Optimizer {
    config: OptimizerConfig,
    pipeline: Pipeline,
    collaborators: Collaborators,
    cache: Arc<CodeCache>,
    events: EventLog,
}

impl Optimizer {
    /// Creates an optimizer with the standard pipeline, default collaborators and an
    /// empty cache.
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            pipeline: Pipeline::standard(),
            collaborators: Collaborators::default(),
            cache: Arc::new(CodeCache::new()),
            events: EventLog::new(),
        }
    }

    /// Uses `cache` for callee lookups and to publish results.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CodeCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Replaces the inlining mechanics.
    #[must_use]
    pub fn with_splicer(mut self, splicer: impl CalleeSplicer + 'static) -> Self {
        self.collaborators.splicer = Box::new(splicer);
        self
    }

    /// Replaces the SROA transformation.
    #[must_use]
    pub fn with_sroa(mut self, sroa: impl BodyTransform + 'static) -> Self {
        self.collaborators.sroa = Box::new(sroa);
        self
    }

    /// Replaces the ADCE transformation.
    #[must_use]
    pub fn with_adce(mut self, adce: impl BodyTransform + 'static) -> Self {
        self.collaborators.adce = Box::new(adce);
        self
    }

    /// Replaces the escape analysis used by effect refinement.
    #[must_use]
    pub fn with_escape_analyzer(mut self, escape: impl EscapeAnalyzer + 'static) -> Self {
        self.collaborators.escape = Box::new(escape);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Returns the shared code cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<CodeCache> {
        &self.cache
    }

    /// Returns the event log.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Optimizes one body.
    ///
    /// When the pipeline completes, the body's effects are refined, its inlining
    /// cost is decided and the result is published to the code cache. A run that
    /// stops early returns the partial body with the inferred effects.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is malformed or a collaborator failed.
    pub fn optimize(&self, code: &CodeInfo) -> Result<OptimizedCode> {
        let ctx = PassContext {
            code,
            config: &self.config,
            cache: &self.cache,
            events: &self.events,
            collaborators: &self.collaborators,
        };

        let run = self.pipeline.run(&ctx)?;
        if let Some(stopped_after) = run.stopped_after {
            return Ok(OptimizedCode::partial(run.ir, code, stopped_after));
        }

        let refinement = refine_effects(
            &run.ir,
            code.ipo_effects,
            code.nargs,
            self.collaborators.escape.as_ref(),
            self.cache.as_ref(),
        )?;
        if refinement.abandoned {
            self.events
                .record(EventKind::RefinementAbandoned)
                .method(ctx.method())
                .message("exception region");
        } else if refinement.refined {
            self.events
                .record(EventKind::EffectsRefined)
                .method(ctx.method())
                .message(format!("{} -> {}", code.ipo_effects, refinement.effects));
        }

        let result = finish(run.ir, code, refinement, &self.config)?;
        if let Some(decision) = result.inlining {
            self.events
                .record(EventKind::CostComputed)
                .method(ctx.method())
                .message(format!("inlining cost {}", decision.cost()));
        }
        if let Some(entry) = result.cache_entry(code) {
            self.cache.insert(code.method.key(), entry);
        }

        debug!(
            method = %code.method.name,
            effects = %result.effects,
            cost = ?result.inline_cost(),
            "optimized"
        );
        Ok(result)
    }

    /// Optimizes many bodies in parallel.
    ///
    /// Results are returned in input order, one per body. Bodies see the cache
    /// entries of bodies that finished before them; to inline a callee into its
    /// callers reliably, optimize the callee first.
    pub fn optimize_all(&self, codes: &[CodeInfo]) -> Vec<Result<OptimizedCode>> {
        codes.par_iter().map(|code| self.optimize(code)).collect()
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

/// Optimizes one body with the standard pipeline and default collaborators.
///
/// # Errors
///
/// Returns an error if the body is malformed.
pub fn optimize(code: &CodeInfo, config: &OptimizerConfig) -> Result<OptimizedCode> {
    Optimizer::new(config.clone()).optimize(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_pass_names() {
        assert_eq!(PassName::Compact1.to_string(), "compact 1");
        assert_eq!(PassName::Sroa.as_str(), "SROA");
        assert_eq!(PassName::from_str("ADCE").ok(), Some(PassName::Adce));
        assert_eq!(PassName::Convert.ordinal(), 1);
        assert_eq!(PassName::Compact3.ordinal(), 8);
        assert_eq!(
            Pipeline::standard().names(),
            PassName::iter().collect::<Vec<_>>()
        );
    }
}
