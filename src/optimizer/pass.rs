//! Pass traits of the optimization pipeline.
//!
//! [`OptPass`] is implemented by every stage that works on block-structured IR. The
//! transformations the optimizer does not implement itself are plugged in through
//! [`CalleeSplicer`] (inlining mechanics) and [`BodyTransform`] (SROA and ADCE).

use crate::{
    ir::IrCode,
    optimizer::{CachedCode, PassContext, PassName},
    Result,
};

/// A pipeline stage operating on [`IrCode`].
///
/// Passes must be thread-safe (Send + Sync) so that one pipeline can optimize many
/// bodies in parallel. A pass receives the threaded body mutably and everything else
/// through the shared [`PassContext`].
///
/// Passes must accept bodies that a previous compaction already freed of dead blocks,
/// and must leave the body consistent when they return, including on error.
pub trait OptPass: Send + Sync {
    /// Name of the stage, used for early termination and in events.
    fn name(&self) -> PassName;

    /// Should this pass run on the current body?
    ///
    /// A skipped pass still counts as completed for early termination.
    fn should_run(&self, _ir: &IrCode, _ctx: &PassContext<'_>) -> bool {
        true
    }

    /// Runs the pass, returning `true` if the body changed.
    ///
    /// Events are recorded directly to `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the body violates an invariant the pass relies on, or if
    /// an external collaborator failed.
    fn run(&self, ir: &mut IrCode, ctx: &PassContext<'_>) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// The mechanics of inlining a single call site.
///
/// The optimizer decides whether a call site may be inlined; implementations perform
/// the actual splice.
pub trait CalleeSplicer: Send + Sync {
    /// Replaces the call at statement `site` of `caller` by the body of `callee`.
    ///
    /// Returns `false` if the splice is not applicable, which is not an error.
    /// Statements before `site` must keep their indices; new statements may be added
    /// as pending insertions.
    ///
    /// # Errors
    ///
    /// Implementations report their own failures as [`crate::Error::Transform`].
    fn try_splice_callee(
        &self,
        caller: &mut IrCode,
        site: usize,
        callee: &CachedCode,
    ) -> Result<bool>;
}

/// A splicer that never inlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSplicing;

impl CalleeSplicer for NoSplicing {
    fn try_splice_callee(
        &self,
        _caller: &mut IrCode,
        _site: usize,
        _callee: &CachedCode,
    ) -> Result<bool> {
        Ok(false)
    }
}

/// An external whole-body transformation.
///
/// Implementations must preserve the CFG and SSA invariants of the body.
pub trait BodyTransform: Send + Sync {
    /// Transforms `ir` in place, returning `true` if it changed.
    ///
    /// # Errors
    ///
    /// Implementations report their own failures as [`crate::Error::Transform`].
    fn transform(&self, ir: &mut IrCode) -> Result<bool>;
}

/// A transformation that leaves the body unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl BodyTransform for IdentityTransform {
    fn transform(&self, _ir: &mut IrCode) -> Result<bool> {
        Ok(false)
    }
}
