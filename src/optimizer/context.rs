//! Shared state handed to every pass.

use std::sync::Arc;

use crate::{
    analysis::{EscapeAnalyzer, LocalEscapeAnalyzer},
    config::OptimizerConfig,
    ir::CodeInfo,
    optimizer::{BodyTransform, CalleeSplicer, CodeCache, EventLog, IdentityTransform, NoSplicing},
};

/// The external components the pipeline delegates to.
///
/// The default set inlines nothing, leaves SROA and ADCE as no-ops and uses
/// [`LocalEscapeAnalyzer`] for escape queries, which makes the pipeline usable on its
/// own.
pub struct Collaborators {
    /// Inlining mechanics
    pub splicer: Box<dyn CalleeSplicer>,
    /// Scalar replacement of aggregates
    pub sroa: Box<dyn BodyTransform>,
    /// Aggressive dead code elimination
    pub adce: Box<dyn BodyTransform>,
    /// Escape query used by effect refinement
    pub escape: Box<dyn EscapeAnalyzer>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            splicer: Box::new(NoSplicing),
            sroa: Box::new(IdentityTransform),
            adce: Box::new(IdentityTransform),
            escape: Box::new(LocalEscapeAnalyzer),
        }
    }
}

/// Context of one body's trip through the pipeline.
///
/// Everything in here is shared: the only mutable value is the body itself, which
/// passes receive separately.
pub struct PassContext<'a> {
    /// The inferred body being optimized
    pub code: &'a CodeInfo,
    /// Optimizer configuration
    pub config: &'a OptimizerConfig,
    /// Cache of compiled callees
    pub cache: &'a CodeCache,
    /// Change log
    pub events: &'a EventLog,
    /// External components
    pub collaborators: &'a Collaborators,
}

impl PassContext<'_> {
    /// Returns the name of the method being optimized.
    #[must_use]
    pub fn method(&self) -> Arc<str> {
        Arc::clone(&self.code.method.name)
    }
}
