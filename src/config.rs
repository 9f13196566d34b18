//! Configuration for the optimizer.
//!
//! [`OptimizerConfig`] collects the inlining cost tunables and the pipeline switches.
//! The defaults match the thresholds the cost model was calibrated against.

use crate::optimizer::PassName;

/// Where the pipeline stops early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAfter {
    /// Stop after the pass with this name
    Name(PassName),
    /// Stop after the n-th pass, counting from 1
    Ordinal(usize),
}

impl StopAfter {
    /// Returns `true` if the pipeline stops after pass `name` at 1-based position
    /// `ordinal`.
    #[must_use]
    pub fn matches(&self, name: PassName, ordinal: usize) -> bool {
        match self {
            StopAfter::Name(stop) => *stop == name,
            StopAfter::Ordinal(stop) => *stop == ordinal,
        }
    }
}

/// Configuration for [`crate::optimize`].
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Base cost threshold below which a body is inlineable (default: 100).
    pub inline_cost_threshold: i64,

    /// Cost of a call that is not a leaf operation (default: 1000).
    pub inline_nonleaf_penalty: i64,

    /// Threshold bonus for bodies returning a non-concrete tuple (default: 250).
    pub inline_tupleret_bonus: i64,

    /// Cost of a call on a path that always throws (default: 20).
    pub inline_error_path_cost: i64,

    /// Names of hot standard operations whose threshold is raised.
    pub hot_operations: Vec<String>,

    /// Insert a coverage marker whenever the source line changes.
    pub insert_coverage: bool,

    /// Stop the pipeline early.
    pub stop_after: Option<StopAfter>,

    /// Verify the IR after every pass (default: on in debug builds).
    pub verify_ir: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            inline_cost_threshold: 100,
            inline_nonleaf_penalty: 1000,
            inline_tupleret_bonus: 250,
            inline_error_path_cost: 20,
            hot_operations: vec![
                "iterate".to_string(),
                "unsafe_convert".to_string(),
                "cconvert".to_string(),
            ],
            insert_coverage: false,
            stop_after: None,
            verify_ir: cfg!(debug_assertions),
        }
    }
}

impl OptimizerConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base inlining threshold.
    #[must_use]
    pub fn with_inline_cost_threshold(mut self, threshold: i64) -> Self {
        self.inline_cost_threshold = threshold;
        self
    }

    /// Sets the penalty for non-leaf calls.
    #[must_use]
    pub fn with_nonleaf_penalty(mut self, penalty: i64) -> Self {
        self.inline_nonleaf_penalty = penalty;
        self
    }

    /// Sets the tuple-return threshold bonus.
    #[must_use]
    pub fn with_tupleret_bonus(mut self, bonus: i64) -> Self {
        self.inline_tupleret_bonus = bonus;
        self
    }

    /// Sets the cost of calls on always-throwing paths.
    #[must_use]
    pub fn with_error_path_cost(mut self, cost: i64) -> Self {
        self.inline_error_path_cost = cost;
        self
    }

    /// Replaces the list of hot operations.
    #[must_use]
    pub fn with_hot_operations<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hot_operations = names.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables coverage markers.
    #[must_use]
    pub fn with_coverage(mut self, enable: bool) -> Self {
        self.insert_coverage = enable;
        self
    }

    /// Stops the pipeline after the named pass.
    #[must_use]
    pub fn stop_after(mut self, name: PassName) -> Self {
        self.stop_after = Some(StopAfter::Name(name));
        self
    }

    /// Stops the pipeline after the `ordinal`-th pass, counting from 1.
    #[must_use]
    pub fn stop_after_ordinal(mut self, ordinal: usize) -> Self {
        self.stop_after = Some(StopAfter::Ordinal(ordinal));
        self
    }

    /// Enables or disables IR verification after every pass.
    #[must_use]
    pub fn with_verification(mut self, enable: bool) -> Self {
        self.verify_ir = enable;
        self
    }

    /// Returns `true` if `name` is one of the hot operations.
    #[must_use]
    pub fn is_hot_operation(&self, name: &str) -> bool {
        self.hot_operations.iter().any(|hot| hot == name)
    }
}
