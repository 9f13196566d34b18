//! Inlining cost model.
//!
//! Every statement is assigned an approximate native-code cost
//! ([`statement_or_branch_cost`]); the costs of a body are accumulated with
//! [`plus_saturate`] and clamped into `[MIN_INLINE_COST, MAX_INLINE_COST]`
//! ([`inline_cost_model`]). [`MAX_INLINE_COST`] doubles as the "never inline"
//! marker. Whether a body is inlined at all is decided by [`decide_inlining`], which
//! combines the cost with the method's declarations.
//!
//! # Usage
//!
//! ```rust
//! use ssaopt::cost::{is_inlineable, plus_saturate, MAX_INLINE_COST, MIN_INLINE_COST};
//!
//! assert_eq!(plus_saturate(3, 4), 7);
//! assert_eq!(plus_saturate(i64::MAX, 1), i64::MAX);
//! assert!(is_inlineable(MIN_INLINE_COST));
//! assert!(!is_inlineable(MAX_INLINE_COST));
//! ```

mod model;
mod policy;

pub use model::{
    inline_cost_clamp, inline_cost_model, plus_saturate, statement_cost,
    statement_or_branch_cost, BACKEDGE_COST, FOREIGN_CALL_COST, GLOBAL_STORE_COST,
    UNKNOWN_CALL_COST,
};
pub use policy::{
    cost_threshold, decide_inlining, forced_noinline, src_inlining_policy, InlineDecision,
    NoInlineReason,
};

/// Inlining cost of a body.
pub type InlineCost = u16;

/// Smallest cost a body is assigned.
pub const MIN_INLINE_COST: InlineCost = 10;

/// Cost of a body that must never be inlined.
pub const MAX_INLINE_COST: InlineCost = InlineCost::MAX;

/// Returns `true` unless `cost` is the "never inline" marker.
#[must_use]
pub const fn is_inlineable(cost: InlineCost) -> bool {
    cost != MAX_INLINE_COST
}
