//! Effect summaries and their refinement.
//!
//! Inference attaches a conservative [`Effects`] summary to every body. After the
//! pipeline has run, the refinement engine ([`refine_effects`]) scans the optimized
//! body and upgrades the properties it can prove for the whole function. The
//! [`classify`] module provides the per-statement classification used wherever new
//! statements are created.
//!
//! # Properties
//!
//! | Position | Property              | Meaning                                        |
//! |----------|-----------------------|------------------------------------------------|
//! | `c`      | consistent            | same inputs give the same result              |
//! | `e`      | effect-free           | removing an unused call is unobservable        |
//! | `n`      | nothrow               | never raises                                   |
//! | `t`      | terminates            | always returns or raises                       |
//! | `m`      | inaccessiblememonly   | touches only memory unreachable by the caller  |
//! | `u`      | noub                  | never exhibits undefined behavior              |

pub mod classify;
mod refine;

use std::fmt;

pub use classify::{
    flags_for_effects, new_expr_effect_flags, recompute_effects_flags, stmt_effect_flags,
};
pub use refine::{refine_effects, RefinementOutcome};

/// Consistency of a body's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Consistency {
    /// Always consistent
    Always,
    /// Not known to be consistent
    #[default]
    Never,
    /// Consistent unless the result is a freshly allocated mutable object
    IfNotReturned,
    /// Consistent if only inaccessible memory is touched
    IfInaccessibleMemOnly,
}

/// Effect-freedom of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EffectFree {
    /// Always effect-free
    Always,
    /// Not known to be effect-free
    #[default]
    Never,
    /// Effect-free provided the memory it touches is inaccessible to the caller or
    /// reachable only through its arguments
    IfInaccessibleMemOnly,
}

/// Which memory a body may access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryScope {
    /// Only memory inaccessible to the caller
    Always,
    /// Any memory
    #[default]
    Never,
    /// Inaccessible memory or memory reachable from the arguments
    OrArgMem,
}

/// Absence of undefined behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NoUb {
    /// Never undefined behavior
    Always,
    /// Not known to be free of undefined behavior
    #[default]
    Never,
    /// Free of undefined behavior unless bounds checking was explicitly disabled
    IfNoInbounds,
}

/// The effect summary of a function body.
///
/// The default value claims nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Effects {
    /// Consistency of the result
    pub consistent: Consistency,
    /// Effect-freedom
    pub effect_free: EffectFree,
    /// Never throws
    pub nothrow: bool,
    /// Always terminates
    pub terminates: bool,
    /// Memory access scope
    pub inaccessiblememonly: MemoryScope,
    /// Absence of undefined behavior
    pub noub: NoUb,
}

impl Effects {
    /// Effects that claim nothing.
    pub const UNKNOWN: Effects = Effects {
        consistent: Consistency::Never,
        effect_free: EffectFree::Never,
        nothrow: false,
        terminates: false,
        inaccessiblememonly: MemoryScope::Never,
        noub: NoUb::Never,
    };

    /// Effects of a body with no observable behavior besides its result.
    pub const TOTAL: Effects = Effects {
        consistent: Consistency::Always,
        effect_free: EffectFree::Always,
        nothrow: true,
        terminates: true,
        inaccessiblememonly: MemoryScope::Always,
        noub: NoUb::Always,
    };

    /// Returns `true` if the body is always consistent.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.consistent == Consistency::Always
    }

    /// Returns `true` if the body is always effect-free.
    #[must_use]
    pub fn is_effect_free(&self) -> bool {
        self.effect_free == EffectFree::Always
    }

    /// Returns `true` if the body is effect-free only conditionally on memory scope.
    #[must_use]
    pub fn is_effect_free_if_inaccessiblememonly(&self) -> bool {
        self.effect_free == EffectFree::IfInaccessibleMemOnly
    }

    /// Returns `true` if the body never throws.
    #[must_use]
    pub fn is_nothrow(&self) -> bool {
        self.nothrow
    }

    /// Returns `true` if the body always terminates.
    #[must_use]
    pub fn is_terminates(&self) -> bool {
        self.terminates
    }

    /// Returns `true` if the body is free of undefined behavior.
    #[must_use]
    pub fn is_noub(&self) -> bool {
        self.noub == NoUb::Always
    }

    /// Returns `true` if the body only accesses inaccessible or argument memory.
    #[must_use]
    pub fn is_inaccessiblemem_or_argmemonly(&self) -> bool {
        self.inaccessiblememonly == MemoryScope::OrArgMem
    }

    /// Returns `true` if consistency, effect-freedom, nothrow and noub all hold
    /// unconditionally, so refinement has nothing left to prove.
    #[must_use]
    pub fn is_fully_refined(&self) -> bool {
        self.is_consistent() && self.is_effect_free() && self.is_nothrow() && self.is_noub()
    }
}

fn mark(always: bool, never: bool) -> char {
    if always {
        '+'
    } else if never {
        '!'
    } else {
        '?'
    }
}

impl fmt::Display for Effects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}c,{}e,{}n,{}t,{}m,{}u)",
            mark(self.is_consistent(), self.consistent == Consistency::Never),
            mark(self.is_effect_free(), self.effect_free == EffectFree::Never),
            mark(self.nothrow, !self.nothrow),
            mark(self.terminates, !self.terminates),
            mark(
                self.inaccessiblememonly == MemoryScope::Always,
                self.inaccessiblememonly == MemoryScope::Never
            ),
            mark(self.is_noub(), self.noub == NoUb::Never),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Effects::TOTAL.to_string(), "(+c,+e,+n,+t,+m,+u)");
        assert_eq!(Effects::UNKNOWN.to_string(), "(!c,!e,!n,!t,!m,!u)");
        let conditional = Effects {
            effect_free: EffectFree::IfInaccessibleMemOnly,
            inaccessiblememonly: MemoryScope::OrArgMem,
            noub: NoUb::IfNoInbounds,
            ..Effects::TOTAL
        };
        assert_eq!(conditional.to_string(), "(+c,?e,+n,+t,?m,?u)");
    }

    #[test]
    fn test_predicates() {
        assert!(Effects::TOTAL.is_fully_refined());
        assert!(!Effects::default().is_fully_refined());
        assert_eq!(Effects::default(), Effects::UNKNOWN);
        let e = Effects {
            effect_free: EffectFree::IfInaccessibleMemOnly,
            ..Effects::UNKNOWN
        };
        assert!(e.is_effect_free_if_inaccessiblememonly());
        assert!(!e.is_effect_free());
    }
}
