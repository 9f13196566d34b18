//! Per-statement and per-slot property flags.
//!
//! Inference records what it proved about each statement in a [`StmtFlags`] bitmask.
//! Passes read these bits to decide what may be removed or reordered, and the effect
//! refinement engine accumulates them into function-wide facts. Two bits are
//! transitional: [`StmtFlags::EFIIMO`] and [`StmtFlags::INACCESSIBLEMEM_OR_ARGMEM`]
//! together mean "effect-free, provided the memory it touches turns out not to escape",
//! which only escape analysis can confirm.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Properties proven about a single statement
    pub struct StmtFlags: u32 {
        /// Bounds checks inside this statement are disabled
        const INBOUNDS = 1 << 0;
        /// The call site carries an "always inline" hint
        const INLINE = 1 << 1;
        /// The call site carries a "never inline" hint
        const NOINLINE = 1 << 2;
        /// The statement lies in a block that only leads to a throw
        const THROW_BLOCK = 1 << 3;
        /// The statement produces the same result for the same inputs
        const CONSISTENT = 1 << 4;
        /// Removing the statement, if unused, is unobservable
        const EFFECT_FREE = 1 << 5;
        /// The statement never throws
        const NOTHROW = 1 << 6;
        /// The statement cannot cause undefined behavior
        const NOUB = 1 << 7;
        /// Effect-free if it only touches inaccessible memory
        const EFIIMO = 1 << 8;
        /// Only accesses inaccessible memory or memory reachable from its arguments
        const INACCESSIBLEMEM_OR_ARGMEM = 1 << 9;

        /// Both transitional bits: effect-freedom awaits escape validation
        const NEEDS_EA = Self::EFIIMO.bits() | Self::INACCESSIBLEMEM_OR_ARGMEM.bits();
        /// Properties that together make an unused statement deletable
        const REMOVABLE = Self::EFFECT_FREE.bits() | Self::NOTHROW.bits() | Self::NOUB.bits();
        /// Every proven property; used for synthesized statements with no effects
        const PURE = Self::CONSISTENT.bits() | Self::REMOVABLE.bits();
    }
}

impl StmtFlags {
    /// Returns `true` if all bits of `flag` are set.
    ///
    /// Multi-bit flags such as [`StmtFlags::NEEDS_EA`] require every bit.
    #[must_use]
    #[inline]
    pub const fn has(self, flag: StmtFlags) -> bool {
        self.bits() & flag.bits() == flag.bits()
    }

    /// Builds flags from the `(consistent, removable, nothrow)` triple of
    /// [`crate::effects::stmt_effect_flags`].
    #[must_use]
    pub fn from_effect_triple(consistent: bool, removable: bool, nothrow: bool) -> Self {
        let mut flags = StmtFlags::empty();
        if consistent {
            flags |= StmtFlags::CONSISTENT;
        }
        if removable {
            flags |= StmtFlags::REMOVABLE;
        } else if nothrow {
            flags |= StmtFlags::NOTHROW;
        }
        flags
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Properties of a pre-SSA local variable
    pub struct SlotFlags: u8 {
        /// Some use may not be dominated by a definition
        const USED_UNDEF = 1 << 0;
        /// The slot is assigned exactly once
        const ASSIGNED_ONCE = 1 << 1;
        /// The slot is read before any write on some path
        const STATICALLY_UNDEF = 1 << 2;
    }
}
