//! Statically known primitive operations.
//!
//! [`Intrinsic`]s are the leaf arithmetic and memory primitives that map directly to
//! machine instructions. [`Builtin`]s are the runtime's primitive functions for field,
//! tuple and memory access, type checks and the like. Both are closed sets with names
//! that round-trip through `Display`/`FromStr`.

use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// Arity bounds and base cost of an intrinsic with a cost table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntrinsicInfo {
    /// Minimum number of arguments
    pub min_args: usize,
    /// Maximum number of arguments
    pub max_args: usize,
    /// Approximate cost in native instructions
    pub cost: i64,
}

const fn info(min_args: usize, max_args: usize, cost: i64) -> Option<IntrinsicInfo> {
    Some(IntrinsicInfo {
        min_args,
        max_args,
        cost,
    })
}

/// Leaf primitives with a fixed cost.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, EnumCount, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Intrinsic {
    /// Integer negation
    NegInt,
    /// Integer addition
    AddInt,
    /// Integer subtraction
    SubInt,
    /// Integer multiplication
    MulInt,
    /// Signed integer division
    SdivInt,
    /// Unsigned integer division
    UdivInt,
    /// Signed integer remainder
    SremInt,
    /// Unsigned integer remainder
    UremInt,
    /// Float negation
    NegFloat,
    /// Float addition
    AddFloat,
    /// Float subtraction
    SubFloat,
    /// Float multiplication
    MulFloat,
    /// Float division
    DivFloat,
    /// Fused multiply-add
    FmaFloat,
    /// Square root
    SqrtLlvm,
    /// Integer equality
    EqInt,
    /// Integer inequality
    NeInt,
    /// Signed less-than
    SltInt,
    /// Signed less-or-equal
    SleInt,
    /// Unsigned less-than
    UltInt,
    /// Unsigned less-or-equal
    UleInt,
    /// Float equality
    EqFloat,
    /// Float less-than
    LtFloat,
    /// Float less-or-equal
    LeFloat,
    /// Bitwise and
    AndInt,
    /// Bitwise or
    OrInt,
    /// Bitwise xor
    XorInt,
    /// Bitwise not
    NotInt,
    /// Shift left
    ShlInt,
    /// Logical shift right
    LshrInt,
    /// Arithmetic shift right
    AshrInt,
    /// Reinterpret bits as another type
    Bitcast,
    /// Sign extension
    SextInt,
    /// Zero extension
    ZextInt,
    /// Integer truncation
    TruncInt,
    /// Signed integer to float
    Sitofp,
    /// Float to signed integer
    Fptosi,
    /// Load through a raw pointer
    Pointerref,
    /// Store through a raw pointer
    Pointerset,
    /// Address of a foreign global
    Cglobal,
    /// Inline backend code
    Llvmcall,
}

impl Intrinsic {
    /// Returns the cost table entry, or `None` for intrinsics the cost model does not
    /// understand.
    #[must_use]
    pub const fn info(self) -> Option<IntrinsicInfo> {
        use Intrinsic::*;
        match self {
            NegInt | NotInt | NegFloat => info(1, 1, 1),
            AddInt | SubInt | AndInt | OrInt | XorInt | ShlInt | LshrInt | AshrInt => {
                info(2, 2, 1)
            }
            EqInt | NeInt | SltInt | SleInt | UltInt | UleInt => info(2, 2, 1),
            AddFloat | SubFloat => info(2, 2, 1),
            EqFloat | LtFloat | LeFloat => info(2, 2, 2),
            MulInt | MulFloat => info(2, 2, 4),
            SdivInt | UdivInt | SremInt | UremInt => info(2, 2, 30),
            DivFloat => info(2, 2, 20),
            FmaFloat => info(3, 3, 5),
            SqrtLlvm => info(1, 1, 20),
            Bitcast => info(2, 2, 0),
            SextInt | ZextInt | TruncInt | Sitofp | Fptosi => info(2, 2, 1),
            Pointerref => info(3, 3, 4),
            Pointerset => info(4, 4, 5),
            Cglobal | Llvmcall => None,
        }
    }

    /// Returns `true` for integer division and remainder, which throw on a zero divisor.
    #[must_use]
    pub const fn is_division(self) -> bool {
        matches!(
            self,
            Intrinsic::SdivInt | Intrinsic::UdivInt | Intrinsic::SremInt | Intrinsic::UremInt
        )
    }

    /// Returns `true` if the intrinsic reads memory that may change between calls.
    #[must_use]
    pub const fn reads_memory(self) -> bool {
        matches!(self, Intrinsic::Pointerref | Intrinsic::Cglobal)
    }

    /// Returns `true` if the intrinsic writes memory.
    #[must_use]
    pub const fn writes_memory(self) -> bool {
        matches!(self, Intrinsic::Pointerset | Intrinsic::Llvmcall)
    }
}

/// Primitive runtime functions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, EnumCount, IntoStaticStr,
)]
pub enum Builtin {
    /// Read a field
    #[strum(serialize = "getfield")]
    Getfield,
    /// Write a field of a mutable object
    #[strum(serialize = "setfield!")]
    Setfield,
    /// Construct a tuple
    #[strum(serialize = "tuple")]
    Tuple,
    /// Read a global binding
    #[strum(serialize = "getglobal")]
    Getglobal,
    /// Write a global binding
    #[strum(serialize = "setglobal!")]
    Setglobal,
    /// Form a reference into a memory buffer
    #[strum(serialize = "memoryrefnew")]
    Memoryrefnew,
    /// Load through a memory reference
    #[strum(serialize = "memoryrefget")]
    Memoryrefget,
    /// Test whether a memory slot is assigned
    #[strum(serialize = "memoryref_isassigned")]
    MemoryrefIsassigned,
    /// Store through a memory reference
    #[strum(serialize = "memoryrefset!")]
    Memoryrefset,
    /// Read an array element
    #[strum(serialize = "arrayref")]
    Arrayref,
    /// Write an array element
    #[strum(serialize = "arrayset")]
    Arrayset,
    /// Assert a value has a type
    #[strum(serialize = "typeassert")]
    Typeassert,
    /// Type membership test
    #[strum(serialize = "isa")]
    Isa,
    /// Object identity
    #[strum(serialize = "===")]
    Egal,
    /// Dynamic type of a value
    #[strum(serialize = "typeof")]
    Typeof,
    /// Number of fields of a value
    #[strum(serialize = "nfields")]
    Nfields,
    /// Raise an exception
    #[strum(serialize = "throw")]
    Throw,
    /// Select between two values
    #[strum(serialize = "ifelse")]
    Ifelse,
    /// Instantiate a parametric type
    #[strum(serialize = "apply_type")]
    ApplyType,
    /// Construct a simple vector
    #[strum(serialize = "svec")]
    Svec,
    /// Register a finalizer
    #[strum(serialize = "finalizer")]
    Finalizer,
    /// Atomically modify a field
    #[strum(serialize = "modifyfield!")]
    Modifyfield,
}

impl Builtin {
    /// Returns the generic cost table entry, or `None` for builtins without one.
    ///
    /// Field access, tuple construction and element access are costed by dedicated
    /// rules in the cost model before this table is consulted.
    #[must_use]
    pub const fn table_cost(self) -> Option<i64> {
        use Builtin::*;
        match self {
            Isa | Egal | Typeof | Nfields | Ifelse | Memoryrefnew => Some(1),
            Throw => Some(0),
            Setfield | Setglobal => Some(3),
            Typeassert => Some(4),
            ApplyType => Some(10),
            Svec | Memoryrefget | MemoryrefIsassigned | Memoryrefset => Some(20),
            Getfield | Tuple | Getglobal => Some(0),
            Arrayref | Arrayset | Finalizer | Modifyfield => None,
        }
    }

    /// Minimum argument count (callee excluded) for which the trailing argument is the
    /// bounds-check flag.
    #[must_use]
    pub const fn boundscheck_arity(self) -> Option<usize> {
        match self {
            Builtin::Getfield
            | Builtin::Memoryrefnew
            | Builtin::Memoryrefget
            | Builtin::MemoryrefIsassigned => Some(3),
            Builtin::Memoryrefset => Some(4),
            _ => None,
        }
    }
}
