//! # ssaopt Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the ssaopt library. Import this module to get quick access to the essential
//! types for building bodies and running the optimizer.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ssaopt operations
pub use crate::Error;

/// The result type used throughout ssaopt
pub use crate::Result;

/// Optimizer configuration and early termination
pub use crate::{OptimizerConfig, StopAfter};

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The optimizer driver and its single-body shortcut
pub use crate::optimizer::{optimize, OptimizedCode, Optimizer};

/// Pipeline structure and extension points
pub use crate::optimizer::{
    BodyTransform, CachedCode, CalleeSplicer, CodeCache, OptPass, PassContext, PassName, Pipeline,
};

/// Change tracking
pub use crate::optimizer::{EventKind, EventLog};

// ================================================================================================
// IR Model
// ================================================================================================

/// Bodies and their construction
pub use crate::ir::{CodeBuilder, CodeInfo, IrCode, MethodInfo};

/// Statements, expressions and operands
pub use crate::ir::{Builtin, Callee, CalleeKey, Expr, Intrinsic, Stmt, Value};

/// Types and flags
pub use crate::ir::{IrType, Literal, SlotFlags, StmtFlags};

// ================================================================================================
// Analysis Results
// ================================================================================================

/// Effect summaries
pub use crate::effects::Effects;

/// Inlining decisions
pub use crate::cost::{InlineCost, InlineDecision};
