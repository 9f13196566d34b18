//! Whole-body analyses over compacted SSA code.
//!
//! These are the building blocks of effect refinement:
//!
//! - [`defuse`] - two-phase def-use map over statement indices
//! - [`dominance`] - lazily built dominator, post-dominator and return-augmented
//!   dominator trees
//! - [`escape`] - the escape query interface and a local implementation
//!
//! # Usage
//!
//! ```rust
//! use ssaopt::analysis::DominanceInfo;
//! use ssaopt::ir::{Cfg, Instruction, InstructionStream, IrCode, IrType, Stmt, StmtFlags, StmtRange};
//!
//! # fn main() -> ssaopt::Result<()> {
//! let stream: InstructionStream = [Stmt::Goto(1), Stmt::Return(None)]
//!     .into_iter()
//!     .map(|s| Instruction::new(s, IrType::Any, 0, StmtFlags::empty()))
//!     .collect();
//! let cfg = Cfg::from_block_ranges(vec![StmtRange::new(0, 1), StmtRange::new(1, 2)], &stream.stmts)?;
//! let ir = IrCode::new(stream, cfg, vec![]);
//!
//! let info = DominanceInfo::new(&ir);
//! assert!(info.post_dominates(1, 0));
//! # Ok(())
//! # }
//! ```

pub mod defuse;
pub mod dominance;
pub mod escape;

pub use defuse::TwoPhaseDefUseMap;
pub use dominance::{AugmentedDomTree, DominanceInfo};
pub use escape::{
    ArgEscapeSummary, EmptyEscapeCache, EscapeAnalyzer, EscapeCache, EscapeInfo, EscapeState,
    LocalEscapeAnalyzer,
};
