//! Conversion of inferred bodies into SSA form.
//!
//! Two passes lead from a [`crate::ir::CodeInfo`] to slot-free SSA code:
//!
//! - [`convert_to_ircode`] computes basic blocks from statement-index control flow,
//!   inserts unreachable and coverage markers and rewrites targets into block indices.
//! - [`slot2reg`] replaces slots with SSA values and phi nodes.
//!
//! Both index-changing edits go through [`crate::ir::renumber`]; the phis and checks
//! inserted by [`slot2reg`] are pending nodes applied by the next compaction.
//!
//! # Usage
//!
//! ```rust
//! use ssaopt::ir::{compact, CodeBuilder, Expr, IrType, Value};
//! use ssaopt::ssa::{convert_to_ircode, slot2reg};
//!
//! # fn main() -> ssaopt::Result<()> {
//! let mut b = CodeBuilder::new("f", &[IrType::Bool]);
//! let x = b.slot("x", IrType::Int);
//! let other = b.new_label();
//! let join = b.new_label();
//! b.goto_if_not(Value::Argument(0), other);
//! b.store(x, Expr::generic("f", vec![]));
//! b.goto(join);
//! b.bind(other);
//! b.store(x, Expr::generic("g", vec![]));
//! b.bind(join);
//! b.ret(Value::Slot(x));
//! let code = b.finish()?;
//!
//! let mut ir = convert_to_ircode(&code, false)?;
//! let stats = slot2reg(&mut ir, &code)?;
//! compact(&mut ir)?;
//! assert_eq!(stats.phis_inserted, 1);
//! assert_eq!(ir.phi_count(), 1);
//! # Ok(())
//! # }
//! ```

mod construct;
mod convert;
pub mod scan;

pub use construct::{slot2reg, SsaStats};
pub use convert::convert_to_ircode;
