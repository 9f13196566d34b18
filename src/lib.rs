// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # ssaopt
//!
//! The optimizing middle-end of a function-level compiler. `ssaopt` takes typed,
//! control-flow-shaped bodies produced by type inference, converts them to SSA form,
//! runs a fixed pipeline of semantics-preserving passes over them and derives
//! function-wide effect facts and an inlining cost for later compilation stages.
//!
//! ## Features
//!
//! - **SSA construction** - dominance-frontier phi placement, renaming in dominator
//!   order, explicit handling of statically undefined slots
//! - **Renumbering protocol** - structural edits never manage indices by hand; one
//!   change map updates targets, phi edges and operands in a single sweep
//! - **Inlining cost model** - saturating per-statement costs with threshold
//!   short-circuiting and declaration-aware thresholds
//! - **Effect refinement** - def-use based consistency tracking, escape validated
//!   effect-freedom, conditional no-UB for bounds-checked accesses
//! - **Parallel driver** - independent bodies are optimized on the rayon thread pool
//!   and share a lock-free code cache
//!
//! ## Quick Start
//!
//! ```rust
//! use ssaopt::prelude::*;
//!
//! # fn main() -> ssaopt::Result<()> {
//! // f(c) = c ? g() : h()
//! let mut b = CodeBuilder::new("f", &[IrType::Bool]);
//! let x = b.slot("x", IrType::Int);
//! let other = b.new_label();
//! let join = b.new_label();
//! b.goto_if_not(Value::Argument(0), other);
//! b.store(x, Expr::generic("g", vec![]));
//! b.goto(join);
//! b.bind(other);
//! b.store(x, Expr::generic("h", vec![]));
//! b.bind(join);
//! b.ret(Value::Slot(x));
//! let code = b.finish()?;
//!
//! let optimizer = Optimizer::new(OptimizerConfig::default());
//! let result = optimizer.optimize(&code)?;
//! assert_eq!(result.ir.phi_count(), 1);
//! println!("{}", result.ir);
//! println!("{}", optimizer.events().summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - the IR model, renumbering, compaction and verification
//! - [`ssa`] - structural conversion and slot-to-SSA conversion
//! - [`analysis`] - def-use maps, (post-)dominator trees and the escape query
//! - [`cost`] - statement costs and the inlining decision
//! - [`effects`] - effect summaries, statement classification and refinement
//! - [`optimizer`] - passes, pipeline, code cache, events and the driver
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Errors signal malformed input
//! or a failing external collaborator; being unable to prove a property is never an
//! error.
//!
//! ```rust
//! use ssaopt::{ir::CodeBuilder, optimize, Error, OptimizerConfig};
//!
//! let empty = CodeBuilder::new("f", &[]).finish();
//! match empty.and_then(|code| optimize(&code, &OptimizerConfig::default())) {
//!     Ok(_) => println!("optimized"),
//!     Err(Error::EmptyBody) => println!("nothing to optimize"),
//!     Err(e) => println!("other error: {e}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use ssaopt::prelude::*;
///
/// let config = OptimizerConfig::default().stop_after(PassName::Sroa);
/// assert!(config.stop_after.is_some());
/// ```
pub mod prelude;

/// Bit sets, work sets and graph algorithms
///
/// The graph layer works on any type implementing the [`utils::graph::Successors`]
/// family of traits; the CFG of [`ir::IrCode`] is one such graph. Dominators are
/// computed with the Cooper-Harvey-Kennedy algorithm, post-dominators on the reversed
/// graph.
pub mod utils;

/// The intermediate representation
///
/// # Key Types
///
/// - [`ir::CodeInfo`] - an inferred body with slots and statement-index targets
/// - [`ir::IrCode`] - a block-structured body with block-index targets
/// - [`ir::Stmt`] / [`ir::Expr`] / [`ir::Value`] - statements and operands
/// - [`ir::Renumbering`] - the index remap applied after structural edits
pub mod ir;

/// Conversion into SSA form
pub mod ssa;

/// Whole-body analyses used by effect refinement
pub mod analysis;

/// The inlining cost model
pub mod cost;

/// Effect summaries and their refinement
pub mod effects;

/// Optimizer configuration
pub mod config;

/// The optimization pipeline
pub mod optimizer;

pub use config::{OptimizerConfig, StopAfter};
pub use error::{Error, Result};
pub use optimizer::{optimize, OptimizedCode, Optimizer, PassName};
