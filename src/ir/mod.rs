//! The intermediate representation consumed and produced by the optimizer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         IR Model                                 │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  CodeInfo                   Inferred body, statement targets     │
//! │    ├─ InstructionStream     stmts / types / lines / flags        │
//! │    ├─ slots                 types, flags, names                  │
//! │    └─ MethodInfo            name, declaration, signature         │
//! │                                                                  │
//! │  IrCode                     Block-structured body                │
//! │    ├─ InstructionStream                                          │
//! │    ├─ Cfg                   BasicBlock ranges + edges           │
//! │    ├─ argtypes                                                   │
//! │    └─ new_nodes             pending insertions                   │
//! │                                                                  │
//! │  Structural edits                                                │
//! │    ├─ renumber              ChangeMap, renumber_ir_elements      │
//! │    ├─ compact               apply insertions, drop dead code     │
//! │    └─ verify                debug-mode invariant checks          │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Values are named by the index of the statement that defines them ([`Value::Ssa`]),
//! so every structural edit must renumber operands; the [`renumber`] module is the only
//! place where that happens.

mod builder;
mod cfg;
mod code;
pub mod compact;
mod flags;
mod intrinsics;
pub mod renumber;
mod stmt;
mod stream;
mod types;
mod value;
pub mod verify;

pub use builder::{CodeBuilder, Label};
pub use cfg::{jump_target, BasicBlock, Cfg, StmtRange};
pub use code::{
    CodeInfo, InlineDeclaration, IrCode, MethodInfo, Signature, SignatureKind, ValueTypes,
};
pub use compact::{compact, CompactionStats};
pub use flags::{SlotFlags, StmtFlags};
pub use intrinsics::{Builtin, Intrinsic, IntrinsicInfo};
pub use renumber::{block_deltas, ChangeMap, Remap, Renumbering};
pub use stmt::{Callee, CalleeKey, Expr, Meta, PhiNode, Stmt};
pub use stream::{Instruction, InstructionStream, NewInstruction, NewNode};
pub use types::{IrType, Literal, StructType};
pub use value::Value;
pub use verify::verify_ir;
