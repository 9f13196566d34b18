//! Function bodies before and after structural conversion.
//!
//! [`CodeInfo`] is the input handed over by inference: a flat instruction stream with
//! statement-index control flow and mutable slots. [`IrCode`] is the block-structured
//! form every pipeline pass works on; it owns the CFG, the argument types and any
//! insertions still pending application by compaction.

use std::{fmt, sync::Arc};

use crate::{
    effects::{recompute_effects_flags, Effects},
    ir::{
        CalleeKey, Cfg, Instruction, InstructionStream, IrType, Meta, NewInstruction, NewNode,
        SlotFlags, Stmt, Value,
    },
    Error, Result,
};

/// Type lookup for operands.
pub trait ValueTypes {
    /// Returns the type of `value`.
    ///
    /// # Errors
    ///
    /// Returns an error for an operand that does not exist in this representation.
    fn value_type(&self, value: &Value) -> Result<IrType>;
}

/// The inlining declaration attached to a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InlineDeclaration {
    /// No declaration
    #[default]
    Default,
    /// Declared "always inline"
    Inline,
    /// Declared "never inline"
    NoInline,
}

/// The shape of a method signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureKind {
    /// Fixed positional parameters
    #[default]
    Positional,
    /// Positional parameters with a trailing variadic one
    Variadic,
    /// Anything else, for example keyword-sorting or generated signatures
    Other,
}

/// A method signature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    /// The signature shape
    pub kind: SignatureKind,
    /// Parameter types
    pub params: Vec<IrType>,
}

impl Signature {
    /// Returns `true` if every parameter type is concrete.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.params.iter().all(IrType::is_concrete)
    }
}

/// Properties of the method a body belongs to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodInfo {
    /// Method name
    pub name: Arc<str>,
    /// Whether the method is defined in the top-level standard module
    pub is_top_module: bool,
    /// Inlining declaration
    pub declared: InlineDeclaration,
    /// Signature
    pub signature: Signature,
}

impl MethodInfo {
    /// Creates method information with a positional signature.
    #[must_use]
    pub fn new(name: &str, params: Vec<IrType>) -> Self {
        Self {
            name: Arc::from(name),
            is_top_module: false,
            declared: InlineDeclaration::Default,
            signature: Signature {
                kind: SignatureKind::Positional,
                params,
            },
        }
    }

    /// Returns the code cache key of this method.
    #[must_use]
    pub fn key(&self) -> CalleeKey {
        CalleeKey(self.name.clone())
    }
}

/// An inferred function body before SSA construction.
///
/// Control-flow targets are statement indices. Slots `0..nargs` are the arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeInfo {
    /// The instruction stream
    pub code: InstructionStream,
    /// Inferred type of each slot
    pub slot_types: Vec<IrType>,
    /// Properties of each slot
    pub slot_flags: Vec<SlotFlags>,
    /// Debug name of each slot
    pub slot_names: Vec<Arc<str>>,
    /// Number of arguments
    pub nargs: usize,
    /// Whether the last argument is variadic
    pub isva: bool,
    /// The method this body implements
    pub method: MethodInfo,
    /// Effects inferred for the whole body
    pub ipo_effects: Effects,
    /// Inferred return type
    pub rettype: IrType,
}

impl CodeInfo {
    /// Returns the number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_types.len()
    }
}

impl ValueTypes for CodeInfo {
    fn value_type(&self, value: &Value) -> Result<IrType> {
        match value {
            Value::Argument(n) | Value::Slot(n) => self
                .slot_types
                .get(*n)
                .cloned()
                .ok_or_else(|| invalid_ir!("slot {} out of range", n)),
            Value::Ssa(idx) => self
                .code
                .types
                .get(*idx)
                .cloned()
                .ok_or_else(|| invalid_ir!("statement {} out of range", idx)),
            Value::Literal(lit) => Ok(IrType::Const(lit.clone())),
            Value::Undef => Ok(IrType::Any),
        }
    }
}

/// A block-structured function body.
///
/// Control-flow targets and phi edges are block indices. Pending insertions in
/// `new_nodes` are referenced as `Ssa(len + k)` and become part of the stream when
/// the body is compacted.
#[derive(Debug, Clone, PartialEq)]
pub struct IrCode {
    /// The instruction stream
    pub stmts: InstructionStream,
    /// The control-flow graph
    pub cfg: Cfg,
    /// Argument types
    pub argtypes: Vec<IrType>,
    /// Pending insertions
    pub new_nodes: Vec<NewNode>,
    /// Function-level annotations
    pub meta: Vec<Meta>,
}

impl IrCode {
    /// Creates a body with no pending insertions.
    #[must_use]
    pub fn new(stmts: InstructionStream, cfg: Cfg, argtypes: Vec<IrType>) -> Self {
        Self {
            stmts,
            cfg,
            argtypes,
            new_nodes: Vec::new(),
            meta: Vec::new(),
        }
    }

    /// Returns the number of statements, excluding pending insertions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    /// Returns `true` if the body has no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Returns the statement at `idx`, looking through pending insertions.
    #[must_use]
    pub fn stmt(&self, idx: usize) -> Option<&Stmt> {
        match self.stmts.stmts.get(idx) {
            Some(stmt) => Some(stmt),
            None => self
                .new_nodes
                .get(idx - self.len())
                .map(|node| &node.inst.stmt),
        }
    }

    /// Returns the block containing statement `idx`.
    #[must_use]
    pub fn block_for_inst(&self, idx: usize) -> usize {
        self.cfg.block_for_inst(idx)
    }

    /// Inserts an instruction before (or after) statement `pos` and returns the value
    /// naming it.
    ///
    /// The instruction is held pending until the next compaction. Missing flags are
    /// derived from the statement.
    pub fn insert_node(&mut self, pos: usize, inst: NewInstruction, attach_after: bool) -> Value {
        let flags = inst
            .flags
            .unwrap_or_else(|| recompute_effects_flags(&inst.stmt, &inst.ty, self));
        let value = Value::Ssa(self.len() + self.new_nodes.len());
        self.new_nodes.push(NewNode {
            pos,
            attach_after,
            inst: Instruction::new(inst.stmt, inst.ty, inst.line, flags),
        });
        value
    }

    /// Returns an error if insertions are still pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PendingNodes`] when `new_nodes` is not empty.
    pub fn ensure_compacted(&self) -> Result<()> {
        if self.new_nodes.is_empty() {
            Ok(())
        } else {
            Err(Error::PendingNodes(self.new_nodes.len()))
        }
    }

    /// Returns the number of phi nodes in the stream.
    #[must_use]
    pub fn phi_count(&self) -> usize {
        self.stmts
            .stmts
            .iter()
            .filter(|stmt| matches!(stmt, Stmt::Phi(_)))
            .count()
    }

    /// Returns the blocks that end in a value-returning `return`.
    #[must_use]
    pub fn return_blocks(&self) -> Vec<usize> {
        self.cfg
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| {
                block
                    .stmts
                    .last()
                    .is_some_and(|last| matches!(self.stmts.stmts[last], Stmt::Return(Some(_))))
            })
            .map(|(b, _)| b)
            .collect()
    }
}

impl ValueTypes for IrCode {
    fn value_type(&self, value: &Value) -> Result<IrType> {
        match value {
            Value::Argument(n) => self
                .argtypes
                .get(*n)
                .cloned()
                .ok_or_else(|| invalid_ir!("argument {} out of range", n)),
            Value::Ssa(idx) => {
                if let Some(ty) = self.stmts.types.get(*idx) {
                    return Ok(ty.clone());
                }
                self.new_nodes
                    .get(idx - self.len())
                    .map(|node| node.inst.ty.clone())
                    .ok_or_else(|| invalid_ir!("value %{} out of range", idx))
            }
            Value::Literal(lit) => Ok(IrType::Const(lit.clone())),
            Value::Slot(slot) => Err(Error::UnexpectedSlot(*slot)),
            Value::Undef => Ok(IrType::Any),
        }
    }
}

impl fmt::Display for IrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (b, block) in self.cfg.blocks.iter().enumerate() {
            write!(f, "#{b}")?;
            if !block.preds.is_empty() {
                write!(f, " <- {:?}", block.preds)?;
            }
            writeln!(f)?;
            for idx in block.stmts.iter() {
                let stmt = &self.stmts.stmts[idx];
                writeln!(f, "  %{idx} = {stmt} :: {}", self.stmts.types[idx])?;
            }
        }
        Ok(())
    }
}
