//! The instruction stream: statements with their types, lines and flags.

use crate::ir::{IrType, Stmt, StmtFlags};

/// One fully annotated instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The statement
    pub stmt: Stmt,
    /// Inferred result type
    pub ty: IrType,
    /// Source line
    pub line: u32,
    /// Proven properties
    pub flags: StmtFlags,
}

impl Instruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(stmt: Stmt, ty: IrType, line: u32, flags: StmtFlags) -> Self {
        Self {
            stmt,
            ty,
            line,
            flags,
        }
    }
}

/// An instruction to be inserted, whose flags may still need to be derived.
///
/// When `flags` is `None` the flags are recomputed from the statement shape and the
/// argument types at insertion time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInstruction {
    /// The statement
    pub stmt: Stmt,
    /// Result type
    pub ty: IrType,
    /// Source line
    pub line: u32,
    /// Flags, or `None` to derive them
    pub flags: Option<StmtFlags>,
}

impl NewInstruction {
    /// Creates an instruction with derived flags and no line information.
    #[must_use]
    pub fn new(stmt: Stmt, ty: IrType) -> Self {
        Self {
            stmt,
            ty,
            line: 0,
            flags: None,
        }
    }

    /// Sets the source line.
    #[must_use]
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Sets explicit flags.
    #[must_use]
    pub fn with_flags(mut self, flags: StmtFlags) -> Self {
        self.flags = Some(flags);
        self
    }
}

/// A pending insertion relative to an existing statement.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    /// Index of the statement the node is attached to
    pub pos: usize,
    /// Insert after `pos` instead of before it
    pub attach_after: bool,
    /// The inserted instruction
    pub inst: Instruction,
}

/// Parallel vectors of statements, types, lines and flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructionStream {
    /// Statements
    pub stmts: Vec<Stmt>,
    /// Result types
    pub types: Vec<IrType>,
    /// Source lines
    pub lines: Vec<u32>,
    /// Statement flags
    pub flags: Vec<StmtFlags>,
}

impl InstructionStream {
    /// Creates an empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty stream with room for `capacity` instructions.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stmts: Vec::with_capacity(capacity),
            types: Vec::with_capacity(capacity),
            lines: Vec::with_capacity(capacity),
            flags: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    /// Returns `true` if the stream holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Appends an instruction and returns its index.
    pub fn push(&mut self, inst: Instruction) -> usize {
        self.stmts.push(inst.stmt);
        self.types.push(inst.ty);
        self.lines.push(inst.line);
        self.flags.push(inst.flags);
        self.stmts.len() - 1
    }

    /// Returns a copy of the instruction at `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<Instruction> {
        Some(Instruction {
            stmt: self.stmts.get(idx)?.clone(),
            ty: self.types.get(idx)?.clone(),
            line: *self.lines.get(idx)?,
            flags: *self.flags.get(idx)?,
        })
    }

    /// Replaces the statement at `idx`, keeping its other annotations.
    pub fn set_stmt(&mut self, idx: usize, stmt: Stmt) {
        if let Some(slot) = self.stmts.get_mut(idx) {
            *slot = stmt;
        }
    }

    /// Adds `flag` to the flags of the statement at `idx`.
    pub fn add_flag(&mut self, idx: usize, flag: StmtFlags) {
        if let Some(flags) = self.flags.get_mut(idx) {
            *flags |= flag;
        }
    }

    /// Returns `true` if the statement at `idx` carries every bit of `flag`.
    #[must_use]
    pub fn has_flag(&self, idx: usize, flag: StmtFlags) -> bool {
        self.flags.get(idx).is_some_and(|flags| flags.has(flag))
    }

    /// Returns an iterator over all instructions in order, as copies.
    pub fn iter(&self) -> impl Iterator<Item = Instruction> + '_ {
        (0..self.len()).filter_map(|idx| self.get(idx))
    }
}

impl FromIterator<Instruction> for InstructionStream {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        let mut stream = InstructionStream::new();
        for inst in iter {
            stream.push(inst);
        }
        stream
    }
}
