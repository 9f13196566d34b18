//! Programmatic construction of [`CodeInfo`] bodies.
//!
//! The builder plays the role of the inference stage in tests, benchmarks and
//! embedders: it assembles a flat statement list with symbolic jump labels, slot
//! declarations and per-statement annotations, then resolves labels into statement
//! indices.
//!
//! # Examples
//!
//! ```rust
//! use ssaopt::ir::{CodeBuilder, Expr, IrType, Value};
//!
//! # fn main() -> ssaopt::Result<()> {
//! // f(c) = (x = c ? 1 : 2; x)
//! let mut b = CodeBuilder::new("f", &[IrType::Bool]);
//! let x = b.slot("x", IrType::Int);
//! let other = b.new_label();
//! let join = b.new_label();
//! b.goto_if_not(Value::Argument(0), other);
//! b.store(x, Value::int(1));
//! b.goto(join);
//! b.bind(other);
//! b.store(x, Value::int(2));
//! b.bind(join);
//! b.ret(Value::Slot(x));
//! let code = b.finish()?;
//! assert_eq!(code.code.len(), 5);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::{
    effects::{recompute_effects_flags, Effects},
    ir::{
        CodeInfo, Expr, InlineDeclaration, InstructionStream, IrType, MethodInfo,
        SignatureKind, SlotFlags, Stmt, StmtFlags, Value,
    },
    Error, Result,
};

/// A jump target that is bound to a statement index later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// Incremental builder for [`CodeInfo`].
#[derive(Debug, Clone)]
pub struct CodeBuilder {
    stmts: Vec<Stmt>,
    types: Vec<IrType>,
    lines: Vec<u32>,
    flags: Vec<Option<StmtFlags>>,
    slot_types: Vec<IrType>,
    slot_flags: Vec<SlotFlags>,
    slot_names: Vec<Arc<str>>,
    nargs: usize,
    isva: bool,
    method: MethodInfo,
    effects: Effects,
    rettype: IrType,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
    line: u32,
}

impl CodeBuilder {
    /// Starts a body for method `name` taking parameters of the given types.
    ///
    /// Parameters occupy slots `0..params.len()`.
    #[must_use]
    pub fn new(name: &str, params: &[IrType]) -> Self {
        Self {
            stmts: Vec::new(),
            types: Vec::new(),
            lines: Vec::new(),
            flags: Vec::new(),
            slot_types: params.to_vec(),
            slot_flags: vec![SlotFlags::ASSIGNED_ONCE; params.len()],
            slot_names: (0..params.len())
                .map(|i| Arc::from(format!("arg{i}").as_str()))
                .collect(),
            nargs: params.len(),
            isva: false,
            method: MethodInfo::new(name, params.to_vec()),
            effects: Effects::default(),
            rettype: IrType::Any,
            labels: Vec::new(),
            fixups: Vec::new(),
            line: 1,
        }
    }

    /// Declares a local variable and returns its slot number.
    pub fn slot(&mut self, name: &str, ty: IrType) -> usize {
        self.slot_types.push(ty);
        self.slot_flags.push(SlotFlags::empty());
        self.slot_names.push(Arc::from(name));
        self.slot_types.len() - 1
    }

    /// Sets the flags of `slot`.
    pub fn set_slot_flags(&mut self, slot: usize, flags: SlotFlags) -> &mut Self {
        if let Some(entry) = self.slot_flags.get_mut(slot) {
            *entry = flags;
        }
        self
    }

    /// Sets the source line of subsequently pushed statements.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    /// Sets the inferred return type.
    pub fn rettype(&mut self, ty: IrType) -> &mut Self {
        self.rettype = ty;
        self
    }

    /// Sets the inferred whole-body effects.
    pub fn effects(&mut self, effects: Effects) -> &mut Self {
        self.effects = effects;
        self
    }

    /// Sets the inlining declaration.
    pub fn declared(&mut self, declared: InlineDeclaration) -> &mut Self {
        self.method.declared = declared;
        self
    }

    /// Marks the method as defined in the top-level standard module.
    pub fn top_module(&mut self, is_top_module: bool) -> &mut Self {
        self.method.is_top_module = is_top_module;
        self
    }

    /// Sets the signature shape.
    pub fn signature_kind(&mut self, kind: SignatureKind) -> &mut Self {
        self.method.signature.kind = kind;
        self.isva = kind == SignatureKind::Variadic;
        self
    }

    /// Creates an unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the next statement pushed.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(self.stmts.len());
        }
        self
    }

    /// Returns the index the next statement will get.
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.stmts.len()
    }

    /// Pushes a statement whose flags are derived from its shape.
    pub fn push(&mut self, stmt: Stmt, ty: IrType) -> Value {
        self.push_inner(stmt, ty, None)
    }

    /// Pushes a statement with explicit flags.
    pub fn push_with_flags(&mut self, stmt: Stmt, ty: IrType, flags: StmtFlags) -> Value {
        self.push_inner(stmt, ty, Some(flags))
    }

    fn push_inner(&mut self, stmt: Stmt, ty: IrType, flags: Option<StmtFlags>) -> Value {
        self.stmts.push(stmt);
        self.types.push(ty);
        self.lines.push(self.line);
        self.flags.push(flags);
        Value::Ssa(self.stmts.len() - 1)
    }

    /// Pushes an expression statement with derived flags.
    pub fn expr(&mut self, expr: Expr, ty: IrType) -> Value {
        self.push(Stmt::Expr(expr), ty)
    }

    /// Pushes an expression statement with explicit flags.
    pub fn expr_with_flags(&mut self, expr: Expr, ty: IrType, flags: StmtFlags) -> Value {
        self.push_with_flags(Stmt::Expr(expr), ty, flags)
    }

    /// Assigns `value` to `slot`; the statement type is the slot type.
    pub fn store(&mut self, slot: usize, value: impl Into<Expr>) {
        let ty = self.slot_types.get(slot).cloned().unwrap_or(IrType::Any);
        self.push(
            Stmt::SlotStore {
                slot,
                value: value.into(),
            },
            ty,
        );
    }

    /// Marks `slot` as freshly undefined.
    pub fn newvar(&mut self, slot: usize) {
        self.push(Stmt::NewVar(slot), IrType::Nothing);
    }

    /// Jumps to `label`.
    pub fn goto(&mut self, label: Label) {
        self.fixups.push((self.stmts.len(), label));
        self.push(Stmt::Goto(usize::MAX), IrType::Any);
    }

    /// Jumps to `label` unless `cond` is true.
    pub fn goto_if_not(&mut self, cond: Value, label: Label) {
        self.fixups.push((self.stmts.len(), label));
        self.push(
            Stmt::GotoIfNot {
                cond,
                dest: usize::MAX,
            },
            IrType::Any,
        );
    }

    /// Enters an exception region whose handler starts at `label`.
    pub fn enter(&mut self, label: Label) {
        self.fixups.push((self.stmts.len(), label));
        self.push(
            Stmt::Enter {
                catch_dest: usize::MAX,
            },
            IrType::Any,
        );
    }

    /// Leaves the innermost exception region.
    pub fn leave(&mut self) {
        self.push(Stmt::Leave, IrType::Any);
    }

    /// Returns `value`.
    pub fn ret(&mut self, value: Value) {
        self.push(Stmt::Return(Some(value)), IrType::Any);
    }

    /// Marks the current point unreachable.
    pub fn unreachable(&mut self) {
        self.push(Stmt::UNREACHABLE, IrType::Bottom);
    }

    /// Resolves labels and derives missing flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyBody`] for a body without statements and
    /// [`Error::InvalidIr`] for a jump to a label that was never bound.
    pub fn finish(self) -> Result<CodeInfo> {
        if self.stmts.is_empty() {
            return Err(Error::EmptyBody);
        }
        let mut stmts = self.stmts;
        for (idx, label) in self.fixups {
            let target = self
                .labels
                .get(label.0)
                .copied()
                .flatten()
                .ok_or_else(|| invalid_ir!("statement {} jumps to unbound label {}", idx, label.0))?;
            match &mut stmts[idx] {
                Stmt::Goto(t) => *t = target,
                Stmt::GotoIfNot { dest, .. } => *dest = target,
                Stmt::Enter { catch_dest } => *catch_dest = target,
                _ => return Err(invalid_ir!("statement {} is not a jump", idx)),
            }
        }

        let mut code = CodeInfo {
            code: InstructionStream {
                flags: vec![StmtFlags::empty(); stmts.len()],
                stmts,
                types: self.types,
                lines: self.lines,
            },
            slot_types: self.slot_types,
            slot_flags: self.slot_flags,
            slot_names: self.slot_names,
            nargs: self.nargs,
            isva: self.isva,
            method: self.method,
            ipo_effects: self.effects,
            rettype: self.rettype,
        };

        let derived: Vec<StmtFlags> = self
            .flags
            .iter()
            .enumerate()
            .map(|(idx, flags)| {
                flags.unwrap_or_else(|| {
                    recompute_effects_flags(&code.code.stmts[idx], &code.code.types[idx], &code)
                })
            })
            .collect();
        code.code.flags = derived;
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_resolve_to_statement_indices() {
        let mut b = CodeBuilder::new("f", &[IrType::Bool]);
        let exit = b.new_label();
        b.goto_if_not(Value::Argument(0), exit);
        b.expr(Expr::Value(Value::int(1)), IrType::Int);
        b.bind(exit);
        b.ret(Value::nothing());
        let code = b.finish().expect("labels bound");
        assert_eq!(
            code.code.stmts[0],
            Stmt::GotoIfNot {
                cond: Value::Argument(0),
                dest: 2
            }
        );
        assert_eq!(code.nargs, 1);
        assert!(code.code.flags[2].has(StmtFlags::NOTHROW));
    }

    #[test]
    fn test_unbound_label_is_an_error() {
        let mut b = CodeBuilder::new("f", &[]);
        let nowhere = b.new_label();
        b.goto(nowhere);
        assert!(matches!(b.finish(), Err(Error::InvalidIr { .. })));
        assert!(matches!(
            CodeBuilder::new("g", &[]).finish(),
            Err(Error::EmptyBody)
        ));
    }

    #[test]
    fn test_slots_follow_arguments() {
        let mut b = CodeBuilder::new("f", &[IrType::Int, IrType::Int]);
        let x = b.slot("x", IrType::Float);
        assert_eq!(x, 2);
        b.store(x, Value::Literal(crate::ir::Literal::Float(1.0)));
        b.ret(Value::Slot(x));
        let code = b.finish().expect("valid body");
        assert_eq!(code.slot_count(), 3);
        assert_eq!(code.code.types[0], IrType::Float);
    }
}
