//! Post-optimization refinement of a body's effect summary.
//!
//! The engine scans the optimized body once, in block order, and keeps a handful of
//! accumulators that start optimistic and can only be falsified:
//!
//! | Accumulator               | Falsified by                                          |
//! |---------------------------|-------------------------------------------------------|
//! | all return paths consistent | an inconsistent value reaching a `return`, a throwing inconsistent statement, a branch on an inconsistent condition that changes the result |
//! | all effect-free           | a statement without `EFFECT_FREE` (escape-validated ones excepted) |
//! | all nothrow               | a statement without `NOTHROW`                          |
//! | all noub                  | a statement without `NOUB`, unless it is a bounds-checked access |
//!
//! Inconsistency is a dataflow property: a statement is inconsistent if it is not
//! flagged `CONSISTENT` or if one of its operands is inconsistent. While the scan
//! runs forward through blocks in order this is exact. As soon as the scan meets a
//! backward edge or skips a block, the remaining blocks are scanned without that
//! guarantee and inconsistency is closed over a def-use map afterwards.
//!
//! An exception region ends the analysis: nothing is refined.

use tracing::debug;

use crate::{
    analysis::{
        ArgEscapeSummary, DominanceInfo, EscapeAnalyzer, EscapeCache, EscapeState,
        TwoPhaseDefUseMap,
    },
    effects::{Consistency, EffectFree, Effects, NoUb},
    ir::{Builtin, Expr, IrCode, Stmt, StmtFlags, Value, ValueTypes},
    utils::{BitSet, MinWorkSet},
    Result,
};

/// The result of [`refine_effects`].
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    /// The refined summary; equal to the input when nothing was refined
    pub effects: Effects,
    /// Whether any property was upgraded
    pub refined: bool,
    /// Whether the analysis gave up on an exception region
    pub abandoned: bool,
    /// Parameter escape summary, when escape analysis ran
    pub arg_escapes: Option<ArgEscapeSummary>,
}

impl RefinementOutcome {
    fn unchanged(effects: Effects) -> Self {
        Self {
            effects,
            refined: false,
            abandoned: false,
            arg_escapes: None,
        }
    }
}

/// Tightens `effects` using the optimized body `ir`.
///
/// `nargs` is the number of real parameters, forwarded to the escape query. Bodies
/// whose effects are already fully refined are returned unchanged without a scan.
///
/// # Errors
///
/// Returns [`crate::Error::PendingNodes`] if `ir` has pending insertions, and
/// propagates failures of the escape analysis.
pub fn refine_effects(
    ir: &IrCode,
    effects: Effects,
    nargs: usize,
    analyzer: &dyn EscapeAnalyzer,
    cache: &dyn EscapeCache,
) -> Result<RefinementOutcome> {
    if effects.is_fully_refined() {
        return Ok(RefinementOutcome::unchanged(effects));
    }
    ir.ensure_compacted()?;

    let mut state = PostOptState::new(ir, effects);
    let mut scanner = BlockScanner::new(ir.cfg.len());
    let completed = scanner.scan(ir, true, |idx, last, block| Ok(state.scan_stmt(idx, last, block)))?;

    if !completed {
        if state.all_retpaths_consistent {
            state.check_inconsistency(&mut scanner)?;
        } else {
            scanner.scan(ir, false, |idx, _, _| {
                if matches!(ir.stmts.stmts[idx], Stmt::Enter { .. }) {
                    debug!(stmt = idx, "exception region, effect refinement abandoned");
                    state.give_up();
                    return Ok(Step::Finish);
                }
                state.scan_non_dataflow_flags(idx);
                Ok(if state.any_refinable() {
                    Step::Continue
                } else {
                    Step::Finish
                })
            })?;
        }
    }

    state.finish(nargs, analyzer, cache)
}

/// Whether a scan continues after a statement.
enum Step {
    Continue,
    Finish,
}

/// Visits reachable blocks in increasing order, each at most once.
struct BlockScanner {
    queue: MinWorkSet,
    visited: BitSet,
    next: usize,
}

impl BlockScanner {
    fn new(blocks: usize) -> Self {
        let mut queue = MinWorkSet::new(blocks);
        if blocks > 0 {
            queue.push(0);
        }
        Self {
            queue,
            visited: BitSet::new(blocks),
            next: 0,
        }
    }

    /// Calls `visit(stmt, last stmt of block, block)` for every statement.
    ///
    /// In `forwards_only` mode the scan stops, returning `false`, before a block
    /// that does not directly follow the previous one and after a backward branch;
    /// a later call resumes where it stopped. Returns `true` once every reachable
    /// block was visited or `visit` finished early.
    fn scan(
        &mut self,
        ir: &IrCode,
        forwards_only: bool,
        mut visit: impl FnMut(usize, usize, usize) -> Result<Step>,
    ) -> Result<bool> {
        while let Some(block) = self.queue.pop_first() {
            if forwards_only && block != self.next {
                self.queue.push(block);
                return Ok(false);
            }
            if !self.visited.insert(block) {
                continue;
            }
            let range = ir.cfg.blocks[block].stmts;
            let Some(last) = range.last() else {
                continue;
            };
            for idx in range.iter() {
                if let Step::Finish = visit(idx, last, block)? {
                    return Ok(true);
                }
            }
            let backward = self.process_terminator(ir, block, last);
            self.next = block + 1;
            if backward && forwards_only {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Queues the successors of `block`; returns `true` for a backward jump.
    fn process_terminator(&mut self, ir: &IrCode, block: usize, last: usize) -> bool {
        let blocks = ir.cfg.len();
        let mut push = |b: usize| {
            if b < blocks {
                self.queue.push(b);
            }
        };
        match &ir.stmts.stmts[last] {
            Stmt::Return(_) => false,
            Stmt::Goto(dest) => {
                push(*dest);
                *dest <= block
            }
            Stmt::GotoIfNot { dest, .. } => {
                push(*dest);
                push(block + 1);
                *dest <= block
            }
            Stmt::Enter { catch_dest } => {
                push(*catch_dest);
                push(block + 1);
                false
            }
            _ => {
                push(block + 1);
                false
            }
        }
    }
}

struct PostOptState<'a> {
    ir: &'a IrCode,
    effects: Effects,
    inconsistent: BitSet,
    defuse: TwoPhaseDefUseMap,
    dominance: DominanceInfo<'a>,
    ea_pending: Vec<usize>,
    all_retpaths_consistent: bool,
    all_effect_free: bool,
    /// `None` until an argument reaches an escape-validated statement
    effect_free_if_argmem_only: Option<bool>,
    all_nothrow: bool,
    all_noub: bool,
    any_conditional_ub: bool,
    abandoned: bool,
}

impl<'a> PostOptState<'a> {
    fn new(ir: &'a IrCode, effects: Effects) -> Self {
        Self {
            ir,
            effects,
            inconsistent: BitSet::new(ir.len()),
            defuse: TwoPhaseDefUseMap::new(ir.len()),
            dominance: DominanceInfo::new(ir),
            ea_pending: Vec::new(),
            all_retpaths_consistent: true,
            all_effect_free: true,
            effect_free_if_argmem_only: None,
            all_nothrow: true,
            all_noub: true,
            any_conditional_ub: false,
            abandoned: false,
        }
    }

    fn give_up(&mut self) {
        self.all_retpaths_consistent = false;
        self.all_effect_free = false;
        self.effect_free_if_argmem_only = Some(false);
        self.all_nothrow = false;
        self.all_noub = false;
        self.abandoned = true;
    }

    fn any_refinable(&self) -> bool {
        let e = &self.effects;
        (!e.is_consistent() && self.all_retpaths_consistent)
            || (!e.is_effect_free() && self.all_effect_free)
            || (!e.is_nothrow() && self.all_nothrow)
            || (!e.is_noub() && self.all_noub)
    }

    fn scan_stmt(&mut self, idx: usize, last: usize, block: usize) -> Step {
        if matches!(self.ir.stmts.stmts[idx], Stmt::Enter { .. }) {
            debug!(stmt = idx, "exception region, effect refinement abandoned");
            self.give_up();
            return Step::Finish;
        }
        self.scan_non_dataflow_flags(idx);
        if self.scan_inconsistency(idx) {
            // Newly tainted phis lie in later blocks and are seen by the scan itself,
            // or are picked up by the def-use closure.
            self.taint_stmt(idx, last, block);
        }
        Step::Continue
    }

    fn scan_non_dataflow_flags(&mut self, idx: usize) {
        let flags = self.ir.stmts.flags[idx];
        let stmt = &self.ir.stmts.stmts[idx];
        if !flags.has(StmtFlags::NEEDS_EA) {
            // Control flow is not removable on its own but does not make the body
            // effectful either.
            if !stmt.is_terminator() && !matches!(stmt, Stmt::Nop) {
                self.all_effect_free &= flags.has(StmtFlags::EFFECT_FREE);
            }
        } else if self.all_effect_free {
            let validatable = matches!(stmt, Stmt::Expr(Expr::Invoke { .. } | Expr::New { .. }))
                || stmt.expr().is_some_and(|e| e.is_call_to(Builtin::Setfield));
            if validatable {
                self.ea_pending.push(idx);
            } else {
                self.all_effect_free = false;
            }
        }
        self.all_nothrow &= flags.has(StmtFlags::NOTHROW);
        if !flags.has(StmtFlags::NOUB) {
            if !flags.has(StmtFlags::INBOUNDS) && self.is_call_with_boundscheck(stmt) {
                self.any_conditional_ub = true;
            } else {
                self.all_noub = false;
            }
        }
    }

    /// A builtin access whose trailing argument is a live bounds-check value.
    fn is_call_with_boundscheck(&self, stmt: &Stmt) -> bool {
        let Stmt::Expr(expr) = stmt else {
            return false;
        };
        let Some(arity) = expr.called_builtin().and_then(Builtin::boundscheck_arity) else {
            return false;
        };
        let args = expr.args();
        if args.len() < arity {
            return false;
        }
        matches!(
            args.last().and_then(Value::as_ssa).and_then(|d| self.ir.stmt(d)),
            Some(Stmt::Expr(Expr::Boundscheck { inbounds: false }))
        )
    }

    /// SSA operands that propagate inconsistency; the bounds-check flag of an
    /// access does not.
    fn tainting_operands(&self, stmt: &Stmt) -> Vec<usize> {
        let mut uses = stmt.ssa_uses();
        if self.is_call_with_boundscheck(stmt) {
            uses.pop();
        }
        uses
    }

    fn scan_inconsistency(&mut self, idx: usize) -> bool {
        let stmt = &self.ir.stmts.stmts[idx];
        for def in stmt.ssa_uses() {
            self.defuse.count(def);
        }
        let mut inconsistent = !self.ir.stmts.flags[idx].has(StmtFlags::CONSISTENT)
            || self.inconsistent.contains(idx);
        inconsistent |= self
            .tainting_operands(stmt)
            .into_iter()
            .any(|def| def < self.ir.len() && self.inconsistent.contains(def));
        if inconsistent {
            self.inconsistent.insert(idx);
        }
        inconsistent
    }

    /// Applies the consequences of statement `idx` being inconsistent and returns
    /// the phis it newly taints.
    fn taint_stmt(&mut self, idx: usize, last: usize, block: usize) -> Vec<usize> {
        if !self.ir.stmts.flags[idx].has(StmtFlags::NOTHROW) {
            // Consistency includes consistent termination.
            self.all_retpaths_consistent = false;
        }
        if idx != last {
            return Vec::new();
        }
        match &self.ir.stmts.stmts[idx] {
            Stmt::Return(Some(_)) => {
                self.all_retpaths_consistent = false;
                Vec::new()
            }
            Stmt::GotoIfNot { .. } => self.taint_branch(block),
            _ => Vec::new(),
        }
    }

    /// A branch on an inconsistent condition at the end of `block`.
    fn taint_branch(&mut self, block: usize) -> Vec<usize> {
        if !self.effects.is_terminates() {
            self.all_retpaths_consistent = false;
            return Vec::new();
        }
        let dominance = &self.dominance;
        if dominance.visit_conditional_successors(block, |succ| dominance.any_stmt_may_throw(succ)) {
            self.all_retpaths_consistent = false;
            return Vec::new();
        }
        let exit = self.ir.cfg.len();
        let mut tainted = Vec::new();
        for merge in self.dominance.branch_frontier(block) {
            if merge == exit {
                // The returned value depends on the branch taken.
                self.all_retpaths_consistent = false;
                continue;
            }
            for idx in self.ir.cfg.blocks[merge].stmts.iter() {
                match self.ir.stmts.stmts[idx] {
                    Stmt::Phi(_) => {
                        if self.inconsistent.insert(idx) {
                            tainted.push(idx);
                        }
                    }
                    Stmt::Nop => {}
                    _ => break,
                }
            }
        }
        tainted
    }

    /// Finishes the scan without the forward-only guarantee and closes inconsistency
    /// over all uses.
    fn check_inconsistency(&mut self, scanner: &mut BlockScanner) -> Result<()> {
        let ir = self.ir;
        scanner.scan(ir, false, |idx, last, block| Ok(self.scan_stmt(idx, last, block)))?;
        if !self.all_retpaths_consistent {
            return Ok(());
        }

        self.defuse.complete();
        let mut populate = BlockScanner::new(ir.cfg.len());
        populate.scan(ir, false, |idx, _, _| {
            for def in ir.stmts.stmts[idx].ssa_uses() {
                self.defuse.add_use(def, idx)?;
            }
            Ok(Step::Continue)
        })?;

        let mut worklist = MinWorkSet::new(ir.len());
        worklist.extend(self.inconsistent.iter());
        while let Some(def) = worklist.pop_first() {
            let users = self.defuse.uses(def).to_vec();
            for user in users {
                if self.inconsistent.contains(user) {
                    continue;
                }
                let stmt = &ir.stmts.stmts[user];
                if !self.tainting_operands(stmt).contains(&def) {
                    continue;
                }
                self.inconsistent.insert(user);
                worklist.push(user);
                let block = ir.block_for_inst(user);
                let last = ir.cfg.blocks[block].stmts.last().unwrap_or(user);
                worklist.extend(self.taint_stmt(user, last, block));
                if !self.all_retpaths_consistent {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Confirms, through escape analysis, that memory touched by the pending
    /// statements is not observable by the caller.
    fn validate_mutable_arg_escapes(&mut self, estate: &EscapeState) {
        for idx in std::mem::take(&mut self.ea_pending) {
            if !self.check_all_args_noescape(idx, estate) {
                self.all_effect_free = false;
                return;
            }
        }
    }

    fn check_all_args_noescape(&mut self, idx: usize, estate: &EscapeState) -> bool {
        let mut visited = BitSet::new(self.ir.len());
        let mut worklist = vec![idx];
        while let Some(current) = worklist.pop() {
            if !visited.insert(current) {
                continue;
            }
            let args = match &self.ir.stmts.stmts[current] {
                Stmt::Expr(Expr::Invoke { args, .. } | Expr::New { args, .. }) => args,
                _ => return false,
            };
            for arg in args {
                let Ok(ty) = self.ir.value_type(arg) else {
                    return false;
                };
                if ty.is_mutation_free() {
                    continue;
                }
                match arg {
                    Value::Argument(_) => {
                        // The best possible outcome is now effect-free if only
                        // argument memory is touched.
                        if estate.get(arg).is_local() {
                            self.effect_free_if_argmem_only.get_or_insert(true);
                        } else {
                            self.effect_free_if_argmem_only = Some(false);
                        }
                        return false;
                    }
                    Value::Ssa(def) if estate.get(arg).is_local() && *def < self.ir.len() => {
                        worklist.push(*def);
                    }
                    _ => return false,
                }
            }
        }
        true
    }

    fn finish(
        mut self,
        nargs: usize,
        analyzer: &dyn EscapeAnalyzer,
        cache: &dyn EscapeCache,
    ) -> Result<RefinementOutcome> {
        let mut arg_escapes = None;
        if !self.effects.is_effect_free() && self.all_effect_free && !self.ea_pending.is_empty() {
            let estate = analyzer.analyze_escapes(self.ir, nargs, cache)?;
            arg_escapes = Some(estate.arg_summary());
            self.validate_mutable_arg_escapes(&estate);
        }

        if !self.any_refinable() {
            return Ok(RefinementOutcome {
                abandoned: self.abandoned,
                arg_escapes,
                ..RefinementOutcome::unchanged(self.effects)
            });
        }

        let mut effects = self.effects;
        if self.all_retpaths_consistent {
            effects.consistent = Consistency::Always;
        }
        if self.all_effect_free {
            effects.effect_free = EffectFree::Always;
        } else if self.effect_free_if_argmem_only == Some(true) {
            effects.effect_free = EffectFree::IfInaccessibleMemOnly;
        }
        if self.all_nothrow {
            effects.nothrow = true;
        }
        if self.all_noub {
            effects.noub = if self.any_conditional_ub {
                NoUb::IfNoInbounds
            } else {
                NoUb::Always
            };
        }
        debug!(from = %self.effects, to = %effects, "effects refined");
        Ok(RefinementOutcome {
            effects,
            refined: true,
            abandoned: false,
            arg_escapes,
        })
    }
}
