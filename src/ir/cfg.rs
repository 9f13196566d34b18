//! Basic blocks and the control-flow graph over an instruction stream.
//!
//! A [`Cfg`] partitions the instruction stream into contiguous, increasing
//! [`StmtRange`]s, one per [`BasicBlock`], and stores explicit predecessor and
//! successor lists. Every successor edge has a matching predecessor entry.

use std::ops::Range;

use crate::{
    ir::Stmt,
    utils::{
        graph::{GraphBase, NodeId, Predecessors, RootedGraph, Successors},
        BitSet,
    },
    Error, Result,
};

/// A half-open range of statement indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StmtRange {
    /// First statement
    pub start: usize,
    /// One past the last statement
    pub end: usize,
}

impl StmtRange {
    /// Creates the range `start..end`.
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Returns the number of statements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` if the range is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns `true` if `idx` lies in the range.
    #[must_use]
    pub const fn contains(&self, idx: usize) -> bool {
        self.start <= idx && idx < self.end
    }

    /// Returns the last statement index.
    #[must_use]
    pub const fn last(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.end - 1)
        }
    }

    /// Returns the range as an iterator.
    #[must_use]
    pub const fn iter(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// A maximal straight-line sequence of statements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicBlock {
    /// Statements of the block
    pub stmts: StmtRange,
    /// Predecessor blocks
    pub preds: Vec<usize>,
    /// Successor blocks
    pub succs: Vec<usize>,
}

impl BasicBlock {
    /// Creates a block over `stmts` with no edges.
    #[must_use]
    pub fn new(stmts: StmtRange) -> Self {
        Self {
            stmts,
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }
}

/// The control-flow graph of a function body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cfg {
    /// Blocks in statement order
    pub blocks: Vec<BasicBlock>,
    /// Start statement of every block but the first, for statement-to-block lookup
    pub index: Vec<usize>,
}

impl Cfg {
    /// Creates a CFG from blocks, computing the lookup index.
    #[must_use]
    pub fn new(blocks: Vec<BasicBlock>) -> Self {
        let index = blocks.iter().skip(1).map(|b| b.stmts.start).collect();
        Self { blocks, index }
    }

    /// Recomputes the lookup index after block ranges changed.
    pub fn reindex(&mut self) {
        self.index = self.blocks.iter().skip(1).map(|b| b.stmts.start).collect();
    }

    /// Returns the number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if there are no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the block containing statement `stmt`.
    #[must_use]
    pub fn block_for_inst(&self, stmt: usize) -> usize {
        self.index.partition_point(|&start| start <= stmt)
    }

    /// Returns the number of statements covered by the blocks.
    #[must_use]
    pub fn stmt_count(&self) -> usize {
        self.blocks.last().map_or(0, |b| b.stmts.end)
    }

    /// Adds the edge `from -> to`, ignoring duplicates.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        if !self.blocks[from].succs.contains(&to) {
            self.blocks[from].succs.push(to);
        }
        if !self.blocks[to].preds.contains(&from) {
            self.blocks[to].preds.push(from);
        }
    }

    /// Removes the edge `from -> to` if present.
    pub fn remove_edge(&mut self, from: usize, to: usize) {
        self.blocks[from].succs.retain(|&s| s != to);
        self.blocks[to].preds.retain(|&p| p != from);
    }

    /// Removes every outgoing edge of `block`.
    pub fn clear_successors(&mut self, block: usize) {
        let succs = std::mem::take(&mut self.blocks[block].succs);
        for succ in succs {
            self.blocks[succ].preds.retain(|&p| p != block);
        }
    }

    /// Computes basic blocks of a statement list whose control-flow targets are
    /// statement indices.
    ///
    /// Blocks start at statement 0, at every jump target and after every terminator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyBody`] for an empty list, and [`Error::InvalidIr`] when a
    /// target lies outside the body or control falls off its end.
    pub fn from_statement_targets(stmts: &[Stmt]) -> Result<Self> {
        let n = stmts.len();
        if n == 0 {
            return Err(Error::EmptyBody);
        }

        let mut starts = BitSet::new(n);
        starts.insert(0);
        for (idx, stmt) in stmts.iter().enumerate() {
            if let Some(target) = jump_target(stmt) {
                if target >= n {
                    return Err(invalid_ir!(
                        "statement {} jumps to {} outside a body of {} statements",
                        idx,
                        target,
                        n
                    ));
                }
                starts.insert(target);
            }
            if stmt.is_terminator() && idx + 1 < n {
                starts.insert(idx + 1);
            }
        }

        let starts: Vec<usize> = starts.iter().collect();
        let ranges = starts
            .iter()
            .enumerate()
            .map(|(b, &start)| StmtRange::new(start, starts.get(b + 1).copied().unwrap_or(n)))
            .collect();
        let mut cfg = Cfg::new(ranges_to_blocks(ranges));
        let lookup = cfg.clone();
        cfg.connect(stmts, |target| Ok(lookup.block_for_inst(target)))?;
        Ok(cfg)
    }

    /// Builds a CFG from precomputed block ranges over statements whose control-flow
    /// targets are block indices.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIr`] when a target is not a block or control falls off
    /// the end of the body.
    pub fn from_block_ranges(ranges: Vec<StmtRange>, stmts: &[Stmt]) -> Result<Self> {
        let mut cfg = Cfg::new(ranges_to_blocks(ranges));
        let nblocks = cfg.len();
        cfg.connect(stmts, |target| {
            if target < nblocks {
                Ok(target)
            } else {
                Err(invalid_ir!("jump to block {} of {}", target, nblocks))
            }
        })?;
        Ok(cfg)
    }

    fn connect(
        &mut self,
        stmts: &[Stmt],
        target_block: impl Fn(usize) -> Result<usize>,
    ) -> Result<()> {
        let nblocks = self.len();
        for b in 0..nblocks {
            let Some(last) = self.blocks[b].stmts.last() else {
                return Err(invalid_ir!("block {} has no statements", b));
            };
            let Some(stmt) = stmts.get(last) else {
                return Err(invalid_ir!("block {} ends past the statement list", b));
            };
            let fallthrough = || {
                if b + 1 < nblocks {
                    Ok(b + 1)
                } else {
                    Err(invalid_ir!("control falls off the end of block {}", b))
                }
            };
            let succs = match stmt {
                Stmt::Goto(target) => vec![target_block(*target)?],
                Stmt::GotoIfNot { dest, .. } => vec![fallthrough()?, target_block(*dest)?],
                Stmt::Enter { catch_dest } => vec![fallthrough()?, target_block(*catch_dest)?],
                Stmt::Return(_) => Vec::new(),
                _ => vec![fallthrough()?],
            };
            for succ in succs {
                self.add_edge(b, succ);
            }
        }
        Ok(())
    }
}

fn ranges_to_blocks(ranges: Vec<StmtRange>) -> Vec<BasicBlock> {
    ranges.into_iter().map(BasicBlock::new).collect()
}

/// Returns the explicit control-flow target of a statement.
#[must_use]
pub fn jump_target(stmt: &Stmt) -> Option<usize> {
    match stmt {
        Stmt::Goto(target) => Some(*target),
        Stmt::GotoIfNot { dest, .. } => Some(*dest),
        Stmt::Enter { catch_dest } => Some(*catch_dest),
        _ => None,
    }
}

impl GraphBase for Cfg {
    fn node_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Successors for Cfg {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.blocks[node.index()]
            .succs
            .iter()
            .map(|&s| NodeId::new(s))
    }
}

impl Predecessors for Cfg {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.blocks[node.index()]
            .preds
            .iter()
            .map(|&p| NodeId::new(p))
    }
}

impl RootedGraph for Cfg {
    fn entry(&self) -> NodeId {
        NodeId::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Value;

    fn diamond() -> Vec<Stmt> {
        vec![
            Stmt::GotoIfNot {
                cond: Value::Argument(0),
                dest: 3,
            },
            Stmt::Nop,
            Stmt::Goto(4),
            Stmt::Nop,
            Stmt::Return(Some(Value::nothing())),
        ]
    }

    #[test]
    fn test_blocks_from_statement_targets() {
        let cfg = Cfg::from_statement_targets(&diamond()).expect("valid body");
        assert_eq!(cfg.len(), 4);
        assert_eq!(cfg.blocks[0].stmts, StmtRange::new(0, 1));
        assert_eq!(cfg.blocks[1].stmts, StmtRange::new(1, 3));
        assert_eq!(cfg.blocks[0].succs, vec![1, 2]);
        assert_eq!(cfg.blocks[3].preds, vec![1, 2]);
        assert_eq!(cfg.block_for_inst(2), 1);
        assert_eq!(cfg.block_for_inst(4), 3);
        assert_eq!(cfg.block_for_inst(0), 0);
    }

    #[test]
    fn test_fall_off_end_is_rejected() {
        let stmts = vec![Stmt::Nop];
        assert!(matches!(
            Cfg::from_statement_targets(&stmts),
            Err(Error::InvalidIr { .. })
        ));
        assert!(matches!(
            Cfg::from_statement_targets(&[]),
            Err(Error::EmptyBody)
        ));
    }

    #[test]
    fn test_out_of_range_target_is_rejected() {
        let stmts = vec![Stmt::Goto(9)];
        assert!(Cfg::from_statement_targets(&stmts).is_err());
    }

    #[test]
    fn test_from_block_ranges() {
        let stmts = vec![
            Stmt::GotoIfNot {
                cond: Value::Argument(0),
                dest: 2,
            },
            Stmt::Goto(2),
            Stmt::Return(None),
        ];
        let ranges = vec![
            StmtRange::new(0, 1),
            StmtRange::new(1, 2),
            StmtRange::new(2, 3),
        ];
        let cfg = Cfg::from_block_ranges(ranges, &stmts).expect("valid body");
        assert_eq!(cfg.blocks[2].preds, vec![0, 1]);
        assert!(cfg.blocks[2].succs.is_empty());
    }

    #[test]
    fn test_edge_editing() {
        let mut cfg = Cfg::from_statement_targets(&diamond()).expect("valid body");
        cfg.clear_successors(0);
        assert!(cfg.blocks[1].preds.is_empty());
        assert!(cfg.blocks[2].preds.is_empty());
        cfg.add_edge(0, 2);
        cfg.add_edge(0, 2);
        assert_eq!(cfg.blocks[0].succs, vec![2]);
        cfg.remove_edge(0, 2);
        assert!(cfg.blocks[2].preds.is_empty());
    }
}
