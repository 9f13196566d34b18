//! Lazily computed dominance information for a compacted body.
//!
//! The refinement engine only needs post-dominance and the augmented dominator tree
//! when it meets a branch on an inconsistent condition, which most bodies never
//! contain. [`DominanceInfo`] builds each tree on first use and memoizes it for the
//! rest of the run.
//!
//! Three trees are available:
//!
//! - the dominator tree of the CFG, with its dominance frontiers
//! - the post-dominator tree, rooted at a virtual exit fed by every block without
//!   successors
//! - the dominator tree of the CFG augmented with a virtual exit fed by every block
//!   that returns a value; a frontier reaching that exit models a function whose
//!   returned value depends on the branch taken

use std::{collections::HashSet, sync::OnceLock};

use crate::{
    ir::{IrCode, StmtFlags},
    utils::{
        graph::{
            algorithms::{self, DominatorTree},
            DenseGraph, GraphBase, NodeId,
        },
        BitSet,
    },
};

/// The CFG augmented with a virtual exit node, and its dominance information.
#[derive(Debug)]
pub struct AugmentedDomTree {
    /// The augmented graph; the exit has id `cfg.len()`
    pub graph: DenseGraph,
    /// Dominator tree of the augmented graph
    pub tree: DominatorTree,
    /// Dominance frontiers of the augmented graph
    pub frontiers: Vec<HashSet<NodeId>>,
}

impl AugmentedDomTree {
    /// Returns the id of the virtual exit node.
    #[must_use]
    pub fn exit(&self) -> usize {
        self.graph.node_count() - 1
    }
}

/// Memoized dominance queries over one body.
#[derive(Debug)]
pub struct DominanceInfo<'a> {
    ir: &'a IrCode,
    domtree: OnceLock<DominatorTree>,
    frontiers: OnceLock<Vec<HashSet<NodeId>>>,
    postdomtree: OnceLock<DominatorTree>,
    augmented: OnceLock<AugmentedDomTree>,
}

impl<'a> DominanceInfo<'a> {
    /// Creates an empty cache for `ir`.
    #[must_use]
    pub fn new(ir: &'a IrCode) -> Self {
        Self {
            ir,
            domtree: OnceLock::new(),
            frontiers: OnceLock::new(),
            postdomtree: OnceLock::new(),
            augmented: OnceLock::new(),
        }
    }

    /// Returns the dominator tree of the CFG.
    pub fn domtree(&self) -> &DominatorTree {
        self.domtree
            .get_or_init(|| algorithms::compute_dominators(&self.ir.cfg, NodeId::new(0)))
    }

    /// Returns the dominance frontier of every block.
    pub fn frontiers(&self) -> &[HashSet<NodeId>] {
        self.frontiers
            .get_or_init(|| algorithms::compute_dominance_frontiers(&self.ir.cfg, self.domtree()))
    }

    /// Returns the post-dominator tree.
    pub fn postdomtree(&self) -> &DominatorTree {
        self.postdomtree.get_or_init(|| {
            let exits: Vec<NodeId> = self
                .ir
                .cfg
                .blocks
                .iter()
                .enumerate()
                .filter(|(_, block)| block.succs.is_empty())
                .map(|(b, _)| NodeId::new(b))
                .collect();
            algorithms::compute_post_dominators(&self.ir.cfg, &exits)
        })
    }

    /// Returns `true` if block `a` post-dominates block `b`.
    pub fn post_dominates(&self, a: usize, b: usize) -> bool {
        self.postdomtree().dominates(NodeId::new(a), NodeId::new(b))
    }

    /// Returns the dominance information of the return-augmented CFG.
    pub fn augmented(&self) -> &AugmentedDomTree {
        self.augmented.get_or_init(|| {
            let exits: Vec<NodeId> = self
                .ir
                .return_blocks()
                .into_iter()
                .map(NodeId::new)
                .collect();
            let graph = algorithms::augment_with_exit(&self.ir.cfg, &exits);
            let tree = algorithms::compute_dominators(&graph, NodeId::new(0));
            let frontiers = algorithms::compute_dominance_frontiers(&graph, &tree);
            AugmentedDomTree {
                graph,
                tree,
                frontiers,
            }
        })
    }

    /// Returns the merge points, in the augmented CFG, reached by the successors of
    /// `block`: the iterated dominance frontier of its successor set.
    ///
    /// The virtual exit appears as block `cfg.len()`.
    pub fn branch_frontier(&self, block: usize) -> Vec<usize> {
        let succs = self.ir.cfg.blocks[block]
            .succs
            .iter()
            .map(|&s| NodeId::new(s));
        algorithms::iterated_dominance_frontier(&self.augmented().frontiers, succs, None)
            .into_iter()
            .map(NodeId::index)
            .collect()
    }

    /// Visits the blocks that execute only on some of the paths leaving `block`.
    ///
    /// Successors are explored breadth-first; the walk does not continue past a block
    /// that post-dominates `block`, since every path passes through it. Returns `true`
    /// as soon as `visit` does.
    pub fn visit_conditional_successors(&self, block: usize, mut visit: impl FnMut(usize) -> bool) -> bool {
        let mut visited = BitSet::new(self.ir.cfg.len());
        visited.insert(block);
        let mut worklist = std::collections::VecDeque::from([block]);
        while let Some(current) = worklist.pop_front() {
            for &succ in &self.ir.cfg.blocks[current].succs {
                if !visited.insert(succ) {
                    continue;
                }
                if self.post_dominates(succ, block) {
                    continue;
                }
                if visit(succ) {
                    return true;
                }
                worklist.push_back(succ);
            }
        }
        false
    }

    /// Returns `true` if any statement of `block` lacks [`StmtFlags::NOTHROW`].
    #[must_use]
    pub fn any_stmt_may_throw(&self, block: usize) -> bool {
        self.ir.cfg.blocks[block]
            .stmts
            .iter()
            .any(|idx| !self.ir.stmts.flags[idx].has(StmtFlags::NOTHROW))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, Instruction, InstructionStream, IrType, Stmt, StmtRange, Value};

    /// `#0: goto_if_not _0 #2; #1: return 1; #2: throw-ish call; #3: return 2`
    fn branchy() -> IrCode {
        let stmts = vec![
            Stmt::GotoIfNot {
                cond: Value::Argument(0),
                dest: 2,
            },
            Stmt::Goto(3),
            Stmt::Expr(crate::ir::Expr::generic("g", vec![])),
            Stmt::Return(Some(Value::int(2))),
        ];
        let stream: InstructionStream = stmts
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let flags = if i == 2 {
                    StmtFlags::empty()
                } else {
                    StmtFlags::NOTHROW
                };
                Instruction::new(s, IrType::Any, 0, flags)
            })
            .collect();
        let ranges = (0..4).map(|i| StmtRange::new(i, i + 1)).collect();
        let cfg = Cfg::from_block_ranges(ranges, &stream.stmts).expect("cfg");
        IrCode::new(stream, cfg, vec![IrType::Bool])
    }

    #[test]
    fn test_post_dominance() {
        let ir = branchy();
        let info = DominanceInfo::new(&ir);
        assert!(info.post_dominates(3, 0));
        assert!(!info.post_dominates(1, 0));
        assert!(info.domtree().dominates(NodeId::new(0), NodeId::new(3)));
    }

    #[test]
    fn test_conditional_successors_stop_at_post_dominator() {
        let ir = branchy();
        let info = DominanceInfo::new(&ir);
        let mut seen = Vec::new();
        let found = info.visit_conditional_successors(0, |b| {
            seen.push(b);
            false
        });
        assert!(!found);
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
        assert!(info.visit_conditional_successors(0, |b| info.any_stmt_may_throw(b)));
    }

    #[test]
    fn test_branch_frontier_reaches_join() {
        let ir = branchy();
        let info = DominanceInfo::new(&ir);
        assert_eq!(info.branch_frontier(0), vec![3]);
        assert_eq!(info.augmented().exit(), 4);
    }
}
