//! Compaction: applying pending insertions and dropping dead code.
//!
//! Compaction rebuilds the instruction stream of an [`IrCode`] in block order:
//!
//! 1. blocks unreachable from the entry are removed together with their statements
//!    and every phi entry flowing out of them,
//! 2. pending insertions are spliced in before or after the statement they are
//!    attached to,
//! 3. unused no-op statements are dropped, except that every block keeps at least
//!    one statement,
//! 4. all operands, targets and phi edges are renumbered and the CFG is rebuilt.
//!
//! Running compaction on an already compacted body reproduces it exactly.

use tracing::trace;

use crate::{
    ir::{
        renumber::{renumber_ir_elements, ChangeMap, Renumbering},
        Cfg, InstructionStream, IrCode, Stmt, StmtRange,
    },
    utils::{
        graph::{algorithms::reachable, NodeId},
        BitSet,
    },
    Error, Result,
};

/// What a compaction removed and inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Unreachable blocks removed
    pub blocks_removed: usize,
    /// Statements removed, including those of removed blocks
    pub stmts_removed: usize,
    /// Pending insertions applied
    pub nodes_inserted: usize,
}

impl CompactionStats {
    /// Returns `true` if compaction changed the body.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.blocks_removed > 0 || self.stmts_removed > 0 || self.nodes_inserted > 0
    }
}

#[derive(Clone, Copy)]
enum Source {
    Old(usize),
    New(usize),
}

/// Compacts `ir` in place.
///
/// # Errors
///
/// Returns [`Error::EmptyBody`] for a body without blocks and [`Error::InvalidIr`]
/// if live code refers to removed statements or a pending node is attached to a
/// statement that does not exist.
pub fn compact(ir: &mut IrCode) -> Result<CompactionStats> {
    if ir.cfg.is_empty() {
        return Err(Error::EmptyBody);
    }
    let n = ir.len();
    let total = n + ir.new_nodes.len();

    let mut before: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut after: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (k, node) in ir.new_nodes.iter().enumerate() {
        let Some(list) = (if node.attach_after {
            after.get_mut(node.pos)
        } else {
            before.get_mut(node.pos)
        }) else {
            return Err(invalid_ir!(
                "pending node {} attached to missing statement {}",
                k,
                node.pos
            ));
        };
        list.push(k);
    }

    let live_blocks = reachable(&ir.cfg, NodeId::new(0));
    let mut used = BitSet::new(total);
    let mut note_uses = |stmt: &Stmt| {
        stmt.for_each_operand(|value| {
            if let Some(idx) = value.as_ssa() {
                if idx < total {
                    used.insert(idx);
                }
            }
        });
    };
    for (b, block) in ir.cfg.blocks.iter().enumerate() {
        if live_blocks.contains(b) {
            for idx in block.stmts.iter() {
                note_uses(&ir.stmts.stmts[idx]);
            }
        }
    }
    for node in &ir.new_nodes {
        note_uses(&node.inst.stmt);
    }

    let mut order: Vec<Source> = Vec::with_capacity(total);
    let mut ranges = Vec::with_capacity(ir.cfg.len());
    let mut block_map = Vec::with_capacity(ir.cfg.len());
    let mut stats = CompactionStats::default();

    for (b, block) in ir.cfg.blocks.iter().enumerate() {
        if !live_blocks.contains(b) {
            block_map.push(None);
            stats.blocks_removed += 1;
            stats.stmts_removed += block.stmts.len();
            continue;
        }
        block_map.push(Some(ranges.len()));
        let start = order.len();
        for idx in block.stmts.iter() {
            order.extend(before[idx].iter().map(|&k| Source::New(k)));
            let deletable = matches!(ir.stmts.stmts[idx], Stmt::Nop) && !used.contains(idx);
            if deletable {
                stats.stmts_removed += 1;
            } else {
                order.push(Source::Old(idx));
            }
            order.extend(after[idx].iter().map(|&k| Source::New(k)));
        }
        if order.len() == start {
            order.push(Source::Old(block.stmts.start));
            stats.stmts_removed -= 1;
        }
        ranges.push(StmtRange::new(start, order.len()));
    }

    let mut mapping = vec![None; total];
    for (new_idx, source) in order.iter().enumerate() {
        match *source {
            Source::Old(idx) => mapping[idx] = Some(new_idx),
            Source::New(k) => {
                mapping[n + k] = Some(new_idx);
                stats.nodes_inserted += 1;
            }
        }
    }

    let mut stream = InstructionStream::with_capacity(order.len());
    for source in &order {
        let inst = match *source {
            Source::Old(idx) => ir
                .stmts
                .get(idx)
                .ok_or_else(|| invalid_ir!("statement {} vanished", idx))?,
            Source::New(k) => ir.new_nodes[k].inst.clone(),
        };
        stream.push(inst);
    }

    let renumbering = Renumbering::blocks(
        ChangeMap::from_mapping(&mapping),
        ChangeMap::from_mapping(&block_map),
    );
    renumber_ir_elements(&mut stream.stmts, &renumbering)?;
    let cfg = Cfg::from_block_ranges(ranges, &stream.stmts)?;

    trace!(
        blocks_removed = stats.blocks_removed,
        stmts_removed = stats.stmts_removed,
        nodes_inserted = stats.nodes_inserted,
        "compacted body"
    );

    ir.stmts = stream;
    ir.cfg = cfg;
    ir.new_nodes.clear();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, IrType, NewInstruction, PhiNode, StmtFlags, Value};

    fn inst(stmt: Stmt) -> Instruction {
        Instruction::new(stmt, IrType::Any, 0, StmtFlags::empty())
    }

    /// #0: goto #2   #1 (dead): nop; goto #2   #2: phi(#0 => 1, #1 => 2); return
    fn body_with_dead_block() -> IrCode {
        let mut phi = PhiNode::new();
        phi.push(0, Value::int(1));
        phi.push(1, Value::int(2));
        let stmts: InstructionStream = [
            inst(Stmt::Goto(2)),
            inst(Stmt::Nop),
            inst(Stmt::Goto(2)),
            inst(Stmt::Phi(phi)),
            inst(Stmt::Return(Some(Value::Ssa(3)))),
        ]
        .into_iter()
        .collect();
        let ranges = vec![
            StmtRange::new(0, 1),
            StmtRange::new(1, 3),
            StmtRange::new(3, 5),
        ];
        let cfg = Cfg::from_block_ranges(ranges, &stmts.stmts).expect("cfg");
        IrCode::new(stmts, cfg, vec![])
    }

    #[test]
    fn test_removes_unreachable_blocks_and_phi_edges() {
        let mut ir = body_with_dead_block();
        let stats = compact(&mut ir).expect("compaction succeeds");
        assert_eq!(stats.blocks_removed, 1);
        assert_eq!(ir.cfg.len(), 2);
        assert_eq!(ir.stmts.stmts[0], Stmt::Goto(1));
        let Stmt::Phi(phi) = &ir.stmts.stmts[1] else {
            panic!("phi expected");
        };
        assert_eq!(phi.edges, vec![0]);
        assert_eq!(ir.stmts.stmts[2], Stmt::Return(Some(Value::Ssa(1))));
    }

    #[test]
    fn test_applies_pending_nodes() {
        let mut ir = body_with_dead_block();
        let marker = ir.insert_node(
            4,
            NewInstruction::new(Stmt::Coverage, IrType::Nothing).with_flags(StmtFlags::PURE),
            false,
        );
        assert_eq!(marker, Value::Ssa(5));
        let stats = compact(&mut ir).expect("compaction succeeds");
        assert_eq!(stats.nodes_inserted, 1);
        assert_eq!(ir.stmts.stmts[2], Stmt::Coverage);
        assert_eq!(ir.stmts.stmts[3], Stmt::Return(Some(Value::Ssa(1))));
        assert!(ir.new_nodes.is_empty());
    }

    #[test]
    fn test_keeps_one_statement_per_block() {
        let stmts: InstructionStream = [inst(Stmt::Nop), inst(Stmt::Return(None))]
            .into_iter()
            .collect();
        let ranges = vec![StmtRange::new(0, 1), StmtRange::new(1, 2)];
        let cfg = Cfg::from_block_ranges(ranges, &stmts.stmts).expect("cfg");
        let mut ir = IrCode::new(stmts, cfg, vec![]);
        let stats = compact(&mut ir).expect("compaction succeeds");
        assert!(!stats.changed());
        assert_eq!(ir.len(), 2);
    }

    #[test]
    fn test_compaction_is_idempotent() {
        let mut ir = body_with_dead_block();
        compact(&mut ir).expect("first compaction");
        let once = ir.clone();
        let stats = compact(&mut ir).expect("second compaction");
        assert!(!stats.changed());
        assert_eq!(ir, once);
    }
}
