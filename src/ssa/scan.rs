//! Def-use scan over slots.
//!
//! One pass over the instruction stream collects, per slot, the statements that
//! define it and the statements that read it. The block-level views derived from
//! these lists drive phi placement.

use crate::{
    ir::{Cfg, Expr, IrCode, Stmt, Value},
    utils::BitSet,
    Error, Result,
};

/// Where a slot is defined and read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotInfo {
    /// Statements storing to the slot, including `NewVar` markers
    pub defs: Vec<usize>,
    /// Statements reading the slot, in stream order
    pub uses: Vec<usize>,
    /// Whether some statement tests the slot with `IsDefined`
    pub any_isdefined: bool,
}

impl SlotInfo {
    /// Returns the blocks containing a definition.
    #[must_use]
    pub fn def_blocks(&self, cfg: &Cfg) -> BitSet {
        BitSet::from_indices(cfg.len(), self.defs.iter().map(|&d| cfg.block_for_inst(d)))
    }
}

/// Returns the slot written by `stmt`, if any.
#[must_use]
pub fn defined_slot(stmt: &Stmt) -> Option<usize> {
    match stmt {
        Stmt::SlotStore { slot, .. } | Stmt::NewVar(slot) => Some(*slot),
        _ => None,
    }
}

/// Calls `f` for every slot read by `stmt`.
pub fn for_each_slot_use(stmt: &Stmt, mut f: impl FnMut(usize)) {
    stmt.for_each_operand(|v| {
        if let Value::Slot(slot) = v {
            f(*slot);
        }
    });
    if let Some(Expr::IsDefined(slot)) = stmt.expr() {
        f(*slot);
    }
}

/// Scans `ir` and returns one [`SlotInfo`] per slot.
///
/// # Errors
///
/// Returns [`Error::UnexpectedSlot`] for a slot number outside `0..nslots`.
pub fn scan_slot_def_use(ir: &IrCode, nslots: usize) -> Result<Vec<SlotInfo>> {
    let mut slots = vec![SlotInfo::default(); nslots];
    for (idx, stmt) in ir.stmts.stmts.iter().enumerate() {
        let mut bad = None;
        for_each_slot_use(stmt, |slot| match slots.get_mut(slot) {
            Some(info) => {
                if info.uses.last() != Some(&idx) {
                    info.uses.push(idx);
                }
            }
            None => bad = Some(slot),
        });
        if let Some(Expr::IsDefined(slot)) = stmt.expr() {
            if let Some(info) = slots.get_mut(*slot) {
                info.any_isdefined = true;
            }
        }
        if let Some(slot) = defined_slot(stmt) {
            match slots.get_mut(slot) {
                Some(info) => info.defs.push(idx),
                None => bad = Some(slot),
            }
        }
        if let Some(slot) = bad {
            return Err(Error::UnexpectedSlot(slot));
        }
    }
    Ok(slots)
}

/// Returns the blocks on whose entry `slot` is live.
///
/// A block is live-in if it reads the slot before writing it, or if it does not
/// write it and some successor is live-in.
#[must_use]
pub fn live_in_blocks(ir: &IrCode, slot: usize, info: &SlotInfo) -> BitSet {
    let cfg = &ir.cfg;
    let defs = info.def_blocks(cfg);
    let mut live = BitSet::new(cfg.len());
    let mut worklist = Vec::new();

    for &use_idx in &info.uses {
        let block = cfg.block_for_inst(use_idx);
        if live.contains(block) {
            continue;
        }
        let start = cfg.blocks[block].stmts.start;
        let defined_before = (start..use_idx).any(|i| defined_slot(&ir.stmts.stmts[i]) == Some(slot));
        if !defined_before {
            live.insert(block);
            worklist.push(block);
        }
    }

    while let Some(block) = worklist.pop() {
        for &pred in &cfg.blocks[block].preds {
            if !defs.contains(pred) && live.insert(pred) {
                worklist.push(pred);
            }
        }
    }
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, InstructionStream, IrType, StmtFlags, StmtRange};

    /// `#0: x = 1; goto_if_not _0 #2   #1: x = 2   #2: return x`
    fn diamond() -> IrCode {
        let stmts = vec![
            Stmt::SlotStore {
                slot: 1,
                value: Expr::Value(Value::int(1)),
            },
            Stmt::GotoIfNot {
                cond: Value::Argument(0),
                dest: 2,
            },
            Stmt::SlotStore {
                slot: 1,
                value: Expr::Value(Value::int(2)),
            },
            Stmt::Return(Some(Value::Slot(1))),
        ];
        let stream: InstructionStream = stmts
            .into_iter()
            .map(|s| Instruction::new(s, IrType::Int, 0, StmtFlags::empty()))
            .collect();
        let ranges = vec![StmtRange::new(0, 2), StmtRange::new(2, 3), StmtRange::new(3, 4)];
        let cfg = Cfg::from_block_ranges(ranges, &stream.stmts).expect("cfg");
        IrCode::new(stream, cfg, vec![IrType::Bool, IrType::Int])
    }

    #[test]
    fn test_scan_collects_defs_and_uses() {
        let ir = diamond();
        let slots = scan_slot_def_use(&ir, 2).expect("scan");
        assert_eq!(slots[1].defs, vec![0, 2]);
        assert_eq!(slots[1].uses, vec![3]);
        assert!(slots[0].defs.is_empty());
        assert!(!slots[1].any_isdefined);
    }

    #[test]
    fn test_scan_rejects_unknown_slot() {
        let ir = diamond();
        assert!(matches!(scan_slot_def_use(&ir, 1), Err(Error::UnexpectedSlot(1))));
    }

    #[test]
    fn test_liveness_stops_at_definitions() {
        let ir = diamond();
        let slots = scan_slot_def_use(&ir, 2).expect("scan");
        let live = live_in_blocks(&ir, 1, &slots[1]);
        assert!(live.contains(2));
        assert!(!live.contains(1));
        assert!(!live.contains(0));
    }
}
