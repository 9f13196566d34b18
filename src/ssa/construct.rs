//! Slot-to-SSA construction.
//!
//! [`slot2reg`] replaces every slot of a block-structured body with SSA values,
//! following the construction of Cytron et al. in three phases:
//!
//! 1. **Scan**: collect, per slot, the defining and reading statements
//!    ([`super::scan`]).
//! 2. **Placement**: insert an empty phi node in every block of the iterated
//!    dominance frontier of the slot's definition blocks, pruned to the blocks where
//!    the slot is live on entry. All phis of all slots are placed before any renaming
//!    so they stay ahead of the statements renaming inserts.
//! 3. **Renaming**: walk the dominator tree in preorder keeping the reaching value
//!    of the slot. Reads are replaced by the reaching value, stores become the
//!    definition of a fresh value and phi edges are filled from the value leaving
//!    each predecessor.
//!
//! The entry block defines every slot implicitly: arguments reach as themselves and
//! other slots as [`Value::Undef`]. A read reached only by `Undef` throws, so an
//! undefined-variable check with a constant `false` condition is inserted before it.
//! For slots that are tested with `IsDefined` or flagged [`SlotFlags::USED_UNDEF`] a
//! parallel boolean "is defined" value is tracked through its own phis and used as the
//! condition of the check wherever the slot is only maybe defined.
//!
//! Stores of a plain value are propagated as copies and leave a `Nop` behind. Blocks
//! unreachable from the entry are not renamed; their slot operands become `Undef` so
//! the next compaction can drop them.

use std::collections::HashSet;

use tracing::debug;

use crate::{
    ir::{
        CodeInfo, Expr, IrCode, IrType, NewInstruction, NewNode, PhiNode, SlotFlags, Stmt,
        StmtFlags, Value,
    },
    ssa::scan::{defined_slot, for_each_slot_use, live_in_blocks, scan_slot_def_use, SlotInfo},
    utils::graph::{
        algorithms::{
            compute_dominance_frontiers, compute_dominators, iterated_dominance_frontier,
            DominatorTree,
        },
        NodeId,
    },
    Error, Result,
};

/// What slot-to-SSA construction inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SsaStats {
    /// Slots with at least one definition or read
    pub slots: usize,
    /// Phi nodes merging slot values
    pub phis_inserted: usize,
    /// Boolean phi nodes tracking whether a slot is defined
    pub definedness_phis: usize,
    /// Undefined-variable checks inserted before reads
    pub undef_checks: usize,
}

/// Pending phi nodes of one slot, by block.
#[derive(Debug, Default)]
struct SlotPhis {
    values: Vec<Option<usize>>,
    defined: Vec<Option<usize>>,
}

impl SlotPhis {
    fn value_phi(&self, block: usize) -> Option<usize> {
        self.values.get(block).copied().flatten()
    }

    fn defined_phi(&self, block: usize) -> Option<usize> {
        self.defined.get(block).copied().flatten()
    }
}

/// The value of a slot at one program point.
#[derive(Debug, Clone)]
struct Reaching {
    value: Value,
    defined: Value,
}

impl Reaching {
    fn at_entry(slot: usize, nargs: usize) -> Self {
        if slot < nargs {
            Reaching {
                value: Value::Argument(slot),
                defined: Value::bool(true),
            }
        } else {
            Reaching {
                value: Value::Undef,
                defined: Value::bool(false),
            }
        }
    }
}

/// Converts the slots of `ir` into SSA values.
///
/// `code` is the body `ir` was converted from; it supplies slot types, slot flags and
/// the argument count. On success `ir` holds no slot operands, stores or `IsDefined`
/// tests, and its argument types are truncated to the real arguments. Inserted phis
/// and checks are pending until the next compaction.
///
/// # Errors
///
/// Returns [`Error::UnexpectedSlot`] for a slot outside the slot table and
/// [`Error::InvalidIr`] if a slot would need a phi in the entry block.
pub fn slot2reg(ir: &mut IrCode, code: &CodeInfo) -> Result<SsaStats> {
    let nslots = code.slot_count();
    let slots = scan_slot_def_use(ir, nslots)?;
    let domtree = compute_dominators(&ir.cfg, NodeId::new(0));
    let frontiers = compute_dominance_frontiers(&ir.cfg, &domtree);
    let preorder = domtree.preorder();
    let mut stats = SsaStats::default();

    let mut placed = Vec::with_capacity(nslots);
    for (slot, info) in slots.iter().enumerate() {
        if info.defs.is_empty() && info.uses.is_empty() {
            placed.push(SlotPhis::default());
            continue;
        }
        stats.slots += 1;
        let ty = code.slot_types.get(slot).cloned().unwrap_or(IrType::Any);
        let phis = place_phis(
            ir,
            &domtree,
            &frontiers,
            slot,
            info,
            tracks_definedness(code, slot, info),
            ty,
        )?;
        stats.phis_inserted += phis.values.iter().flatten().count();
        stats.definedness_phis += phis.defined.iter().flatten().count();
        placed.push(phis);
    }

    for (slot, info) in slots.iter().enumerate() {
        if info.defs.is_empty() && info.uses.is_empty() {
            continue;
        }
        let renamer = Renamer {
            slot,
            nargs: code.nargs,
            tracked: tracks_definedness(code, slot, info),
            phis: &placed[slot],
        };
        renamer.run(ir, &domtree, &preorder, info, &mut stats)?;
    }

    erase_unreachable(ir, &domtree);
    for stmt in &ir.stmts.stmts {
        let mut leftover = defined_slot(stmt);
        for_each_slot_use(stmt, |slot| leftover = Some(slot));
        if let Some(slot) = leftover {
            return Err(Error::UnexpectedSlot(slot));
        }
    }
    ir.argtypes.truncate(code.nargs);

    debug!(
        method = %code.method.name,
        slots = stats.slots,
        phis = stats.phis_inserted,
        definedness_phis = stats.definedness_phis,
        undef_checks = stats.undef_checks,
        "constructed SSA"
    );
    Ok(stats)
}

fn tracks_definedness(code: &CodeInfo, slot: usize, info: &SlotInfo) -> bool {
    info.any_isdefined
        || code
            .slot_flags
            .get(slot)
            .is_some_and(|flags| flags.contains(SlotFlags::USED_UNDEF))
}

fn place_phis(
    ir: &mut IrCode,
    domtree: &DominatorTree,
    frontiers: &[HashSet<NodeId>],
    slot: usize,
    info: &SlotInfo,
    tracked: bool,
    ty: IrType,
) -> Result<SlotPhis> {
    let mut def_blocks = info.def_blocks(&ir.cfg);
    def_blocks.insert(0);
    let live = live_in_blocks(ir, slot, info);
    let blocks: Vec<usize> =
        iterated_dominance_frontier(frontiers, def_blocks.iter().map(NodeId::new), Some(&live))
            .into_iter()
            .filter(|&node| domtree.is_reachable(node))
            .map(NodeId::index)
            .collect();
    if blocks.is_empty() {
        return Ok(SlotPhis::default());
    }
    if blocks.contains(&0) {
        return Err(invalid_ir!("slot {} needs a phi in the entry block", slot));
    }

    let nblocks = ir.cfg.len();
    let mut phis = SlotPhis {
        values: vec![None; nblocks],
        defined: if tracked { vec![None; nblocks] } else { Vec::new() },
    };
    for block in blocks {
        let start = ir.cfg.blocks[block].stmts.start;
        phis.values[block] = Some(pending_phi(ir, start, ty.clone()));
        if tracked {
            phis.defined[block] = Some(pending_phi(ir, start, IrType::Bool));
        }
    }
    Ok(phis)
}

fn pending_phi(ir: &mut IrCode, pos: usize, ty: IrType) -> usize {
    let node = ir.new_nodes.len();
    let line = ir.stmts.lines.get(pos).copied().unwrap_or(0);
    ir.insert_node(
        pos,
        NewInstruction::new(Stmt::Phi(PhiNode::new()), ty)
            .with_line(line)
            .with_flags(StmtFlags::PURE),
        false,
    );
    node
}

fn push_phi_edge(nodes: &mut [NewNode], node: usize, edge: usize, value: Value) -> Result<()> {
    match nodes.get_mut(node).map(|n| &mut n.inst.stmt) {
        Some(Stmt::Phi(phi)) => {
            phi.push(edge, value);
            Ok(())
        }
        _ => Err(invalid_ir!("pending node {} is not a phi", node)),
    }
}

/// Renames one slot over the dominator tree.
struct Renamer<'p> {
    slot: usize,
    nargs: usize,
    tracked: bool,
    phis: &'p SlotPhis,
}

impl Renamer<'_> {
    fn run(
        &self,
        ir: &mut IrCode,
        domtree: &DominatorTree,
        preorder: &[NodeId],
        info: &SlotInfo,
        stats: &mut SsaStats,
    ) -> Result<()> {
        let mut events: Vec<usize> = info.defs.iter().chain(&info.uses).copied().collect();
        events.sort_unstable();
        events.dedup();

        let base = ir.len();
        let mut out: Vec<Option<Reaching>> = vec![None; ir.cfg.len()];
        for &node in preorder {
            let block = node.index();
            let mut cur = if let Some(phi) = self.phis.value_phi(block) {
                Reaching {
                    value: Value::Ssa(base + phi),
                    defined: self
                        .phis
                        .defined_phi(block)
                        .map_or(Value::bool(true), |d| Value::Ssa(base + d)),
                }
            } else {
                match domtree.immediate_dominator(node) {
                    Some(idom) => out[idom.index()].clone().ok_or_else(|| {
                        invalid_ir!(
                            "block {} renamed before its dominator {}",
                            block,
                            idom.index()
                        )
                    })?,
                    None => Reaching::at_entry(self.slot, self.nargs),
                }
            };

            let range = ir.cfg.blocks[block].stmts;
            let from = events.partition_point(|&e| e < range.start);
            let to = events.partition_point(|&e| e < range.end);
            for &idx in &events[from..to] {
                self.rewrite(ir, idx, &mut cur, stats);
            }
            out[block] = Some(cur);
        }

        for block in 0..ir.cfg.len() {
            let Some(phi) = self.phis.value_phi(block) else {
                continue;
            };
            let defined = self.phis.defined_phi(block);
            for &pred in &ir.cfg.blocks[block].preds {
                let Some(reaching) = &out[pred] else {
                    continue;
                };
                push_phi_edge(&mut ir.new_nodes, phi, pred, reaching.value.clone())?;
                if let Some(d) = defined {
                    push_phi_edge(&mut ir.new_nodes, d, pred, reaching.defined.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Replaces the reads of the slot in statement `idx`, then applies its store.
    fn rewrite(&self, ir: &mut IrCode, idx: usize, cur: &mut Reaching, stats: &mut SsaStats) {
        let slot = self.slot;
        let mut reads = false;
        {
            let stmt = &mut ir.stmts.stmts[idx];
            stmt.for_each_operand_mut(|v| {
                if *v == Value::Slot(slot) {
                    *v = cur.value.clone();
                    reads = true;
                }
            });
            if let Stmt::Expr(e) | Stmt::SlotStore { value: e, .. } = stmt {
                if matches!(*e, Expr::IsDefined(s) if s == slot) {
                    *e = Expr::Value(cur.defined.clone());
                }
            }
        }
        if reads {
            self.check_read(ir, idx, cur, stats);
        }

        let stmt = &mut ir.stmts.stmts[idx];
        if defined_slot(stmt) != Some(slot) {
            return;
        }
        match std::mem::replace(stmt, Stmt::Nop) {
            Stmt::SlotStore {
                value: Expr::Value(v),
                ..
            } if !matches!(v, Value::Slot(_)) => {
                cur.value = v;
                cur.defined = Value::bool(true);
            }
            Stmt::SlotStore { value, .. } => {
                *stmt = Stmt::Expr(value);
                cur.value = Value::Ssa(idx);
                cur.defined = Value::bool(true);
            }
            _ => {
                cur.value = Value::Undef;
                cur.defined = Value::bool(false);
            }
        }
    }

    fn check_read(&self, ir: &mut IrCode, idx: usize, cur: &Reaching, stats: &mut SsaStats) {
        let cond = match &cur.value {
            Value::Undef => Value::bool(false),
            _ if self.tracked && cur.defined != Value::bool(true) => cur.defined.clone(),
            _ => return,
        };
        let line = ir.stmts.lines.get(idx).copied().unwrap_or(0);
        ir.insert_node(
            idx,
            NewInstruction::new(
                Stmt::Expr(Expr::ThrowUndefIfNot {
                    slot: self.slot,
                    cond,
                }),
                IrType::Nothing,
            )
            .with_line(line),
            false,
        );
        stats.undef_checks += 1;
    }
}

fn erase_unreachable(ir: &mut IrCode, domtree: &DominatorTree) {
    for (block, bb) in ir.cfg.blocks.iter().enumerate() {
        if domtree.is_reachable(NodeId::new(block)) {
            continue;
        }
        for idx in bb.stmts.iter() {
            let stmt = &mut ir.stmts.stmts[idx];
            stmt.for_each_operand_mut(|v| {
                if matches!(v, Value::Slot(_)) {
                    *v = Value::Undef;
                }
            });
            *stmt = match std::mem::replace(stmt, Stmt::Nop) {
                Stmt::SlotStore { value, .. } => Stmt::Expr(value),
                Stmt::NewVar(_) => Stmt::Nop,
                other => other,
            };
            if matches!(stmt, Stmt::Expr(Expr::IsDefined(_))) {
                *stmt = Stmt::Expr(Expr::Value(Value::bool(false)));
            }
        }
    }
}
