//! Index maintenance for structural edits.
//!
//! Passes describe an edit as a per-old-index delta: `0` keeps the statement in
//! place, `n > 0` inserts `n` statements before it and `-1` deletes it. A
//! [`ChangeMap`] turns the deltas into a cumulative remap in which deleted indices
//! carry the [`Remap::Deleted`] sentinel. [`renumber_ir_elements`] applies the remap
//! to every target, phi edge and operand of a statement list in one linear sweep,
//! and [`renumber_cfg_stmts`] moves block ranges by the per-block deltas that
//! [`block_deltas`] derives from the statement deltas.
//!
//! A change map describes exactly one edit. Composing edits requires building a fresh
//! map over the already renumbered indices.

use crate::{
    ir::{BasicBlock, Cfg, PhiNode, Stmt, StmtRange, Value},
    Result,
};

/// Where an old index ends up after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remap {
    /// The index moves by this offset
    Shift(isize),
    /// The element was deleted
    Deleted,
}

/// Cumulative old-to-new index map for one edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMap {
    entries: Vec<Remap>,
}

impl ChangeMap {
    /// Builds the map from per-index deltas.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIr`] for a delta below `-1`.
    pub fn from_deltas(deltas: &[isize]) -> Result<Self> {
        let mut running = 0isize;
        let mut entries = Vec::with_capacity(deltas.len());
        for (idx, &delta) in deltas.iter().enumerate() {
            match delta {
                -1 => {
                    entries.push(Remap::Deleted);
                    running -= 1;
                }
                d if d >= 0 => {
                    running += d;
                    entries.push(Remap::Shift(running));
                }
                d => return Err(invalid_ir!("invalid delta {} at index {}", d, idx)),
            }
        }
        Ok(Self { entries })
    }

    /// Builds the map from explicit new positions, `None` marking deletion.
    #[must_use]
    pub fn from_mapping(mapping: &[Option<usize>]) -> Self {
        let entries = mapping
            .iter()
            .enumerate()
            .map(|(old, new)| match new {
                // Indices are bounded by vector lengths, which fit in isize.
                Some(new) => Remap::Shift(*new as isize - old as isize),
                None => Remap::Deleted,
            })
            .collect();
        Self { entries }
    }

    /// The identity map over `len` indices.
    #[must_use]
    pub fn identity(len: usize) -> Self {
        Self {
            entries: vec![Remap::Shift(0); len],
        }
    }

    /// Returns the number of old indices covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map covers no indices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the remap entry for `old`.
    #[must_use]
    pub fn entry(&self, old: usize) -> Option<Remap> {
        self.entries.get(old).copied()
    }

    /// Returns the new index of `old`, or `None` if it was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIr`] if `old` is not covered by the map.
    pub fn map(&self, old: usize) -> Result<Option<usize>> {
        match self.entries.get(old) {
            Some(Remap::Shift(offset)) => Ok(Some(old.wrapping_add_signed(*offset))),
            Some(Remap::Deleted) => Ok(None),
            None => Err(invalid_ir!(
                "index {} outside renumbering map of {}",
                old,
                self.entries.len()
            )),
        }
    }

    /// Returns `true` if `old` was deleted.
    #[must_use]
    pub fn is_deleted(&self, old: usize) -> bool {
        matches!(self.entries.get(old), Some(Remap::Deleted))
    }
}

/// The maps applied to one statement list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renumbering {
    /// Statement index map for SSA operands
    pub values: ChangeMap,
    /// Map for control-flow targets
    pub labels: ChangeMap,
    /// Map for phi edges
    pub edges: ChangeMap,
}

impl Renumbering {
    /// Maps for a body whose targets and edges are statement indices.
    #[must_use]
    pub fn statements(values: ChangeMap, labels: ChangeMap) -> Self {
        Self {
            edges: labels.clone(),
            values,
            labels,
        }
    }

    /// Maps for a body whose targets and edges are block indices.
    #[must_use]
    pub fn blocks(values: ChangeMap, blocks: ChangeMap) -> Self {
        Self {
            edges: blocks.clone(),
            values,
            labels: blocks,
        }
    }
}

/// Applies `renumbering` to every element of `stmts`.
///
/// A conditional branch whose destination was deleted can never be taken and
/// becomes a no-op. Phi entries whose source edge was deleted are dropped.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidIr`] when a live statement still uses a deleted
/// value or jumps unconditionally to a deleted target, and for indices the maps do
/// not cover.
pub fn renumber_ir_elements(stmts: &mut [Stmt], renumbering: &Renumbering) -> Result<()> {
    for (idx, stmt) in stmts.iter_mut().enumerate() {
        renumber_stmt(stmt, renumbering).map_err(|err| match err {
            crate::Error::InvalidIr { message, file, line } => crate::Error::InvalidIr {
                message: format!("statement {idx}: {message}"),
                file,
                line,
            },
            other => other,
        })?;
    }
    Ok(())
}

fn renumber_stmt(stmt: &mut Stmt, renumbering: &Renumbering) -> Result<()> {
    match stmt {
        Stmt::Goto(target) => {
            *target = renumbering
                .labels
                .map(*target)?
                .ok_or_else(|| invalid_ir!("goto to deleted target {}", target))?;
        }
        Stmt::GotoIfNot { dest, .. } => match renumbering.labels.map(*dest)? {
            Some(new) => *dest = new,
            None => {
                *stmt = Stmt::Nop;
                return Ok(());
            }
        },
        Stmt::Enter { catch_dest } => {
            *catch_dest = renumbering
                .labels
                .map(*catch_dest)?
                .ok_or_else(|| invalid_ir!("handler {} was deleted", catch_dest))?;
        }
        Stmt::Phi(phi) => renumber_phi_edges(phi, &renumbering.edges)?,
        _ => {}
    }

    let mut result = Ok(());
    stmt.for_each_operand_mut(|value| {
        if result.is_err() {
            return;
        }
        if let Value::Ssa(old) = value {
            result = match renumbering.values.map(*old) {
                Ok(Some(new)) => {
                    *old = new;
                    Ok(())
                }
                Ok(None) => Err(invalid_ir!("use of deleted value %{}", old)),
                Err(err) => Err(err),
            };
        }
    });
    result
}

fn renumber_phi_edges(phi: &mut PhiNode, edges: &ChangeMap) -> Result<()> {
    let mut kept = PhiNode::new();
    for (edge, value) in phi.edges.iter().zip(phi.values.drain(..)) {
        if let Some(new) = edges.map(*edge)? {
            kept.push(new, value);
        }
    }
    *phi = kept;
    Ok(())
}

/// Sums per-statement deltas into per-block deltas.
///
/// An insertion before statement `i` and the deletion of `i` both count towards the
/// block holding `i`.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidIr`] when the delta list does not cover every
/// statement of `cfg`.
pub fn block_deltas(cfg: &Cfg, stmt_deltas: &[isize]) -> Result<Vec<isize>> {
    if stmt_deltas.len() != cfg.stmt_count() {
        return Err(invalid_ir!(
            "{} statement deltas for {} statements",
            stmt_deltas.len(),
            cfg.stmt_count()
        ));
    }
    Ok(cfg
        .blocks
        .iter()
        .map(|block| stmt_deltas[block.stmts.iter()].iter().sum())
        .collect())
}

/// Moves block statement ranges by per-block statement deltas and renumbers the
/// block graph by `blocks`.
///
/// `block_deltas[b]` is the net number of statements added to (positive) or removed
/// from (negative) block `b`. A block deleted by `blocks` must lose all of its
/// statements; it disappears from the graph together with every edge touching it.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidIr`] when the delta list or the block map does not
/// match the block count, a surviving block would end up empty, a deleted block
/// keeps statements, or `blocks` reorders blocks.
pub fn renumber_cfg_stmts(cfg: &mut Cfg, block_deltas: &[isize], blocks: &ChangeMap) -> Result<()> {
    if block_deltas.len() != cfg.len() || blocks.len() != cfg.len() {
        return Err(invalid_ir!(
            "{} block deltas and {} map entries for {} blocks",
            block_deltas.len(),
            blocks.len(),
            cfg.len()
        ));
    }
    let remap_edges = |edges: &[usize]| -> Result<Vec<usize>> {
        let mut out = Vec::with_capacity(edges.len());
        for &edge in edges {
            if let Some(new) = blocks.map(edge)? {
                out.push(new);
            }
        }
        Ok(out)
    };

    let mut kept = Vec::with_capacity(cfg.len());
    let mut shift = 0isize;
    for (b, block) in cfg.blocks.iter().enumerate() {
        let start = block.stmts.start.wrapping_add_signed(shift);
        shift += block_deltas[b];
        let end = block.stmts.end.wrapping_add_signed(shift);
        match blocks.map(b)? {
            None => {
                if end != start {
                    return Err(invalid_ir!(
                        "deleted block {} keeps {} statements",
                        b,
                        end.wrapping_sub(start)
                    ));
                }
            }
            Some(new) => {
                if new != kept.len() {
                    return Err(invalid_ir!("block {} moves to {} out of order", b, new));
                }
                if end <= start {
                    return Err(invalid_ir!("block {} becomes empty", b));
                }
                kept.push(BasicBlock {
                    stmts: StmtRange::new(start, end),
                    preds: remap_edges(&block.preds)?,
                    succs: remap_edges(&block.succs)?,
                });
            }
        }
    }
    *cfg = Cfg::new(kept);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ir::Expr, Error};

    #[test]
    fn test_cumulative_deltas() {
        let map = ChangeMap::from_deltas(&[0, 1, -1, 0, 2]).expect("valid deltas");
        assert_eq!(map.map(0).ok(), Some(Some(0)));
        assert_eq!(map.map(1).ok(), Some(Some(2)));
        assert_eq!(map.map(2).ok(), Some(None));
        assert_eq!(map.map(3).ok(), Some(Some(3)));
        assert_eq!(map.map(4).ok(), Some(Some(6)));
        assert!(map.map(5).is_err());
        assert!(ChangeMap::from_deltas(&[-2]).is_err());
    }

    #[test]
    fn test_from_mapping() {
        let map = ChangeMap::from_mapping(&[Some(0), None, Some(1)]);
        assert!(map.is_deleted(1));
        assert_eq!(map.map(2).ok(), Some(Some(1)));
        assert_eq!(map.entry(2), Some(Remap::Shift(-1)));
    }

    #[test]
    fn test_renumber_targets_phis_and_operands() {
        let mut phi = PhiNode::new();
        phi.push(0, Value::Ssa(0));
        phi.push(1, Value::Ssa(2));
        let mut stmts = vec![
            Stmt::Goto(3),
            Stmt::GotoIfNot {
                cond: Value::Ssa(0),
                dest: 1,
            },
            Stmt::Phi(phi),
            Stmt::Return(Some(Value::Ssa(2))),
        ];
        let values = ChangeMap::from_deltas(&[0, 0, 1, 0]).expect("deltas");
        let labels = ChangeMap::from_mapping(&[Some(0), None, Some(2), Some(4)]);
        renumber_ir_elements(&mut stmts, &Renumbering::statements(values, labels))
            .expect("renumbering succeeds");
        assert_eq!(stmts[0], Stmt::Goto(4));
        assert_eq!(stmts[1], Stmt::Nop);
        let Stmt::Phi(phi) = &stmts[2] else {
            panic!("phi expected");
        };
        assert_eq!(phi.edges, vec![0]);
        assert_eq!(phi.values, vec![Value::Ssa(0)]);
        assert_eq!(stmts[3], Stmt::Return(Some(Value::Ssa(3))));
    }

    #[test]
    fn test_use_of_deleted_value_is_rejected() {
        let mut stmts = vec![
            Stmt::Expr(Expr::Value(Value::int(1))),
            Stmt::Return(Some(Value::Ssa(0))),
        ];
        let values = ChangeMap::from_deltas(&[-1, 0]).expect("deltas");
        let result = renumber_ir_elements(
            &mut stmts,
            &Renumbering::statements(values.clone(), values),
        );
        assert!(matches!(result, Err(Error::InvalidIr { .. })));
    }

    #[test]
    fn test_goto_to_deleted_target_is_rejected() {
        let mut stmts = vec![Stmt::Goto(1), Stmt::Nop];
        let map = ChangeMap::from_deltas(&[0, -1]).expect("deltas");
        assert!(renumber_ir_elements(&mut stmts, &Renumbering::statements(map.clone(), map)).is_err());
    }

    #[test]
    fn test_renumber_cfg_stmts() {
        let stmts = vec![
            Stmt::GotoIfNot {
                cond: Value::Argument(0),
                dest: 2,
            },
            Stmt::Nop,
            Stmt::Return(None),
        ];
        let mut cfg = Cfg::from_statement_targets(&stmts).expect("cfg");
        let deltas = block_deltas(&cfg, &[1, 0, 2]).expect("block deltas");
        assert_eq!(deltas, vec![1, 0, 2]);
        renumber_cfg_stmts(&mut cfg, &deltas, &ChangeMap::identity(3)).expect("renumber");
        assert_eq!(cfg.blocks[0].stmts, StmtRange::new(0, 2));
        assert_eq!(cfg.blocks[1].stmts, StmtRange::new(2, 3));
        assert_eq!(cfg.blocks[2].stmts, StmtRange::new(3, 6));
        assert_eq!(cfg.block_for_inst(2), 1);
        assert!(renumber_cfg_stmts(&mut cfg, &[0, -1, 0], &ChangeMap::identity(3)).is_err());
        assert!(block_deltas(&cfg, &[0, 0]).is_err());
    }

    #[test]
    fn test_renumber_cfg_drops_deleted_blocks_and_edges() {
        // #0: goto_if_not #2   #1: nop; nop   #2: return
        let stmts = vec![
            Stmt::GotoIfNot {
                cond: Value::Argument(0),
                dest: 3,
            },
            Stmt::Nop,
            Stmt::Nop,
            Stmt::Return(None),
        ];
        let mut cfg = Cfg::from_statement_targets(&stmts).expect("cfg");
        assert_eq!(cfg.blocks[2].preds, vec![0, 1]);

        let deltas = block_deltas(&cfg, &[0, -1, -1, 1]).expect("block deltas");
        let blocks = ChangeMap::from_deltas(&[0, -1, 0]).expect("block map");
        renumber_cfg_stmts(&mut cfg, &deltas, &blocks).expect("renumber");
        assert_eq!(cfg.len(), 2);
        assert_eq!(cfg.blocks[0].stmts, StmtRange::new(0, 1));
        assert_eq!(cfg.blocks[1].stmts, StmtRange::new(1, 3));
        assert_eq!(cfg.blocks[0].succs, vec![1]);
        assert_eq!(cfg.blocks[1].preds, vec![0]);
        assert_eq!(cfg.block_for_inst(2), 1);
    }

    #[test]
    fn test_deleted_block_must_lose_its_statements() {
        let stmts = vec![Stmt::Goto(2), Stmt::Nop, Stmt::Return(None)];
        let mut cfg = Cfg::from_statement_targets(&stmts).expect("cfg");
        let blocks = ChangeMap::from_deltas(&[0, -1, 0]).expect("block map");
        let result = renumber_cfg_stmts(&mut cfg, &[0, 0, 0], &blocks);
        assert!(matches!(result, Err(Error::InvalidIr { .. })));
    }
}
