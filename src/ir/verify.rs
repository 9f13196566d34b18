//! Structural verification of [`IrCode`].
//!
//! Verification is enabled through [`crate::OptimizerConfig::verify_ir`], which
//! defaults to on in debug builds only. A failed check is reported as
//! [`crate::Error::InvalidIr`].

use std::collections::BTreeSet;

use crate::{
    ir::{Cfg, IrCode, Stmt, StmtRange, Value},
    Error, Result,
};

/// Checks the CFG, the parallel instruction vectors and all operands of `ir`.
///
/// With `allow_slots` unset, any slot operand is an error.
///
/// # Errors
///
/// Returns the first violated invariant.
pub fn verify_ir(ir: &IrCode, allow_slots: bool) -> Result<()> {
    let n = ir.len();
    let stream = &ir.stmts;
    if stream.types.len() != n || stream.lines.len() != n || stream.flags.len() != n {
        return Err(invalid_ir!(
            "instruction vectors disagree: {} statements, {} types, {} lines, {} flags",
            n,
            stream.types.len(),
            stream.lines.len(),
            stream.flags.len()
        ));
    }

    verify_cfg(&ir.cfg, n)?;

    let expected = Cfg::from_block_ranges(
        ir.cfg.blocks.iter().map(|b| b.stmts).collect::<Vec<StmtRange>>(),
        &stream.stmts,
    )?;
    for (b, (have, want)) in ir.cfg.blocks.iter().zip(&expected.blocks).enumerate() {
        let have_succs: BTreeSet<usize> = have.succs.iter().copied().collect();
        let want_succs: BTreeSet<usize> = want.succs.iter().copied().collect();
        if have_succs != want_succs {
            return Err(invalid_ir!(
                "block {} has successors {:?}, terminator implies {:?}",
                b,
                have_succs,
                want_succs
            ));
        }
    }

    let limit = n + ir.new_nodes.len();
    for (b, block) in ir.cfg.blocks.iter().enumerate() {
        let mut in_phi_prefix = true;
        for idx in block.stmts.iter() {
            let stmt = &stream.stmts[idx];
            match stmt {
                Stmt::Phi(phi) => {
                    if !in_phi_prefix {
                        return Err(invalid_ir!("phi %{} follows a non-phi statement", idx));
                    }
                    if phi.edges.len() != phi.values.len() {
                        return Err(invalid_ir!("phi %{} has mismatched edges and values", idx));
                    }
                    if let Some(edge) = phi.edges.iter().find(|e| !block.preds.contains(e)) {
                        return Err(invalid_ir!(
                            "phi %{} has edge from {} which is not a predecessor of block {}",
                            idx,
                            edge,
                            b
                        ));
                    }
                }
                Stmt::Nop => {}
                _ => in_phi_prefix = false,
            }
            if stmt.is_terminator() && idx + 1 != block.stmts.end {
                return Err(invalid_ir!("terminator %{} is not the last of block {}", idx, b));
            }
            verify_operands(ir, stmt, idx, limit, allow_slots)?;
        }
    }
    Ok(())
}

fn verify_cfg(cfg: &Cfg, n: usize) -> Result<()> {
    if cfg.is_empty() {
        return Err(Error::EmptyBody);
    }
    let mut expected_start = 0;
    for (b, block) in cfg.blocks.iter().enumerate() {
        if block.stmts.start != expected_start || block.stmts.is_empty() {
            return Err(invalid_ir!(
                "block {} covers {}..{}, expected a non-empty range from {}",
                b,
                block.stmts.start,
                block.stmts.end,
                expected_start
            ));
        }
        expected_start = block.stmts.end;
        for &succ in &block.succs {
            if cfg.blocks.get(succ).map_or(true, |s| !s.preds.contains(&b)) {
                return Err(invalid_ir!("edge {} -> {} has no reverse entry", b, succ));
            }
        }
        for &pred in &block.preds {
            if cfg.blocks.get(pred).map_or(true, |p| !p.succs.contains(&b)) {
                return Err(invalid_ir!("edge {} -> {} has no forward entry", pred, b));
            }
        }
    }
    if expected_start != n {
        return Err(invalid_ir!(
            "blocks cover {} statements of {}",
            expected_start,
            n
        ));
    }
    if cfg.index.len() + 1 != cfg.len() {
        return Err(invalid_ir!("stale block index"));
    }
    Ok(())
}

fn verify_operands(
    ir: &IrCode,
    stmt: &Stmt,
    idx: usize,
    limit: usize,
    allow_slots: bool,
) -> Result<()> {
    let mut result = Ok(());
    stmt.for_each_operand(|value| {
        if result.is_err() {
            return;
        }
        result = match value {
            Value::Ssa(def) if *def >= limit => {
                Err(invalid_ir!("%{} uses out of range value %{}", idx, def))
            }
            Value::Ssa(def) if !matches!(stmt, Stmt::Phi(_)) && *def == idx => {
                Err(invalid_ir!("%{} uses itself", idx))
            }
            Value::Argument(arg) if *arg >= ir.argtypes.len() => {
                Err(invalid_ir!("%{} uses missing argument {}", idx, arg))
            }
            Value::Slot(slot) if !allow_slots => Err(Error::UnexpectedSlot(*slot)),
            _ => Ok(()),
        };
    });
    result?;
    match stmt {
        Stmt::SlotStore { slot, .. } | Stmt::NewVar(slot) if !allow_slots => {
            Err(Error::UnexpectedSlot(*slot))
        }
        Stmt::Expr(crate::ir::Expr::IsDefined(slot)) if !allow_slots => {
            Err(Error::UnexpectedSlot(*slot))
        }
        _ => Ok(()),
    }
}
