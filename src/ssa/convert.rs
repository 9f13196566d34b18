//! Structural conversion from [`CodeInfo`] to block-structured [`IrCode`].

use tracing::trace;

use crate::{
    effects::recompute_effects_flags,
    ir::{
        renumber::{
            block_deltas, renumber_cfg_stmts, renumber_ir_elements, ChangeMap, Renumbering,
        },
        Cfg, CodeInfo, Instruction, InstructionStream, IrCode, IrType, Stmt, StmtFlags,
    },
    utils::BitSet,
    Error, Result,
};

/// Converts an inferred body into block form.
///
/// Conversion
///
/// - appends an unreachable marker if control could fall off the end of the body,
/// - inserts an unreachable marker after every statement inferred to never return,
///   unless one already follows; the rest of its block becomes a separate
///   unreachable block that the first compaction drops,
/// - rewrites statement-index targets and phi edges into block indices,
/// - with `insert_coverage`, inserts a [`Stmt::Coverage`] marker before every
///   statement whose line differs from the previous one,
/// - flags every statement of a block from which all paths end in an unreachable
///   marker with [`StmtFlags::THROW_BLOCK`].
///
/// Slots are left in place for [`crate::ssa::slot2reg`]; the argument types of the
/// result cover every slot until then.
///
/// # Errors
///
/// Returns [`Error::EmptyBody`] for a body without statements and
/// [`Error::InvalidIr`] for a target outside the body.
pub fn convert_to_ircode(code: &CodeInfo, insert_coverage: bool) -> Result<IrCode> {
    let mut src = code.code.clone();
    let Some(last) = src.stmts.last() else {
        return Err(Error::EmptyBody);
    };
    if !last.is_terminator() || matches!(last, Stmt::GotoIfNot { .. } | Stmt::Enter { .. }) {
        let line = src.lines.last().copied().unwrap_or(0);
        src.push(marker(code, line));
    }

    let (mut out, markers) = insert_unreachable_markers(code, &src)?;

    let mut cfg = Cfg::from_statement_targets(&out.stmts)?;
    let len = out.len();
    let to_blocks: Vec<Option<usize>> = (0..len)
        .map(|idx| Some(cfg.block_for_inst(idx)))
        .collect();
    renumber_ir_elements(
        &mut out.stmts,
        &Renumbering::blocks(ChangeMap::identity(len), ChangeMap::from_mapping(&to_blocks)),
    )?;

    let coverage = if insert_coverage {
        insert_coverage_markers(code, &mut out, &mut cfg)?
    } else {
        0
    };
    let throw_blocks = mark_throw_blocks(&mut out, &cfg);

    trace!(
        method = %code.method.name,
        stmts = out.len(),
        blocks = cfg.len(),
        markers,
        coverage,
        throw_blocks,
        "converted to block form"
    );
    Ok(IrCode::new(out, cfg, code.slot_types.clone()))
}

/// Inserts a marker after every non-terminator typed `Bottom`; targets are still
/// statement indices.
fn insert_unreachable_markers(
    code: &CodeInfo,
    src: &InstructionStream,
) -> Result<(InstructionStream, usize)> {
    let n = src.len();
    let mut deltas = vec![0isize; n];
    let mut out = InstructionStream::with_capacity(n);
    let mut markers = 0usize;

    for idx in 0..n {
        let Some(inst) = src.get(idx) else {
            continue;
        };
        let never_returns =
            inst.ty.is_bottom() && !inst.stmt.is_terminator() && !matches!(inst.stmt, Stmt::Phi(_));
        let line = inst.line;
        out.push(inst);

        let followed_by_marker = src.stmts.get(idx + 1).is_some_and(Stmt::is_unreachable);
        if never_returns && !followed_by_marker {
            // the marker goes in front of the next statement
            if let Some(next) = deltas.get_mut(idx + 1) {
                *next += 1;
            }
            out.push(marker(code, line));
            markers += 1;
        }
    }

    let map = ChangeMap::from_deltas(&deltas)?;
    renumber_ir_elements(&mut out.stmts, &Renumbering::statements(map.clone(), map))?;
    Ok((out, markers))
}

/// Inserts coverage markers into a block-form body. Each marker joins the block of
/// the statement it precedes, so block indices are unchanged.
fn insert_coverage_markers(
    code: &CodeInfo,
    stream: &mut InstructionStream,
    cfg: &mut Cfg,
) -> Result<usize> {
    let n = stream.len();
    let mut deltas = vec![0isize; n];
    let mut out = InstructionStream::with_capacity(n);
    let mut prev_line = None;
    let mut inserted = 0usize;

    for (idx, delta) in deltas.iter_mut().enumerate() {
        let Some(inst) = stream.get(idx) else {
            continue;
        };
        if !matches!(inst.stmt, Stmt::Phi(_)) && prev_line != Some(inst.line) {
            out.push(Instruction::new(
                Stmt::Coverage,
                IrType::Nothing,
                inst.line,
                recompute_effects_flags(&Stmt::Coverage, &IrType::Nothing, code),
            ));
            *delta = 1;
            inserted += 1;
        }
        prev_line = Some(inst.line);
        out.push(inst);
    }

    let blocks = ChangeMap::identity(cfg.len());
    renumber_ir_elements(
        &mut out.stmts,
        &Renumbering::blocks(ChangeMap::from_deltas(&deltas)?, blocks.clone()),
    )?;
    let per_block = block_deltas(cfg, &deltas)?;
    renumber_cfg_stmts(cfg, &per_block, &blocks)?;
    *stream = out;
    Ok(inserted)
}

/// Flags the statements of blocks whose every path ends in an unreachable marker
/// and returns the number of such blocks.
fn mark_throw_blocks(stream: &mut InstructionStream, cfg: &Cfg) -> usize {
    let mut throws = BitSet::new(cfg.len());
    let mut worklist = Vec::new();
    for (b, block) in cfg.blocks.iter().enumerate() {
        let ends_unreachable = block
            .stmts
            .last()
            .and_then(|idx| stream.stmts.get(idx))
            .is_some_and(Stmt::is_unreachable);
        if ends_unreachable {
            throws.insert(b);
            worklist.push(b);
        }
    }
    while let Some(b) = worklist.pop() {
        for &pred in &cfg.blocks[b].preds {
            if throws.contains(pred) {
                continue;
            }
            if cfg.blocks[pred].succs.iter().all(|&s| throws.contains(s)) {
                throws.insert(pred);
                worklist.push(pred);
            }
        }
    }
    for b in throws.iter() {
        for idx in cfg.blocks[b].stmts.iter() {
            stream.add_flag(idx, StmtFlags::THROW_BLOCK);
        }
    }
    throws.count()
}

fn marker(code: &CodeInfo, line: u32) -> Instruction {
    Instruction::new(
        Stmt::UNREACHABLE,
        IrType::Bottom,
        line,
        recompute_effects_flags(&Stmt::UNREACHABLE, &IrType::Bottom, code),
    )
}
