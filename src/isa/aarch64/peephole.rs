//! MUL+ADD/MUL+SUB -> MADD/MSUB peephole fusion.
//!
//! Scope: one basic block's worth of already-register-allocated ARM64
//! instructions. A `MUL` is held back rather than printed immediately;
//! if the very next instruction is an `ADD`/`SUB` of the same IL class
//! that consumes the `MUL`'s destination, the pair collapses into one
//! `madd`/`msub` (or `fmadd`/`fmsub` for `s`/`d`). Anything else —
//! another ALU op, a load, a branch, the end of the block — flushes the
//! deferred `MUL` unfused first.
//!
//! One small instruction enum fed into an emission routine that renders
//! operands through dedicated per-kind formatting rather than a shared
//! string-builder state machine.

use crate::types::IlClass;

/// A fusable instruction's operand, already resolved past the virtual
/// temporary stage: all virtual temporaries have been resolved to
/// physical registers. `Spill` and `Imm` exist so the
/// precondition check has something concrete to reject: the pass must
/// decline to fuse across a spilled operand or an immediate, since
/// `madd`/`msub` take three register sources with no immediate form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(u8),
    Spill(u32),
    Imm(i64),
}

impl Operand {
    fn is_physical_register(&self) -> bool {
        matches!(self, Operand::Reg(_))
    }

    fn text(&self, cls: IlClass) -> String {
        match self {
            Operand::Reg(n) => reg_name(*n, cls),
            Operand::Spill(slot) => format!("[sp, #{slot}]"),
            Operand::Imm(v) => format!("#{v}"),
        }
    }
}

fn reg_name(n: u8, cls: IlClass) -> String {
    let prefix = match cls {
        IlClass::Long => "x",
        IlClass::Single => "s",
        IlClass::Double => "d",
        IlClass::Byte | IlClass::Half | IlClass::Word => "w",
    };
    format!("{prefix}{n}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Mul,
    Add,
    Sub,
}

/// One three-operand ALU instruction: a candidate either to be fused
/// away (`Mul`) or to trigger a fusion (`Add`/`Sub`).
#[derive(Debug, Clone, Copy)]
pub struct RawInst {
    pub op: AluOp,
    pub cls: IlClass,
    pub dst: Operand,
    pub lhs: Operand,
    pub rhs: Operand,
}

/// One instruction in a block, as the peephole pass sees it. Anything
/// that isn't a `mul`/`add`/`sub` triple is opaque to this pass and
/// rendered verbatim, but still flushes a deferred `MUL` first: any
/// non-MUL instruction encountered after a deferred MUL also flushes
/// the MUL.
#[derive(Debug, Clone)]
pub enum Inst {
    Alu(RawInst),
    Other(String),
}

/// Run the fusion pass over one basic block, returning the rendered
/// assembly lines in order.
pub fn fuse_block(insts: &[Inst]) -> Vec<String> {
    let mut out = Vec::with_capacity(insts.len());
    let mut pending: Option<RawInst> = None;

    for inst in insts {
        match inst {
            Inst::Alu(raw) if raw.op == AluOp::Mul => {
                if let Some(stale) = pending.take() {
                    out.push(render_plain(&stale));
                }
                pending = Some(*raw);
            }
            Inst::Alu(raw) if matches!(raw.op, AluOp::Add | AluOp::Sub) => {
                if let Some(mul) = pending.take() {
                    match try_fuse(&mul, raw) {
                        Some(fused) => {
                            out.push(fused);
                            continue;
                        }
                        None => out.push(render_plain(&mul)),
                    }
                }
                out.push(render_plain(raw));
            }
            Inst::Alu(_) => unreachable!("AluOp has only Mul, Add, Sub variants"),
            Inst::Other(text) => {
                if let Some(stale) = pending.take() {
                    out.push(render_plain(&stale));
                }
                out.push(text.clone());
            }
        }
    }

    if let Some(stale) = pending.take() {
        out.push(render_plain(&stale));
    }

    out
}

/// Check every fusion precondition and, if all hold, render the fused
/// `madd`/`msub`/`fmadd`/`fmsub`. `addsub` is the instruction
/// immediately following `mul` in program order, enforced by `fuse_block`
/// only ever calling this with the directly-preceding deferred `MUL`.
fn try_fuse(mul: &RawInst, addsub: &RawInst) -> Option<String> {
    if mul.cls != addsub.cls {
        return None;
    }
    let all_physical = [mul.dst, mul.lhs, mul.rhs, addsub.dst, addsub.lhs, addsub.rhs]
        .iter()
        .all(Operand::is_physical_register);
    if !all_physical {
        return None;
    }

    match addsub.op {
        AluOp::Add => {
            let accumulator = if addsub.lhs == mul.dst {
                Some(addsub.rhs)
            } else if addsub.rhs == mul.dst {
                Some(addsub.lhs)
            } else {
                None
            };
            accumulator.map(|acc| {
                render_fused(madd_mnemonic(mul.cls), mul.cls, addsub.dst, mul.lhs, mul.rhs, acc)
            })
        }
        // msub only when the MUL result is the subtrahend, i.e. SUB's
        // second operand.
        AluOp::Sub => {
            if addsub.rhs != mul.dst {
                return None;
            }
            Some(render_fused(
                msub_mnemonic(mul.cls),
                mul.cls,
                addsub.dst,
                mul.lhs,
                mul.rhs,
                addsub.lhs,
            ))
        }
        AluOp::Mul => None,
    }
}

fn madd_mnemonic(cls: IlClass) -> &'static str {
    if cls.is_float() {
        "fmadd"
    } else {
        "madd"
    }
}

fn msub_mnemonic(cls: IlClass) -> &'static str {
    if cls.is_float() {
        "fmsub"
    } else {
        "msub"
    }
}

/// Render `mnemonic Rd, Rn, Rm, Ra`. Each register name is produced by
/// its own call to `Operand::text` rather than threading one shared
/// formatter through all four operands, so no operand's rendering can
/// leak stray state into the next.
fn render_fused(
    mnemonic: &str,
    cls: IlClass,
    dst: Operand,
    rn: Operand,
    rm: Operand,
    ra: Operand,
) -> String {
    let d = dst.text(cls);
    let n = rn.text(cls);
    let m = rm.text(cls);
    let a = ra.text(cls);
    format!("{mnemonic} {d}, {n}, {m}, {a}")
}

fn plain_mnemonic(op: AluOp, cls: IlClass) -> &'static str {
    match (op, cls.is_float()) {
        (AluOp::Mul, false) => "mul",
        (AluOp::Add, false) => "add",
        (AluOp::Sub, false) => "sub",
        (AluOp::Mul, true) => "fmul",
        (AluOp::Add, true) => "fadd",
        (AluOp::Sub, true) => "fsub",
    }
}

fn render_plain(inst: &RawInst) -> String {
    let d = inst.dst.text(inst.cls);
    let l = inst.lhs.text(inst.cls);
    let r = inst.rhs.text(inst.cls);
    format!("{} {}, {}, {}", plain_mnemonic(inst.op, inst.cls), d, l, r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alu(op: AluOp, cls: IlClass, dst: u8, lhs: Operand, rhs: Operand) -> Inst {
        Inst::Alu(RawInst {
            op,
            cls,
            dst: Operand::Reg(dst),
            lhs,
            rhs,
        })
    }

    #[test]
    fn mul_then_add_fuses_to_madd() {
        let block = vec![
            alu(AluOp::Mul, IlClass::Long, 3, Operand::Reg(0), Operand::Reg(1)),
            alu(AluOp::Add, IlClass::Long, 4, Operand::Reg(3), Operand::Reg(2)),
        ];
        let out = fuse_block(&block);
        assert_eq!(out, vec!["madd x4, x0, x1, x2".to_string()]);
    }

    #[test]
    fn mul_then_sub_fuses_only_when_mul_is_subtrahend() {
        let fuses = vec![
            alu(AluOp::Mul, IlClass::Word, 3, Operand::Reg(0), Operand::Reg(1)),
            alu(AluOp::Sub, IlClass::Word, 4, Operand::Reg(2), Operand::Reg(3)),
        ];
        assert_eq!(fuse_block(&fuses), vec!["msub w4, w0, w1, w2".to_string()]);

        let no_fuse = vec![
            alu(AluOp::Mul, IlClass::Word, 3, Operand::Reg(0), Operand::Reg(1)),
            alu(AluOp::Sub, IlClass::Word, 4, Operand::Reg(3), Operand::Reg(2)),
        ];
        assert_eq!(
            fuse_block(&no_fuse),
            vec!["mul w3, w0, w1".to_string(), "sub w4, w3, w2".to_string()]
        );
    }

    #[test]
    fn float_classes_fuse_to_fmadd() {
        let block = vec![
            alu(AluOp::Mul, IlClass::Double, 5, Operand::Reg(0), Operand::Reg(1)),
            alu(AluOp::Add, IlClass::Double, 6, Operand::Reg(2), Operand::Reg(5)),
        ];
        assert_eq!(fuse_block(&block), vec!["fmadd d6, d0, d1, d2".to_string()]);
    }

    #[test]
    fn mismatched_class_does_not_fuse() {
        let block = vec![
            alu(AluOp::Mul, IlClass::Word, 3, Operand::Reg(0), Operand::Reg(1)),
            alu(AluOp::Add, IlClass::Long, 4, Operand::Reg(3), Operand::Reg(2)),
        ];
        assert_eq!(
            fuse_block(&block),
            vec!["mul w3, w0, w1".to_string(), "add x4, x3, x2".to_string()]
        );
    }

    #[test]
    fn spilled_operand_blocks_fusion() {
        let block = vec![
            alu(AluOp::Mul, IlClass::Long, 3, Operand::Reg(0), Operand::Reg(1)),
            alu(AluOp::Add, IlClass::Long, 4, Operand::Reg(3), Operand::Spill(16)),
        ];
        assert_eq!(
            fuse_block(&block),
            vec!["mul x3, x0, x1".to_string(), "add x4, x3, [sp, #16]".to_string()]
        );
    }

    #[test]
    fn intervening_instruction_flushes_deferred_mul() {
        let block = vec![
            alu(AluOp::Mul, IlClass::Long, 3, Operand::Reg(0), Operand::Reg(1)),
            Inst::Other("str x3, [sp, #0]".to_string()),
            alu(AluOp::Add, IlClass::Long, 4, Operand::Reg(3), Operand::Reg(2)),
        ];
        assert_eq!(
            fuse_block(&block),
            vec![
                "mul x3, x0, x1".to_string(),
                "str x3, [sp, #0]".to_string(),
                "add x4, x3, x2".to_string(),
            ]
        );
    }

    #[test]
    fn deferred_mul_at_block_end_is_flushed() {
        let block = vec![alu(AluOp::Mul, IlClass::Long, 3, Operand::Reg(0), Operand::Reg(1))];
        assert_eq!(fuse_block(&block), vec!["mul x3, x0, x1".to_string()]);
    }
}
