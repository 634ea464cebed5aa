//! Folding an evaluated expression into an effective address.

use crate::diag::DiagKind;
use crate::eval::{ExprTerm, TermKind};
use crate::x86::insn::{EaFlags, OpFlags, Operand, OperandType};
use crate::x86::registers::RegClass;

use super::LineParser;

impl LineParser<'_> {
    /// Fold a term vector into base/index/scale/offset/segment/wrt on `op`.
    /// May be called more than once per operand (`disp[regs]` syntax); the
    /// accumulated fields carry over. Returns false after diagnosing an
    /// impossible address.
    pub(crate) fn parse_mref(&mut self, op: &mut Operand, terms: &[ExprTerm]) -> bool {
        let mut base = op.basereg;
        let mut index = op.indexreg;
        let mut scale = op.scale;
        let mut offset = op.offset;

        for t in terms {
            match t.kind {
                TermKind::Register(r) => {
                    let is_gpr = r.class() == RegClass::Gpr;
                    if is_gpr && t.value == 1 && base.is_none() {
                        base = Some(r);
                    } else if index.is_none() {
                        index = Some(r);
                        scale = t.value;
                    } else {
                        let kind = if base.is_none() {
                            DiagKind::EaTwoIndexRegisters
                        } else if !is_gpr {
                            DiagKind::EaImpossibleRegister
                        } else {
                            DiagKind::EaTooManyRegisters
                        };
                        self.diag.nonfatal(kind);
                        return false;
                    }
                }
                TermKind::Unknown => {
                    op.opflags |= OpFlags::UNKNOWN;
                }
                TermKind::Simple => {
                    offset += t.value;
                }
                TermKind::Wrt(seg) => {
                    op.wrt = Some(seg);
                }
                TermKind::SegBase(seg) => {
                    if t.value == 1 {
                        if op.segment.is_some() {
                            self.diag.nonfatal(DiagKind::EaMultipleSegments);
                            return false;
                        }
                        op.segment = Some(seg);
                    } else if t.value == -1
                        && self.ctx.location.segment == Some(seg)
                        && !op.opflags.contains(OpFlags::RELATIVE)
                    {
                        op.opflags |= OpFlags::RELATIVE;
                    } else {
                        self.diag.nonfatal(DiagKind::EaImpossibleSegMultiplier);
                        return false;
                    }
                }
                TermKind::RdSae(_) => {
                    self.diag.nonfatal(DiagKind::EaBadSubexpression);
                    return false;
                }
            }
        }

        op.basereg = base;
        op.indexreg = index;
        op.scale = scale;
        op.offset = offset;
        true
    }

    /// Finish a reduced memory operand: mark it as memory, decide between
    /// absolute and IP-relative addressing when it has no registers, and
    /// set the vector-indexed memory class when the index register is a
    /// vector register.
    pub(crate) fn mref_set_optype(&self, op: &mut Operand) {
        op.ty |= OperandType::MEMORY;

        if op.basereg.is_none() && (op.indexreg.is_none() || op.scale == 0) {
            let is_rel = self.ctx.bits == 64
                && !op.eaflags.contains(EaFlags::ABS)
                && ((self.ctx.rel_default && !op.eaflags.contains(EaFlags::FSGS))
                    || op.eaflags.contains(EaFlags::REL));

            op.ty |= if is_rel {
                OperandType::IP_REL
            } else {
                OperandType::MEM_OFFS
            };
        }

        if let Some(index) = op.indexreg {
            match index.class() {
                RegClass::Xmm => op.ty |= OperandType::XMEM,
                RegClass::Ymm => op.ty |= OperandType::YMEM,
                RegClass::Zmm => op.ty |= OperandType::ZMEM,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::diag::Diagnostics;
    use crate::eval::ExprTerm;
    use crate::symtab::SymbolTable;
    use crate::x86::registers::Register;

    fn with_parser<R>(f: impl FnOnce(&mut LineParser<'_>) -> R) -> (R, Diagnostics) {
        let ctx = Context::default();
        let mut symtab = SymbolTable::new();
        let mut diag = Diagnostics::new();
        let r = {
            let mut p = LineParser::new(&ctx, &mut symtab, &mut diag);
            f(&mut p)
        };
        (r, diag)
    }

    fn reg(r: Register, value: i64) -> ExprTerm {
        ExprTerm {
            kind: TermKind::Register(r),
            value,
        }
    }

    #[test]
    fn base_index_scale_offset() {
        let (op, diag) = with_parser(|p| {
            let mut op = Operand::default();
            let terms = [
                reg(Register::Rbx, 1),
                reg(Register::Rcx, 4),
                ExprTerm::simple(8),
            ];
            assert!(p.parse_mref(&mut op, &terms));
            op
        });
        assert!(diag.is_empty());
        assert_eq!(op.basereg, Some(Register::Rbx));
        assert_eq!(op.indexreg, Some(Register::Rcx));
        assert_eq!(op.scale, 4);
        assert_eq!(op.offset, 8);
    }

    #[test]
    fn reduction_is_idempotent() {
        // re-reducing (base + index*scale + offset) reproduces the operand
        let (ops, _) = with_parser(|p| {
            let terms = [
                reg(Register::Rsi, 1),
                reg(Register::Rdi, 2),
                ExprTerm::simple(-5),
            ];
            let mut op1 = Operand::default();
            assert!(p.parse_mref(&mut op1, &terms));
            let again = [
                reg(op1.basereg.unwrap(), 1),
                reg(op1.indexreg.unwrap(), op1.scale),
                ExprTerm::simple(op1.offset),
            ];
            let mut op2 = Operand::default();
            assert!(p.parse_mref(&mut op2, &again));
            (op1, op2)
        });
        assert_eq!(ops.0, ops.1);
    }

    #[test]
    fn scaled_gpr_becomes_index() {
        let (op, _) = with_parser(|p| {
            let mut op = Operand::default();
            assert!(p.parse_mref(&mut op, &[reg(Register::Rcx, 2)]));
            op
        });
        assert_eq!(op.basereg, None);
        assert_eq!(op.indexreg, Some(Register::Rcx));
        assert_eq!(op.scale, 2);
    }

    #[test]
    fn three_registers_diagnose() {
        let (ok, diag) = with_parser(|p| {
            let mut op = Operand::default();
            p.parse_mref(
                &mut op,
                &[
                    reg(Register::Rax, 1),
                    reg(Register::Rbx, 1),
                    reg(Register::Rcx, 1),
                ],
            )
        });
        assert!(!ok);
        assert!(diag.contains(&DiagKind::EaTooManyRegisters));
    }

    #[test]
    fn two_scaled_registers_diagnose() {
        let (ok, diag) = with_parser(|p| {
            let mut op = Operand::default();
            p.parse_mref(&mut op, &[reg(Register::Rax, 2), reg(Register::Rbx, 2)])
        });
        assert!(!ok);
        assert!(diag.contains(&DiagKind::EaTwoIndexRegisters));
    }

    #[test]
    fn non_gpr_base_is_impossible() {
        let (ok, diag) = with_parser(|p| {
            let mut op = Operand::default();
            // xmm cannot be a base, and with the index slot taken the
            // remaining explanation is the register class
            p.parse_mref(
                &mut op,
                &[
                    reg(Register::Rax, 1),
                    reg(Register::Xmm1, 1),
                    reg(Register::Xmm2, 1),
                ],
            )
        });
        assert!(!ok);
        assert!(diag.contains(&DiagKind::EaImpossibleRegister));
    }

    #[test]
    fn absolute_forms() {
        let (op, _) = with_parser(|p| {
            let mut op = Operand::default();
            assert!(p.parse_mref(&mut op, &[ExprTerm::simple(0x1000)]));
            p.mref_set_optype(&mut op);
            op
        });
        assert!(op.ty.contains(OperandType::MEMORY));
        // 64-bit mode without `rel`: plain absolute
        assert!(op.ty.contains(OperandType::MEM_OFFS));
        assert!(!op.ty.contains(OperandType::IP_REL));
    }

    #[test]
    fn vector_index_classes() {
        let (op, _) = with_parser(|p| {
            let mut op = Operand::default();
            assert!(p.parse_mref(&mut op, &[reg(Register::Rax, 1), reg(Register::Ymm3, 1)]));
            p.mref_set_optype(&mut op);
            op
        });
        assert!(op.ty.contains(OperandType::YMEM));
    }
}
