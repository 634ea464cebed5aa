//! The statement parser: one preprocessed source line in, one
//! [`Instruction`] record out.
//!
//! A line is label + TIMES/prefixes + mnemonic + operands. Data
//! declarations (`db` and friends, `incbin`) take an extended operand
//! list; everything else takes up to [`MAX_OPERANDS`] ordinary operands.
//! Diagnostics go to the sink and parsing continues where it can; a line
//! that cannot produce a meaningful instruction comes back with
//! `opcode: None`.

mod decorators;
mod extop;
mod mref;
mod operand;

use crate::context::Context;
use crate::diag::{DiagKind, Report, WarnClass};
use crate::eval;
use crate::scan::{Scanner, Token, TokenKind};
use crate::symtab::SymbolTable;
use crate::x86::insn::{DecoFlags, Instruction, OperandType, MAX_OPERANDS};
use crate::x86::opcodes::{Opcode, Prefix};

use operand::{imm_flags, OperandOutcome};

/// Parses source lines against a context, defining labels into the symbol
/// table and reporting through the diagnostics sink.
pub struct LineParser<'a> {
    pub(crate) ctx: &'a Context,
    pub(crate) symtab: &'a mut SymbolTable,
    pub(crate) diag: &'a mut dyn Report,
}

impl<'a> LineParser<'a> {
    pub fn new(
        ctx: &'a Context,
        symtab: &'a mut SymbolTable,
        diag: &'a mut dyn Report,
    ) -> LineParser<'a> {
        LineParser { ctx, symtab, diag }
    }

    /// Parse one line. Always returns an instruction record; `opcode` is
    /// `None` when no instruction could be built (which may still leave a
    /// label defined).
    pub fn parse_line<'s>(&mut self, buffer: &'s str) -> Instruction<'s> {
        let mut insn_is_label = false;

        'restart: loop {
            let mut scan = Scanner::new(buffer);
            let mut result = Instruction::default();
            let mut first = true;
            let mut tok = scan.next();

            // label?
            if matches!(tok.kind, TokenKind::Id(_)) || insn_is_label {
                first = false;
                let name = match tok.kind {
                    TokenKind::Id(name) => name.to_owned(),
                    _ => tok.text.to_owned(),
                };
                tok = scan.next();
                if matches!(tok.kind, TokenKind::Colon) {
                    tok = scan.next();
                } else if tok.is_eos() {
                    self.diag.warn(WarnClass::LabelOrphan, DiagKind::LabelAlone);
                }
                if !matches!(tok.kind, TokenKind::Insn(Opcode::Equ)) {
                    // inside an absolute section the label belongs to the
                    // absolute segment, but tracks the running offset
                    let segment = if self.ctx.in_absolute {
                        self.ctx.absolute.segment
                    } else {
                        self.ctx.location.segment
                    };
                    self.symtab
                        .define_label(&name, segment, self.ctx.location.offset, true);
                }
                result.label = Some(name);
            }

            // things that go before the mnemonic
            let mut have_prefixes = false;
            while !tok.is_eos() {
                if matches!(tok.kind, TokenKind::Times) {
                    tok = scan.next();
                    let value = match eval::evaluate(
                        &mut scan,
                        &mut tok,
                        None,
                        self.ctx.pass.is_stable(),
                        None,
                        self.ctx,
                        &*self.symtab,
                        &mut *self.diag,
                    ) {
                        Some(v) => v,
                        None => {
                            result.opcode = None;
                            return result;
                        }
                    };
                    if !eval::is_simple(&value) {
                        self.diag.nonfatal(DiagKind::TimesNotConstant);
                        result.times = 1;
                    } else {
                        let n = eval::scalar(&value).unwrap_or(0);
                        result.times = n;
                        if n < 0 {
                            self.diag.nonfatal_pass2(DiagKind::TimesNegative(n));
                            result.times = 0;
                        }
                    }
                } else if self.add_prefix(&mut result, &tok) {
                    have_prefixes = true;
                    tok = scan.next();
                } else {
                    break;
                }
                first = false;
            }

            let opcode = match tok.kind {
                TokenKind::Insn(op) => op,
                _ => {
                    if tok.is_eos() {
                        if have_prefixes {
                            // prefixes with no instruction still have to be
                            // emitted; invent a RESB 0 to hang them on
                            result.opcode = Some(Opcode::Resb);
                            result.operands = 1;
                            result.oprs[0].ty =
                                imm_flags(0, OperandType::IMMEDIATE, self.ctx.optimizing);
                            result.oprs[0].offset = 0;
                        }
                    } else if !first {
                        self.diag.nonfatal(DiagKind::InstructionExpected);
                    } else if result.label.is_none() {
                        self.diag.nonfatal(DiagKind::LabelOrInstructionExpected);
                    }
                    return result;
                }
            };
            result.opcode = Some(opcode);

            // INCBIN must resolve on the first pass, so it always
            // evaluates critically
            let critical = self.ctx.pass.is_final() || opcode == Opcode::Incbin;

            if opcode.is_data_decl() || opcode == Opcode::Incbin {
                tok = scan.next();

                if first && matches!(tok.kind, TokenKind::Colon) {
                    // really a label that shadows a mnemonic name
                    insn_is_label = true;
                    continue 'restart;
                }

                let eops = self.parse_eops(&mut scan, &mut tok, critical, opcode.db_bytes());
                let Some((eops, count)) = eops else {
                    result.opcode = None;
                    return result;
                };
                result.eops = eops;

                if opcode == Opcode::Incbin {
                    if !self.incbin_shape_ok(&result) {
                        result.opcode = None;
                    }
                } else {
                    result.operands = count;
                    if count == 0 {
                        self.diag.warn(WarnClass::DbEmpty, DiagKind::DbNoOperand);
                    }
                }
                return result;
            }

            // ordinary operands, comma separated
            let far_jmp_ok = matches!(opcode, Opcode::Jmp | Opcode::Call);
            let mut opnum = 0;
            while opnum < MAX_OPERANDS {
                match self.parse_operand(&mut scan, &mut result, opnum, first, far_jmp_ok, critical)
                {
                    OperandOutcome::End => break,
                    OperandOutcome::Restart => {
                        insn_is_label = true;
                        continue 'restart;
                    }
                    OperandOutcome::Fail => {
                        result.opcode = None;
                        return result;
                    }
                    OperandOutcome::SaeEr => {
                        // the decorator folded into the previous operand;
                        // this slot is still free
                        result.evex_brerop = Some(opnum - 1);
                    }
                    OperandOutcome::Operand => {
                        if result.oprs[opnum]
                            .decoflags
                            .intersects(DecoFlags::BRDCAST_ER_SAE)
                        {
                            result.evex_brerop = Some(opnum);
                        }
                        opnum += 1;
                    }
                }
                first = false;
            }
            result.operands = opnum;

            return result;
        }
    }

    /// Try to absorb the current token as an instruction prefix. Segment
    /// registers are accepted here too (`es rep stosb`). Duplicate slot
    /// writes warn or error depending on whether they agree.
    fn add_prefix(&mut self, insn: &mut Instruction<'_>, tok: &Token<'_>) -> bool {
        let prefix = match tok.kind {
            TokenKind::Prefix(p) => p,
            TokenKind::Reg(r) if r.is_sreg() => Prefix::Seg(r),
            _ => return false,
        };

        let slot = prefix.slot().index();
        if let Some(existing) = insn.prefixes[slot] {
            if existing == prefix {
                self.diag
                    .warn(WarnClass::Other, DiagKind::RedundantPrefixes);
            } else {
                self.diag.nonfatal(DiagKind::ConflictingPrefixes);
            }
        }
        insn.prefixes[slot] = Some(prefix);
        true
    }

    /// INCBIN takes a file name, then an optional numeric offset, then an
    /// optional numeric length.
    fn incbin_shape_ok(&mut self, insn: &Instruction<'_>) -> bool {
        use crate::x86::insn::ExtopKind;

        let eops = &insn.eops;
        if eops.is_empty() || !matches!(eops[0].kind, ExtopKind::String { .. }) {
            self.diag.nonfatal(DiagKind::IncbinNeedsFile);
        } else if eops.len() >= 2 && !matches!(eops[1].kind, ExtopKind::Number { .. }) {
            self.diag.nonfatal(DiagKind::IncbinSecondNonNumeric);
        } else if eops.len() >= 3 && !matches!(eops[2].kind, ExtopKind::Number { .. }) {
            self.diag.nonfatal(DiagKind::IncbinThirdNonNumeric);
        } else if eops.len() > 3 {
            self.diag.nonfatal(DiagKind::IncbinTooManyParams);
        } else {
            return true;
        }
        false
    }

}
