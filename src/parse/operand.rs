//! Parsing a single operand: size and type modifiers, memory references
//! (including compound mib forms and segment overrides), decorators, and
//! the final classification into register, memory, or immediate.

use crate::diag::{DiagKind, WarnClass};
use crate::eval::{self, EvalHints, ExprTerm, TermKind};
use crate::scan::{Scanner, Token, TokenFlags, TokenKind};
use crate::x86::insn::{
    DecoFlags, EaFlags, EaHint, Instruction, OpFlags, Operand, OperandType, RoundMode,
};
use crate::x86::opcodes::{Prefix, PrefixSlot, SizeKeyword, SpecialKeyword};

use super::LineParser;

/// What became of one operand slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum OperandOutcome {
    /// A live operand was stored in the slot.
    Operand,
    /// End of statement; the slot stays empty.
    End,
    /// A leading colon: the "mnemonic" was really a label, reparse.
    Restart,
    /// The "operand" was a rounding/SAE decorator that folded into the
    /// previous operand; the slot is reusable.
    SaeEr,
    /// Unrecoverable; the caller abandons the line.
    Fail,
}

impl LineParser<'_> {
    pub(crate) fn parse_operand<'s>(
        &mut self,
        scan: &mut Scanner<'s>,
        insn: &mut Instruction<'s>,
        opnum: usize,
        first: bool,
        far_jmp_ok: bool,
        critical: bool,
    ) -> OperandOutcome {
        let mut op = Operand::default();
        let mut tok = scan.next();

        if first && matches!(tok.kind, TokenKind::Colon) {
            return OperandOutcome::Restart;
        }

        if opnum == 0 {
            // braced prefixes like {evex} may sit between the mnemonic and
            // the first operand
            while tok.flags.contains(TokenFlags::BRACED) && self.add_prefix(insn, &tok) {
                tok = scan.next();
            }
        }

        if tok.is_eos() {
            return OperandOutcome::End;
        }

        // naked braced constant: a complete immediate operand
        if let TokenKind::BracedConst(value) = tok.kind {
            op.ty = imm_flags(value, OperandType::IMMEDIATE, self.ctx.optimizing);
            op.offset = value;
            tok = scan.next();
            if !matches!(tok.kind, TokenKind::Comma) {
                scan.pushback(tok);
            }
            insn.oprs[opnum] = op;
            return OperandOutcome::Operand;
        }

        // size and modifier prefixes; the first size wins
        let mut setsize = false;
        loop {
            match tok.kind {
                TokenKind::Size(kw) => {
                    if !setsize {
                        op.ty |= OperandType::size_from_bits(kw.bits());
                    }
                    setsize = true;
                }
                TokenKind::Special(sp) => match sp {
                    SpecialKeyword::To => op.ty |= OperandType::TO,
                    SpecialKeyword::Strict => op.ty |= OperandType::STRICT,
                    SpecialKeyword::Far => op.ty |= OperandType::FAR,
                    SpecialKeyword::Near => op.ty |= OperandType::NEAR,
                    SpecialKeyword::Short => op.ty |= OperandType::SHORT,
                    _ => self.diag.nonfatal(DiagKind::InvalidSizeSpec),
                },
                _ => break,
            }
            tok = scan.next();
        }

        let mut mref = false;
        let mut bracket = 0i32;
        if matches!(
            tok.kind,
            TokenKind::LBracket | TokenKind::MasmPtr | TokenKind::Amp
        ) {
            mref = true;
            if matches!(tok.kind, TokenKind::LBracket) {
                bracket += 1;
            }
            tok = scan.next();
        }

        let mut hints = EvalHints::default();
        let mut value: Vec<ExprTerm>;

        'mref_more: loop {
            if mref {
                let mut done = false;
                let mut nofw = false;
                while !done {
                    match tok.kind {
                        TokenKind::Special(_) | TokenKind::Size(_) | TokenKind::Prefix(_) => {
                            self.process_size_override(insn, &mut op, &tok);
                        }
                        TokenKind::LBracket => bracket += 1,
                        TokenKind::Comma => {
                            // empty mref: rewind the comma, pretend we saw
                            // a zero displacement
                            scan.pushback(tok.clone());
                            tok = Token::number(0);
                            done = true;
                            nofw = true;
                        }
                        TokenKind::MasmFlat => {
                            tok = scan.next();
                            if !matches!(tok.kind, TokenKind::Colon) {
                                self.diag.nonfatal(DiagKind::UnknownFlat);
                                nofw = true;
                            }
                            done = true;
                        }
                        _ => {
                            done = true;
                            nofw = true;
                        }
                    }
                    if !nofw {
                        tok = scan.next();
                    }
                }
            }

            match eval::evaluate(
                scan,
                &mut tok,
                Some(&mut op.opflags),
                critical,
                Some(&mut hints),
                self.ctx,
                &*self.symtab,
                &mut *self.diag,
            ) {
                Some(v) => value = v,
                None => return OperandOutcome::Fail,
            }
            if op.opflags.contains(OpFlags::FORWARD) {
                insn.forw_ref = true;
            }

            if matches!(tok.kind, TokenKind::LBracket) && bracket == 0 {
                // displacement[regs] syntax: bank what we have, keep going
                mref = true;
                self.parse_mref(&mut op, &value);
                continue 'mref_more;
            }

            if matches!(tok.kind, TokenKind::Colon) && (mref || !far_jmp_ok) {
                // segment override
                mref = true;
                match eval::single_register(&value) {
                    Some(reg) if reg.is_sreg() => {
                        if insn.prefixes[PrefixSlot::Seg.index()].is_some() {
                            self.diag.nonfatal(DiagKind::ConflictingSegmentOverrides);
                        } else {
                            insn.prefixes[PrefixSlot::Seg.index()] = Some(Prefix::Seg(reg));
                            if reg.is_fsgs() {
                                op.eaflags |= EaFlags::FSGS;
                            }
                        }
                    }
                    _ => self.diag.nonfatal(DiagKind::InvalidSegmentOverride),
                }
                tok = scan.next(); // skip the colon
                continue 'mref_more;
            }

            break;
        }

        // [base+offset, index*scale] (mib) syntax
        let mut mib = false;
        if mref && bracket > 0 && matches!(tok.kind, TokenKind::Comma) {
            if !self.parse_mref(&mut op, &value) {
                return OperandOutcome::Fail;
            }
            tok = scan.next(); // eat the comma
            let v2 = match eval::evaluate(
                scan,
                &mut tok,
                Some(&mut op.opflags),
                critical,
                Some(&mut hints),
                self.ctx,
                &*self.symtab,
                &mut *self.diag,
            ) {
                Some(v) => v,
                None => return OperandOutcome::Fail,
            };
            let mut o2 = Operand::default();
            if !self.parse_mref(&mut o2, &v2) {
                return OperandOutcome::Fail;
            }

            if o2.basereg.is_some() && o2.indexreg.is_none() {
                o2.indexreg = o2.basereg;
                o2.scale = 1;
                o2.basereg = None;
            }

            if op.indexreg.is_some()
                || o2.basereg.is_some()
                || o2.offset != 0
                || o2.segment.is_some()
                || o2.wrt.is_some()
            {
                self.diag.nonfatal(DiagKind::InvalidMib);
                return OperandOutcome::Fail;
            }

            op.indexreg = o2.indexreg;
            op.scale = o2.scale;

            if op.basereg.is_some() {
                op.hintbase = op.basereg;
                op.hinttype = EaHint::MakeBase;
            } else if op.indexreg.is_some() {
                op.hintbase = op.indexreg;
                op.hinttype = EaHint::NotBase;
            } else {
                op.hintbase = None;
                op.hinttype = EaHint::None;
            }

            mib = true;
        }

        // bracket balance, trailing decorators, terminator
        let mut recover = false;
        let mut brace_flags = DecoFlags::empty();
        if mref {
            if bracket == 1 {
                if matches!(tok.kind, TokenKind::RBracket) {
                    bracket -= 1;
                    tok = scan.next();
                } else {
                    self.diag.nonfatal(DiagKind::ExpectingCloseBracket);
                    recover = true;
                }
            } else if bracket > 1 {
                self.diag.nonfatal(DiagKind::ExcessBrackets);
                recover = true;
            } else if bracket < 0 {
                self.diag.nonfatal(DiagKind::UnmatchedBracket);
                recover = true;
            }

            if matches!(tok.kind, TokenKind::Decorator(_) | TokenKind::Opmask(_)) {
                recover = self.parse_decorators(scan, &mut tok, &mut brace_flags);
            }
            if !recover && !tok.is_eos() && !matches!(tok.kind, TokenKind::Comma) {
                self.diag
                    .nonfatal(DiagKind::ExpectedCommaOrDecorator(tok.describe()));
                recover = true;
            }
        } else if matches!(tok.kind, TokenKind::Colon) {
            // segment:offset immediate for far jumps
            op.ty |= OperandType::COLON;
        } else if matches!(tok.kind, TokenKind::Decorator(_) | TokenKind::Opmask(_)) {
            recover = self.parse_decorators(scan, &mut tok, &mut brace_flags);
        } else if !tok.is_eos() && !matches!(tok.kind, TokenKind::Comma) {
            self.diag.nonfatal(DiagKind::ExpectedCommaAfterOperand);
            recover = true;
        }

        if recover {
            while !tok.is_eos() && !matches!(tok.kind, TokenKind::Comma) {
                tok = scan.next();
            }
        }

        // classification
        op.decoflags |= brace_flags;

        if mref {
            if !mib {
                if !self.parse_mref(&mut op, &value) {
                    return OperandOutcome::Fail;
                }
                op.hintbase = hints.base;
                op.hinttype = hints.kind;
            }
            self.mref_set_optype(&mut op);
        } else if op.ty.contains(OperandType::FAR) && !far_jmp_ok {
            self.diag.nonfatal(DiagKind::InvalidFar);
        } else if eval::is_just_unknown(&value) {
            // immediate, value not known this pass
            op.ty |= OperandType::IMMEDIATE;
            op.opflags |= OpFlags::UNKNOWN;
            op.offset = 0;
            op.segment = None;
            op.wrt = None;
            if self.ctx.optimizing >= 0 && !op.ty.contains(OperandType::STRICT) {
                // be optimistic about the eventual size
                op.ty |= OperandType::UNITY
                    | OperandType::SBYTEWORD
                    | OperandType::SBYTEDWORD
                    | OperandType::UDWORD
                    | OperandType::SDWORD;
            }
        } else if eval::is_reloc(&value) {
            // immediate
            let n = eval::reloc_value(&value);
            op.ty |= OperandType::IMMEDIATE;
            op.offset = n;
            op.segment = eval::reloc_seg(&value);
            op.wrt = eval::reloc_wrt(&value);
            if eval::is_self_relative(&value, self.ctx.location.segment) {
                op.opflags |= OpFlags::RELATIVE;
            }
            if eval::is_simple(&value) {
                op.ty = imm_flags(n, op.ty, self.ctx.optimizing);
            }
        } else if let Some(TermKind::RdSae(mode)) = value.first().map(|t| t.kind) {
            // not an operand: a rounding or SAE decorator that belongs to
            // the operand before it
            if opnum == 0 {
                self.diag.nonfatal(DiagKind::InvalidDecorator);
                return OperandOutcome::Fail;
            }
            let prev = &mut insn.oprs[opnum - 1];
            prev.decoflags |= if mode == RoundMode::Sae {
                DecoFlags::SAE
            } else {
                DecoFlags::ER
            };
            insn.evex_rm = Some(mode);
            return OperandOutcome::SaeEr;
        } else {
            // a register, possibly a register set
            if !self.classify_register(&value, &mut op, brace_flags) {
                return OperandOutcome::Fail;
            }
        }

        insn.oprs[opnum] = op;
        OperandOutcome::Operand
    }

    /// The register-operand tail: exactly one register with coefficient 1,
    /// optionally plus a constant encoding a register-set size.
    fn classify_register(
        &mut self,
        value: &[ExprTerm],
        op: &mut Operand,
        brace_flags: DecoFlags,
    ) -> bool {
        let reg = match value.first() {
            Some(&ExprTerm {
                kind: TermKind::Register(reg),
                value: 1,
            }) => reg,
            _ => {
                self.diag.nonfatal(DiagKind::InvalidOperandType);
                return false;
            }
        };

        let mut regset_size: u64 = 0;
        for t in &value[1..] {
            if t.value == 0 {
                continue;
            }
            match t.kind {
                TermKind::Simple if regset_size == 0 => {
                    regset_size = t.value as u64 + 1;
                }
                _ => {
                    self.diag.nonfatal(DiagKind::InvalidOperandType);
                    return false;
                }
            }
        }

        if (regset_size & regset_size.wrapping_sub(1)) != 0
            || regset_size >= (1 << OperandType::REGSET_BITS)
        {
            self.diag.nonfatal_pass2(DiagKind::InvalidRegsetSize);
            regset_size = 0;
        }

        // an explicit size only matters if it disagrees with the register;
        // TO survives for FPU operands
        let rs = if !(op.ty & !OperandType::TO).is_empty() {
            op.ty & OperandType::SIZE_MASK
        } else {
            OperandType::empty()
        };

        op.ty &= OperandType::TO;
        op.ty |= OperandType::REGISTER | reg.size_flags();
        op.ty = op.ty.with_regset(regset_size);
        op.decoflags |= brace_flags;
        op.basereg = Some(reg);

        if !rs.is_empty() {
            let opsize = reg.size_flags();
            if opsize.is_empty() {
                // registers with no inherent size accept an override
                op.ty |= rs;
            } else if opsize != rs {
                self.diag
                    .warn(WarnClass::RegSize, DiagKind::RegSizeIgnored);
            }
        }
        true
    }

    /// A size keyword or address-size prefix inside a memory reference.
    /// In TASM mode it overrides the operand size; in the standard syntax
    /// it constrains the displacement or the addressing form.
    pub(crate) fn process_size_override<'s>(
        &mut self,
        insn: &mut Instruction<'s>,
        op: &mut Operand,
        tok: &Token<'s>,
    ) {
        if self.ctx.tasm_compatible {
            match tok.kind {
                TokenKind::Size(kw) => match kw {
                    SizeKeyword::Byte => op.ty |= OperandType::BITS8,
                    SizeKeyword::Word => op.ty |= OperandType::BITS16,
                    SizeKeyword::Dword => op.ty |= OperandType::BITS32,
                    SizeKeyword::Qword => op.ty |= OperandType::BITS64,
                    SizeKeyword::Tword => op.ty |= OperandType::BITS80,
                    SizeKeyword::Oword => op.ty |= OperandType::BITS128,
                    _ => self.diag.nonfatal(DiagKind::InvalidSizeSpec),
                },
                _ => self.diag.nonfatal(DiagKind::InvalidSizeSpec),
            }
        } else {
            match tok.kind {
                TokenKind::Special(SpecialKeyword::Nosplit) => op.eaflags |= EaFlags::TIMESTWO,
                TokenKind::Special(SpecialKeyword::Rel) => op.eaflags |= EaFlags::REL,
                TokenKind::Special(SpecialKeyword::Abs) => op.eaflags |= EaFlags::ABS,
                TokenKind::Size(SizeKeyword::Byte) => {
                    op.disp_size = 8;
                    op.eaflags |= EaFlags::BYTEOFFS;
                }
                TokenKind::Size(SizeKeyword::Word) => {
                    op.disp_size = 16;
                    op.eaflags |= EaFlags::WORDOFFS;
                }
                TokenKind::Size(SizeKeyword::Dword) => {
                    op.disp_size = 32;
                    op.eaflags |= EaFlags::WORDOFFS;
                }
                TokenKind::Size(SizeKeyword::Qword) => {
                    op.disp_size = 64;
                    op.eaflags |= EaFlags::WORDOFFS;
                }
                TokenKind::Prefix(p @ (Prefix::A16 | Prefix::A32 | Prefix::A64)) => {
                    let slot = PrefixSlot::AddrSize.index();
                    match insn.prefixes[slot] {
                        Some(existing) if existing != p => {
                            self.diag.nonfatal(DiagKind::ConflictingAddrSize)
                        }
                        _ => insn.prefixes[slot] = Some(p),
                    }
                }
                _ => self.diag.nonfatal(DiagKind::InvalidEaSizeSpec),
            }
        }
    }
}

/// Refine an immediate's type with the size classes its value fits in.
/// UNITY always tracks the value 1; the narrow-fit bits are skipped when
/// optimization is off or the operand is STRICT.
pub(crate) fn imm_flags(n: i64, flags: OperandType, optimizing: i32) -> OperandType {
    let mut flags = flags;
    if n == 1 {
        flags |= OperandType::UNITY;
    }

    if optimizing < 0 || flags.contains(OperandType::STRICT) {
        return flags;
    }

    if n as i32 == (n as i8) as i32 {
        flags |= OperandType::SBYTEDWORD;
    }
    if n as i16 == (n as i8) as i16 {
        flags |= OperandType::SBYTEWORD;
    }
    if n as u64 == (n as u32) as u64 {
        flags |= OperandType::UDWORD;
    }
    if n == (n as i32) as i64 {
        flags |= OperandType::SDWORD;
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const NORMAL: OperandType = OperandType::IMMEDIATE;

    #[test]
    fn unity_is_unconditional() {
        let f = imm_flags(1, OperandType::STRICT, 2);
        assert!(f.contains(OperandType::UNITY));
        let f = imm_flags(1, NORMAL, -1);
        assert!(f.contains(OperandType::UNITY));
    }

    #[rstest]
    #[case(0, true, true, true, true)]
    #[case(1, true, true, true, true)]
    #[case(-1, true, true, false, true)]
    #[case(127, true, true, true, true)]
    #[case(128, false, false, true, true)]
    #[case(-128, true, true, false, true)]
    #[case(-129, false, false, false, true)]
    #[case(0x7FFF_FFFF, false, false, true, true)]
    #[case(0x8000_0000, false, false, true, false)]
    #[case(-0x8000_0000, false, false, false, true)]
    #[case(0x1_0000_0000, false, false, false, false)]
    fn sign_fit_bits(
        #[case] n: i64,
        #[case] sbytedword: bool,
        #[case] sbyteword: bool,
        #[case] udword: bool,
        #[case] sdword: bool,
    ) {
        let f = imm_flags(n, NORMAL, 2);
        assert_eq!(f.contains(OperandType::SBYTEDWORD), sbytedword, "n={n}");
        assert_eq!(f.contains(OperandType::SBYTEWORD), sbyteword, "n={n}");
        assert_eq!(f.contains(OperandType::UDWORD), udword, "n={n}");
        assert_eq!(f.contains(OperandType::SDWORD), sdword, "n={n}");
    }

    #[test]
    fn strict_and_unoptimized_suppress_fit_bits() {
        let f = imm_flags(5, NORMAL | OperandType::STRICT, 2);
        assert!(!f.contains(OperandType::SBYTEDWORD));
        let f = imm_flags(5, NORMAL, -1);
        assert!(!f.contains(OperandType::SBYTEDWORD));
    }
}
