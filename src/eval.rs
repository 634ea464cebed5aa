//! The expression evaluator.
//!
//! Reduces a token stream to a vector of [`ExprTerm`]s: a linear
//! combination of registers, segment bases, an optional WRT target, and a
//! plain number. The parser turns these vectors into operands; it never
//! looks at the token stream for expression content itself.
//!
//! Evaluation is cooperative with the scanner: it starts at the caller's
//! current token and leaves the terminating token behind for the caller.

use crate::context::Context;
use crate::diag::{DiagKind, Report};
use crate::scan::{DecoratorKind, Scanner, Token, TokenKind};
use crate::symtab::{SegmentId, SymbolTable};
use crate::x86::insn::{EaHint, OpFlags, RoundMode};
use crate::x86::registers::Register;

/// What a term contributes to the expression value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TermKind {
    /// A register scaled by the term's value.
    Register(Register),
    /// A value unresolvable this pass.
    Unknown,
    /// A plain number (the term's value).
    Simple,
    /// A WRT target segment.
    Wrt(SegmentId),
    /// A segment base scaled by the term's value.
    SegBase(SegmentId),
    /// An embedded-rounding / SAE decorator in operand position.
    RdSae(RoundMode),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExprTerm {
    pub kind: TermKind,
    pub value: i64,
}

impl ExprTerm {
    pub fn simple(value: i64) -> ExprTerm {
        ExprTerm {
            kind: TermKind::Simple,
            value,
        }
    }
}

/// Preferred-base hint derived while evaluating, for the encoder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct EvalHints {
    pub base: Option<Register>,
    pub kind: EaHint,
}

/// Evaluate one expression. `tok` must hold the first token of the
/// expression on entry and holds the terminating token on exit. `critical`
/// turns unresolved symbols into hard diagnostics instead of forward
/// references. Returns `None` after reporting on a malformed expression.
#[allow(clippy::too_many_arguments)]
pub fn evaluate<'s>(
    scan: &mut Scanner<'s>,
    tok: &mut Token<'s>,
    opflags: Option<&mut OpFlags>,
    critical: bool,
    hints: Option<&mut EvalHints>,
    ctx: &Context,
    symtab: &SymbolTable,
    diag: &mut dyn Report,
) -> Option<Vec<ExprTerm>> {
    let mut e = Eval {
        scan,
        ctx,
        symtab,
        diag,
        critical,
        flags: OpFlags::empty(),
    };
    let value = e.wrt_level(tok)?;
    let flags = e.flags;

    if let Some(out) = opflags {
        *out |= flags;
    }
    if let Some(out) = hints {
        *out = EvalHints::default();
        for t in &value {
            if let TermKind::Register(r) = t.kind {
                if t.value == 1 {
                    out.base = Some(r);
                    out.kind = EaHint::MakeBase;
                    break;
                }
            }
        }
    }
    Some(value)
}

struct Eval<'a, 's> {
    scan: &'a mut Scanner<'s>,
    ctx: &'a Context,
    symtab: &'a SymbolTable,
    diag: &'a mut dyn Report,
    critical: bool,
    flags: OpFlags,
}

impl<'a, 's> Eval<'a, 's> {
    fn advance(&mut self, tok: &mut Token<'s>) {
        *tok = self.scan.next();
    }

    /// expr WRT segment
    fn wrt_level(&mut self, tok: &mut Token<'s>) -> Option<Vec<ExprTerm>> {
        let mut value = self.bor_level(tok)?;
        while matches!(tok.kind, TokenKind::Wrt) {
            self.advance(tok);
            let seg = match tok.kind {
                TokenKind::Id(name) => self.symtab.segment_id(name),
                _ => None,
            };
            match seg {
                Some(seg) => {
                    self.advance(tok);
                    value.push(ExprTerm {
                        kind: TermKind::Wrt(seg),
                        value: 1,
                    });
                    value = normalize(value);
                }
                None => {
                    self.diag.nonfatal(DiagKind::WrtNeedsSegment);
                    return None;
                }
            }
        }
        Some(value)
    }

    fn bor_level(&mut self, tok: &mut Token<'s>) -> Option<Vec<ExprTerm>> {
        let mut value = self.bxor_level(tok)?;
        while matches!(tok.kind, TokenKind::Pipe) {
            self.advance(tok);
            let rhs = self.bxor_level(tok)?;
            value = self.scalar_op(value, rhs, "|")?;
        }
        Some(value)
    }

    fn bxor_level(&mut self, tok: &mut Token<'s>) -> Option<Vec<ExprTerm>> {
        let mut value = self.band_level(tok)?;
        while matches!(tok.kind, TokenKind::Caret) {
            self.advance(tok);
            let rhs = self.band_level(tok)?;
            value = self.scalar_op(value, rhs, "^")?;
        }
        Some(value)
    }

    fn band_level(&mut self, tok: &mut Token<'s>) -> Option<Vec<ExprTerm>> {
        let mut value = self.shift_level(tok)?;
        while matches!(tok.kind, TokenKind::Amp) {
            self.advance(tok);
            let rhs = self.shift_level(tok)?;
            value = self.scalar_op(value, rhs, "&")?;
        }
        Some(value)
    }

    fn shift_level(&mut self, tok: &mut Token<'s>) -> Option<Vec<ExprTerm>> {
        let mut value = self.add_level(tok)?;
        loop {
            let op = match tok.kind {
                TokenKind::Shl => "<<",
                TokenKind::Shr => ">>",
                _ => break,
            };
            self.advance(tok);
            let rhs = self.add_level(tok)?;
            value = self.scalar_op(value, rhs, op)?;
        }
        Some(value)
    }

    fn add_level(&mut self, tok: &mut Token<'s>) -> Option<Vec<ExprTerm>> {
        let mut value = self.mul_level(tok)?;
        loop {
            let negate = match tok.kind {
                TokenKind::Plus => false,
                TokenKind::Minus => true,
                _ => break,
            };
            self.advance(tok);
            let rhs = self.mul_level(tok)?;
            add_scaled(&mut value, &rhs, if negate { -1 } else { 1 });
            value = normalize(value);
        }
        Some(value)
    }

    fn mul_level(&mut self, tok: &mut Token<'s>) -> Option<Vec<ExprTerm>> {
        let mut value = self.unary_level(tok)?;
        loop {
            let op = match tok.kind {
                TokenKind::Star => "*",
                TokenKind::Slash => "/",
                TokenKind::Percent => "%",
                _ => break,
            };
            self.advance(tok);
            let rhs = self.unary_level(tok)?;
            value = match op {
                "*" => self.multiply(value, rhs)?,
                _ => self.divide(value, rhs, op)?,
            };
        }
        Some(value)
    }

    fn unary_level(&mut self, tok: &mut Token<'s>) -> Option<Vec<ExprTerm>> {
        match tok.kind {
            TokenKind::Minus => {
                self.advance(tok);
                let mut v = self.unary_level(tok)?;
                for t in &mut v {
                    t.value = t.value.wrapping_neg();
                }
                Some(normalize(v))
            }
            TokenKind::Plus => {
                self.advance(tok);
                self.unary_level(tok)
            }
            TokenKind::Tilde => {
                self.advance(tok);
                let v = self.unary_level(tok)?;
                match scalar(&v) {
                    Some(n) => Some(vec![ExprTerm::simple(!n)]),
                    None => {
                        self.diag.nonfatal(DiagKind::ScalarOperatorOnly("~"));
                        None
                    }
                }
            }
            _ => self.primary(tok),
        }
    }

    fn primary(&mut self, tok: &mut Token<'s>) -> Option<Vec<ExprTerm>> {
        let value = match &tok.kind {
            TokenKind::Num(n) => vec![ExprTerm::simple(*n)],
            TokenKind::Str(bytes) => {
                // short strings are little-endian numbers
                let mut n: i64 = 0;
                for (i, &b) in bytes.iter().take(8).enumerate() {
                    n |= (b as i64) << (8 * i);
                }
                vec![ExprTerm::simple(n)]
            }
            TokenKind::Reg(r) => vec![ExprTerm {
                kind: TermKind::Register(*r),
                value: 1,
            }],
            TokenKind::Id(name) => match self.symtab.lookup(name) {
                Some(sym) => {
                    let mut v = Vec::new();
                    if let Some(seg) = sym.segment {
                        v.push(ExprTerm {
                            kind: TermKind::SegBase(seg),
                            value: 1,
                        });
                    }
                    v.push(ExprTerm::simple(sym.offset));
                    v
                }
                None => {
                    if self.critical {
                        self.diag
                            .nonfatal(DiagKind::SymbolNotDefined((*name).to_owned()));
                        return None;
                    }
                    self.flags |= OpFlags::FORWARD | OpFlags::UNKNOWN;
                    vec![ExprTerm {
                        kind: TermKind::Unknown,
                        value: 1,
                    }]
                }
            },
            TokenKind::Dollar => {
                let mut v = Vec::new();
                if let Some(seg) = self.ctx.location.segment {
                    v.push(ExprTerm {
                        kind: TermKind::SegBase(seg),
                        value: 1,
                    });
                }
                v.push(ExprTerm::simple(self.ctx.location.offset));
                v
            }
            TokenKind::DollarDollar => {
                let mut v = Vec::new();
                if let Some(seg) = self.ctx.location.segment {
                    v.push(ExprTerm {
                        kind: TermKind::SegBase(seg),
                        value: 1,
                    });
                }
                v.push(ExprTerm::simple(0));
                v
            }
            TokenKind::Decorator(DecoratorKind::Round(mode)) => vec![ExprTerm {
                kind: TermKind::RdSae(*mode),
                value: 1,
            }],
            TokenKind::Decorator(DecoratorKind::Sae) => vec![ExprTerm {
                kind: TermKind::RdSae(RoundMode::Sae),
                value: 1,
            }],
            TokenKind::LParen => {
                self.advance(tok);
                let v = self.wrt_level(tok)?;
                if !matches!(tok.kind, TokenKind::RParen) {
                    self.diag
                        .nonfatal(DiagKind::ExprExpectedParen(tok.describe()));
                    return None;
                }
                self.advance(tok);
                return Some(v);
            }
            _ => {
                self.diag.nonfatal(DiagKind::ExprSyntax(tok.describe()));
                return None;
            }
        };
        self.advance(tok);
        Some(normalize(value))
    }

    fn multiply(&mut self, a: Vec<ExprTerm>, b: Vec<ExprTerm>) -> Option<Vec<ExprTerm>> {
        let (k, mut terms) = if let Some(k) = scalar(&a) {
            (k, b)
        } else if let Some(k) = scalar(&b) {
            (k, a)
        } else {
            self.diag.nonfatal(DiagKind::NonScalarProduct);
            return None;
        };
        if terms
            .iter()
            .any(|t| matches!(t.kind, TermKind::Wrt(_) | TermKind::RdSae(_)))
        {
            self.diag.nonfatal(DiagKind::NonScalarProduct);
            return None;
        }
        for t in &mut terms {
            t.value = t.value.wrapping_mul(k);
        }
        Some(normalize(terms))
    }

    fn divide(
        &mut self,
        a: Vec<ExprTerm>,
        b: Vec<ExprTerm>,
        op: &'static str,
    ) -> Option<Vec<ExprTerm>> {
        self.scalar_op(a, b, op)
    }

    fn scalar_op(
        &mut self,
        a: Vec<ExprTerm>,
        b: Vec<ExprTerm>,
        op: &'static str,
    ) -> Option<Vec<ExprTerm>> {
        let (Some(x), Some(y)) = (scalar(&a), scalar(&b)) else {
            self.diag.nonfatal(DiagKind::ScalarOperatorOnly(op));
            return None;
        };
        let n = match op {
            "|" => x | y,
            "^" => x ^ y,
            "&" => x & y,
            "<<" => ((x as u64) << (y as u32 & 63)) as i64,
            ">>" => ((x as u64) >> (y as u32 & 63)) as i64,
            "/" | "%" => {
                if y == 0 {
                    self.diag.nonfatal(DiagKind::DivisionByZero);
                    return None;
                }
                if op == "/" {
                    ((x as u64) / (y as u64)) as i64
                } else {
                    ((x as u64) % (y as u64)) as i64
                }
            }
            _ => unreachable!(),
        };
        Some(vec![ExprTerm::simple(n)])
    }
}

/// Accumulate `src`, scaled by `k`, into `dst`.
fn add_scaled(dst: &mut Vec<ExprTerm>, src: &[ExprTerm], k: i64) {
    for t in src {
        dst.push(ExprTerm {
            kind: t.kind,
            value: t.value.wrapping_mul(k),
        });
    }
}

/// The scalar value of a pure-number expression, if it is one.
pub fn scalar(terms: &[ExprTerm]) -> Option<i64> {
    let mut n = 0;
    for t in terms {
        match t.kind {
            TermKind::Simple => n += t.value,
            _ if t.value == 0 => {}
            _ => return None,
        }
    }
    Some(n)
}

/// Merge like terms, drop zero terms, and order the vector: registers
/// first, then decorators, segment bases, WRT, unknowns, with the plain
/// number last. A value is never empty; a pure zero stays as one Simple
/// term.
pub fn normalize(terms: Vec<ExprTerm>) -> Vec<ExprTerm> {
    let mut regs: Vec<ExprTerm> = Vec::new();
    let mut segs: Vec<ExprTerm> = Vec::new();
    let mut rest: Vec<ExprTerm> = Vec::new();
    let mut simple: i64 = 0;
    let mut has_simple = false;

    for t in terms {
        match t.kind {
            TermKind::Simple => {
                simple += t.value;
                has_simple = true;
            }
            TermKind::Register(_) => merge_into(&mut regs, t),
            TermKind::SegBase(_) => merge_into(&mut segs, t),
            TermKind::Unknown | TermKind::Wrt(_) | TermKind::RdSae(_) => {
                merge_into(&mut rest, t)
            }
        }
    }

    let mut out: Vec<ExprTerm> = Vec::new();
    out.extend(regs.into_iter().filter(|t| t.value != 0));
    let (deco, rest): (Vec<_>, Vec<_>) = rest
        .into_iter()
        .filter(|t| t.value != 0)
        .partition(|t| matches!(t.kind, TermKind::RdSae(_)));
    out.extend(deco);
    out.extend(segs.into_iter().filter(|t| t.value != 0));
    out.extend(rest);
    if (has_simple && simple != 0) || out.is_empty() {
        out.push(ExprTerm::simple(simple));
    }
    out
}

fn merge_into(list: &mut Vec<ExprTerm>, term: ExprTerm) {
    for t in list.iter_mut() {
        if t.kind == term.kind {
            t.value += term.value;
            return;
        }
    }
    list.push(term);
}

/// A single plain number and nothing else.
pub fn is_simple(terms: &[ExprTerm]) -> bool {
    terms
        .iter()
        .all(|t| matches!(t.kind, TermKind::Simple) || t.value == 0)
}

/// Nothing but an unresolved value.
pub fn is_just_unknown(terms: &[ExprTerm]) -> bool {
    terms.iter().any(|t| matches!(t.kind, TermKind::Unknown))
        && terms
            .iter()
            .all(|t| matches!(t.kind, TermKind::Unknown) || t.value == 0)
}

/// Representable as offset + optional segment + optional WRT: no
/// registers, no unresolved parts, no decorators.
pub fn is_reloc(terms: &[ExprTerm]) -> bool {
    terms.iter().all(|t| {
        matches!(
            t.kind,
            TermKind::Simple | TermKind::Wrt(_) | TermKind::SegBase(_)
        ) || t.value == 0
    })
}

pub fn reloc_value(terms: &[ExprTerm]) -> i64 {
    terms
        .iter()
        .filter(|t| matches!(t.kind, TermKind::Simple))
        .map(|t| t.value)
        .sum()
}

pub fn reloc_seg(terms: &[ExprTerm]) -> Option<SegmentId> {
    terms.iter().find_map(|t| match t.kind {
        TermKind::SegBase(seg) if t.value == 1 => Some(seg),
        _ => None,
    })
}

pub fn reloc_wrt(terms: &[ExprTerm]) -> Option<SegmentId> {
    terms.iter().find_map(|t| match t.kind {
        TermKind::Wrt(seg) if t.value != 0 => Some(seg),
        _ => None,
    })
}

/// An expression of the form `sym - $`: the current segment's base enters
/// with coefficient −1.
pub fn is_self_relative(terms: &[ExprTerm], current: Option<SegmentId>) -> bool {
    let Some(current) = current else {
        return false;
    };
    terms
        .iter()
        .any(|t| matches!(t.kind, TermKind::SegBase(seg) if seg == current) && t.value == -1)
}

/// Exactly one register with coefficient 1 and no other contribution.
pub fn single_register(terms: &[ExprTerm]) -> Option<Register> {
    let mut found = None;
    for t in terms {
        match t.kind {
            TermKind::Register(r) if t.value == 1 && found.is_none() => found = Some(r),
            _ if t.value == 0 => {}
            _ => return None,
        }
    }
    found
}
