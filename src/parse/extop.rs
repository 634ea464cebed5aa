//! Data-declaration operand lists: `db`, `dw`, ... and `incbin`.
//!
//! Each comma-separated item becomes one [`Extop`]. Items can be reserved
//! space (`?`), strings (plain or transformed), float literals, DUP
//! replications, `%(...)` groups, or plain relocatable expressions.

use std::borrow::Cow;

use crate::diag::DiagKind;
use crate::eval::{self, ExprTerm, TermKind};
use crate::floats::{float_const, float_deffmt};
use crate::scan::{Scanner, Token, TokenFlags, TokenKind};
use crate::strfunc::string_transform;
use crate::symtab::SegmentId;
use crate::x86::insn::{Extop, ExtopKind};

use super::LineParser;

impl LineParser<'_> {
    /// Parse a data-declaration operand list starting at the current token.
    /// Stops at end of statement, or at an unconsumed `)` when parsing the
    /// inside of a group. Returns the built list and the number of items
    /// parsed (elided items still count); `None` after an unrecoverable
    /// diagnostic.
    pub(crate) fn parse_eops<'s>(
        &mut self,
        scan: &mut Scanner<'s>,
        tok: &mut Token<'s>,
        critical: bool,
        elem: usize,
    ) -> Option<(Vec<Extop<'s>>, usize)> {
        let mut list: Vec<Extop<'s>> = Vec::new();
        let mut count = 0usize;
        let mut pending: Option<Extop<'s>> = None;
        let mut do_subexpr = false;

        loop {
            if tok.is_eos() || matches!(tok.kind, TokenKind::RParen) {
                break;
            }

            let mut eop = match pending.take() {
                Some(eop) => eop,
                None => {
                    do_subexpr = false;
                    Extop {
                        kind: ExtopKind::Nothing,
                        elem,
                        dup: 1,
                    }
                }
            };
            let mut sign = 1;
            // is a right paren the end of the list this time around?
            let mut endparen = true;
            let skip;

            // a string is an operand only if the expression context ends
            // right after it; otherwise it is a number in an expression
            let str_operand =
                matches!(tok.kind, TokenKind::Str(_)) && self.end_expression_next(scan);

            match &tok.kind {
                TokenKind::Qmark => {
                    eop.kind = ExtopKind::Reserve;
                    skip = true;
                }
                TokenKind::LParen if do_subexpr => {
                    *tok = scan.next(); // skip the paren
                    let (items, _) = self.parse_eops(scan, tok, critical, eop.elem)?;
                    if items.is_empty() {
                        eop.kind = ExtopKind::Nothing;
                    } else if items.len() == 1 {
                        // single element: flatten, multiplying replication
                        let mut sub = items.into_iter().next()?;
                        if sub.elem == 0 {
                            sub.elem = eop.elem;
                        }
                        sub.dup *= eop.dup;
                        eop = sub;
                    } else {
                        eop.kind = ExtopKind::Group { items };
                    }
                    if !matches!(tok.kind, TokenKind::RParen) {
                        self.diag
                            .nonfatal(DiagKind::ExpectedCloseParen(tok.describe()));
                        return None;
                    }
                    endparen = false; // this paren is not the end of the list
                    skip = true;
                }
                TokenKind::Percent => {
                    // %(expression_list)
                    do_subexpr = true;
                    pending = Some(eop);
                    *tok = scan.next();
                    continue;
                }
                TokenKind::Size(kw) => {
                    // element size override
                    eop.elem = (kw.bits() / 8) as usize;
                    do_subexpr = true;
                    pending = Some(eop);
                    *tok = scan.next();
                    continue;
                }
                TokenKind::Str(data) if str_operand => {
                    eop.kind = ExtopKind::String { data: data.clone() };
                    skip = true;
                }
                TokenKind::StrFunc(func) => {
                    let func = *func;
                    let funcname = func.name();
                    *tok = scan.next();
                    let mut parens = false;
                    if matches!(tok.kind, TokenKind::LParen) {
                        parens = true;
                        endparen = false;
                        *tok = scan.next();
                    }
                    if let TokenKind::Str(data) = &tok.kind {
                        match string_transform(data, func) {
                            Some(bytes) => {
                                eop.kind = ExtopKind::String {
                                    data: Cow::Owned(bytes),
                                }
                            }
                            None => {
                                self.diag
                                    .nonfatal(DiagKind::StrFuncBadInput(funcname.to_owned()));
                                eop.kind = ExtopKind::Nothing;
                            }
                        }
                    } else {
                        self.diag.nonfatal(DiagKind::StrFuncNeedsString(
                            funcname.to_owned(),
                            tok.describe(),
                        ));
                        eop.kind = ExtopKind::Nothing;
                    }
                    if parens && !tok.is_eos() && !matches!(tok.kind, TokenKind::RParen) {
                        *tok = scan.next();
                        if !matches!(tok.kind, TokenKind::RParen) {
                            self.diag
                                .nonfatal(DiagKind::UnterminatedStrFunc(funcname.to_owned()));
                        }
                    }
                    skip = !matches!(tok.kind, TokenKind::Comma);
                }
                TokenKind::Plus | TokenKind::Minus => {
                    // a sign is only a float sign if a float follows;
                    // otherwise rewind and treat it as an expression
                    let negative = matches!(tok.kind, TokenKind::Minus);
                    let save = scan.save();
                    let lookahead = scan.next();
                    let float_text = match lookahead.kind {
                        TokenKind::Float(text) => Some(text),
                        _ => None,
                    };
                    if let Some(text) = float_text {
                        sign = if negative { -1 } else { 1 };
                        self.float_eop(&mut eop, text, sign);
                        *tok = lookahead;
                        skip = true;
                    } else {
                        scan.restore(save);
                        skip = self.expression_eop(
                            scan,
                            tok,
                            critical,
                            &mut eop,
                            &mut do_subexpr,
                            &mut pending,
                        )?;
                        if pending.is_some() {
                            continue;
                        }
                    }
                }
                TokenKind::Float(text) => {
                    self.float_eop(&mut eop, text, sign);
                    skip = true;
                }
                _ => {
                    skip = self.expression_eop(scan, tok, critical, &mut eop, &mut do_subexpr, &mut pending)?;
                    if pending.is_some() {
                        continue;
                    }
                }
            }

            // commit: elide empty items, coalesce adjacent reservations
            if eop.dup == 0 || matches!(eop.kind, ExtopKind::Nothing) {
                // dropped
            } else if matches!(eop.kind, ExtopKind::Reserve)
                && matches!(list.last(), Some(prev) if matches!(prev.kind, ExtopKind::Reserve) && prev.elem == eop.elem)
            {
                if let Some(prev) = list.last_mut() {
                    prev.dup += eop.dup;
                }
            } else {
                list.push(eop);
            }
            count += 1;

            if skip {
                *tok = scan.next();
            }

            if tok.is_eos() || (endparen && matches!(tok.kind, TokenKind::RParen)) {
                break;
            }
            if !matches!(tok.kind, TokenKind::Comma) {
                self.diag.nonfatal(DiagKind::CommaExpected(tok.describe()));
                return None;
            }
            *tok = scan.next();
            if tok.is_eos() {
                // a trailing comma promises an operand that never comes
                self.diag.nonfatal(DiagKind::CommaExpected(tok.describe()));
                return None;
            }
        }

        Some((list, count))
    }

    /// Encode a float literal into `eop`, or turn it into nothing with a
    /// diagnostic when the element size has no float format.
    fn float_eop(&mut self, eop: &mut Extop<'_>, text: &str, sign: i32) {
        match float_deffmt(eop.elem) {
            None => {
                self.diag.nonfatal(DiagKind::NoFloatFormat(eop.elem * 8));
                eop.kind = ExtopKind::Nothing;
            }
            Some(fmt) => match float_const(text, sign, fmt) {
                Some(bytes) => eop.kind = ExtopKind::Float { bytes },
                None => eop.kind = ExtopKind::Nothing,
            },
        }
    }

    /// Evaluate an expression item. A DUP suffix turns the value into a
    /// replication count and leaves the item pending; otherwise the value
    /// reduces into a number element. Returns the skip flag.
    fn expression_eop<'s>(
        &mut self,
        scan: &mut Scanner<'s>,
        tok: &mut Token<'s>,
        critical: bool,
        eop: &mut Extop<'s>,
        do_subexpr: &mut bool,
        pending: &mut Option<Extop<'s>>,
    ) -> Option<bool> {
        let value = eval::evaluate(
            scan,
            tok,
            None,
            critical,
            None,
            self.ctx,
            &*self.symtab,
            &mut *self.diag,
        )?;

        if tok.flags.contains(TokenFlags::DUP) {
            if !eval::is_simple(&value) {
                self.diag.nonfatal(DiagKind::DupNotConstant);
                return None;
            }
            let n = eval::scalar(&value).unwrap_or(0);
            if n < 0 {
                self.diag.nonfatal(DiagKind::DupNegative);
                return None;
            }
            eop.dup *= n as usize;
            *do_subexpr = true;
            *pending = Some(std::mem::replace(
                eop,
                Extop {
                    kind: ExtopKind::Nothing,
                    elem: 0,
                    dup: 1,
                },
            ));
            *tok = scan.next();
            return Some(false);
        }

        match value_to_extop(&value, self.ctx.location.segment) {
            Some(kind) => eop.kind = kind,
            None => self.diag.nonfatal(DiagKind::NotRelocatable),
        }
        Some(false)
    }

    /// Peek: does the next token end the expression context? Distinguishes
    /// a string operand from a string inside an expression.
    pub(crate) fn end_expression_next(&self, scan: &mut Scanner<'_>) -> bool {
        let save = scan.save();
        let tok = scan.next();
        scan.restore(save);
        matches!(
            tok.kind,
            TokenKind::Comma | TokenKind::RParen | TokenKind::Eos
        )
    }
}

/// Fold a relocatable expression into a number element: offset plus
/// optional segment, WRT, and the self-relative marker. Registers are not
/// allowed in data; unresolved values are legal and stay zero this pass.
fn value_to_extop(terms: &[ExprTerm], myseg: Option<SegmentId>) -> Option<ExtopKind<'static>> {
    let mut offset: i64 = 0;
    let mut segment: Option<SegmentId> = None;
    let mut wrt: Option<SegmentId> = None;
    let mut relative = false;

    for t in terms {
        if t.value == 0 {
            continue;
        }
        match t.kind {
            TermKind::Register(_) | TermKind::RdSae(_) => return None,
            TermKind::Unknown => break,
            TermKind::Simple => offset += t.value,
            TermKind::Wrt(seg) if wrt.is_none() && !relative => wrt = Some(seg),
            TermKind::SegBase(seg)
                if !relative && Some(seg) == myseg && t.value == -1 =>
            {
                relative = true;
            }
            TermKind::SegBase(seg) if segment.is_none() && t.value == 1 => {
                segment = Some(seg);
            }
            _ => return None,
        }
    }

    Some(ExtopKind::Number {
        offset,
        segment,
        wrt,
        relative,
    })
}
