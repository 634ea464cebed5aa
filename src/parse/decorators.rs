//! Braced decorators after an operand: `{k1}`, `{z}`, `{1toN}`.

use crate::diag::DiagKind;
use crate::scan::{DecoratorKind, Scanner, Token, TokenKind};
use crate::x86::insn::DecoFlags;

use super::LineParser;

impl LineParser<'_> {
    /// Parse a run of decorators into `deco`, starting at the current
    /// token and stopping at a comma or end of statement. Opmask and
    /// zeroing may appear in either order. Returns true when the caller
    /// should enter error recovery.
    pub(crate) fn parse_decorators<'s>(
        &mut self,
        scan: &mut Scanner<'s>,
        tok: &mut Token<'s>,
        deco: &mut DecoFlags,
    ) -> bool {
        loop {
            match &tok.kind {
                TokenKind::Opmask(reg) => {
                    let existing = deco.opmask_index();
                    if existing != 0 {
                        self.diag.nonfatal(DiagKind::OpmaskAlreadySet(existing));
                        *deco &= !DecoFlags::OPMASK_FIELD;
                    }
                    *deco |= DecoFlags::opmask(reg.number());
                }
                TokenKind::Decorator(DecoratorKind::Zero) => {
                    *deco |= DecoFlags::Z;
                }
                TokenKind::Decorator(DecoratorKind::BcstTo(lanes)) => {
                    *deco |= DecoFlags::BRDCAST | DecoFlags::brnum(lanes.trailing_zeros() as u8);
                }
                TokenKind::Decorator(_) => {
                    // rounding decorators are operands, not suffixes
                    self.diag
                        .nonfatal(DiagKind::UnexpectedDecorator(tok.text.to_owned()));
                }
                TokenKind::Comma | TokenKind::Eos => return false,
                _ => {
                    self.diag.nonfatal(DiagKind::OnlyDecoratorsExpected);
                    return true;
                }
            }
            *tok = scan.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::diag::Diagnostics;
    use crate::symtab::SymbolTable;

    fn run(src: &str) -> (DecoFlags, bool, Diagnostics) {
        let ctx = Context::default();
        let mut symtab = SymbolTable::new();
        let mut diag = Diagnostics::new();
        let mut deco = DecoFlags::default();
        let recover = {
            let mut p = LineParser::new(&ctx, &mut symtab, &mut diag);
            let mut scan = Scanner::new(src);
            let mut tok = scan.next();
            p.parse_decorators(&mut scan, &mut tok, &mut deco)
        };
        (deco, recover, diag)
    }

    #[test]
    fn opmask_and_zero_in_any_order() {
        let (deco, recover, diag) = run("{k2}{z}");
        assert!(!recover);
        assert!(diag.is_empty());
        assert_eq!(deco.opmask_index(), 2);
        assert!(deco.contains(DecoFlags::Z));

        let (deco, _, _) = run("{z}{k3}");
        assert_eq!(deco.opmask_index(), 3);
        assert!(deco.contains(DecoFlags::Z));
    }

    #[test]
    fn broadcast_lane_counts() {
        let (deco, _, _) = run("{1to16}");
        assert!(deco.contains(DecoFlags::BRDCAST));
        assert_eq!(deco.brnum_value(), 4);

        let (deco, _, _) = run("{1to2}");
        assert_eq!(deco.brnum_value(), 1);
    }

    #[test]
    fn duplicate_opmask_diagnoses() {
        let (deco, recover, diag) = run("{k1}{k2}");
        assert!(!recover);
        assert!(diag.contains(&DiagKind::OpmaskAlreadySet(1)));
        // the later opmask wins
        assert_eq!(deco.opmask_index(), 2);
    }

    #[test]
    fn rounding_decorator_is_rejected_here() {
        let (_, _, diag) = run("{rn-sae}");
        assert!(diag.contains(&DiagKind::UnexpectedDecorator("rn-sae".into())));
    }

    #[test]
    fn non_decorator_triggers_recovery() {
        let (_, recover, diag) = run("{k1} eax");
        assert!(recover);
        assert!(diag.contains(&DiagKind::OnlyDecoratorsExpected));
    }
}
