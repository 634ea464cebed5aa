//! The statement scanner: one preprocessed source line in, one token at a
//! time out.
//!
//! The scanner is deliberately dumb. It classifies words against the
//! keyword tables, carves out numbers, floats, strings and braced tokens,
//! and leaves everything about *meaning* to the parser and evaluator. It
//! supports a single push-back slot and cheap save/restore snapshots for
//! the parser's bounded lookahead.
//!
//! A `;` starts a comment; the rest of the line is ignored. Once the line
//! is exhausted the scanner returns end-of-statement tokens forever.

use std::borrow::Cow;

use bitflags::bitflags;

use crate::strfunc::StrFunc;
use crate::x86::insn::RoundMode;
use crate::x86::opcodes::{Opcode, Prefix, SizeKeyword, SpecialKeyword};
use crate::x86::registers::Register;

bitflags! {
    /// Extra facts about a token that are not part of its kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TokenFlags: u8 {
        /// The token is the DUP keyword terminating a replication count.
        const DUP = 1 << 0;
        /// The token was written in braces, e.g. `{evex}` or `{k1}`.
        const BRACED = 1 << 1;
    }
}

/// Braced decorator payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoratorKind {
    /// `{z}`
    Zero,
    /// `{1toN}`, carrying N.
    BcstTo(u8),
    /// `{rn-sae}` and friends.
    Round(RoundMode),
    /// `{sae}`
    Sae,
}

/// One token. `text` is the lexeme (the inner text for braced tokens) and
/// backs error messages; payloads carry everything the parser needs.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'s> {
    Id(&'s str),
    Insn(Opcode),
    Prefix(Prefix),
    Reg(Register),
    Size(SizeKeyword),
    Special(SpecialKeyword),
    MasmPtr,
    MasmFlat,
    Str(Cow<'s, [u8]>),
    Float(&'s str),
    Num(i64),
    Times,
    Wrt,
    StrFunc(StrFunc),
    Opmask(Register),
    Decorator(DecoratorKind),
    BracedConst(i64),
    Qmark,
    Comma,
    Colon,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    Dollar,
    DollarDollar,
    Unknown,
    Eos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'s> {
    pub kind: TokenKind<'s>,
    pub flags: TokenFlags,
    pub text: &'s str,
}

impl<'s> Token<'s> {
    pub fn eos() -> Token<'s> {
        Token {
            kind: TokenKind::Eos,
            flags: TokenFlags::empty(),
            text: "",
        }
    }

    /// A synthetic numeric token, used when the parser injects a zero
    /// displacement.
    pub fn number(value: i64) -> Token<'s> {
        Token {
            kind: TokenKind::Num(value),
            flags: TokenFlags::empty(),
            text: "",
        }
    }

    pub fn is_eos(&self) -> bool {
        matches!(self.kind, TokenKind::Eos)
    }

    /// Human-readable description for error messages.
    pub fn describe(&self) -> String {
        if self.is_eos() {
            "end of line".to_owned()
        } else if self.text.is_empty() {
            "invalid token".to_owned()
        } else if self.flags.contains(TokenFlags::BRACED) {
            format!("`{{{}}}'", self.text)
        } else {
            format!("`{}'", self.text)
        }
    }
}

/// Opaque scanner snapshot; restoring one rewinds the cursor and the
/// push-back slot.
#[derive(Debug, Clone)]
pub struct ScanState<'s> {
    pos: usize,
    pushed: Option<Token<'s>>,
}

pub struct Scanner<'s> {
    src: &'s str,
    pos: usize,
    pushed: Option<Token<'s>>,
}

impl<'s> Scanner<'s> {
    pub fn new(line: &'s str) -> Scanner<'s> {
        Scanner {
            src: line,
            pos: 0,
            pushed: None,
        }
    }

    pub fn save(&self) -> ScanState<'s> {
        ScanState {
            pos: self.pos,
            pushed: self.pushed.clone(),
        }
    }

    pub fn restore(&mut self, state: ScanState<'s>) {
        self.pos = state.pos;
        self.pushed = state.pushed;
    }

    /// Hand a token back; the next `next()` returns it again. Capacity one.
    pub fn pushback(&mut self, tok: Token<'s>) {
        self.pushed = Some(tok);
    }

    pub fn next(&mut self) -> Token<'s> {
        if let Some(tok) = self.pushed.take() {
            return tok;
        }

        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() && (bytes[self.pos] == b' ' || bytes[self.pos] == b'\t') {
            self.pos += 1;
        }
        if self.pos >= bytes.len() || bytes[self.pos] == b';' {
            self.pos = bytes.len();
            return Token::eos();
        }

        let start = self.pos;
        let c = bytes[self.pos];
        match c {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'.' | b'?' | b'@' => self.scan_word(start),
            b'0'..=b'9' => self.scan_number(start),
            b'\'' | b'"' | b'`' => self.scan_string(start),
            b'{' => self.scan_braced(start),
            b'$' => {
                self.pos += 1;
                if self.pos < bytes.len() && bytes[self.pos] == b'$' {
                    self.pos += 1;
                    self.simple(TokenKind::DollarDollar, start)
                } else if self.pos < bytes.len() && is_word_start(bytes[self.pos]) {
                    // $foo: a label reference even if foo is a keyword
                    self.pos += 1;
                    while self.pos < bytes.len() && is_word_char(bytes[self.pos]) {
                        self.pos += 1;
                    }
                    let text = &self.src[start..self.pos];
                    Token {
                        kind: TokenKind::Id(&text[1..]),
                        flags: TokenFlags::empty(),
                        text,
                    }
                } else {
                    self.simple(TokenKind::Dollar, start)
                }
            }
            b'<' | b'>' => {
                self.pos += 1;
                if self.pos < bytes.len() && bytes[self.pos] == c {
                    self.pos += 1;
                    let kind = if c == b'<' {
                        TokenKind::Shl
                    } else {
                        TokenKind::Shr
                    };
                    self.simple(kind, start)
                } else {
                    self.simple(TokenKind::Unknown, start)
                }
            }
            _ => {
                self.pos += 1;
                let kind = match c {
                    b',' => TokenKind::Comma,
                    b':' => TokenKind::Colon,
                    b'[' => TokenKind::LBracket,
                    b']' => TokenKind::RBracket,
                    b'(' => TokenKind::LParen,
                    b')' => TokenKind::RParen,
                    b'+' => TokenKind::Plus,
                    b'-' => TokenKind::Minus,
                    b'*' => TokenKind::Star,
                    b'/' => TokenKind::Slash,
                    b'%' => TokenKind::Percent,
                    b'&' => TokenKind::Amp,
                    b'|' => TokenKind::Pipe,
                    b'^' => TokenKind::Caret,
                    b'~' => TokenKind::Tilde,
                    _ => TokenKind::Unknown,
                };
                self.simple(kind, start)
            }
        }
    }

    fn simple(&self, kind: TokenKind<'s>, start: usize) -> Token<'s> {
        Token {
            kind,
            flags: TokenFlags::empty(),
            text: &self.src[start..self.pos],
        }
    }

    fn scan_word(&mut self, start: usize) -> Token<'s> {
        let bytes = self.src.as_bytes();
        self.pos += 1;
        while self.pos < bytes.len() && is_word_char(bytes[self.pos]) {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];

        if text == "?" {
            return self.simple(TokenKind::Qmark, start);
        }

        let lower = text.to_ascii_lowercase();
        let mut flags = TokenFlags::empty();
        let kind = if let Some(r) = Register::from_name(&lower) {
            TokenKind::Reg(r)
        } else if let Some(op) = Opcode::from_name(&lower) {
            TokenKind::Insn(op)
        } else if let Some(p) = Prefix::from_name(&lower) {
            TokenKind::Prefix(p)
        } else if let Some(s) = SizeKeyword::from_name(&lower) {
            TokenKind::Size(s)
        } else if let Some(s) = SpecialKeyword::from_name(&lower) {
            TokenKind::Special(s)
        } else if let Some(f) = StrFunc::from_name(&lower) {
            TokenKind::StrFunc(f)
        } else {
            match lower.as_str() {
                "ptr" => TokenKind::MasmPtr,
                "flat" => TokenKind::MasmFlat,
                "times" => TokenKind::Times,
                "wrt" => TokenKind::Wrt,
                "dup" => {
                    flags |= TokenFlags::DUP;
                    TokenKind::Id(text)
                }
                _ => TokenKind::Id(text),
            }
        };
        Token { kind, flags, text }
    }

    fn scan_number(&mut self, start: usize) -> Token<'s> {
        let bytes = self.src.as_bytes();
        let mut has_dot = false;
        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.pos += 1;
            } else if (b == b'+' || b == b'-')
                && has_dot
                && matches!(bytes[self.pos - 1], b'e' | b'E')
            {
                // exponent sign in a float literal
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        if has_dot {
            return self.simple(TokenKind::Float(text), start);
        }
        self.simple(TokenKind::Num(parse_number(text)), start)
    }

    fn scan_string(&mut self, start: usize) -> Token<'s> {
        let bytes = self.src.as_bytes();
        let quote = bytes[self.pos];
        self.pos += 1;
        let body_start = self.pos;

        if quote != b'`' {
            // plain string: no escapes, borrow straight from the line
            while self.pos < bytes.len() && bytes[self.pos] != quote {
                self.pos += 1;
            }
            let body = &self.src.as_bytes()[body_start..self.pos];
            if self.pos < bytes.len() {
                self.pos += 1; // closing quote
            }
            return Token {
                kind: TokenKind::Str(Cow::Borrowed(body)),
                flags: TokenFlags::empty(),
                text: &self.src[start..self.pos],
            };
        }

        // backquoted string: C-style escapes, owned buffer
        let mut out: Vec<u8> = Vec::new();
        while self.pos < bytes.len() && bytes[self.pos] != b'`' {
            if bytes[self.pos] == b'\\' && self.pos + 1 < bytes.len() {
                self.pos += 1;
                self.scan_escape(&mut out);
            } else {
                out.push(bytes[self.pos]);
                self.pos += 1;
            }
        }
        if self.pos < bytes.len() {
            self.pos += 1;
        }
        Token {
            kind: TokenKind::Str(Cow::Owned(out)),
            flags: TokenFlags::empty(),
            text: &self.src[start..self.pos],
        }
    }

    fn scan_escape(&mut self, out: &mut Vec<u8>) {
        let bytes = self.src.as_bytes();
        let c = bytes[self.pos];
        self.pos += 1;
        match c {
            b'\'' | b'"' | b'`' | b'\\' | b'?' => out.push(c),
            b'a' => out.push(7),
            b'b' => out.push(8),
            b't' => out.push(9),
            b'n' => out.push(10),
            b'v' => out.push(11),
            b'f' => out.push(12),
            b'r' => out.push(13),
            b'e' => out.push(27),
            b'0'..=b'7' => {
                let mut v = (c - b'0') as u32;
                let mut n = 1;
                while n < 3 && self.pos < bytes.len() && (b'0'..=b'7').contains(&bytes[self.pos]) {
                    v = v * 8 + (bytes[self.pos] - b'0') as u32;
                    self.pos += 1;
                    n += 1;
                }
                out.push(v as u8);
            }
            b'x' => {
                let mut v = 0u32;
                let mut n = 0;
                while n < 2 && self.pos < bytes.len() && bytes[self.pos].is_ascii_hexdigit() {
                    v = v * 16 + hex_val(bytes[self.pos]);
                    self.pos += 1;
                    n += 1;
                }
                out.push(v as u8);
            }
            b'u' | b'U' => {
                let want = if c == b'u' { 4 } else { 8 };
                let mut v = 0u32;
                let mut n = 0;
                while n < want && self.pos < bytes.len() && bytes[self.pos].is_ascii_hexdigit() {
                    v = v * 16 + hex_val(bytes[self.pos]);
                    self.pos += 1;
                    n += 1;
                }
                match char::from_u32(v) {
                    Some(ch) => {
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    }
                    None => out.push(b'?'),
                }
            }
            other => out.push(other),
        }
    }

    fn scan_braced(&mut self, start: usize) -> Token<'s> {
        let bytes = self.src.as_bytes();
        self.pos += 1; // '{'
        let body_start = self.pos;
        while self.pos < bytes.len() && bytes[self.pos] != b'}' {
            self.pos += 1;
        }
        let body = self.src[body_start..self.pos].trim();
        if self.pos < bytes.len() {
            self.pos += 1; // '}'
        }

        let flags = TokenFlags::BRACED;
        let lower = body.to_ascii_lowercase();
        let kind = match lower.as_str() {
            "z" => TokenKind::Decorator(DecoratorKind::Zero),
            "1to2" => TokenKind::Decorator(DecoratorKind::BcstTo(2)),
            "1to4" => TokenKind::Decorator(DecoratorKind::BcstTo(4)),
            "1to8" => TokenKind::Decorator(DecoratorKind::BcstTo(8)),
            "1to16" => TokenKind::Decorator(DecoratorKind::BcstTo(16)),
            "1to32" => TokenKind::Decorator(DecoratorKind::BcstTo(32)),
            "rn-sae" => TokenKind::Decorator(DecoratorKind::Round(RoundMode::Nearest)),
            "rd-sae" => TokenKind::Decorator(DecoratorKind::Round(RoundMode::Down)),
            "ru-sae" => TokenKind::Decorator(DecoratorKind::Round(RoundMode::Up)),
            "rz-sae" => TokenKind::Decorator(DecoratorKind::Round(RoundMode::Zero)),
            "sae" => TokenKind::Decorator(DecoratorKind::Sae),
            _ => {
                if let Some(r) = Register::from_name(&lower) {
                    if matches!(r.class(), crate::x86::registers::RegClass::Opmask) {
                        TokenKind::Opmask(r)
                    } else {
                        TokenKind::Id(body)
                    }
                } else if let Some(p) = Prefix::from_braced(&lower) {
                    TokenKind::Prefix(p)
                } else if body.starts_with(|ch: char| ch.is_ascii_digit()) {
                    TokenKind::BracedConst(parse_number(body))
                } else {
                    TokenKind::Id(body)
                }
            }
        };
        Token {
            kind,
            flags,
            text: body,
        }
    }
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || matches!(b, b'_' | b'.' | b'?' | b'@')
}

fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'?' | b'@' | b'$' | b'#' | b'~')
}

fn hex_val(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => (b - b'0') as u32,
        b'a'..=b'f' => (b - b'a' + 10) as u32,
        _ => (b - b'A' + 10) as u32,
    }
}

/// Parse an integer literal. Accepts `0x`/`0h`/`0b`/`0y`/`0o`/`0q`/`0d`
/// prefixes, `h`/`b`/`y`/`q`/`o`/`d` suffixes, and `_` separators.
/// Malformed literals come back as 0; the scanner has no error channel and
/// the parser's shape checks catch the fallout.
fn parse_number(text: &str) -> i64 {
    let clean: String = text.chars().filter(|&c| c != '_').collect();
    let lower = clean.to_ascii_lowercase();

    let (digits, radix): (&str, u32) = if let Some(rest) = lower
        .strip_prefix("0x")
        .or_else(|| lower.strip_prefix("0h"))
    {
        (rest, 16)
    } else if let Some(rest) = lower
        .strip_prefix("0b")
        .or_else(|| lower.strip_prefix("0y"))
    {
        (rest, 2)
    } else if let Some(rest) = lower
        .strip_prefix("0o")
        .or_else(|| lower.strip_prefix("0q"))
    {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0d") {
        (rest, 10)
    } else if let Some(rest) = lower.strip_suffix('h') {
        (rest, 16)
    } else if let Some(rest) = lower.strip_suffix('q').or_else(|| lower.strip_suffix('o')) {
        (rest, 8)
    } else if lower.chars().all(|c| c.is_ascii_digit()) {
        (lower.as_str(), 10)
    } else if let Some(rest) = lower.strip_suffix('b').or_else(|| lower.strip_suffix('y')) {
        (rest, 2)
    } else if let Some(rest) = lower.strip_suffix('d').or_else(|| lower.strip_suffix('t')) {
        (rest, 10)
    } else {
        (lower.as_str(), 10)
    };

    u64::from_str_radix(digits, radix).map(|v| v as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(line: &str) -> Vec<TokenKind<'_>> {
        let mut scan = Scanner::new(line);
        let mut out = Vec::new();
        loop {
            let tok = scan.next();
            if tok.is_eos() {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn basic_line() {
        assert_eq!(
            kinds("mov eax, 1"),
            vec![
                TokenKind::Insn(Opcode::Mov),
                TokenKind::Reg(Register::Eax),
                TokenKind::Comma,
                TokenKind::Num(1),
            ]
        );
    }

    #[test]
    fn keywords_case_insensitive_labels_not() {
        assert_eq!(
            kinds("MOV Foo"),
            vec![TokenKind::Insn(Opcode::Mov), TokenKind::Id("Foo")]
        );
    }

    #[test]
    fn memory_punctuation() {
        assert_eq!(
            kinds("[ds:ebx+ecx*4+8]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Reg(Register::Ds),
                TokenKind::Colon,
                TokenKind::Reg(Register::Ebx),
                TokenKind::Plus,
                TokenKind::Reg(Register::Ecx),
                TokenKind::Star,
                TokenKind::Num(4),
                TokenKind::Plus,
                TokenKind::Num(8),
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn number_formats() {
        assert_eq!(kinds("0x10"), vec![TokenKind::Num(16)]);
        assert_eq!(kinds("10h"), vec![TokenKind::Num(16)]);
        assert_eq!(kinds("0b101"), vec![TokenKind::Num(5)]);
        assert_eq!(kinds("101b"), vec![TokenKind::Num(5)]);
        assert_eq!(kinds("0o17"), vec![TokenKind::Num(15)]);
        assert_eq!(kinds("1_000"), vec![TokenKind::Num(1000)]);
        assert_eq!(kinds("0xdead_beef"), vec![TokenKind::Num(0xdead_beef)]);
    }

    #[test]
    fn floats_need_a_dot() {
        assert_eq!(kinds("1.5"), vec![TokenKind::Float("1.5")]);
        assert_eq!(kinds("3.14e2"), vec![TokenKind::Float("3.14e2")]);
        assert_eq!(kinds("1.5e-3"), vec![TokenKind::Float("1.5e-3")]);
        assert_eq!(kinds("15"), vec![TokenKind::Num(15)]);
    }

    #[test]
    fn strings() {
        assert_eq!(
            kinds("'ab'"),
            vec![TokenKind::Str(Cow::Borrowed(b"ab" as &[u8]))]
        );
        assert_eq!(
            kinds("\"a'b\""),
            vec![TokenKind::Str(Cow::Borrowed(b"a'b" as &[u8]))]
        );
        assert_eq!(
            kinds(r"`a\n\x41`"),
            vec![TokenKind::Str(Cow::Owned(vec![b'a', b'\n', b'A']))]
        );
    }

    #[test]
    fn braced_tokens() {
        assert_eq!(
            kinds("{k1}{z}"),
            vec![
                TokenKind::Opmask(Register::K1),
                TokenKind::Decorator(DecoratorKind::Zero),
            ]
        );
        assert_eq!(
            kinds("{1to16}"),
            vec![TokenKind::Decorator(DecoratorKind::BcstTo(16))]
        );
        assert_eq!(
            kinds("{rz-sae}"),
            vec![TokenKind::Decorator(DecoratorKind::Round(RoundMode::Zero))]
        );
        assert_eq!(kinds("{evex}"), vec![TokenKind::Prefix(Prefix::Evex)]);
        assert_eq!(kinds("{3}"), vec![TokenKind::BracedConst(3)]);

        let mut scan = Scanner::new("{k1}");
        assert!(scan.next().flags.contains(TokenFlags::BRACED));
    }

    #[test]
    fn dup_flag() {
        let mut scan = Scanner::new("dup");
        let tok = scan.next();
        assert!(tok.flags.contains(TokenFlags::DUP));
        assert_eq!(tok.kind, TokenKind::Id("dup"));
    }

    #[test]
    fn comments_end_the_statement() {
        assert_eq!(kinds("nop ; trailing"), vec![TokenKind::Insn(Opcode::Nop)]);
    }

    #[test]
    fn eos_is_sticky() {
        let mut scan = Scanner::new("nop");
        scan.next();
        assert!(scan.next().is_eos());
        assert!(scan.next().is_eos());
    }

    #[test]
    fn pushback_and_snapshot() {
        let mut scan = Scanner::new("mov eax");
        let save = scan.save();
        let tok = scan.next();
        assert_eq!(tok.kind, TokenKind::Insn(Opcode::Mov));
        scan.pushback(tok);
        assert_eq!(scan.next().kind, TokenKind::Insn(Opcode::Mov));
        assert_eq!(scan.next().kind, TokenKind::Reg(Register::Eax));
        scan.restore(save);
        assert_eq!(scan.next().kind, TokenKind::Insn(Opcode::Mov));
    }

    #[test]
    fn question_mark_and_words() {
        assert_eq!(kinds("?"), vec![TokenKind::Qmark]);
        assert_eq!(kinds("?foo"), vec![TokenKind::Id("?foo")]);
        assert_eq!(kinds(".label"), vec![TokenKind::Id(".label")]);
    }

    #[test]
    fn dollar_tokens() {
        assert_eq!(kinds("$"), vec![TokenKind::Dollar]);
        assert_eq!(kinds("$$"), vec![TokenKind::DollarDollar]);
        // $-prefixed words are always plain identifiers
        assert_eq!(kinds("$mov"), vec![TokenKind::Id("mov")]);
    }

    #[test]
    fn shifts() {
        assert_eq!(
            kinds("1 << 2 >> 3"),
            vec![
                TokenKind::Num(1),
                TokenKind::Shl,
                TokenKind::Num(2),
                TokenKind::Shr,
                TokenKind::Num(3),
            ]
        );
    }
}
