//! Mnemonics, instruction prefixes, and the size/type keywords that can
//! precede an operand.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::x86::registers::Register;

macro_rules! opcodes {
    ($(($variant:ident, $name:literal),)*) => {
        /// Instruction mnemonics, including the data-declaration pseudo-ops.
        ///
        /// The parser does not validate that a mnemonic's operands make
        /// sense for the instruction (that is the encoder's job); it only
        /// needs the identity, and the special treatment of the DB family,
        /// INCBIN, EQU, and the jump/call mnemonics.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            const TABLE: &'static [(Opcode, &'static str)] = &[
                $((Opcode::$variant, $name),)*
            ];
        }
    };
}

opcodes! {
    // data declarations
    (Db, "db"),
    (Dw, "dw"),
    (Dd, "dd"),
    (Dq, "dq"),
    (Dt, "dt"),
    (Do, "do"),
    (Dy, "dy"),
    (Dz, "dz"),
    // reservations
    (Resb, "resb"),
    (Resw, "resw"),
    (Resd, "resd"),
    (Resq, "resq"),
    (Rest, "rest"),
    (Reso, "reso"),
    (Resy, "resy"),
    (Resz, "resz"),
    (Incbin, "incbin"),
    (Equ, "equ"),
    // ordinary instructions
    (Mov, "mov"),
    (Lea, "lea"),
    (Add, "add"),
    (Adc, "adc"),
    (Sub, "sub"),
    (Sbb, "sbb"),
    (And, "and"),
    (Or, "or"),
    (Xor, "xor"),
    (Cmp, "cmp"),
    (Test, "test"),
    (Not, "not"),
    (Neg, "neg"),
    (Inc, "inc"),
    (Dec, "dec"),
    (Mul, "mul"),
    (Imul, "imul"),
    (Div, "div"),
    (Idiv, "idiv"),
    (Shl, "shl"),
    (Shr, "shr"),
    (Sar, "sar"),
    (Push, "push"),
    (Pop, "pop"),
    (Jmp, "jmp"),
    (Call, "call"),
    (Ret, "ret"),
    (Nop, "nop"),
    (Int, "int"),
    (Xchg, "xchg"),
    (Xadd, "xadd"),
    (Cmpxchg, "cmpxchg"),
    (Movsb, "movsb"),
    (Stosb, "stosb"),
    (Lodsb, "lodsb"),
    (Cmpsb, "cmpsb"),
    (Scasb, "scasb"),
    (Pshufw, "pshufw"),
    // MPX (compound mib addressing)
    (Bndldx, "bndldx"),
    (Bndstx, "bndstx"),
    // AVX / AVX-512
    (Vaddps, "vaddps"),
    (Vaddpd, "vaddpd"),
    (Vsubps, "vsubps"),
    (Vmulps, "vmulps"),
    (Vdivps, "vdivps"),
    (Vmovaps, "vmovaps"),
    (Vmovups, "vmovups"),
    (Vfmadd231ps, "vfmadd231ps"),
    (Kmovb, "kmovb"),
    (Kmovw, "kmovw"),
    (Kmovd, "kmovd"),
    (Kmovq, "kmovq"),
}

static OPCODE_MAP: Lazy<HashMap<&'static str, Opcode>> =
    Lazy::new(|| Opcode::TABLE.iter().map(|&(op, name)| (name, op)).collect());

impl Opcode {
    pub fn name(self) -> &'static str {
        Opcode::TABLE[self as usize].1
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        OPCODE_MAP.get(name.to_ascii_lowercase().as_str()).copied()
    }

    /// The DB family of data declarations (not the RESx reservations, which
    /// take an ordinary expression operand).
    pub fn is_data_decl(self) -> bool {
        matches!(
            self,
            Opcode::Db
                | Opcode::Dw
                | Opcode::Dd
                | Opcode::Dq
                | Opcode::Dt
                | Opcode::Do
                | Opcode::Dy
                | Opcode::Dz
        )
    }

    /// Element size in bytes for data declarations; INCBIN reads raw bytes.
    pub fn db_bytes(self) -> usize {
        match self {
            Opcode::Db | Opcode::Incbin => 1,
            Opcode::Dw => 2,
            Opcode::Dd => 4,
            Opcode::Dq => 8,
            Opcode::Dt => 10,
            Opcode::Do => 16,
            Opcode::Dy => 32,
            Opcode::Dz => 64,
            _ => 0,
        }
    }
}

/// The slot a prefix occupies in the instruction record. Writing two
/// different prefixes into one slot is a conflict; writing the same prefix
/// twice is redundant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrefixSlot {
    Wait,
    Rep,
    Lock,
    Seg,
    OpSize,
    AddrSize,
    Rex,
    Vex,
}

impl PrefixSlot {
    pub const COUNT: usize = 8;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Instruction prefixes. Segment overrides arrive as register tokens and
/// are folded into `Prefix::Seg` when they land in the prefix position.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Prefix {
    Wait,
    Lock,
    Rep,
    Repe,
    Repne,
    O16,
    O32,
    O64,
    A16,
    A32,
    A64,
    Rex,
    Evex,
    Vex,
    Vex3,
    Seg(Register),
}

impl Prefix {
    pub fn slot(self) -> PrefixSlot {
        match self {
            Prefix::Wait => PrefixSlot::Wait,
            Prefix::Lock => PrefixSlot::Lock,
            Prefix::Rep | Prefix::Repe | Prefix::Repne => PrefixSlot::Rep,
            Prefix::O16 | Prefix::O32 | Prefix::O64 => PrefixSlot::OpSize,
            Prefix::A16 | Prefix::A32 | Prefix::A64 => PrefixSlot::AddrSize,
            Prefix::Rex => PrefixSlot::Rex,
            Prefix::Evex | Prefix::Vex | Prefix::Vex3 => PrefixSlot::Vex,
            Prefix::Seg(_) => PrefixSlot::Seg,
        }
    }

    /// Bare (unbraced) prefix keywords.
    pub fn from_name(name: &str) -> Option<Prefix> {
        Some(match name.to_ascii_lowercase().as_str() {
            "wait" => Prefix::Wait,
            "lock" => Prefix::Lock,
            "rep" => Prefix::Rep,
            "repe" | "repz" => Prefix::Repe,
            "repne" | "repnz" => Prefix::Repne,
            "o16" => Prefix::O16,
            "o32" => Prefix::O32,
            "o64" => Prefix::O64,
            "a16" => Prefix::A16,
            "a32" => Prefix::A32,
            "a64" => Prefix::A64,
            _ => return None,
        })
    }

    /// Prefixes that only exist in braced form, e.g. `{evex}`.
    pub fn from_braced(name: &str) -> Option<Prefix> {
        Some(match name {
            "evex" => Prefix::Evex,
            "vex" => Prefix::Vex,
            "vex3" => Prefix::Vex3,
            "rex" => Prefix::Rex,
            _ => return None,
        })
    }
}

/// Size keywords (`byte`, `word`, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SizeKeyword {
    Byte,
    Word,
    Dword,
    Qword,
    Tword,
    Oword,
    Yword,
    Zword,
}

impl SizeKeyword {
    pub fn from_name(name: &str) -> Option<SizeKeyword> {
        Some(match name.to_ascii_lowercase().as_str() {
            "byte" => SizeKeyword::Byte,
            "word" => SizeKeyword::Word,
            "dword" | "long" => SizeKeyword::Dword,
            "qword" => SizeKeyword::Qword,
            "tword" => SizeKeyword::Tword,
            "oword" => SizeKeyword::Oword,
            "yword" => SizeKeyword::Yword,
            "zword" => SizeKeyword::Zword,
            _ => return None,
        })
    }

    pub fn bits(self) -> u16 {
        match self {
            SizeKeyword::Byte => 8,
            SizeKeyword::Word => 16,
            SizeKeyword::Dword => 32,
            SizeKeyword::Qword => 64,
            SizeKeyword::Tword => 80,
            SizeKeyword::Oword => 128,
            SizeKeyword::Yword => 256,
            SizeKeyword::Zword => 512,
        }
    }
}

/// Non-size operand modifiers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SpecialKeyword {
    To,
    Strict,
    Far,
    Near,
    Short,
    Nosplit,
    Rel,
    Abs,
}

impl SpecialKeyword {
    pub fn from_name(name: &str) -> Option<SpecialKeyword> {
        Some(match name.to_ascii_lowercase().as_str() {
            "to" => SpecialKeyword::To,
            "strict" => SpecialKeyword::Strict,
            "far" => SpecialKeyword::Far,
            "near" => SpecialKeyword::Near,
            "short" => SpecialKeyword::Short,
            "nosplit" => SpecialKeyword::Nosplit,
            "rel" => SpecialKeyword::Rel,
            "abs" => SpecialKeyword::Abs,
            _ => return None,
        })
    }
}
