//! The parsed instruction record and its operand/flag model.
//!
//! One source line parses into one [`Instruction`]: an optional label, an
//! opcode, a replication count, up to [`MAX_OPERANDS`] operand slots, the
//! collected prefixes, and (for data declarations only) a list of extended
//! operands. Operands are plain data and cheap to copy; the instruction
//! owns its label string and its extended-operand tree.

use std::borrow::Cow;

use bitflags::bitflags;

use crate::symtab::SegmentId;
use crate::x86::opcodes::{Opcode, Prefix, PrefixSlot};
use crate::x86::registers::Register;

/// Operand slots per instruction.
pub const MAX_OPERANDS: usize = 4;

bitflags! {
    /// What an operand *is*: a size, a kind (register/memory/immediate),
    /// modifier bits, immediate fit refinements, and the vector-indexed
    /// memory classes. The register-set size occupies a dedicated bit
    /// field (see [`OperandType::with_regset`]).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OperandType: u64 {
        const BITS8   = 1 << 0;
        const BITS16  = 1 << 1;
        const BITS32  = 1 << 2;
        const BITS64  = 1 << 3;
        const BITS80  = 1 << 4;
        const BITS128 = 1 << 5;
        const BITS256 = 1 << 6;
        const BITS512 = 1 << 7;

        const REGISTER  = 1 << 8;
        const IMMEDIATE = 1 << 9;
        const MEMORY    = 1 << 10;
        const IP_REL    = 1 << 11;
        const MEM_OFFS  = 1 << 12;

        const FAR    = 1 << 13;
        const NEAR   = 1 << 14;
        const SHORT  = 1 << 15;
        const TO     = 1 << 16;
        const STRICT = 1 << 17;
        const COLON  = 1 << 18;

        const UNITY      = 1 << 19;
        const SBYTEWORD  = 1 << 20;
        const SBYTEDWORD = 1 << 21;
        const SDWORD     = 1 << 22;
        const UDWORD     = 1 << 23;

        const XMEM = 1 << 24;
        const YMEM = 1 << 25;
        const ZMEM = 1 << 26;

        /// Register-set size field, storing (size >> 1).
        const REGSET_FIELD = 0xF << 27;

        const SIZE_MASK = Self::BITS8.bits() | Self::BITS16.bits() | Self::BITS32.bits()
            | Self::BITS64.bits() | Self::BITS80.bits() | Self::BITS128.bits()
            | Self::BITS256.bits() | Self::BITS512.bits();
    }
}

impl OperandType {
    /// Width of the register-set size value itself; a set size must be a
    /// power of two below `1 << REGSET_BITS`.
    pub const REGSET_BITS: u32 = 5;

    const REGSET_SHIFT: u32 = 27;

    pub fn with_regset(self, size: u64) -> OperandType {
        self | OperandType::from_bits_retain((size >> 1) << Self::REGSET_SHIFT)
    }

    pub fn regset_size(self) -> u64 {
        ((self.bits() & Self::REGSET_FIELD.bits()) >> Self::REGSET_SHIFT) << 1
    }

    /// Just the size bits.
    pub fn size(self) -> OperandType {
        self & OperandType::SIZE_MASK
    }

    pub fn size_from_bits(bits: u16) -> OperandType {
        match bits {
            8 => OperandType::BITS8,
            16 => OperandType::BITS16,
            32 => OperandType::BITS32,
            64 => OperandType::BITS64,
            80 => OperandType::BITS80,
            128 => OperandType::BITS128,
            256 => OperandType::BITS256,
            512 => OperandType::BITS512,
            _ => OperandType::empty(),
        }
    }
}

bitflags! {
    /// Evaluator-derived properties of an operand's expression.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OpFlags: u8 {
        const UNKNOWN  = 1 << 0;
        const FORWARD  = 1 << 1;
        const RELATIVE = 1 << 2;
    }
}

bitflags! {
    /// Effective-address modifiers collected inside a memory reference.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EaFlags: u8 {
        const ABS      = 1 << 0;
        const REL      = 1 << 1;
        const FSGS     = 1 << 2;
        const TIMESTWO = 1 << 3;
        const BYTEOFFS = 1 << 4;
        const WORDOFFS = 1 << 5;
    }
}

bitflags! {
    /// Braced decorator state: opmask index in the low bits, zeroing,
    /// broadcast (with log2 of the lane count in its own field), and the
    /// SAE/embedded-rounding markers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DecoFlags: u16 {
        const OPMASK_FIELD = 0x7;
        const Z            = 1 << 3;
        const BRDCAST      = 1 << 4;
        const BRNUM_FIELD  = 0x7 << 5;
        const SAE          = 1 << 8;
        const ER           = 1 << 9;

        const BRDCAST_ER_SAE = Self::BRDCAST.bits() | Self::ER.bits() | Self::SAE.bits();
    }
}

impl DecoFlags {
    pub fn opmask(k: u8) -> DecoFlags {
        DecoFlags::from_bits_retain((k & 0x7) as u16)
    }

    pub fn opmask_index(self) -> u8 {
        (self.bits() & DecoFlags::OPMASK_FIELD.bits()) as u8
    }

    /// Broadcast number: log2 of the lane count, so `{1to16}` stores 4.
    pub fn brnum(log2n: u8) -> DecoFlags {
        DecoFlags::from_bits_retain(((log2n & 0x7) as u16) << 5)
    }

    pub fn brnum_value(self) -> u8 {
        ((self.bits() & DecoFlags::BRNUM_FIELD.bits()) >> 5) as u8
    }
}

/// Embedded-rounding / SAE mode from a `{rn-sae}`-style decorator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoundMode {
    Nearest,
    Down,
    Up,
    Zero,
    Sae,
}

/// Preferred-base hint for the encoder, produced by the evaluator or the
/// compound (mib) merge.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum EaHint {
    #[default]
    None,
    MakeBase,
    NotBase,
}

/// One operand slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Operand {
    pub ty: OperandType,
    pub opflags: OpFlags,
    pub eaflags: EaFlags,
    pub decoflags: DecoFlags,
    /// Explicit displacement size: 0, 8, 16, 32 or 64.
    pub disp_size: u8,
    pub basereg: Option<Register>,
    pub indexreg: Option<Register>,
    pub scale: i64,
    pub offset: i64,
    pub segment: Option<SegmentId>,
    pub wrt: Option<SegmentId>,
    pub hintbase: Option<Register>,
    pub hinttype: EaHint,
    /// Secondary value from a braced constant operand.
    pub iflag: i64,
}

impl Operand {
    pub fn is_register(&self) -> bool {
        self.ty.contains(OperandType::REGISTER)
    }

    pub fn is_memory(&self) -> bool {
        self.ty.contains(OperandType::MEMORY)
    }

    pub fn is_immediate(&self) -> bool {
        self.ty.contains(OperandType::IMMEDIATE)
    }
}

/// An element of a data-declaration operand list.
#[derive(Debug, Clone, PartialEq)]
pub struct Extop<'s> {
    pub kind: ExtopKind<'s>,
    /// Element size in bytes.
    pub elem: usize,
    /// Replication count; zero elides the element.
    pub dup: usize,
}

/// What a data element contains. String payloads borrow from the source
/// line when they can (plain quoted literals) and own their buffer when
/// they cannot (escape-processed or transformed strings).
#[derive(Debug, Clone, PartialEq)]
pub enum ExtopKind<'s> {
    Nothing,
    Number {
        offset: i64,
        segment: Option<SegmentId>,
        wrt: Option<SegmentId>,
        relative: bool,
    },
    String {
        data: Cow<'s, [u8]>,
    },
    Reserve,
    Float {
        bytes: Vec<u8>,
    },
    Group {
        items: Vec<Extop<'s>>,
    },
}

/// A fully parsed source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction<'s> {
    pub label: Option<String>,
    /// `None` means no instruction could be built from the line.
    pub opcode: Option<Opcode>,
    /// TIMES replication count.
    pub times: i64,
    /// Live operand count; slots beyond it are zeroed.
    pub operands: usize,
    pub oprs: [Operand; MAX_OPERANDS],
    pub prefixes: [Option<Prefix>; PrefixSlot::COUNT],
    /// Extended operands, only for data declarations and INCBIN.
    pub eops: Vec<Extop<'s>>,
    /// Any operand involved a forward reference.
    pub forw_ref: bool,
    /// Index of the operand carrying broadcast/ER/SAE decoration.
    pub evex_brerop: Option<usize>,
    pub evex_rm: Option<RoundMode>,
}

impl Default for Instruction<'_> {
    fn default() -> Self {
        Instruction {
            label: None,
            opcode: None,
            times: 1,
            operands: 0,
            oprs: [Operand::default(); MAX_OPERANDS],
            prefixes: [None; PrefixSlot::COUNT],
            eops: Vec::new(),
            forw_ref: false,
            evex_brerop: None,
            evex_rm: None,
        }
    }
}

impl Instruction<'_> {
    pub fn prefix(&self, slot: PrefixSlot) -> Option<Prefix> {
        self.prefixes[slot.index()]
    }

    /// The segment-override register, if one was collected.
    pub fn segment_override(&self) -> Option<Register> {
        match self.prefix(PrefixSlot::Seg) {
            Some(Prefix::Seg(r)) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regset_field_round_trip() {
        let ty = OperandType::REGISTER.with_regset(8);
        assert_eq!(ty.regset_size(), 8);
        assert!(ty.contains(OperandType::REGISTER));
        assert_eq!(OperandType::REGISTER.regset_size(), 0);
    }

    #[test]
    fn decoflags_fields() {
        let d = DecoFlags::opmask(5) | DecoFlags::Z | DecoFlags::BRDCAST | DecoFlags::brnum(4);
        assert_eq!(d.opmask_index(), 5);
        assert_eq!(d.brnum_value(), 4);
        assert!(d.contains(DecoFlags::Z));
        assert!(d.intersects(DecoFlags::BRDCAST_ER_SAE));
    }

    #[test]
    fn fresh_instruction() {
        let insn = Instruction::default();
        assert_eq!(insn.times, 1);
        assert_eq!(insn.opcode, None);
        assert_eq!(insn.evex_brerop, None);
        assert!(insn.oprs.iter().all(|op| op.ty.is_empty()));
    }
}
