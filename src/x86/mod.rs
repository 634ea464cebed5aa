//! x86 data model: registers, mnemonics, prefixes, and the parsed
//! instruction record the statement parser produces.

pub mod insn;
pub mod opcodes;
pub mod registers;

pub use insn::{
    DecoFlags, EaFlags, EaHint, Extop, ExtopKind, Instruction, OpFlags, Operand, OperandType,
    RoundMode, MAX_OPERANDS,
};
pub use opcodes::{Opcode, Prefix, PrefixSlot, SizeKeyword, SpecialKeyword};
pub use registers::{RegClass, Register};
