//! The x86 register inventory.
//!
//! Registers carry three pieces of information the parser cares about: a
//! class (general purpose, segment, vector, ...), an intrinsic width in
//! bits (zero for registers with no inherent width, like the opmask
//! registers), and the hardware encoding number. The whole inventory is
//! declared once in the `registers!` table below.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::x86::insn::OperandType;

/// Broad register classes, used for effective-address legality checks and
/// operand classification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RegClass {
    Gpr,
    SegReg,
    Fpu,
    Mmx,
    Xmm,
    Ymm,
    Zmm,
    Opmask,
}

macro_rules! registers {
    ($(($variant:ident, $name:literal, $class:ident, $bits:literal, $num:literal),)*) => {
        /// Every register the parser recognizes.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum Register {
            $($variant,)*
        }

        impl Register {
            /// (name, class, width in bits, encoding number) per register,
            /// indexed by discriminant.
            const TABLE: &'static [(&'static str, RegClass, u16, u8)] = &[
                $(($name, RegClass::$class, $bits, $num),)*
            ];

            const ALL: &'static [Register] = &[$(Register::$variant,)*];
        }
    };
}

registers! {
    // 8-bit general purpose
    (Al, "al", Gpr, 8, 0),
    (Cl, "cl", Gpr, 8, 1),
    (Dl, "dl", Gpr, 8, 2),
    (Bl, "bl", Gpr, 8, 3),
    (Ah, "ah", Gpr, 8, 4),
    (Ch, "ch", Gpr, 8, 5),
    (Dh, "dh", Gpr, 8, 6),
    (Bh, "bh", Gpr, 8, 7),
    (Spl, "spl", Gpr, 8, 4),
    (Bpl, "bpl", Gpr, 8, 5),
    (Sil, "sil", Gpr, 8, 6),
    (Dil, "dil", Gpr, 8, 7),
    (R8b, "r8b", Gpr, 8, 8),
    (R9b, "r9b", Gpr, 8, 9),
    (R10b, "r10b", Gpr, 8, 10),
    (R11b, "r11b", Gpr, 8, 11),
    (R12b, "r12b", Gpr, 8, 12),
    (R13b, "r13b", Gpr, 8, 13),
    (R14b, "r14b", Gpr, 8, 14),
    (R15b, "r15b", Gpr, 8, 15),
    // 16-bit general purpose
    (Ax, "ax", Gpr, 16, 0),
    (Cx, "cx", Gpr, 16, 1),
    (Dx, "dx", Gpr, 16, 2),
    (Bx, "bx", Gpr, 16, 3),
    (Sp, "sp", Gpr, 16, 4),
    (Bp, "bp", Gpr, 16, 5),
    (Si, "si", Gpr, 16, 6),
    (Di, "di", Gpr, 16, 7),
    (R8w, "r8w", Gpr, 16, 8),
    (R9w, "r9w", Gpr, 16, 9),
    (R10w, "r10w", Gpr, 16, 10),
    (R11w, "r11w", Gpr, 16, 11),
    (R12w, "r12w", Gpr, 16, 12),
    (R13w, "r13w", Gpr, 16, 13),
    (R14w, "r14w", Gpr, 16, 14),
    (R15w, "r15w", Gpr, 16, 15),
    // 32-bit general purpose
    (Eax, "eax", Gpr, 32, 0),
    (Ecx, "ecx", Gpr, 32, 1),
    (Edx, "edx", Gpr, 32, 2),
    (Ebx, "ebx", Gpr, 32, 3),
    (Esp, "esp", Gpr, 32, 4),
    (Ebp, "ebp", Gpr, 32, 5),
    (Esi, "esi", Gpr, 32, 6),
    (Edi, "edi", Gpr, 32, 7),
    (R8d, "r8d", Gpr, 32, 8),
    (R9d, "r9d", Gpr, 32, 9),
    (R10d, "r10d", Gpr, 32, 10),
    (R11d, "r11d", Gpr, 32, 11),
    (R12d, "r12d", Gpr, 32, 12),
    (R13d, "r13d", Gpr, 32, 13),
    (R14d, "r14d", Gpr, 32, 14),
    (R15d, "r15d", Gpr, 32, 15),
    // 64-bit general purpose
    (Rax, "rax", Gpr, 64, 0),
    (Rcx, "rcx", Gpr, 64, 1),
    (Rdx, "rdx", Gpr, 64, 2),
    (Rbx, "rbx", Gpr, 64, 3),
    (Rsp, "rsp", Gpr, 64, 4),
    (Rbp, "rbp", Gpr, 64, 5),
    (Rsi, "rsi", Gpr, 64, 6),
    (Rdi, "rdi", Gpr, 64, 7),
    (R8, "r8", Gpr, 64, 8),
    (R9, "r9", Gpr, 64, 9),
    (R10, "r10", Gpr, 64, 10),
    (R11, "r11", Gpr, 64, 11),
    (R12, "r12", Gpr, 64, 12),
    (R13, "r13", Gpr, 64, 13),
    (R14, "r14", Gpr, 64, 14),
    (R15, "r15", Gpr, 64, 15),
    // segment registers
    (Es, "es", SegReg, 16, 0),
    (Cs, "cs", SegReg, 16, 1),
    (Ss, "ss", SegReg, 16, 2),
    (Ds, "ds", SegReg, 16, 3),
    (Fs, "fs", SegReg, 16, 4),
    (Gs, "gs", SegReg, 16, 5),
    // x87 stack
    (St0, "st0", Fpu, 80, 0),
    (St1, "st1", Fpu, 80, 1),
    (St2, "st2", Fpu, 80, 2),
    (St3, "st3", Fpu, 80, 3),
    (St4, "st4", Fpu, 80, 4),
    (St5, "st5", Fpu, 80, 5),
    (St6, "st6", Fpu, 80, 6),
    (St7, "st7", Fpu, 80, 7),
    // MMX
    (Mm0, "mm0", Mmx, 64, 0),
    (Mm1, "mm1", Mmx, 64, 1),
    (Mm2, "mm2", Mmx, 64, 2),
    (Mm3, "mm3", Mmx, 64, 3),
    (Mm4, "mm4", Mmx, 64, 4),
    (Mm5, "mm5", Mmx, 64, 5),
    (Mm6, "mm6", Mmx, 64, 6),
    (Mm7, "mm7", Mmx, 64, 7),
    // SSE
    (Xmm0, "xmm0", Xmm, 128, 0),
    (Xmm1, "xmm1", Xmm, 128, 1),
    (Xmm2, "xmm2", Xmm, 128, 2),
    (Xmm3, "xmm3", Xmm, 128, 3),
    (Xmm4, "xmm4", Xmm, 128, 4),
    (Xmm5, "xmm5", Xmm, 128, 5),
    (Xmm6, "xmm6", Xmm, 128, 6),
    (Xmm7, "xmm7", Xmm, 128, 7),
    (Xmm8, "xmm8", Xmm, 128, 8),
    (Xmm9, "xmm9", Xmm, 128, 9),
    (Xmm10, "xmm10", Xmm, 128, 10),
    (Xmm11, "xmm11", Xmm, 128, 11),
    (Xmm12, "xmm12", Xmm, 128, 12),
    (Xmm13, "xmm13", Xmm, 128, 13),
    (Xmm14, "xmm14", Xmm, 128, 14),
    (Xmm15, "xmm15", Xmm, 128, 15),
    // AVX
    (Ymm0, "ymm0", Ymm, 256, 0),
    (Ymm1, "ymm1", Ymm, 256, 1),
    (Ymm2, "ymm2", Ymm, 256, 2),
    (Ymm3, "ymm3", Ymm, 256, 3),
    (Ymm4, "ymm4", Ymm, 256, 4),
    (Ymm5, "ymm5", Ymm, 256, 5),
    (Ymm6, "ymm6", Ymm, 256, 6),
    (Ymm7, "ymm7", Ymm, 256, 7),
    (Ymm8, "ymm8", Ymm, 256, 8),
    (Ymm9, "ymm9", Ymm, 256, 9),
    (Ymm10, "ymm10", Ymm, 256, 10),
    (Ymm11, "ymm11", Ymm, 256, 11),
    (Ymm12, "ymm12", Ymm, 256, 12),
    (Ymm13, "ymm13", Ymm, 256, 13),
    (Ymm14, "ymm14", Ymm, 256, 14),
    (Ymm15, "ymm15", Ymm, 256, 15),
    // AVX-512
    (Zmm0, "zmm0", Zmm, 512, 0),
    (Zmm1, "zmm1", Zmm, 512, 1),
    (Zmm2, "zmm2", Zmm, 512, 2),
    (Zmm3, "zmm3", Zmm, 512, 3),
    (Zmm4, "zmm4", Zmm, 512, 4),
    (Zmm5, "zmm5", Zmm, 512, 5),
    (Zmm6, "zmm6", Zmm, 512, 6),
    (Zmm7, "zmm7", Zmm, 512, 7),
    (Zmm8, "zmm8", Zmm, 512, 8),
    (Zmm9, "zmm9", Zmm, 512, 9),
    (Zmm10, "zmm10", Zmm, 512, 10),
    (Zmm11, "zmm11", Zmm, 512, 11),
    (Zmm12, "zmm12", Zmm, 512, 12),
    (Zmm13, "zmm13", Zmm, 512, 13),
    (Zmm14, "zmm14", Zmm, 512, 14),
    (Zmm15, "zmm15", Zmm, 512, 15),
    // opmask registers: no inherent width
    (K0, "k0", Opmask, 0, 0),
    (K1, "k1", Opmask, 0, 1),
    (K2, "k2", Opmask, 0, 2),
    (K3, "k3", Opmask, 0, 3),
    (K4, "k4", Opmask, 0, 4),
    (K5, "k5", Opmask, 0, 5),
    (K6, "k6", Opmask, 0, 6),
    (K7, "k7", Opmask, 0, 7),
}

static NAME_MAP: Lazy<HashMap<&'static str, Register>> = Lazy::new(|| {
    Register::ALL
        .iter()
        .map(|&r| (r.name(), r))
        .collect()
});

impl Register {
    pub fn name(self) -> &'static str {
        Self::TABLE[self as usize].0
    }

    pub fn class(self) -> RegClass {
        Self::TABLE[self as usize].1
    }

    /// Intrinsic width in bits; 0 for registers without one.
    pub fn bits(self) -> u16 {
        Self::TABLE[self as usize].2
    }

    /// Hardware encoding number.
    pub fn number(self) -> u8 {
        Self::TABLE[self as usize].3
    }

    /// Case-insensitive name lookup.
    pub fn from_name(name: &str) -> Option<Register> {
        NAME_MAP.get(name.to_ascii_lowercase().as_str()).copied()
    }

    pub fn is_gpr(self) -> bool {
        self.class() == RegClass::Gpr
    }

    pub fn is_sreg(self) -> bool {
        self.class() == RegClass::SegReg
    }

    /// FS and GS get special effective-address treatment in 64-bit mode.
    pub fn is_fsgs(self) -> bool {
        matches!(self, Register::Fs | Register::Gs)
    }

    /// The size portion of this register's operand type.
    pub fn size_flags(self) -> OperandType {
        match self.bits() {
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
