//! Mingus parses NASM-flavored x86 assembly statements.
//!
//! One preprocessed source line (macros already expanded, comments
//! already stripped) goes in; a structured [`Instruction`](x86::Instruction)
//! record comes out, ready for an encoding pass. The parser understands
//! labels, `TIMES`, instruction prefixes, size and type modifiers, rich
//! effective-address syntax (segment overrides, `disp[regs]`, compound mib
//! references), AVX-512 decorators, and the `db`-family data declarations
//! with `DUP` replication, strings, and float literals.
//!
//! Parsing never aborts: diagnostics stream into a [`Report`](diag::Report)
//! sink and the parser keeps going where it can. A line that cannot
//! produce a meaningful instruction comes back with `opcode: None`.
//!
//! ## Examples
//!
//! ```
//! use mingus::Session;
//! use mingus::x86::{Opcode, OperandType, Register};
//!
//! let mut session = Session::new();
//!
//! let insn = session.parse_line("start: mov eax, 1");
//! assert_eq!(insn.label.as_deref(), Some("start"));
//! assert_eq!(insn.opcode, Some(Opcode::Mov));
//! assert_eq!(insn.operands, 2);
//! assert_eq!(insn.oprs[0].basereg, Some(Register::Eax));
//! assert!(insn.oprs[1].ty.contains(OperandType::IMMEDIATE));
//! assert!(session.diag.is_empty());
//! ```

pub mod context;
pub mod diag;
pub mod eval;
pub mod floats;
pub mod parse;
pub mod scan;
pub mod strfunc;
pub mod symtab;
pub mod x86;

// Re-export the types most drivers need.
pub use context::{Context, Location, Pass};
pub use diag::{DiagKind, Diagnostic, Diagnostics, Report, Severity, WarnClass};
pub use parse::LineParser;
pub use symtab::SymbolTable;
pub use x86::Instruction;

/// Owns everything a parsing session needs: the context, the symbol
/// table, and a collecting diagnostics sink. Drivers that manage their own
/// collaborators can use [`LineParser`] directly instead.
pub struct Session {
    pub ctx: Context,
    pub symtab: SymbolTable,
    pub diag: Diagnostics,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Session {
        Session::with_context(Context::default())
    }

    pub fn with_context(ctx: Context) -> Session {
        Session {
            ctx,
            symtab: SymbolTable::new(),
            diag: Diagnostics::new(),
        }
    }

    /// Parse one source line against the session state.
    pub fn parse_line<'s>(&mut self, line: &'s str) -> Instruction<'s> {
        LineParser::new(&self.ctx, &mut self.symtab, &mut self.diag).parse_line(line)
    }
}
