//! Per-line parsing context.
//!
//! Everything the parser reads about the assembly session (bits mode,
//! addressing defaults, optimization level, the current location, and the
//! pass) travels in one immutable [`Context`] instead of process globals,
//! so lines can in principle be parsed independently.

use crate::symtab::SegmentId;

/// Which assembly pass is running. Criticality of expression evaluation and
/// some diagnostics depend on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Pass {
    /// First pass: forward references are allowed to stay unresolved.
    #[default]
    First,
    /// An intermediate pass; offsets may still move.
    Intermediate,
    /// Final pass: everything must resolve.
    Final,
}

impl Pass {
    pub fn is_final(self) -> bool {
        matches!(self, Pass::Final)
    }

    /// Whether symbol values have stabilized (TIMES counts are evaluated
    /// critically once they have).
    pub fn is_stable(self) -> bool {
        !matches!(self, Pass::First)
    }
}

/// Current assembly position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub segment: Option<SegmentId>,
    pub offset: i64,
}

/// Immutable per-line configuration and position.
#[derive(Debug, Clone)]
pub struct Context {
    /// Mode: 16, 32 or 64.
    pub bits: u16,
    /// `default rel` in effect: unadorned 64-bit absolute references become
    /// RIP-relative.
    pub rel_default: bool,
    /// Optimization level; negative disables immediate-size refinement.
    pub optimizing: i32,
    pub location: Location,
    /// Inside an `absolute` section.
    pub in_absolute: bool,
    pub absolute: Location,
    /// TASM compatibility changes the meaning of size overrides inside
    /// brackets.
    pub tasm_compatible: bool,
    pub pass: Pass,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            bits: 64,
            rel_default: false,
            optimizing: 1,
            location: Location::default(),
            in_absolute: false,
            absolute: Location::default(),
            tasm_compatible: false,
            pass: Pass::First,
        }
    }
}
