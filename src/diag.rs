//! Diagnostics: typed messages, severities, and the sink the parser fires
//! them into.
//!
//! The parser never decides fatality and never touches I/O; it reports
//! through a [`Report`] sink and keeps going. Drivers choose how to render
//! diagnostics and when to stop; tests use the collecting [`Diagnostics`]
//! sink and assert on variants instead of message strings.

use thiserror::Error;

/// Warning classes, so drivers can enable or suppress them by name.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WarnClass {
    /// A label alone on a line without a trailing colon.
    LabelOrphan,
    /// A data declaration with no operands.
    DbEmpty,
    /// A size override inconsistent with a register's intrinsic size.
    RegSize,
    /// Everything else.
    Other,
}

/// Every message the parser and its collaborators can emit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagKind {
    // labels and prefixes
    #[error("label alone on a line without a colon might be in error")]
    LabelAlone,
    #[error("instruction has redundant prefixes")]
    RedundantPrefixes,
    #[error("instruction has conflicting prefixes")]
    ConflictingPrefixes,
    #[error("instruction expected")]
    InstructionExpected,
    #[error("label or instruction expected at start of line")]
    LabelOrInstructionExpected,

    // TIMES
    #[error("non-constant argument supplied to TIMES")]
    TimesNotConstant,
    #[error("TIMES value {0} is negative")]
    TimesNegative(i64),

    // operand modifiers
    #[error("invalid operand size specification")]
    InvalidSizeSpec,
    #[error("invalid size specification in effective address")]
    InvalidEaSizeSpec,
    #[error("conflicting address size specifications")]
    ConflictingAddrSize,
    #[error("invalid register size specification ignored")]
    RegSizeIgnored,
    #[error("invalid use of FAR operand specifier")]
    InvalidFar,

    // memory references
    #[error("invalid effective address: two index registers")]
    EaTwoIndexRegisters,
    #[error("invalid effective address: impossible register")]
    EaImpossibleRegister,
    #[error("invalid effective address: too many registers")]
    EaTooManyRegisters,
    #[error("invalid effective address: multiple base segments")]
    EaMultipleSegments,
    #[error("invalid effective address: impossible segment base multiplier")]
    EaImpossibleSegMultiplier,
    #[error("invalid effective address: bad subexpression type")]
    EaBadSubexpression,
    #[error("invalid segment override")]
    InvalidSegmentOverride,
    #[error("instruction has conflicting segment overrides")]
    ConflictingSegmentOverrides,
    #[error("invalid mib expression")]
    InvalidMib,
    #[error("expecting ] at end of memory operand")]
    ExpectingCloseBracket,
    #[error("excess brackets in memory operand")]
    ExcessBrackets,
    #[error("unmatched ] in memory operand")]
    UnmatchedBracket,
    #[error("unknown use of FLAT in MASM emulation")]
    UnknownFlat,

    // decorators
    #[error("opmask k{0} is already set")]
    OpmaskAlreadySet(u8),
    #[error("{{{0}}} is not an expected decorator")]
    UnexpectedDecorator(String),
    #[error("only a series of valid decorators expected")]
    OnlyDecoratorsExpected,
    #[error("invalid decorator")]
    InvalidDecorator,

    // operand terminators and classification
    #[error("comma, decorator or end of line expected, got {0}")]
    ExpectedCommaOrDecorator(String),
    #[error("comma, colon, decorator or end of line expected after operand")]
    ExpectedCommaAfterOperand,
    #[error("invalid operand type")]
    InvalidOperandType,
    #[error("invalid register set size")]
    InvalidRegsetSize,

    // data declarations
    #[error("no operand for data declaration")]
    DbNoOperand,
    #[error("expected `)' after subexpression, got {0}")]
    ExpectedCloseParen(String),
    #[error("{0} must be followed by a string constant, got {1}")]
    StrFuncNeedsString(String, String),
    #[error("invalid input string to {0}")]
    StrFuncBadInput(String),
    #[error("unterminated {0} function")]
    UnterminatedStrFunc(String),
    #[error("no {0}-bit floating-point format supported")]
    NoFloatFormat(usize),
    #[error("non-constant argument supplied to DUP")]
    DupNotConstant,
    #[error("negative argument supplied to DUP")]
    DupNegative,
    #[error("expression is not simple or relocatable")]
    NotRelocatable,
    #[error("comma expected after operand, got {0}")]
    CommaExpected(String),

    // INCBIN
    #[error("`incbin' expects a file name")]
    IncbinNeedsFile,
    #[error("`incbin': second parameter is non-numeric")]
    IncbinSecondNonNumeric,
    #[error("`incbin': third parameter is non-numeric")]
    IncbinThirdNonNumeric,
    #[error("`incbin': more than three parameters")]
    IncbinTooManyParams,

    // evaluator
    #[error("symbol `{0}' not defined")]
    SymbolNotDefined(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("`{0}' operator may only be applied to scalar values")]
    ScalarOperatorOnly(&'static str),
    #[error("unable to multiply two non-scalar values")]
    NonScalarProduct,
    #[error("`wrt' must reference a segment")]
    WrtNeedsSegment,
    #[error("expression syntax error, got {0}")]
    ExprSyntax(String),
    #[error("expecting `)', got {0}")]
    ExprExpectedParen(String),
}

/// How serious a diagnostic is. Pass-2 errors are structural problems only
/// reportable once symbol values have stabilized.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Severity {
    Warning(WarnClass),
    Error,
    ErrorPass2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagKind,
}

/// The sink. All parser output that is not the instruction record flows
/// through here, fire-and-forget.
pub trait Report {
    fn report(&mut self, diag: Diagnostic);

    fn warn(&mut self, class: WarnClass, kind: DiagKind) {
        self.report(Diagnostic {
            severity: Severity::Warning(class),
            kind,
        });
    }

    fn nonfatal(&mut self, kind: DiagKind) {
        self.report(Diagnostic {
            severity: Severity::Error,
            kind,
        });
    }

    fn nonfatal_pass2(&mut self, kind: DiagKind) {
        self.report(Diagnostic {
            severity: Severity::ErrorPass2,
            kind,
        });
    }
}

/// A collecting sink.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn has_errors(&self) -> bool {
        self.items
            .iter()
            .any(|d| matches!(d.severity, Severity::Error | Severity::ErrorPass2))
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items
            .iter()
            .filter(|d| matches!(d.severity, Severity::Warning(_)))
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items
            .iter()
            .filter(|d| matches!(d.severity, Severity::Error | Severity::ErrorPass2))
    }

    pub fn contains(&self, kind: &DiagKind) -> bool {
        self.items.iter().any(|d| &d.kind == kind)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl Report for Diagnostics {
    fn report(&mut self, diag: Diagnostic) {
        self.items.push(diag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_render() {
        assert_eq!(
            DiagKind::TimesNegative(-3).to_string(),
            "TIMES value -3 is negative"
        );
        assert_eq!(
            DiagKind::NoFloatFormat(8).to_string(),
            "no 8-bit floating-point format supported"
        );
        assert_eq!(
            DiagKind::UnexpectedDecorator("rn-sae".into()).to_string(),
            "{rn-sae} is not an expected decorator"
        );
    }

    #[test]
    fn collector() {
        let mut d = Diagnostics::new();
        d.warn(WarnClass::Other, DiagKind::RedundantPrefixes);
        assert!(!d.has_errors());
        d.nonfatal(DiagKind::ConflictingPrefixes);
        assert!(d.has_errors());
        assert!(d.contains(&DiagKind::RedundantPrefixes));
        assert_eq!(d.warnings().count(), 1);
        assert_eq!(d.errors().count(), 1);
    }
}
