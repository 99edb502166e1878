//! The diagnostic surface: a `CompileResult` carrying a success flag,
//! the emitted IL on success, and every accumulated diagnostic. A
//! closed `CodegenError`-by-enum style, no `anyhow`/`thiserror`.

use crate::ast::{JumpTarget, LineNumber};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    /// Fatal: the core stops emitting further IL for this compilation.
    Fatal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    UnresolvedLabel(JumpTarget),
    DuplicateLabel(String),
    DuplicateLineNumber(LineNumber),
    TypeMismatch { expected: String, found: String },
    NarrowingLoss { from: String, to: String },
    BadLoopNesting(&'static str),
    BadTryShape(&'static str),
    ReturnOutsideGosubRegion,
    ThrowWithNonIntegerOperand,
    UnreachableCatchClause,
    UnreachableBlock(u32),
    InternalInvariantViolation(String),
}

impl DiagnosticKind {
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticKind::NarrowingLoss { .. } | DiagnosticKind::UnreachableBlock(_) => {
                Severity::Warning
            }
            DiagnosticKind::InternalInvariantViolation(_) => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

/// Source position the analyzer attached to whatever triggered the
/// diagnostic, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: LineNumber,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: Option<SourceLocation>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, location: Option<SourceLocation>) -> Self {
        let message = describe(&kind);
        Self {
            kind,
            location,
            message,
        }
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "line {}: {}", loc.line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

fn describe(kind: &DiagnosticKind) -> String {
    match kind {
        DiagnosticKind::UnresolvedLabel(JumpTarget::Line(n)) => {
            format!("unresolved jump target: line {n}")
        }
        DiagnosticKind::UnresolvedLabel(JumpTarget::Label(l)) => {
            format!("unresolved jump target: label {l}")
        }
        DiagnosticKind::DuplicateLabel(l) => format!("duplicate label: {l}"),
        DiagnosticKind::DuplicateLineNumber(n) => format!("duplicate line number: {n}"),
        DiagnosticKind::TypeMismatch { expected, found } => {
            format!("type mismatch: expected {expected}, found {found}")
        }
        DiagnosticKind::NarrowingLoss { from, to } => {
            format!("narrowing conversion from {from} to {to} may lose precision")
        }
        DiagnosticKind::BadLoopNesting(what) => format!("malformed loop nesting: {what}"),
        DiagnosticKind::BadTryShape(what) => format!("malformed TRY/CATCH/FINALLY: {what}"),
        DiagnosticKind::ReturnOutsideGosubRegion => {
            "RETURN outside a GOSUB region".to_string()
        }
        DiagnosticKind::ThrowWithNonIntegerOperand => {
            "THROW requires an integer error code".to_string()
        }
        DiagnosticKind::UnreachableCatchClause => {
            "CATCH clause is unreachable after a preceding catch-all".to_string()
        }
        DiagnosticKind::UnreachableBlock(id) => {
            format!("block {id} has no sequential predecessor")
        }
        DiagnosticKind::InternalInvariantViolation(what) => {
            format!("internal invariant violation: {what}")
        }
    }
}

/// The compiler's sole output type.
#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    pub success: bool,
    pub il: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    pub fn has_fatal(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity() == Severity::Fatal)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d.severity(), Severity::Error | Severity::Fatal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_never_flip_success() {
        let d = Diagnostic::new(
            DiagnosticKind::UnreachableBlock(3),
            None,
        );
        assert_eq!(d.severity(), Severity::Warning);
    }

    #[test]
    fn invariant_violations_are_fatal() {
        let d = Diagnostic::new(
            DiagnosticKind::InternalInvariantViolation("bad out-edge set".into()),
            None,
        );
        assert_eq!(d.severity(), Severity::Fatal);
    }
}
