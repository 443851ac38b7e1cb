use crate::diagnostic::{Diagnostic, DiagnosticCode, Level};
use crate::frontend::lexer::Span;
use thiserror::Error;

/// A construct the generator refused to lower.
///
/// Generation never stops on these; each one becomes a diagnostic and a
/// placeholder instruction keeps the stack shape intact.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The binder could not resolve the operator, so there is no opcode.
    #[error("{kind} operator '{symbol}' was not resolved")]
    UnresolvedOperator { kind: &'static str, symbol: &'static str },

    /// Operand types do not satisfy the resolved operator.
    #[error("operator '{symbol}' requires '{expected}', found '{found}'")]
    OperandMismatch {
        symbol: &'static str,
        expected: String,
        found: String,
    },
}

impl CompileError {
    pub fn unresolved(kind: &'static str, symbol: &'static str) -> Self {
        CompileError::UnresolvedOperator { kind, symbol }
    }

    pub fn operand_mismatch(symbol: &'static str, expected: impl ToString, found: impl ToString) -> Self {
        CompileError::OperandMismatch {
            symbol,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            CompileError::UnresolvedOperator { .. } => DiagnosticCode::G0001,
            CompileError::OperandMismatch { .. } => DiagnosticCode::G0002,
        }
    }

    pub fn into_diagnostic(self, span: Span) -> Diagnostic {
        Diagnostic {
            code: self.code(),
            message: self.to_string(),
            level: Level::Error,
            span,
        }
    }
}
