//! Structured diagnostics shared by every pass.
//!
//! The binder, checker, generator and VM never print. They push
//! [`Diagnostic`] values into a caller-owned [`Diagnostics`] bag and keep
//! going; presentation (plain text or JSON) is left to the host.

use crate::frontend::lexer::Span;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Warn,
    Error,
}

/// Stable diagnostic codes. The prefix names the pass that reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticCode {
    /// Identifier does not resolve to any variable symbol.
    B0001,
    /// Assignment to an immutable variable.
    B0002,
    /// No binary operator overload for the operand types.
    B0003,
    /// No unary operator overload for the operand type.
    B0004,
    /// No postfix operator overload for the operand type.
    B0005,
    /// Object key type is neither `string` nor `int`.
    B0006,
    /// Callee is not a function.
    B0007,
    /// Argument count or argument names do not match the callee.
    B0008,
    /// Member does not exist on the object type.
    B0009,
    /// Declaration has neither a type annotation nor an initializer.
    B0010,

    /// Initializer not assignable to the declared type.
    T0001,
    /// Returned value not assignable to the declared return type.
    T0002,
    /// Operand not assignable to the operator's operand type.
    T0003,
    /// Property value not assignable to its member type.
    T0004,
    /// Assigned value not assignable to the variable type.
    T0005,
    /// Argument or default not assignable to the parameter type.
    T0006,

    /// Operator left unresolved by the binder reached generation.
    G0001,
    /// Operand types cannot satisfy the operator at generation time.
    G0002,

    /// Call depth limit exceeded.
    R0001,
    /// Operand stack underflow.
    R0002,
    /// Malformed instruction operand.
    R0003,
    /// Variable is not declared in any enclosing scope.
    R0004,
    /// Operand has the wrong runtime type.
    R0005,
    /// Called value is not a function.
    R0006,
    /// Integer division or modulus by zero.
    R0007,
    /// Step or stack size limit exceeded.
    R0008,
    /// `assert` failed.
    R0009,
    /// Missing argument with no default.
    R0010,
    /// Output sink failure.
    R0011,
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub level: Level,
    pub span: Span,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Warn => "warning",
            Level::Error => "error",
        };
        write!(f, "{}[{}] {}: {}", level, self.code, self.span, self.message)
    }
}

/// Caller-owned collection of diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, code: DiagnosticCode, span: Span, message: impl Into<String>) {
        self.push(Diagnostic {
            code,
            message: message.into(),
            level: Level::Error,
            span,
        });
    }

    pub fn warn(&mut self, code: DiagnosticCode, span: Span, message: impl Into<String>) {
        self.push(Diagnostic {
            code,
            message: message.into(),
            level: Level::Warn,
            span,
        });
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(code = %diagnostic.code, span = %diagnostic.span, "{}", diagnostic.message);
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.level == Level::Error)
    }

    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.items.iter().any(|d| d.code == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.items.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}
