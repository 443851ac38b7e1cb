use crate::bytecode::Opcode;
use crate::diagnostic::{Diagnostic, DiagnosticCode, Level};
use crate::frontend::lexer::Span;
use crate::lang::node::NodeId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("call depth limit exceeded ({0}) - possible infinite recursion")]
    CallDepth(usize),
    #[error("stack underflow: {opcode} needs {needed} value(s)")]
    StackUnderflow { opcode: Opcode, needed: usize },
    #[error("malformed operand for {opcode}: expected {expected}")]
    MalformedOperand {
        opcode: Opcode,
        expected: &'static str,
    },
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("type error: {0}")]
    TypeMismatch(String),
    #[error("value of type {0} is not callable")]
    NotCallable(&'static str),
    #[error("division by zero")]
    DivisionByZero,
    #[error("execution step limit exceeded ({0})")]
    StepLimit(usize),
    #[error("stack size limit exceeded ({0})")]
    StackLimit(usize),
    #[error("assertion failed: {0}")]
    AssertFailed(String),
    #[error("missing argument for parameter '{0}'")]
    MissingArgument(String),
    #[error("no parameter named '{0}'")]
    UnknownArgument(String),
    #[error("too many arguments: expected at most {expected}, got {found}")]
    TooManyArguments { expected: usize, found: usize },
    #[error("output error: {0}")]
    Output(String),
}

impl RuntimeErrorKind {
    pub fn code(&self) -> DiagnosticCode {
        use RuntimeErrorKind::*;
        match self {
            CallDepth(_) => DiagnosticCode::R0001,
            StackUnderflow { .. } => DiagnosticCode::R0002,
            MalformedOperand { .. } => DiagnosticCode::R0003,
            UndefinedVariable(_) => DiagnosticCode::R0004,
            TypeMismatch(_) => DiagnosticCode::R0005,
            NotCallable(_) => DiagnosticCode::R0006,
            DivisionByZero => DiagnosticCode::R0007,
            StepLimit(_) | StackLimit(_) => DiagnosticCode::R0008,
            AssertFailed(_) => DiagnosticCode::R0009,
            MissingArgument(_) | UnknownArgument(_) | TooManyArguments { .. } => {
                DiagnosticCode::R0010
            }
            Output(_) => DiagnosticCode::R0011,
        }
    }

    /// Fatal errors unwind the evaluation. The rest are reported and the
    /// offending instruction is skipped.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RuntimeErrorKind::MalformedOperand { .. })
    }
}

#[derive(Debug, Clone, Error)]
#[error("runtime error: {kind}{}", format_call_stack(.call_stack))]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    /// Innermost call last.
    pub call_stack: Vec<String>,
    /// Syntax node of the failing instruction, when known.
    pub node: Option<NodeId>,
}

/// Most call stack lines shown after collapsing repeats.
const MAX_CALL_STACK_LINES: usize = 16;

/// Innermost frame first. Consecutive identical frames share one line.
fn format_call_stack(call_stack: &[String]) -> String {
    let mut runs: Vec<(&str, usize)> = Vec::new();
    for frame in call_stack.iter().rev() {
        let repeat = runs.last().is_some_and(|(last, _)| *last == frame.as_str());
        if repeat {
            if let Some(run) = runs.last_mut() {
                run.1 += 1;
            }
        } else {
            runs.push((frame.as_str(), 1));
        }
    }

    let mut out = String::new();
    if runs.is_empty() {
        return out;
    }
    out.push_str("\n  call stack:");
    for (i, (frame, count)) in runs.iter().take(MAX_CALL_STACK_LINES).enumerate() {
        out.push_str(&format!("\n    {}: {}", i, frame));
        if *count > 1 {
            out.push_str(&format!(" (x{})", count));
        }
    }
    if runs.len() > MAX_CALL_STACK_LINES {
        out.push_str(&format!("\n    ... {} more", runs.len() - MAX_CALL_STACK_LINES));
    }
    out
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        RuntimeError {
            kind,
            call_stack: Vec::new(),
            node: None,
        }
    }

    /// Places the error at `node` when one is known.
    pub fn at(mut self, node: Option<NodeId>) -> Self {
        if node.is_some() {
            self.node = node;
        }
        self
    }

    pub fn code(&self) -> DiagnosticCode {
        self.kind.code()
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    pub fn to_diagnostic(&self, span: Span) -> Diagnostic {
        Diagnostic {
            code: self.code(),
            message: self.kind.to_string(),
            level: Level::Error,
            span,
        }
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_call_stack(kind: RuntimeErrorKind, frames: &[&str]) -> RuntimeError {
        let mut err = RuntimeError::new(kind);
        err.call_stack = frames.iter().map(|f| f.to_string()).collect();
        err
    }

    #[test]
    fn test_display_lists_call_stack_innermost_first() {
        let err = with_call_stack(RuntimeErrorKind::DivisionByZero, &["call at 1:1", "call at 2:3"]);
        assert_eq!(
            err.to_string(),
            "runtime error: division by zero\n  call stack:\n    0: call at 2:3\n    1: call at 1:1"
        );
    }

    #[test]
    fn test_repeated_frames_collapse() {
        let mut frames = vec!["call at 9:1"];
        frames.extend(std::iter::repeat_n("call at 1:69", 500));
        let err = with_call_stack(RuntimeErrorKind::CallDepth(501), &frames);
        assert_eq!(
            err.to_string(),
            "runtime error: call depth limit exceeded (501) - possible infinite recursion\n  \
             call stack:\n    0: call at 1:69 (x500)\n    1: call at 9:1"
        );
    }

    #[test]
    fn test_long_call_stacks_are_truncated() {
        // alternating frames never collapse
        let frames: Vec<String> = (0..40).map(|i| format!("call at {}:1", i % 2 + 1)).collect();
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();
        let text = with_call_stack(RuntimeErrorKind::DivisionByZero, &frames).to_string();
        assert_eq!(text.lines().count(), 2 + MAX_CALL_STACK_LINES + 1);
        assert!(text.ends_with(&format!("... {} more", 40 - MAX_CALL_STACK_LINES)));
    }

    #[test]
    fn test_node_is_not_an_error_source() {
        let mut err = RuntimeError::new(RuntimeErrorKind::UndefinedVariable("x".into()));
        assert_eq!(err.node, None);
        err.node = Some(NodeId(7));
        assert_eq!(err.node, Some(NodeId(7)));
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_classification() {
        assert!(RuntimeErrorKind::CallDepth(10).is_fatal());
        assert_eq!(RuntimeErrorKind::CallDepth(10).code(), DiagnosticCode::R0001);
        let malformed = RuntimeErrorKind::MalformedOperand {
            opcode: Opcode::Load,
            expected: "string",
        };
        assert!(!malformed.is_fatal());
        assert_eq!(malformed.code(), DiagnosticCode::R0003);
    }
}
