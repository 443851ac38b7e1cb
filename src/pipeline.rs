//! End-to-end driver: source text to bytecode, bytecode to a value.

use crate::bytecode::compile::generate;
use crate::bytecode::optimize::optimize;
use crate::bytecode::serialize::DecodeError;
use crate::bytecode::Bytecode;
use crate::diagnostic::Diagnostics;
use crate::frontend::lexer::{LexerError, Span};
use crate::frontend::parser::parse_source;
use crate::frontend::parser_error::ParserError;
use crate::lang::program::Program;
use crate::lang::value::Value;
use crate::runtime::{RuntimeError, Vm, VmConfig};
use crate::semantic::{binder, checker};
use serde::{Deserialize, Serialize};
use std::io;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("lexer error: {0}")]
    Lexer(#[from] LexerError),
    #[error("parse error: {0}")]
    Parser(#[from] ParserError),
    /// Binding, checking or generation reported at least one error.
    #[error("{0}")]
    Diagnostics(Diagnostics),
    #[error("bytecode error: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Run constant folding over the generated bytecode.
    pub optimize: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { optimize: true }
    }
}

/// Output of a successful [`compile`]. `diagnostics` holds warnings only.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub program: Program,
    pub bytecode: Bytecode,
    pub diagnostics: Diagnostics,
}

impl Compiled {
    /// Node spans for placing runtime diagnostics.
    pub fn spans(&self) -> Rc<[Span]> {
        Rc::from(self.program.spans())
    }
}

/// Lex, parse, bind, check, generate and (optionally) optimize.
pub fn compile(source: &str, options: CompileOptions) -> Result<Compiled, PipelineError> {
    let program = parse_source(source)?;
    debug!(nodes = program.len(), "parse complete");

    let mut diagnostics = Diagnostics::new();
    let tree = binder::bind(&program, &mut diagnostics);
    checker::check(&tree, &mut diagnostics);
    if diagnostics.has_errors() {
        return Err(PipelineError::Diagnostics(diagnostics));
    }

    let mut bytecode = generate(&program, &tree, &mut diagnostics);
    if diagnostics.has_errors() {
        return Err(PipelineError::Diagnostics(diagnostics));
    }
    if options.optimize {
        bytecode = optimize(&bytecode);
    }

    Ok(Compiled {
        program,
        bytecode,
        diagnostics,
    })
}

/// Compiles and runs `source` with default compile options. Warnings and
/// recoverable runtime diagnostics are logged.
pub fn run(source: &str, config: VmConfig) -> Result<Option<Value>, PipelineError> {
    let mut vm = Vm::with_config(config);
    let mut diagnostics = Diagnostics::new();
    let result = run_in(source, CompileOptions::default(), &mut vm, &mut diagnostics);
    for diagnostic in diagnostics.iter() {
        warn!("{}", diagnostic);
    }
    result
}

/// Compiles `source` and runs it on a caller-prepared VM. Compile warnings
/// and runtime diagnostics are appended to `diagnostics`.
pub fn run_in(
    source: &str,
    options: CompileOptions,
    vm: &mut Vm,
    diagnostics: &mut Diagnostics,
) -> Result<Option<Value>, PipelineError> {
    let compiled = compile(source, options)?;
    vm.set_spans(compiled.spans());
    diagnostics.extend(compiled.diagnostics);
    Ok(vm.run(&compiled.bytecode, diagnostics)?)
}

/// Decodes a program in the binary format and runs it. There is no source
/// map, so runtime diagnostics carry default spans.
pub fn run_bytes(bytes: &[u8], vm: &mut Vm, diagnostics: &mut Diagnostics) -> Result<Option<Value>, PipelineError> {
    let bytecode = Bytecode::from_bytes(bytes)?;
    debug!(instructions = bytecode.len(), "decoded program");
    Ok(vm.run(&bytecode, diagnostics)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticCode;

    #[test]
    fn test_compile_reports_binder_errors() {
        match compile("let x = 1; x = 2;", CompileOptions::default()) {
            Err(PipelineError::Diagnostics(diags)) => assert!(diags.contains(DiagnosticCode::B0002)),
            other => panic!("expected diagnostics, got {:?}", other.map(|c| c.bytecode)),
        }
    }

    #[test]
    fn test_frontend_errors_convert() {
        assert!(matches!(
            compile("let x = ;", CompileOptions::default()),
            Err(PipelineError::Parser(_))
        ));
    }

    #[test]
    fn test_optimize_flag() {
        let folded = compile("1 + 2;", CompileOptions::default()).expect("compiles");
        let plain = compile("1 + 2;", CompileOptions { optimize: false }).expect("compiles");
        assert!(folded.bytecode.len() < plain.bytecode.len());
    }
}
