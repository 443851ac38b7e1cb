use crate::bytecode::fold::{self, FoldError};
use crate::bytecode::{Bytecode, Instruction, Opcode, Operand};
use crate::diagnostic::Diagnostics;
use crate::frontend::lexer::Span;
use crate::lang::node::NodeId;
use crate::lang::value::{Closure, ObjectKey, Value};
use crate::runtime::intrinsics::{self, Intrinsic, NativeContext};
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind};
use crate::runtime::scope::Scope;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: None,
            max_stack_size: 10_000,
        }
    }
}

/// Operand stack entry. `source` is the node that produced the value.
#[derive(Debug, Clone)]
struct Slot {
    source: Option<NodeId>,
    value: Value,
}

/// Return target of a user-function call.
struct Frame {
    code: Rc<Bytecode>,
    return_ip: usize,
    scope: Scope,
    stack_base: usize,
    call_site: Option<NodeId>,
    /// Closure running in this frame.
    callee: Rc<Closure>,
}

enum Flow {
    Next,
    Jump(usize),
    /// `CALL`/`RETURN` already moved the instruction pointer.
    Switched,
    Exit,
}

pub type Output = Rc<RefCell<dyn Write>>;

pub struct Vm {
    config: VmConfig,
    stack: Vec<Slot>,
    scope: Scope,
    globals: Scope,
    code: Rc<Bytecode>,
    ip: usize,
    frames: Vec<Frame>,
    /// Call depth of the VM this one was nested in.
    base_depth: usize,
    steps: usize,
    peak_frames: usize,
    output: Output,
    spans: Rc<[Span]>,
    diagnostics: Diagnostics,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let globals = Scope::global();
        for intrinsic in intrinsics::all().iter().filter(|i| i.global) {
            globals.define(intrinsic.name, Value::Intrinsic(intrinsic));
        }
        let output: Output = Rc::new(RefCell::new(io::stdout()));
        Self {
            config,
            stack: Vec::new(),
            scope: globals.clone(),
            globals,
            code: Rc::new(Bytecode::default()),
            ip: 0,
            frames: Vec::new(),
            base_depth: 0,
            steps: 0,
            peak_frames: 0,
            output,
            spans: Rc::from(Vec::new()),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Redirects `print` output.
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// Span table indexed by [`NodeId`], used to place runtime diagnostics.
    pub fn with_spans(mut self, spans: Rc<[Span]>) -> Self {
        self.set_spans(spans);
        self
    }

    pub fn set_spans(&mut self, spans: Rc<[Span]>) {
        self.spans = spans;
    }

    pub fn globals(&self) -> &Scope {
        &self.globals
    }

    pub fn stack(&self) -> Vec<Value> {
        self.stack.iter().map(|s| s.value.clone()).collect()
    }

    /// Deepest explicit call stack seen during the last run.
    pub fn peak_frames(&self) -> usize {
        self.peak_frames
    }

    pub fn reset_execution_state(&mut self) {
        self.steps = 0;
        self.peak_frames = 0;
        self.frames.clear();
        self.stack.clear();
        self.scope = self.globals.clone();
        self.diagnostics = Diagnostics::new();
    }

    /// Runs a top-level program in the global scope. The result is the value
    /// left on top of the operand stack. Runtime diagnostics, recoverable and
    /// fatal, are appended to `diagnostics`.
    pub fn run(&mut self, code: &Bytecode, diagnostics: &mut Diagnostics) -> Result<Option<Value>, RuntimeError> {
        self.reset_execution_state();
        self.code = Rc::new(code.clone());
        self.ip = 0;
        let result = match self.execute() {
            Ok(()) => {
                debug!(steps = self.steps, peak_frames = self.peak_frames, "run complete");
                Ok(self.stack.last().map(|s| s.value.clone()))
            }
            Err(e) => {
                warn!(code = %e.code(), "{}", e.kind);
                let span = self.span_of(e.node);
                self.diagnostics.push(e.to_diagnostic(span));
                Err(e)
            }
        };
        diagnostics.extend(std::mem::take(&mut self.diagnostics));
        result
    }

    fn span_of(&self, source: Option<NodeId>) -> Span {
        source
            .and_then(|id| self.spans.get(id.index()).copied())
            .unwrap_or_default()
    }

    fn depth(&self) -> usize {
        self.base_depth + self.frames.len()
    }

    fn call_stack_names(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|f| format!("call at {}", self.span_of(f.call_site)))
            .collect()
    }

    // Execution

    fn check_limits(&mut self) -> Result<(), RuntimeErrorKind> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeErrorKind::StepLimit(max));
            }
        }

        if self.stack.len() > self.config.max_stack_size {
            return Err(RuntimeErrorKind::StackLimit(self.config.max_stack_size));
        }

        Ok(())
    }

    fn execute(&mut self) -> Result<(), RuntimeError> {
        loop {
            let code = Rc::clone(&self.code);
            let Some(instruction) = code.get(self.ip) else {
                if self.frames.is_empty() {
                    return Ok(());
                }
                // fell off the end of a function body
                self.push(Value::None, None);
                self.ret();
                continue;
            };

            let result = self
                .check_limits()
                .map_err(RuntimeError::from)
                .and_then(|()| self.step(instruction));

            match result {
                Ok(Flow::Next) => self.ip += 1,
                Ok(Flow::Jump(target)) => self.ip = target,
                Ok(Flow::Switched) => {}
                Ok(Flow::Exit) => return Ok(()),
                Err(mut e) => {
                    if e.node.is_none() {
                        e.node = instruction.source;
                    }
                    if !e.is_fatal() {
                        let span = self.span_of(e.node);
                        self.diagnostics.push(e.to_diagnostic(span));
                        self.ip += 1;
                        continue;
                    }
                    // nested VMs report their own frames, the outer ones go first
                    let mut call_stack = self.call_stack_names();
                    call_stack.append(&mut e.call_stack);
                    e.call_stack = call_stack;
                    return Err(e);
                }
            }
        }
    }

    fn step(&mut self, instruction: &Instruction) -> Result<Flow, RuntimeError> {
        let opcode = instruction.opcode;
        let malformed = |expected| RuntimeErrorKind::MalformedOperand { opcode, expected };

        match opcode {
            Opcode::Exit => return Ok(Flow::Exit),

            Opcode::Push => {
                let value = fold::constant(&instruction.operand).ok_or(malformed("a constant"))?;
                self.push(value, instruction.source);
            }
            Opcode::PushNone => self.push(Value::None, instruction.source),
            Opcode::PushObject => {
                let Operand::List(entries) = &instruction.operand else {
                    return Err(malformed("a property list").into());
                };
                let object = self.build_object(entries, opcode)?;
                self.push(Value::Object(Rc::new(object)), instruction.source);
            }
            Opcode::Pop => {
                self.pop(opcode)?;
            }

            Opcode::Load => {
                let name = self.pop_name(opcode)?;
                let value = self
                    .scope
                    .get(&name)
                    .ok_or(RuntimeErrorKind::UndefinedVariable(name))?;
                self.push(value, instruction.source);
            }
            Opcode::Store => {
                let name = self.pop_name(opcode)?;
                let value = self.pop(opcode)?;
                self.scope.assign(&name, value.clone());
                self.push(value, instruction.source);
            }
            Opcode::Define => {
                let name = self.pop_name(opcode)?;
                let value = self.pop(opcode)?;
                self.scope.define(name, value);
            }
            Opcode::GetMember => {
                let key = self.pop(opcode)?;
                let object = self.pop(opcode)?;
                let value = get_member(&object, &key)?;
                self.push(value, instruction.source);
            }

            op if op.is_binary() => {
                let right = self.pop_slot(opcode)?;
                let left = self.pop(opcode)?;
                let value = fold::binary(op, &left, &right.value).map_err(|e| match e {
                    // blame the divisor
                    FoldError::DivisionByZero => RuntimeError::from(fold_error(e)).at(right.source),
                    other => fold_error(other).into(),
                })?;
                self.push(value, instruction.source);
            }
            op if op.is_unary() => {
                let operand = self.pop_slot(opcode)?;
                let value = fold::unary(op, &operand.value)
                    .map_err(|e| RuntimeError::from(fold_error(e)).at(operand.source))?;
                self.push(value, instruction.source);
            }

            Opcode::Jmp | Opcode::Jz | Opcode::Jnz => {
                let offset = instruction
                    .operand
                    .as_offset()
                    .ok_or(malformed("a jump offset"))?;
                let target = self.ip as i64 + 1 + offset as i64;
                if target < 0 || target > self.code.len() as i64 {
                    return Err(malformed("an in-range jump offset").into());
                }
                let taken = match opcode {
                    Opcode::Jmp => true,
                    Opcode::Jz => !self.pop(opcode)?.is_truthy(),
                    _ => self.pop(opcode)?.is_truthy(),
                };
                if taken {
                    return Ok(Flow::Jump(target as usize));
                }
            }

            Opcode::Proc => {
                let closure = self.make_closure(&instruction.operand, opcode)?;
                self.push(Value::Function(Rc::new(closure)), instruction.source);
            }
            Opcode::Call => return self.call(instruction),
            Opcode::Return => return Ok(self.ret()),

            Opcode::BeginScope => self.scope = self.scope.child(),
            Opcode::EndScope => {
                if let Some(outer) = self.scope.enclosing() {
                    self.scope = outer;
                }
            }

            // classified above by range
            _ => return Err(malformed("a known opcode").into()),
        }
        Ok(Flow::Next)
    }

    // Calls

    fn make_closure(&self, operand: &Operand, opcode: Opcode) -> Result<Closure, RuntimeErrorKind> {
        let malformed = RuntimeErrorKind::MalformedOperand {
            opcode,
            expected: "(parameters, body)",
        };
        let Operand::Tuple(pair) = operand else {
            return Err(malformed);
        };
        let (Operand::List(params), Operand::Bytecode(body)) = (&pair.0, &pair.1) else {
            return Err(malformed);
        };
        let mut bound = Vec::with_capacity(params.len());
        for param in params {
            let Operand::Tuple(p) = param else {
                return Err(malformed);
            };
            let default = match &p.1 {
                Operand::Bytecode(code) => Some(Rc::clone(code)),
                _ => None,
            };
            let name = p.0.as_str().ok_or(RuntimeErrorKind::MalformedOperand {
                opcode,
                expected: "a parameter name",
            })?;
            bound.push((name.to_string(), default));
        }
        Ok(Closure {
            params: bound,
            body: Rc::clone(body),
            scope: self.scope.clone(),
        })
    }

    fn call(&mut self, instruction: &Instruction) -> Result<Flow, RuntimeError> {
        let opcode = instruction.opcode;
        let Operand::List(metadata) = &instruction.operand else {
            return Err(RuntimeErrorKind::MalformedOperand {
                opcode,
                expected: "an argument list",
            }
            .into());
        };

        let mut args = Vec::with_capacity(metadata.len());
        for entry in metadata {
            let (Operand::Tuple(pair), Some(code)) = (entry, argument_code(entry)) else {
                return Err(RuntimeErrorKind::MalformedOperand {
                    opcode,
                    expected: "(name, argument)",
                }
                .into());
            };
            let name = pair.0.as_str().map(str::to_string);
            let value = self.eval(code, self.scope.clone())?;
            args.push((name, value));
        }

        let callee = self.pop(opcode)?;
        match callee {
            Value::Intrinsic(intrinsic) => {
                let result = self.call_intrinsic(intrinsic, args)?;
                self.push(result, instruction.source);
                Ok(Flow::Next)
            }
            Value::Function(closure) => self.call_closure(&closure, args, instruction.source),
            other => Err(RuntimeErrorKind::NotCallable(other.type_name()).into()),
        }
    }

    fn call_intrinsic(
        &mut self,
        intrinsic: &'static Intrinsic,
        args: Vec<(Option<String>, Value)>,
    ) -> Result<Value, RuntimeError> {
        let mut values: Vec<Option<Value>> = vec![None; intrinsic.params.len()];
        let mut next = 0;
        for (name, value) in args {
            let index = match name {
                Some(name) => intrinsic
                    .param_index(&name)
                    .ok_or(RuntimeErrorKind::UnknownArgument(name))?,
                None => {
                    let index = next;
                    next += 1;
                    index
                }
            };
            let slot = values.get_mut(index).ok_or(RuntimeErrorKind::TooManyArguments {
                expected: intrinsic.params.len(),
                found: index + 1,
            })?;
            *slot = Some(value);
        }
        let values = values
            .into_iter()
            .zip(intrinsic.params)
            .map(|(value, (name, _))| {
                value.ok_or_else(|| RuntimeErrorKind::MissingArgument(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        trace!(name = intrinsic.name, "intrinsic call");
        let mut out = self.output.borrow_mut();
        let mut ctx = NativeContext { out: &mut *out };
        Ok((intrinsic.native)(&mut ctx, values)?)
    }

    fn call_closure(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<(Option<String>, Value)>,
        call_site: Option<NodeId>,
    ) -> Result<Flow, RuntimeError> {
        let scope = closure.scope.child();

        let mut provided: Vec<Option<Value>> = vec![None; closure.params.len()];
        let mut next = 0;
        for (name, value) in args {
            let index = match name {
                Some(name) => closure
                    .params
                    .iter()
                    .position(|(p, _)| *p == name)
                    .ok_or(RuntimeErrorKind::UnknownArgument(name))?,
                None => {
                    let index = next;
                    next += 1;
                    index
                }
            };
            let slot = provided.get_mut(index).ok_or(RuntimeErrorKind::TooManyArguments {
                expected: closure.params.len(),
                found: index + 1,
            })?;
            *slot = Some(value);
        }

        // defaults run in the callee scope so they can see earlier parameters
        for ((name, default), value) in closure.params.iter().zip(provided) {
            let value = match (value, default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval(default, scope.clone())?,
                (None, None) => return Err(RuntimeErrorKind::MissingArgument(name.clone()).into()),
            };
            scope.define(name.as_str(), value);
        }

        // only a closure calling itself as its last act reuses the frame
        let tail = self.frames.last().is_some_and(|frame| {
            Rc::ptr_eq(&frame.callee.body, &closure.body) && frame.callee.scope.ptr_eq(&closure.scope)
        }) && self
            .code
            .get(self.ip + 1)
            .is_some_and(|next| next.opcode == Opcode::Return);

        if tail {
            trace!(depth = self.depth(), "tail call");
            if let Some(frame) = self.frames.last_mut() {
                frame.call_site = call_site;
            }
        } else {
            if self.depth() + 1 > self.config.max_call_depth {
                return Err(RuntimeErrorKind::CallDepth(self.config.max_call_depth).into());
            }
            self.frames.push(Frame {
                code: Rc::clone(&self.code),
                return_ip: self.ip + 1,
                scope: self.scope.clone(),
                stack_base: self.stack.len(),
                call_site,
                callee: Rc::clone(closure),
            });
            self.peak_frames = self.peak_frames.max(self.frames.len());
            trace!(depth = self.depth(), "call");
        }

        self.code = Rc::clone(&closure.body);
        self.ip = 0;
        self.scope = scope;
        Ok(Flow::Switched)
    }

    fn ret(&mut self) -> Flow {
        let Some(frame) = self.frames.pop() else {
            // top-level return
            return Flow::Next;
        };
        let result = self.stack.pop().unwrap_or(Slot {
            source: None,
            value: Value::None,
        });
        self.stack.truncate(frame.stack_base);
        self.stack.push(result);

        trace!(depth = self.depth(), "return");
        self.code = frame.code;
        self.ip = frame.return_ip;
        self.scope = frame.scope;
        Flow::Switched
    }

    /// Runs `code` to completion in a nested VM sharing `scope`, returning
    /// the value it leaves on top of its stack.
    fn eval(&mut self, code: &Rc<Bytecode>, scope: Scope) -> Result<Value, RuntimeError> {
        let depth = self.depth() + 1;
        if depth > self.config.max_call_depth {
            return Err(RuntimeErrorKind::CallDepth(self.config.max_call_depth).into());
        }
        let mut nested = Vm {
            config: self.config.clone(),
            stack: Vec::new(),
            scope,
            globals: self.globals.clone(),
            code: Rc::clone(code),
            ip: 0,
            frames: Vec::new(),
            base_depth: depth,
            steps: self.steps,
            peak_frames: 0,
            output: Rc::clone(&self.output),
            spans: Rc::clone(&self.spans),
            diagnostics: Diagnostics::new(),
        };
        let result = nested.execute();

        self.steps = nested.steps;
        self.peak_frames = self.peak_frames.max(self.frames.len() + nested.peak_frames);
        self.diagnostics.extend(std::mem::take(&mut nested.diagnostics));

        result?;
        Ok(nested.stack.pop().map(|s| s.value).unwrap_or(Value::None))
    }

    fn build_object(
        &mut self,
        entries: &[Operand],
        opcode: Opcode,
    ) -> Result<IndexMap<ObjectKey, Value>, RuntimeError> {
        let mut object = IndexMap::with_capacity(entries.len());
        for entry in entries {
            let Operand::Tuple(pair) = entry else {
                return Err(RuntimeErrorKind::MalformedOperand {
                    opcode,
                    expected: "(key, value)",
                }
                .into());
            };
            let (Operand::Bytecode(key_code), Operand::Bytecode(value_code)) = (&pair.0, &pair.1) else {
                return Err(RuntimeErrorKind::MalformedOperand {
                    opcode,
                    expected: "(key, value)",
                }
                .into());
            };
            let key = self.eval(key_code, self.scope.clone())?;
            let key = key.to_key().ok_or_else(|| {
                RuntimeErrorKind::TypeMismatch(format!(
                    "object key must be string or int, got {}",
                    key.type_name()
                ))
            })?;
            let value = self.eval(value_code, self.scope.clone())?;
            object.insert(key, value);
        }
        Ok(object)
    }

    // Stack operations

    fn push(&mut self, value: Value, source: Option<NodeId>) {
        self.stack.push(Slot { source, value });
    }

    fn pop_slot(&mut self, opcode: Opcode) -> Result<Slot, RuntimeErrorKind> {
        self.stack
            .pop()
            .ok_or(RuntimeErrorKind::StackUnderflow { opcode, needed: 1 })
    }

    fn pop(&mut self, opcode: Opcode) -> Result<Value, RuntimeErrorKind> {
        self.pop_slot(opcode).map(|s| s.value)
    }

    fn pop_name(&mut self, opcode: Opcode) -> Result<String, RuntimeErrorKind> {
        match self.pop(opcode)? {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(RuntimeErrorKind::TypeMismatch(format!(
                "{} expects a variable name, got {}",
                opcode,
                other.type_name()
            ))),
        }
    }
}

fn argument_code(entry: &Operand) -> Option<&Rc<Bytecode>> {
    match entry {
        Operand::Tuple(pair) => match &pair.1 {
            Operand::Bytecode(code) => Some(code),
            _ => None,
        },
        _ => None,
    }
}

fn fold_error(error: FoldError) -> RuntimeErrorKind {
    match error {
        FoldError::DivisionByZero => RuntimeErrorKind::DivisionByZero,
        other => RuntimeErrorKind::TypeMismatch(other.to_string()),
    }
}

/// `object[key]`. Strings index by character; missing properties read as
/// `none`.
fn get_member(object: &Value, key: &Value) -> Result<Value, RuntimeErrorKind> {
    match (object, key) {
        (Value::Object(props), key) => {
            let key = key.to_key().ok_or_else(|| {
                RuntimeErrorKind::TypeMismatch(format!(
                    "object key must be string or int, got {}",
                    key.type_name()
                ))
            })?;
            Ok(props.get(&key).cloned().unwrap_or(Value::None))
        }
        (Value::Str(s), Value::Int(index)) => Ok(usize::try_from(*index)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(Value::Char)
            .unwrap_or(Value::None)),
        (other, _) => Err(RuntimeErrorKind::TypeMismatch(format!(
            "cannot read a member of {}",
            other.type_name()
        ))),
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("ip", &self.ip)
            .field("stack", &self.stack)
            .field("frames", &self.frames.len())
            .field("base_depth", &self.base_depth)
            .finish()
    }
}
