use quill::bytecode::{Bytecode, Opcode, Operand};
use quill::diagnostic::{DiagnosticCode, Diagnostics};
use quill::lang::value::Value;
use quill::pipeline::{self, CompileOptions, PipelineError};
use quill::runtime::{RuntimeErrorKind, Vm, VmConfig};
use std::cell::RefCell;
use std::rc::Rc;

// ============================================================
// Test Helpers
// ============================================================

fn run_src(source: &str) -> Option<Value> {
    pipeline::run(source, VmConfig::default()).expect("program should run")
}

fn assert_value(source: &str, expected: Value) {
    assert_eq!(run_src(source), Some(expected), "source: {}", source);
}

struct Captured {
    result: Result<Option<Value>, PipelineError>,
    text: String,
    vm: Vm,
    diagnostics: Diagnostics,
}

/// Runs with a captured output sink and diagnostics bag.
fn run_captured(source: &str, config: VmConfig) -> Captured {
    let buffer = Rc::new(RefCell::new(Vec::<u8>::new()));
    let mut vm = Vm::with_config(config).with_output(buffer.clone());
    let mut diagnostics = Diagnostics::new();
    let result = pipeline::run_in(source, CompileOptions::default(), &mut vm, &mut diagnostics);
    let text = String::from_utf8(buffer.borrow().clone()).expect("utf-8 output");
    Captured {
        result,
        text,
        vm,
        diagnostics,
    }
}

fn compile_errors(source: &str) -> Vec<DiagnosticCode> {
    match pipeline::compile(source, CompileOptions::default()) {
        Err(PipelineError::Diagnostics(diags)) => diags.iter().map(|d| d.code).collect(),
        Err(other) => panic!("expected diagnostics, got {}", other),
        Ok(_) => panic!("expected diagnostics for: {}", source),
    }
}

// ============================================================
// Arithmetic
// ============================================================

#[test]
fn test_arithmetic_semantics() {
    assert_value("3 * 2 + 1;", Value::Float(7.0));
    assert_value("9 // 2;", Value::Int(4));
    assert_value("~7;", Value::Int(-8));
    assert_value("-7 // 2;", Value::Int(-4));
    assert_value("1 << 4 | 1;", Value::Int(17));
    assert_value("2 ** 10;", Value::Float(1024.0));
}

#[test]
fn test_same_results_without_folding() {
    for source in ["3 * 2 + 1;", "9 // 2;", "~7;", r#""a" + 'b';"#] {
        let folded = pipeline::compile(source, CompileOptions::default()).expect("compiles");
        let plain = pipeline::compile(source, CompileOptions { optimize: false }).expect("compiles");
        let a = Vm::new().run(&folded.bytecode, &mut Diagnostics::new()).expect("runs");
        let b = Vm::new().run(&plain.bytecode, &mut Diagnostics::new()).expect("runs");
        assert_eq!(a, b, "source: {}", source);
    }
}

#[test]
fn test_constant_folding_in_pipeline() {
    let compiled = pipeline::compile("1 + 2;", CompileOptions::default()).expect("compiles");
    let first = compiled.bytecode.get(0).expect("one instruction");
    assert_eq!(first.opcode, Opcode::Push);
    assert_eq!(first.operand, Operand::Double(3.0));
    assert_eq!(compiled.bytecode.get(1).map(|i| i.opcode), Some(Opcode::Exit));
}

// ============================================================
// Variables, control flow and functions
// ============================================================

#[test]
fn test_loops_and_mutation() {
    let source = r#"
        let mut i = 0.0;
        let mut total = 0.0;
        while i < 10 {
            total += i;
            i++;
        }
        total;
    "#;
    assert_value(source, Value::Float(45.0));
}

#[test]
fn test_if_else_chain() {
    let source = r#"
        fn sign(n: float): int {
            if n < 0 { return -1; } else if n > 0 { return 1; }
            return 0;
        }
        sign(-2.5) * 100 + sign(3.0) * 10 + sign(0.0);
    "#;
    assert_value(source, Value::Float(-90.0));
}

#[test]
fn test_closures_capture_scope() {
    let source = r#"
        fn make_counter() {
            let mut count = 0.0;
            return fn() { count += 1; return count; };
        }
        let next = make_counter();
        next();
        next();
        next();
    "#;
    assert_value(source, Value::Float(3.0));
}

#[test]
fn test_default_and_named_arguments() {
    let source = r#"
        fn area(width: float, height: float = width): float { return width * height; }
        area(3.0) + area(height: 2.0, width: 5.0);
    "#;
    assert_value(source, Value::Float(19.0));
}

#[test]
fn test_objects_and_members() {
    let source = r#"
        let point = { x: 3, y: 4, "label": "p" };
        point.x * point.x + point["y"] * point.y;
    "#;
    assert_value(source, Value::Float(25.0));
}

// ============================================================
// Recursion
// ============================================================

#[test]
fn test_recursion_depth_is_fatal() {
    let source = r#"
        fn down(n: float): float { return 1 + down(n + 1); }
        down(0.0);
    "#;
    let config = VmConfig {
        max_call_depth: 100,
        ..VmConfig::default()
    };
    let run = run_captured(source, config);
    match &run.result {
        Err(PipelineError::Runtime(e)) => {
            assert_eq!(e.kind, RuntimeErrorKind::CallDepth(100));
            assert_eq!(e.call_stack.len(), 100);
            // repeated recursive frames print as one line
            assert!(e.to_string().lines().count() <= 4, "{}", e);
        }
        other => panic!("expected call depth error, got {:?}", other),
    }
    let fatal = run
        .diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::R0001)
        .expect("fatal diagnostic recorded");
    assert_eq!(fatal.span.line, 2);
}

#[test]
fn test_tail_calls_do_not_grow_the_call_stack() {
    let source = r#"
        fn count(n: float, acc: float): float {
            if n <= 0 { return acc; }
            return count(n - 1, acc + n);
        }
        count(5000.0, 0.0);
    "#;
    let run = run_captured(source, VmConfig::default());
    assert_eq!(run.result.expect("runs"), Some(Value::Float(12_502_500.0)));
    assert!(run.vm.peak_frames() <= 2, "peak frames: {}", run.vm.peak_frames());
}

// ============================================================
// Intrinsics
// ============================================================

#[test]
fn test_print_output_is_captured() {
    let run = run_captured(
        r#"print("hello"); print(1 + 2); print(len("abc")); print(str('q') + "!");"#,
        VmConfig::default(),
    );
    run.result.expect("runs");
    assert_eq!(run.text, "hello\n3.0\n3\nq!\n");
}

#[test]
fn test_failed_assert() {
    let run = run_captured(r#"assert(1 > 2, "math is broken");"#, VmConfig::default());
    match run.result {
        Err(PipelineError::Runtime(e)) => {
            assert_eq!(e.kind, RuntimeErrorKind::AssertFailed("math is broken".into()))
        }
        other => panic!("expected assertion failure, got {:?}", other),
    }
    assert!(run.diagnostics.contains(DiagnosticCode::R0009));
}

// ============================================================
// Binder and checker
// ============================================================

#[test]
fn test_binder_errors_are_all_reported() {
    let codes = compile_errors(r#"let x = 1; x = 2; "a" + 1; let y: string = 3;"#);
    assert!(codes.contains(&DiagnosticCode::B0002), "{:?}", codes);
    assert!(codes.contains(&DiagnosticCode::B0003), "{:?}", codes);
    assert!(codes.contains(&DiagnosticCode::T0001), "{:?}", codes);
}

#[test]
fn test_concatenation_is_a_string() {
    assert_value(r#"let s: string = "a" + 'b'; s;"#, Value::string("ab".to_string()));
    assert_value(r#"let s: string = 'x' + "y" + 'z'; len(s);"#, Value::Int(3));
}

#[test]
fn test_int_counter_cannot_be_incremented_by_addition() {
    // `i + 1` is a float and float is not assignable to int
    let codes = compile_errors("let mut i = 0; while i < 3 { i = i + 1; }");
    assert!(codes.contains(&DiagnosticCode::T0005), "{:?}", codes);
    // the float counter and `++` both compile
    assert_value("let mut i = 0.0; while i < 3 { i = i + 1; } i;", Value::Float(3.0));
    assert_value("let mut i = 0; while i < 3 { i++; } i;", Value::Int(3));
}

#[test]
fn test_return_type_is_checked() {
    let codes = compile_errors(r#"fn f(): int { return "no"; }"#);
    assert_eq!(codes, vec![DiagnosticCode::T0002]);
}

// ============================================================
// Binary format
// ============================================================

#[test]
fn test_compiled_programs_survive_serialization() {
    let source = r#"
        fn add(a: float, b: float = 1.0): float { return a + b; }
        let o = { k: add(2.0) };
        o.k + add(b: 4.0, a: 1.0);
    "#;
    let compiled = pipeline::compile(source, CompileOptions::default()).expect("compiles");
    let bytes = compiled.bytecode.to_bytes();
    let decoded = Bytecode::from_bytes(&bytes).expect("decodes");
    assert_eq!(decoded, compiled.bytecode);

    let mut vm = Vm::new();
    let result = pipeline::run_bytes(&bytes, &mut vm, &mut Diagnostics::new()).expect("runs");
    assert_eq!(result, Some(Value::Float(8.0)));
}

#[test]
fn test_bad_version_is_rejected() {
    let mut bytes = Bytecode::default().to_bytes();
    bytes[0] = 99;
    assert!(matches!(
        pipeline::run_bytes(&bytes, &mut Vm::new(), &mut Diagnostics::new()),
        Err(PipelineError::Decode(_))
    ));
}
