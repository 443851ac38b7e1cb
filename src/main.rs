use std::{env, fs, path::Path, process};

use quill::bytecode::disasm::disassemble;
use quill::diagnostic::Diagnostics;
use quill::frontend::lexer::Lexer;
use quill::frontend::token_dumper::TokenDumper;
use quill::pipeline::{self, CompileOptions, PipelineError};
use quill::runtime::{Vm, VmConfig};
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quill=warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct Options {
    tokens_only: bool,
    no_color: bool,
    pretty: bool,
    bytecode: bool,
    json: bool,
    compile: CompileOptions,
    vm: VmConfig,
    emit: Option<String>,
}

fn main() {
    init_logging();
    let args: Vec<String> = env::args().collect();

    if args.len() == 1 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let options = parse_options(&args);

    // first non-flag argument that is not a flag value is the filename
    let filename = positional(&args);

    match filename {
        Some(filename) => {
            let ext = Path::new(filename).extension().and_then(|e| e.to_str());
            match ext {
                Some("qbc") => run_binary(filename, &options),
                Some("ql") => match fs::read_to_string(filename) {
                    Ok(source) => {
                        if options.tokens_only {
                            dump_tokens(&source, &options);
                        } else {
                            run_source(&source, &options);
                        }
                    }
                    Err(e) => {
                        eprintln!("Failed to read '{}': {}", filename, e);
                        process::exit(1);
                    }
                },
                _ => {
                    eprintln!("Error: expected a .ql or .qbc file, got {}", filename);
                    process::exit(1);
                }
            }
        }
        None => print_usage(),
    }
}

fn parse_options(args: &[String]) -> Options {
    let has = |flag: &str| args.iter().any(|a| a == flag);
    let value_of = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let mut vm = VmConfig::default();
    if let Some(depth) = value_of("--max-depth") {
        match depth.parse() {
            Ok(depth) => vm.max_call_depth = depth,
            Err(_) => {
                eprintln!("Error: --max-depth expects a number, got {}", depth);
                process::exit(1);
            }
        }
    }

    Options {
        tokens_only: has("--tokens"),
        no_color: has("--no-color"),
        pretty: has("--pretty"),
        bytecode: has("--bc") || has("--bytecode"),
        json: has("--json"),
        compile: CompileOptions {
            optimize: !has("--no-opt"),
        },
        vm,
        emit: value_of("--emit"),
    }
}

fn positional(args: &[String]) -> Option<&String> {
    let mut skip_next = false;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--emit" || arg == "--max-depth" {
            skip_next = true;
            continue;
        }
        if !arg.starts_with('-') {
            return Some(arg);
        }
    }
    None
}

fn print_usage() {
    println!("QUILL - statically checked scripting language");
    println!();
    println!("Usage:");
    println!("  quill <file.ql>                Compile and run a program");
    println!("  quill <file.qbc>               Run a compiled program");
    println!("  quill --tokens <file.ql>       Show tokens only (--no-color, --pretty)");
    println!("  quill --bc <file.ql>           Print the disassembly before running");
    println!("  quill --emit <out.qbc> <file>  Write the binary format instead of running");
    println!("  quill --no-opt <file.ql>       Skip constant folding");
    println!("  quill --json <file.ql>         Print diagnostics as JSON");
    println!("  quill --max-depth <n> <file>   Override the call depth limit");
    println!("  quill --help, -h               Show this help");
}

fn dump_tokens(source: &str, options: &Options) {
    match Lexer::new(source).tokenize() {
        Ok(tokens) => {
            let mut dumper = TokenDumper::new();
            if options.no_color {
                dumper = dumper.no_color();
            }
            if options.pretty {
                dumper = dumper.pretty();
            }
            print!("{}", dumper.dump(&tokens));
        }
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            process::exit(1);
        }
    }
}

fn report(diagnostics: &Diagnostics, json: bool) {
    if diagnostics.is_empty() {
        return;
    }
    if json {
        match diagnostics.to_json() {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to encode diagnostics: {}", e),
        }
    } else {
        eprintln!("{}", diagnostics);
    }
}

fn fail(error: PipelineError, json: bool) -> ! {
    match error {
        PipelineError::Diagnostics(diagnostics) => report(&diagnostics, json),
        other => eprintln!("{}", other),
    }
    process::exit(1);
}

fn run_source(source: &str, options: &Options) {
    let compiled = match pipeline::compile(source, options.compile) {
        Ok(compiled) => compiled,
        Err(e) => fail(e, options.json),
    };
    report(&compiled.diagnostics, options.json);

    if options.bytecode {
        print!("{}", disassemble(&compiled.bytecode));
    }

    if let Some(out) = &options.emit {
        if let Err(e) = fs::write(out, compiled.bytecode.to_bytes()) {
            eprintln!("Failed to write '{}': {}", out, e);
            process::exit(1);
        }
        return;
    }

    let mut vm = Vm::with_config(options.vm.clone()).with_spans(compiled.spans());
    let mut diagnostics = Diagnostics::new();
    let result = vm.run(&compiled.bytecode, &mut diagnostics);
    finish(&diagnostics, result.map_err(PipelineError::from), options.json);
}

fn run_binary(filename: &str, options: &Options) {
    let bytes = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => fail(e.into(), options.json),
    };
    if options.bytecode {
        match quill::bytecode::Bytecode::from_bytes(&bytes) {
            Ok(code) => print!("{}", disassemble(&code)),
            Err(e) => fail(e.into(), options.json),
        }
    }
    let mut vm = Vm::with_config(options.vm.clone());
    let mut diagnostics = Diagnostics::new();
    let result = pipeline::run_bytes(&bytes, &mut vm, &mut diagnostics);
    finish(&diagnostics, result, options.json);
}

fn finish(diagnostics: &Diagnostics, result: Result<Option<quill::lang::value::Value>, PipelineError>, json: bool) {
    if let Err(e) = result {
        if json {
            report(diagnostics, true);
        } else {
            eprintln!("{}", e);
        }
        process::exit(1);
    }
    report(diagnostics, json);
}
