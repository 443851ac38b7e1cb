use crate::bytecode::{Bytecode, Instruction, Opcode, Operand};
use std::collections::HashSet;
use std::fmt::Write;

/// Renders a program and every nested body it contains.
pub fn disassemble(code: &Bytecode) -> String {
    let mut out = String::new();
    out.push_str("=== BYTECODE PROGRAM ===\n\n");
    write_block(&mut out, "main", code, 0);
    out
}

fn write_block(out: &mut String, name: &str, code: &Bytecode, indent: usize) {
    let prefix = "  ".repeat(indent);
    let _ = writeln!(out, "{}════════════════════════════════════════", prefix);
    let _ = writeln!(out, "{} {}", prefix, name);
    let _ = writeln!(out, "{} {} instructions", prefix, code.len());
    let _ = writeln!(out, "{}════════════════════════════════════════", prefix);
    disassemble_ops(out, code, indent);
}

/// Appends one line per instruction. Jump targets get a marker.
pub fn disassemble_ops(out: &mut String, code: &Bytecode, indent: usize) {
    let jump_targets = collect_jump_targets(code);
    let prefix = "  ".repeat(indent);

    for (ip, instruction) in code.iter().enumerate() {
        if jump_targets.contains(&ip) {
            let _ = writeln!(out, "{}      ┌──────────────────────────────────", prefix);
        }
        let marker = if jump_targets.contains(&ip) { "► " } else { "  " };
        let _ = write!(out, "{}{:04} {}", prefix, ip, marker);
        write_instruction(out, instruction, ip, indent);
    }
}

fn collect_jump_targets(code: &Bytecode) -> HashSet<usize> {
    code.iter()
        .enumerate()
        .filter(|(_, i)| i.opcode.is_jump())
        .filter_map(|(ip, i)| {
            let offset = i.operand.as_offset()?;
            usize::try_from(ip as i64 + 1 + offset as i64).ok()
        })
        .collect()
}

fn write_instruction(out: &mut String, instruction: &Instruction, ip: usize, indent: usize) {
    let name = instruction.opcode.name();
    match (instruction.opcode, &instruction.operand) {
        (opcode, Operand::Int(offset)) if opcode.is_jump() => {
            let target = ip as i64 + 1 + *offset as i64;
            let direction = if *offset < 0 { "↑" } else { "↓" };
            let _ = writeln!(out, "{:<11} {:+} {} (→ {:04})", name, offset, direction, target);
        }
        (Opcode::Proc, Operand::Tuple(pair)) => {
            let params = match &pair.0 {
                Operand::List(params) => params
                    .iter()
                    .map(param_label)
                    .collect::<Vec<_>>()
                    .join(", "),
                other => format_operand(other),
            };
            let _ = writeln!(out, "{:<11} fn({})", name, params);
            if let Operand::List(params) = &pair.0 {
                for param in params {
                    if let Operand::Tuple(p) = param {
                        if let Operand::Bytecode(default) = &p.1 {
                            let label = format!("default {}", format_operand(&p.0));
                            write_block(out, &label, default, indent + 2);
                        }
                    }
                }
            }
            if let Operand::Bytecode(body) = &pair.1 {
                write_block(out, "body", body, indent + 2);
            }
        }
        (Opcode::Call, Operand::List(args)) => {
            let _ = writeln!(out, "{:<11} ; {} argument(s)", name, args.len());
            for (index, arg) in args.iter().enumerate() {
                if let Operand::Tuple(pair) = arg {
                    let label = match &pair.0 {
                        Operand::Str(name) => format!("arg {}", name),
                        _ => format!("arg #{}", index),
                    };
                    if let Operand::Bytecode(code) = &pair.1 {
                        write_block(out, &label, code, indent + 2);
                    }
                }
            }
        }
        (Opcode::PushObject, Operand::List(entries)) => {
            let _ = writeln!(out, "{:<11} ; {} propert(ies)", name, entries.len());
            for entry in entries {
                if let Operand::Tuple(pair) = entry {
                    if let Operand::Bytecode(key) = &pair.0 {
                        write_block(out, "key", key, indent + 2);
                    }
                    if let Operand::Bytecode(value) = &pair.1 {
                        write_block(out, "value", value, indent + 2);
                    }
                }
            }
        }
        (_, Operand::Null) => {
            let _ = writeln!(out, "{}", name);
        }
        (_, operand) => {
            let _ = writeln!(out, "{:<11} {}", name, format_operand(operand));
        }
    }
}

fn param_label(param: &Operand) -> String {
    match param {
        Operand::Tuple(pair) => match (&pair.0, &pair.1) {
            (Operand::Str(name), Operand::Null) => name.clone(),
            (Operand::Str(name), _) => format!("{}?", name),
            (other, _) => format_operand(other),
        },
        other => format_operand(other),
    }
}

/// Short form of an operand for a single line.
pub fn format_operand(operand: &Operand) -> String {
    match operand {
        Operand::Null => "null".to_string(),
        Operand::Bool(b) => b.to_string(),
        Operand::Int(n) => n.to_string(),
        Operand::Long(n) => n.to_string(),
        Operand::Double(n) => format!("{:?}", n),
        Operand::Str(s) => format!("{:?}", s),
        Operand::Char(c) => format!("{:?}", c),
        Operand::Bytecode(code) => format!("<{} instructions>", code.len()),
        Operand::List(items) => format!(
            "[{}]",
            items.iter().map(format_operand).collect::<Vec<_>>().join(", ")
        ),
        Operand::Tuple(pair) => format!("({}, {})", format_operand(&pair.0), format_operand(&pair.1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_targets_are_marked() {
        let code = Bytecode::new(vec![
            Instruction::with(Opcode::Push, Operand::Bool(true)),
            Instruction::with(Opcode::Jz, Operand::Int(1)),
            Instruction::with(Opcode::Push, Operand::Long(1)),
            Instruction::new(Opcode::Exit),
        ]);
        let text = disassemble(&code);
        assert!(text.contains("0003 ► EXIT"), "{}", text);
        assert!(text.contains("JZ          +1 ↓ (→ 0003)"), "{}", text);
        assert!(text.contains("PUSH        true"), "{}", text);
    }

    #[test]
    fn test_nested_bodies_are_rendered() {
        let body = Bytecode::new(vec![
            Instruction::with(Opcode::Push, Operand::Double(2.5)),
            Instruction::new(Opcode::Return),
        ]);
        let params = Operand::List(vec![Operand::tuple(Operand::Str("x".into()), Operand::Null)]);
        let code = Bytecode::new(vec![Instruction::with(
            Opcode::Proc,
            Operand::tuple(params, Operand::bytecode(body)),
        )]);
        let text = disassemble(&code);
        assert!(text.contains("PROC        fn(x)"), "{}", text);
        assert!(text.contains(" body"), "{}", text);
        assert!(text.contains("PUSH        2.5"), "{}", text);
        assert!(text.contains("RETURN"), "{}", text);
    }

    #[test]
    fn test_format_operand() {
        let pair = Operand::tuple(Operand::Str("a".into()), Operand::Char('z'));
        assert_eq!(format_operand(&pair), "(\"a\", 'z')");
        assert_eq!(format_operand(&Operand::List(vec![Operand::Long(1), Operand::Null])), "[1, null]");
    }
}
