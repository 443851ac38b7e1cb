//! Peephole constant folding over instruction sequences.
//!
//! One forward pass. Every emitted instruction is pushed onto an output
//! buffer and the buffer tail is re-examined until it no longer matches
//! `PUSH c, PUSH c, <binary>` or `PUSH c, <unary>`, so chains such as
//! `PUSH 1 PUSH 2 ADD PUSH 3 ADD` collapse to one `PUSH`.
//!
//! A window is only folded when none of its instructions after the first is
//! a jump target. Relative jump offsets are recomputed at the end.

use crate::bytecode::fold;
use crate::bytecode::{Bytecode, Instruction, Opcode, Operand};
use std::collections::HashSet;
use tracing::{debug, trace};

/// Returns a folded copy of `code`. Nested programs in operands are
/// optimized first, each as an independent unit.
pub fn optimize(code: &Bytecode) -> Bytecode {
    let targets = jump_targets(code);

    // output instruction plus the index of the input instruction it started at
    let mut out: Vec<(Instruction, usize)> = Vec::with_capacity(code.len());
    // input index -> output index
    let mut new_pos = Vec::with_capacity(code.len() + 1);

    for (ip, instruction) in code.iter().enumerate() {
        new_pos.push(out.len());
        let instruction = Instruction {
            opcode: instruction.opcode,
            operand: optimize_operand(&instruction.operand),
            source: instruction.source,
        };
        out.push((instruction, ip));
        while fold_tail(&mut out, &targets) {}
    }
    new_pos.push(out.len());

    let folded = code.len() - out.len();
    let instructions = relocate_jumps(out, &new_pos);
    if folded > 0 {
        debug!(before = code.len(), after = instructions.len(), "optimize");
    }
    Bytecode::new(instructions)
}

fn optimize_operand(operand: &Operand) -> Operand {
    match operand {
        Operand::Bytecode(nested) => Operand::bytecode(optimize(nested)),
        Operand::List(items) => Operand::List(items.iter().map(optimize_operand).collect()),
        Operand::Tuple(pair) => Operand::tuple(optimize_operand(&pair.0), optimize_operand(&pair.1)),
        other => other.clone(),
    }
}

/// Absolute input indices that some jump lands on.
fn jump_targets(code: &Bytecode) -> HashSet<usize> {
    code.iter()
        .enumerate()
        .filter(|(_, i)| i.opcode.is_jump())
        .filter_map(|(ip, i)| target(ip, i.operand.as_offset()?, code.len()))
        .collect()
}

fn target(ip: usize, offset: i32, len: usize) -> Option<usize> {
    let target = ip as i64 + 1 + offset as i64;
    (0..=len as i64).contains(&target).then_some(target as usize)
}

fn constant_at(out: &[(Instruction, usize)], index: usize) -> Option<crate::lang::value::Value> {
    let (instruction, _) = &out[index];
    if instruction.opcode != Opcode::Push {
        return None;
    }
    fold::constant(&instruction.operand)
}

/// Folds one window at the end of `out`. Returns whether anything changed.
fn fold_tail(out: &mut Vec<(Instruction, usize)>, targets: &HashSet<usize>) -> bool {
    let len = out.len();
    let Some((last, _)) = out.last() else {
        return false;
    };
    let opcode = last.opcode;
    let source = last.source;

    let (width, value) = if opcode.is_binary() && len >= 3 {
        if out[len - 2..].iter().any(|(_, origin)| targets.contains(origin)) {
            return false;
        }
        let (Some(left), Some(right)) = (constant_at(out, len - 3), constant_at(out, len - 2)) else {
            return false;
        };
        (3, fold::binary(opcode, &left, &right))
    } else if opcode.is_unary() && len >= 2 {
        if targets.contains(&out[len - 1].1) {
            return false;
        }
        let Some(operand) = constant_at(out, len - 2) else {
            return false;
        };
        (2, fold::unary(opcode, &operand))
    } else {
        return false;
    };

    // errors such as division by zero are left for the VM to report
    let Some(operand) = value.ok().and_then(|v| fold::operand(&v)) else {
        return false;
    };
    let origin = out[len - width].1;
    out.truncate(len - width);
    trace!(%opcode, ?operand, "folded");
    out.push((
        Instruction {
            opcode: Opcode::Push,
            operand,
            source,
        },
        origin,
    ));
    true
}

fn relocate_jumps(out: Vec<(Instruction, usize)>, new_pos: &[usize]) -> Vec<Instruction> {
    let input_len = new_pos.len() - 1;
    out.into_iter()
        .enumerate()
        .map(|(index, (mut instruction, origin))| {
            if instruction.opcode.is_jump() {
                let relocated = instruction
                    .operand
                    .as_offset()
                    .and_then(|offset| target(origin, offset, input_len))
                    .map(|t| new_pos[t] as i64 - (index as i64 + 1));
                if let Some(offset) = relocated {
                    instruction.operand = Operand::Int(offset as i32);
                }
            }
            instruction
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(operand: Operand) -> Instruction {
        Instruction::with(Opcode::Push, operand)
    }

    fn op(opcode: Opcode) -> Instruction {
        Instruction::new(opcode)
    }

    fn jump(opcode: Opcode, offset: i32) -> Instruction {
        Instruction::with(opcode, Operand::Int(offset))
    }

    #[test]
    fn test_folds_addition_to_float() {
        let code = Bytecode::new(vec![
            push(Operand::Long(1)),
            push(Operand::Long(2)),
            op(Opcode::Add),
        ]);
        assert_eq!(optimize(&code), Bytecode::new(vec![push(Operand::Double(3.0))]));
    }

    #[test]
    fn test_folds_chains() {
        let code = Bytecode::new(vec![
            push(Operand::Long(1)),
            push(Operand::Long(2)),
            op(Opcode::Add),
            push(Operand::Long(3)),
            op(Opcode::Add),
            op(Opcode::Exit),
        ]);
        assert_eq!(
            optimize(&code),
            Bytecode::new(vec![push(Operand::Double(6.0)), op(Opcode::Exit)])
        );
    }

    #[test]
    fn test_folds_logic_unary_and_concat() {
        let code = Bytecode::new(vec![
            push(Operand::Bool(true)),
            push(Operand::Bool(false)),
            op(Opcode::And),
        ]);
        assert_eq!(optimize(&code), Bytecode::new(vec![push(Operand::Bool(false))]));

        let code = Bytecode::new(vec![push(Operand::Long(7)), op(Opcode::BNot)]);
        assert_eq!(optimize(&code), Bytecode::new(vec![push(Operand::Long(-8))]));

        let code = Bytecode::new(vec![
            push(Operand::Str("ab".into())),
            push(Operand::Char('c')),
            op(Opcode::Add),
        ]);
        assert_eq!(optimize(&code), Bytecode::new(vec![push(Operand::Str("abc".into()))]));
    }

    #[test]
    fn test_leaves_failing_folds_alone() {
        let code = Bytecode::new(vec![
            push(Operand::Long(1)),
            push(Operand::Long(0)),
            op(Opcode::IDiv),
        ]);
        assert_eq!(optimize(&code), code);

        let code = Bytecode::new(vec![
            push(Operand::Str("a".into())),
            push(Operand::Long(1)),
            op(Opcode::Sub),
        ]);
        assert_eq!(optimize(&code), code);
    }

    #[test]
    fn test_does_not_fold_across_variable_loads() {
        let code = Bytecode::new(vec![
            push(Operand::Long(1)),
            push(Operand::Str("x".into())),
            op(Opcode::Load),
            op(Opcode::Add),
        ]);
        assert_eq!(optimize(&code), code);
    }

    #[test]
    fn test_recurses_into_nested_bodies() {
        let body = Bytecode::new(vec![
            push(Operand::Long(2)),
            push(Operand::Long(3)),
            op(Opcode::Mul),
            op(Opcode::Return),
        ]);
        let code = Bytecode::new(vec![Instruction::with(
            Opcode::Proc,
            Operand::tuple(Operand::List(vec![]), Operand::bytecode(body)),
        )]);

        let optimized = optimize(&code);
        let expected_body = Bytecode::new(vec![push(Operand::Double(6.0)), op(Opcode::Return)]);
        let expected = Bytecode::new(vec![Instruction::with(
            Opcode::Proc,
            Operand::tuple(Operand::List(vec![]), Operand::bytecode(expected_body)),
        )]);
        assert_eq!(optimized, expected);
    }

    #[test]
    fn test_jump_offsets_are_recomputed() {
        // JZ skips the folded window and lands on EXIT
        let code = Bytecode::new(vec![
            push(Operand::Bool(true)),
            jump(Opcode::Jz, 3),
            push(Operand::Long(1)),
            push(Operand::Long(2)),
            op(Opcode::Add),
            op(Opcode::Exit),
        ]);
        assert_eq!(
            optimize(&code),
            Bytecode::new(vec![
                push(Operand::Bool(true)),
                jump(Opcode::Jz, 1),
                push(Operand::Double(3.0)),
                op(Opcode::Exit),
            ])
        );
    }

    #[test]
    fn test_backward_jumps_are_recomputed() {
        let code = Bytecode::new(vec![
            push(Operand::Long(1)),
            push(Operand::Long(1)),
            op(Opcode::Add),
            op(Opcode::Pop),
            jump(Opcode::Jmp, -5),
        ]);
        assert_eq!(
            optimize(&code),
            Bytecode::new(vec![
                push(Operand::Double(2.0)),
                op(Opcode::Pop),
                jump(Opcode::Jmp, -3),
            ])
        );
    }

    #[test]
    fn test_jump_target_inside_window_blocks_fold() {
        let code = Bytecode::new(vec![
            push(Operand::Bool(false)),
            jump(Opcode::Jz, 1),
            push(Operand::Long(2)),
            push(Operand::Long(3)),
            op(Opcode::Add),
        ]);
        assert_eq!(optimize(&code), code);
    }
}
