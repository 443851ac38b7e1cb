//! Operator semantics shared by the constant folder and the VM.
//!
//! Binary operators are dispatched by operand shape: string/char
//! concatenation, generic equality, floating-point arithmetic and
//! comparison, 64-bit integer bitwise ops, 32-bit shifts and boolean logic
//! each have their own opcode-keyed table.

use crate::bytecode::Opcode;
use crate::bytecode::ir::Operand;
use crate::lang::value::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FoldError {
    #[error("operator {op} cannot be applied to {left} and {right}")]
    BinaryMismatch {
        op: Opcode,
        left: &'static str,
        right: &'static str,
    },
    #[error("operator {op} cannot be applied to {operand}")]
    UnaryMismatch { op: Opcode, operand: &'static str },
    #[error("division by zero")]
    DivisionByZero,
}

type FloatFn = fn(f64, f64) -> f64;
type CompareFn = fn(f64, f64) -> bool;
type IntFn = fn(i64, i64) -> i64;
type ShiftFn = fn(i32, i32) -> i32;
type LogicFn = fn(bool, bool) -> bool;

fn float_table(op: Opcode) -> Option<FloatFn> {
    let f: FloatFn = match op {
        Opcode::Add => |a, b| a + b,
        Opcode::Sub => |a, b| a - b,
        Opcode::Mul => |a, b| a * b,
        Opcode::Div => |a, b| a / b,
        Opcode::Mod => |a, b| a % b,
        Opcode::Pow => f64::powf,
        _ => return None,
    };
    Some(f)
}

fn compare_table(op: Opcode) -> Option<CompareFn> {
    let f: CompareFn = match op {
        Opcode::Lt => |a, b| a < b,
        Opcode::Le => |a, b| a <= b,
        Opcode::Gt => |a, b| a > b,
        Opcode::Ge => |a, b| a >= b,
        _ => return None,
    };
    Some(f)
}

fn bitwise_table(op: Opcode) -> Option<IntFn> {
    let f: IntFn = match op {
        Opcode::BAnd => |a, b| a & b,
        Opcode::BOr => |a, b| a | b,
        Opcode::BXor => |a, b| a ^ b,
        _ => return None,
    };
    Some(f)
}

fn shift_table(op: Opcode) -> Option<ShiftFn> {
    let f: ShiftFn = match op {
        Opcode::Shl => |a, b| a.wrapping_shl(b as u32),
        Opcode::Shr => |a, b| a.wrapping_shr(b as u32),
        _ => return None,
    };
    Some(f)
}

fn logic_table(op: Opcode) -> Option<LogicFn> {
    let f: LogicFn = match op {
        Opcode::And => |a, b| a && b,
        Opcode::Or => |a, b| a || b,
        _ => return None,
    };
    Some(f)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.to_string()),
        Value::Char(c) => Some(c.to_string()),
        _ => None,
    }
}

/// Floored integer division.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Applies a binary opcode. `left` was pushed first.
pub fn binary(op: Opcode, left: &Value, right: &Value) -> Result<Value, FoldError> {
    let mismatch = || FoldError::BinaryMismatch {
        op,
        left: left.type_name(),
        right: right.type_name(),
    };

    if op == Opcode::Add {
        if let (Some(a), Some(b)) = (text(left), text(right)) {
            return Ok(Value::string(a + &b));
        }
    }

    match op {
        Opcode::Eq => return Ok(Value::Bool(left == right)),
        Opcode::Ne => return Ok(Value::Bool(left != right)),
        Opcode::IDiv => {
            return match (left, right) {
                (Value::Int(a), Value::Int(b)) => {
                    if *b == 0 {
                        Err(FoldError::DivisionByZero)
                    } else {
                        Ok(Value::Int(floor_div(*a, *b)))
                    }
                }
                _ => match (left.as_f64(), right.as_f64()) {
                    (Some(_), Some(b)) if b == 0.0 => Err(FoldError::DivisionByZero),
                    (Some(a), Some(b)) => Ok(Value::Int((a / b).floor() as i64)),
                    _ => Err(mismatch()),
                },
            };
        }
        _ => {}
    }

    if let Some(f) = float_table(op) {
        return match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(f(a, b))),
            _ => Err(mismatch()),
        };
    }
    if let Some(f) = compare_table(op) {
        return match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Bool(f(a, b))),
            _ => Err(mismatch()),
        };
    }
    if let Some(f) = bitwise_table(op) {
        return match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(f(*a, *b))),
            _ => Err(mismatch()),
        };
    }
    if let Some(f) = shift_table(op) {
        return match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(f(*a as i32, *b as i32) as i64)),
            _ => Err(mismatch()),
        };
    }
    if let Some(f) = logic_table(op) {
        return match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(f(*a, *b))),
            _ => Err(mismatch()),
        };
    }
    Err(mismatch())
}

/// Applies a unary opcode. Integers stay integers.
pub fn unary(op: Opcode, operand: &Value) -> Result<Value, FoldError> {
    let result = match (op, operand) {
        (Opcode::Neg, Value::Int(n)) => Value::Int(n.wrapping_neg()),
        (Opcode::Neg, Value::Float(n)) => Value::Float(-n),
        (Opcode::Pos, Value::Int(_) | Value::Float(_)) => operand.clone(),
        (Opcode::Not, Value::Bool(b)) => Value::Bool(!b),
        (Opcode::BNot, Value::Int(n)) => Value::Int(!n),
        (Opcode::Inc, Value::Int(n)) => Value::Int(n.wrapping_add(1)),
        (Opcode::Inc, Value::Float(n)) => Value::Float(n + 1.0),
        (Opcode::Dec, Value::Int(n)) => Value::Int(n.wrapping_sub(1)),
        (Opcode::Dec, Value::Float(n)) => Value::Float(n - 1.0),
        _ => {
            return Err(FoldError::UnaryMismatch {
                op,
                operand: operand.type_name(),
            });
        }
    };
    Ok(result)
}

/// Constant value of a `PUSH` operand. Nested programs and lists are not
/// constants.
pub fn constant(operand: &Operand) -> Option<Value> {
    Some(match operand {
        Operand::Null => Value::None,
        Operand::Bool(b) => Value::Bool(*b),
        Operand::Int(n) => Value::Int(*n as i64),
        Operand::Long(n) => Value::Int(*n),
        Operand::Double(n) => Value::Float(*n),
        Operand::Str(s) => Value::string(s),
        Operand::Char(c) => Value::Char(*c),
        Operand::Bytecode(_) | Operand::List(_) | Operand::Tuple(_) => return None,
    })
}

/// Inverse of [`constant`] for scalar values.
pub fn operand(value: &Value) -> Option<Operand> {
    Some(match value {
        Value::None => Operand::Null,
        Value::Bool(b) => Operand::Bool(*b),
        Value::Int(n) => Operand::Long(*n),
        Value::Float(n) => Operand::Double(*n),
        Value::Str(s) => Operand::Str(s.to_string()),
        Value::Char(c) => Operand::Char(*c),
        Value::Object(_) | Value::Function(_) | Value::Intrinsic(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: Opcode, a: Value, b: Value) -> Value {
        binary(op, &a, &b).expect("fold should succeed")
    }

    #[test]
    fn test_arithmetic_is_floating_point() {
        assert_eq!(bin(Opcode::Add, Value::Int(1), Value::Int(2)), Value::Float(3.0));
        assert!(matches!(
            bin(Opcode::Mul, Value::Int(3), Value::Int(2)),
            Value::Float(_)
        ));
        assert_eq!(bin(Opcode::Pow, Value::Int(2), Value::Int(10)), Value::Float(1024.0));
        assert_eq!(bin(Opcode::Div, Value::Int(1), Value::Int(4)), Value::Float(0.25));
    }

    #[test]
    fn test_integer_division_floors() {
        assert!(matches!(bin(Opcode::IDiv, Value::Int(9), Value::Int(2)), Value::Int(4)));
        assert!(matches!(bin(Opcode::IDiv, Value::Int(-9), Value::Int(2)), Value::Int(-5)));
        assert!(matches!(
            bin(Opcode::IDiv, Value::Float(7.5), Value::Int(2)),
            Value::Int(3)
        ));
        assert_eq!(
            binary(Opcode::IDiv, &Value::Int(1), &Value::Int(0)),
            Err(FoldError::DivisionByZero)
        );
    }

    #[test]
    fn test_bitwise_and_shifts() {
        assert!(matches!(bin(Opcode::BAnd, Value::Int(6), Value::Int(3)), Value::Int(2)));
        assert!(matches!(bin(Opcode::BXor, Value::Int(6), Value::Int(3)), Value::Int(5)));
        assert!(matches!(bin(Opcode::Shl, Value::Int(1), Value::Int(4)), Value::Int(16)));
        // shifts operate on 32-bit integers
        assert!(matches!(
            bin(Opcode::Shl, Value::Int(1), Value::Int(31)),
            Value::Int(-2147483648)
        ));
        assert!(binary(Opcode::BOr, &Value::Float(1.0), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_concat_and_equality() {
        assert_eq!(
            bin(Opcode::Add, Value::string("ab"), Value::Char('c')),
            Value::string("abc")
        );
        assert_eq!(bin(Opcode::Eq, Value::Int(2), Value::Float(2.0)), Value::Bool(true));
        assert_eq!(bin(Opcode::Ne, Value::string("a"), Value::Int(1)), Value::Bool(true));
        assert!(binary(Opcode::Sub, &Value::string("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_logic_and_comparison() {
        assert_eq!(
            bin(Opcode::And, Value::Bool(true), Value::Bool(false)),
            Value::Bool(false)
        );
        assert_eq!(bin(Opcode::Le, Value::Int(2), Value::Float(2.0)), Value::Bool(true));
        assert!(binary(Opcode::Or, &Value::Int(1), &Value::Bool(true)).is_err());
    }

    #[test]
    fn test_unary() {
        assert!(matches!(unary(Opcode::BNot, &Value::Int(7)), Ok(Value::Int(-8))));
        assert!(matches!(unary(Opcode::Neg, &Value::Int(3)), Ok(Value::Int(-3))));
        assert!(matches!(unary(Opcode::Inc, &Value::Int(3)), Ok(Value::Int(4))));
        assert_eq!(unary(Opcode::Not, &Value::Bool(true)), Ok(Value::Bool(false)));
        assert!(unary(Opcode::Not, &Value::Int(0)).is_err());
    }
}
