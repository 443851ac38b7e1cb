//! Operator resolution tables.
//!
//! Every operator the language accepts is one row here. Resolution filters
//! rows by syntax, keeps the ones whose operand types accept the actual
//! operand types, and takes the first, so row order is overload priority.

use crate::bytecode::Opcode;
use crate::lang::node::{BinaryOp, PostfixOp, UnaryOp};
use crate::types::Type;
use std::sync::LazyLock;

#[derive(Debug)]
pub struct BinaryOperator {
    pub syntax: BinaryOp,
    pub opcode: Opcode,
    pub left: Type,
    pub right: Type,
    pub result: Type,
}

#[derive(Debug)]
pub struct UnaryOperator {
    pub syntax: UnaryOp,
    pub opcode: Opcode,
    pub operand: Type,
    pub result: Type,
}

#[derive(Debug)]
pub struct PostfixOperator {
    pub syntax: PostfixOp,
    pub opcode: Opcode,
    pub operand: Type,
    pub result: Type,
}

fn number() -> Type {
    Type::union([Type::INT, Type::FLOAT])
}

fn text() -> Type {
    Type::union([Type::STRING, Type::CHAR])
}

fn binary(syntax: BinaryOp, opcode: Opcode, left: Type, right: Type, result: Type) -> BinaryOperator {
    BinaryOperator {
        syntax,
        opcode,
        left,
        right,
        result,
    }
}

static BINARY_OPERATORS: LazyLock<Vec<BinaryOperator>> = LazyLock::new(|| {
    use BinaryOp as B;
    let mut table = vec![binary(B::Add, Opcode::Add, text(), text(), Type::STRING)];

    for (syntax, opcode) in [
        (B::Add, Opcode::Add),
        (B::Sub, Opcode::Sub),
        (B::Mul, Opcode::Mul),
        (B::Div, Opcode::Div),
        (B::Mod, Opcode::Mod),
        (B::Pow, Opcode::Pow),
    ] {
        table.push(binary(syntax, opcode, number(), number(), Type::FLOAT));
    }
    table.push(binary(B::IntDiv, Opcode::IDiv, number(), number(), Type::INT));

    for (syntax, opcode) in [
        (B::BitAnd, Opcode::BAnd),
        (B::BitOr, Opcode::BOr),
        (B::BitXor, Opcode::BXor),
        (B::Shl, Opcode::Shl),
        (B::Shr, Opcode::Shr),
    ] {
        table.push(binary(syntax, opcode, Type::INT, Type::INT, Type::INT));
    }

    table.push(binary(B::And, Opcode::And, Type::BOOL, Type::BOOL, Type::BOOL));
    table.push(binary(B::Or, Opcode::Or, Type::BOOL, Type::BOOL, Type::BOOL));
    table.push(binary(B::Eq, Opcode::Eq, Type::Any, Type::Any, Type::BOOL));
    table.push(binary(B::NotEq, Opcode::Ne, Type::Any, Type::Any, Type::BOOL));

    for (syntax, opcode) in [
        (B::Lt, Opcode::Lt),
        (B::LtEq, Opcode::Le),
        (B::Gt, Opcode::Gt),
        (B::GtEq, Opcode::Ge),
    ] {
        table.push(binary(syntax, opcode, number(), number(), Type::BOOL));
    }
    table
});

static UNARY_OPERATORS: LazyLock<Vec<UnaryOperator>> = LazyLock::new(|| {
    let row = |syntax, opcode, operand: Type, result: Type| UnaryOperator {
        syntax,
        opcode,
        operand,
        result,
    };
    vec![
        row(UnaryOp::Negate, Opcode::Neg, Type::INT, Type::INT),
        row(UnaryOp::Negate, Opcode::Neg, Type::FLOAT, Type::FLOAT),
        row(UnaryOp::Plus, Opcode::Pos, Type::INT, Type::INT),
        row(UnaryOp::Plus, Opcode::Pos, Type::FLOAT, Type::FLOAT),
        row(UnaryOp::Not, Opcode::Not, Type::BOOL, Type::BOOL),
        row(UnaryOp::BitNot, Opcode::BNot, Type::INT, Type::INT),
    ]
});

static POSTFIX_OPERATORS: LazyLock<Vec<PostfixOperator>> = LazyLock::new(|| {
    let row = |syntax, opcode, operand: Type| PostfixOperator {
        syntax,
        opcode,
        result: operand.clone(),
        operand,
    };
    vec![
        row(PostfixOp::Increment, Opcode::Inc, Type::INT),
        row(PostfixOp::Increment, Opcode::Inc, Type::FLOAT),
        row(PostfixOp::Decrement, Opcode::Dec, Type::INT),
        row(PostfixOp::Decrement, Opcode::Dec, Type::FLOAT),
    ]
});

pub fn resolve_binary(syntax: BinaryOp, left: &Type, right: &Type) -> Option<&'static BinaryOperator> {
    BINARY_OPERATORS
        .iter()
        .filter(|op| op.syntax == syntax)
        .find(|op| left.is_assignable_to(&op.left) && right.is_assignable_to(&op.right))
}

pub fn resolve_unary(syntax: UnaryOp, operand: &Type) -> Option<&'static UnaryOperator> {
    UNARY_OPERATORS
        .iter()
        .filter(|op| op.syntax == syntax)
        .find(|op| operand.is_assignable_to(&op.operand))
}

pub fn resolve_postfix(syntax: PostfixOp, operand: &Type) -> Option<&'static PostfixOperator> {
    POSTFIX_OPERATORS
        .iter()
        .filter(|op| op.syntax == syntax)
        .find(|op| operand.is_assignable_to(&op.operand))
}
