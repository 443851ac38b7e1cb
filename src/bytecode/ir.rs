use crate::bytecode::Opcode;
use crate::lang::node::NodeId;
use std::rc::Rc;

/// Tagged instruction operand. Each variant maps to one tag of the binary
/// format.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Null,
    Bool(bool),
    /// Small integers: jump offsets.
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Char(char),
    /// A self-contained nested program (function bodies, argument and
    /// property sub-programs).
    Bytecode(Rc<Bytecode>),
    List(Vec<Operand>),
    Tuple(Box<(Operand, Operand)>),
}

impl Operand {
    pub fn tuple(a: Operand, b: Operand) -> Operand {
        Operand::Tuple(Box::new((a, b)))
    }

    pub fn bytecode(code: Bytecode) -> Operand {
        Operand::Bytecode(Rc::new(code))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Operand::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_offset(&self) -> Option<i32> {
        match self {
            Operand::Int(n) => Some(*n),
            _ => None,
        }
    }
}

/// A single instruction. `source` points back at the syntax node it was
/// generated from and only matters for diagnostics, so it is ignored by
/// equality and not serialized.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
    pub source: Option<NodeId>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand: Operand::Null,
            source: None,
        }
    }

    pub fn with(opcode: Opcode, operand: Operand) -> Self {
        Self {
            opcode,
            operand,
            source: None,
        }
    }

    pub fn at(mut self, source: NodeId) -> Self {
        self.source = Some(source);
        self
    }
}

impl PartialEq for Instruction {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode && self.operand == other.operand
    }
}

/// An ordered instruction sequence. Passes never edit one in place; they
/// build a new sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub instructions: Vec<Instruction>,
}

impl Bytecode {
    /// Version byte written at the head of the binary format.
    pub const VERSION: u8 = 1;

    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, ip: usize) -> Option<&Instruction> {
        self.instructions.get(ip)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }
}

impl FromIterator<Instruction> for Bytecode {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Bytecode::new(iter.into_iter().collect())
    }
}
