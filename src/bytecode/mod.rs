pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod fold;
pub mod ir;
pub mod op;
pub mod optimize;
pub mod serialize;

pub use ir::{Bytecode, Instruction, Operand};
pub use op::Opcode;
