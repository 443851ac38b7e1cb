//! Binary bytecode format.
//!
//! ```text
//! file    := version:u8 block
//! block   := count:u32le instr*
//! instr   := opcode:u8 operand
//! operand := tag:u8 payload
//! ```
//!
//! All integers are little-endian. Nested programs are encoded as blocks
//! without their own version byte.

use crate::bytecode::{Bytecode, Instruction, Opcode, Operand};
use std::io::{self, Read, Write};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

mod tag {
    pub const NULL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const INT: u8 = 2;
    pub const LONG: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const STR: u8 = 5;
    pub const CHAR: u8 = 6;
    pub const BYTECODE: u8 = 7;
    pub const LIST: u8 = 8;
    pub const TUPLE: u8 = 9;
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported bytecode version {0} (expected {expected})", expected = Bytecode::VERSION)]
    UnsupportedVersion(u8),
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("unknown operand tag {0}")]
    UnknownTag(u8),
    #[error("string operand is not valid UTF-8")]
    InvalidUtf8,
    #[error("char operand is not a valid code point")]
    InvalidChar,
    #[error("operands nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Deepest nesting of block, list and tuple operands a decoder accepts.
pub const MAX_NESTING: usize = 256;

fn wr_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}
fn wr_u32le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn rd_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}
fn rd_u32le<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}
fn rd_array<R: Read, const N: usize>(r: &mut R) -> io::Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

impl Bytecode {
    /// Writes the version header followed by this program.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        wr_u8(w, Bytecode::VERSION)?;
        write_block(w, self)
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Bytecode, DecodeError> {
        let version = rd_u8(r)?;
        if version != Bytecode::VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let code = read_block(r, 0)?;
        debug!(instructions = code.len(), "decoded bytecode");
        Ok(code)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_to(&mut out);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Bytecode, DecodeError> {
        let mut cursor = bytes;
        Bytecode::read_from(&mut cursor)
    }
}

fn write_block<W: Write>(w: &mut W, code: &Bytecode) -> io::Result<()> {
    wr_u32le(w, code.len() as u32)?;
    for instruction in code.iter() {
        wr_u8(w, instruction.opcode.as_u8())?;
        write_operand(w, &instruction.operand)?;
    }
    Ok(())
}

fn write_operand<W: Write>(w: &mut W, operand: &Operand) -> io::Result<()> {
    match operand {
        Operand::Null => wr_u8(w, tag::NULL),
        Operand::Bool(b) => {
            wr_u8(w, tag::BOOL)?;
            wr_u8(w, *b as u8)
        }
        Operand::Int(n) => {
            wr_u8(w, tag::INT)?;
            w.write_all(&n.to_le_bytes())
        }
        Operand::Long(n) => {
            wr_u8(w, tag::LONG)?;
            w.write_all(&n.to_le_bytes())
        }
        Operand::Double(n) => {
            wr_u8(w, tag::DOUBLE)?;
            w.write_all(&n.to_le_bytes())
        }
        Operand::Str(s) => {
            wr_u8(w, tag::STR)?;
            wr_u32le(w, s.len() as u32)?;
            w.write_all(s.as_bytes())
        }
        Operand::Char(c) => {
            wr_u8(w, tag::CHAR)?;
            let mut buf = [0u8; 4];
            w.write_all(c.encode_utf8(&mut buf).as_bytes())
        }
        Operand::Bytecode(code) => {
            wr_u8(w, tag::BYTECODE)?;
            write_block(w, code)
        }
        Operand::List(items) => {
            wr_u8(w, tag::LIST)?;
            wr_u32le(w, items.len() as u32)?;
            for item in items {
                write_operand(w, item)?;
            }
            Ok(())
        }
        Operand::Tuple(pair) => {
            wr_u8(w, tag::TUPLE)?;
            write_operand(w, &pair.0)?;
            write_operand(w, &pair.1)
        }
    }
}

fn read_block<R: Read>(r: &mut R, depth: usize) -> Result<Bytecode, DecodeError> {
    let count = rd_u32le(r)? as usize;
    // the count is untrusted; grow as instructions actually arrive
    let mut instructions = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let byte = rd_u8(r)?;
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::UnknownOpcode(byte))?;
        let operand = read_operand(r, depth)?;
        instructions.push(Instruction::with(opcode, operand));
    }
    Ok(Bytecode::new(instructions))
}

/// `depth` counts the enclosing block, list and tuple operands.
fn read_operand<R: Read>(r: &mut R, depth: usize) -> Result<Operand, DecodeError> {
    let kind = rd_u8(r)?;
    let nested = depth + 1;
    if matches!(kind, tag::BYTECODE | tag::LIST | tag::TUPLE) && nested > MAX_NESTING {
        return Err(DecodeError::TooDeep(MAX_NESTING));
    }
    let operand = match kind {
        tag::NULL => Operand::Null,
        tag::BOOL => Operand::Bool(rd_u8(r)? != 0),
        tag::INT => Operand::Int(i32::from_le_bytes(rd_array(r)?)),
        tag::LONG => Operand::Long(i64::from_le_bytes(rd_array(r)?)),
        tag::DOUBLE => Operand::Double(f64::from_le_bytes(rd_array(r)?)),
        tag::STR => {
            let len = rd_u32le(r)? as usize;
            let mut bytes = Vec::new();
            Read::take(&mut *r, len as u64).read_to_end(&mut bytes)?;
            if bytes.len() != len {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            Operand::Str(String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?)
        }
        tag::CHAR => Operand::Char(read_char(r)?),
        tag::BYTECODE => Operand::Bytecode(Rc::new(read_block(r, nested)?)),
        tag::LIST => {
            let len = rd_u32le(r)? as usize;
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(read_operand(r, nested)?);
            }
            Operand::List(items)
        }
        tag::TUPLE => {
            let first = read_operand(r, nested)?;
            let second = read_operand(r, nested)?;
            Operand::tuple(first, second)
        }
        other => return Err(DecodeError::UnknownTag(other)),
    };
    Ok(operand)
}

/// One UTF-8 encoded code point; the lead byte gives the width.
fn read_char<R: Read>(r: &mut R) -> Result<char, DecodeError> {
    let mut buf = [0u8; 4];
    buf[0] = rd_u8(r)?;
    let width = match buf[0] {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => return Err(DecodeError::InvalidChar),
    };
    r.read_exact(&mut buf[1..width])?;
    std::str::from_utf8(&buf[..width])
        .ok()
        .and_then(|s| s.chars().next())
        .ok_or(DecodeError::InvalidChar)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(code: &Bytecode) -> Bytecode {
        Bytecode::from_bytes(&code.to_bytes()).expect("decode should succeed")
    }

    #[test]
    fn test_single_push() {
        let code = Bytecode::new(vec![Instruction::with(Opcode::Push, Operand::Long(42))]);
        let bytes = code.to_bytes();
        // version, count, opcode, tag, 8 payload bytes
        assert_eq!(bytes.len(), 1 + 4 + 1 + 1 + 8);
        assert_eq!(bytes[0], Bytecode::VERSION);
        assert_eq!(round_trip(&code), code);
    }

    #[test]
    fn test_arithmetic_sequence() {
        let code = Bytecode::new(vec![
            Instruction::with(Opcode::Push, Operand::Double(1.5)),
            Instruction::with(Opcode::Push, Operand::Long(-2)),
            Instruction::new(Opcode::Mul),
        ]);
        assert_eq!(round_trip(&code), code);
    }

    #[test]
    fn test_nested_proc_and_call_metadata() {
        let body = Bytecode::new(vec![
            Instruction::with(Opcode::Push, Operand::Str("n".into())),
            Instruction::new(Opcode::Load),
            Instruction::with(Opcode::Push, Operand::Char('é')),
            Instruction::with(Opcode::Jz, Operand::Int(-3)),
            Instruction::new(Opcode::Return),
        ]);
        let default = Bytecode::new(vec![Instruction::with(Opcode::Push, Operand::Bool(true))]);
        let params = Operand::List(vec![
            Operand::tuple(Operand::Str("n".into()), Operand::Null),
            Operand::tuple(Operand::Str("flag".into()), Operand::bytecode(default)),
        ]);
        let code = Bytecode::new(vec![
            Instruction::with(Opcode::Proc, Operand::tuple(params, Operand::bytecode(body))),
            Instruction::with(Opcode::Push, Operand::Str("ünïcode 🦀".into())),
            Instruction::new(Opcode::PushNone),
            Instruction::new(Opcode::Exit),
        ]);
        assert_eq!(round_trip(&code), code);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            Bytecode::from_bytes(&[9, 0, 0, 0, 0]),
            Err(DecodeError::UnsupportedVersion(9))
        ));
        assert!(matches!(
            Bytecode::from_bytes(&[Bytecode::VERSION, 1, 0, 0, 0, 0xff, 0]),
            Err(DecodeError::UnknownOpcode(0xff))
        ));
        assert!(matches!(
            Bytecode::from_bytes(&[Bytecode::VERSION, 1, 0, 0, 0, 1, 42]),
            Err(DecodeError::UnknownTag(42))
        ));
        assert!(matches!(
            Bytecode::from_bytes(&[Bytecode::VERSION, 1, 0, 0, 0]),
            Err(DecodeError::Io(_))
        ));
    }

    /// `[count=1, PUSH, BYTECODE]` repeated, each block opening the next.
    fn nested_blocks(levels: usize) -> Vec<u8> {
        let mut bytes = vec![Bytecode::VERSION];
        for _ in 0..levels {
            bytes.extend_from_slice(&1u32.to_le_bytes());
            bytes.push(Opcode::Push.as_u8());
            bytes.push(tag::BYTECODE);
        }
        // innermost block is empty
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes
    }

    #[test]
    fn test_nesting_limit() {
        assert!(Bytecode::from_bytes(&nested_blocks(MAX_NESTING)).is_ok());
        assert!(matches!(
            Bytecode::from_bytes(&nested_blocks(MAX_NESTING + 1)),
            Err(DecodeError::TooDeep(MAX_NESTING))
        ));
        // far past the limit fails fast instead of exhausting the stack
        assert!(matches!(
            Bytecode::from_bytes(&nested_blocks(200_000)),
            Err(DecodeError::TooDeep(_))
        ));
    }

    #[test]
    fn test_nested_lists_count_toward_the_limit() {
        let mut bytes = vec![Bytecode::VERSION];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(Opcode::Call.as_u8());
        for _ in 0..=MAX_NESTING {
            bytes.push(tag::LIST);
            bytes.extend_from_slice(&1u32.to_le_bytes());
        }
        bytes.push(tag::NULL);
        assert!(matches!(
            Bytecode::from_bytes(&bytes),
            Err(DecodeError::TooDeep(MAX_NESTING))
        ));
    }
}
