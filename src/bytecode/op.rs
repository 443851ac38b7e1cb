// =============================================================================
// OPCODE - Bytecode instruction set
// =============================================================================

/// Stack machine opcodes.
///
/// The discriminant is the opcode byte in the binary format, so variants
/// must never be reordered. Stack effects are written `( before -- after )`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Stop the evaluation loop.
    Exit = 0,

    // literals
    /// `( -- v )` operand is the constant.
    Push,
    /// `( -- none )`
    PushNone,
    /// `( -- obj )` operand: `List[Tuple(key-program, value-program)]`.
    PushObject,

    // stack & variables
    /// `( v -- )`
    Pop,
    /// `( name -- v )`
    Load,
    /// `( v name -- v )` assigns to the nearest declaring scope, or defines.
    Store,
    /// `( v name -- )` defines in the current scope.
    Define,
    /// `( obj key -- v )`
    GetMember,

    // arithmetic ( a b -- c )
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,

    // bitwise ( a b -- c )
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,

    // logic ( a b -- c )
    And,
    Or,

    // comparison ( a b -- bool )
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // unary ( a -- b )
    Neg,
    Pos,
    Not,
    BNot,
    Inc,
    Dec,

    // ==========================================================================
    // Control flow. Offsets are relative to the following instruction.
    // ==========================================================================
    /// Unconditional jump.
    Jmp,
    /// `( cond -- )` jump when `cond` is falsy.
    Jz,
    /// `( cond -- )` jump when `cond` is truthy.
    Jnz,

    // functions
    /// `( -- fn )` operand: `Tuple(List[Tuple(name, default|Null)], body)`.
    Proc,
    /// `( fn -- result )` operand: `List[Tuple(name|Null, arg-program)]`.
    Call,
    /// `( result -- result )` leave the current function.
    Return,

    // scopes
    BeginScope,
    EndScope,
}

impl Opcode {
    pub const ALL: [Opcode; 43] = [
        Opcode::Exit,
        Opcode::Push,
        Opcode::PushNone,
        Opcode::PushObject,
        Opcode::Pop,
        Opcode::Load,
        Opcode::Store,
        Opcode::Define,
        Opcode::GetMember,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::IDiv,
        Opcode::Mod,
        Opcode::Pow,
        Opcode::BAnd,
        Opcode::BOr,
        Opcode::BXor,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::And,
        Opcode::Or,
        Opcode::Eq,
        Opcode::Ne,
        Opcode::Lt,
        Opcode::Le,
        Opcode::Gt,
        Opcode::Ge,
        Opcode::Neg,
        Opcode::Pos,
        Opcode::Not,
        Opcode::BNot,
        Opcode::Inc,
        Opcode::Dec,
        Opcode::Jmp,
        Opcode::Jz,
        Opcode::Jnz,
        Opcode::Proc,
        Opcode::Call,
        Opcode::Return,
        Opcode::BeginScope,
        Opcode::EndScope,
    ];

    pub fn from_u8(byte: u8) -> Option<Opcode> {
        Opcode::ALL.get(byte as usize).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Exit => "EXIT",
            Opcode::Push => "PUSH",
            Opcode::PushNone => "PUSHNONE",
            Opcode::PushObject => "PUSHOBJECT",
            Opcode::Pop => "POP",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Define => "DEFINE",
            Opcode::GetMember => "GETMEMBER",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::IDiv => "IDIV",
            Opcode::Mod => "MOD",
            Opcode::Pow => "POW",
            Opcode::BAnd => "BAND",
            Opcode::BOr => "BOR",
            Opcode::BXor => "BXOR",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Eq => "EQ",
            Opcode::Ne => "NE",
            Opcode::Lt => "LT",
            Opcode::Le => "LE",
            Opcode::Gt => "GT",
            Opcode::Ge => "GE",
            Opcode::Neg => "NEG",
            Opcode::Pos => "POS",
            Opcode::Not => "NOT",
            Opcode::BNot => "BNOT",
            Opcode::Inc => "INC",
            Opcode::Dec => "DEC",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::Proc => "PROC",
            Opcode::Call => "CALL",
            Opcode::Return => "RETURN",
            Opcode::BeginScope => "BEGINSCOPE",
            Opcode::EndScope => "ENDSCOPE",
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Jz | Opcode::Jnz)
    }

    /// Opcodes that pop two operands and push one result.
    pub fn is_binary(self) -> bool {
        (Opcode::Add.as_u8()..=Opcode::Ge.as_u8()).contains(&self.as_u8())
    }

    /// Opcodes that pop one operand and push one result.
    pub fn is_unary(self) -> bool {
        (Opcode::Neg.as_u8()..=Opcode::Dec.as_u8()).contains(&self.as_u8())
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminants_match_table() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(op.as_u8() as usize, i, "{} out of place", op);
            assert_eq!(Opcode::from_u8(i as u8), Some(*op));
        }
        assert_eq!(Opcode::from_u8(Opcode::ALL.len() as u8), None);
    }

    #[test]
    fn test_classification() {
        assert!(Opcode::Add.is_binary());
        assert!(Opcode::Ge.is_binary());
        assert!(!Opcode::Neg.is_binary());
        assert!(Opcode::Dec.is_unary());
        assert!(!Opcode::Jmp.is_unary());
        assert!(Opcode::Jnz.is_jump());
    }
}
