use serde::{Deserialize, Serialize};

/// Index of a node inside a [`Program`](super::program::Program) arena.
///
/// Ids are assigned once, in creation order, and stay valid for the lifetime
/// of the program. Every later pass (binder, checker, generator) keys its
/// side tables by `NodeId` instead of by reference identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Literal constants as written in source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Char(char),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::IntDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    Increment,
    Decrement,
}

impl PostfixOp {
    pub fn symbol(self) -> &'static str {
        match self {
            PostfixOp::Increment => "++",
            PostfixOp::Decrement => "--",
        }
    }
}

/// Type annotation syntax. Resolved into a `Type` by the binder.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// `int`, `string`, `Point`, `Map<string, int>`
    Named { name: String, args: Vec<TypeExpr> },
    /// `1`, `"on"`, `true`
    Literal(Literal),
    /// `int[]`
    Array(Box<TypeExpr>),
    /// `fn(a: int, b?: string) -> bool`
    Function {
        params: Vec<TypeParam>,
        ret: Box<TypeExpr>,
    },
    /// `{ x: int, mut y: string, [string]: float }`
    Interface { members: Vec<TypeMember> },
    Union(Vec<TypeExpr>),
    Intersection(Vec<TypeExpr>),
    Parenthesized(Box<TypeExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub name: Option<String>,
    pub ty: TypeExpr,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeMember {
    Property {
        key: PropertyKeySyntax,
        ty: TypeExpr,
        mutable: bool,
    },
    Index {
        key: TypeExpr,
        ty: TypeExpr,
    },
}

/// Literal property keys: `name`, `"quoted name"`, `3`.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKeySyntax {
    Name(String),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub default: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Literal(PropertyKeySyntax),
    /// `[expr]: value`
    Computed(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: PropertyKey,
    pub value: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: NodeId,
}

/// Syntax tree node. Statements and expressions share one closed set of
/// kinds; children are referenced by id into the owning arena.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // ───────────────────────────── Statements ─────────────────────────────
    /// `let mut? name (: ty)? (= init)?;`
    Let {
        name: String,
        mutable: bool,
        ty: Option<TypeExpr>,
        init: Option<NodeId>,
    },

    /// `fn name(params) (: ret)? { body }`
    FunctionDecl {
        name: String,
        params: Vec<Param>,
        ret: Option<TypeExpr>,
        body: NodeId,
    },

    /// `type Name = ty;`
    TypeAlias { name: String, ty: TypeExpr },

    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },

    While { condition: NodeId, body: NodeId },

    Return(Option<NodeId>),

    Block(Vec<NodeId>),

    /// An expression evaluated for its effect; its value is discarded.
    ExprStmt(NodeId),

    // ──────────────────────────── Expressions ─────────────────────────────
    Literal(Literal),

    Identifier(String),

    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },

    Unary { op: UnaryOp, operand: NodeId },

    /// `name++` / `name--`
    Postfix { op: PostfixOp, target: String },

    /// `name = value` or `name op= value`
    Assign {
        target: String,
        op: Option<BinaryOp>,
        value: NodeId,
    },

    Call { callee: NodeId, args: Vec<Argument> },

    /// Anonymous function expression: `fn(params) (: ret)? { body }`
    Function {
        params: Vec<Param>,
        ret: Option<TypeExpr>,
        body: NodeId,
    },

    Object(Vec<Property>),

    /// `object.name` (key is a literal) or `object[key]` (key is an expression)
    Member { object: NodeId, key: PropertyKey },

    Grouping(NodeId),
}

impl Node {
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Node::Let { .. }
                | Node::FunctionDecl { .. }
                | Node::TypeAlias { .. }
                | Node::If { .. }
                | Node::While { .. }
                | Node::Return(_)
                | Node::Block(_)
                | Node::ExprStmt(_)
        )
    }

    /// Short name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Let { .. } => "let",
            Node::FunctionDecl { .. } => "function declaration",
            Node::TypeAlias { .. } => "type alias",
            Node::If { .. } => "if",
            Node::While { .. } => "while",
            Node::Return(_) => "return",
            Node::Block(_) => "block",
            Node::ExprStmt(_) => "expression statement",
            Node::Literal(_) => "literal",
            Node::Identifier(_) => "identifier",
            Node::Binary { .. } => "binary expression",
            Node::Unary { .. } => "unary expression",
            Node::Postfix { .. } => "postfix expression",
            Node::Assign { .. } => "assignment",
            Node::Call { .. } => "call",
            Node::Function { .. } => "function expression",
            Node::Object(_) => "object literal",
            Node::Member { .. } => "member access",
            Node::Grouping(_) => "grouping",
        }
    }
}
