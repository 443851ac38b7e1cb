use super::operators::{BinaryOperator, PostfixOperator, UnaryOperator};
use super::symbols::{SymbolId, SymbolTable};
use crate::frontend::lexer::Span;
use crate::lang::node::NodeId;
use crate::types::Type;

#[derive(Debug, Clone)]
pub struct BoundParam {
    pub symbol: SymbolId,
    pub ty: Type,
    pub default: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct BoundArgument {
    pub value: NodeId,
    pub param_ty: Type,
}

#[derive(Debug, Clone)]
pub struct BoundProperty {
    /// Computed key expression, if any.
    pub key: Option<NodeId>,
    pub value: NodeId,
    /// Type the value must be assignable to.
    pub expected: Type,
}

/// What a syntax node became after binding. Children are the same ids as in
/// the syntax tree.
#[derive(Debug, Clone)]
pub enum BoundKind {
    /// Placeholder for a node that failed to bind. Always typed `any`.
    NoOp,
    Literal,
    Variable {
        symbol: SymbolId,
    },
    Let {
        symbol: SymbolId,
        declared: Type,
        init: Option<NodeId>,
    },
    Function {
        /// `None` for anonymous function expressions.
        symbol: Option<SymbolId>,
        params: Vec<BoundParam>,
        body: NodeId,
        declared_return: Option<Type>,
    },
    TypeAlias,
    Block(Vec<NodeId>),
    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While {
        condition: NodeId,
        body: NodeId,
    },
    Return(Option<NodeId>),
    ExprStmt(NodeId),
    Binary {
        operator: &'static BinaryOperator,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        operator: &'static UnaryOperator,
        operand: NodeId,
    },
    Postfix {
        operator: &'static PostfixOperator,
        symbol: SymbolId,
    },
    Assign {
        symbol: SymbolId,
        operator: Option<&'static BinaryOperator>,
        value: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<BoundArgument>,
    },
    Object(Vec<BoundProperty>),
    Member {
        object: NodeId,
        key: Option<NodeId>,
    },
    Grouping(NodeId),
}

impl BoundKind {
    /// Child node ids in evaluation order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            BoundKind::NoOp
            | BoundKind::Literal
            | BoundKind::Variable { .. }
            | BoundKind::TypeAlias
            | BoundKind::Postfix { .. } => Vec::new(),
            BoundKind::Let { init, .. } => init.iter().copied().collect(),
            BoundKind::Function { params, body, .. } => params
                .iter()
                .filter_map(|p| p.default)
                .chain(std::iter::once(*body))
                .collect(),
            BoundKind::Block(stmts) => stmts.clone(),
            BoundKind::If {
                condition,
                then_branch,
                else_branch,
            } => std::iter::once(*condition)
                .chain(std::iter::once(*then_branch))
                .chain(else_branch.iter().copied())
                .collect(),
            BoundKind::While { condition, body } => vec![*condition, *body],
            BoundKind::Return(value) => value.iter().copied().collect(),
            BoundKind::ExprStmt(expr) | BoundKind::Grouping(expr) => vec![*expr],
            BoundKind::Binary { left, right, .. } => vec![*left, *right],
            BoundKind::Unary { operand, .. } => vec![*operand],
            BoundKind::Assign { value, .. } => vec![*value],
            BoundKind::Call { callee, args } => std::iter::once(*callee)
                .chain(args.iter().map(|a| a.value))
                .collect(),
            BoundKind::Object(props) => props
                .iter()
                .flat_map(|p| p.key.into_iter().chain(std::iter::once(p.value)))
                .collect(),
            BoundKind::Member { object, key } => {
                std::iter::once(*object).chain(key.iter().copied()).collect()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundNode {
    pub kind: BoundKind,
    /// Statements may have no type; expressions always have one.
    pub ty: Option<Type>,
    pub span: Span,
}

/// The bound tree: one [`BoundNode`] per syntax node, stored at the same
/// index as the node's [`NodeId`].
#[derive(Debug)]
pub struct BoundTree {
    nodes: Vec<Option<BoundNode>>,
    pub roots: Vec<NodeId>,
    pub symbols: SymbolTable,
}

impl BoundTree {
    pub fn new(size: usize) -> Self {
        Self {
            nodes: vec![None; size],
            roots: Vec::new(),
            symbols: SymbolTable::new(),
        }
    }

    pub fn insert(&mut self, id: NodeId, node: BoundNode) {
        if id.index() >= self.nodes.len() {
            self.nodes.resize(id.index() + 1, None);
        }
        self.nodes[id.index()] = Some(node);
    }

    pub fn get(&self, id: NodeId) -> Option<&BoundNode> {
        self.nodes.get(id.index()).and_then(|n| n.as_ref())
    }

    /// Type of a bound node; unbound nodes and untyped statements read as `any`.
    pub fn ty(&self, id: NodeId) -> Type {
        self.get(id)
            .and_then(|n| n.ty.clone())
            .unwrap_or(Type::Any)
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.get(id).map(|n| n.span).unwrap_or_default()
    }

    /// Collects the `return` statements under `id`, not descending into
    /// nested function bodies.
    pub fn returns_under(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(node) = self.get(id) else { return };
        match &node.kind {
            BoundKind::Return(_) => out.push(id),
            BoundKind::Function { .. } => {}
            kind => {
                for child in kind.children() {
                    self.returns_under(child, out);
                }
            }
        }
    }
}
