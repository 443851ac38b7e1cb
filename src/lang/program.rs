use super::node::{Node, NodeId};
use crate::frontend::lexer::Span;

/// A parsed program: the node arena plus the top-level statement list.
#[derive(Debug, Clone, Default)]
pub struct Program {
    nodes: Vec<Node>,
    spans: Vec<Span>,
    pub body: Vec<NodeId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node and returns its id.
    pub fn add(&mut self, node: Node, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.spans.push(span);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.spans.get(id.index()).copied().unwrap_or_default()
    }

    /// Spans indexed by node id.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
