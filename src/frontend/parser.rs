use super::lexer::{Span, Spanned};
use super::parser_error::ParserError;
use super::token::Token;
use crate::lang::node::{
    Argument, BinaryOp, Literal, Node, NodeId, Param, PostfixOp, Property, PropertyKey,
    PropertyKeySyntax, TypeExpr, TypeMember, TypeParam, UnaryOp,
};
use crate::lang::program::Program;

/// Number of left-associative binary precedence levels below `**`.
const BINARY_LEVELS: usize = 10;

/// Binary operator for `token` at precedence `level` (0 binds loosest).
fn binary_op_at(level: usize, token: &Token) -> Option<BinaryOp> {
    let op = match (level, token) {
        (0, Token::PipePipe) => BinaryOp::Or,
        (1, Token::AmpAmp) => BinaryOp::And,
        (2, Token::Pipe) => BinaryOp::BitOr,
        (3, Token::Caret) => BinaryOp::BitXor,
        (4, Token::Amp) => BinaryOp::BitAnd,
        (5, Token::EqEq) => BinaryOp::Eq,
        (5, Token::NotEq) => BinaryOp::NotEq,
        (6, Token::Lt) => BinaryOp::Lt,
        (6, Token::LtEq) => BinaryOp::LtEq,
        (6, Token::Gt) => BinaryOp::Gt,
        (6, Token::GtEq) => BinaryOp::GtEq,
        (7, Token::Shl) => BinaryOp::Shl,
        (7, Token::Shr) => BinaryOp::Shr,
        (8, Token::Plus) => BinaryOp::Add,
        (8, Token::Minus) => BinaryOp::Sub,
        (9, Token::Star) => BinaryOp::Mul,
        (9, Token::Slash) => BinaryOp::Div,
        (9, Token::SlashSlash) => BinaryOp::IntDiv,
        (9, Token::Percent) => BinaryOp::Mod,
        _ => return None,
    };
    Some(op)
}

/// Recursive-descent parser.
///
/// The parser consumes a stream of lexed `Spanned` tokens and produces a
/// [`Program`]: an arena of nodes plus the list of top-level statements.
///
/// Notes:
/// - Comments and newlines are filtered out in `Parser::new`.
/// - `{` opens a block in statement position and an object literal in
///   expression position.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token.
    ///
    /// Used to provide stable source locations for errors that occur after
    /// advancing past the last token or at end-of-file.
    last_span: Option<Span>,
    program: Program,
}

impl Parser {
    /// Creates a new parser from lexer output.
    pub fn new(tokens: Vec<Spanned>) -> Self {
        let tokens: Vec<Spanned> = tokens
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Comment(_) | Token::Newline))
            .collect();
        Parser {
            tokens,
            pos: 0,
            last_span: None,
            program: Program::new(),
        }
    }

    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if let Some(s) = &token {
            self.last_span = Some(s.span);
        }
        self.pos += 1;
        token.map(|s| s.token)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|s| &s.token)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, context: &str) -> Result<(), ParserError> {
        if self.eat(token) {
            Ok(())
        } else {
            let found = self
                .peek()
                .map(|t| t.describe())
                .unwrap_or_else(|| "end of input".to_string());
            Err(self.error(&format!(
                "expected '{}' {}, found '{}'",
                token.describe(),
                context,
                found
            )))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, ParserError> {
        match self.peek() {
            Some(Token::Ident(_)) => match self.advance() {
                Some(Token::Ident(name)) => Ok(name),
                _ => Err(self.error(&format!("expected identifier {}", context))),
            },
            _ => Err(self.error(&format!("expected identifier {}", context))),
        }
    }

    /// Span of the current token, or the last consumed one at end of input.
    fn here(&self) -> Span {
        self.current()
            .map(|s| s.span)
            .or(self.last_span)
            .unwrap_or_default()
    }

    /// Constructs a `ParserError` at the most relevant location.
    ///
    /// Priority:
    /// 1. If `current()` exists, use its span.
    /// 2. Else, use `last_span` (e.g. after consuming EOF or falling off the end).
    /// 3. Else, default to (1,1) for truly empty input.
    fn error(&self, message: &str) -> ParserError {
        let span = self.here();
        ParserError {
            message: message.to_string(),
            line: span.line,
            col: span.col,
        }
    }

    fn add(&mut self, node: Node, span: Span) -> NodeId {
        self.program.add(node, span)
    }

    /// Parses a complete program. Stops at `Token::Eof`.
    pub fn parse(mut self) -> Result<Program, ParserError> {
        let mut body = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token, Token::Eof) {
                break;
            }
            body.push(self.parse_statement()?);
        }
        self.program.body = body;
        Ok(self.program)
    }

    // ───────────────────────────── Statements ─────────────────────────────

    fn parse_statement(&mut self) -> Result<NodeId, ParserError> {
        let span = self.here();
        match self.peek() {
            Some(Token::Let) => self.parse_let(),
            Some(Token::Fn) if matches!(self.peek_next(), Some(Token::Ident(_))) => {
                self.parse_function_decl()
            }
            Some(Token::Type) => self.parse_type_alias(),
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => {
                self.advance();
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;
                Ok(self.add(Node::While { condition, body }, span))
            }
            Some(Token::Return) => {
                self.advance();
                let value = if self.check(&Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(&Token::Semicolon, "after return")?;
                Ok(self.add(Node::Return(value), span))
            }
            Some(Token::LBrace) => self.parse_block(),
            _ => {
                let expr = self.parse_expression()?;
                self.expect(&Token::Semicolon, "after expression")?;
                Ok(self.add(Node::ExprStmt(expr), span))
            }
        }
    }

    fn parse_let(&mut self) -> Result<NodeId, ParserError> {
        let span = self.here();
        self.advance(); // consume 'let'
        let mutable = self.eat(&Token::Mut);
        let name = self.expect_ident("after 'let'")?;
        let ty = if self.eat(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(&Token::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(&Token::Semicolon, "after variable declaration")?;
        Ok(self.add(
            Node::Let {
                name,
                mutable,
                ty,
                init,
            },
            span,
        ))
    }

    fn parse_function_decl(&mut self) -> Result<NodeId, ParserError> {
        let span = self.here();
        self.advance(); // consume 'fn'
        let name = self.expect_ident("after 'fn'")?;
        let (params, ret, body) = self.parse_function_rest()?;
        Ok(self.add(
            Node::FunctionDecl {
                name,
                params,
                ret,
                body,
            },
            span,
        ))
    }

    /// Parses `(params) (: ret)? { body }`, shared by declarations and expressions.
    fn parse_function_rest(
        &mut self,
    ) -> Result<(Vec<Param>, Option<TypeExpr>, NodeId), ParserError> {
        self.expect(&Token::LParen, "to open parameter list")?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            let name = self.expect_ident("as parameter name")?;
            let ty = if self.eat(&Token::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let default = if self.eat(&Token::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(Param { name, ty, default });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "to close parameter list")?;

        let ret = if self.eat(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok((params, ret, body))
    }

    fn parse_type_alias(&mut self) -> Result<NodeId, ParserError> {
        let span = self.here();
        self.advance(); // consume 'type'
        let name = self.expect_ident("after 'type'")?;
        self.expect(&Token::Assign, "in type alias")?;
        let ty = self.parse_type()?;
        self.expect(&Token::Semicolon, "after type alias")?;
        Ok(self.add(Node::TypeAlias { name, ty }, span))
    }

    fn parse_if(&mut self) -> Result<NodeId, ParserError> {
        let span = self.here();
        self.advance(); // consume 'if'
        let condition = self.parse_expression()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(&Token::Else) {
            if self.check(&Token::If) {
                Some(self.parse_if()?)
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(self.add(
            Node::If {
                condition,
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    fn parse_block(&mut self) -> Result<NodeId, ParserError> {
        let span = self.here();
        self.expect(&Token::LBrace, "to open block")?;
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                Some(Token::Eof) | None => {
                    return Err(self.error("unexpected EOF, expected '}'"));
                }
                _ => statements.push(self.parse_statement()?),
            }
        }
        Ok(self.add(Node::Block(statements), span))
    }

    // ──────────────────────────── Expressions ─────────────────────────────

    pub fn parse_expression(&mut self) -> Result<NodeId, ParserError> {
        if let (Some(Token::Ident(_)), Some(Token::Assign | Token::CompoundAssign(_))) =
            (self.peek(), self.peek_next())
        {
            return self.parse_assignment();
        }
        self.parse_binary(0)
    }

    fn parse_assignment(&mut self) -> Result<NodeId, ParserError> {
        let span = self.here();
        let target = self.expect_ident("as assignment target")?;
        let op = match self.advance() {
            Some(Token::Assign) => None,
            Some(Token::CompoundAssign(op)) => Some(binary_op_for(&op).ok_or_else(|| {
                self.error(&format!("'{}=' is not a compound operator", op.describe()))
            })?),
            _ => return Err(self.error("expected assignment operator")),
        };
        let value = self.parse_expression()?;
        Ok(self.add(Node::Assign { target, op, value }, span))
    }

    fn parse_binary(&mut self, level: usize) -> Result<NodeId, ParserError> {
        if level >= BINARY_LEVELS {
            return self.parse_power();
        }

        let mut left = self.parse_binary(level + 1)?;
        loop {
            let span = self.here();
            let op = self.peek().and_then(|token| binary_op_at(level, token));
            let Some(op) = op else { break };
            self.advance();
            let right = self.parse_binary(level + 1)?;
            left = self.add(Node::Binary { op, left, right }, span);
        }
        Ok(left)
    }

    /// `**` binds tighter than the multiplicative operators and is right-associative.
    fn parse_power(&mut self) -> Result<NodeId, ParserError> {
        let base = self.parse_unary()?;
        if self.check(&Token::StarStar) {
            let span = self.here();
            self.advance();
            let exponent = self.parse_power()?;
            return Ok(self.add(
                Node::Binary {
                    op: BinaryOp::Pow,
                    left: base,
                    right: exponent,
                },
                span,
            ));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<NodeId, ParserError> {
        let span = self.here();
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOp::Negate),
            Some(Token::Plus) => Some(UnaryOp::Plus),
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::Tilde) => Some(UnaryOp::BitNot),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(self.add(Node::Unary { op, operand }, span))
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<NodeId, ParserError> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.here();
            match self.peek() {
                Some(Token::LParen) => {
                    self.advance();
                    let args = self.parse_arguments()?;
                    expr = self.add(Node::Call { callee: expr, args }, span);
                }
                Some(Token::Dot) => {
                    self.advance();
                    let key = match self.advance() {
                        Some(Token::Ident(name)) => PropertyKeySyntax::Name(name),
                        Some(Token::Integer(n)) => PropertyKeySyntax::Int(n),
                        _ => return Err(self.error("expected member name after '.'")),
                    };
                    expr = self.add(
                        Node::Member {
                            object: expr,
                            key: PropertyKey::Literal(key),
                        },
                        span,
                    );
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.expect(&Token::RBracket, "to close index")?;
                    expr = self.add(
                        Node::Member {
                            object: expr,
                            key: PropertyKey::Computed(key),
                        },
                        span,
                    );
                }
                Some(Token::PlusPlus | Token::MinusMinus) => {
                    let op = if self.check(&Token::PlusPlus) {
                        PostfixOp::Increment
                    } else {
                        PostfixOp::Decrement
                    };
                    let target = match self.program.node(expr) {
                        Node::Identifier(name) => name.clone(),
                        _ => {
                            return Err(self.error(&format!(
                                "'{}' can only be applied to a variable",
                                op.symbol()
                            )));
                        }
                    };
                    self.advance();
                    expr = self.add(Node::Postfix { op, target }, span);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Argument>, ParserError> {
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            let name = match (self.peek(), self.peek_next()) {
                (Some(Token::Ident(_)), Some(Token::Colon)) => {
                    let name = self.expect_ident("as argument name")?;
                    self.advance(); // ':'
                    Some(name)
                }
                _ => None,
            };
            let value = self.parse_expression()?;
            args.push(Argument { name, value });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "to close argument list")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<NodeId, ParserError> {
        let span = self.here();
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.error("unexpected end of input")),
        };

        let node = match token {
            Token::Integer(n) => Node::Literal(Literal::Int(n)),
            Token::Float(n) => Node::Literal(Literal::Float(n)),
            Token::String(s) => Node::Literal(Literal::String(s)),
            Token::Char(c) => Node::Literal(Literal::Char(c)),
            Token::Bool(b) => Node::Literal(Literal::Bool(b)),
            Token::None => Node::Literal(Literal::None),
            Token::Ident(name) => Node::Identifier(name),
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen, "to close grouping")?;
                return Ok(self.add(Node::Grouping(inner), span));
            }
            Token::Fn => {
                self.advance();
                let (params, ret, body) = self.parse_function_rest()?;
                return Ok(self.add(Node::Function { params, ret, body }, span));
            }
            Token::LBrace => return self.parse_object(),
            other => {
                return Err(self.error(&format!(
                    "expected expression, found '{}'",
                    other.describe()
                )));
            }
        };
        self.advance();
        Ok(self.add(node, span))
    }

    fn parse_object(&mut self) -> Result<NodeId, ParserError> {
        let span = self.here();
        self.advance(); // consume '{'
        let mut properties = Vec::new();
        while !self.check(&Token::RBrace) {
            let key = match self.advance() {
                Some(Token::Ident(name)) | Some(Token::String(name)) => {
                    PropertyKey::Literal(PropertyKeySyntax::Name(name))
                }
                Some(Token::Integer(n)) => PropertyKey::Literal(PropertyKeySyntax::Int(n)),
                Some(Token::LBracket) => {
                    let key = self.parse_expression()?;
                    self.expect(&Token::RBracket, "to close computed key")?;
                    PropertyKey::Computed(key)
                }
                _ => return Err(self.error("expected property key")),
            };
            self.expect(&Token::Colon, "after property key")?;
            let value = self.parse_expression()?;
            properties.push(Property { key, value });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace, "to close object literal")?;
        Ok(self.add(Node::Object(properties), span))
    }

    // ─────────────────────────────── Types ────────────────────────────────

    pub fn parse_type(&mut self) -> Result<TypeExpr, ParserError> {
        let first = self.parse_intersection_type()?;
        if !self.check(&Token::Pipe) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(&Token::Pipe) {
            members.push(self.parse_intersection_type()?);
        }
        Ok(TypeExpr::Union(members))
    }

    fn parse_intersection_type(&mut self) -> Result<TypeExpr, ParserError> {
        let first = self.parse_array_type()?;
        if !self.check(&Token::Amp) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(&Token::Amp) {
            members.push(self.parse_array_type()?);
        }
        Ok(TypeExpr::Intersection(members))
    }

    fn parse_array_type(&mut self) -> Result<TypeExpr, ParserError> {
        let mut ty = self.parse_primary_type()?;
        while self.check(&Token::LBracket) && self.peek_next() == Some(&Token::RBracket) {
            self.advance();
            self.advance();
            ty = TypeExpr::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn parse_primary_type(&mut self) -> Result<TypeExpr, ParserError> {
        let token = match self.advance() {
            Some(token) => token,
            None => return Err(self.error("expected type")),
        };
        match token {
            Token::Ident(name) => {
                let mut args = Vec::new();
                if self.eat(&Token::Lt) {
                    loop {
                        args.push(self.parse_type()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::Gt, "to close type arguments")?;
                }
                Ok(TypeExpr::Named { name, args })
            }
            Token::None => Ok(TypeExpr::Named {
                name: "none".to_string(),
                args: Vec::new(),
            }),
            Token::Integer(n) => Ok(TypeExpr::Literal(Literal::Int(n))),
            Token::Float(n) => Ok(TypeExpr::Literal(Literal::Float(n))),
            Token::String(s) => Ok(TypeExpr::Literal(Literal::String(s))),
            Token::Char(c) => Ok(TypeExpr::Literal(Literal::Char(c))),
            Token::Bool(b) => Ok(TypeExpr::Literal(Literal::Bool(b))),
            Token::LParen => {
                let inner = self.parse_type()?;
                self.expect(&Token::RParen, "to close parenthesized type")?;
                Ok(TypeExpr::Parenthesized(Box::new(inner)))
            }
            Token::Fn => self.parse_function_type(),
            Token::LBrace => self.parse_interface_type(),
            other => Err(self.error(&format!(
                "expected type, found '{}'",
                other.describe()
            ))),
        }
    }

    fn parse_function_type(&mut self) -> Result<TypeExpr, ParserError> {
        self.expect(&Token::LParen, "in function type")?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            let named = matches!(self.peek(), Some(Token::Ident(_)))
                && matches!(self.peek_next(), Some(Token::Colon | Token::Question));
            let (name, optional) = if named {
                let name = self.expect_ident("as parameter name")?;
                let optional = self.eat(&Token::Question);
                self.expect(&Token::Colon, "after parameter name")?;
                (Some(name), optional)
            } else {
                (None, false)
            };
            let ty = self.parse_type()?;
            params.push(TypeParam { name, ty, optional });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "to close function type parameters")?;
        let ret = if self.eat(&Token::Arrow) {
            self.parse_type()?
        } else {
            TypeExpr::Named {
                name: "none".to_string(),
                args: Vec::new(),
            }
        };
        Ok(TypeExpr::Function {
            params,
            ret: Box::new(ret),
        })
    }

    fn parse_interface_type(&mut self) -> Result<TypeExpr, ParserError> {
        let mut members = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.eat(&Token::LBracket) {
                let key = self.parse_type()?;
                self.expect(&Token::RBracket, "to close index signature")?;
                self.expect(&Token::Colon, "after index signature")?;
                let ty = self.parse_type()?;
                members.push(TypeMember::Index { key, ty });
            } else {
                let mutable = self.eat(&Token::Mut);
                let key = match self.advance() {
                    Some(Token::Ident(name)) | Some(Token::String(name)) => {
                        PropertyKeySyntax::Name(name)
                    }
                    Some(Token::Integer(n)) => PropertyKeySyntax::Int(n),
                    _ => return Err(self.error("expected member name in interface type")),
                };
                self.expect(&Token::Colon, "after member name")?;
                let ty = self.parse_type()?;
                members.push(TypeMember::Property { key, ty, mutable });
            }
            if !(self.eat(&Token::Comma) || self.eat(&Token::Semicolon)) {
                break;
            }
        }
        self.expect(&Token::RBrace, "to close interface type")?;
        Ok(TypeExpr::Interface { members })
    }
}

fn binary_op_for(token: &Token) -> Option<BinaryOp> {
    Some(match token {
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
        Token::Star => BinaryOp::Mul,
        Token::Slash => BinaryOp::Div,
        Token::SlashSlash => BinaryOp::IntDiv,
        Token::Percent => BinaryOp::Mod,
        Token::StarStar => BinaryOp::Pow,
        Token::Amp => BinaryOp::BitAnd,
        Token::Pipe => BinaryOp::BitOr,
        Token::Caret => BinaryOp::BitXor,
        Token::Shl => BinaryOp::Shl,
        Token::Shr => BinaryOp::Shr,
        _ => return None,
    })
}

/// Lexes and parses `source` in one step.
pub fn parse_source(source: &str) -> Result<Program, crate::pipeline::PipelineError> {
    let tokens = super::lexer::Lexer::new(source).tokenize()?;
    Ok(Parser::new(tokens).parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_source(source).expect("parse should succeed")
    }

    fn parse_err(source: &str) -> String {
        match parse_source(source) {
            Ok(program) => panic!("expected parse error, got {:?}", program),
            Err(e) => e.to_string(),
        }
    }

    fn expr_of(program: &Program, stmt: NodeId) -> NodeId {
        match program.node(stmt) {
            Node::ExprStmt(expr) => *expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse("1 + 2 * 3;");
        let root = expr_of(&program, program.body[0]);
        match program.node(root) {
            Node::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                program.node(*right),
                Node::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            )),
            other => panic!("unexpected root {:?}", other),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        let program = parse("2 ** 3 ** 2;");
        let root = expr_of(&program, program.body[0]);
        match program.node(root) {
            Node::Binary {
                op: BinaryOp::Pow,
                left,
                right,
            } => {
                assert!(matches!(program.node(*left), Node::Literal(Literal::Int(2))));
                assert!(matches!(
                    program.node(*right),
                    Node::Binary {
                        op: BinaryOp::Pow,
                        ..
                    }
                ));
            }
            other => panic!("unexpected root {:?}", other),
        }
    }

    #[test]
    fn test_compound_assignment() {
        let program = parse("x //= 2;");
        let root = expr_of(&program, program.body[0]);
        assert!(matches!(
            program.node(root),
            Node::Assign {
                op: Some(BinaryOp::IntDiv),
                ..
            }
        ));
    }

    #[test]
    fn test_function_declaration_with_defaults() {
        let program = parse("fn add(a: int, b: int = 2): int { return a + b; }");
        match program.node(program.body[0]) {
            Node::FunctionDecl {
                name, params, ret, ..
            } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
                assert!(params[0].default.is_none());
                assert!(params[1].default.is_some());
                assert!(ret.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_object_literal_and_member() {
        let program = parse(r#"let p = { x: 1, "y": 2, [k]: 3 }; p.x;"#);
        match program.node(program.body[0]) {
            Node::Let {
                init: Some(init), ..
            } => match program.node(*init) {
                Node::Object(props) => {
                    assert_eq!(props.len(), 3);
                    assert!(matches!(props[2].key, PropertyKey::Computed(_)));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        let member = expr_of(&program, program.body[1]);
        assert!(matches!(program.node(member), Node::Member { .. }));
    }

    #[test]
    fn test_named_arguments() {
        let program = parse("f(1, b: 2);");
        let call = expr_of(&program, program.body[0]);
        match program.node(call) {
            Node::Call { args, .. } => {
                assert_eq!(args[0].name, None);
                assert_eq!(args[1].name.as_deref(), Some("b"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_type_annotations() {
        let program =
            parse("let f: fn(a: int, b?: string) -> int | none = g; type P = { x: int; [string]: float };");
        match program.node(program.body[0]) {
            Node::Let { ty: Some(ty), .. } => match ty {
                TypeExpr::Function { params, ret } => {
                    assert_eq!(params.len(), 2);
                    assert!(params[1].optional);
                    assert!(matches!(**ret, TypeExpr::Union(_)));
                }
                other => panic!("unexpected type {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        match program.node(program.body[1]) {
            Node::TypeAlias {
                ty: TypeExpr::Interface { members },
                ..
            } => assert_eq!(members.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_postfix_requires_variable() {
        let msg = parse_err("1++;");
        assert!(msg.contains("can only be applied to a variable"), "{}", msg);
    }

    #[test]
    fn test_missing_semicolon() {
        let msg = parse_err("let x = 1");
        assert!(msg.contains("expected ';'"), "{}", msg);
    }

    #[test]
    fn test_unclosed_block() {
        let msg = parse_err("if true { 1;");
        assert!(msg.contains("expected '}'"), "{}", msg);
    }
}
