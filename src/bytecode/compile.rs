use crate::bytecode::compile_error::CompileError;
use crate::bytecode::{Bytecode, Instruction, Opcode, Operand};
use crate::diagnostic::Diagnostics;
use crate::lang::node::{Argument, Literal, Node, NodeId, Param, Property, PropertyKey, PropertyKeySyntax};
use crate::lang::program::Program;
use crate::semantic::bound::{BoundKind, BoundTree};
use crate::types::Type;
use tracing::debug;

/// Lowers a bound program to a flat instruction sequence ending in `EXIT`.
///
/// Rejections are reported into `diagnostics`; the returned bytecode is
/// always complete.
pub fn generate(program: &Program, tree: &BoundTree, diagnostics: &mut Diagnostics) -> Bytecode {
    let mut generator = Generator {
        program,
        tree,
        diagnostics,
    };
    let mut ops = Vec::new();
    let last = program.body.len().checked_sub(1);
    for (i, &stmt) in program.body.iter().enumerate() {
        // the final expression statement keeps its value as the program result
        if Some(i) == last {
            if let Node::ExprStmt(expr) = program.node(stmt) {
                generator.compile_node(*expr, &mut ops);
                continue;
            }
        }
        generator.compile_node(stmt, &mut ops);
    }
    ops.push(Instruction::new(Opcode::Exit));
    debug!(instructions = ops.len(), "generate complete");
    Bytecode::new(ops)
}

struct Generator<'a> {
    program: &'a Program,
    tree: &'a BoundTree,
    diagnostics: &'a mut Diagnostics,
}

impl Generator<'_> {
    fn reject(&mut self, id: NodeId, error: CompileError) {
        let span = self.program.span(id);
        self.diagnostics.push(error.into_diagnostic(span));
    }

    /// Reports G0002 when `actual` cannot satisfy an operator operand type.
    fn require(&mut self, id: NodeId, symbol: &'static str, actual: &Type, expected: &Type) {
        if !actual.is_assignable_to(expected) {
            self.reject(id, CompileError::operand_mismatch(symbol, expected, actual));
        }
    }

    fn compile_nodes(&mut self, ids: &[NodeId]) -> Vec<Instruction> {
        let mut ops = Vec::new();
        for &id in ids {
            self.compile_node(id, &mut ops);
        }
        ops
    }

    /// A self-contained nested program for one expression.
    fn sub_program(&mut self, id: NodeId) -> Operand {
        let ops = self.compile_nodes(&[id]);
        Operand::bytecode(Bytecode::new(ops))
    }

    fn compile_node(&mut self, id: NodeId, ops: &mut Vec<Instruction>) {
        let program = self.program;
        let tree = self.tree;
        let emit = |ops: &mut Vec<Instruction>, opcode| ops.push(Instruction::new(opcode).at(id));
        let push = |ops: &mut Vec<Instruction>, operand| {
            ops.push(Instruction::with(Opcode::Push, operand).at(id))
        };

        match program.node(id) {
            Node::Let { name, init, .. } => {
                match init {
                    Some(init) => self.compile_node(*init, ops),
                    None => emit(ops, Opcode::PushNone),
                }
                push(ops, Operand::Str(name.clone()));
                emit(ops, Opcode::Define);
            }

            Node::FunctionDecl {
                name, params, body, ..
            } => {
                self.compile_proc(id, params, *body, ops);
                push(ops, Operand::Str(name.clone()));
                emit(ops, Opcode::Define);
            }

            Node::Function { params, body, .. } => self.compile_proc(id, params, *body, ops),

            Node::TypeAlias { .. } => {}

            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_node(*condition, ops);
                let then_ops = self.compile_nodes(&[*then_branch]);
                let then_len = then_ops.len() as i32;
                match else_branch {
                    Some(else_branch) => {
                        let else_ops = self.compile_nodes(&[*else_branch]);
                        let else_len = else_ops.len() as i32;
                        ops.push(Instruction::with(Opcode::Jz, Operand::Int(then_len + 1)).at(id));
                        ops.extend(then_ops);
                        ops.push(Instruction::with(Opcode::Jmp, Operand::Int(else_len)).at(id));
                        ops.extend(else_ops);
                    }
                    None => {
                        ops.push(Instruction::with(Opcode::Jz, Operand::Int(then_len)).at(id));
                        ops.extend(then_ops);
                    }
                }
            }

            Node::While { condition, body } => {
                let cond_ops = self.compile_nodes(&[*condition]);
                let body_ops = self.compile_nodes(&[*body]);
                let cond_len = cond_ops.len() as i32;
                let body_len = body_ops.len() as i32;

                ops.extend(cond_ops);
                ops.push(Instruction::with(Opcode::Jz, Operand::Int(body_len + 1)).at(id));
                ops.extend(body_ops);
                ops.push(
                    Instruction::with(Opcode::Jmp, Operand::Int(-(cond_len + body_len + 2))).at(id),
                );
            }

            Node::Return(value) => {
                match value {
                    Some(value) => self.compile_node(*value, ops),
                    None => emit(ops, Opcode::PushNone),
                }
                emit(ops, Opcode::Return);
            }

            Node::Block(stmts) => {
                emit(ops, Opcode::BeginScope);
                for &stmt in stmts {
                    self.compile_node(stmt, ops);
                }
                emit(ops, Opcode::EndScope);
            }

            Node::ExprStmt(expr) => {
                self.compile_node(*expr, ops);
                emit(ops, Opcode::Pop);
            }

            Node::Literal(literal) => match literal {
                Literal::Int(n) => push(ops, Operand::Long(*n)),
                Literal::Float(n) => push(ops, Operand::Double(*n)),
                Literal::String(s) => push(ops, Operand::Str(s.clone())),
                Literal::Char(c) => push(ops, Operand::Char(*c)),
                Literal::Bool(b) => push(ops, Operand::Bool(*b)),
                Literal::None => emit(ops, Opcode::PushNone),
            },

            Node::Identifier(name) => {
                push(ops, Operand::Str(name.clone()));
                emit(ops, Opcode::Load);
            }

            Node::Binary { op, left, right } => {
                let Some(BoundKind::Binary { operator, .. }) = bound(tree, id) else {
                    self.reject(id, CompileError::unresolved("binary", op.symbol()));
                    emit(ops, Opcode::PushNone);
                    return;
                };
                let (lt, rt) = (tree.ty(*left), tree.ty(*right));
                self.require(*left, op.symbol(), &lt, &operator.left);
                self.require(*right, op.symbol(), &rt, &operator.right);
                self.compile_node(*left, ops);
                self.compile_node(*right, ops);
                emit(ops, operator.opcode);
            }

            Node::Unary { op, operand } => {
                let Some(BoundKind::Unary { operator, .. }) = bound(tree, id) else {
                    self.reject(id, CompileError::unresolved("unary", op.symbol()));
                    emit(ops, Opcode::PushNone);
                    return;
                };
                let ty = tree.ty(*operand);
                self.require(*operand, op.symbol(), &ty, &operator.operand);
                self.compile_node(*operand, ops);
                emit(ops, operator.opcode);
            }

            Node::Postfix { op, target } => {
                let Some(BoundKind::Postfix { operator, .. }) = bound(tree, id) else {
                    self.reject(id, CompileError::unresolved("postfix", op.symbol()));
                    emit(ops, Opcode::PushNone);
                    return;
                };
                // old value stays on the stack as the expression result
                for _ in 0..2 {
                    push(ops, Operand::Str(target.clone()));
                    emit(ops, Opcode::Load);
                }
                emit(ops, operator.opcode);
                push(ops, Operand::Str(target.clone()));
                emit(ops, Opcode::Store);
                emit(ops, Opcode::Pop);
            }

            Node::Assign { target, op, value } => {
                match op {
                    None => self.compile_node(*value, ops),
                    Some(op) => {
                        let Some(BoundKind::Assign {
                            operator: Some(operator),
                            symbol,
                            ..
                        }) = bound(tree, id)
                        else {
                            self.reject(id, CompileError::unresolved("compound assignment", op.symbol()));
                            emit(ops, Opcode::PushNone);
                            return;
                        };
                        let target_ty = tree.symbols.get(*symbol).ty.clone();
                        let value_ty = tree.ty(*value);
                        self.require(id, op.symbol(), &target_ty, &operator.left);
                        self.require(*value, op.symbol(), &value_ty, &operator.right);
                        push(ops, Operand::Str(target.clone()));
                        emit(ops, Opcode::Load);
                        self.compile_node(*value, ops);
                        emit(ops, operator.opcode);
                    }
                }
                push(ops, Operand::Str(target.clone()));
                emit(ops, Opcode::Store);
            }

            Node::Call { callee, args } => {
                self.compile_node(*callee, ops);
                let operand = self.call_metadata(args);
                ops.push(Instruction::with(Opcode::Call, operand).at(id));
            }

            Node::Object(properties) => {
                let operand = self.object_entries(properties);
                ops.push(Instruction::with(Opcode::PushObject, operand).at(id));
            }

            Node::Member { object, key } => {
                self.compile_node(*object, ops);
                match key {
                    PropertyKey::Literal(key) => push(ops, literal_key(key)),
                    PropertyKey::Computed(key) => self.compile_node(*key, ops),
                }
                emit(ops, Opcode::GetMember);
            }

            Node::Grouping(inner) => self.compile_node(*inner, ops),
        }
    }

    /// `PROC Tuple(List[Tuple(name, default|Null)], body)`. The body always
    /// ends in `PUSHNONE RETURN` so falling off the end returns `none`.
    fn compile_proc(&mut self, id: NodeId, params: &[Param], body: NodeId, ops: &mut Vec<Instruction>) {
        let params = params
            .iter()
            .map(|param| {
                let default = match param.default {
                    Some(default) => self.sub_program(default),
                    None => Operand::Null,
                };
                Operand::tuple(Operand::Str(param.name.clone()), default)
            })
            .collect();

        let mut body_ops = self.compile_nodes(&[body]);
        body_ops.push(Instruction::new(Opcode::PushNone).at(body));
        body_ops.push(Instruction::new(Opcode::Return).at(body));

        let operand = Operand::tuple(
            Operand::List(params),
            Operand::bytecode(Bytecode::new(body_ops)),
        );
        ops.push(Instruction::with(Opcode::Proc, operand).at(id));
    }

    /// `List[Tuple(name|Null, argument)]`
    fn call_metadata(&mut self, args: &[Argument]) -> Operand {
        let entries = args
            .iter()
            .map(|arg| {
                let name = match &arg.name {
                    Some(name) => Operand::Str(name.clone()),
                    None => Operand::Null,
                };
                Operand::tuple(name, self.sub_program(arg.value))
            })
            .collect();
        Operand::List(entries)
    }

    /// `List[Tuple(key, value)]`, both nested programs.
    fn object_entries(&mut self, properties: &[Property]) -> Operand {
        let entries = properties
            .iter()
            .map(|property| {
                let key = match &property.key {
                    PropertyKey::Literal(key) => Operand::bytecode(Bytecode::new(vec![
                        Instruction::with(Opcode::Push, literal_key(key)).at(property.value),
                    ])),
                    PropertyKey::Computed(key) => self.sub_program(*key),
                };
                Operand::tuple(key, self.sub_program(property.value))
            })
            .collect();
        Operand::List(entries)
    }
}

fn bound(tree: &BoundTree, id: NodeId) -> Option<&BoundKind> {
    tree.get(id).map(|node| &node.kind)
}

fn literal_key(key: &PropertyKeySyntax) -> Operand {
    match key {
        PropertyKeySyntax::Name(name) => Operand::Str(name.clone()),
        PropertyKeySyntax::Int(n) => Operand::Long(*n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticCode;
    use crate::frontend::parser::parse_source;
    use crate::semantic::binder::bind;

    fn gen_src(source: &str) -> (Bytecode, Diagnostics) {
        let program = parse_source(source).expect("parse should succeed");
        let mut diagnostics = Diagnostics::new();
        let tree = bind(&program, &mut diagnostics);
        let code = generate(&program, &tree, &mut diagnostics);
        (code, diagnostics)
    }

    fn opcodes(code: &Bytecode) -> Vec<Opcode> {
        code.iter().map(|i| i.opcode).collect()
    }

    fn nested(instruction: &Instruction) -> (&Vec<Operand>, &Bytecode) {
        match &instruction.operand {
            Operand::Tuple(pair) => match &**pair {
                (Operand::List(params), Operand::Bytecode(body)) => (params, body),
                other => panic!("unexpected PROC operand {:?}", other),
            },
            other => panic!("unexpected PROC operand {:?}", other),
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_binary_pushes_left_then_right() {
        let (code, diags) = gen_src("3 * 2 + 1;");
        assert!(diags.is_empty(), "{}", diags);
        assert_eq!(
            opcodes(&code),
            vec![
                Opcode::Push,
                Opcode::Push,
                Opcode::Mul,
                Opcode::Push,
                Opcode::Add,
                Opcode::Exit
            ]
        );
        assert_eq!(code.instructions[0].operand, Operand::Long(3));
        assert_eq!(code.instructions[1].operand, Operand::Long(2));
    }

    #[test]
    fn test_final_expression_statement_keeps_value() {
        let (code, _) = gen_src("1; 2;");
        assert_eq!(
            opcodes(&code),
            vec![Opcode::Push, Opcode::Pop, Opcode::Push, Opcode::Exit]
        );
    }

    #[test]
    fn test_let_and_identifier() {
        let (code, _) = gen_src("let x = 1; x;");
        assert_eq!(
            opcodes(&code),
            vec![
                Opcode::Push,
                Opcode::Push,
                Opcode::Define,
                Opcode::Push,
                Opcode::Load,
                Opcode::Exit
            ]
        );
        assert_eq!(code.instructions[1].operand, Operand::Str("x".into()));
    }

    #[test]
    fn test_compound_assignment_loads_computes_and_stores() {
        let (code, diags) = gen_src("let mut s = \"a\"; s += \"b\";");
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(
            opcodes(&code)[3..],
            [
                Opcode::Push,
                Opcode::Load,
                Opcode::Push,
                Opcode::Add,
                Opcode::Push,
                Opcode::Store,
                Opcode::Exit
            ]
        );
    }

    #[test]
    fn test_postfix_leaves_old_value() {
        let (code, _) = gen_src("let mut i = 0; i++;");
        assert_eq!(
            opcodes(&code)[3..],
            [
                Opcode::Push,
                Opcode::Load,
                Opcode::Push,
                Opcode::Load,
                Opcode::Inc,
                Opcode::Push,
                Opcode::Store,
                Opcode::Pop,
                Opcode::Exit
            ]
        );
    }

    #[test]
    fn test_call_and_object_use_nested_programs() {
        let (code, _) = gen_src("fn f(a, b = 2) { return a; } f(1, b: { x: 3 });");
        let call = code
            .iter()
            .find(|i| i.opcode == Opcode::Call)
            .expect("call emitted");
        let Operand::List(args) = &call.operand else {
            panic!("call operand should be a list");
        };
        assert_eq!(args.len(), 2);
        let Operand::Tuple(named) = &args[1] else {
            panic!("argument should be a tuple");
        };
        assert_eq!(named.0, Operand::Str("b".into()));
        let Operand::Bytecode(arg) = &named.1 else {
            panic!("argument should be a nested program");
        };
        assert_eq!(arg.instructions[0].opcode, Opcode::PushObject);
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    #[test]
    fn test_if_else_offsets() {
        let (code, _) = gen_src("if true { 1; } else { 2; }");
        // PUSH JZ [BEGIN PUSH POP END] JMP [BEGIN PUSH POP END] EXIT
        assert_eq!(code.instructions[1].opcode, Opcode::Jz);
        assert_eq!(code.instructions[1].operand, Operand::Int(5));
        assert_eq!(code.instructions[6].opcode, Opcode::Jmp);
        assert_eq!(code.instructions[6].operand, Operand::Int(4));
        assert_eq!(code.len(), 12);
    }

    #[test]
    fn test_if_without_else() {
        let (code, _) = gen_src("if false { 1; }");
        assert_eq!(code.instructions[1].operand, Operand::Int(4));
        assert_eq!(code.len(), 7);
    }

    #[test]
    fn test_while_jumps_back_to_condition() {
        let (code, _) = gen_src("while false { }");
        // PUSH JZ(3) BEGIN END JMP(-5) EXIT
        assert_eq!(
            opcodes(&code),
            vec![
                Opcode::Push,
                Opcode::Jz,
                Opcode::BeginScope,
                Opcode::EndScope,
                Opcode::Jmp,
                Opcode::Exit
            ]
        );
        assert_eq!(code.instructions[1].operand, Operand::Int(3));
        assert_eq!(code.instructions[4].operand, Operand::Int(-5));
    }

    #[test]
    fn test_function_body_ends_with_implicit_return() {
        let (code, _) = gen_src("fn f(x = 1) { }");
        assert_eq!(code.instructions[0].opcode, Opcode::Proc);
        let (params, body) = nested(&code.instructions[0]);
        assert_eq!(params.len(), 1);
        assert_eq!(
            opcodes(body),
            vec![
                Opcode::BeginScope,
                Opcode::EndScope,
                Opcode::PushNone,
                Opcode::Return
            ]
        );
    }

    // =========================================================================
    // Rejections
    // =========================================================================

    #[test]
    fn test_unresolved_operator_is_rejected() {
        let (code, diags) = gen_src(r#""a" - 1;"#);
        assert!(diags.contains(DiagnosticCode::B0003));
        assert!(diags.contains(DiagnosticCode::G0001));
        assert_eq!(opcodes(&code), vec![Opcode::PushNone, Opcode::Exit]);
    }
}
