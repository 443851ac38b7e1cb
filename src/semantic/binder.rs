use super::bound::{BoundArgument, BoundKind, BoundNode, BoundParam, BoundProperty, BoundTree};
use super::operators::{resolve_binary, resolve_postfix, resolve_unary};
use super::symbols::{Symbol, SymbolId, SymbolTable};
use crate::diagnostic::{DiagnosticCode, Diagnostics};
use crate::lang::node::{
    Argument, Literal, Node, NodeId, Param, Property, PropertyKey as KeySyntax, PropertyKeySyntax,
    TypeExpr, TypeMember,
};
use crate::lang::program::Program;
use crate::runtime::intrinsics;
use crate::types::{
    FunctionType, InterfaceType, LiteralValue, Member, Param as TypeParam, PrimitiveKind,
    PropertyKey, Type,
};
use tracing::debug;

/// Binds `program`, reporting problems into `diagnostics`.
///
/// Binding never stops early: unresolved names and operators become typed
/// no-op nodes so every later pass sees a complete tree.
pub fn bind(program: &Program, diagnostics: &mut Diagnostics) -> BoundTree {
    let mut binder = Binder {
        program,
        tree: BoundTree::new(program.len()),
        symbols: SymbolTable::new(),
        diagnostics,
    };
    binder.register_intrinsics();
    for &stmt in &program.body {
        binder.bind_node(stmt, None);
    }
    debug!(nodes = program.len(), "bind complete");

    let mut tree = binder.tree;
    tree.roots = program.body.clone();
    tree.symbols = binder.symbols;
    tree
}

struct Binder<'a> {
    program: &'a Program,
    tree: BoundTree,
    symbols: SymbolTable,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Binder<'a> {
    fn register_intrinsics(&mut self) {
        for intrinsic in intrinsics::all().iter().filter(|i| i.global) {
            self.symbols.define(Symbol {
                name: intrinsic.name.to_string(),
                ty: intrinsic.signature(),
                mutable: false,
                intrinsic: true,
            });
        }
    }

    fn finish(&mut self, id: NodeId, kind: BoundKind, ty: Option<Type>) -> Type {
        let result = ty.clone().unwrap_or(Type::NONE);
        let span = self.program.span(id);
        self.tree.insert(id, BoundNode { kind, ty, span });
        result
    }

    /// Failed expression: a no-op typed `any`.
    fn no_op(&mut self, id: NodeId) -> Type {
        self.finish(id, BoundKind::NoOp, Some(Type::Any))
    }

    fn error(&mut self, id: NodeId, code: DiagnosticCode, message: String) {
        let span = self.program.span(id);
        self.diagnostics.error(code, span, message);
    }

    fn lookup(&mut self, id: NodeId, name: &str) -> Option<(SymbolId, Symbol)> {
        match self.symbols.lookup(name) {
            Some(symbol) => Some((symbol, self.symbols.get(symbol).clone())),
            None => {
                self.error(
                    id,
                    DiagnosticCode::B0001,
                    format!("symbol '{}' not found", name),
                );
                None
            }
        }
    }

    /// Binds one node and returns its type (`none` for untyped statements).
    /// `expected` is the contextual type an object literal is checked against.
    fn bind_node(&mut self, id: NodeId, expected: Option<&Type>) -> Type {
        let program = self.program;
        match program.node(id) {
            Node::Let {
                name,
                mutable,
                ty,
                init,
            } => {
                let annotated = ty.as_ref().map(|t| self.resolve_type(id, t));
                let init_ty = init.map(|init| self.bind_node(init, annotated.as_ref()));
                let declared = match (annotated, init_ty) {
                    (Some(ty), _) => ty,
                    (None, Some(init_ty)) => init_ty.widen(),
                    (None, None) => {
                        let span = program.span(id);
                        self.diagnostics.warn(
                            DiagnosticCode::B0010,
                            span,
                            format!("'{}' has no type annotation or initializer; assuming any", name),
                        );
                        Type::Any
                    }
                };
                let symbol = self.symbols.define(Symbol {
                    name: name.clone(),
                    ty: declared.clone(),
                    mutable: *mutable,
                    intrinsic: false,
                });
                self.finish(
                    id,
                    BoundKind::Let {
                        symbol,
                        declared,
                        init: *init,
                    },
                    None,
                )
            }

            Node::FunctionDecl {
                name,
                params,
                ret,
                body,
            } => {
                let declared_return = ret.as_ref().map(|t| self.resolve_type(id, t));
                let provisional = Type::function(
                    self.signature_params(id, params),
                    declared_return.clone().unwrap_or(Type::Any),
                );
                self.symbols.define(Symbol {
                    name: name.clone(),
                    ty: provisional,
                    mutable: false,
                    intrinsic: false,
                });
                let (bound_params, fn_ty) = self.bind_function(params, *body, declared_return.clone());
                let symbol = self.symbols.define(Symbol {
                    name: name.clone(),
                    ty: fn_ty.clone(),
                    mutable: false,
                    intrinsic: false,
                });
                debug!(name = %name, ty = %fn_ty, "bound function");
                self.finish(
                    id,
                    BoundKind::Function {
                        symbol: Some(symbol),
                        params: bound_params,
                        body: *body,
                        declared_return,
                    },
                    Some(fn_ty),
                )
            }

            Node::Function { params, ret, body } => {
                let declared_return = ret.as_ref().map(|t| self.resolve_type(id, t));
                let (bound_params, fn_ty) = self.bind_function(params, *body, declared_return.clone());
                self.finish(
                    id,
                    BoundKind::Function {
                        symbol: None,
                        params: bound_params,
                        body: *body,
                        declared_return,
                    },
                    Some(fn_ty),
                )
            }

            Node::TypeAlias { name, ty } => {
                let resolved = self.resolve_type(id, ty);
                let resolved = match resolved {
                    Type::Interface(mut iface) if iface.name.is_none() => {
                        iface.name = Some(name.clone());
                        Type::Interface(iface)
                    }
                    other => other,
                };
                self.symbols.define_type(name, resolved);
                self.finish(id, BoundKind::TypeAlias, None)
            }

            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.bind_node(*condition, None);
                self.bind_node(*then_branch, None);
                if let Some(else_branch) = else_branch {
                    self.bind_node(*else_branch, None);
                }
                self.finish(
                    id,
                    BoundKind::If {
                        condition: *condition,
                        then_branch: *then_branch,
                        else_branch: *else_branch,
                    },
                    None,
                )
            }

            Node::While { condition, body } => {
                self.bind_node(*condition, None);
                self.bind_node(*body, None);
                self.finish(
                    id,
                    BoundKind::While {
                        condition: *condition,
                        body: *body,
                    },
                    None,
                )
            }

            Node::Return(value) => {
                let ty = match value {
                    Some(value) => self.bind_node(*value, None),
                    None => Type::NONE,
                };
                self.finish(id, BoundKind::Return(*value), Some(ty))
            }

            Node::Block(stmts) => {
                self.symbols.push_scope();
                for &stmt in stmts {
                    self.bind_node(stmt, None);
                }
                self.symbols.pop_scope();
                let ty = self.returned_type(stmts);
                self.finish(id, BoundKind::Block(stmts.clone()), Some(ty))
            }

            Node::ExprStmt(expr) => {
                self.bind_node(*expr, None);
                self.finish(id, BoundKind::ExprStmt(*expr), None)
            }

            Node::Literal(literal) => {
                let ty = literal_type(literal);
                self.finish(id, BoundKind::Literal, Some(ty))
            }

            Node::Identifier(name) => match self.lookup(id, name) {
                Some((symbol, sym)) => {
                    self.finish(id, BoundKind::Variable { symbol }, Some(sym.ty))
                }
                None => self.no_op(id),
            },

            Node::Binary { op, left, right } => {
                let lt = self.bind_node(*left, None);
                let rt = self.bind_node(*right, None);
                match resolve_binary(*op, &lt, &rt) {
                    Some(operator) => {
                        let ty = if lt.is_any() || rt.is_any() {
                            Type::Any
                        } else {
                            operator.result.clone()
                        };
                        self.finish(
                            id,
                            BoundKind::Binary {
                                operator,
                                left: *left,
                                right: *right,
                            },
                            Some(ty),
                        )
                    }
                    None => {
                        self.error(
                            id,
                            DiagnosticCode::B0003,
                            format!(
                                "operator '{}' cannot be applied to '{}' and '{}'",
                                op.symbol(),
                                lt,
                                rt
                            ),
                        );
                        self.no_op(id)
                    }
                }
            }

            Node::Unary { op, operand } => {
                let ot = self.bind_node(*operand, None);
                match resolve_unary(*op, &ot) {
                    Some(operator) => {
                        let ty = if ot.is_any() {
                            Type::Any
                        } else {
                            operator.result.clone()
                        };
                        self.finish(
                            id,
                            BoundKind::Unary {
                                operator,
                                operand: *operand,
                            },
                            Some(ty),
                        )
                    }
                    None => {
                        self.error(
                            id,
                            DiagnosticCode::B0004,
                            format!("operator '{}' cannot be applied to '{}'", op.symbol(), ot),
                        );
                        self.no_op(id)
                    }
                }
            }

            Node::Postfix { op, target } => {
                let Some((symbol, sym)) = self.lookup(id, target) else {
                    return self.no_op(id);
                };
                self.check_mutable(id, &sym);
                match resolve_postfix(*op, &sym.ty) {
                    Some(operator) => {
                        let ty = if sym.ty.is_any() {
                            Type::Any
                        } else {
                            operator.result.clone()
                        };
                        self.finish(id, BoundKind::Postfix { operator, symbol }, Some(ty))
                    }
                    None => {
                        self.error(
                            id,
                            DiagnosticCode::B0005,
                            format!("operator '{}' cannot be applied to '{}'", op.symbol(), sym.ty),
                        );
                        self.no_op(id)
                    }
                }
            }

            Node::Assign { target, op, value } => {
                let found = self.lookup(id, target);
                let target_ty = found.as_ref().map(|(_, s)| s.ty.clone());
                let vt = self.bind_node(*value, target_ty.as_ref());
                let Some((symbol, sym)) = found else {
                    return self.no_op(id);
                };
                self.check_mutable(id, &sym);
                match op {
                    None => self.finish(
                        id,
                        BoundKind::Assign {
                            symbol,
                            operator: None,
                            value: *value,
                        },
                        Some(vt),
                    ),
                    Some(op) => match resolve_binary(*op, &sym.ty, &vt) {
                        Some(operator) => {
                            let ty = if sym.ty.is_any() || vt.is_any() {
                                Type::Any
                            } else {
                                operator.result.clone()
                            };
                            self.finish(
                                id,
                                BoundKind::Assign {
                                    symbol,
                                    operator: Some(operator),
                                    value: *value,
                                },
                                Some(ty),
                            )
                        }
                        None => {
                            self.error(
                                id,
                                DiagnosticCode::B0003,
                                format!(
                                    "operator '{}=' cannot be applied to '{}' and '{}'",
                                    op.symbol(),
                                    sym.ty,
                                    vt
                                ),
                            );
                            self.no_op(id)
                        }
                    },
                }
            }

            Node::Call { callee, args } => self.bind_call(id, *callee, args),

            Node::Object(properties) => self.bind_object(id, properties, expected),

            Node::Member { object, key } => self.bind_member(id, *object, key),

            Node::Grouping(inner) => {
                let ty = self.bind_node(*inner, expected);
                self.finish(id, BoundKind::Grouping(*inner), Some(ty))
            }
        }
    }

    fn check_mutable(&mut self, id: NodeId, symbol: &Symbol) {
        if !symbol.mutable {
            self.error(
                id,
                DiagnosticCode::B0002,
                format!("cannot assign to immutable variable '{}'", symbol.name),
            );
        }
    }

    /// Union of the types returned by `stmts`, or `none` when nothing returns.
    fn returned_type(&self, stmts: &[NodeId]) -> Type {
        let mut returns = Vec::new();
        for &stmt in stmts {
            self.tree.returns_under(stmt, &mut returns);
        }
        if returns.is_empty() {
            return Type::NONE;
        }
        Type::union(returns.into_iter().map(|r| self.tree.ty(r)))
    }

    fn signature_params(&mut self, id: NodeId, params: &[Param]) -> Vec<TypeParam> {
        params
            .iter()
            .map(|p| TypeParam {
                name: p.name.clone(),
                ty: p
                    .ty
                    .as_ref()
                    .map(|t| self.resolve_type(id, t))
                    .unwrap_or(Type::Any),
                has_default: p.default.is_some(),
            })
            .collect()
    }

    /// Binds parameters and body in a fresh scope and computes the function
    /// type. Defaults are bound in the parameter scope so they can refer to
    /// earlier parameters.
    fn bind_function(
        &mut self,
        params: &[Param],
        body: NodeId,
        declared_return: Option<Type>,
    ) -> (Vec<BoundParam>, Type) {
        self.symbols.push_scope();
        let mut bound = Vec::with_capacity(params.len());
        let mut signature = Vec::with_capacity(params.len());
        for param in params {
            let ty = match &param.ty {
                Some(t) => self.resolve_type(body, t),
                None => Type::Any,
            };
            if let Some(default) = param.default {
                self.bind_node(default, Some(&ty));
            }
            let symbol = self.symbols.define(Symbol {
                name: param.name.clone(),
                ty: ty.clone(),
                mutable: false,
                intrinsic: false,
            });
            signature.push(TypeParam {
                name: param.name.clone(),
                ty: ty.clone(),
                has_default: param.default.is_some(),
            });
            bound.push(BoundParam {
                symbol,
                ty,
                default: param.default,
            });
        }
        let inferred = self.bind_node(body, None);
        self.symbols.pop_scope();

        let ret = declared_return.unwrap_or(inferred);
        (bound, Type::function(signature, ret))
    }

    fn bind_call(&mut self, id: NodeId, callee: NodeId, args: &[Argument]) -> Type {
        let callee_ty = self.bind_node(callee, None);
        match callee_ty.unwrap_parens().clone() {
            Type::Function(func) => {
                let params = self.match_arguments(id, &func, args);
                let bound = args
                    .iter()
                    .zip(params)
                    .map(|(arg, param_ty)| {
                        self.bind_node(arg.value, Some(&param_ty));
                        BoundArgument {
                            value: arg.value,
                            param_ty,
                        }
                    })
                    .collect();
                self.finish(
                    id,
                    BoundKind::Call {
                        callee,
                        args: bound,
                    },
                    Some(*func.ret),
                )
            }
            other => {
                if !other.is_any() {
                    self.error(
                        id,
                        DiagnosticCode::B0007,
                        format!("value of type '{}' is not callable", other),
                    );
                }
                let bound = args
                    .iter()
                    .map(|arg| {
                        self.bind_node(arg.value, None);
                        BoundArgument {
                            value: arg.value,
                            param_ty: Type::Any,
                        }
                    })
                    .collect();
                self.finish(
                    id,
                    BoundKind::Call {
                        callee,
                        args: bound,
                    },
                    Some(Type::Any),
                )
            }
        }
    }

    /// Matches call arguments to parameters, positionally first and then by
    /// name. Returns the parameter type for each argument (`any` when it
    /// matches nothing).
    fn match_arguments(&mut self, id: NodeId, func: &FunctionType, args: &[Argument]) -> Vec<Type> {
        let mut filled = vec![false; func.params.len()];
        let mut types = Vec::with_capacity(args.len());
        let mut position = 0;

        for arg in args {
            let index = match &arg.name {
                None => {
                    let index = position;
                    position += 1;
                    if index >= func.params.len() {
                        self.error(
                            id,
                            DiagnosticCode::B0008,
                            format!(
                                "expected at most {} argument(s), found {}",
                                func.params.len(),
                                args.len()
                            ),
                        );
                        None
                    } else {
                        Some(index)
                    }
                }
                Some(name) => {
                    let index = func.params.iter().position(|p| &p.name == name);
                    if index.is_none() {
                        self.error(
                            id,
                            DiagnosticCode::B0008,
                            format!("no parameter named '{}'", name),
                        );
                    }
                    index
                }
            };
            match index {
                Some(index) if filled[index] => {
                    self.error(
                        id,
                        DiagnosticCode::B0008,
                        format!("parameter '{}' given more than once", func.params[index].name),
                    );
                    types.push(Type::Any);
                }
                Some(index) => {
                    filled[index] = true;
                    types.push(func.params[index].ty.clone());
                }
                None => types.push(Type::Any),
            }
        }

        for (param, filled) in func.params.iter().zip(filled) {
            if !filled && !param.has_default {
                self.error(
                    id,
                    DiagnosticCode::B0008,
                    format!("missing argument for parameter '{}'", param.name),
                );
            }
        }
        types
    }

    fn bind_object(&mut self, id: NodeId, properties: &[Property], expected: Option<&Type>) -> Type {
        let context = match expected.map(|t| t.unwrap_parens()) {
            Some(Type::Interface(iface)) => Some(iface.clone()),
            _ => None,
        };
        let mut iface = InterfaceType::default();
        let mut bound = Vec::with_capacity(properties.len());

        for property in properties {
            let (key, computed) = match &property.key {
                KeySyntax::Literal(syntax) => (Some(property_key(syntax)), None),
                KeySyntax::Computed(key) => {
                    let kt = self.bind_node(*key, None);
                    match kt.unwrap_parens() {
                        Type::Literal(LiteralValue::String(s)) => {
                            (Some(PropertyKey::Str(s.clone())), Some(*key))
                        }
                        Type::Literal(LiteralValue::Int(n)) => {
                            (Some(PropertyKey::Int(*n)), Some(*key))
                        }
                        _ => (None, Some(*key)),
                    }
                }
            };

            let contextual = context.as_ref().and_then(|ctx| match &key {
                Some(key) => ctx.lookup(key).cloned(),
                None => None,
            });
            let vt = self.bind_node(property.value, contextual.as_ref()).widen();

            let own = match key {
                Some(key) => {
                    iface.members.insert(
                        key,
                        Member {
                            ty: vt.clone(),
                            mutable: false,
                        },
                    );
                    vt.clone()
                }
                None => {
                    let key_ty = computed.map(|k| self.tree.ty(k)).unwrap_or(Type::Any);
                    let kind = if key_ty.is_assignable_to(&Type::STRING) {
                        Some(PrimitiveKind::String)
                    } else if key_ty.is_assignable_to(&Type::INT) {
                        Some(PrimitiveKind::Int)
                    } else {
                        None
                    };
                    match kind {
                        Some(kind) => {
                            let merged = match iface.index_signatures.get(&kind) {
                                Some(existing) => Type::union([existing.clone(), vt.clone()]),
                                None => vt.clone(),
                            };
                            iface.index_signatures.insert(kind, merged.clone());
                            merged
                        }
                        None => {
                            self.error(
                                property.value,
                                DiagnosticCode::B0006,
                                format!("object key of type '{}' must be string or int", key_ty),
                            );
                            Type::Any
                        }
                    }
                }
            };

            bound.push(BoundProperty {
                key: computed,
                value: property.value,
                expected: contextual.unwrap_or(own),
            });
        }

        self.finish(id, BoundKind::Object(bound), Some(Type::Interface(iface)))
    }

    fn bind_member(&mut self, id: NodeId, object: NodeId, key: &KeySyntax) -> Type {
        let ot = self.bind_node(object, None);
        let (key_id, literal) = match key {
            KeySyntax::Literal(syntax) => (None, Some(property_key(syntax))),
            KeySyntax::Computed(key) => {
                let kt = self.bind_node(*key, None);
                let literal = match kt.unwrap_parens() {
                    Type::Literal(LiteralValue::String(s)) => Some(PropertyKey::Str(s.clone())),
                    Type::Literal(LiteralValue::Int(n)) => Some(PropertyKey::Int(*n)),
                    _ => None,
                };
                (Some(*key), literal)
            }
        };

        let ty = match ot.unwrap_parens() {
            Type::Any => Type::Any,
            Type::Interface(iface) => {
                let found = match &literal {
                    Some(literal) => iface.lookup(literal).cloned(),
                    None => {
                        let kt = key_id.map(|k| self.tree.ty(k)).unwrap_or(Type::Any);
                        if kt.is_any() {
                            Some(Type::Any)
                        } else if kt.is_assignable_to(&Type::STRING) {
                            iface.index_signatures.get(&PrimitiveKind::String).cloned()
                        } else if kt.is_assignable_to(&Type::INT) {
                            iface.index_signatures.get(&PrimitiveKind::Int).cloned()
                        } else {
                            None
                        }
                    }
                };
                match found {
                    Some(ty) => ty,
                    None => {
                        let what = literal
                            .map(|k| format!("'{}'", k))
                            .unwrap_or_else(|| "computed member".to_string());
                        self.error(
                            id,
                            DiagnosticCode::B0009,
                            format!("{} does not exist on type '{}'", what, ot),
                        );
                        Type::Any
                    }
                }
            }
            other => {
                self.error(
                    id,
                    DiagnosticCode::B0009,
                    format!("type '{}' has no members", other),
                );
                Type::Any
            }
        };

        self.finish(id, BoundKind::Member { object, key: key_id }, Some(ty))
    }

    /// Resolves a type annotation. `at` is the node used for diagnostics.
    fn resolve_type(&mut self, at: NodeId, ty: &TypeExpr) -> Type {
        match ty {
            TypeExpr::Named { name, args } => {
                if name == "any" {
                    return Type::Any;
                }
                if let Some(kind) = PrimitiveKind::from_name(name) {
                    return Type::Primitive(kind);
                }
                if let Some(alias) = self.symbols.lookup_type(name) {
                    return alias.clone();
                }
                Type::Named {
                    name: name.clone(),
                    args: args.iter().map(|a| self.resolve_type(at, a)).collect(),
                }
            }
            TypeExpr::Literal(literal) => literal_type(literal),
            TypeExpr::Array(element) => Type::Array(Box::new(self.resolve_type(at, element))),
            TypeExpr::Function { params, ret } => {
                let params = params
                    .iter()
                    .enumerate()
                    .map(|(i, p)| TypeParam {
                        name: p.name.clone().unwrap_or_else(|| format!("_{}", i)),
                        ty: self.resolve_type(at, &p.ty),
                        has_default: p.optional,
                    })
                    .collect();
                Type::function(params, self.resolve_type(at, ret))
            }
            TypeExpr::Interface { members } => {
                let mut iface = InterfaceType::default();
                for member in members {
                    match member {
                        TypeMember::Property { key, ty, mutable } => {
                            let ty = self.resolve_type(at, ty);
                            iface.members.insert(
                                property_key(key),
                                Member {
                                    ty,
                                    mutable: *mutable,
                                },
                            );
                        }
                        TypeMember::Index { key, ty } => {
                            let key_ty = self.resolve_type(at, key);
                            let ty = self.resolve_type(at, ty);
                            match key_ty.unwrap_parens() {
                                Type::Primitive(kind @ (PrimitiveKind::String | PrimitiveKind::Int)) => {
                                    iface.index_signatures.insert(*kind, ty);
                                }
                                other => {
                                    let message =
                                        format!("index signature key '{}' must be string or int", other);
                                    self.error(at, DiagnosticCode::B0006, message);
                                }
                            }
                        }
                    }
                }
                Type::Interface(iface)
            }
            TypeExpr::Union(members) => {
                Type::union(members.iter().map(|m| self.resolve_type(at, m)).collect::<Vec<_>>())
            }
            TypeExpr::Intersection(members) => {
                Type::Intersection(members.iter().map(|m| self.resolve_type(at, m)).collect())
            }
            TypeExpr::Parenthesized(inner) => {
                Type::Parenthesized(Box::new(self.resolve_type(at, inner)))
            }
        }
    }
}

fn literal_type(literal: &Literal) -> Type {
    match literal {
        Literal::Int(n) => Type::Literal(LiteralValue::Int(*n)),
        Literal::Float(n) => Type::Literal(LiteralValue::Float(*n)),
        Literal::String(s) => Type::Literal(LiteralValue::String(s.clone())),
        Literal::Char(c) => Type::Literal(LiteralValue::Char(*c)),
        Literal::Bool(b) => Type::Literal(LiteralValue::Bool(*b)),
        Literal::None => Type::NONE,
    }
}

fn property_key(syntax: &PropertyKeySyntax) -> PropertyKey {
    match syntax {
        PropertyKeySyntax::Name(name) => PropertyKey::Str(name.clone()),
        PropertyKeySyntax::Int(n) => PropertyKey::Int(*n),
    }
}
