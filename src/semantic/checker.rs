use super::bound::{BoundKind, BoundTree};
use crate::diagnostic::{DiagnosticCode, Diagnostics};
use crate::lang::node::NodeId;
use crate::types::Type;
use tracing::debug;

/// Validates assignability obligations over a bound tree.
///
/// The tree is never modified. Each failed obligation is one diagnostic and
/// checking carries on with the next node.
pub fn check(tree: &BoundTree, diagnostics: &mut Diagnostics) {
    let mut checker = Checker { tree, diagnostics };
    for &root in &tree.roots {
        checker.check_node(root);
    }
    debug!(roots = tree.roots.len(), "check complete");
}

struct Checker<'a> {
    tree: &'a BoundTree,
    diagnostics: &'a mut Diagnostics,
}

impl Checker<'_> {
    fn expect(&mut self, at: NodeId, actual: &Type, expected: &Type, code: DiagnosticCode, what: &str) {
        if !actual.is_assignable_to(expected) {
            let span = self.tree.span(at);
            self.diagnostics.error(
                code,
                span,
                format!(
                    "{}: type '{}' is not assignable to '{}'",
                    what, actual, expected
                ),
            );
        }
    }

    fn check_node(&mut self, id: NodeId) {
        let tree = self.tree;
        let Some(node) = tree.get(id) else { return };

        for child in node.kind.children() {
            self.check_node(child);
        }

        match &node.kind {
            BoundKind::Let {
                symbol,
                declared,
                init: Some(init),
            } => {
                let name = &tree.symbols.get(*symbol).name;
                self.expect(
                    *init,
                    &tree.ty(*init),
                    declared,
                    DiagnosticCode::T0001,
                    &format!("initializer of '{}'", name),
                );
            }

            BoundKind::Function {
                params,
                body,
                declared_return,
                ..
            } => {
                for param in params {
                    if let Some(default) = param.default {
                        self.expect(
                            default,
                            &tree.ty(default),
                            &param.ty,
                            DiagnosticCode::T0006,
                            "default value",
                        );
                    }
                }
                if let Some(declared) = declared_return {
                    let mut returns = Vec::new();
                    tree.returns_under(*body, &mut returns);
                    if returns.is_empty() {
                        self.expect(
                            *body,
                            &Type::NONE,
                            declared,
                            DiagnosticCode::T0002,
                            "function without return",
                        );
                    }
                    for ret in returns {
                        self.expect(
                            ret,
                            &tree.ty(ret),
                            declared,
                            DiagnosticCode::T0002,
                            "returned value",
                        );
                    }
                }
            }

            BoundKind::Binary {
                operator,
                left,
                right,
            } => {
                let what = format!("operand of '{}'", operator.syntax.symbol());
                self.expect(*left, &tree.ty(*left), &operator.left, DiagnosticCode::T0003, &what);
                self.expect(*right, &tree.ty(*right), &operator.right, DiagnosticCode::T0003, &what);
            }

            BoundKind::Unary { operator, operand } => {
                let what = format!("operand of '{}'", operator.syntax.symbol());
                self.expect(
                    *operand,
                    &tree.ty(*operand),
                    &operator.operand,
                    DiagnosticCode::T0003,
                    &what,
                );
            }

            BoundKind::Assign {
                symbol, operator, ..
            } => {
                let target = tree.symbols.get(*symbol);
                if let Some(operator) = operator {
                    let what = format!("operand of '{}='", operator.syntax.symbol());
                    self.expect(id, &target.ty, &operator.left, DiagnosticCode::T0003, &what);
                }
                self.expect(
                    id,
                    &tree.ty(id),
                    &target.ty,
                    DiagnosticCode::T0005,
                    &format!("assignment to '{}'", target.name),
                );
            }

            BoundKind::Object(properties) => {
                for property in properties {
                    self.expect(
                        property.value,
                        &tree.ty(property.value),
                        &property.expected,
                        DiagnosticCode::T0004,
                        "property value",
                    );
                }
            }

            BoundKind::Call { args, .. } => {
                for arg in args {
                    self.expect(
                        arg.value,
                        &tree.ty(arg.value),
                        &arg.param_ty,
                        DiagnosticCode::T0006,
                        "argument",
                    );
                }
            }

            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_source;
    use crate::semantic::binder::bind;

    fn check_src(source: &str) -> Vec<DiagnosticCode> {
        let program = parse_source(source).expect("parse should succeed");
        let mut diagnostics = Diagnostics::new();
        let tree = bind(&program, &mut diagnostics);
        let bound = diagnostics.len();
        check(&tree, &mut diagnostics);
        diagnostics.iter().skip(bound).map(|d| d.code).collect()
    }

    #[test]
    fn test_clean_program_has_no_findings() {
        let codes = check_src(
            r#"
            type P = { x: int; y: int };
            fn norm(p: P): int { return p.x; }
            let mut total: float = 0.5;
            total = total + norm({ x: 1, y: 2 });
            let name: string = "q" + 'c';
            "#,
        );
        assert!(codes.is_empty(), "{:?}", codes);
    }

    #[test]
    fn test_initializer_mismatch() {
        assert_eq!(check_src(r#"let x: int = "s";"#), vec![DiagnosticCode::T0001]);
        assert_eq!(check_src("let x: int = 1 + 2;"), vec![DiagnosticCode::T0001]);
        assert!(check_src("let x: int = 9 // 2;").is_empty());
    }

    #[test]
    fn test_return_mismatch_reports_each_return() {
        let codes = check_src(
            r#"fn f(b: bool): int { if b { return "no"; } return 'c'; }"#,
        );
        assert_eq!(codes, vec![DiagnosticCode::T0002, DiagnosticCode::T0002]);
        assert_eq!(check_src("fn g(): int { }"), vec![DiagnosticCode::T0002]);
        assert!(check_src("fn h(): none { }").is_empty());
    }

    #[test]
    fn test_assignment_mismatch() {
        assert_eq!(
            check_src(r#"let mut n = 1; n = "text";"#),
            vec![DiagnosticCode::T0005]
        );
        assert_eq!(
            check_src("let mut n = 1; n += 1;"),
            vec![DiagnosticCode::T0005]
        );
    }

    #[test]
    fn test_property_mismatch_against_declared_interface() {
        let codes = check_src(r#"let p: { x: int } = { x: "one" };"#);
        assert_eq!(codes, vec![DiagnosticCode::T0004, DiagnosticCode::T0001]);
    }

    #[test]
    fn test_argument_and_default_mismatch() {
        let codes = check_src(r#"fn f(a: int, b: string = 3) { } f("x");"#);
        assert_eq!(codes, vec![DiagnosticCode::T0006, DiagnosticCode::T0006]);
    }

    #[test]
    fn test_untyped_code_passes() {
        let codes = check_src(
            "fn count(n, acc) { if n == 0 { return acc; } return count(n - 1, acc + 1); } count(10, 0);",
        );
        assert!(codes.is_empty(), "{:?}", codes);
    }
}
