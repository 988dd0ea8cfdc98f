//! Name resolution: every identifier, function and method in a query body
//! must be known before the body is allowed to run.

use std::collections::HashSet;

use compact_str::CompactString;

use super::Diagnostic;
use super::ast::{Expr, ExprKind};

struct Signature {
    name: &'static str,
    min_args: usize,
    max_args: usize,
    /// Arguments that must be written as lambdas.
    takes_lambda: bool,
}

const fn sig(
    name: &'static str,
    min_args: usize,
    max_args: usize,
    takes_lambda: bool,
) -> Signature {
    Signature {
        name,
        min_args,
        max_args,
        takes_lambda,
    }
}

const FUNCTIONS: &[Signature] = &[
    sig("allObjects", 0, 0, false),
    sig("objectsOfType", 1, 1, false),
    sig("classRecord", 1, 1, false),
    sig("allClasses", 0, 0, false),
    sig("objectAt", 1, 1, false),
    sig("typeOf", 1, 1, false),
    sig("addressOf", 1, 1, false),
];

const METHODS: &[Signature] = &[
    sig("where", 1, 1, true),
    sig("select", 1, 1, true),
    sig("take", 1, 1, false),
    sig("skip", 1, 1, false),
    sig("orderBy", 1, 1, true),
    sig("orderByDescending", 1, 1, true),
    sig("groupBy", 1, 1, true),
    sig("distinct", 0, 0, false),
    sig("count", 0, 1, true),
    sig("any", 0, 1, true),
    sig("first", 0, 1, true),
    sig("sum", 0, 1, true),
    sig("contains", 1, 1, false),
    sig("startsWith", 1, 1, false),
    sig("endsWith", 1, 1, false),
    sig("len", 0, 0, false),
];

fn lookup(table: &'static [Signature], name: &str) -> Option<&'static Signature> {
    table.iter().find(|signature| signature.name == name)
}

/// Checks `body` and returns every problem found, in source order.
pub fn resolve(body: &Expr) -> Vec<Diagnostic> {
    let mut resolver = Resolver {
        scope: Vec::new(),
        diagnostics: Vec::new(),
    };
    resolver.walk(body);
    resolver.diagnostics
}

struct Resolver {
    scope: Vec<CompactString>,
    diagnostics: Vec<Diagnostic>,
}

impl Resolver {
    fn walk(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Var(name) => {
                if !self.scope.iter().any(|bound| bound == name) {
                    let hint = if lookup(FUNCTIONS, name).is_some() {
                        format!("unbound identifier `{name}`, did you mean `{name}()`?")
                    } else {
                        format!("unbound identifier `{name}`")
                    };
                    self.error(expr, hint);
                }
            }
            ExprKind::Call { name, args } => {
                match lookup(FUNCTIONS, name) {
                    Some(signature) => self.check_arity(expr, signature, args.len()),
                    None => self.error(expr, format!("unknown function `{name}`")),
                }
                for arg in args {
                    self.walk(arg);
                }
            }
            ExprKind::Member { target, .. } => self.walk(target),
            ExprKind::Method {
                target,
                name,
                name_span,
                args,
            } => {
                self.walk(target);
                match lookup(METHODS, name) {
                    Some(signature) => {
                        self.check_arity(expr, signature, args.len());
                        if signature.takes_lambda {
                            for arg in args {
                                if !matches!(arg.kind, ExprKind::Lambda { .. }) {
                                    self.diagnostics.push(Diagnostic::new(
                                        arg.span.clone(),
                                        format!("`{name}` expects a lambda such as `x => ...`"),
                                    ));
                                }
                            }
                        }
                    }
                    None => self.diagnostics.push(Diagnostic::new(
                        name_span.clone(),
                        format!("unknown method `{name}`"),
                    )),
                }
                for arg in args {
                    self.walk(arg);
                }
            }
            ExprKind::Lambda { param, body } => {
                self.scope.push(param.clone());
                self.walk(body);
                self.scope.pop();
            }
            ExprKind::Unary { operand, .. } => self.walk(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk(lhs);
                self.walk(rhs);
            }
            ExprKind::Shape(fields) => {
                let mut seen = HashSet::new();
                for field in fields {
                    if field.name.is_empty() {
                        self.error(
                            &field.value,
                            "cannot infer a field name here, write `name: expr`".to_string(),
                        );
                    } else if !seen.insert(field.name.as_str()) {
                        self.error(
                            &field.value,
                            format!("field `{}` appears twice in this shape", field.name),
                        );
                    }
                    self.walk(&field.value);
                }
            }
        }
    }

    fn check_arity(&mut self, expr: &Expr, signature: &Signature, got: usize) {
        if got < signature.min_args || got > signature.max_args {
            let expected = if signature.min_args == signature.max_args {
                signature.min_args.to_string()
            } else {
                format!("{} or {}", signature.min_args, signature.max_args)
            };
            let plural = if expected == "1" { "" } else { "s" };
            self.error(
                expr,
                format!(
                    "`{}` takes {expected} argument{plural}, got {got}",
                    signature.name
                ),
            );
        }
    }

    fn error(&mut self, expr: &Expr, message: String) {
        self.diagnostics
            .push(Diagnostic::new(expr.span.clone(), message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::lexer::lex;
    use crate::lang::parser::parse_expr;

    fn messages(source: &str) -> Vec<String> {
        let (tokens, _) = lex(source);
        let expr = parse_expr(&tokens).expect("parses");
        resolve(&expr).into_iter().map(|d| d.message).collect()
    }

    #[test]
    fn lambda_parameters_are_in_scope() {
        assert!(messages("allObjects().where(o => o.Bar > 1).select(x => { x.Bar })").is_empty());
    }

    #[test]
    fn parameters_do_not_leak_out_of_their_lambda() {
        assert_eq!(
            messages("allObjects().where(o => true).select(p => o)"),
            vec!["unbound identifier `o`"]
        );
    }

    #[test]
    fn reports_every_problem_in_order() {
        assert_eq!(
            messages("allObject().frobnicate(1).take()"),
            vec![
                "unknown function `allObject`",
                "unknown method `frobnicate`",
                "`take` takes 1 argument, got 0",
            ]
        );
    }

    #[test]
    fn functions_referenced_without_call_get_a_hint() {
        assert_eq!(
            messages("allObjects.count()"),
            vec!["unbound identifier `allObjects`, did you mean `allObjects()`?"]
        );
    }

    #[test]
    fn sequence_operators_require_lambdas() {
        assert_eq!(
            messages("allObjects().where(true)"),
            vec!["`where` expects a lambda such as `x => ...`"]
        );
    }

    #[test]
    fn duplicate_shape_fields_are_rejected() {
        assert_eq!(
            messages("allObjects().select(o => { a: 1, a: 2 })"),
            vec!["field `a` appears twice in this shape"]
        );
    }

    #[test]
    fn shape_fields_need_a_name() {
        assert_eq!(
            messages("allObjects().select(o => { o.Bar * 2 })"),
            vec!["cannot infer a field name here, write `name: expr`"]
        );
    }
}
