//! Parser for the query wrapper and expression grammar.
//!
//! Parsing stops at the first syntax error; lexical and name-resolution
//! errors are collected separately so a compile can still report several.

use std::rc::Rc;

use chumsky::Stream;
use chumsky::prelude::*;
use compact_str::CompactString;

use super::ast::{BinaryOp, Expr, ExprKind, Literal, ShapeField, UnaryOp, UnitDecl};
use super::lexer::Token;
use super::{Diagnostic, Span};

/// Deepest a query may nest before it is rejected unparsed.
///
/// Every bracket, operator, `.` and `=>` opens a level, so a long flat
/// chain of operators counts as deep nesting too. Parsing, name resolution
/// and evaluation all recurse over the tree, and this keeps them well inside
/// a thread's stack.
pub const MAX_NESTING: usize = 40;

/// Parses the whole `unit <name> { <body> }` wrapper.
pub fn parse_unit(tokens: &[(Token, Span)]) -> Result<UnitDecl, Diagnostic> {
    check_nesting(tokens)?;
    let eoi = end_of_input(tokens);
    unit_parser()
        .parse(Stream::from_iter(eoi, tokens.iter().cloned()))
        .map_err(first_error)
}

/// Parses a bare expression, without the unit wrapper.
pub fn parse_expr(tokens: &[(Token, Span)]) -> Result<Expr, Diagnostic> {
    check_nesting(tokens)?;
    let eoi = end_of_input(tokens);
    expr_parser()
        .then_ignore(end())
        .parse(Stream::from_iter(eoi, tokens.iter().cloned()))
        .map_err(first_error)
}

fn end_of_input(tokens: &[(Token, Span)]) -> Span {
    let end = tokens.last().map(|(_, span)| span.end).unwrap_or(0);
    end..end + 1
}

fn first_error(errors: Vec<Simple<Token>>) -> Diagnostic {
    errors
        .into_iter()
        .next()
        .map(Diagnostic::from)
        .unwrap_or_else(|| Diagnostic::new(0..0, "could not parse the query"))
}

/// Rejects token streams that would nest deeper than [`MAX_NESTING`].
///
/// This walks the flat token list, so it cannot itself run out of stack.
pub fn check_nesting(tokens: &[(Token, Span)]) -> Result<(), Diagnostic> {
    // (level at the opening bracket, current level) per open bracket
    let mut open = vec![(0usize, 0usize)];
    for (token, span) in tokens {
        let Some((base, level)) = open.last_mut() else {
            break;
        };
        match token {
            Token::LParen | Token::LBrace => {
                let inner = *level + 1;
                open.push((inner, inner));
            }
            Token::RParen | Token::RBrace => {
                if open.len() > 1 {
                    open.pop();
                }
                continue;
            }
            Token::Comma => *level = *base,
            Token::Dot
            | Token::FatArrow
            | Token::Bang
            | Token::Plus
            | Token::Minus
            | Token::Star
            | Token::Slash
            | Token::Percent
            | Token::AndAnd
            | Token::OrOr
            | Token::EqEq
            | Token::NotEq
            | Token::Lt
            | Token::Le
            | Token::Gt
            | Token::Ge => *level += 1,
            _ => continue,
        }
        let deepest = open.last().map(|(_, level)| *level).unwrap_or(0);
        if deepest > MAX_NESTING {
            return Err(Diagnostic::new(
                span.clone(),
                format!("query nests too deeply (more than {MAX_NESTING} levels)"),
            ));
        }
    }
    Ok(())
}

fn ident() -> impl Parser<Token, CompactString, Error = Simple<Token>> + Clone {
    select! { Token::Ident(name) => name }.labelled("an identifier")
}

fn unit_parser() -> impl Parser<Token, UnitDecl, Error = Simple<Token>> + Clone {
    just(Token::Unit)
        .ignore_then(ident().labelled("a unit name"))
        .then(
            expr_parser()
                .delimited_by(just(Token::LBrace), just(Token::RBrace))
                .labelled("a `{ ... }` query body"),
        )
        .then_ignore(end())
        .map(|(name, body)| UnitDecl {
            name,
            body: Rc::new(body),
        })
}

fn expr_parser() -> impl Parser<Token, Expr, Error = Simple<Token>> + Clone {
    recursive(|expr| {
        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map_with_span(|args: Vec<Expr>, span: Span| (args, span));

        let literal = select! {
            Token::Int(value) => Literal::Int(value),
            Token::Str(value) => Literal::Str(Rc::from(value.as_str())),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
        }
        .or(select! { Token::Float(text) => text }.try_map(|text, span: Span| {
            text.parse::<f64>()
                .map(Literal::Float)
                .map_err(|_| Simple::custom(span, format!("invalid float literal {text}")))
        }))
        .map_with_span(|literal, span| Expr::new(ExprKind::Literal(literal), span));

        let call_or_var = ident()
            .then(args.clone().or_not())
            .map_with_span(|(name, args), span: Span| match args {
                Some((args, _)) => Expr::new(ExprKind::Call { name, args }, span),
                None => Expr::new(ExprKind::Var(name), span),
            });

        let parens = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map_with_span(|mut inner: Expr, span| {
                inner.span = span;
                inner
            });

        // `{ o.Bar }` names its field after the last identifier; fields whose
        // name cannot be inferred are left unnamed for resolution to reject.
        let named_field = ident()
            .then_ignore(just(Token::Colon))
            .then(expr.clone())
            .map(|(name, value)| ShapeField { name, value });
        let inferred_field = expr.clone().map(|value: Expr| {
            let name = match &value.kind {
                ExprKind::Var(name) | ExprKind::Member { name, .. } => name.clone(),
                _ => CompactString::default(),
            };
            ShapeField { name, value }
        });
        let shape = named_field
            .or(inferred_field)
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map_with_span(|fields, span| Expr::new(ExprKind::Shape(fields), span));

        let atom = choice((literal, call_or_var, parens, shape)).labelled("an expression");

        let member = just(Token::Dot)
            .ignore_then(ident().map_with_span(|name, span: Span| (name, span)))
            .then(args.or_not())
            .labelled("a field or method name after `.`");
        let postfix = atom.then(member.repeated()).foldl(
            |target: Expr, ((name, name_span), args)| match args {
                Some((args, end)) => {
                    let span = target.span.start..end.end;
                    Expr::new(
                        ExprKind::Method {
                            target: Box::new(target),
                            name,
                            name_span,
                            args,
                        },
                        span,
                    )
                }
                None => {
                    let span = target.span.start..name_span.end;
                    Expr::new(
                        ExprKind::Member {
                            target: Box::new(target),
                            name,
                        },
                        span,
                    )
                }
            },
        );

        let unary = just(Token::Bang)
            .to(UnaryOp::Not)
            .or(just(Token::Minus).to(UnaryOp::Neg))
            .map_with_span(|op, span: Span| (op, span))
            .repeated()
            .then(postfix)
            .foldr(|(op, start), operand| {
                let span = start.start..operand.span.end;
                Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                )
            })
            .boxed();

        let product = unary
            .clone()
            .then(
                choice((
                    just(Token::Star).to(BinaryOp::Mul),
                    just(Token::Slash).to(BinaryOp::Div),
                    just(Token::Percent).to(BinaryOp::Rem),
                ))
                .then(unary)
                .repeated(),
            )
            .foldl(|lhs, (op, rhs)| binary(op, lhs, rhs));

        let sum = product
            .clone()
            .then(
                just(Token::Plus)
                    .to(BinaryOp::Add)
                    .or(just(Token::Minus).to(BinaryOp::Sub))
                    .then(product)
                    .repeated(),
            )
            .foldl(|lhs, (op, rhs)| binary(op, lhs, rhs))
            .boxed();

        // Comparisons do not chain.
        let comparison = sum
            .clone()
            .then(
                choice((
                    just(Token::EqEq).to(BinaryOp::Eq),
                    just(Token::NotEq).to(BinaryOp::NotEq),
                    just(Token::Le).to(BinaryOp::Le),
                    just(Token::Lt).to(BinaryOp::Lt),
                    just(Token::Ge).to(BinaryOp::Ge),
                    just(Token::Gt).to(BinaryOp::Gt),
                ))
                .then(sum)
                .or_not(),
            )
            .map(|(lhs, rhs)| match rhs {
                Some((op, rhs)) => binary(op, lhs, rhs),
                None => lhs,
            });

        let and = comparison
            .clone()
            .then(just(Token::AndAnd).to(BinaryOp::And).then(comparison).repeated())
            .foldl(|lhs, (op, rhs)| binary(op, lhs, rhs));

        let or = and
            .clone()
            .then(just(Token::OrOr).to(BinaryOp::Or).then(and).repeated())
            .foldl(|lhs, (op, rhs)| binary(op, lhs, rhs));

        let lambda = ident()
            .map_with_span(|param, span: Span| (param, span))
            .then_ignore(just(Token::FatArrow))
            .then(expr)
            .map(|((param, start), body): ((CompactString, Span), Expr)| {
                let span = start.start..body.span.end;
                Expr::new(
                    ExprKind::Lambda {
                        param,
                        body: Rc::new(body),
                    },
                    span,
                )
            });

        lambda.or(or).boxed()
    })
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.start..rhs.span.end;
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::lexer::lex;

    fn parse(source: &str) -> Result<Expr, Diagnostic> {
        let (tokens, diagnostics) = lex(source);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        parse_expr(&tokens)
    }

    #[test]
    fn method_chain_nests_left_to_right() {
        let expr = parse("allObjects().where(o => o.Bar > 1).count()").expect("parses");
        let ExprKind::Method { name, target, .. } = &expr.kind else {
            panic!("expected method call, got {expr:?}");
        };
        assert_eq!(name.as_str(), "count");
        let ExprKind::Method { name, args, .. } = &target.kind else {
            panic!("expected inner method call");
        };
        assert_eq!(name.as_str(), "where");
        assert!(matches!(args[0].kind, ExprKind::Lambda { .. }));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse("1 + 2 * 3").expect("parses");
        let ExprKind::Binary { op, rhs, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn subtraction_is_left_associative() {
        let expr = parse("10 - 4 - 3").expect("parses");
        let ExprKind::Binary { op, lhs, rhs } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Sub);
        assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
        assert!(matches!(rhs.kind, ExprKind::Literal(Literal::Int(3))));
    }

    #[test]
    fn lambdas_take_the_rest_of_the_expression() {
        let expr = parse("o => o.Bar > 1 && !o.Hidden").expect("parses");
        let ExprKind::Lambda { param, body } = &expr.kind else {
            panic!("expected lambda");
        };
        assert_eq!(param.as_str(), "o");
        assert!(matches!(body.kind, ExprKind::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn shape_names_come_from_last_identifier() {
        let expr = parse("{ o.Bar, total: 1, o }").expect("parses");
        let ExprKind::Shape(fields) = &expr.kind else {
            panic!("expected shape");
        };
        let names: Vec<&str> = fields.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(names, vec!["Bar", "total", "o"]);
    }

    #[test]
    fn shape_fields_without_a_name_stay_unnamed() {
        let expr = parse("{ 1 + 2 }").expect("parses");
        let ExprKind::Shape(fields) = &expr.kind else {
            panic!("expected shape");
        };
        assert!(fields[0].name.is_empty());
        assert_eq!(fields[0].value.span, 2..7);
    }

    #[test]
    fn dangling_operator_points_at_end() {
        let err = parse("1 +").expect_err("incomplete");
        assert!(err.message.contains("end of input"), "{}", err.message);
        assert_eq!(err.span.start, 3);
    }

    #[test]
    fn unit_wrapper_is_required() {
        let (tokens, _) = lex("unit run {\nallObjects()\n}\n");
        let unit = parse_unit(&tokens).expect("parses");
        assert_eq!(unit.name.as_str(), "run");
        assert!(matches!(unit.body.kind, ExprKind::Call { .. }));

        let (tokens, _) = lex("unit run {\n1 }\n}\n");
        let err = parse_unit(&tokens).expect_err("stray brace");
        assert_eq!(err.span, 15..16);
    }

    #[test]
    fn deep_parentheses_are_rejected_before_parsing() {
        let source = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse(&source).expect_err("too deep");
        assert!(err.message.starts_with("query nests too deeply"), "{}", err.message);

        let source = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(matches!(
            parse(&source).map(|expr| expr.kind),
            Ok(ExprKind::Literal(Literal::Int(1)))
        ));
    }

    #[test]
    fn long_operator_chains_count_as_nesting() {
        let source = format!("1{}", " + 1".repeat(1000));
        let err = parse(&source).expect_err("too deep");
        assert!(err.message.starts_with("query nests too deeply"), "{}", err.message);

        let source = format!("!{}", "!".repeat(500) + "true");
        assert!(parse(&source).is_err());

        let source = format!("1{}", " + 1".repeat(10));
        assert!(parse(&source).is_ok());
    }

    #[test]
    fn commas_reset_the_nesting_level() {
        let many_args = vec!["a + b"; 60].join(", ");
        let (tokens, _) = lex(&format!("f({many_args})"));
        assert!(check_nesting(&tokens).is_ok());
    }
}
