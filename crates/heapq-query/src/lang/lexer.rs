//! Tokenizer for query source.
//!
//! Spans are character offsets, which is what the diagnostic renderer
//! expects.

use std::fmt;

use chumsky::prelude::*;
use compact_str::CompactString;

use super::{Diagnostic, Span};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    // Keywords
    Unit,
    True,
    False,
    Null,

    Ident(CompactString),
    Int(i64),
    /// Literal text; always parses as an `f64`.
    Float(CompactString),
    Str(String),

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    Comma,    // ,
    Dot,      // .
    Colon,    // :
    FatArrow, // =>

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Unit => write!(f, "unit"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Int(value) => write!(f, "{value}"),
            Token::Float(text) => write!(f, "{text}"),
            Token::Str(value) => write!(f, "{value:?}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::FatArrow => write!(f, "=>"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Bang => write!(f, "!"),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
        }
    }
}

/// Tokenizes `source`, reporting every lexical error rather than stopping
/// at the first. Bad input is skipped so the rest can still be parsed.
pub fn lex(source: &str) -> (Vec<(Token, Span)>, Vec<Diagnostic>) {
    let (tokens, errors) = lexer().parse_recovery(source);
    let diagnostics = errors.into_iter().map(Diagnostic::from).collect();
    (tokens.unwrap_or_default(), diagnostics)
}

/// Builds the token lexer. Rejected input produces `None` items alongside an
/// emitted error, so the lexer itself never fails.
pub fn lexer() -> impl Parser<char, Vec<(Token, Span)>, Error = Simple<char>> {
    let line_comment = just("//")
        .then(none_of('\n').repeated())
        .to(None::<Token>);

    // Anything no other rule accepts is reported and skipped, one character
    // at a time.
    let stray = any().validate(|c: char, span: Span, emit| {
        emit(Simple::custom(span, format!("unexpected character {c:?}")));
        None::<Token>
    });

    let item = choice((
        line_comment,
        number(),
        string(),
        word().map(Some),
        punctuation(),
        stray,
    ));

    text::whitespace()
        .ignore_then(
            item.map_with_span(|token, span| token.map(|token| (token, span)))
                .then_ignore(text::whitespace())
                .repeated(),
        )
        .then_ignore(end())
        .map(|items| items.into_iter().flatten().collect())
}

fn word() -> impl Parser<char, Token, Error = Simple<char>> + Clone {
    filter(|c: &char| c.is_alphabetic() || *c == '_')
        .then(filter(|c: &char| c.is_alphanumeric() || *c == '_').repeated())
        .map(|(first, rest)| {
            let mut word = CompactString::default();
            word.push(first);
            word.extend(rest);
            match word.as_str() {
                "unit" => Token::Unit,
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                _ => Token::Ident(word),
            }
        })
}

fn number() -> impl Parser<char, Option<Token>, Error = Simple<char>> + Clone {
    // Addresses use the full u64 range; the bit pattern is kept.
    let hex = just('0')
        .ignore_then(one_of("xX"))
        .ignore_then(
            filter(|c: &char| c.is_ascii_alphanumeric())
                .repeated()
                .at_least(1)
                .collect::<String>(),
        )
        .validate(|digits: String, span: Span, emit| {
            match u64::from_str_radix(&digits, 16) {
                Ok(value) => Some(Token::Int(value as i64)),
                Err(_) => {
                    emit(Simple::custom(span, format!("invalid hex literal \"0x{digits}\"")));
                    None
                }
            }
        });

    // `2.x` is member access on an integer, so a fraction needs a digit
    // after the dot.
    let decimal = text::digits(10)
        .then(just('.').ignore_then(text::digits(10)).or_not())
        .validate(|(whole, fraction): (String, Option<String>), span: Span, emit| {
            match fraction {
                Some(fraction) => Some(Token::Float(CompactString::from(format!(
                    "{whole}.{fraction}"
                )))),
                None => match whole.parse::<i64>() {
                    Ok(value) => Some(Token::Int(value)),
                    Err(_) => {
                        emit(Simple::custom(
                            span,
                            format!("integer literal {whole} is out of range"),
                        ));
                        None
                    }
                },
            }
        });

    hex.or(decimal)
}

fn string() -> impl Parser<char, Option<Token>, Error = Simple<char>> + Clone {
    let known_escape = just('\\').ignore_then(choice((
        just('n').to('\n'),
        just('t').to('\t'),
        just('"'),
        just('\\'),
    )));
    let unknown_escape = just('\\')
        .ignore_then(none_of('\n'))
        .validate(|other: char, span: Span, emit| {
            emit(Simple::custom(span, format!("unknown escape \\{other}")));
            other
        });
    let plain = filter(|c: &char| !matches!(c, '"' | '\\' | '\n'));

    just('"')
        .ignore_then(choice((known_escape, unknown_escape, plain)).repeated().collect::<String>())
        .then(just('"').or_not())
        .validate(|(value, closed): (String, Option<char>), span: Span, emit| match closed {
            Some(_) => Some(Token::Str(value)),
            None => {
                emit(Simple::custom(span, "unterminated string literal"));
                None
            }
        })
}

fn punctuation() -> impl Parser<char, Option<Token>, Error = Simple<char>> + Clone {
    let two_char = choice((
        just("=>").to(Token::FatArrow),
        just("==").to(Token::EqEq),
        just("!=").to(Token::NotEq),
        just("<=").to(Token::Le),
        just(">=").to(Token::Ge),
        just("&&").to(Token::AndAnd),
        just("||").to(Token::OrOr),
    ));
    let one_char = choice((
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just('{').to(Token::LBrace),
        just('}').to(Token::RBrace),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just(':').to(Token::Colon),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
        just('!').to(Token::Bang),
        just('<').to(Token::Lt),
        just('>').to(Token::Gt),
    ));
    let lone_eq = just('=').validate(|_, span: Span, emit| {
        emit(Simple::custom(span, "unexpected '=', use '==' to compare"));
        None::<Token>
    });

    two_char.or(one_char).map(Some).or(lone_eq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        let (tokens, diagnostics) = lex(source);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        tokens.into_iter().map(|(token, _)| token).collect()
    }

    #[test]
    fn lexes_lambda_and_comparison() {
        assert_eq!(
            kinds("o => o.Bar >= 2"),
            vec![
                Token::Ident("o".into()),
                Token::FatArrow,
                Token::Ident("o".into()),
                Token::Dot,
                Token::Ident("Bar".into()),
                Token::Ge,
                Token::Int(2),
            ]
        );
    }

    #[test]
    fn hex_literals_keep_the_full_address_range() {
        assert_eq!(kinds("0x1000")[0], Token::Int(0x1000));
        assert_eq!(kinds("0xffffffffffffffff")[0], Token::Int(-1));
    }

    #[test]
    fn member_access_on_integer_is_not_a_float() {
        assert_eq!(
            kinds("1.5 2.x"),
            vec![
                Token::Float("1.5".into()),
                Token::Int(2),
                Token::Dot,
                Token::Ident("x".into()),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\"b\n""#)[0], Token::Str("a\"b\n".into()));
    }

    #[test]
    fn comments_run_to_the_end_of_the_line() {
        assert_eq!(kinds("1 // two\n3"), vec![Token::Int(1), Token::Int(3)]);
    }

    #[test]
    fn reports_every_bad_character() {
        let (tokens, diagnostics) = lex("1 @ 2 # 3");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].span, 2..3);
        assert_eq!(diagnostics[0].message, "unexpected character '@'");
        assert_eq!(diagnostics[1].span, 6..7);
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn unterminated_strings_are_reported() {
        let (_, diagnostics) = lex("\"abc\n1");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "unterminated string literal");
    }

    #[test]
    fn spans_count_characters_not_bytes() {
        let (tokens, diagnostics) = lex("\"éé\" @");
        assert_eq!(tokens[0].1, 0..4);
        assert_eq!(diagnostics[0].span, 5..6);
    }

    #[test]
    fn spans_cover_the_lexeme() {
        let (tokens, _) = lex("allObjects()");
        assert_eq!(tokens[0].1, 0..10);
        assert_eq!(tokens[1].1, 10..11);
        assert_eq!(tokens.len(), 3);
    }
}
