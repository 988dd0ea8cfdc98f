use std::error::Error;
use std::fmt;

use ariadne::{Config, Label, Report, ReportKind, Source};
use chumsky::error::{Simple, SimpleReason};

use super::Span;
use super::lexer::Token;

/// One compiler complaint about the wrapped query source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }

    /// Renders the diagnostic with the offending source line underneath.
    pub fn render(&self, source: &str) -> String {
        let span = clamp_span(&self.span, source.chars().count());
        let mut output = Vec::new();
        let written = Report::build(ReportKind::Error, (), span.start)
            .with_config(Config::default().with_color(false))
            .with_message(&self.message)
            .with_label(Label::new(span).with_message(&self.message))
            .finish()
            .write(Source::from(source), &mut output);
        match written {
            Ok(()) => String::from_utf8_lossy(&output).into_owned(),
            Err(_) => format!("error at {self}\n"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}: {}", self.span.start, self.span.end, self.message)
    }
}

impl Error for Diagnostic {}

impl From<Simple<char>> for Diagnostic {
    fn from(error: Simple<char>) -> Self {
        let message = match error.reason() {
            SimpleReason::Custom(message) => message.clone(),
            _ => match error.found() {
                Some(c) => format!("unexpected character {c:?}"),
                None => "unexpected end of input".to_string(),
            },
        };
        Self::new(error.span(), message)
    }
}

impl From<Simple<Token>> for Diagnostic {
    fn from(error: Simple<Token>) -> Self {
        let found = error
            .found()
            .map(|token| format!("`{token}`"))
            .unwrap_or_else(|| "end of input".to_string());
        let message = match error.reason() {
            SimpleReason::Custom(message) => message.clone(),
            SimpleReason::Unclosed { delimiter, .. } => {
                format!("unclosed `{delimiter}`, found {found}")
            }
            SimpleReason::Unexpected => match error.label() {
                Some(label) => format!("expected {label}, found {found}"),
                None => {
                    let mut expected: Vec<String> = error
                        .expected()
                        .map(|token| match token {
                            Some(token) => format!("`{token}`"),
                            None => "end of input".to_string(),
                        })
                        .collect();
                    expected.sort();
                    if expected.is_empty() {
                        format!("unexpected {found}")
                    } else {
                        format!("expected {}, found {found}", expected.join(" or "))
                    }
                }
            },
        };
        Self::new(error.span(), message)
    }
}

/// Concatenates every rendered diagnostic, in production order.
pub fn render_all(source: &str, diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|diagnostic| diagnostic.render(source))
        .collect()
}

// Spans and `len` count characters. Labels need a non-empty span inside the
// source; end-of-input errors point at the last character.
fn clamp_span(span: &Span, len: usize) -> Span {
    if len == 0 {
        return 0..0;
    }
    let start = span.start.min(len - 1);
    let end = span.end.clamp(start + 1, len);
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_names_the_problem() {
        let source = "unit run {\n1 +\n}\n";
        let rendered = Diagnostic::new(13..14, "expected an expression").render(source);
        assert!(rendered.contains("expected an expression"), "{rendered}");
        assert!(rendered.contains("1 +"), "{rendered}");
    }

    #[test]
    fn end_of_input_spans_are_clamped() {
        assert_eq!(clamp_span(&(10..10), 10), 9..10);
        assert_eq!(clamp_span(&(3..3), 10), 3..4);
        assert_eq!(clamp_span(&(2..5), 10), 2..5);
    }

    #[test]
    fn render_all_keeps_order() {
        let source = "unit run {\n@ #\n}\n";
        let rendered = render_all(
            source,
            &[
                Diagnostic::new(11..12, "first complaint"),
                Diagnostic::new(13..14, "second complaint"),
            ],
        );
        let first = rendered.find("first complaint").expect("first rendered");
        let second = rendered.find("second complaint").expect("second rendered");
        assert!(first < second);
    }

    #[test]
    fn spans_past_non_ascii_text_point_at_the_right_character() {
        // Each `é` is two bytes but one character.
        let source = "unit run {\n\"éééééé\" + @ + 1\n}\n";
        let at = source.chars().position(|c| c == '@').expect("has @");
        let rendered = Diagnostic::new(at..at + 1, "unexpected character '@'").render(source);

        let mut lines = rendered.lines().skip_while(|line| !line.contains("éééééé"));
        let snippet = lines.next().expect("snippet line shown");
        let marker = lines.next().expect("marker line follows the snippet");
        let column = |line: &str, needle: char| line.chars().position(|c| c == needle);
        assert!(column(snippet, '@').is_some(), "{rendered}");
        assert_eq!(column(snippet, '@'), column(marker, '┬'), "{rendered}");
    }

    #[test]
    fn clamping_counts_characters() {
        let source = "\"éé\"";
        let rendered = Diagnostic::new(4..4, "expected an expression").render(source);
        assert!(rendered.contains("\"éé\""), "{rendered}");
    }
}
