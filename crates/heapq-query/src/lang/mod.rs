//! The embedded query language: lexer, parser and name resolution.

use std::ops::Range;

pub mod ast;
mod diagnostic;
pub mod lexer;
pub mod parser;
mod resolve;

pub use diagnostic::{Diagnostic, render_all};
pub use resolve::resolve;

/// Character range into the wrapped query source.
pub type Span = Range<usize>;
