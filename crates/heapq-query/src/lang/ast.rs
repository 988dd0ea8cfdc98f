use std::rc::Rc;

use compact_str::CompactString;

use super::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Var(CompactString),
    /// Call of a global function.
    Call {
        name: CompactString,
        args: Vec<Expr>,
    },
    Member {
        target: Box<Expr>,
        name: CompactString,
    },
    Method {
        target: Box<Expr>,
        name: CompactString,
        name_span: Span,
        args: Vec<Expr>,
    },
    Lambda {
        param: CompactString,
        body: Rc<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `{ name: expr, ... }`
    Shape(Vec<ShapeField>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeField {
    pub name: CompactString,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

/// The parsed wrapper: `unit <name> { <body> }`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDecl {
    pub name: CompactString,
    pub body: Rc<Expr>,
}
