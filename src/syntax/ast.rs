//! Abstract syntax tree for compiled templates

use std::fmt;
use std::sync::Arc;

use crate::value::{Callable, Value};

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Template statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Literal template text
    Text(String),
    /// Print the values of expressions: `{{ expr }}`, atom tags
    Output(Vec<Spanned<Expr>>),
    /// `{% set name = expr %}`
    Set { target: String, value: Spanned<Expr> },
    /// `{% if %} ... {% elif %} ... {% else %} ... {% endif %}`
    If {
        branches: Vec<(Spanned<Expr>, Vec<Spanned<Stmt>>)>,
        otherwise: Vec<Spanned<Stmt>>,
    },
    /// `{% for target in iter %} ... {% endfor %}`
    For {
        target: String,
        iter: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

/// Expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Value),
    Name(String),
    List(Vec<Spanned<Expr>>),
    Map(Vec<(Spanned<Expr>, Spanned<Expr>)>),
    GetAttr(Box<Spanned<Expr>>, String),
    GetItem(Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    Not(Box<Spanned<Expr>>),
    /// Unary minus
    Neg(Box<Spanned<Expr>>),
    Compare(Box<Spanned<Expr>>, CompareOp, Box<Spanned<Expr>>),
    Call(Call),
    /// Pre-resolved callee bound at compile time
    Atom(AtomHandle),
}

/// Call with ordered positional and unordered keyword arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: Box<Spanned<Expr>>,
    pub args: Vec<Spanned<Expr>>,
    pub kwargs: Vec<Keyword>,
}

/// `name=value` argument
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: String,
    pub value: Spanned<Expr>,
}

/// A resolved atom referenced by a compiled template
#[derive(Clone)]
pub struct AtomHandle {
    /// Cache key the atom was stored under
    pub key: String,
    /// Fully-qualified dotted path
    pub path: String,
    pub callable: Arc<dyn Callable>,
}

impl fmt::Debug for AtomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomHandle")
            .field("key", &self.key)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl PartialEq for AtomHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Arc::ptr_eq(&self.callable, &other.callable)
    }
}
