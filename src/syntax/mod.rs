//! Template syntax: lexer, AST, expression grammar and statement parser

pub mod ast;
pub mod expr;
pub mod lexer;
pub mod parser;

pub use ast::{AtomHandle, Call, CompareOp, Expr, Keyword, Spanned, Stmt};
pub use lexer::{Segment, Token, TokenStream};
pub use parser::parse;
