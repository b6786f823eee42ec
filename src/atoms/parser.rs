//! Parser for the body of an `atom` tag
//!
//! ```text
//! {% atom <alias>:<dotted.path>(<arg>, ..., <name>=<expr>, ...) %}
//! ```

use std::collections::HashSet;

use crate::error::{format_token, SyntaxError};
use crate::syntax::ast::{Expr, Keyword, Span, Spanned};
use crate::syntax::expr::keyword_constant;
use crate::syntax::lexer::{Token, TokenStream};
use crate::value::Value;

/// `alias:path` part of an atom tag
#[derive(Debug, Clone, PartialEq)]
pub struct AtomReference {
    pub alias: String,
    /// In-module path, concatenated verbatim from the tokens before `(`
    pub path: String,
    /// From the alias to the end of the path
    pub span: Span,
}

impl AtomReference {
    /// Fully-qualified path once the alias is bound to `module`
    pub fn qualify(&self, module: &str) -> String {
        format!("{}.{}", module, self.path)
    }
}

/// A parsed atom tag
#[derive(Debug, Clone, PartialEq)]
pub struct AtomInvocation {
    pub reference: AtomReference,
    pub args: Vec<Spanned<Expr>>,
    pub kwargs: Vec<Keyword>,
    /// From the alias to the closing parenthesis
    pub span: Span,
}

/// Parse an atom invocation; `stream` must be positioned after the `atom` keyword
pub fn parse_atom_tag(stream: &mut TokenStream<'_>) -> Result<AtomInvocation, SyntaxError> {
    let (alias, alias_span) = stream.expect_ident()?;
    stream.expect(&Token::Colon)?;

    let mut path = String::new();
    let mut path_end = stream.current_span().start;
    while !stream.at_eof() && !stream.is(&Token::ParenOpen) {
        path.push_str(stream.current_slice());
        path_end = stream.current_span().end;
        stream.advance();
    }
    if path.is_empty() {
        return Err(stream
            .error("missing atom path")
            .with_expected(vec!["atom path".to_string()]));
    }
    let reference = AtomReference {
        alias,
        path,
        span: alias_span.start..path_end,
    };

    stream.expect(&Token::ParenOpen)?;
    let (args, kwargs) = parse_arguments(stream)?;
    let close = stream.expect(&Token::ParenClose)?;

    Ok(AtomInvocation {
        span: reference.span.start..close.end,
        reference,
        args,
        kwargs,
    })
}

/// Argument list up to, not including, the closing parenthesis
fn parse_arguments(
    stream: &mut TokenStream<'_>,
) -> Result<(Vec<Spanned<Expr>>, Vec<Keyword>), SyntaxError> {
    let mut args = Vec::new();
    let mut kwargs: Vec<Keyword> = Vec::new();
    let mut seen = HashSet::new();

    if stream.is(&Token::ParenClose) {
        return Ok((args, kwargs));
    }

    loop {
        let start = stream.current_span();
        match stream.current() {
            Some(Token::Ident(name)) if stream.peek() == Some(&Token::Assign) => {
                let name = name.clone();
                if !seen.insert(name.clone()) {
                    return Err(stream.error(format!("keyword argument repeated: '{}'", name)));
                }
                stream.advance();
                stream.advance();
                let value = stream.parse_expression()?;
                kwargs.push(Keyword { name, value });
            }
            Some(tok) if is_positional_start(tok) => {
                if !kwargs.is_empty() {
                    return Err(stream.error("positional argument follows keyword argument"));
                }
                args.push(parse_positional(stream)?);
            }
            _ => {
                return Err(stream.unexpected().with_expected(
                    [
                        Token::Ident("name".to_string()),
                        Token::Integer(0),
                        Token::String(String::new()),
                        Token::BracketOpen,
                        Token::BraceOpen,
                        Token::Minus,
                    ]
                    .iter()
                    .map(expected_kind)
                    .collect(),
                ));
            }
        }

        if !stream.skip_if(&Token::Comma) {
            return Ok((args, kwargs));
        }
        // a comma must be followed by another argument
        if stream.is(&Token::ParenClose) {
            return Err(SyntaxError::new(
                "unexpected ')' after ','",
                stream.current_span(),
                stream.line_of(start.start),
            ));
        }
    }
}

fn is_positional_start(tok: &Token) -> bool {
    matches!(
        tok,
        Token::Ident(_)
            | Token::Integer(_)
            | Token::Float(_)
            | Token::String(_)
            | Token::BracketOpen
            | Token::BraceOpen
            | Token::Minus
    )
}

/// Literals become constants, names become references, compound literals
/// go through the expression grammar
fn parse_positional(stream: &mut TokenStream<'_>) -> Result<Spanned<Expr>, SyntaxError> {
    let span = stream.current_span();
    let node = match stream.current() {
        Some(Token::Integer(n)) => Expr::Const(Value::Int(*n)),
        Some(Token::Float(x)) => Expr::Const(Value::Float(*x)),
        Some(Token::String(s)) => Expr::Const(Value::String(s.clone())),
        Some(Token::Ident(name)) => match keyword_constant(name) {
            Some(value) => Expr::Const(value),
            None => Expr::Name(name.clone()),
        },
        _ => return stream.parse_expression(),
    };
    stream.advance();
    Ok(Spanned::new(node, span))
}

fn expected_kind(tok: &Token) -> String {
    match tok {
        Token::Ident(_) => "identifier".to_string(),
        Token::Integer(_) => "integer".to_string(),
        Token::String(_) => "string".to_string(),
        other => format_token(other),
    }
}
