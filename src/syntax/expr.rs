//! Expression grammar using chumsky
//!
//! Tag parsers call [`TokenStream::parse_expression`] to delegate
//! literals, lists, maps and keyword values to this grammar. Only the
//! longest valid expression at the cursor is consumed; the rest of the
//! tag is left for the caller.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::SyntaxError;
use crate::syntax::ast::*;
use crate::syntax::lexer::{Token, TokenStream};
use crate::value::Value;

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

#[derive(Debug, Clone)]
enum Suffix {
    Attr(String),
    Item(Spanned<Expr>),
    Call(Vec<Spanned<Expr>>, Vec<Keyword>),
}

#[derive(Debug, Clone)]
enum CallArg {
    Positional(Spanned<Expr>),
    Keyword(Keyword),
}

/// Identifiers that spell constants
pub(crate) fn keyword_constant(ident: &str) -> Option<Value> {
    match ident {
        "true" | "True" => Some(Value::Bool(true)),
        "false" | "False" => Some(Value::Bool(false)),
        "none" | "None" => Some(Value::None),
        _ => None,
    }
}

fn apply_suffix(base: Spanned<Expr>, (suffix, span): (Suffix, std::ops::Range<usize>)) -> Spanned<Expr> {
    let span = base.span.start..span.end;
    let node = match suffix {
        Suffix::Attr(name) => Expr::GetAttr(Box::new(base), name),
        Suffix::Item(index) => Expr::GetItem(Box::new(base), Box::new(index)),
        Suffix::Call(args, kwargs) => Expr::Call(Call {
            callee: Box::new(base),
            args,
            kwargs,
        }),
    };
    Spanned::new(node, span)
}

pub(crate) fn expression_parser<'a, I>(
) -> impl Parser<'a, I, Spanned<Expr>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Integer(n) => Expr::Const(Value::Int(n)),
            Token::Float(x) => Expr::Const(Value::Float(x)),
            Token::String(s) => Expr::Const(Value::String(s)),
        };

        let name = select! {
            Token::Ident(s) if s != "not" => s,
        }
        .map(|s: String| match keyword_constant(&s) {
            Some(value) => Expr::Const(value),
            None => Expr::Name(s),
        });

        // [a, b, c]
        let list = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::List);

        // {key: value, ...}
        let map = expr
            .clone()
            .then_ignore(just(Token::Colon))
            .then(expr.clone())
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
            .map(Expr::Map);

        let parens = expr
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
            .map(|e: Spanned<Expr>| e.node);

        let primary = choice((literal, name, list, map, parens))
            .map_with(|node, e| Spanned::new(node, span_range(&e.span())));

        // name=value must be tried before a plain positional expression
        let call_arg = select! { Token::Ident(s) => s }
            .then_ignore(just(Token::Assign))
            .then(expr.clone())
            .map(|(name, value)| CallArg::Keyword(Keyword { name, value }))
            .or(expr.clone().map(CallArg::Positional));

        let suffix = choice((
            just(Token::Dot)
                .ignore_then(select! { Token::Ident(s) => s })
                .map(Suffix::Attr),
            expr.clone()
                .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map(Suffix::Item),
            call_arg
                .separated_by(just(Token::Comma))
                .allow_trailing()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose))
                .map(|call_args| {
                    let mut args = Vec::new();
                    let mut kwargs = Vec::new();
                    for arg in call_args {
                        match arg {
                            CallArg::Positional(e) => args.push(e),
                            CallArg::Keyword(k) => kwargs.push(k),
                        }
                    }
                    Suffix::Call(args, kwargs)
                }),
        ))
        .map_with(|s, e| (s, span_range(&e.span())));

        let postfix = primary
            .then(suffix.repeated().collect::<Vec<_>>())
            .map(|(base, suffixes)| suffixes.into_iter().fold(base, apply_suffix));

        let compare_op = choice((
            just(Token::EqEq).to(CompareOp::Eq),
            just(Token::NotEq).to(CompareOp::Ne),
        ));

        // -x binds looser than suffixes: -a.b is -(a.b)
        let unary = just(Token::Minus)
            .map_with(|_, e| span_range(&e.span()).start)
            .repeated()
            .collect::<Vec<_>>()
            .then(postfix)
            .map(|(negs, inner)| {
                negs.into_iter().rev().fold(inner, |acc, start| {
                    let span = start..acc.span.end;
                    Spanned::new(Expr::Neg(Box::new(acc)), span)
                })
            });

        let comparison = unary
            .clone()
            .then(compare_op.then(unary).or_not())
            .map(|(left, rest)| match rest {
                None => left,
                Some((op, right)) => {
                    let span = left.span.start..right.span.end;
                    Spanned::new(Expr::Compare(Box::new(left), op, Box::new(right)), span)
                }
            });

        just(Token::Ident("not".to_string()))
            .map_with(|_, e| span_range(&e.span()).start)
            .repeated()
            .collect::<Vec<_>>()
            .then(comparison)
            .map(|(nots, inner)| {
                nots.into_iter().rev().fold(inner, |acc, start| {
                    let span = start..acc.span.end;
                    Spanned::new(Expr::Not(Box::new(acc)), span)
                })
            })
            .boxed()
    })
}

impl TokenStream<'_> {
    /// Parse one expression at the cursor, leaving following tokens unconsumed
    pub fn parse_expression(&mut self) -> Result<Spanned<Expr>, SyntaxError> {
        let eoi = self.end_offset();
        let token_iter = self
            .remaining()
            .to_vec()
            .into_iter()
            .map(|(tok, span)| (tok, SimpleSpan::from(span)));

        // Turn the token iterator into a stream that chumsky can use
        let token_stream = Stream::from_iter(token_iter).map((eoi..eoi).into(), |(t, s): (_, _)| (t, s));

        let result = expression_parser()
            .then_ignore(any().repeated())
            .parse(token_stream)
            .into_result();

        match result {
            Ok(expr) => {
                self.seek_past(expr.span.end);
                Ok(expr)
            }
            Err(errs) => Err(match errs.into_iter().next() {
                Some(err) => SyntaxError::from_rich(err, self.source()),
                None => self.unexpected(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::lexer::lex;
    use pretty_assertions::assert_eq;

    fn stream(source: &str) -> TokenStream<'_> {
        TokenStream::new(source, lex(source).collect(), source.len())
    }

    fn parse(source: &str) -> Expr {
        stream(source).parse_expression().expect("Should parse").node
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("42"), Expr::Const(Value::Int(42)));
        assert_eq!(parse("'x'"), Expr::Const(Value::String("x".to_string())));
        assert_eq!(parse("True"), Expr::Const(Value::Bool(true)));
        assert_eq!(parse("none"), Expr::Const(Value::None));
    }

    #[test]
    fn test_parse_list_and_map() {
        match parse("[1, 2, 3]") {
            Expr::List(items) => assert_eq!(items.len(), 3),
            other => panic!("Expected list, got {:?}", other),
        }
        match parse("{'a': 1, 'b': [2]}") {
            Expr::Map(pairs) => {
                assert_eq!(pairs.len(), 2);
                assert!(matches!(pairs[1].1.node, Expr::List(_)));
            }
            other => panic!("Expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_suffixes() {
        match parse("kwargs.months") {
            Expr::GetAttr(base, name) => {
                assert_eq!(base.node, Expr::Name("kwargs".to_string()));
                assert_eq!(name, "months");
            }
            other => panic!("Expected attribute, got {:?}", other),
        }
        assert!(matches!(parse("args[0]"), Expr::GetItem(_, _)));
        match parse("f(1, x, k=2)") {
            Expr::Call(call) => {
                assert_eq!(call.args.len(), 2);
                assert_eq!(call.kwargs.len(), 1);
                assert_eq!(call.kwargs[0].name, "k");
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_not_and_compare() {
        match parse("not a == 1") {
            Expr::Not(inner) => assert!(matches!(inner.node, Expr::Compare(_, CompareOp::Eq, _))),
            other => panic!("Expected not, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_negation() {
        match parse("-1") {
            Expr::Neg(inner) => assert_eq!(inner.node, Expr::Const(Value::Int(1))),
            other => panic!("Expected negation, got {:?}", other),
        }
        match parse("-a.b == --2") {
            Expr::Compare(left, CompareOp::Eq, right) => {
                assert!(matches!(left.node, Expr::Neg(ref inner) if matches!(inner.node, Expr::GetAttr(_, _))));
                assert!(matches!(right.node, Expr::Neg(ref inner) if matches!(inner.node, Expr::Neg(_))));
            }
            other => panic!("Expected comparison, got {:?}", other),
        }
        assert!(matches!(parse("items[-1]"), Expr::GetItem(_, _)));
    }

    #[test]
    fn test_parse_stops_at_trailing_tokens() {
        let mut s = stream("[1, 2], days=31");
        let expr = s.parse_expression().unwrap();
        assert!(matches!(expr.node, Expr::List(_)));
        assert!(s.is(&Token::Comma));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let source = "\n\n[1, 2";
        let err = stream(source).parse_expression().unwrap_err();
        assert_eq!(err.line, 3);
    }
}
