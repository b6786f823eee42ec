//! Statement parser: turns template segments into a statement tree,
//! dispatching extension tags to their registered parsers

use std::sync::Arc;

use crate::environment::Extension;
use crate::error::{line_at, Error, SyntaxError};
use crate::syntax::ast::*;
use crate::syntax::lexer::{segments, Segment, Token, TokenStream};

/// Parse preprocessed template source into a statement list
pub fn parse(source: &str, extensions: &[Arc<dyn Extension>]) -> Result<Vec<Spanned<Stmt>>, Error> {
    let segments = segments(source)?;
    let mut parser = Parser {
        source,
        segments: segments.into_iter(),
        extensions,
    };
    let (body, _) = parser.subparse(&[])?;
    Ok(body)
}

struct Parser<'a> {
    source: &'a str,
    segments: std::vec::IntoIter<Segment>,
    extensions: &'a [Arc<dyn Extension>],
}

/// An end tag that stopped a nested body, with the rest of its tokens
struct EndTag<'a> {
    name: String,
    stream: TokenStream<'a>,
}

impl<'a> Parser<'a> {
    /// Parse statements until one of `end_tags` (or end of template when empty)
    fn subparse(
        &mut self,
        end_tags: &[&str],
    ) -> Result<(Vec<Spanned<Stmt>>, Option<EndTag<'a>>), Error> {
        let mut body = Vec::new();

        while let Some(segment) = self.segments.next() {
            match segment {
                Segment::Text { text, span } => body.push(Spanned::new(Stmt::Text(text), span)),
                Segment::Variable { tokens, span } => {
                    let mut stream = TokenStream::new(self.source, tokens, span.end - 2);
                    let expr = stream.parse_expression()?;
                    stream.expect_end()?;
                    body.push(Spanned::new(Stmt::Output(vec![expr]), span));
                }
                Segment::Block { tokens, span } => {
                    let mut stream = TokenStream::new(self.source, tokens, span.end - 2);
                    let (tag, tag_span) = stream.expect_ident()?;
                    if end_tags.contains(&tag.as_str()) {
                        return Ok((body, Some(EndTag { name: tag, stream })));
                    }
                    let stmt = self.parse_statement(Spanned::new(tag, tag_span), stream)?;
                    body.push(Spanned::new(stmt, span));
                }
            }
        }

        if let Some(first) = end_tags.first() {
            let end = self.source.len();
            let expected: Vec<String> = end_tags.iter().map(|t| format!("'{}'", t)).collect();
            return Err(SyntaxError::new(
                format!("unexpected end of template, expected '{}'", first),
                end..end,
                line_at(self.source, end),
            )
            .with_expected(expected)
            .into());
        }

        Ok((body, None))
    }

    fn parse_statement(
        &mut self,
        tag: Spanned<String>,
        mut stream: TokenStream<'a>,
    ) -> Result<Stmt, Error> {
        match tag.node.as_str() {
            "set" => {
                let (target, _) = stream.expect_ident()?;
                stream.expect(&Token::Assign)?;
                let value = stream.parse_expression()?;
                stream.expect_end()?;
                Ok(Stmt::Set { target, value })
            }
            "if" => self.parse_if(stream),
            "for" => {
                let (target, _) = stream.expect_ident()?;
                stream.expect(&Token::Ident("in".to_string()))?;
                let iter = stream.parse_expression()?;
                stream.expect_end()?;
                let (body, end) = self.subparse(&["endfor"])?;
                if let Some(end) = end {
                    end.stream.expect_end()?;
                }
                Ok(Stmt::For { target, iter, body })
            }
            name => {
                let Some(ext) = self.extensions.iter().find(|e| e.tags().contains(&name)) else {
                    return Err(SyntaxError::new(
                        format!("encountered unknown tag '{}'", name),
                        tag.span.clone(),
                        line_at(self.source, tag.span.start),
                    )
                    .into());
                };
                let stmt = ext.parse(&tag, &mut stream)?;
                stream.expect_end()?;
                Ok(stmt)
            }
        }
    }

    fn parse_if(&mut self, mut stream: TokenStream<'a>) -> Result<Stmt, Error> {
        let mut branches = Vec::new();
        let mut otherwise = Vec::new();

        let mut condition = stream.parse_expression()?;
        stream.expect_end()?;

        loop {
            let (body, end) = self.subparse(&["elif", "else", "endif"])?;
            branches.push((condition, body));

            // subparse only returns without an end tag when end_tags is empty
            let Some(EndTag { name, mut stream }) = end else {
                break;
            };
            match name.as_str() {
                "elif" => {
                    condition = stream.parse_expression()?;
                    stream.expect_end()?;
                }
                "else" => {
                    stream.expect_end()?;
                    let (body, end) = self.subparse(&["endif"])?;
                    otherwise = body;
                    if let Some(end) = end {
                        end.stream.expect_end()?;
                    }
                    break;
                }
                _ => {
                    stream.expect_end()?;
                    break;
                }
            }
        }

        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }
}
