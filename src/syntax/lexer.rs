//! Lexer for template tags and expressions using logos
//!
//! Template source is first split into segments (text, `{{ ... }}`,
//! `{% ... %}`, `{# ... #}`); only the inside of variable and block
//! segments is tokenized.

use logos::Logos;

use crate::error::{format_token, line_at, SyntaxError};

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Segment terminators
    #[token("%}")]
    BlockEnd,
    #[token("}}")]
    VariableEnd,

    // Delimiters
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // Operators (longer first)
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("=")]
    Assign,
    #[token("-")]
    Minus,

    // Literals
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    String(String),
}

/// Strip quotes and resolve backslash escapes
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Lex input string into tokens with spans
pub fn lex(input: &str) -> impl Iterator<Item = (Token, Span)> + '_ {
    Token::lexer(input)
        .spanned()
        .filter_map(|(tok, span)| tok.ok().map(|t| (t, span)))
}

/// A top-level piece of template source
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text { text: String, span: Span },
    /// `{{ ... }}`; tokens exclude the delimiters
    Variable { tokens: Vec<(Token, Span)>, span: Span },
    /// `{% ... %}`; tokens exclude the delimiters
    Block { tokens: Vec<(Token, Span)>, span: Span },
}

impl Segment {
    pub fn span(&self) -> &Span {
        match self {
            Segment::Text { span, .. }
            | Segment::Variable { span, .. }
            | Segment::Block { span, .. } => span,
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Opener {
    Variable,
    Block,
    Comment,
}

/// Split template source into segments
pub fn segments(source: &str) -> Result<Vec<Segment>, SyntaxError> {
    let mut out = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let Some((start, opener)) = next_opener(source, pos) else {
            out.push(Segment::Text {
                text: source[pos..].to_string(),
                span: pos..source.len(),
            });
            break;
        };

        if start > pos {
            out.push(Segment::Text {
                text: source[pos..start].to_string(),
                span: pos..start,
            });
        }

        pos = match opener {
            Opener::Comment => match source[start + 2..].find("#}") {
                Some(rel) => start + 2 + rel + 2,
                None => {
                    return Err(SyntaxError::new(
                        "missing end of comment tag",
                        start..source.len(),
                        line_at(source, start),
                    ))
                }
            },
            Opener::Variable | Opener::Block => {
                let (segment, end) = lex_tag(source, start, opener)?;
                out.push(segment);
                end
            }
        };
    }

    Ok(out)
}

fn next_opener(source: &str, from: usize) -> Option<(usize, Opener)> {
    let rest = &source[from..];
    [
        ("{{", Opener::Variable),
        ("{%", Opener::Block),
        ("{#", Opener::Comment),
    ]
    .into_iter()
    .filter_map(|(pat, opener)| rest.find(pat).map(|i| (from + i, opener)))
    .min_by_key(|(i, _)| *i)
}

/// Tokenize one variable/block segment starting at `start` (the opener)
fn lex_tag(source: &str, start: usize, opener: Opener) -> Result<(Segment, usize), SyntaxError> {
    let base = start + 2;
    let mut lexer = Token::lexer(&source[base..]);
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let closer = if opener == Opener::Block { "'%}'" } else { "'}}'" };

    loop {
        let Some(result) = lexer.next() else {
            return Err(SyntaxError::new(
                format!("unexpected end of template, expected {}", closer),
                start..source.len(),
                line_at(source, start),
            )
            .with_expected(vec![closer.to_string()]));
        };
        let span = (base + lexer.span().start)..(base + lexer.span().end);

        let tok = match result {
            Ok(tok) => tok,
            Err(()) => {
                return Err(SyntaxError::new(
                    format!("unexpected character '{}'", &source[span.clone()]),
                    span.clone(),
                    line_at(source, span.start),
                ))
            }
        };

        match (tok, opener) {
            (Token::BlockEnd, Opener::Block) => {
                let segment = Segment::Block {
                    tokens,
                    span: start..span.end,
                };
                return Ok((segment, span.end));
            }
            (Token::VariableEnd, Opener::Variable) if depth == 0 => {
                let segment = Segment::Variable {
                    tokens,
                    span: start..span.end,
                };
                return Ok((segment, span.end));
            }
            (Token::VariableEnd, _) => {
                // `}}` closing nested map literals
                tokens.push((Token::BraceClose, span.start..span.start + 1));
                tokens.push((Token::BraceClose, span.start + 1..span.end));
                depth = depth.saturating_sub(2);
            }
            (Token::BlockEnd, Opener::Variable) => {
                return Err(SyntaxError::new(
                    format!("unexpected {}", format_token(&Token::BlockEnd)),
                    span.clone(),
                    line_at(source, span.start),
                ));
            }
            (tok, _) => {
                match tok {
                    Token::BraceOpen => depth += 1,
                    Token::BraceClose => depth = depth.saturating_sub(1),
                    _ => {}
                }
                tokens.push((tok, span));
            }
        }
    }
}

/// Cursor over the tokens of one tag, with the `expect`/`current`/advance
/// operations tag parsers are written against
#[derive(Debug, Clone)]
pub struct TokenStream<'s> {
    source: &'s str,
    tokens: Vec<(Token, Span)>,
    pos: usize,
    /// Offset of the closing delimiter; spans at end of stream point here
    end: usize,
}

impl<'s> TokenStream<'s> {
    pub fn new(source: &'s str, tokens: Vec<(Token, Span)>, end: usize) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            end,
        }
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|(t, _)| t)
    }

    pub fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| s.clone())
            .unwrap_or(self.end..self.end)
    }

    /// Raw source text of the current token
    pub fn current_slice(&self) -> &'s str {
        let span = self.current_span();
        &self.source[span]
    }

    pub fn is(&self, tok: &Token) -> bool {
        self.current() == Some(tok)
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn advance(&mut self) -> Option<(Token, Span)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    pub fn skip_if(&mut self, tok: &Token) -> bool {
        if self.is(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume `tok` or fail with a syntax error at the current position
    pub fn expect(&mut self, tok: &Token) -> Result<Span, SyntaxError> {
        if self.is(tok) {
            let span = self.current_span();
            self.pos += 1;
            return Ok(span);
        }
        Err(self
            .unexpected()
            .with_expected(vec![format_token(tok)]))
    }

    pub fn expect_ident(&mut self) -> Result<(String, Span), SyntaxError> {
        match self.current() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                let span = self.current_span();
                self.pos += 1;
                Ok((name, span))
            }
            _ => Err(self.unexpected().with_expected(vec!["identifier".to_string()])),
        }
    }

    /// Fail unless every token of the tag has been consumed
    pub fn expect_end(&self) -> Result<(), SyntaxError> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(self
                .unexpected()
                .with_expected(vec!["end of statement block".to_string()]))
        }
    }

    /// Syntax error describing the current token
    pub fn unexpected(&self) -> SyntaxError {
        let message = match self.current() {
            Some(tok) => format!("unexpected {}", format_token(tok)),
            None => "unexpected end of statement".to_string(),
        };
        self.error(message)
    }

    pub fn error(&self, message: impl Into<String>) -> SyntaxError {
        let span = self.current_span();
        let line = self.line_of(span.start);
        SyntaxError::new(message, span, line)
    }

    pub fn line_of(&self, offset: usize) -> usize {
        line_at(self.source, offset)
    }

    pub(crate) fn remaining(&self) -> &[(Token, Span)] {
        &self.tokens[self.pos..]
    }

    pub(crate) fn end_offset(&self) -> usize {
        self.end
    }

    /// Skip all tokens starting before byte offset `end`
    pub(crate) fn seek_past(&mut self, end: usize) {
        while self.pos < self.tokens.len() && self.tokens[self.pos].1.start < end {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).map(|(t, _)| t).collect()
    }

    #[test]
    fn test_atom_tag_tokens() {
        assert_eq!(
            tokens("atom ta:abc.simple_block()"),
            vec![
                Token::Ident("atom".to_string()),
                Token::Ident("ta".to_string()),
                Token::Colon,
                Token::Ident("abc".to_string()),
                Token::Dot,
                Token::Ident("simple_block".to_string()),
                Token::ParenOpen,
                Token::ParenClose,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            tokens(r#"38 3.5 "parrots" 'single \'q\''"#),
            vec![
                Token::Integer(38),
                Token::Float(3.5),
                Token::String("parrots".to_string()),
                Token::String("single 'q'".to_string()),
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("a = b == c != d"),
            vec![
                Token::Ident("a".to_string()),
                Token::Assign,
                Token::Ident("b".to_string()),
                Token::EqEq,
                Token::Ident("c".to_string()),
                Token::NotEq,
                Token::Ident("d".to_string()),
            ]
        );
    }

    #[test]
    fn test_minus() {
        assert_eq!(
            tokens("x[-1]"),
            vec![
                Token::Ident("x".to_string()),
                Token::BracketOpen,
                Token::Minus,
                Token::Integer(1),
                Token::BracketClose,
            ]
        );
    }

    #[test]
    fn test_segments_split() {
        let segs = segments("<p>{{ x }}</p>{# note #}{% set y = 1 %}").unwrap();
        assert_eq!(segs.len(), 4);
        assert!(matches!(&segs[0], Segment::Text { text, .. } if text == "<p>"));
        assert!(matches!(&segs[1], Segment::Variable { tokens, .. } if tokens.len() == 1));
        assert!(matches!(&segs[2], Segment::Text { text, .. } if text == "</p>"));
        assert!(matches!(&segs[3], Segment::Block { tokens, .. } if tokens.len() == 4));
    }

    #[test]
    fn test_segments_nested_map_close() {
        let segs = segments("{% set m = {'a': {'b': 1}} %}").unwrap();
        match &segs[0] {
            Segment::Block { tokens, .. } => {
                let closes = tokens
                    .iter()
                    .filter(|(t, _)| *t == Token::BraceClose)
                    .count();
                assert_eq!(closes, 2);
            }
            other => panic!("Expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_block() {
        let err = segments("text\n{% atom ta:abc.simple_block }").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("expected '%}'"));
    }

    #[test]
    fn test_unclosed_comment() {
        assert!(segments("{# never closed").is_err());
    }

    #[test]
    fn test_stream_expect() {
        let source = "ta:echo";
        let toks: Vec<_> = lex(source).collect();
        let mut stream = TokenStream::new(source, toks, source.len());
        assert_eq!(stream.expect_ident().unwrap().0, "ta");
        stream.expect(&Token::Colon).unwrap();
        assert_eq!(stream.current_slice(), "echo");
        stream.advance();
        assert!(stream.at_eof());
        let err = stream.expect(&Token::ParenOpen).unwrap_err();
        assert_eq!(err.message, "unexpected end of statement");
        assert_eq!(err.expected, vec!["'('".to_string()]);
    }
}
