//! Error types for template compilation, atom resolution and rendering

use std::path::PathBuf;

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::syntax::lexer::Token;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Broad error classes, used by callers that only care about the category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed template, directive or atom tag
    Syntax,
    /// Atom tag references an undeclared namespace alias
    Namespace,
    /// Fully-qualified atom path does not name a registered atom
    Resolution,
    /// Atom function rejected its arguments or returned an unusable context
    Invocation,
    /// Template loading or host rendering failure
    Template,
    /// Configuration could not be read or parsed
    Config,
}

/// A malformed template construct, always tied to a source location
#[derive(Debug, Clone, PartialEq, Error)]
#[error("syntax error at line {line}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
    pub line: usize,
    pub expected: Vec<String>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span, line: usize) -> Self {
        Self {
            message: message.into(),
            span,
            line,
            expected: Vec::new(),
        }
    }

    pub fn with_expected(mut self, expected: Vec<String>) -> Self {
        self.expected = expected;
        self
    }

    /// Convert a chumsky error, locating it in `source`
    pub(crate) fn from_rich(err: chumsky::error::Rich<'_, Token>, source: &str) -> Self {
        use chumsky::error::{RichPattern, RichReason};

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => match found {
                Some(tok) => format!("unexpected {}", format_token(tok)),
                None => "unexpected end of statement".to_string(),
            },
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                RichPattern::Token(tok) => Some(format_token(tok)),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of statement".to_string()),
                RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                RichPattern::Any => Some("any token".to_string()),
                RichPattern::SomethingElse => None,
            })
            .collect();

        let span = err.span().into_range();
        let line = line_at(source, span.start);
        Self {
            message,
            span,
            line,
            expected,
        }
    }
}

/// Failures raised while calling an atom at render time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvocationError {
    #[error("{function}() missing required argument: '{name}'")]
    MissingArgument { function: String, name: String },

    #[error("{function}() takes at most {max} positional arguments but {given} were given")]
    TooManyArguments {
        function: String,
        max: usize,
        given: usize,
    },

    #[error("{function}() got an unexpected keyword argument '{name}'")]
    UnexpectedKeyword { function: String, name: String },

    /// The atom function returned something other than a mapping
    #[error("atom template \"{template}\" expects a mapping context, got {found}")]
    ContextMismatch { template: String, found: String },

    /// Error reported by the atom function itself
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("\"{alias}\" atom namespace not found (line {line})")]
    NamespaceNotFound {
        alias: String,
        span: Span,
        line: usize,
    },

    /// The owning module exists but has no atom under the terminal segment
    #[error("atom \"{path}\" not found (line {line})")]
    AtomNotFound { path: String, span: Span, line: usize },

    /// The owning module of an atom path is not registered
    #[error("module \"{module}\" of atom \"{path}\" is not registered (line {line})")]
    ModuleNotFound {
        module: String,
        path: String,
        span: Span,
        line: usize,
    },

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error("template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("render error at line {line}: {message}")]
    Render {
        message: String,
        span: Span,
        line: usize,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Syntax(_) => ErrorKind::Syntax,
            Error::NamespaceNotFound { .. } => ErrorKind::Namespace,
            Error::AtomNotFound { .. } | Error::ModuleNotFound { .. } => ErrorKind::Resolution,
            Error::Invocation(_) => ErrorKind::Invocation,
            Error::TemplateNotFound { .. } | Error::Render { .. } => ErrorKind::Template,
            Error::Io { .. } | Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Source line (1-based) of the offending construct, if it has one
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Syntax(e) => Some(e.line),
            Error::NamespaceNotFound { line, .. }
            | Error::AtomNotFound { line, .. }
            | Error::ModuleNotFound { line, .. }
            | Error::Render { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Get the source span if available
    pub fn span(&self) -> Option<&Span> {
        match self {
            Error::Syntax(e) => Some(&e.span),
            Error::NamespaceNotFound { span, .. }
            | Error::AtomNotFound { span, .. }
            | Error::ModuleNotFound { span, .. }
            | Error::Render { span, .. } => Some(span),
            _ => None,
        }
    }

    pub(crate) fn render(message: impl Into<String>, span: Span, source: &str) -> Self {
        let line = line_at(source, span.start);
        Error::Render {
            message: message.into(),
            span,
            line,
        }
    }

    /// Format the error with source context using ariadne
    ///
    /// Errors without a source location fall back to their display text.
    pub fn format(&self, source: &str, filename: &str) -> String {
        let Some(span) = self.span() else {
            return self.to_string();
        };
        let span = span.start.min(source.len())..span.end.min(source.len());

        let expected_str = match self {
            Error::Syntax(e) if !e.expected.is_empty() => {
                format!("\nExpected: {}", e.expected.join(", "))
            }
            _ => String::new(),
        };
        let message = match self {
            Error::Syntax(e) => e.message.clone(),
            other => other.to_string(),
        };

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, filename, span.start)
            .with_message(&message)
            .with_label(
                Label::new((filename, span))
                    .with_message(format!("{}{}", message, expected_str))
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

/// 1-based line number of a byte offset
pub fn line_at(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source.as_bytes()[..offset]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// Format a token for human-readable error messages
pub(crate) fn format_token(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Integer(n) => format!("integer {}", n),
        Token::Float(n) => format!("float {}", n),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
        Token::BraceOpen => "'{'".to_string(),
        Token::BraceClose => "'}'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::Assign => "'='".to_string(),
        Token::EqEq => "'=='".to_string(),
        Token::NotEq => "'!='".to_string(),
        Token::Minus => "'-'".to_string(),
        _ => format!("{:?}", tok),
    }
}
