//! Namespace directives: `{% use atoms <module> as <alias> %}`
//!
//! Directives are matched over raw source text and stripped before the
//! template is tokenized, so the host tag vocabulary never sees them.
//! Malformed directives are left in place and surface as unknown `use`
//! tags when the template is parsed.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::line_at;

static DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\{%\s*use\s+atoms\s+['"]?(?P<module>[A-Za-z_]\w*(?:\.[A-Za-z_]\w*)*)['"]?\s+as\s+['"]?(?P<alias>[A-Za-z_]\w*)['"]?\s*%\}"#,
    )
    .expect("directive pattern is valid")
});

/// One namespace directive found in a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub alias: String,
    pub module: String,
    /// Byte offset of the directive in the stripped source
    pub offset: usize,
    /// Line of the directive in the original source
    pub line: usize,
}

/// Source with directives removed, plus the directives in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed {
    pub source: String,
    pub declarations: Vec<Declaration>,
}

/// Extract and strip every namespace directive in `source`
///
/// Each directive is replaced by the newlines it contained so line numbers
/// of the remaining source are unchanged.
pub fn strip_declarations(source: &str) -> Preprocessed {
    let mut out = String::with_capacity(source.len());
    let mut declarations = Vec::new();
    let mut last = 0;

    for caps in DIRECTIVE_RE.captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&source[last..whole.start()]);
        declarations.push(Declaration {
            alias: caps["alias"].to_string(),
            module: caps["module"].to_string(),
            offset: out.len(),
            line: line_at(source, whole.start()),
        });
        out.extend(whole.as_str().chars().filter(|&c| c == '\n'));
        last = whole.end();
    }
    out.push_str(&source[last..]);

    Preprocessed {
        source: out,
        declarations,
    }
}

/// Alias to module mapping accumulated by one environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMap {
    entries: HashMap<String, String>,
}

impl NamespaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `alias`, returning the module it was bound to before
    pub fn insert(&mut self, alias: impl Into<String>, module: impl Into<String>) -> Option<String> {
        self.entries.insert(alias.into(), module.into())
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries.get(alias).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(a, m)| (a.as_str(), m.as_str()))
    }

    /// Merge declarations; a redeclared alias takes the latest module
    pub fn register(&mut self, declarations: &[Declaration]) {
        for decl in declarations {
            match self.insert(decl.alias.clone(), decl.module.clone()) {
                Some(previous) if previous != decl.module => debug!(
                    alias = %decl.alias,
                    previous = %previous,
                    module = %decl.module,
                    "atom namespace redeclared"
                ),
                _ => debug!(alias = %decl.alias, module = %decl.module, "atom namespace registered"),
            }
        }
    }

    /// Module for `alias` as seen by a tag at `offset` of the template being compiled
    ///
    /// When the template declares `alias` itself, only declarations before the
    /// tag count. Otherwise the environment-wide mapping applies.
    pub fn lookup<'a>(
        &'a self,
        current: &'a [Declaration],
        alias: &str,
        offset: usize,
    ) -> Option<&'a str> {
        let mut local = current.iter().filter(|d| d.alias == alias).peekable();
        if local.peek().is_none() {
            return self.get(alias);
        }
        local
            .filter(|d| d.offset <= offset)
            .last()
            .map(|d| d.module.as_str())
    }
}
