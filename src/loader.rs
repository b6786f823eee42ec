//! Template loaders

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::error::Error;

/// Source of template text by name
pub trait Loader: Send + Sync {
    /// Load the source for `name`, `Ok(None)` when this loader does not have it
    fn load(&self, name: &str) -> Result<Option<String>, Error>;
}

/// Loads templates from an ordered list of directories; the first hit wins
#[derive(Debug, Clone, Default)]
pub struct FileSystemLoader {
    search_path: Vec<PathBuf>,
}

impl FileSystemLoader {
    pub fn new<P: Into<PathBuf>>(search_path: impl IntoIterator<Item = P>) -> Self {
        Self {
            search_path: search_path.into_iter().map(Into::into).collect(),
        }
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Append a directory to the end of the search path
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_path.push(path.into());
        self
    }
}

/// Template names may not escape the search directories
fn is_safe_name(name: &str) -> bool {
    Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl Loader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<Option<String>, Error> {
        if !is_safe_name(name) {
            return Ok(None);
        }
        for dir in &self.search_path {
            let path = dir.join(name);
            if path.is_file() {
                let source = std::fs::read_to_string(&path)
                    .map_err(|source| Error::Io { path, source })?;
                return Ok(Some(source));
            }
        }
        Ok(None)
    }
}

/// In-memory templates keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }
}

impl Loader for MemoryLoader {
    fn load(&self, name: &str) -> Result<Option<String>, Error> {
        Ok(self.templates.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/jinja_atoms/test_atoms")
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with_template("a.html", "A");
        assert_eq!(loader.load("a.html").unwrap().as_deref(), Some("A"));
        assert!(loader.load("b.html").unwrap().is_none());
    }

    #[test]
    fn test_filesystem_search_order() {
        let dir = fixtures();
        let loader = FileSystemLoader::new([dir.join("html"), dir.join("templates")]);
        let source = loader.load("shadowed.html").unwrap().expect("Should load");
        assert!(source.contains("from html"));
        assert!(loader.load("only_in_templates.html").unwrap().is_some());
        assert!(loader.load("missing.html").unwrap().is_none());
    }

    #[test]
    fn test_with_path_appends_fallback() {
        let dir = fixtures();
        let loader = FileSystemLoader::new([dir.join("html")]);
        assert!(loader.load("only_in_templates.html").unwrap().is_none());

        let loader = loader.with_path(dir.join("templates"));
        assert_eq!(loader.search_path(), &[dir.join("html"), dir.join("templates")]);
        let source = loader.load("shadowed.html").unwrap().expect("Should load");
        assert!(source.contains("from html"));
        assert!(loader.load("only_in_templates.html").unwrap().is_some());
    }

    #[test]
    fn test_filesystem_rejects_parent_dirs() {
        let loader = FileSystemLoader::new([fixtures().join("html")]);
        assert!(loader.load("../custom_html/simple_block.html").unwrap().is_none());
        assert!(!is_safe_name("/etc/passwd"));
    }
}
