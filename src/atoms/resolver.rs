//! Atom symbol lookup and the per-environment resolution cache

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, trace};

use crate::error::Error;
use crate::syntax::ast::AtomHandle;
use crate::value::{Arguments, Callable, Value};

/// Why a fully-qualified atom path could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    /// The owning module of the path is not known
    #[error("module \"{module}\" is not registered")]
    ModuleNotFound { module: String },

    /// The module exists but has nothing under the terminal segment
    #[error("module \"{module}\" has no atom \"{name}\"")]
    AttributeNotFound { module: String, name: String },
}

/// Loads a callable by fully-qualified dotted path
pub trait Importer: Send + Sync {
    fn import(&self, path: &str) -> Result<Arc<dyn Callable>, ImportError>;
}

/// Split `a.b.c` into owning module `a.b` and terminal segment `c`
pub fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('.').unwrap_or(("", path))
}

type Module = HashMap<String, Arc<dyn Callable>>;

/// In-process atom modules, populated by explicit registration
///
/// ```
/// use jinja_atoms::{AtomRegistry, Importer, Value};
///
/// let registry = AtomRegistry::new();
/// registry.register_fn("app.atoms", "echo", |_| Ok(Value::from("ECHO")));
/// assert!(registry.import("app.atoms.echo").is_ok());
/// assert!(registry.import("app.atoms.missing").is_err());
/// ```
#[derive(Default)]
pub struct AtomRegistry {
    modules: RwLock<HashMap<String, Module>>,
}

impl std::fmt::Debug for AtomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let modules = self.modules.read();
        let mut names: Vec<_> = modules.keys().collect();
        names.sort();
        f.debug_struct("AtomRegistry").field("modules", &names).finish()
    }
}

impl AtomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a module with no atoms yet
    pub fn register_module(&self, module: impl Into<String>) {
        self.modules.write().entry(module.into()).or_default();
    }

    /// Register `callable` as `<module>.<name>`, creating the module if needed
    pub fn register(&self, module: impl Into<String>, name: impl Into<String>, callable: impl Callable + 'static) {
        self.register_arc(module, name, Arc::new(callable));
    }

    pub fn register_arc(&self, module: impl Into<String>, name: impl Into<String>, callable: Arc<dyn Callable>) {
        self.modules
            .write()
            .entry(module.into())
            .or_default()
            .insert(name.into(), callable);
    }

    /// Register a plain function; its return value is emitted as-is
    pub fn register_fn<F>(&self, module: impl Into<String>, name: impl Into<String>, f: F)
    where
        F: Fn(&Arguments) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.register(module, name, f);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.import(path).is_ok()
    }
}

impl Importer for AtomRegistry {
    fn import(&self, path: &str) -> Result<Arc<dyn Callable>, ImportError> {
        let (module, name) = split_path(path);
        let modules = self.modules.read();
        let Some(atoms) = modules.get(module) else {
            return Err(ImportError::ModuleNotFound {
                module: module.to_string(),
            });
        };
        atoms
            .get(name)
            .cloned()
            .ok_or_else(|| ImportError::AttributeNotFound {
                module: module.to_string(),
                name: name.to_string(),
            })
    }
}

/// Resolved atoms of one environment, keyed by a digest of their full path
///
/// Entries are added once per distinct path and never evicted.
#[derive(Default)]
pub struct ResolvedAtomCache {
    entries: HashMap<String, Arc<dyn Callable>>,
}

impl std::fmt::Debug for ResolvedAtomCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAtomCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ResolvedAtomCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key of a fully-qualified path
    pub fn key_for(path: &str) -> String {
        format!("loaded_atom_{}", hex::encode(Sha256::digest(path.as_bytes())))
    }

    /// Return the cached atom for `path`, importing it on first use
    pub fn resolve(&mut self, path: &str, importer: &dyn Importer) -> Result<AtomHandle, ImportError> {
        let key = Self::key_for(path);
        let callable = match self.entries.get(&key) {
            Some(callable) => {
                trace!(path, key = %key, "atom cache hit");
                callable.clone()
            }
            None => {
                let callable = importer.import(path)?;
                debug!(path, key = %key, "atom imported");
                self.entries.insert(key.clone(), callable.clone());
                callable
            }
        };
        Ok(AtomHandle {
            key,
            path: path.to_string(),
            callable,
        })
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Callable>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&Self::key_for(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
