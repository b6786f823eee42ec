//! Template environments, extensions and compiled templates

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, InvocationError};
use crate::loader::Loader;
use crate::render;
use crate::syntax::ast::{Spanned, Stmt};
use crate::syntax::lexer::TokenStream;
use crate::syntax::parser;
use crate::value::{Map, Value};

/// Hooks an extension plugs into template compilation
pub trait Extension: Send + Sync {
    /// Tag names this extension parses
    fn tags(&self) -> &[&'static str];

    /// Rewrite raw source before it is tokenized
    fn preprocess(&self, source: &str, _name: Option<&str>) -> String {
        source.to_string()
    }

    /// Parse one of [`Extension::tags`]; `stream` is positioned just after the tag name
    fn parse(&self, tag: &Spanned<String>, stream: &mut TokenStream<'_>) -> Result<Stmt, Error>;
}

/// Shared handle to a template environment
///
/// Cloning is cheap; clones share loader, extensions, globals and the
/// compiled template cache.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<Inner>,
}

struct Inner {
    loader: Option<Box<dyn Loader>>,
    extensions: Vec<Arc<dyn Extension>>,
    globals: RwLock<Map>,
    templates: Mutex<HashMap<String, Arc<Compiled>>>,
    /// Preprocessing and parsing of one template never interleave with another
    compile_lock: Mutex<()>,
    keep_trailing_newline: bool,
}

/// Builder for [`Environment`]
#[derive(Default)]
pub struct EnvironmentBuilder {
    loader: Option<Box<dyn Loader>>,
    extensions: Vec<Arc<dyn Extension>>,
    globals: Map,
    keep_trailing_newline: bool,
}

impl EnvironmentBuilder {
    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn with_extension<E: Extension + 'static>(mut self, extension: Arc<E>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    /// Keep the final newline of template sources (stripped by default)
    pub fn with_keep_trailing_newline(mut self, keep: bool) -> Self {
        self.keep_trailing_newline = keep;
        self
    }

    pub fn build(self) -> Environment {
        Environment {
            inner: Arc::new(Inner {
                loader: self.loader,
                extensions: self.extensions,
                globals: RwLock::new(self.globals),
                templates: Mutex::new(HashMap::new()),
                compile_lock: Mutex::new(()),
                keep_trailing_newline: self.keep_trailing_newline,
            }),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("extensions", &self.inner.extensions.len())
            .field("templates", &self.inner.templates.lock().len())
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Whether two handles refer to the same environment
    pub fn ptr_eq(a: &Environment, b: &Environment) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn add_global(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.inner.globals.write().insert(name.into(), value.into());
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.inner.globals.read().get(name).cloned()
    }

    /// Compile a template from source without caching it
    pub fn from_string(&self, source: &str) -> Result<Template, Error> {
        let compiled = self.compile(source, None)?;
        Ok(Template {
            env: self.clone(),
            compiled: Arc::new(compiled),
        })
    }

    /// Load, compile and cache a template by name
    pub fn get_template(&self, name: &str) -> Result<Template, Error> {
        if let Some(compiled) = self.inner.templates.lock().get(name) {
            return Ok(Template {
                env: self.clone(),
                compiled: compiled.clone(),
            });
        }

        let source = match &self.inner.loader {
            Some(loader) => loader.load(name)?,
            None => None,
        };
        let Some(source) = source else {
            return Err(Error::TemplateNotFound {
                name: name.to_string(),
            });
        };

        let compiled = Arc::new(self.compile(&source, Some(name))?);
        self.inner
            .templates
            .lock()
            .insert(name.to_string(), compiled.clone());
        Ok(Template {
            env: self.clone(),
            compiled,
        })
    }

    fn compile(&self, source: &str, name: Option<&str>) -> Result<Compiled, Error> {
        let _guard = self.inner.compile_lock.lock();

        let mut source = source;
        if !self.inner.keep_trailing_newline {
            source = source
                .strip_suffix("\r\n")
                .or_else(|| source.strip_suffix('\n'))
                .unwrap_or(source);
        }

        let mut source = source.to_string();
        for ext in &self.inner.extensions {
            source = ext.preprocess(&source, name);
        }

        let body = parser::parse(&source, &self.inner.extensions)?;
        debug!(template = name.unwrap_or("<string>"), statements = body.len(), "compiled template");

        Ok(Compiled {
            name: name.map(str::to_string),
            source,
            body,
        })
    }
}

#[derive(Debug)]
pub(crate) struct Compiled {
    pub(crate) name: Option<String>,
    /// Source after preprocessing; line numbers match the original
    pub(crate) source: String,
    pub(crate) body: Vec<Spanned<Stmt>>,
}

/// A compiled template bound to its environment
#[derive(Debug, Clone)]
pub struct Template {
    env: Environment,
    compiled: Arc<Compiled>,
}

impl Template {
    pub fn name(&self) -> Option<&str> {
        self.compiled.name.as_deref()
    }

    /// Preprocessed source the template was compiled from
    pub fn source(&self) -> &str {
        &self.compiled.source
    }

    pub fn body(&self) -> &[Spanned<Stmt>] {
        &self.compiled.body
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn render(&self, context: &Map) -> Result<String, Error> {
        render::render(&self.env, &self.compiled, context)
    }

    /// Render with a context built from any serializable value
    pub fn render_serialize<S: Serialize + ?Sized>(&self, context: &S) -> Result<String, Error> {
        match Value::from_serialize(context)? {
            Value::Map(map) => self.render(&map),
            other => Err(InvocationError::ContextMismatch {
                template: self.name().unwrap_or("<string>").to_string(),
                found: other.type_name().to_string(),
            }
            .into()),
        }
    }
}
