//! Atoms that render their result through a sub-template

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::atoms::{AtomsExtension, Importer};
use crate::config::AtomsConfig;
use crate::environment::{Environment, Template};
use crate::error::{Error, InvocationError};
use crate::loader::FileSystemLoader;
use crate::value::{Arguments, Callable, Value};

/// A function whose returned mapping is rendered through a template
///
/// Calling an `Atom` runs the function with the call-site arguments and
/// renders the bound template with the mapping it returns. Errors from the
/// function pass through unchanged.
#[derive(Clone)]
pub struct Atom {
    template: Template,
    func: Arc<dyn Callable>,
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atom")
            .field("template", &self.template.name())
            .finish_non_exhaustive()
    }
}

impl Atom {
    /// Bind `func` to `template` loaded from `env`; the template is loaded now
    pub fn with_env<F>(env: &Environment, template: &str, func: F) -> Result<Self, Error>
    where
        F: Fn(&Arguments) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self::from_callable(env, template, Arc::new(func))
    }

    pub fn from_callable(env: &Environment, template: &str, func: Arc<dyn Callable>) -> Result<Self, Error> {
        Ok(Self {
            template: env.get_template(template)?,
            func,
        })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Run the function and render its context
    pub fn invoke(&self, args: Arguments) -> Result<String, Error> {
        match self.func.call(args)? {
            Value::Map(context) => self.template.render(&context),
            other => Err(InvocationError::ContextMismatch {
                template: self.template.name().unwrap_or("<string>").to_string(),
                found: other.type_name().to_string(),
            }
            .into()),
        }
    }
}

impl Callable for Atom {
    fn call(&self, args: Arguments) -> Result<Value, Error> {
        self.invoke(args).map(Value::String)
    }
}

/// Builds atoms whose templates live inside their declaring package
///
/// Each package gets one environment, created on first use, that searches
/// the package's template directories in order and understands atom tags
/// itself.
pub struct AtomFactory {
    config: AtomsConfig,
    importer: Arc<dyn Importer>,
    environments: Mutex<HashMap<String, Environment>>,
}

impl fmt::Debug for AtomFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut packages: Vec<_> = self.environments.lock().keys().cloned().collect();
        packages.sort();
        f.debug_struct("AtomFactory")
            .field("config", &self.config)
            .field("packages", &packages)
            .finish_non_exhaustive()
    }
}

impl AtomFactory {
    pub fn new(config: AtomsConfig, importer: Arc<dyn Importer>) -> Self {
        Self {
            config,
            importer,
            environments: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AtomsConfig {
        &self.config
    }

    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.config.package_dir(package)
    }

    /// The environment of `package`, created on first request
    pub fn environment(&self, package: &str) -> Environment {
        let mut environments = self.environments.lock();
        if let Some(env) = environments.get(package) {
            return env.clone();
        }

        let search_path = self.config.search_path(package);
        debug!(package, search_path = ?search_path, "creating atom package environment");
        let env = Environment::builder()
            .with_loader(FileSystemLoader::new(search_path))
            .with_extension(Arc::new(AtomsExtension::new(self.importer.clone())))
            .build();
        environments.insert(package.to_string(), env.clone());
        env
    }

    /// Bind `func` to `template` from the environment of `package`
    pub fn atom<F>(&self, package: &str, template: &str, func: F) -> Result<Atom, Error>
    where
        F: Fn(&Arguments) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Atom::with_env(&self.environment(package), template, func)
    }
}
