//! Jinja Atoms - reusable server-side template fragments
//!
//! Templates declare atom namespaces and invoke atoms with a call-like tag:
//!
//! ```text
//! {% use atoms app.atoms as ui %}
//! {% atom ui:cards.user_card(user, compact=true) %}
//! ```
//!
//! Atoms are resolved once per environment when the template is compiled and
//! called at render time; an [`Atom`] renders the mapping its function
//! returns through a sub-template.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use jinja_atoms::{AtomRegistry, AtomsExtension, Environment, Map, Value};
//!
//! let registry = Arc::new(AtomRegistry::new());
//! registry.register_fn("app.atoms", "simple_echo", |_| Ok(Value::from("ECHO")));
//!
//! let env = Environment::builder()
//!     .with_extension(Arc::new(AtomsExtension::new(registry)))
//!     .build();
//! let template = env
//!     .from_string("{% use atoms app.atoms as ta %}{% atom ta:simple_echo() %}")
//!     .unwrap();
//! assert_eq!(template.render(&Map::new()).unwrap(), "ECHO");
//! ```

pub mod atoms;
pub mod config;
pub mod environment;
pub mod error;
pub mod loader;
mod render;
pub mod syntax;
pub mod value;

pub use atoms::{
    Atom, AtomFactory, AtomRegistry, AtomsExtension, ImportError, Importer, NamespaceMap,
    ResolvedAtomCache,
};
pub use config::AtomsConfig;
pub use environment::{Environment, EnvironmentBuilder, Extension, Template};
pub use error::{Error, ErrorKind, InvocationError, SyntaxError};
pub use loader::{FileSystemLoader, Loader, MemoryLoader};
pub use value::{Arguments, Callable, Map, Value};
