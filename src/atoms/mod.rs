//! The `atom` tag extension
//!
//! Registers the `atom` tag with an [`Environment`](crate::Environment):
//!
//! 1. Before tokenizing, namespace directives are stripped from the source
//!    and their aliases merged into the environment's [`NamespaceMap`].
//! 2. On each `{% atom alias:path(...) %}` the alias is bound to its
//!    module, the full path is resolved once through the [`Importer`]
//!    and cached, and a call to the resolved atom is spliced into the
//!    template as an output statement.

pub mod namespace;
pub mod parser;
pub mod resolver;
pub mod wrapper;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::environment::Extension;
use crate::error::Error;
use crate::syntax::ast::{Call, Expr, Spanned, Stmt};
use crate::syntax::lexer::TokenStream;

pub use namespace::{strip_declarations, Declaration, NamespaceMap, Preprocessed};
pub use parser::{parse_atom_tag, AtomInvocation, AtomReference};
pub use resolver::{split_path, AtomRegistry, ImportError, Importer, ResolvedAtomCache};
pub use wrapper::{Atom, AtomFactory};

/// Compile-time state owned by one environment
#[derive(Debug, Default)]
struct AtomsState {
    namespaces: NamespaceMap,
    /// Directives of the template currently being compiled
    current: Vec<Declaration>,
    cache: ResolvedAtomCache,
}

/// Extension providing namespace directives and the `atom` tag
///
/// An instance holds the namespace map and resolution cache of the
/// environment it is added to and should not be shared between
/// environments.
pub struct AtomsExtension {
    importer: Arc<dyn Importer>,
    state: Mutex<AtomsState>,
}

impl std::fmt::Debug for AtomsExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomsExtension")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl AtomsExtension {
    pub fn new(importer: Arc<dyn Importer>) -> Self {
        Self {
            importer,
            state: Mutex::new(AtomsState::default()),
        }
    }

    pub fn importer(&self) -> &Arc<dyn Importer> {
        &self.importer
    }

    /// Snapshot of the aliases registered so far
    pub fn namespaces(&self) -> NamespaceMap {
        self.state.lock().namespaces.clone()
    }

    /// Number of distinct atoms resolved so far
    pub fn cached_atoms(&self) -> usize {
        self.state.lock().cache.len()
    }

    pub fn is_cached(&self, path: &str) -> bool {
        self.state.lock().cache.contains(path)
    }
}

impl Extension for AtomsExtension {
    fn tags(&self) -> &[&'static str] {
        &["atom"]
    }

    fn preprocess(&self, source: &str, _name: Option<&str>) -> String {
        let Preprocessed {
            source,
            declarations,
        } = strip_declarations(source);
        let mut state = self.state.lock();
        state.namespaces.register(&declarations);
        state.current = declarations;
        source
    }

    fn parse(&self, tag: &Spanned<String>, stream: &mut TokenStream<'_>) -> Result<Stmt, Error> {
        let line = stream.line_of(tag.span.start);
        let AtomInvocation {
            reference,
            args,
            kwargs,
            span,
        } = parse_atom_tag(stream)?;

        let mut state = self.state.lock();
        let state = &mut *state;
        let Some(module) = state
            .namespaces
            .lookup(&state.current, &reference.alias, tag.span.start)
        else {
            return Err(Error::NamespaceNotFound {
                alias: reference.alias,
                span: reference.span,
                line,
            });
        };

        let path = reference.qualify(module);
        let handle = match state.cache.resolve(&path, self.importer.as_ref()) {
            Ok(handle) => handle,
            Err(ImportError::ModuleNotFound { module }) => {
                return Err(Error::ModuleNotFound {
                    module,
                    path,
                    span: reference.span,
                    line,
                })
            }
            Err(ImportError::AttributeNotFound { .. }) => {
                return Err(Error::AtomNotFound {
                    path,
                    span: reference.span,
                    line,
                })
            }
        };

        let call = Call {
            callee: Box::new(Spanned::new(Expr::Atom(handle), reference.span)),
            args,
            kwargs,
        };
        Ok(Stmt::Output(vec![Spanned::new(Expr::Call(call), span)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::error::ErrorKind;
    use crate::value::{Map, Value};
    use pretty_assertions::assert_eq;

    fn setup() -> (Environment, Arc<AtomsExtension>) {
        let registry = Arc::new(AtomRegistry::new());
        registry.register_fn("m", "echo", |_| Ok(Value::from("ECHO")));
        let ext = Arc::new(AtomsExtension::new(registry));
        let env = Environment::builder().with_extension(ext.clone()).build();
        (env, ext)
    }

    #[test]
    fn test_compiles_to_output_call() {
        let (env, ext) = setup();
        let tmpl = env.from_string("{% use atoms m as ta %}{% atom ta:echo() %}").unwrap();
        match &tmpl.body()[0].node {
            Stmt::Output(exprs) => match &exprs[0].node {
                Expr::Call(call) => match &call.callee.node {
                    Expr::Atom(handle) => {
                        assert_eq!(handle.path, "m.echo");
                        assert_eq!(handle.key, ResolvedAtomCache::key_for("m.echo"));
                    }
                    other => panic!("Expected atom callee, got {:?}", other),
                },
                other => panic!("Expected call, got {:?}", other),
            },
            other => panic!("Expected output, got {:?}", other),
        }
        assert_eq!(tmpl.render(&Map::new()).unwrap(), "ECHO");
        assert_eq!(ext.cached_atoms(), 1);
        assert_eq!(ext.namespaces().get("ta"), Some("m"));
    }

    #[test]
    fn test_error_classes() {
        let (env, _) = setup();
        let cases = [
            ("{% atom ta:echo() %}", ErrorKind::Namespace),
            ("{% use atoms m as ta %}{% atom ta:ecko() %}", ErrorKind::Resolution),
            ("{% use atoms nope as tb %}{% atom tb:echo() %}", ErrorKind::Resolution),
            ("{% use atoms m as ta %}{% atom ta:echo %}", ErrorKind::Syntax),
        ];
        for (source, kind) in cases {
            let err = env.from_string(source).unwrap_err();
            assert_eq!(err.kind(), kind, "source: {}", source);
        }
    }

    #[test]
    fn test_module_not_found_names_module() {
        let (env, _) = setup();
        let err = env
            .from_string("{% use atoms nope as tb %}{% atom tb:abc.echo() %}")
            .unwrap_err();
        match err {
            Error::ModuleNotFound { module, path, .. } => {
                assert_eq!(module, "nope.abc");
                assert_eq!(path, "nope.abc.echo");
            }
            other => panic!("Expected module error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_line_of_tag() {
        let (env, _) = setup();
        let err = env
            .from_string("{% use atoms m as ta %}\nline two\n{% atom ta:missing() %}")
            .unwrap_err();
        assert_eq!(err.line(), Some(3));
    }
}
