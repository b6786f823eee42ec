//! Namespace scoping and the per-environment resolution cache

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{env_with, registry, render};
use jinja_atoms::syntax::{Expr, Stmt};
use jinja_atoms::{
    AtomRegistry, Callable, ErrorKind, ImportError, Importer, ResolvedAtomCache, Template,
};
use pretty_assertions::assert_eq;

/// Counts imports passed through to the fixture registry
struct CountingImporter {
    inner: Arc<AtomRegistry>,
    imports: AtomicUsize,
}

impl CountingImporter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: registry(),
            imports: AtomicUsize::new(0),
        })
    }

    fn imports(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }
}

impl Importer for CountingImporter {
    fn import(&self, path: &str) -> Result<Arc<dyn Callable>, ImportError> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        self.inner.import(path)
    }
}

/// Callables bound by the atom tags of a compiled template, in order
fn atom_callables(template: &Template) -> Vec<(String, Arc<dyn Callable>)> {
    template
        .body()
        .iter()
        .filter_map(|stmt| match &stmt.node {
            Stmt::Output(exprs) => match &exprs[0].node {
                Expr::Call(call) => match &call.callee.node {
                    Expr::Atom(handle) => Some((handle.key.clone(), handle.callable.clone())),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        })
        .collect()
}

#[test]
fn test_repeated_tags_import_once() {
    let importer = CountingImporter::new();
    let (env, ext) = env_with(importer.clone());

    let source = "{% use atoms jinja_atoms.test_atoms as ta %}\
                  {% atom ta:abc.simple_block() %}\
                  {% atom ta:abc.simple_block() %}\
                  {% atom ta:abc.simple_block() %}";
    let result = render(&env, source).unwrap();
    assert_eq!(result, "<p>Hello, Jinja!</p>".repeat(3));
    assert_eq!(importer.imports(), 1);

    // other templates of the same environment reuse the cache
    render(&env, source).unwrap();
    assert_eq!(importer.imports(), 1);
    assert_eq!(ext.cached_atoms(), 1);
    assert!(ext.is_cached("jinja_atoms.test_atoms.abc.simple_block"));
}

#[test]
fn test_aliases_of_one_module_share_a_cache_entry() {
    let importer = CountingImporter::new();
    let (env, _) = env_with(importer.clone());

    let template = env
        .from_string(
            "{% use atoms jinja_atoms.test_atoms as ta %}\
             {% use atoms jinja_atoms.test_atoms as test_atoms %}\
             {% atom ta:abc.simple_block() %}{% atom test_atoms:abc.simple_block() %}",
        )
        .unwrap();
    assert_eq!(importer.imports(), 1);

    let callables = atom_callables(&template);
    assert_eq!(callables.len(), 2);
    assert_eq!(callables[0].0, callables[1].0);
    assert!(Arc::ptr_eq(&callables[0].1, &callables[1].1));
}

#[test]
fn test_resolution_is_idempotent_across_templates() {
    let (env, _) = env_with(registry());
    let source = "{% use atoms jinja_atoms.test_atoms as ta %}{% atom ta:simple_echo() %}";
    let first = atom_callables(&env.from_string(source).unwrap());
    let second = atom_callables(&env.from_string(source).unwrap());
    assert_eq!(first[0].0, ResolvedAtomCache::key_for("jinja_atoms.test_atoms.simple_echo"));
    assert!(Arc::ptr_eq(&first[0].1, &second[0].1));
}

#[test]
fn test_environments_have_separate_caches() {
    let importer = CountingImporter::new();
    let (one, _) = env_with(importer.clone());
    let (two, _) = env_with(importer.clone());
    let source = "{% use atoms jinja_atoms.test_atoms as ta %}{% atom ta:simple_echo() %}";
    render(&one, source).unwrap();
    render(&two, source).unwrap();
    assert_eq!(importer.imports(), 2);
}

#[test]
fn test_failed_resolution_is_retried() {
    let importer = CountingImporter::new();
    let (env, ext) = env_with(importer.clone());
    let source = "{% use atoms jinja_atoms.test_atoms as ta %}{% atom ta:abc.nope() %}";
    assert!(env.from_string(source).is_err());
    assert!(env.from_string(source).is_err());
    assert_eq!(importer.imports(), 2);
    assert_eq!(ext.cached_atoms(), 0);
}

#[test]
fn test_alias_declared_after_use_fails() {
    let (env, _) = env_with(registry());
    let err = env
        .from_string(
            "{% atom ta:abc.simple_block() %}{% use atoms jinja_atoms.test_atoms as ta %}",
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Namespace);
}

#[test]
fn test_later_declaration_in_template_shadows_environment() {
    let (env, _) = env_with(registry());
    render(
        &env,
        "{% use atoms jinja_atoms.test_atoms as ta %}{% atom ta:simple_echo() %}",
    )
    .unwrap();

    // `ta` is known to the environment, but this template binds it only after the tag
    let err = env
        .from_string("{% atom ta:simple_echo() %}{% use atoms jinja_atoms.test_atoms as ta %}")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Namespace);
}

#[test]
fn test_aliases_accumulate_across_templates() {
    let (env, ext) = env_with(registry());
    render(&env, "{% use atoms jinja_atoms.test_atoms as ta %}").unwrap();
    let result = render(&env, "{% atom ta:simple_echo() %}").unwrap();
    assert_eq!(result, "ECHO");
    assert_eq!(ext.namespaces().get("ta"), Some("jinja_atoms.test_atoms"));
}

#[test]
fn test_redeclared_alias_last_write_wins() {
    let (env, ext) = env_with(registry());
    let result = render(
        &env,
        "{% use atoms jinja_atoms.test_atoms as ta %}{% atom ta:simple_block() %}\
         {% use atoms jinja_atoms.test_atoms.abc as ta %}{% atom ta:card() %}",
    )
    .unwrap();
    assert_eq!(result, "<p>Hello, Jinja!</p>\n<div><p>Hello, Jinja!</p></div>");
    assert_eq!(ext.namespaces().get("ta"), Some("jinja_atoms.test_atoms.abc"));
}

#[test]
fn test_concurrent_compilation_resolves_once() {
    let importer = CountingImporter::new();
    let (env, _) = env_with(importer.clone());
    let source = "{% use atoms jinja_atoms.test_atoms as ta %}{% atom ta:abc.block_with_kwargs(kwarg_one=1) %}";

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let env = env.clone();
            scope.spawn(move || {
                let out = render(&env, source).expect("should render");
                assert_eq!(out, "<p>There is 1 or None parrots</p>");
            });
        }
    });
    assert_eq!(importer.imports(), 1);
}
