//! Shared setup: the `jinja_atoms.test_atoms` fixture package

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use jinja_atoms::{
    Arguments, Atom, AtomFactory, AtomRegistry, AtomsConfig, AtomsExtension, Environment, Error,
    FileSystemLoader, Importer, Map, Value,
};

pub const PACKAGE: &str = "jinja_atoms.test_atoms";
pub const ABC: &str = "jinja_atoms.test_atoms.abc";

pub fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

fn context(pairs: Vec<(&str, Value)>) -> Value {
    Value::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn simple_echo(_: &Arguments) -> Result<Value, Error> {
    Ok(Value::from("ECHO"))
}

fn simple_block(_: &Arguments) -> Result<Value, Error> {
    Ok(context(vec![("greeting", Value::from("Hello, Jinja!"))]))
}

fn block_with_args(args: &Arguments) -> Result<Value, Error> {
    args.at_most(2)?;
    args.only_keywords(&["arg_one", "arg_two"])?;
    Ok(context(vec![
        ("arg_one", args.required(0, "arg_one")?),
        ("arg_two", args.required(1, "arg_two")?),
    ]))
}

fn block_with_kwargs(args: &Arguments) -> Result<Value, Error> {
    args.at_most(2)?;
    args.only_keywords(&["kwarg_one", "kwarg_two"])?;
    Ok(context(vec![
        ("kwarg_one", args.optional(0, "kwarg_one")),
        ("kwarg_two", args.optional(1, "kwarg_two")),
    ]))
}

fn complex_block(args: &Arguments) -> Result<Value, Error> {
    Ok(context(vec![
        ("arg", args.required(0, "arg")?),
        ("kwarg", args.optional(1, "kwarg")),
        ("args", Value::List(args.rest(2))),
        ("kwargs", Value::Map(args.extra_keywords(&["arg", "kwarg"]))),
    ]))
}

fn custom_env_simple_block(_: &Arguments) -> Result<Value, Error> {
    Ok(context(vec![("greeting", Value::from("hello!"))]))
}

/// Register the fixture atoms, building their environments through `factory`
pub fn register_test_atoms(registry: &AtomRegistry, factory: &AtomFactory) -> Result<(), Error> {
    for module in [PACKAGE, ABC] {
        registry.register_fn(module, "simple_echo", simple_echo);
        registry.register(module, "simple_block", factory.atom(PACKAGE, "simple_block.html", simple_block)?);
        registry.register(module, "block_with_args", factory.atom(PACKAGE, "block_with_args.html", block_with_args)?);
    }
    registry.register(ABC, "block_with_kwargs", factory.atom(PACKAGE, "block_with_kwargs.html", block_with_kwargs)?);
    registry.register(ABC, "complex_block", factory.atom(PACKAGE, "complex_block.html", complex_block)?);

    let custom_env = Environment::builder()
        .with_loader(FileSystemLoader::new([factory.package_dir(PACKAGE).join("custom_html")]))
        .build();
    registry.register(
        ABC,
        "custom_env_simple_block",
        Atom::with_env(&custom_env, "simple_block.html", custom_env_simple_block)?,
    );

    // uses abc:simple_block itself, so it must come after it
    registry.register(ABC, "card", factory.atom(PACKAGE, "card.html", |_| Ok(Value::Map(Map::new())))?);
    Ok(())
}

pub fn factory(registry: Arc<AtomRegistry>) -> AtomFactory {
    AtomFactory::new(AtomsConfig::default().with_package_root(fixtures_root()), registry)
}

pub fn registry() -> Arc<AtomRegistry> {
    init_tracing();
    let registry = Arc::new(AtomRegistry::new());
    let factory = factory(registry.clone());
    register_test_atoms(&registry, &factory).expect("fixture atoms should register");
    registry
}

/// Environment with the atoms extension over `importer`
pub fn env_with(importer: Arc<dyn Importer>) -> (Environment, Arc<AtomsExtension>) {
    let ext = Arc::new(AtomsExtension::new(importer));
    let env = Environment::builder().with_extension(ext.clone()).build();
    (env, ext)
}

pub fn env() -> Environment {
    env_with(registry()).0
}

pub fn render(env: &Environment, source: &str) -> Result<String, Error> {
    env.from_string(source)?.render(&Map::new())
}
