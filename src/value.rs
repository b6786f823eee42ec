//! Runtime values, callables and call arguments

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, InvocationError};

/// Template context and map literal storage
pub type Map = BTreeMap<String, Value>;

/// Anything a template can call: atoms, wrapped atoms, globals
pub trait Callable: Send + Sync {
    fn call(&self, args: Arguments) -> Result<Value, Error>;
}

impl<F> Callable for F
where
    F: Fn(&Arguments) -> Result<Value, Error> + Send + Sync,
{
    fn call(&self, args: Arguments) -> Result<Value, Error> {
        self(&args)
    }
}

/// A value flowing through template evaluation
#[derive(Clone, Default)]
pub enum Value {
    /// Lookup of a name or attribute that does not exist; renders as nothing
    #[default]
    Undefined,
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Map),
    Callable(Arc<dyn Callable>),
}

impl Value {
    /// Build a value from anything serde can serialize
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Value, Error> {
        serde_json::to_value(value)
            .map(Value::from)
            .map_err(|e| InvocationError::Failed(e.to_string()).into())
    }

    pub fn callable<F>(f: F) -> Value
    where
        F: Fn(&Arguments) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Value::Callable(Arc::new(f))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Callable(_) => "callable",
        }
    }

    pub fn is_true(&self) -> bool {
        match self {
            Value::Undefined | Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Callable(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Attribute access: map keys only
    pub fn get_attr(&self, name: &str) -> Value {
        match self {
            Value::Map(map) => map.get(name).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Subscript access: list index (negative counts from the end) or map key
    pub fn get_item(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::List(items), Value::Int(index)) => {
                let len = items.len() as i64;
                let index = if *index < 0 { len + index } else { *index };
                if (0..len).contains(&index) {
                    items[index as usize].clone()
                } else {
                    Value::Undefined
                }
            }
            (Value::Map(map), Value::String(key)) => map.get(key).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Literal representation used inside containers (`'text'`, `[1, 2]`)
    fn write_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write_quoted(f, s),
            Value::Undefined => f.write_str("None"),
            other => fmt::Display::fmt(other, f),
        }
    }
}

/// Single-quoted string literal with `\` and `'` escaped
fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => Ok(()),
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.write_repr(f)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_quoted(f, key)?;
                    f.write_str(": ")?;
                    value.write_repr(f)?;
                }
                f.write_str("}")
            }
            Value::Callable(_) => f.write_str("<callable>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::None => f.write_str("None"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Value::Callable(c) => write!(f, "Callable({:p})", Arc::as_ptr(c)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

/// Arguments supplied at a call site, bound by the callee
///
/// Binding follows keyword-capable signatures: a parameter can be filled
/// positionally or by name, surplus positionals and keywords can be
/// collected explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    /// Name used in binding errors
    pub callee: String,
    pub positional: Vec<Value>,
    pub keyword: Map,
}

impl Arguments {
    pub fn new(callee: impl Into<String>) -> Self {
        Self {
            callee: callee.into(),
            ..Self::default()
        }
    }

    pub fn with_positional(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// Parameter `name` at position `index`; missing is an error
    pub fn required(&self, index: usize, name: &str) -> Result<Value, InvocationError> {
        self.lookup(index, name)
            .ok_or_else(|| InvocationError::MissingArgument {
                function: self.callee.clone(),
                name: name.to_string(),
            })
    }

    /// Parameter `name` at position `index`, `None` when not supplied
    pub fn optional(&self, index: usize, name: &str) -> Value {
        self.lookup(index, name).unwrap_or(Value::None)
    }

    /// Positional arguments from `index` onwards
    pub fn rest(&self, index: usize) -> Vec<Value> {
        self.positional.iter().skip(index).cloned().collect()
    }

    /// Keyword arguments not named in `known`
    pub fn extra_keywords(&self, known: &[&str]) -> Map {
        self.keyword
            .iter()
            .filter(|(name, _)| !known.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Reject calls with more than `max` positional arguments
    pub fn at_most(&self, max: usize) -> Result<(), InvocationError> {
        if self.positional.len() > max {
            return Err(InvocationError::TooManyArguments {
                function: self.callee.clone(),
                max,
                given: self.positional.len(),
            });
        }
        Ok(())
    }

    /// Reject keywords outside `known`
    pub fn only_keywords(&self, known: &[&str]) -> Result<(), InvocationError> {
        match self.keyword.keys().find(|k| !known.contains(&k.as_str())) {
            Some(name) => Err(InvocationError::UnexpectedKeyword {
                function: self.callee.clone(),
                name: name.clone(),
            }),
            None => Ok(()),
        }
    }

    fn lookup(&self, index: usize, name: &str) -> Option<Value> {
        self.positional
            .get(index)
            .or_else(|| self.keyword.get(name))
            .cloned()
    }
}
