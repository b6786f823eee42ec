//! Tree-walking renderer for compiled templates

use crate::environment::{Compiled, Environment};
use crate::error::Error;
use crate::syntax::ast::{Call, CompareOp, Expr, Spanned, Stmt};
use crate::value::{Arguments, Map, Value};

pub(crate) fn render(env: &Environment, compiled: &Compiled, context: &Map) -> Result<String, Error> {
    let mut renderer = Renderer {
        env,
        source: &compiled.source,
        scopes: vec![context.clone()],
        out: String::new(),
    };
    renderer.exec_block(&compiled.body)?;
    Ok(renderer.out)
}

struct Renderer<'a> {
    env: &'a Environment,
    source: &'a str,
    /// Innermost scope last
    scopes: Vec<Map>,
    out: String,
}

impl Renderer<'_> {
    fn exec_block(&mut self, body: &[Spanned<Stmt>]) -> Result<(), Error> {
        for stmt in body {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Spanned<Stmt>) -> Result<(), Error> {
        match &stmt.node {
            Stmt::Text(text) => self.out.push_str(text),
            Stmt::Output(exprs) => {
                for expr in exprs {
                    let value = self.eval(expr)?;
                    self.out.push_str(&value.to_string());
                }
            }
            Stmt::Set { target, value } => {
                let value = self.eval(value)?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(target.clone(), value);
                }
            }
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.eval(condition)?.is_true() {
                        return self.exec_block(body);
                    }
                }
                self.exec_block(otherwise)?;
            }
            Stmt::For { target, iter, body } => {
                let items = match self.eval(iter)? {
                    Value::List(items) => items,
                    Value::Map(map) => map.into_keys().map(Value::String).collect(),
                    Value::Undefined | Value::None => Vec::new(),
                    other => {
                        return Err(Error::render(
                            format!("'{}' object is not iterable", other.type_name()),
                            iter.span.clone(),
                            self.source,
                        ))
                    }
                };
                for item in items {
                    let mut scope = Map::new();
                    scope.insert(target.clone(), item);
                    self.scopes.push(scope);
                    let result = self.exec_block(body);
                    self.scopes.pop();
                    result?;
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Value {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .or_else(|| self.env.global(name))
            .unwrap_or_default()
    }

    fn eval(&self, expr: &Spanned<Expr>) -> Result<Value, Error> {
        Ok(match &expr.node {
            Expr::Const(value) => value.clone(),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Map(pairs) => {
                let mut map = Map::new();
                for (key, value) in pairs {
                    let key = match self.eval(key)? {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    map.insert(key, self.eval(value)?);
                }
                Value::Map(map)
            }
            Expr::GetAttr(base, name) => self.eval(base)?.get_attr(name),
            Expr::GetItem(base, index) => {
                let base = self.eval(base)?;
                base.get_item(&self.eval(index)?)
            }
            Expr::Not(inner) => Value::Bool(!self.eval(inner)?.is_true()),
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Int(n) => match n.checked_neg() {
                    Some(n) => Value::Int(n),
                    None => {
                        return Err(Error::render(
                            "integer overflow in unary -",
                            expr.span.clone(),
                            self.source,
                        ))
                    }
                },
                Value::Float(x) => Value::Float(-x),
                other => {
                    return Err(Error::render(
                        format!("bad operand type for unary -: '{}'", other.type_name()),
                        expr.span.clone(),
                        self.source,
                    ))
                }
            },
            Expr::Compare(left, op, right) => {
                let equal = self.eval(left)? == self.eval(right)?;
                Value::Bool(match op {
                    CompareOp::Eq => equal,
                    CompareOp::Ne => !equal,
                })
            }
            Expr::Call(call) => self.call(call, expr)?,
            Expr::Atom(handle) => Value::Callable(handle.callable.clone()),
        })
    }

    fn call(&self, call: &Call, expr: &Spanned<Expr>) -> Result<Value, Error> {
        let (callee_name, callable) = match &call.callee.node {
            Expr::Atom(handle) => (handle.path.clone(), handle.callable.clone()),
            other => {
                let name = match other {
                    Expr::Name(name) => name.clone(),
                    Expr::GetAttr(_, attr) => attr.clone(),
                    _ => "<expression>".to_string(),
                };
                match self.eval(&call.callee)? {
                    Value::Callable(callable) => (name, callable),
                    Value::Undefined => {
                        return Err(Error::render(
                            format!("'{}' is undefined", name),
                            call.callee.span.clone(),
                            self.source,
                        ))
                    }
                    value => {
                        return Err(Error::render(
                            format!("'{}' object is not callable", value.type_name()),
                            expr.span.clone(),
                            self.source,
                        ))
                    }
                }
            }
        };

        let mut args = Arguments::new(callee_name);
        for arg in &call.args {
            args.positional.push(self.eval(arg)?);
        }
        for kwarg in &call.kwargs {
            args.keyword.insert(kwarg.name.clone(), self.eval(&kwarg.value)?);
        }
        callable.call(args)
    }
}
