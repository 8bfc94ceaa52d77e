//! Lambda synthesis
//!
//! An [`Env`] turns statement text into uniquely named units, keeps the live
//! ones addressable by name from other expressions, and forgets each unit as
//! soon as its [`Lambda`] handle is dropped.

mod naming;

#[cfg(test)]
mod tests;

pub use naming::{PREFIX, next_name};

use log::{debug, trace};
use once_cell::unsync::OnceCell;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::LambdaError;
use crate::lexer::Lexer;
use crate::ops;
use crate::parser::Parser;
use crate::vm::bytecode::CompiledFunction;
use crate::vm::compiler::Compiler;
use crate::vm::{RuntimeError, VM, Value};

/// Deepest nesting of unit invocations across VMs (builtins that call back
/// into the engines start a fresh VM)
pub const MAX_DEPTH: usize = 64;

/// A positional parameter, readable under every one of its names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    names: Vec<String>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            names: vec![name.into()],
        }
    }

    /// Bind the same argument under another name
    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.names[0]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A synthesized unit: its name, parameters and body text.
///
/// The body is compiled on first invocation and the outcome, success or
/// error, is kept for every later call.
pub struct Unit {
    name: String,
    params: Vec<Param>,
    source: String,
    variadic: bool,
    compiled: OnceCell<Result<Rc<CompiledFunction>, LambdaError>>,
}

impl Unit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    pub fn compiled(&self) -> Result<Rc<CompiledFunction>, LambdaError> {
        self.compiled
            .get_or_init(|| {
                debug!("compiling {} from {:?}", self.name, self.source);
                let result = self.compile();
                if let Err(err) = &result {
                    debug!("{} failed to compile: {err}", self.name);
                }
                result
            })
            .clone()
    }

    fn compile(&self) -> Result<Rc<CompiledFunction>, LambdaError> {
        let tokens = Lexer::new(&self.source).tokenize()?;
        let stmts = Parser::new(tokens).parse_statements()?;
        let slots: Vec<Vec<String>> = self.params.iter().map(|p| p.names().to_vec()).collect();
        let function = Compiler::compile_unit(&self.name, &slots, self.variadic, &stmts)?;
        Ok(Rc::new(function))
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("source", &self.source)
            .field("variadic", &self.variadic)
            .finish()
    }
}

/// Owning handle to a live unit. Dropping it releases the unit.
pub struct Lambda {
    unit: Rc<Unit>,
    env: Env,
}

impl Lambda {
    pub fn name(&self) -> &str {
        self.unit.name()
    }

    /// Body text, statements joined with newlines
    pub fn source(&self) -> &str {
        self.unit.source()
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, LambdaError> {
        self.env.invoke(&self.unit, args)
    }
}

impl Drop for Lambda {
    fn drop(&mut self) {
        self.env.release(self.unit.name());
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lambda").field(&self.unit.name).finish()
    }
}

#[derive(Default)]
struct EnvInner {
    units: RefCell<HashMap<String, Rc<Unit>>>,
    globals: RefCell<HashMap<String, Value>>,
    synthesized: Cell<usize>,
    depth: Cell<usize>,
}

/// The scope that owns live units and caller-defined globals.
///
/// Cloning an `Env` yields another handle to the same scope.
#[derive(Clone, Default)]
pub struct Env {
    inner: Rc<EnvInner>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new uniquely named unit with positional `params` and the
    /// given statements as its body. Never fails; problems in the body
    /// surface when the unit is first called.
    pub fn synthesize<I, S>(&self, params: Vec<Param>, statements: I) -> Lambda
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register(params, statements, false)
    }

    /// Unit whose arguments, however many, are bound as one Sequence named `args`
    pub fn lambda<I, S>(&self, statements: I) -> Lambda
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register(vec![Param::new("args")], statements, true)
    }

    fn register<I, S>(&self, params: Vec<Param>, statements: I, variadic: bool) -> Lambda
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let source = statements
            .into_iter()
            .map(|s| s.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join("\n");

        let unit = Rc::new(Unit {
            name: next_name(),
            params,
            source,
            variadic,
            compiled: OnceCell::new(),
        });

        trace!("registered {}", unit.name);
        self.inner
            .units
            .borrow_mut()
            .insert(unit.name.clone(), Rc::clone(&unit));
        self.inner.synthesized.set(self.inner.synthesized.get() + 1);

        Lambda {
            unit,
            env: self.clone(),
        }
    }

    fn release(&self, name: &str) {
        if self.inner.units.borrow_mut().remove(name).is_some() {
            trace!("released {name}");
        }
    }

    /// Evaluate script text; top-level `let` defines globals
    pub fn eval(&self, source: &str) -> Result<Value, LambdaError> {
        let tokens = Lexer::new(source).tokenize()?;
        let stmts = Parser::new(tokens).parse_statements()?;
        let function = Compiler::compile_script(&stmts)?;

        let _depth = self.enter()?;
        VM::new(self).run(Rc::new(function))
    }

    pub(crate) fn invoke(&self, unit: &Unit, args: &[Value]) -> Result<Value, LambdaError> {
        let function = unit.compiled()?;
        let _depth = self.enter()?;
        VM::new(self).call(function, args)
    }

    fn enter(&self) -> Result<DepthGuard<'_>, LambdaError> {
        let depth = self.inner.depth.get();
        if depth >= MAX_DEPTH {
            return Err(RuntimeError::new("Stack overflow", 0).into());
        }
        self.inner.depth.set(depth + 1);
        Ok(DepthGuard { env: self })
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.inner.globals.borrow_mut().insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.inner.globals.borrow().get(name).cloned()
    }

    /// Live unit registered under `name`
    pub fn unit(&self, name: &str) -> Option<Rc<Unit>> {
        self.inner.units.borrow().get(name).cloned()
    }

    /// Number of units currently registered
    pub fn live_units(&self) -> usize {
        self.inner.units.borrow().len()
    }

    /// Number of units this scope has ever synthesized
    pub fn synthesized(&self) -> usize {
        self.inner.synthesized.get()
    }

    /// Fold `container` with `expr` over `acc`/`accumulator`, `key` and
    /// `val`/`value`. An empty container yields `None` without synthesizing.
    pub fn reduce(
        &self,
        expr: &str,
        initial: Value,
        container: &Value,
    ) -> Result<Option<Value>, LambdaError> {
        ops::container_shape("reduce", container)?;
        if ops::is_empty(container) {
            return Ok(None);
        }

        let unit = self.synthesize(
            vec![
                Param::new("acc").alias("accumulator"),
                Param::new("key"),
                Param::new("val").alias("value"),
            ],
            [format!("return {expr}")],
        );
        ops::reduce(&unit, initial, container)
    }

    /// Combine positionally aligned values of every container with `expr`,
    /// bound as `key` and `val1`..`valN` (`val1` also as `val` and `value`)
    pub fn map(&self, expr: &str, containers: &[&Value]) -> Result<Value, LambdaError> {
        ops::common_shape("map", containers)?;

        let mut params = vec![Param::new("key")];
        for i in 1..=containers.len() {
            let mut param = Param::new(format!("val{i}"));
            if i == 1 {
                param = param.alias("val").alias("value");
            }
            params.push(param);
        }

        let unit = self.synthesize(params, [format!("return {expr}")]);
        ops::map(&unit, containers)
    }

    /// Keep the entries for which `expr` over `key` and `val`/`value` is truthy
    pub fn filter(&self, expr: &str, container: &Value) -> Result<Value, LambdaError> {
        ops::container_shape("filter", container)?;

        let unit = self.synthesize(
            vec![Param::new("key"), Param::new("val").alias("value")],
            [format!("return {expr}")],
        );
        ops::filter(&unit, container)
    }

    /// Stable sort with `expr` over `left`/`val1` and `right`/`val2` as comparator
    pub fn sort(&self, expr: &str, container: &Value) -> Result<Value, LambdaError> {
        ops::container_shape("sort", container)?;

        let unit = self.synthesize(
            vec![
                Param::new("left").alias("val1"),
                Param::new("right").alias("val2"),
            ],
            [format!("return {expr}")],
        );
        ops::sort(&unit, container)
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("live_units", &self.live_units())
            .field("synthesized", &self.synthesized())
            .finish()
    }
}

struct DepthGuard<'a> {
    env: &'a Env,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let depth = self.env.inner.depth.get();
        self.env.inner.depth.set(depth.saturating_sub(1));
    }
}
