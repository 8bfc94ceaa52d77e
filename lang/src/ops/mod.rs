//! Higher-order operations and immutable collection helpers.
//!
//! The engines are generic over [`Callable`], so they run the same way with a
//! synthesized [`Lambda`] or a plain Rust closure. Inputs are never mutated.

mod collection;
mod filter;
mod map;
mod reduce;
mod sort;


pub use collection::{append, assoc, pop, reverse};
pub use filter::filter;
pub use map::map;
pub use reduce::reduce;
pub use sort::sort;

pub use crate::vm::Shape;

use crate::error::{LambdaError, UsageError};
use crate::lambda::Lambda;
use crate::vm::Value;

/// Anything the engines can invoke with positional arguments
pub trait Callable {
    fn invoke(&self, args: &[Value]) -> Result<Value, LambdaError>;
}

impl<F> Callable for F
where
    F: Fn(&[Value]) -> Result<Value, LambdaError>,
{
    fn invoke(&self, args: &[Value]) -> Result<Value, LambdaError> {
        self(args)
    }
}

impl Callable for Lambda {
    fn invoke(&self, args: &[Value]) -> Result<Value, LambdaError> {
        self.call(args)
    }
}

fn not_a_container(operation: &'static str, value: &Value) -> UsageError {
    UsageError::NotAContainer {
        operation,
        found: value.type_name(),
    }
}

/// Shape of `value`, or a usage error naming `operation`
pub fn container_shape(operation: &'static str, value: &Value) -> Result<Shape, UsageError> {
    value.shape().ok_or_else(|| not_a_container(operation, value))
}

/// The one shape every container shares
pub fn common_shape(operation: &'static str, containers: &[&Value]) -> Result<Shape, UsageError> {
    let (first, rest) = containers
        .split_first()
        .ok_or(UsageError::MissingContainer { operation })?;

    let expected = container_shape(operation, first)?;
    for container in rest {
        if container_shape(operation, container)? != expected {
            return Err(UsageError::ShapeMismatch {
                operation,
                expected,
                found: container.type_name(),
            });
        }
    }
    Ok(expected)
}

pub fn is_empty(container: &Value) -> bool {
    match container {
        Value::List(list) => list.is_empty(),
        Value::Dict(dict) => dict.is_empty(),
        _ => false,
    }
}

/// Mapping key for a caller-supplied value: strings as-is, integers as text
pub fn mapping_key(key: &Value) -> Result<String, UsageError> {
    match key {
        Value::String(s) => Ok(s.as_str().to_owned()),
        Value::Integer(n) => Ok(n.to_string()),
        other => Err(UsageError::InvalidKey {
            found: other.type_name(),
        }),
    }
}

/// Position for a possibly negative index, `None` when out of range
pub fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let actual = if index < 0 { len + index } else { index };
    (0..len).contains(&actual).then_some(actual as usize)
}

/// `(key, value)` pairs in iteration order: 0-based positions for a
/// Sequence, keys in insertion order for a Mapping
fn entries(container: &Value) -> Box<dyn Iterator<Item = (Value, &Value)> + '_> {
    match container {
        Value::List(list) => Box::new(
            list.iter()
                .enumerate()
                .map(|(i, v)| (Value::Integer(i as i64), v)),
        ),
        Value::Dict(dict) => Box::new(dict.iter().map(|(k, v)| (Value::string(k.as_str()), v))),
        _ => Box::new(std::iter::empty()),
    }
}
