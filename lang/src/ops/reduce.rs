use super::{Callable, container_shape, entries, is_empty};
use crate::error::LambdaError;
use crate::vm::Value;

/// Fold `container` into `initial`, calling `(acc, key, value)` per entry.
/// An empty container has no value.
pub fn reduce<C: Callable + ?Sized>(
    callable: &C,
    initial: Value,
    container: &Value,
) -> Result<Option<Value>, LambdaError> {
    container_shape("reduce", container)?;
    if is_empty(container) {
        return Ok(None);
    }

    let mut acc = initial;
    for (key, value) in entries(container) {
        acc = callable.invoke(&[acc, key, value.clone()])?;
    }
    Ok(Some(acc))
}
