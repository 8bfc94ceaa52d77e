use im_rc::Vector;
use indexmap::IndexMap;

use super::{mapping_key, not_a_container, resolve_index};
use crate::error::UsageError;
use crate::vm::Value;

/// reverse(container) → container
/// A Mapping comes back as an unchanged copy.
pub fn reverse(container: &Value) -> Result<Value, UsageError> {
    match container {
        Value::List(list) => Ok(Value::List(list.iter().rev().map(Value::deep_copy).collect())),
        Value::Dict(_) => Ok(container.deep_copy()),
        other => Err(not_a_container("reverse", other)),
    }
}

/// append(container, value) → container
/// Mappings take a `[key, value]` pair; an existing key keeps its position.
pub fn append(container: &Value, value: Value) -> Result<Value, UsageError> {
    match container {
        Value::List(list) => {
            let mut result: Vector<Value> = list.iter().map(Value::deep_copy).collect();
            result.push_back(value.deep_copy());
            Ok(Value::List(result))
        }
        Value::Dict(dict) => {
            let (key, item) = match &value {
                Value::List(pair) if pair.len() == 2 => {
                    (mapping_key(&pair[0])?, pair[1].deep_copy())
                }
                other => {
                    return Err(UsageError::InvalidPair {
                        found: other.to_string(),
                    });
                }
            };
            let mut result = copy_entries(dict);
            result.insert(key, item);
            Ok(Value::Dict(result))
        }
        other => Err(not_a_container("append", other)),
    }
}

/// assoc(container, key, value) → container
/// A Sequence index may be negative and must be in range; the length itself
/// appends.
pub fn assoc(container: &Value, key: &Value, value: Value) -> Result<Value, UsageError> {
    match container {
        Value::List(list) => {
            let index = sequence_index(key)?;
            let mut result: Vector<Value> = list.iter().map(Value::deep_copy).collect();
            if index == list.len() as i64 {
                result.push_back(value.deep_copy());
            } else {
                let position = resolve_index(index, list.len()).ok_or(
                    UsageError::IndexOutOfRange {
                        index,
                        len: list.len(),
                    },
                )?;
                result.set(position, value.deep_copy());
            }
            Ok(Value::List(result))
        }
        Value::Dict(dict) => {
            let key = mapping_key(key)?;
            let mut result = copy_entries(dict);
            result.insert(key, value.deep_copy());
            Ok(Value::Dict(result))
        }
        other => Err(not_a_container("assoc", other)),
    }
}

/// pop(container, key) → container
/// Removes an in-range index or an existing key; remaining order is kept.
pub fn pop(container: &Value, key: &Value) -> Result<Value, UsageError> {
    match container {
        Value::List(list) => {
            let index = sequence_index(key)?;
            let position = resolve_index(index, list.len()).ok_or(UsageError::IndexOutOfRange {
                index,
                len: list.len(),
            })?;
            let result = list
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != position)
                .map(|(_, v)| v.deep_copy())
                .collect();
            Ok(Value::List(result))
        }
        Value::Dict(dict) => {
            let key = mapping_key(key)?;
            let mut result = copy_entries(dict);
            if result.shift_remove(&key).is_none() {
                return Err(UsageError::KeyNotFound { key });
            }
            Ok(Value::Dict(result))
        }
        other => Err(not_a_container("pop", other)),
    }
}

fn sequence_index(key: &Value) -> Result<i64, UsageError> {
    match key {
        Value::Integer(n) => Ok(*n),
        other => Err(UsageError::InvalidIndex {
            found: other.type_name(),
        }),
    }
}

fn copy_entries(dict: &IndexMap<String, Value>) -> IndexMap<String, Value> {
    dict.iter()
        .map(|(k, v)| (k.clone(), v.deep_copy()))
        .collect()
}
