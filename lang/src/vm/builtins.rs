//! Built-in functions of the expression language
//!
//! The higher-order builtins take their callback as expression text and run
//! it through the same engines the library exposes, so expressions compose:
//! `map("filter('val > 0', val)", rows)`.

use im_rc::Vector;
use unicode_segmentation::UnicodeSegmentation;

use super::runtime::RuntimeError;
use super::value::Value;
use crate::error::LambdaError;
use crate::lambda::Env;
use crate::ops;

/// Built-in function ID enum for compile-time registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BuiltinId {
    // Inspection
    Len = 0,
    Type = 1,
    Str = 2,
    Abs = 3,

    // Collection access
    Keys = 10,
    Values = 11,
    HasKey = 12,
    Get = 13,

    // Higher-order operations
    Map = 20,
    Filter = 21,
    Reduce = 22,
    Sort = 23,

    // Immutable collection operations
    Reverse = 30,
    Append = 31,
    Assoc = 32,
    Pop = 33,
}

impl BuiltinId {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinId::Len => "len",
            BuiltinId::Type => "type",
            BuiltinId::Str => "str",
            BuiltinId::Abs => "abs",
            BuiltinId::Keys => "keys",
            BuiltinId::Values => "values",
            BuiltinId::HasKey => "has_key",
            BuiltinId::Get => "get",
            BuiltinId::Map => "map",
            BuiltinId::Filter => "filter",
            BuiltinId::Reduce => "reduce",
            BuiltinId::Sort => "sort",
            BuiltinId::Reverse => "reverse",
            BuiltinId::Append => "append",
            BuiltinId::Assoc => "assoc",
            BuiltinId::Pop => "pop",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "len" => Some(BuiltinId::Len),
            "type" => Some(BuiltinId::Type),
            "str" => Some(BuiltinId::Str),
            "abs" => Some(BuiltinId::Abs),
            "keys" => Some(BuiltinId::Keys),
            "values" => Some(BuiltinId::Values),
            "has_key" => Some(BuiltinId::HasKey),
            "get" => Some(BuiltinId::Get),
            "map" => Some(BuiltinId::Map),
            "filter" => Some(BuiltinId::Filter),
            "reduce" => Some(BuiltinId::Reduce),
            "sort" => Some(BuiltinId::Sort),
            "reverse" => Some(BuiltinId::Reverse),
            "append" => Some(BuiltinId::Append),
            "assoc" => Some(BuiltinId::Assoc),
            "pop" => Some(BuiltinId::Pop),
            _ => None,
        }
    }

    /// Returns (min_arity, max_arity)
    pub fn arity(self) -> (u8, u8) {
        match self {
            BuiltinId::Len
            | BuiltinId::Type
            | BuiltinId::Str
            | BuiltinId::Abs
            | BuiltinId::Keys
            | BuiltinId::Values
            | BuiltinId::Reverse => (1, 1),

            BuiltinId::HasKey
            | BuiltinId::Filter
            | BuiltinId::Sort
            | BuiltinId::Append
            | BuiltinId::Pop => (2, 2),

            // get(collection, key, default?)
            BuiltinId::Get => (2, 3),

            BuiltinId::Reduce | BuiltinId::Assoc => (3, 3),

            // map(expr, container, ...)
            BuiltinId::Map => (2, 255),
        }
    }
}

impl TryFrom<u16> for BuiltinId {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BuiltinId::Len),
            1 => Ok(BuiltinId::Type),
            2 => Ok(BuiltinId::Str),
            3 => Ok(BuiltinId::Abs),
            10 => Ok(BuiltinId::Keys),
            11 => Ok(BuiltinId::Values),
            12 => Ok(BuiltinId::HasKey),
            13 => Ok(BuiltinId::Get),
            20 => Ok(BuiltinId::Map),
            21 => Ok(BuiltinId::Filter),
            22 => Ok(BuiltinId::Reduce),
            23 => Ok(BuiltinId::Sort),
            30 => Ok(BuiltinId::Reverse),
            31 => Ok(BuiltinId::Append),
            32 => Ok(BuiltinId::Assoc),
            33 => Ok(BuiltinId::Pop),
            _ => Err(value),
        }
    }
}

/// Execute a built-in function
pub fn call_builtin(
    env: &Env,
    id: BuiltinId,
    args: &[Value],
    line: u32,
) -> Result<Value, LambdaError> {
    let (min_arity, max_arity) = id.arity();
    if args.len() < min_arity as usize || args.len() > max_arity as usize {
        return Err(RuntimeError::new(
            format!(
                "{} expects {} argument(s), got {}",
                id.name(),
                if min_arity == max_arity {
                    min_arity.to_string()
                } else {
                    format!("{min_arity}-{max_arity}")
                },
                args.len()
            ),
            line,
        )
        .into());
    }

    match id {
        BuiltinId::Len => builtin_len(&args[0], line),
        BuiltinId::Type => Ok(Value::string(args[0].type_name())),
        BuiltinId::Str => Ok(builtin_str(&args[0])),
        BuiltinId::Abs => builtin_abs(&args[0], line),
        BuiltinId::Keys => builtin_keys(&args[0], line),
        BuiltinId::Values => builtin_values(&args[0], line),
        BuiltinId::HasKey => builtin_has_key(&args[0], &args[1], line),
        BuiltinId::Get => builtin_get(&args[0], &args[1], args.get(2), line),
        BuiltinId::Map => {
            let expr = expression_arg(id, &args[0], line)?;
            let containers: Vec<&Value> = args[1..].iter().collect();
            env.map(expr, &containers)
        }
        BuiltinId::Filter => env.filter(expression_arg(id, &args[0], line)?, &args[1]),
        BuiltinId::Reduce => {
            let expr = expression_arg(id, &args[0], line)?;
            Ok(env
                .reduce(expr, args[1].clone(), &args[2])?
                .unwrap_or(Value::Nil))
        }
        BuiltinId::Sort => env.sort(expression_arg(id, &args[0], line)?, &args[1]),
        BuiltinId::Reverse => Ok(ops::reverse(&args[0])?),
        BuiltinId::Append => Ok(ops::append(&args[0], args[1].clone())?),
        BuiltinId::Assoc => Ok(ops::assoc(&args[0], &args[1], args[2].clone())?),
        BuiltinId::Pop => Ok(ops::pop(&args[0], &args[1])?),
    }
}

fn expression_arg(id: BuiltinId, value: &Value, line: u32) -> Result<&str, RuntimeError> {
    value.as_str().ok_or_else(|| {
        RuntimeError::new(
            format!(
                "{} expects an expression String, got {}",
                id.name(),
                value.type_name()
            ),
            line,
        )
    })
}

/// len(value) → Integer
/// Strings count grapheme clusters
fn builtin_len(value: &Value, line: u32) -> Result<Value, LambdaError> {
    let len = match value {
        Value::String(s) => s.graphemes(true).count(),
        Value::List(list) => list.len(),
        Value::Dict(dict) => dict.len(),
        _ => {
            return Err(RuntimeError::new(
                format!("len does not support {}", value.type_name()),
                line,
            )
            .into());
        }
    };
    Ok(Value::Integer(len as i64))
}

/// str(value) → String, without quoting strings
fn builtin_str(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        other => Value::string(other.to_string()),
    }
}

fn builtin_abs(value: &Value, line: u32) -> Result<Value, LambdaError> {
    match value {
        Value::Integer(n) => n
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| RuntimeError::new("Integer overflow", line).into()),
        Value::Decimal(n) => Ok(Value::from(n.0.abs())),
        _ => Err(RuntimeError::new(
            format!("abs expects a number, got {}", value.type_name()),
            line,
        )
        .into()),
    }
}

/// keys(container) → Sequence
/// Mapping keys in insertion order, or the indexes of a Sequence
fn builtin_keys(collection: &Value, line: u32) -> Result<Value, LambdaError> {
    match collection {
        Value::Dict(d) => Ok(Value::List(d.keys().map(|k| Value::string(k.as_str())).collect())),
        Value::List(list) => Ok(Value::List(
            (0..list.len() as i64).map(Value::Integer).collect(),
        )),
        _ => Err(RuntimeError::new(
            format!("keys expects a container, got {}", collection.type_name()),
            line,
        )
        .into()),
    }
}

/// values(container) → Sequence
fn builtin_values(collection: &Value, line: u32) -> Result<Value, LambdaError> {
    match collection {
        Value::Dict(d) => Ok(Value::List(d.values().cloned().collect::<Vector<_>>())),
        Value::List(list) => Ok(Value::List(list.clone())),
        _ => Err(RuntimeError::new(
            format!("values expects a container, got {}", collection.type_name()),
            line,
        )
        .into()),
    }
}

fn builtin_has_key(collection: &Value, key: &Value, line: u32) -> Result<Value, LambdaError> {
    let found = match (collection, key) {
        (Value::Dict(d), _) => d.contains_key(&ops::mapping_key(key)?),
        (Value::List(list), Value::Integer(idx)) => ops::resolve_index(*idx, list.len()).is_some(),
        (Value::List(_), _) => false,
        _ => {
            return Err(RuntimeError::new(
                format!("has_key expects a container, got {}", collection.type_name()),
                line,
            )
            .into());
        }
    };
    Ok(Value::Boolean(found))
}

/// get(container, key, default?) → Value
/// A missing index or key yields the default, or nil
fn builtin_get(
    collection: &Value,
    key: &Value,
    default: Option<&Value>,
    line: u32,
) -> Result<Value, LambdaError> {
    let found = match (collection, key) {
        (Value::Dict(d), _) => d.get(&ops::mapping_key(key)?).cloned(),
        (Value::List(list), Value::Integer(idx)) => {
            ops::resolve_index(*idx, list.len()).map(|i| list[i].clone())
        }
        (Value::List(_), _) => None,
        _ => {
            return Err(RuntimeError::new(
                format!("get expects a container, got {}", collection.type_name()),
                line,
            )
            .into());
        }
    };
    Ok(found.or_else(|| default.cloned()).unwrap_or(Value::Nil))
}
