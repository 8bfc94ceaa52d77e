use im_rc::Vector;
use indexmap::IndexMap;

use super::{Callable, not_a_container};
use crate::error::LambdaError;
use crate::vm::Value;

/// Keep the entries whose `(key, value)` call is truthy; kept values are deep copies
pub fn filter<C: Callable + ?Sized>(callable: &C, container: &Value) -> Result<Value, LambdaError> {
    match container {
        Value::List(list) => {
            let mut kept = Vector::new();
            for (i, value) in list.iter().enumerate() {
                if callable
                    .invoke(&[Value::Integer(i as i64), value.clone()])?
                    .is_truthy()
                {
                    kept.push_back(value.deep_copy());
                }
            }
            Ok(Value::List(kept))
        }
        Value::Dict(dict) => {
            let mut kept = IndexMap::new();
            for (key, value) in dict {
                if callable
                    .invoke(&[Value::string(key.as_str()), value.clone()])?
                    .is_truthy()
                {
                    kept.insert(key.clone(), value.deep_copy());
                }
            }
            Ok(Value::Dict(kept))
        }
        other => Err(not_a_container("filter", other).into()),
    }
}
