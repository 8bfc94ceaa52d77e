use im_rc::Vector;
use indexmap::IndexMap;

use super::{Callable, Shape, common_shape};
use crate::error::LambdaError;
use crate::vm::Value;

/// Call `(key, v1, .., vN)` for every key all containers share.
///
/// Sequences are aligned by position and the result is as long as the
/// shortest input. Mappings keep the keys present in every input, in the
/// first input's order.
pub fn map<C: Callable + ?Sized>(callable: &C, containers: &[&Value]) -> Result<Value, LambdaError> {
    match common_shape("map", containers)? {
        Shape::Sequence => {
            let lists: Vec<&Vector<Value>> = containers
                .iter()
                .filter_map(|c| match c {
                    Value::List(list) => Some(list),
                    _ => None,
                })
                .collect();
            let len = lists.iter().map(|list| list.len()).min().unwrap_or(0);

            let mut result = Vector::new();
            for i in 0..len {
                let mut args = Vec::with_capacity(lists.len() + 1);
                args.push(Value::Integer(i as i64));
                args.extend(lists.iter().map(|list| list[i].clone()));
                result.push_back(callable.invoke(&args)?);
            }
            Ok(Value::List(result))
        }
        Shape::Mapping => {
            let dicts: Vec<&IndexMap<String, Value>> = containers
                .iter()
                .filter_map(|c| match c {
                    Value::Dict(dict) => Some(dict),
                    _ => None,
                })
                .collect();
            let Some((first, rest)) = dicts.split_first() else {
                return Ok(Value::Dict(IndexMap::new()));
            };

            let mut result = IndexMap::new();
            for (key, value) in first.iter() {
                let Some(others) = rest
                    .iter()
                    .map(|dict| dict.get(key).cloned())
                    .collect::<Option<Vec<_>>>()
                else {
                    continue;
                };

                let mut args = Vec::with_capacity(dicts.len() + 1);
                args.push(Value::string(key.as_str()));
                args.push(value.clone());
                args.extend(others);
                result.insert(key.clone(), callable.invoke(&args)?);
            }
            Ok(Value::Dict(result))
        }
    }
}
