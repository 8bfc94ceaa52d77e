use std::cmp::Ordering;

use super::{Callable, not_a_container};
use crate::error::LambdaError;
use crate::vm::{RuntimeError, Value};

/// Stable sort of a copy of `container`, ordered by the sign of the
/// `(left, right)` comparator result. Mapping entries are ordered by value
/// and keep their keys. The first comparator error aborts the sort.
pub fn sort<C: Callable + ?Sized>(callable: &C, container: &Value) -> Result<Value, LambdaError> {
    let compare = |left: &Value, right: &Value| -> Result<Ordering, LambdaError> {
        ordering_of(callable.invoke(&[left.clone(), right.clone()])?)
    };

    match container {
        Value::List(list) => {
            let items: Vec<Value> = list.iter().map(Value::deep_copy).collect();
            let sorted = merge_sort(items, &mut |a: &Value, b: &Value| compare(a, b))?;
            Ok(Value::List(sorted.into_iter().collect()))
        }
        Value::Dict(dict) => {
            let entries: Vec<(String, Value)> = dict
                .iter()
                .map(|(k, v)| (k.clone(), v.deep_copy()))
                .collect();
            let sorted = merge_sort(entries, &mut |a: &(String, Value), b: &(String, Value)| {
                compare(&a.1, &b.1)
            })?;
            Ok(Value::Dict(sorted.into_iter().collect()))
        }
        other => Err(not_a_container("sort", other).into()),
    }
}

/// Negative, zero and positive results order left before, with, and after right.
/// NaN counts as equal.
fn ordering_of(result: Value) -> Result<Ordering, LambdaError> {
    match result {
        Value::Integer(n) => Ok(n.cmp(&0)),
        Value::Decimal(n) => Ok(n.0.partial_cmp(&0.0).unwrap_or(Ordering::Equal)),
        other => Err(RuntimeError::new(
            format!(
                "sort comparator must return a number, got {}",
                other.type_name()
            ),
            0,
        )
        .into()),
    }
}

/// Top-down merge sort with a fallible comparator. Accepts comparators that
/// are not a total order.
fn merge_sort<T, F>(mut items: Vec<T>, compare: &mut F) -> Result<Vec<T>, LambdaError>
where
    F: FnMut(&T, &T) -> Result<Ordering, LambdaError>,
{
    if items.len() <= 1 {
        return Ok(items);
    }

    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, compare)?;
    let right = merge_sort(right, compare)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        // Ties take from the left run, which keeps the sort stable
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => compare(l, r)? == Ordering::Greater,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        merged.extend(if take_right { right.next() } else { left.next() });
    }

    Ok(merged)
}
