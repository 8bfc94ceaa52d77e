//! Input builders shared by the benchmarks

use lambdakit::Value;

/// `[0, 1, .., n - 1]`
pub fn sequence(n: usize) -> Value {
    Value::list((0..n as i64).map(Value::Integer))
}

/// Integers in a fixed scrambled order, for sorting
pub fn scrambled(n: usize) -> Value {
    let n = n as i64;
    Value::list((0..n).map(|i| Value::Integer((i * 7919) % n.max(1))))
}

/// `{"k0": 0, "k1": 1, ..}`
pub fn mapping(n: usize) -> Value {
    Value::dict((0..n as i64).map(|i| (format!("k{i}"), Value::Integer(i))))
}
