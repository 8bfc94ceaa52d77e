use super::*;
use crate::error::{LambdaError, StackFrame};
use std::time::{SystemTime, UNIX_EPOCH};

fn suffix(name: &str) -> u64 {
    name.strip_prefix(PREFIX)
        .and_then(|n| n.parse().ok())
        .expect("name should be lambda_<n>")
}

fn runtime_message(result: Result<Value, LambdaError>) -> String {
    match result {
        Err(LambdaError::Runtime(err)) => err.message,
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

#[test]
fn synthesized_names_are_unique_and_increasing() {
    let env = Env::new();
    let first = env.synthesize(vec![], ["return 1"]);
    let second = env.synthesize(vec![], ["return 2"]);

    assert!(first.name().starts_with(PREFIX));
    assert_ne!(first.name(), second.name());
    assert!(suffix(second.name()) > suffix(first.name()));
}

#[test]
fn names_are_unique_across_envs() {
    let a = Env::new().synthesize(vec![], ["nil"]);
    let b = Env::new().synthesize(vec![], ["nil"]);

    assert_ne!(a.name(), b.name());
}

#[test]
fn counter_is_seeded_from_the_clock() {
    let unit = Env::new().synthesize(vec![], ["nil"]);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();

    // The seed was taken when this test binary first synthesized a unit
    assert!(suffix(unit.name()) >= now - 3600);
}

#[test]
fn positional_params_and_aliases() {
    let env = Env::new();
    let unit = env.synthesize(
        vec![Param::new("a").alias("first"), Param::new("b")],
        ["return first * b - a"],
    );

    assert_eq!(
        unit.call(&[Value::Integer(3), Value::Integer(4)]),
        Ok(Value::Integer(9))
    );
}

#[test]
fn statements_are_joined_with_newlines() {
    let env = Env::new();
    let unit = env.synthesize(
        vec![Param::new("x")],
        ["let doubled = x * 2", "return doubled + 1"],
    );

    assert_eq!(unit.source(), "let doubled = x * 2\nreturn doubled + 1");
    assert_eq!(unit.call(&[Value::Integer(5)]), Ok(Value::Integer(11)));
}

#[test]
fn each_statement_stands_on_its_own() {
    let env = Env::new();
    let ten = [Value::Integer(10)];

    let negative = env.synthesize(vec![Param::new("x")], ["x", "-1"]);
    assert_eq!(negative.call(&ten), Ok(Value::Integer(-1)));

    let negated = env.synthesize(vec![Param::new("x")], ["let y = x * 2", "-y"]);
    assert_eq!(negated.call(&ten), Ok(Value::Integer(-20)));

    let grouped = env.synthesize(vec![Param::new("x")], ["let y = x", "(y + 1) * 2"]);
    assert_eq!(grouped.call(&ten), Ok(Value::Integer(22)));

    let listed = env.lambda(["let n = len(args)", "[n, args]"]);
    assert_eq!(
        listed.call(&[Value::Integer(7), Value::Integer(8)]),
        Ok(Value::list([
            Value::Integer(2),
            Value::list([Value::Integer(7), Value::Integer(8)]),
        ]))
    );
}

#[test]
fn open_brackets_and_trailing_operators_span_statements() {
    let unit = Env::new().synthesize(
        vec![Param::new("x")],
        ["let y = x +", "1", "[y,", "-y]"],
    );

    assert_eq!(
        unit.call(&[Value::Integer(10)]),
        Ok(Value::list([Value::Integer(11), Value::Integer(-11)]))
    );
}

#[test]
fn implicit_return() {
    let env = Env::new();

    let trailing = env.synthesize(vec![Param::new("x")], ["x + 1"]);
    assert_eq!(trailing.call(&[Value::Integer(1)]), Ok(Value::Integer(2)));

    let ends_with_let = env.synthesize(vec![Param::new("x")], ["let y = x"]);
    assert_eq!(ends_with_let.call(&[Value::Integer(1)]), Ok(Value::Nil));

    let empty = env.synthesize(Vec::new(), Vec::<String>::new());
    assert_eq!(empty.call(&[]), Ok(Value::Nil));

    let early = env.synthesize(vec![Param::new("x")], ["return x", "x * 100"]);
    assert_eq!(early.call(&[Value::Integer(7)]), Ok(Value::Integer(7)));
}

#[test]
fn arity_mismatch_is_a_runtime_error() {
    let env = Env::new();
    let unit = env.synthesize(vec![Param::new("a"), Param::new("b")], ["a + b"]);

    assert_eq!(
        runtime_message(unit.call(&[Value::Integer(1)])),
        format!("{} expects 2 argument(s), got 1", unit.name())
    );
}

#[test]
fn synthesis_never_fails_on_bad_source() {
    let env = Env::new();
    let unit = env.synthesize(vec![], ["return 1 +"]);

    assert_eq!(env.live_units(), 1);
    assert!(matches!(unit.call(&[]), Err(LambdaError::Parse(_))));
}

#[test]
fn compile_failure_is_cached() {
    let env = Env::new();
    let unit = env.synthesize(vec![], ["1 @ 2"]);

    let first = unit.call(&[]);
    let second = unit.call(&[]);

    assert!(matches!(first, Err(LambdaError::Lex(_))));
    assert_eq!(first, second);
}

#[test]
fn facade_binds_every_argument_as_args() {
    let env = Env::new();
    let unit = env.lambda(["return [len(args), args[0], args[-1]]"]);

    assert_eq!(
        unit.call(&[Value::Integer(4), Value::Integer(5), Value::Integer(6)]),
        Ok(Value::list([
            Value::Integer(3),
            Value::Integer(4),
            Value::Integer(6)
        ]))
    );
    assert_eq!(
        unit.call(&[]),
        Ok(Value::list([Value::Integer(0), Value::Nil, Value::Nil]))
    );
}

#[test]
fn dropping_the_handle_releases_the_unit() {
    let env = Env::new();
    let unit = env.synthesize(vec![], ["nil"]);
    let name = unit.name().to_string();

    assert_eq!(env.live_units(), 1);
    assert!(env.unit(&name).is_some());

    drop(unit);

    assert_eq!(env.live_units(), 0);
    assert!(env.unit(&name).is_none());
    assert_eq!(env.synthesized(), 1);
}

#[test]
fn live_units_are_callable_by_name() {
    let env = Env::new();
    let double = env.synthesize(vec![Param::new("x")], ["x * 2"]);
    let quad = env.synthesize(
        vec![Param::new("x")],
        [format!("{0}({0}(x))", double.name())],
    );

    assert_eq!(quad.call(&[Value::Integer(3)]), Ok(Value::Integer(12)));
    assert_eq!(
        env.eval(&format!("{}(10)", double.name())),
        Ok(Value::Integer(20))
    );

    let name = double.name().to_string();
    drop(double);

    assert_eq!(
        runtime_message(quad.call(&[Value::Integer(3)])),
        format!("Undefined function '{name}'")
    );
}

#[test]
fn units_read_globals() {
    let env = Env::new();
    env.define("rate", Value::Integer(3));
    let unit = env.synthesize(vec![Param::new("val")], ["val * rate"]);

    assert_eq!(unit.call(&[Value::Integer(5)]), Ok(Value::Integer(15)));

    env.eval("let rate = 10").unwrap();
    assert_eq!(unit.call(&[Value::Integer(5)]), Ok(Value::Integer(50)));
}

#[test]
fn cloned_env_shares_units_and_globals() {
    let env = Env::new();
    let other = env.clone();
    let unit = other.synthesize(vec![], ["nil"]);
    other.define("shared", Value::Boolean(true));

    assert!(env.unit(unit.name()).is_some());
    assert_eq!(env.global("shared"), Some(Value::Boolean(true)));
}

#[test]
fn runtime_errors_carry_a_stack_trace() {
    let env = Env::new();
    let inner = env.synthesize(vec![Param::new("v")], ["return v / 0"]);
    let outer = env.synthesize(
        vec![Param::new("v")],
        [
            "let w = v + 1".to_string(),
            format!("return {}(w)", inner.name()),
        ],
    );

    let Err(LambdaError::Runtime(err)) = outer.call(&[Value::Integer(1)]) else {
        panic!("expected a runtime error");
    };

    assert_eq!(err.message, "Division by zero");
    assert_eq!(err.line, 1);
    assert_eq!(
        err.stack_trace,
        vec![
            StackFrame {
                unit_name: Some(inner.name().to_string()),
                line: 1,
            },
            StackFrame {
                unit_name: Some(outer.name().to_string()),
                line: 2,
            },
        ]
    );
}

#[test]
fn nesting_is_bounded() {
    let env = Env::new();
    env.define("expr", Value::string("reduce(expr, 0, [1])"));

    assert_eq!(
        runtime_message(env.eval("reduce(expr, 0, [1])")),
        "Stack overflow"
    );
    assert_eq!(env.live_units(), 0);
    assert_eq!(env.eval("1 + 1"), Ok(Value::Integer(2)));
}

#[test]
fn debug_shows_name_and_counts() {
    let env = Env::new();
    let unit = env.synthesize(vec![], ["nil"]);

    assert_eq!(format!("{unit:?}"), format!("Lambda({:?})", unit.name()));
    assert_eq!(
        format!("{env:?}"),
        "Env { live_units: 1, synthesized: 1 }"
    );
}
