use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lambdakit::lexer::Lexer;
use lambdakit::parser::Parser;
use lambdakit::vm::compiler::Compiler;
use lambdakit::{Env, LambdaError, Param, Value, ops};
use lambdakit_benchmarks::{mapping, scrambled, sequence};

const SIZES: [usize; 3] = [10, 100, 1000];

// ============================================================================
// Front end
// ============================================================================

fn benchmark_front_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("front_end");

    let simple = "return acc + val";
    let nested = r#"return val > 0 ? map("val * 2", filter('val % 2', val)) : [key, -val]"#;

    for (name, src) in [("simple", simple), ("nested", nested)] {
        group.bench_with_input(BenchmarkId::new("lex_parse_compile", name), &src, |b, src| {
            let slots = vec![
                vec!["acc".to_string(), "accumulator".to_string()],
                vec!["key".to_string()],
                vec!["val".to_string(), "value".to_string()],
            ];
            b.iter(|| {
                let tokens = Lexer::new(black_box(src)).tokenize().unwrap();
                let stmts = Parser::new(tokens).parse_statements().unwrap();
                Compiler::compile_unit("bench", &slots, false, &stmts).unwrap()
            });
        });
    }

    group.finish();
}

// ============================================================================
// Synthesis
// ============================================================================

fn benchmark_synthesis(c: &mut Criterion) {
    let mut group = c.benchmark_group("synthesis");
    let env = Env::new();

    group.bench_function("synthesize_and_release", |b| {
        b.iter(|| {
            let unit = env.synthesize(vec![Param::new("x")], [black_box("return x + 1")]);
            black_box(unit.name().len())
        });
    });

    group.bench_function("first_call", |b| {
        b.iter(|| {
            let unit = env.synthesize(vec![Param::new("x")], ["return x + 1"]);
            unit.call(&[Value::Integer(1)]).unwrap()
        });
    });

    let warm = env.synthesize(vec![Param::new("x")], ["return x + 1"]);
    warm.call(&[Value::Integer(0)]).unwrap();
    group.bench_function("warm_call", |b| {
        b.iter(|| warm.call(black_box(&[Value::Integer(1)])).unwrap());
    });

    group.finish();
}

// ============================================================================
// Engines
// ============================================================================

fn benchmark_engines(c: &mut Criterion) {
    let mut group = c.benchmark_group("engines");
    let env = Env::new();

    for size in SIZES {
        let input = sequence(size);
        let unsorted = scrambled(size);
        let dict = mapping(size);

        group.bench_with_input(BenchmarkId::new("reduce_sum", size), &input, |b, input| {
            b.iter(|| env.reduce("acc + val", Value::Integer(0), input).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("map_double", size), &input, |b, input| {
            b.iter(|| env.map("val * 2", &[input]).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("map_zip", size), &input, |b, input| {
            b.iter(|| env.map("val1 + val2", &[input, input]).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("map_mapping", size), &dict, |b, dict| {
            b.iter(|| env.map("val + 1", &[dict]).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("filter_even", size), &input, |b, input| {
            b.iter(|| env.filter("val % 2 == 0", input).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("sort", size), &unsorted, |b, input| {
            b.iter(|| env.sort("left - right", input).unwrap());
        });
    }

    group.finish();
}

// ============================================================================
// Closures, for comparison with synthesized units
// ============================================================================

fn benchmark_closures(c: &mut Criterion) {
    let mut group = c.benchmark_group("closures");

    let add = |args: &[Value]| -> Result<Value, LambdaError> {
        match (&args[0], &args[2]) {
            (Value::Integer(acc), Value::Integer(val)) => Ok(Value::Integer(acc + val)),
            _ => Ok(Value::Nil),
        }
    };

    for size in SIZES {
        let input = sequence(size);
        group.bench_with_input(BenchmarkId::new("reduce_sum", size), &input, |b, input| {
            b.iter(|| ops::reduce(&add, Value::Integer(0), input).unwrap());
        });
    }

    group.finish();
}

// ============================================================================
// Collection helpers
// ============================================================================

fn benchmark_collection_helpers(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_helpers");

    let input = sequence(1000);
    let dict = mapping(1000);

    group.bench_function("reverse", |b| {
        b.iter(|| ops::reverse(black_box(&input)).unwrap());
    });
    group.bench_function("append", |b| {
        b.iter(|| ops::append(black_box(&input), Value::Integer(-1)).unwrap());
    });
    group.bench_function("assoc", |b| {
        b.iter(|| ops::assoc(black_box(&input), &Value::Integer(500), Value::Nil).unwrap());
    });
    group.bench_function("pop_mapping", |b| {
        b.iter(|| ops::pop(black_box(&dict), &Value::string("k500")).unwrap());
    });

    group.finish();
}

// ============================================================================
// End-to-end
// ============================================================================

fn benchmark_e2e(c: &mut Criterion) {
    let mut group = c.benchmark_group("e2e");

    let script = r#"
        let xs = [5, 3, 8, 1, 9, 2, 7, 4, 6, 10]
        let evens = filter("val % 2 == 0", xs)
        let scaled = map("val * 3", evens)
        reduce("acc + val", 0, sort("left - right", scaled))
    "#;
    group.bench_function("pipeline_script", |b| {
        let env = Env::new();
        b.iter(|| env.eval(black_box(script)).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_front_end,
    benchmark_synthesis,
    benchmark_engines,
    benchmark_closures,
    benchmark_collection_helpers,
    benchmark_e2e,
);

criterion_main!(benches);
