use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use se_lang::lexer::Lexer;
use se_lang::parser::Parser;
use se_lang::resolver::resolve;
use se_lang::vm::{Compiler, Machine, MachineConfig, Prelude};
use se_lang::Interpreter;
use std::rc::Rc;

const SIMPLE: &str = "1 + 2 * 3 - 4 / 2";

const FACTORIAL: &str = r#"
    fac = n -> n <= 1 ? 1 : n * fac(n - 1);
    fac(20)
"#;

const FIBONACCI: &str = r#"
    fib = n -> n < 2 ? n : fib(n - 1) + fib(n - 2);
    fib(20)
"#;

const CURRIED: &str = r#"
    add3 = a -> b -> c -> a + b + c;
    loop = (n, acc) -> n == 0 ? acc : loop(n - 1, add3(n)(acc)(1));
    loop(200, 0)
"#;

fn chain_of_locals(count: usize) -> String {
    let mut source = String::from("{x0 = 0;\n");
    for i in 1..count {
        source.push_str(&format!("x{i} = x{} + {i};\n", i - 1));
    }
    source.push_str(&format!("x{}}}", count - 1));
    source
}

// ============================================================================
// Lexer Benchmarks
// ============================================================================

fn benchmark_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer");

    let large = chain_of_locals(1000);
    for (name, src) in [
        ("simple_expr", SIMPLE),
        ("factorial", FACTORIAL),
        ("1000_locals", large.as_str()),
    ] {
        group.bench_with_input(BenchmarkId::new("tokenize", name), &src, |b, src| {
            b.iter(|| Lexer::new(black_box(src)).tokenize().unwrap());
        });
    }

    group.finish();
}

// ============================================================================
// Parser Benchmarks
// ============================================================================

fn benchmark_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    let large = chain_of_locals(1000);
    for (name, src) in [
        ("simple_expr", SIMPLE),
        ("curried", CURRIED),
        ("1000_locals", large.as_str()),
    ] {
        let tokens = Lexer::new(src).tokenize().unwrap();
        group.bench_with_input(BenchmarkId::new("parse", name), &tokens, |b, tokens| {
            b.iter(|| Parser::new(black_box(tokens.clone())).parse_program().unwrap());
        });
    }

    group.finish();
}

// ============================================================================
// Resolve + Compile Benchmarks
// ============================================================================

fn benchmark_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let prelude = Rc::new(Prelude::standard());
    let names = prelude.names();

    for (name, src) in [("fibonacci", FIBONACCI), ("curried", CURRIED)] {
        let tokens = Lexer::new(src).tokenize().unwrap();
        let expr = Parser::new(tokens).parse_program().unwrap();

        group.bench_with_input(BenchmarkId::new("resolve_and_compile", name), &expr, |b, expr| {
            b.iter(|| {
                let mut expr = expr.clone();
                let scopes = resolve(&mut expr, &names).unwrap();
                Compiler::compile_program(&scopes, &expr, Rc::clone(&prelude)).unwrap()
            });
        });
    }

    group.finish();
}

// ============================================================================
// Machine Benchmarks
// ============================================================================

fn benchmark_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine");
    let interpreter = Interpreter::default();

    for (name, src) in [
        ("arithmetic", SIMPLE),
        ("factorial", FACTORIAL),
        ("fibonacci", FIBONACCI),
        ("curried", CURRIED),
    ] {
        let program = interpreter.compile(src).unwrap();
        let mut machine = Machine::new(MachineConfig::default());

        group.bench_function(name, |b| {
            b.iter(|| machine.run(black_box(&program)).unwrap());
        });
    }

    group.finish();
}

// ============================================================================
// End-to-End Benchmarks
// ============================================================================

fn benchmark_e2e(c: &mut Criterion) {
    let mut group = c.benchmark_group("e2e");
    let interpreter = Interpreter::default();

    group.bench_function("fibonacci", |b| {
        b.iter(|| interpreter.run(black_box(FIBONACCI)).unwrap());
    });

    let large = chain_of_locals(1000);
    group.bench_function("1000_locals", |b| {
        b.iter(|| interpreter.run(black_box(&large)).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_lexer,
    benchmark_parser,
    benchmark_compile,
    benchmark_machine,
    benchmark_e2e,
);
criterion_main!(benches);
