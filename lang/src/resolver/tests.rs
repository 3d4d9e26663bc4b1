use super::*;
use crate::lexer::Lexer;
use crate::parser::Parser;
use expect_test::{expect, Expect};

const PRELUDE: &[&str] = &[
    "add", "sub", "mul", "div", "mod", "eq", "neq", "lt", "le", "gt", "ge", "and", "or", "neg",
    "not", "true", "false",
];

fn parse(input: &str) -> SpannedExpr {
    let tokens = Lexer::new(input).tokenize().unwrap();
    Parser::new(tokens).parse_program().unwrap()
}

fn collect_bindings(expr: &SpannedExpr, out: &mut Vec<String>) {
    let show = |var: &Option<Var>| match var {
        Some(var) => var.to_string(),
        None => "?".to_string(),
    };
    match &expr.node {
        Expr::Number(_) => {}
        Expr::Ident { name, var } => out.push(format!("{name}: {}", show(var))),
        Expr::Call { callee, args } => {
            collect_bindings(callee, out);
            for arg in args {
                collect_bindings(arg, out);
            }
        }
        Expr::Lambda(lambda) => {
            for param in &lambda.params {
                collect_bindings(param, out);
            }
            collect_bindings(&lambda.body, out);
        }
        Expr::Block(stmts) => {
            for stmt in stmts {
                collect_bindings(stmt, out);
            }
        }
        Expr::Assign { name, value, var } => {
            out.push(format!("{name} = {}", show(var)));
            collect_bindings(value, out);
        }
        Expr::Cond {
            test,
            then,
            otherwise,
        } => {
            collect_bindings(test, out);
            collect_bindings(then, out);
            collect_bindings(otherwise, out);
        }
    }
}

fn check(input: &str, expect: Expect) {
    let mut expr = parse(input);
    let output = match resolve(&mut expr, PRELUDE) {
        Ok(scopes) => {
            let mut bindings = Vec::new();
            collect_bindings(&expr, &mut bindings);
            format!("{}--\n{}", scopes.dump(), bindings.join("\n"))
        }
        Err(e) => format!("Error: {} at {}:{}", e.message, e.span.line, e.span.column),
    };
    expect.assert_eq(output.trim_end());
}

#[test]
fn resolve_arguments_directly() {
    check(
        "((x, y) -> x + y)(1, 2)",
        expect![[r#"
            frame 0 <main>() slots=0
            frame 1 <lambda>(x, y) slots=0
            --
            x: arg0
            y: arg1
            add: prelude0
            x: arg0
            y: arg1"#]],
    );
}

#[test]
fn resolve_single_capture() {
    check(
        "(x->y->x+y)(1)(2)",
        expect![[r#"
            frame 0 <main>() slots=0
            frame 1 <lambda>(x) slots=0
            frame 2 <lambda>(y) slots=1
              [0] capture x <- arg0
            --
            x: arg0
            y: arg0
            add: prelude0
            x: cap2:0
            y: arg0"#]],
    );
}

#[test]
fn resolve_chained_capture() {
    check(
        "(x->y->z->x+y+z)(1)(2)(3)",
        expect![[r#"
            frame 0 <main>() slots=0
            frame 1 <lambda>(x) slots=0
            frame 2 <lambda>(y) slots=1
              [0] capture x <- arg0
            frame 3 <lambda>(z) slots=2
              [0] capture x <- cap2:0
              [1] capture y <- arg0
            --
            x: arg0
            y: arg0
            z: arg0
            add: prelude0
            add: prelude0
            x: cap3:0
            y: cap3:1
            z: arg0"#]],
    );
}

#[test]
fn resolve_repeated_reference_reuses_capture() {
    check(
        "x -> () -> x * x",
        expect![[r#"
            frame 0 <main>() slots=0
            frame 1 <lambda>(x) slots=0
            frame 2 <lambda>() slots=1
              [0] capture x <- arg0
            --
            x: arg0
            mul: prelude2
            x: cap2:0
            x: cap2:0"#]],
    );
}

#[test]
fn resolve_recursive_binding() {
    check(
        "fac=(n)->(n<=1?n:n*fac(n-1)); fac(6)",
        expect![[r#"
            frame 0 <main>() slots=1
              [0] local fac
            frame 1 fac(n) slots=1
              [0] capture fac <- self
            --
            fac = local0
            n: arg0
            le: prelude8
            n: arg0
            n: arg0
            mul: prelude2
            n: arg0
            fac: cap1:0
            sub: prelude1
            n: arg0
            fac: local0"#]],
    );
}

#[test]
fn resolve_block_locals_are_hoisted() {
    check(
        "{a = 1; f = x -> a + x; b = 2; f(b)}",
        expect![[r#"
            frame 0 <main>() slots=3
              [0] local a
              [1] local f
              [2] local b
            frame 1 f(x) slots=1
              [0] capture a <- local0
            --
            a = local0
            f = local1
            x: arg0
            add: prelude0
            a: cap1:0
            x: arg0
            b = local2
            f: local1
            b: local2"#]],
    );
}

#[test]
fn resolve_locals_and_captures_share_slots() {
    check(
        "x -> y -> {a = x; a + y}",
        expect![[r#"
            frame 0 <main>() slots=0
            frame 1 <lambda>(x) slots=0
            frame 2 <lambda>(y) slots=2
              [0] local a
              [1] capture x <- arg0
            --
            x: arg0
            y: arg0
            a = local0
            x: cap2:0
            add: prelude0
            a: local0
            y: arg0"#]],
    );
}

#[test]
fn resolve_block_inside_lambda_uses_lambda_frame() {
    check(
        "(n -> {m = n * 2; m + n})(4)",
        expect![[r#"
            frame 0 <main>() slots=0
            frame 1 <lambda>(n) slots=1
              [0] local m
            --
            n: arg0
            m = local0
            mul: prelude2
            n: arg0
            add: prelude0
            m: local0
            n: arg0"#]],
    );
}

#[test]
fn resolve_capture_origin_walks_chain() {
    let mut expr = parse("x -> y -> z -> x");
    let scopes = resolve(&mut expr, PRELUDE).unwrap();
    let inner = Var::Captured {
        frame: FrameId(3),
        index: 0,
    };
    assert_eq!(scopes.origin(inner), Var::Arg(0));
    assert_eq!(scopes[FrameId(3)].captures[0].source, Source::Parent(Var::Captured {
        frame: FrameId(2),
        index: 0,
    }));
    assert_eq!(scopes.len(), 4);
}

#[test]
fn resolve_recursive_capture_is_its_own_origin() {
    let mut expr = parse("f = x -> f(x); f(1)");
    let scopes = resolve(&mut expr, PRELUDE).unwrap();
    let var = Var::Captured {
        frame: FrameId(1),
        index: 0,
    };
    assert_eq!(scopes.origin(var), var);
    assert_eq!(scopes[FrameId(1)].slot_count(), 2);
}

#[test]
fn resolve_annotates_lambda_frames() {
    let mut expr = parse("x -> y -> x");
    resolve(&mut expr, PRELUDE).unwrap();
    let Expr::Lambda(outer) = &expr.node else {
        panic!("expected lambda");
    };
    assert_eq!(outer.frame, Some(FrameId(1)));
    let Expr::Lambda(inner) = &outer.body.node else {
        panic!("expected lambda");
    };
    assert_eq!(inner.frame, Some(FrameId(2)));
}

#[test]
fn resolve_error_undefined() {
    check("foo + 1", expect![[r#"Error: undefined: foo at 1:1"#]]);
}

#[test]
fn resolve_error_forward_reference() {
    check(
        "{x = y; y = 1; x}",
        expect![[r#"Error: `y` used before assignment at 1:6"#]],
    );
}

#[test]
fn resolve_error_self_reference_outside_lambda() {
    check(
        "{x = x + 1; x}",
        expect![[r#"Error: `x` used before assignment at 1:6"#]],
    );
    check(
        "{f = (x -> x)(f); f}",
        expect![[r#"Error: `f` used before assignment at 1:15"#]],
    );
}

#[test]
fn resolve_error_duplicate_parameter() {
    check(
        "(x, x) -> x",
        expect![[r#"Error: duplicate parameter `x` at 1:5"#]],
    );
}

#[test]
fn resolve_error_non_identifier_parameter() {
    check(
        "(1, y) -> y",
        expect![[r#"Error: lambda parameter must be an identifier, found `1` at 1:2"#]],
    );
}

#[test]
fn resolve_error_duplicate_assignment() {
    check(
        "{x = 1; x = 2; x}",
        expect![[r#"Error: `x` is assigned twice in the same block at 1:9"#]],
    );
}

#[test]
fn resolve_error_malformed_blocks() {
    check(
        "{x = 1}",
        expect![[r#"Error: block must end with an expression at 1:2"#]],
    );
    check(
        "{1; 2}",
        expect![[r#"Error: only the last statement of a block may be an expression at 1:2"#]],
    );
    check("{}", expect![[r#"Error: block must end with an expression at 1:1"#]]);
}

#[test]
fn resolve_error_assignment_outside_block() {
    check(
        "x = 1",
        expect![[r#"Error: assignment to `x` outside a block at 1:1"#]],
    );
}
