use std::cell::Cell;

use kaleidoc::{Driver, Error, ErrorKind, HostFunctions, Options, Outcome};

const OPTIONS: Options = Options {
    print_ir: false,
    evaluate: true,
};

fn driver() -> Driver {
    Driver::new(OPTIONS).unwrap()
}

/// Values of all top-level expressions, panicking on any error.
fn eval(driver: &mut Driver, src: &str) -> Vec<f64> {
    driver
        .run_source(src)
        .into_iter()
        .filter_map(|r| match r {
            Ok(Outcome::TopLevel { value, .. }) => value,
            Ok(_) => None,
            Err(e) => panic!("{:?} failed: {}", src, e),
        })
        .collect()
}

fn eval_one(src: &str) -> f64 {
    let values = eval(&mut driver(), src);
    *values.last().expect("no top-level expression")
}

fn errors(src: &str) -> Vec<ErrorKind> {
    driver()
        .run_source(src)
        .into_iter()
        .filter_map(Result::err)
        .map(|e: Error| e.kind().clone())
        .collect()
}

thread_local! {
    static TICKS: Cell<usize> = Cell::new(0);
}

extern "C" fn tick() -> f64 {
    TICKS.with(|t| t.set(t.get() + 1));
    0.0
}

/// Calls to `tick()` made by `src` on this thread.
fn ticks(driver: &mut Driver, src: &str) -> usize {
    TICKS.with(|t| t.set(0));
    eval(driver, src);
    TICKS.with(|t| t.get())
}

/// A driver with a `tick()` host function that counts its calls.
fn counting_driver() -> Driver {
    let mut hosts = HostFunctions::with_runtime();
    hosts.register("tick", tick as extern "C" fn() -> f64);
    let mut d = Driver::with_host_functions(OPTIONS, hosts).unwrap();
    eval(&mut d, "extern tick()");
    d
}

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(eval_one("1 + 2 * 3"), 7.0);
    assert_eq!(eval_one("(1 + 2) * 3"), 9.0);
    assert_eq!(eval_one("10 - 4 - 3"), 3.0);
    assert_eq!(eval_one("1 < 2"), 1.0);
    assert_eq!(eval_one("2 < 1"), 0.0);
}

#[test]
fn comments_and_malformed_numbers() {
    assert_eq!(eval_one("# leading comment\n1.5 + 1 # trailing"), 2.5);
    assert_eq!(eval_one("1.2.3 + 0"), 1.2);
}

#[test]
fn functions_and_recursion() {
    let src = "
        def fib(x)
          if x < 3 then
            1
          else
            fib(x-1) + fib(x-2);
        fib(10)
    ";
    assert_eq!(eval_one(src), 55.0);
}

#[test]
fn var_binding_shadows_and_restores() {
    assert_eq!(eval_one("var x = 1 in x = x + 1"), 2.0);
    assert_eq!(eval_one("def f(x) (var x = 1 in x = x + 1) + x * 10; f(5)"), 52.0);
    // Later initializers see earlier names.
    assert_eq!(eval_one("var a = 2, b = a * 3 in a + b"), 8.0);
    // Missing initializers default to zero.
    assert_eq!(eval_one("var a in a"), 0.0);
    // A repeated name still restores the outer binding afterwards.
    assert_eq!(eval_one("def g(a) (var a = 1, a = 2 in a) + a; g(10)"), 12.0);
}

#[test]
fn for_loop_runs_body_per_iteration() {
    let mut d = counting_driver();
    assert_eq!(eval(&mut d, "for i = 0, i < 3, 1.0 in tick()"), vec![0.0]);
    assert_eq!(ticks(&mut d, "for i = 0, i < 3, 1.0 in tick()"), 3);
    assert_eq!(ticks(&mut d, "for i = 0, i < 0, 1.0 in tick()"), 0);
    assert_eq!(ticks(&mut d, "for i = 0, i < 10, 2 in tick()"), 5);
    assert_eq!(ticks(&mut d, "for i = 1, i < 4 in tick()"), 3);
}

#[test]
fn for_loop_restores_outer_binding() {
    assert_eq!(eval_one("def f(i) (for i = 0, i < 5 in i) + i; f(7)"), 7.0);
}

#[test]
fn mutation_inside_loops() {
    let src = "
        def sum(n)
          var acc = 0 in
            (for i = 1, i < n + 1 in acc = acc + i) + acc;
        sum(4)
    ";
    assert_eq!(eval_one(src), 10.0);
}

#[test]
fn user_defined_operators() {
    let src = "
        def unary!(v) if v then 0 else 1;
        def unary-(v) 0-v;
        def binary> 10 (a b) b < a;
        def binary: 1 (x y) y;
        !0 : -3 + 5 : 4 > 3
    ";
    assert_eq!(eval_one(src), 1.0);
    assert_eq!(eval_one("def unary-(v) 0-v; -3 + 5"), 2.0);
}

#[test]
fn user_binary_operator_groups_left() {
    let src = "
        def binary^ 100 (base exp)
          var r = 1 in
            (for i = 0, i < exp in r = r * base) + r;
        2^2^3
    ";
    // (2^2)^3, not 2^(2^3)
    assert_eq!(eval_one(src), 64.0);
}

#[test]
fn forward_references_resolve_later_definitions() {
    let src = "
        extern later(x);
        def early(x) later(x) + 1;
        def later(x) x * 2;
        early(4)
    ";
    assert_eq!(eval_one(src), 9.0);
}

#[test]
fn duplicate_parameters_alias() {
    assert_eq!(eval_one("def f(a a) a; f(1, 2)"), 2.0);
}

#[test]
fn deep_recursion_terminates() {
    let src = "def count(n) if n < 1 then 0 else 1 + count(n-1); count(300)";
    assert_eq!(eval_one(src), 300.0);
}

#[test]
fn errors_carry_positions() {
    let mut d = driver();
    let results = d.run_source("\n\n   def f(x) y");
    let messages: Vec<String> = results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .map(|e| e.to_string())
        .collect();
    assert_eq!(messages, ["3:13: Unknown variable name"]);

    let results = d.run_source("1 +\n  then");
    match &results[0] {
        Err(e) => assert_eq!(e.to_string(), "2:3: unknown token when expecting an expression"),
        r => panic!("unexpected {:?}", r),
    }
}

#[test]
fn runtime_primitives() {
    assert_eq!(eval_one("extern printd(x); printd(3)"), 0.0);
    assert_eq!(eval_one("extern putchard(c); putchard(10)"), 0.0);
}

#[test]
fn lowering_errors_are_named() {
    assert_eq!(
        errors("foo(1)"),
        vec![ErrorKind::Codegen("Unknown function referenced".to_owned())]
    );
    assert_eq!(
        errors("def f(a) a; f(1, 2)"),
        vec![ErrorKind::Codegen("Incorrect # arguments passed".to_owned())]
    );
    assert_eq!(
        errors("def f(a) b"),
        vec![ErrorKind::Codegen("Unknown variable name".to_owned())]
    );
    assert_eq!(
        errors("def f(a) 1 = a"),
        vec![ErrorKind::Codegen("destination of '=' must be a variable".to_owned())]
    );
}

#[test]
fn state_survives_errors() {
    let mut d = driver();
    let results = d.run_source("def ok(x) x + 1; def bad(x) nope; ok(1)");
    assert!(results[1].is_err());
    match &results[2] {
        Ok(Outcome::TopLevel { value, .. }) => assert_eq!(*value, Some(2.0)),
        r => panic!("unexpected {:?}", r),
    }
    assert!(d.session().module().get_function("bad").is_none());
}

#[test]
fn unresolved_extern_fails_at_run_time() {
    let kinds = errors("extern nothere(x); nothere(1)");
    assert_eq!(kinds.len(), 1);
    match &kinds[0] {
        ErrorKind::Runtime(msg) => assert!(msg.contains("nothere")),
        k => panic!("unexpected {:?}", k),
    }
}
