/// Spec tests for the step-driven evaluator, exercising the full pipeline
/// from source text to `main`'s exit value.
use carbon::interpreter::{interpret, Interpreter};
use carbon::program::compile;

fn run_main(src: &str) -> i64 {
    let program = compile("test.carbon", src).expect("compile failed");
    interpret(&program).expect("run failed")
}

fn run_error(src: &str) -> String {
    let program = compile("test.carbon", src).expect("compile failed");
    interpret(&program).expect_err("expected a runtime error").to_string()
}

// ---------------------------------------------------------------------------
// Smoke
// ---------------------------------------------------------------------------

#[test]
fn trivial_main_returns_its_value() {
    assert_eq!(run_main("fn main() -> Int { return 0; }"), 0);
}

#[test]
fn variables_and_assignment() {
    assert_eq!(
        run_main("fn main() -> Int { var x: Int = 3; x = x + 4; return x; }"),
        7
    );
}

#[test]
fn choice_construction_and_matching() {
    assert_eq!(
        run_main(
            "choice Ints { None, One(Int) }
             fn main() -> Int {
                 var y: auto = Ints.One(42);
                 match (y) {
                     case Ints.One(n: auto) => return n;
                     default => return -1;
                 }
             }"
        ),
        42
    );
}

#[test]
fn struct_construction_and_member_access() {
    assert_eq!(
        run_main(
            "struct X { var a: Int; var b: Int; }
             fn main() -> Int { var v: X = X(.a = 3, .b = 4); return v.a + v.b; }"
        ),
        7
    );
}

// ---------------------------------------------------------------------------
// Arithmetic, logic, equality
// ---------------------------------------------------------------------------

#[test]
fn unary_operators() {
    assert_eq!(run_main("fn main() -> Int { return -(3 - 10); }"), 7);
    assert_eq!(
        run_main("fn main() -> Int { if (not false) { return 1; } return 0; }"),
        1
    );
}

#[test]
fn equality_on_tuples_is_structural() {
    assert_eq!(
        run_main("fn main() -> Int { if ((1, 2) == (1, 2)) { return 1; } return 0; }"),
        1
    );
    assert_eq!(
        run_main("fn main() -> Int { if ((1, 2) == (1, 3)) { return 1; } return 0; }"),
        0
    );
}

#[test]
fn equality_on_choice_values() {
    assert_eq!(
        run_main(
            "choice C { A, B(Int) }
             fn main() -> Int {
                 if (C.B(5) == C.B(5)) { if (C.B(5) == C.B(6)) { return 2; } return 1; }
                 return 0;
             }"
        ),
        1
    );
}

#[test]
fn and_short_circuits() {
    assert_eq!(
        run_main(
            "var hits: Int = 0;
             fn bump() -> Bool { hits = hits + 1; return true; }
             fn main() -> Int {
                 var b: Bool = false and bump();
                 if (b == false and hits == 0) { return 1; }
                 return 0;
             }"
        ),
        1
    );
}

#[test]
fn or_short_circuits() {
    assert_eq!(
        run_main(
            "var hits: Int = 0;
             fn bump() -> Bool { hits = hits + 1; return true; }
             fn main() -> Int {
                 var b: Bool = true or bump();
                 if (b and hits == 0) { return 1; }
                 return 0;
             }"
        ),
        1
    );
}

// ---------------------------------------------------------------------------
// Tuples
// ---------------------------------------------------------------------------

#[test]
fn positional_tuple_indexing() {
    assert_eq!(
        run_main("fn main() -> Int { var t: auto = (10, 20, 30); return t[1] + t[2]; }"),
        50
    );
}

#[test]
fn labeled_tuple_member_access() {
    assert_eq!(
        run_main("fn main() -> Int { var t: auto = (.a = 3, .b = 4); return t.a + t.b; }"),
        7
    );
}

#[test]
fn nested_tuple_projections() {
    assert_eq!(
        run_main("fn main() -> Int { var t: auto = ((1, 2), 3); return t[0][1] + t[1]; }"),
        5
    );
}

#[test]
fn assignment_through_a_projection() {
    assert_eq!(
        run_main("fn main() -> Int { var t: auto = (1, 2); t[0] = 10; return t[0] + t[1]; }"),
        12
    );
}

#[test]
fn struct_member_assignment() {
    assert_eq!(
        run_main(
            "struct X { var a: Int; var b: Int; }
             fn main() -> Int { var v: X = X(.a = 1, .b = 2); v.a = 10; return v.a + v.b; }"
        ),
        12
    );
}

#[test]
fn empty_tuple_is_unit() {
    assert_eq!(
        run_main("fn main() -> Int { var u: auto = (); if (u == ()) { return 1; } return 0; }"),
        1
    );
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

#[test]
fn nullary_call_produces_the_empty_tuple() {
    assert_eq!(
        run_main(
            "fn unit() { }
             fn main() -> Int { if (unit() == ()) { return 1; } return 0; }"
        ),
        1
    );
}

#[test]
fn recursion_with_explicit_return_type() {
    assert_eq!(
        run_main(
            "fn fib(n: Int) -> Int {
                 if (n == 0) { return 0; }
                 if (n == 1) { return 1; }
                 return fib(n - 1) + fib(n - 2);
             }
             fn main() -> Int { return fib(10); }"
        ),
        55
    );
}

#[test]
fn functions_are_first_class_values() {
    assert_eq!(
        run_main(
            "fn double(n: Int) -> Int { return n + n; }
             fn main() -> Int { var f: auto = double; return f(21); }"
        ),
        42
    );
}

#[test]
fn arrow_bodies_deduce_their_return_type() {
    assert_eq!(
        run_main("fn seven() => 3 + 4; fn main() -> Int { return seven(); }"),
        7
    );
}

#[test]
fn refutable_parameter_patterns_fail_at_the_call_site() {
    assert_eq!(
        run_main("fn only3(3) -> Int { return 1; } fn main() -> Int { return only3(3); }"),
        1
    );
    let err = run_error(
        "fn only3(3) -> Int { return 1; } fn main() -> Int { return only3(4); }",
    );
    assert!(
        err.contains("arguments failed to bind at call site"),
        "unexpected error: {}",
        err
    );
}

// ---------------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------------

#[test]
fn while_loop_accumulates() {
    assert_eq!(
        run_main(
            "fn main() -> Int {
                 var i: Int = 0;
                 var sum: Int = 0;
                 while (not (i == 10)) { sum = sum + i; i = i + 1; }
                 return sum;
             }"
        ),
        45
    );
}

#[test]
fn break_leaves_the_loop() {
    assert_eq!(
        run_main(
            "fn main() -> Int {
                 var i: Int = 0;
                 while (true) { if (i == 5) { break; } i = i + 1; }
                 return i;
             }"
        ),
        5
    );
}

#[test]
fn continue_skips_to_the_next_test() {
    assert_eq!(
        run_main(
            "fn main() -> Int {
                 var i: Int = 0;
                 var sum: Int = 0;
                 while (not (i == 6)) {
                     i = i + 1;
                     if (i == 3) { continue; }
                     sum = sum + i;
                 }
                 return sum;
             }"
        ),
        18
    );
}

#[test]
fn nested_loops_break_innermost() {
    assert_eq!(
        run_main(
            "fn main() -> Int {
                 var i: Int = 0;
                 var count: Int = 0;
                 while (not (i == 3)) {
                     var j: Int = 0;
                     while (true) {
                         if (j == 2) { break; }
                         j = j + 1;
                         count = count + 1;
                     }
                     i = i + 1;
                 }
                 return count;
             }"
        ),
        6
    );
}

#[test]
fn block_scoped_shadowing() {
    assert_eq!(
        run_main(
            "fn main() -> Int {
                 var x: Int = 1;
                 { var x: Int = 2; x = x + 1; }
                 return x;
             }"
        ),
        1
    );
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

#[test]
fn literal_atom_patterns_compare_by_value() {
    assert_eq!(
        run_main(
            "fn main() -> Int {
                 var x: Int = 3;
                 match (x) { case 2 => return 20; case 3 => return 30; default => return 0; }
             }"
        ),
        30
    );
}

#[test]
fn default_clause_always_matches() {
    assert_eq!(
        run_main(
            "fn main() -> Int { var x: Int = 9; match (x) { default => return 1; } }"
        ),
        1
    );
}

#[test]
fn nullary_alternative_is_referenceable_and_matchable() {
    assert_eq!(
        run_main(
            "choice C { A, B(Int) }
             fn main() -> Int {
                 var x: auto = C.A;
                 match (x) { case C.A => return 1; default => return 0; }
             }"
        ),
        1
    );
}

#[test]
fn clauses_try_in_source_order() {
    assert_eq!(
        run_main(
            "choice C { A, B(Int) }
             fn main() -> Int {
                 var x: auto = C.B(7);
                 match (x) {
                     case C.A => return 1;
                     case C.B(n: auto) => return n;
                     default => return 0;
                 }
             }"
        ),
        7
    );
}

#[test]
fn no_matching_clause_is_a_runtime_error() {
    let err = run_error(
        "choice C { A, B }
         fn main() -> Int {
             var x: auto = C.A;
             match (x) { case C.B => return 1; }
             return 0;
         }",
    );
    assert!(err.contains("no matching clause"), "unexpected error: {}", err);
}

#[test]
fn tuple_patterns_destructure() {
    assert_eq!(
        run_main(
            "fn main() -> Int {
                 var (a: Int, b: auto) = (3, 4);
                 return a + b;
             }"
        ),
        7
    );
}

// ---------------------------------------------------------------------------
// Globals
// ---------------------------------------------------------------------------

#[test]
fn globals_initialize_lazily_on_first_use() {
    assert_eq!(
        run_main("fn main() -> Int { return g; } var g: Int = 41 + 1;"),
        42
    );
}

#[test]
fn global_initialization_order_is_irrelevant() {
    assert_eq!(
        run_main(
            "var a: Int = b + 1;
             fn main() -> Int { return a; }
             var b: Int = 1;"
        ),
        2
    );
}

#[test]
fn global_initialization_cycles_are_a_runtime_error() {
    let err = run_error(
        "var x: Int = y; var y: Int = x; fn main() -> Int { return x; }",
    );
    assert!(err.contains("cycle"), "unexpected error: {}", err);
}

#[test]
fn assignment_may_be_the_first_touch_of_a_global() {
    assert_eq!(
        run_main(
            "var g: Int = 1;
             fn main() -> Int { g = g + 10; return g; }"
        ),
        11
    );
}

// ---------------------------------------------------------------------------
// Stepping
// ---------------------------------------------------------------------------

#[test]
fn execution_can_be_driven_one_step_at_a_time() {
    let program = compile(
        "test.carbon",
        "fn main() -> Int { var x: Int = 3; x = x + 4; return x; }",
    )
    .expect("compile failed");
    let mut interp = Interpreter::new(&program).expect("start failed");
    let mut steps = 0usize;
    while interp.step().expect("step failed") {
        steps += 1;
        assert!(steps < 10_000, "interpreter failed to terminate");
    }
    assert_eq!(interp.run().expect("exit value missing"), 7);
    assert!(steps > 1, "stepping should take multiple units of work");
}
