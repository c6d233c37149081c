/// Spec tests for the type checker: expression typing rules, compile-time
/// type evaluation, pattern typing, memoization with cycle detection and
/// statement-level checks.
use carbon::lexer::Lexer;
use carbon::parser::Parser;
use carbon::resolver::resolve_program;
use carbon::typechecker::{run_type_check, TypeTables};

fn check(src: &str) -> (TypeTables, Vec<String>) {
    let tokens = Lexer::new(src, "test.carbon").tokenize().expect("lex failed");
    let ast = Parser::new(tokens).parse().expect("parse failed");
    let (resolution, errors) = resolve_program(&ast);
    assert!(errors.is_empty(), "resolve errors: {:?}", errors);
    let (tables, errors) = run_type_check(&ast, &resolution);
    (tables, errors.into_iter().map(|d| d.message).collect())
}

fn check_errors(src: &str) -> Vec<String> {
    check(src).1
}

fn assert_checks(src: &str) {
    let errors = check_errors(src);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

fn assert_error(src: &str, needle: &str) {
    let errors = check_errors(src);
    assert!(
        errors.iter().any(|e| e.contains(needle)),
        "expected an error containing {:?}, got: {:?}",
        needle,
        errors
    );
}

// ---------------------------------------------------------------------------
// Memoization and dependency cycles
// ---------------------------------------------------------------------------

#[test]
fn mutually_recursive_auto_returns_are_a_dependency_loop() {
    assert_error(
        "fn f() => g(); fn g() => f(); fn main() -> Int { return 0; }",
        "type dependency loop",
    );
}

#[test]
fn recursive_function_with_declared_return_type_is_fine() {
    assert_checks(
        "fn f(n: Int) -> Int { if (n == 0) { return 0; } return f(n - 1); }
         fn main() -> Int { return f(3); }",
    );
}

#[test]
fn auto_global_cycle_is_a_dependency_loop() {
    assert_error(
        "var x: auto = y; var y: auto = x; fn main() -> Int { return 0; }",
        "type dependency loop",
    );
}

// ---------------------------------------------------------------------------
// Type expressions
// ---------------------------------------------------------------------------

#[test]
fn non_type_struct_member_annotation_is_reported() {
    assert_error(
        "struct X { var y: 42; } fn main() -> Int { return 0; }",
        "Not a type expression (value has type Int)",
    );
}

#[test]
fn tuple_of_types_is_a_type_expression() {
    assert_checks("var t: (Int, Bool) = (1, true); fn main() -> Int { return 0; }");
}

#[test]
fn fnty_annotation_accepts_a_function_value() {
    assert_checks(
        "fn double(n: Int) -> Int { return n + n; }
         var f: fnty (Int) -> Int = double;
         fn main() -> Int { return f(21); }",
    );
}

// ---------------------------------------------------------------------------
// Operator rules
// ---------------------------------------------------------------------------

#[test]
fn not_requires_a_bool_operand() {
    assert_error(
        "fn f(a: Bool, b: Int) { not b; } fn main() -> Int { return 0; }",
        "Expected expression of type Bool, not Int",
    );
}

#[test]
fn negation_requires_an_int_operand() {
    assert_error(
        "fn main() -> Int { -true; return 0; }",
        "Expected expression of type Int, not Bool",
    );
}

#[test]
fn equality_requires_matching_sides() {
    assert_error(
        "fn main() -> Int { 1 == true; return 0; }",
        "Expected expression of type Int, not Bool",
    );
}

#[test]
fn addition_requires_ints() {
    assert_error(
        "fn main() -> Int { return 1 + true; }",
        "Expected expression of type Int, not Bool",
    );
}

#[test]
fn logical_operators_require_bools() {
    assert_error(
        "fn main() -> Int { 1 and true; return 0; }",
        "Expected expression of type Bool, not Int",
    );
}

// ---------------------------------------------------------------------------
// Tuples, members, indexing
// ---------------------------------------------------------------------------

#[test]
fn tuple_index_out_of_range_is_reported() {
    assert_error(
        "fn main() -> Int { var t: auto = (1, 2); return t[2]; }",
        "has no value at position 2",
    );
}

#[test]
fn tuple_index_must_be_constant() {
    assert_error(
        "fn f(i: Int) -> Int { var t: auto = (1, 2); return t[i]; }
         fn main() -> Int { return 0; }",
        "tuple index must be a compile-time constant",
    );
}

#[test]
fn unknown_tuple_field_is_reported() {
    assert_error(
        "fn main() -> Int { var t: auto = (.a = 1,); return t.b; }",
        "has no field 'b'",
    );
}

#[test]
fn unknown_struct_member_is_reported() {
    assert_error(
        "struct X { var a: Int; }
         fn main() -> Int { var v: X = X(.a = 1); return v.b; }",
        "struct X has no member 'b'",
    );
}

#[test]
fn unknown_choice_alternative_is_reported() {
    assert_error(
        "choice Ints { None, One(Int) }
         fn main() -> Int { var y: auto = Ints.Two; return 0; }",
        "choice Ints has no alternative 'Two'",
    );
}

#[test]
fn duplicate_tuple_label_is_reported() {
    assert_error(
        "fn main() -> Int { var t: auto = (.a = 1, .a = 2); return 0; }",
        "duplicate field label 'a'",
    );
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

#[test]
fn argument_types_must_match_parameter_types() {
    assert_error(
        "fn f(n: Int) -> Int { return n; }
         fn main() -> Int { return f(true); }",
        "argument types (Bool) do not match parameter types (Int)",
    );
}

#[test]
fn alternative_payload_must_match() {
    assert_error(
        "choice Ints { One(Int) }
         fn main() -> Int { var y: auto = Ints.One(true); return 0; }",
        "do not match payload type",
    );
}

#[test]
fn struct_literal_requires_every_member() {
    assert_error(
        "struct X { var a: Int; var b: Int; }
         fn main() -> Int { var v: X = X(.a = 3); return 0; }",
        "do not match parameter types",
    );
}

#[test]
fn struct_literal_labels_may_be_reordered() {
    assert_checks(
        "struct X { var a: Int; var b: Int; }
         fn main() -> Int { var v: X = X(.b = 4, .a = 3); return v.a; }",
    );
}

#[test]
fn calling_a_non_function_value_is_reported() {
    assert_error(
        "fn main() -> Int { var x: Int = 3; return x(1); }",
        "value of type Int is not callable.",
    );
}

#[test]
fn calling_a_non_struct_type_is_reported() {
    assert_error("fn main() -> Int { return Int(1); }", "type Int is not callable.");
}

// ---------------------------------------------------------------------------
// Patterns and initialization
// ---------------------------------------------------------------------------

#[test]
fn pattern_type_must_match_initializer_type() {
    assert_error(
        "fn main() -> Int { var x: Bool = 3; return 0; }",
        "Pattern type Bool does not match initializer type Int",
    );
}

#[test]
fn auto_without_initializer_is_reported() {
    assert_error(
        "fn f(x: auto) { } fn main() -> Int { return 0; }",
        "No initializer available to deduce type for auto",
    );
}

#[test]
fn auto_binding_takes_the_initializer_type() {
    let (tables, errors) = check("var x: auto = 3 + 4; fn main() -> Int { return x; }");
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let types: Vec<_> = tables.binding_types.values().collect();
    assert!(types.iter().any(|t| format!("{}", t) == "Int"));
}

#[test]
fn match_clause_pattern_must_match_subject_type() {
    assert_error(
        "fn main() -> Int { var x: Int = 3; match (x) { case true => return 1; } return 0; }",
        "Pattern type Bool does not match subject type Int",
    );
}

#[test]
fn alternative_patterns_agree_with_choice_subjects() {
    assert_checks(
        "choice Ints { None, One(Int) }
         fn main() -> Int {
             var y: auto = Ints.One(42);
             match (y) {
                 case Ints.One(n: auto) => return n;
                 case Ints.None => return 0;
                 default => return -1;
             }
         }",
    );
}

// ---------------------------------------------------------------------------
// Statement checks
// ---------------------------------------------------------------------------

#[test]
fn break_outside_a_loop_is_reported() {
    assert_error(
        "fn main() -> Int { break; return 0; }",
        "'break' invalid outside loop body",
    );
}

#[test]
fn continue_outside_a_loop_is_reported() {
    assert_error(
        "fn main() -> Int { continue; return 0; }",
        "'continue' invalid outside loop body",
    );
}

#[test]
fn break_inside_a_loop_is_fine() {
    assert_checks("fn main() -> Int { while (true) { break; } return 0; }");
}

#[test]
fn condition_must_be_bool() {
    assert_error(
        "fn main() -> Int { if (1) { return 1; } return 0; }",
        "Expected expression of type Bool, not Int",
    );
}

#[test]
fn assignment_requires_matching_types() {
    assert_error(
        "fn main() -> Int { var x: Int = 1; x = true; return x; }",
        "Expected expression of type Int, not Bool",
    );
}

#[test]
fn assignment_target_must_be_assignable() {
    assert_error(
        "fn main() -> Int { 1 + 2 = 3; return 0; }",
        "expression is not assignable",
    );
}

#[test]
fn return_type_must_match_declaration() {
    assert_error(
        "fn f() -> Int { return true; } fn main() -> Int { return 0; }",
        "Expected expression of type Int, not Bool",
    );
}

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

#[test]
fn static_types_are_total_and_never_error_on_success() {
    let (tables, errors) = check(
        "choice Ints { None, One(Int) }
         struct X { var a: Int; var b: Int; }
         fn add(a: Int, b: Int) -> Int { return a + b; }
         fn main() -> Int {
             var v: X = X(.a = 3, .b = 4);
             var y: auto = Ints.One(add(v.a, v.b));
             match (y) { case Ints.One(n: auto) => return n; default => return -1; }
         }",
    );
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert!(!tables.static_types.is_empty());
    for ty in tables.static_types.values() {
        assert!(!ty.is_error(), "Error type survived checking: {:?}", ty);
    }
}
