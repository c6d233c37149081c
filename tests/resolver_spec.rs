/// Spec tests for name resolution: top-level forward references, lexical
/// shadowing, duplicate declarations and the `main` contract.
use carbon::lexer::Lexer;
use carbon::parser::Parser;
use carbon::resolver::resolve_program;

fn resolve_errors(src: &str) -> Vec<String> {
    let tokens = Lexer::new(src, "test.carbon").tokenize().expect("lex failed");
    let ast = Parser::new(tokens).parse().expect("parse failed");
    let (_, errors) = resolve_program(&ast);
    errors.into_iter().map(|d| d.message).collect()
}

fn assert_resolves(src: &str) {
    let errors = resolve_errors(src);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

fn assert_error(src: &str, needle: &str) {
    let errors = resolve_errors(src);
    assert!(
        errors.iter().any(|e| e.contains(needle)),
        "expected an error containing {:?}, got: {:?}",
        needle,
        errors
    );
}

#[test]
fn top_level_names_resolve_forward() {
    assert_resolves("fn main() -> Int { return helper(); } fn helper() -> Int { return 0; }");
}

#[test]
fn globals_resolve_regardless_of_declaration_order() {
    assert_resolves("fn main() -> Int { return g; } var g: Int = 1;");
}

#[test]
fn undeclared_name_is_reported() {
    assert_error("fn main() -> Int { return nope; }", "Un-declared name 'nope'");
}

#[test]
fn duplicate_top_level_declaration_is_reported() {
    assert_error(
        "fn f() -> Int { return 0; } fn f() -> Int { return 1; } fn main() -> Int { return 0; }",
        "'f' already defined",
    );
}

#[test]
fn duplicate_struct_member_is_reported() {
    assert_error(
        "struct X { var a: Int; var a: Int; } fn main() -> Int { return 0; }",
        "'a' already defined",
    );
}

#[test]
fn duplicate_choice_alternative_is_reported() {
    assert_error(
        "choice C { A, A } fn main() -> Int { return 0; }",
        "'A' already defined",
    );
}

#[test]
fn same_scope_local_redeclaration_is_reported() {
    assert_error(
        "fn main() -> Int { var x: Int = 1; var x: Int = 2; return x; }",
        "'x' already defined",
    );
}

#[test]
fn inner_scopes_may_shadow() {
    assert_resolves(
        "fn main() -> Int { var x: Int = 1; { var x: Int = 2; x; } return x; }",
    );
}

#[test]
fn struct_may_reference_its_own_name() {
    assert_resolves("struct Node { var next: Node; } fn main() -> Int { return 0; }");
}

#[test]
fn match_clause_bindings_are_clause_local() {
    assert_error(
        "choice C { A(Int) }
         fn main() -> Int {
             var y: auto = C.A(1);
             match (y) { case C.A(n: auto) => { n; } }
             return n;
         }",
        "Un-declared name 'n'",
    );
}

#[test]
fn missing_main_is_reported() {
    assert_error("fn helper() -> Int { return 0; }", "'main' function not found");
}

#[test]
fn main_with_parameters_is_rejected() {
    assert_error(
        "fn main(x: Int) -> Int { return x; }",
        "'main' must be a nullary function returning Int",
    );
}

#[test]
fn main_without_int_return_is_rejected() {
    assert_error(
        "fn main() -> Bool { return true; }",
        "'main' must be a nullary function returning Int",
    );
}

#[test]
fn parameters_are_visible_in_the_body() {
    assert_resolves(
        "fn add(a: Int, b: Int) -> Int { return a + b; } fn main() -> Int { return add(1, 2); }",
    );
}
