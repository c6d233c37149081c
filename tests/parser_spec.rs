/// Spec tests for the parser: declaration shapes, tuple syntax, statement
/// bodies and pattern forms.
use carbon::ast::{
    Ast, DeclKind, ExprKind, FieldId, PatternKind, ReturnForm, StmtKind, BinaryOp,
};
use carbon::lexer::Lexer;
use carbon::parser::Parser;

fn parse(src: &str) -> Ast {
    let tokens = Lexer::new(src, "test.carbon").tokenize().expect("lex failed");
    Parser::new(tokens).parse().expect("parse failed")
}

fn parse_err(src: &str) -> String {
    let tokens = Lexer::new(src, "test.carbon").tokenize().expect("lex failed");
    Parser::new(tokens).parse().expect_err("expected parse error").to_string()
}

fn first_decl(ast: &Ast) -> &DeclKind {
    let id = ast.decl_ids().next().expect("no declarations");
    &ast.decl(id).kind
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[test]
fn arrow_body_lowers_to_return_with_auto_return_type() {
    let ast = parse("fn f() => 3;");
    let DeclKind::Function(f) = first_decl(&ast) else {
        panic!("expected a function");
    };
    assert!(matches!(f.ret, ReturnForm::Auto(_)));
    let body = f.body.expect("expected a body");
    assert!(matches!(ast.stmt(body).kind, StmtKind::Return(_)));
}

#[test]
fn explicit_return_type_survives_arrow_body() {
    let ast = parse("fn f() -> Int => 3;");
    let DeclKind::Function(f) = first_decl(&ast) else {
        panic!("expected a function");
    };
    assert!(matches!(f.ret, ReturnForm::Expr(_)));
}

#[test]
fn block_body_without_arrow_omits_return_type() {
    let ast = parse("fn f() { }");
    let DeclKind::Function(f) = first_decl(&ast) else {
        panic!("expected a function");
    };
    assert!(matches!(f.ret, ReturnForm::Omitted));
}

#[test]
fn struct_members_are_ordered() {
    let ast = parse("struct X { var a: Int; var b: Bool; }");
    let DeclKind::Struct(s) = first_decl(&ast) else {
        panic!("expected a struct");
    };
    assert_eq!(s.name, "X");
    let names: Vec<&str> = s.members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
}

#[test]
fn choice_alternatives_carry_payload_tuples() {
    let ast = parse("choice Ints { None, One(Int) }");
    let DeclKind::Choice(c) = first_decl(&ast) else {
        panic!("expected a choice");
    };
    assert_eq!(c.alternatives.len(), 2);
    assert!(c.alternatives[0].payload.is_empty());
    assert_eq!(c.alternatives[1].payload.len(), 1);
}

// ---------------------------------------------------------------------------
// Tuple syntax
// ---------------------------------------------------------------------------

fn initializer_kind(ast: &Ast) -> &ExprKind {
    let DeclKind::Init(init) = first_decl(ast) else {
        panic!("expected an initialization");
    };
    &ast.expr(init.initializer).kind
}

#[test]
fn parenthesised_expression_is_not_a_tuple() {
    let ast = parse("var x: auto = (3);");
    assert!(matches!(initializer_kind(&ast), ExprKind::IntLit(3)));
}

#[test]
fn trailing_comma_makes_a_one_tuple() {
    let ast = parse("var x: auto = (3,);");
    let ExprKind::TupleLit(fields) = initializer_kind(&ast) else {
        panic!("expected a tuple literal");
    };
    assert_eq!(fields.len(), 1);
}

#[test]
fn empty_parens_are_the_empty_tuple() {
    let ast = parse("var x: auto = ();");
    let ExprKind::TupleLit(fields) = initializer_kind(&ast) else {
        panic!("expected a tuple literal");
    };
    assert!(fields.is_empty());
}

#[test]
fn labeled_tuple_fields() {
    let ast = parse("var x: auto = (.a = 1, .b = 2);");
    let ExprKind::TupleLit(fields) = initializer_kind(&ast) else {
        panic!("expected a tuple literal");
    };
    assert_eq!(fields.fields[0].id, FieldId::Label("a".to_string()));
    assert_eq!(fields.fields[1].id, FieldId::Label("b".to_string()));
}

#[test]
fn mixed_tuple_positions_precede_labels() {
    let ast = parse("var x: auto = (7, .a = 1);");
    let ExprKind::TupleLit(fields) = initializer_kind(&ast) else {
        panic!("expected a tuple literal");
    };
    assert_eq!(fields.fields[0].id, FieldId::Position(0));
    assert_eq!(fields.fields[1].id, FieldId::Label("a".to_string()));
}

#[test]
fn positional_field_after_label_is_rejected() {
    let err = parse_err("var x: auto = (.a = 1, 7);");
    assert!(err.contains("positional tuple fields must precede labeled fields"));
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[test]
fn braceless_if_body_gets_its_own_block() {
    let ast = parse("fn f() { if (true) return 1; }");
    let DeclKind::Function(f) = first_decl(&ast) else {
        panic!("expected a function");
    };
    let StmtKind::Block(stmts) = &ast.stmt(f.body.unwrap()).kind else {
        panic!("expected a block body");
    };
    let StmtKind::If { then_body, .. } = &ast.stmt(stmts[0]).kind else {
        panic!("expected an if");
    };
    assert!(matches!(&ast.stmt(*then_body).kind, StmtKind::Block(b) if b.len() == 1));
}

#[test]
fn match_parses_case_and_default_clauses() {
    let ast = parse(
        "fn f() { match (x) { case 3 => return 1; default => return 0; } }",
    );
    let DeclKind::Function(f) = first_decl(&ast) else {
        panic!("expected a function");
    };
    let StmtKind::Block(stmts) = &ast.stmt(f.body.unwrap()).kind else {
        panic!("expected a block body");
    };
    let StmtKind::Match { clauses, .. } = &ast.stmt(stmts[0]).kind else {
        panic!("expected a match");
    };
    assert_eq!(clauses.len(), 2);
    assert!(clauses[0].pattern.is_some());
    assert!(clauses[1].pattern.is_none());
}

#[test]
fn bare_return_yields_the_empty_tuple() {
    let ast = parse("fn f() { return; }");
    let DeclKind::Function(f) = first_decl(&ast) else {
        panic!("expected a function");
    };
    let StmtKind::Block(stmts) = &ast.stmt(f.body.unwrap()).kind else {
        panic!("expected a block body");
    };
    let StmtKind::Return(e) = &ast.stmt(stmts[0]).kind else {
        panic!("expected a return");
    };
    assert!(matches!(&ast.expr(*e).kind, ExprKind::TupleLit(t) if t.is_empty()));
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

#[test]
fn tuple_pattern_of_bindings() {
    let ast = parse("var (a: Int, b: auto) = (1, 2);");
    let DeclKind::Init(init) = first_decl(&ast) else {
        panic!("expected an initialization");
    };
    let PatternKind::Tuple(fields) = &ast.pattern(init.pattern).kind else {
        panic!("expected a tuple pattern");
    };
    assert_eq!(fields.len(), 2);
    for field in fields.iter() {
        assert!(matches!(
            ast.pattern(field.value).kind,
            PatternKind::Variable(_)
        ));
    }
}

#[test]
fn constructor_pattern_in_match_clause() {
    let ast = parse("fn f() { match (y) { case Ints.One(n: auto) => return n; } }");
    let DeclKind::Function(f) = first_decl(&ast) else {
        panic!("expected a function");
    };
    let StmtKind::Block(stmts) = &ast.stmt(f.body.unwrap()).kind else {
        panic!("expected a block body");
    };
    let StmtKind::Match { clauses, .. } = &ast.stmt(stmts[0]).kind else {
        panic!("expected a match");
    };
    let pattern = clauses[0].pattern.expect("expected a pattern");
    let PatternKind::Call { callee, args } = &ast.pattern(pattern).kind else {
        panic!("expected a constructor pattern");
    };
    assert!(matches!(&ast.expr(*callee).kind, ExprKind::Member { .. }));
    assert_eq!(args.len(), 1);
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[test]
fn equality_binds_tighter_than_and() {
    let ast = parse("var x: auto = 1 + 2 == 3 and true;");
    let ExprKind::Binary(BinaryOp::And, lhs, _) = initializer_kind(&ast) else {
        panic!("expected 'and' at the root");
    };
    assert!(matches!(
        ast.expr(*lhs).kind,
        ExprKind::Binary(BinaryOp::Eq, _, _)
    ));
}

#[test]
fn postfix_chains_nest_left_to_right() {
    let ast = parse("var x: auto = t[0].a;");
    let ExprKind::Member { base, member } = initializer_kind(&ast) else {
        panic!("expected member access at the root");
    };
    assert_eq!(member, "a");
    assert!(matches!(ast.expr(*base).kind, ExprKind::Index { .. }));
}

#[test]
fn fnty_expression_parses() {
    let ast = parse("var t: auto = fnty (Int) -> Bool;");
    assert!(matches!(
        initializer_kind(&ast),
        ExprKind::FunctionType { .. }
    ));
}
