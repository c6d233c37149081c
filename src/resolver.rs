/// Name resolution pass.
///
/// Two passes over the AST. The first introduces every top-level name into
/// the global scope, so top-level declarations may reference each other in
/// any order. The second walks every declaration and resolves each use-site
/// identifier against a stack of lexical scopes, recording the result in
/// the `definition` table. Identifiers that introduce names (declared
/// names, pattern variables) are never resolved; they define.
///
/// All diagnostics are accumulated; resolution never short-circuits.
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{
    Ast, BindingId, DeclId, DeclKind, DeclaredType, ExprId, ExprKind, PatternId, PatternKind,
    ReturnForm, StmtId, StmtKind, TupleOf,
};
use crate::diagnostics::Diagnostic;
use crate::source::SourceRegion;

/// What a resolved identifier denotes.
#[derive(Debug, Clone, PartialEq)]
pub enum Def {
    Function(DeclId),
    Struct(DeclId),
    Choice(DeclId),
    Binding(BindingId),
    Alternative { choice: DeclId, index: usize },
    Member { owner: DeclId, index: usize },
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub definition: HashMap<ExprId, Def>,
    pub globals: HashSet<BindingId>,
    pub main: Option<DeclId>,
}

pub fn resolve_program(ast: &Ast) -> (Resolution, Vec<Diagnostic>) {
    let mut resolver = Resolver {
        ast,
        scopes: vec![HashMap::new()],
        resolution: Resolution::default(),
        errors: Vec::new(),
    };
    resolver.run();
    debug!(
        definitions = resolver.resolution.definition.len(),
        globals = resolver.resolution.globals.len(),
        errors = resolver.errors.len(),
        "name resolution finished"
    );
    (resolver.resolution, resolver.errors)
}

struct Resolver<'a> {
    ast: &'a Ast,
    /// Innermost scope last. Each entry remembers the defining site for the
    /// redeclaration note.
    scopes: Vec<HashMap<String, (Def, SourceRegion)>>,
    resolution: Resolution,
    errors: Vec<Diagnostic>,
}

impl<'a> Resolver<'a> {
    fn error(&mut self, msg: impl Into<String>, site: SourceRegion) {
        self.errors.push(Diagnostic::new(msg, site));
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, def: Def, site: SourceRegion) {
        let scope = self.scopes.last_mut().unwrap();
        if let Some((_, first)) = scope.get(name) {
            let first = first.clone();
            self.errors.push(
                Diagnostic::new(format!("'{}' already defined", name), site)
                    .with_note("first defined here", first),
            );
            return;
        }
        scope.insert(name.to_string(), (def, site));
    }

    fn lookup(&self, name: &str) -> Option<Def> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).map(|(def, _)| def.clone()))
    }

    fn run(&mut self) {
        self.declare_top_level();
        self.check_main();
        for decl_id in self.ast.decl_ids() {
            self.resolve_decl(decl_id);
        }
    }

    // -----------------------------------------------------------------------
    // Pass 1: introduce top-level names
    // -----------------------------------------------------------------------

    fn declare_top_level(&mut self) {
        for decl_id in self.ast.decl_ids() {
            let decl = self.ast.decl(decl_id);
            match &decl.kind {
                DeclKind::Function(f) => {
                    self.declare(&f.name.clone(), Def::Function(decl_id), f.name_site.clone());
                }
                DeclKind::Struct(s) => {
                    self.declare(&s.name.clone(), Def::Struct(decl_id), s.name_site.clone());
                }
                DeclKind::Choice(c) => {
                    self.declare(&c.name.clone(), Def::Choice(decl_id), c.name_site.clone());
                }
                DeclKind::Init(init) => {
                    let mut bound = Vec::new();
                    self.ast.pattern_bindings(init.pattern, &mut bound);
                    for binding_id in bound {
                        let binding = self.ast.binding(binding_id);
                        self.declare(
                            &binding.name.clone(),
                            Def::Binding(binding_id),
                            binding.site.clone(),
                        );
                        self.resolution.globals.insert(binding_id);
                    }
                }
            }
        }
    }

    fn check_main(&mut self) {
        let main = self.scopes[0].get("main").cloned();
        match main {
            Some((Def::Function(decl_id), site)) => {
                self.resolution.main = Some(decl_id);
                let DeclKind::Function(f) = &self.ast.decl(decl_id).kind else {
                    return;
                };
                let returns_int = matches!(
                    &f.ret,
                    ReturnForm::Expr(e) if self.ast.expr(*e).kind == ExprKind::IntType
                );
                if !f.params.is_empty() || !returns_int {
                    self.error("'main' must be a nullary function returning Int", site);
                }
            }
            Some((_, site)) => {
                self.error("'main' must be a nullary function returning Int", site);
            }
            None => {
                self.error("'main' function not found", SourceRegion::empty());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Pass 2: resolve use sites
    // -----------------------------------------------------------------------

    fn resolve_decl(&mut self, decl_id: DeclId) {
        let decl = self.ast.decl(decl_id);
        match &decl.kind {
            DeclKind::Function(f) => {
                self.push_scope();
                for field in f.params.iter() {
                    self.resolve_pattern(field.value, true);
                }
                if let ReturnForm::Expr(e) = &f.ret {
                    self.resolve_expr(*e);
                }
                if let Some(body) = f.body {
                    self.resolve_stmt(body);
                }
                self.pop_scope();
            }
            DeclKind::Struct(s) => {
                self.push_scope();
                for (index, member) in s.members.iter().enumerate() {
                    self.declare(
                        &member.name.clone(),
                        Def::Member {
                            owner: decl_id,
                            index,
                        },
                        member.site.clone(),
                    );
                }
                for member in &s.members {
                    self.resolve_expr(member.type_expr);
                }
                self.pop_scope();
            }
            DeclKind::Choice(c) => {
                self.push_scope();
                for (index, alt) in c.alternatives.iter().enumerate() {
                    self.declare(
                        &alt.name.clone(),
                        Def::Alternative {
                            choice: decl_id,
                            index,
                        },
                        alt.site.clone(),
                    );
                }
                for alt in &c.alternatives {
                    for field in alt.payload.iter() {
                        self.resolve_expr(field.value);
                    }
                }
                self.pop_scope();
            }
            DeclKind::Init(init) => {
                self.resolve_expr(init.initializer);
                // Bound names were introduced by the top-level pass; only
                // their declared-type expressions remain to resolve.
                self.resolve_pattern(init.pattern, false);
            }
        }
    }

    fn resolve_stmt(&mut self, stmt_id: StmtId) {
        let stmt = self.ast.stmt(stmt_id);
        match &stmt.kind {
            StmtKind::Expr(e) => self.resolve_expr(*e),
            StmtKind::Assign { target, source } => {
                self.resolve_expr(*source);
                self.resolve_expr(*target);
            }
            StmtKind::Init(init) => {
                self.resolve_expr(init.initializer);
                self.resolve_pattern(init.pattern, true);
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.resolve_expr(*cond);
                self.resolve_stmt(*then_body);
                if let Some(else_body) = else_body {
                    self.resolve_stmt(*else_body);
                }
            }
            StmtKind::While { cond, body } => {
                self.resolve_expr(*cond);
                self.resolve_stmt(*body);
            }
            StmtKind::Match { subject, clauses } => {
                self.resolve_expr(*subject);
                for clause in clauses {
                    self.push_scope();
                    if let Some(pattern) = clause.pattern {
                        self.resolve_pattern(pattern, true);
                    }
                    self.resolve_stmt(clause.body);
                    self.pop_scope();
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Return(e) => self.resolve_expr(*e),
            StmtKind::Block(stmts) => {
                self.push_scope();
                for s in stmts {
                    self.resolve_stmt(*s);
                }
                self.pop_scope();
            }
        }
    }

    /// Resolve the expressions inside a pattern and, when `introduce` is
    /// set, bring its variables into the current scope. Top-level
    /// initializations pass `false`: their variables were introduced by the
    /// first pass.
    fn resolve_pattern(&mut self, pattern_id: PatternId, introduce: bool) {
        let pattern = self.ast.pattern(pattern_id);
        match &pattern.kind {
            PatternKind::Atom(e) => self.resolve_expr(*e),
            PatternKind::Variable(binding_id) => {
                let binding = self.ast.binding(*binding_id);
                if let DeclaredType::Expr(t) = &binding.declared {
                    self.resolve_expr(*t);
                }
                if introduce {
                    self.declare(
                        &binding.name.clone(),
                        Def::Binding(*binding_id),
                        binding.site.clone(),
                    );
                }
            }
            PatternKind::Tuple(fields) => {
                for field in fields.iter() {
                    self.resolve_pattern(field.value, introduce);
                }
            }
            PatternKind::Call { callee, args } => {
                self.resolve_expr(*callee);
                for field in args.iter() {
                    self.resolve_pattern(field.value, introduce);
                }
            }
            PatternKind::FunctionType { params, ret } => {
                self.resolve_fnty(params, *ret, introduce);
            }
        }
    }

    fn resolve_fnty(&mut self, params: &TupleOf<PatternId>, ret: PatternId, introduce: bool) {
        for field in params.iter() {
            self.resolve_pattern(field.value, introduce);
        }
        self.resolve_pattern(ret, introduce);
    }

    fn resolve_expr(&mut self, expr_id: ExprId) {
        let expr = self.ast.expr(expr_id);
        match &expr.kind {
            ExprKind::Name(name) => match self.lookup(name) {
                Some(def) => {
                    self.resolution.definition.insert(expr_id, def);
                }
                None => {
                    let name = name.clone();
                    let site = expr.site.clone();
                    self.error(format!("Un-declared name '{}'", name), site);
                }
            },
            ExprKind::IntLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::IntType
            | ExprKind::BoolType
            | ExprKind::TypeType => {}
            ExprKind::TupleLit(fields) => {
                for field in fields.iter() {
                    self.resolve_expr(field.value);
                }
            }
            ExprKind::Member { base, .. } => self.resolve_expr(*base),
            ExprKind::Index { base, offset } => {
                self.resolve_expr(*base);
                self.resolve_expr(*offset);
            }
            ExprKind::Unary(_, operand) => self.resolve_expr(*operand),
            ExprKind::Binary(_, lhs, rhs) => {
                self.resolve_expr(*lhs);
                self.resolve_expr(*rhs);
            }
            ExprKind::Call { callee, args } => {
                self.resolve_expr(*callee);
                for field in args.iter() {
                    self.resolve_expr(field.value);
                }
            }
            ExprKind::FunctionType { params, ret } => {
                self.push_scope();
                self.resolve_fnty(params, *ret, true);
                self.pop_scope();
            }
        }
    }
}
