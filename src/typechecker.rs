/// Static type checker.
///
/// Demand-driven: `type_of_expr` computes and memoizes the static type of
/// every expression into the `static_types` table. Per-declaration results
/// (function signatures, top-level initializations) are memoized with an
/// explicit in-progress marker; observing the marker recursively means the
/// program's types depend on themselves and is reported as a dependency
/// loop.
///
/// Compile-time type expressions are evaluated by a small pure evaluator
/// (`evaluate_type_expr`) covering literal types, names of struct/choice
/// declarations, tuples of types and `fnty` types. Computed types that
/// would require running arbitrary code at compile time are rejected.
///
/// The checker is lenient after a diagnostic: it records `Type::Error` and
/// keeps going, and never reports follow-on errors about `Type::Error`
/// operands.
use std::collections::HashMap;

use tracing::debug;

use crate::ast::{
    Ast, BindingId, DeclId, DeclKind, DeclaredType, ExprId, ExprKind, FieldId, Initialization,
    PatternId, PatternKind, ReturnForm, StmtId, StmtKind, TupleOf, UnaryOp,
};
use crate::diagnostics::Diagnostic;
use crate::resolver::{Def, Resolution};
use crate::source::SourceRegion;
use crate::types::{tuple_types_equal, NominalId, Type};

/// Everything the checker learns about a program, consumed by the
/// interpreter through `ExecutableProgram`.
#[derive(Debug, Default)]
pub struct TypeTables {
    pub static_types: HashMap<ExprId, Type>,
    pub binding_types: HashMap<BindingId, Type>,
    pub struct_members: HashMap<DeclId, Vec<(String, Type)>>,
    pub alternative_payloads: HashMap<(DeclId, usize), TupleOf<Type>>,
    pub enclosing_initialization: HashMap<BindingId, DeclId>,
}

pub fn run_type_check(ast: &Ast, resolution: &Resolution) -> (TypeTables, Vec<Diagnostic>) {
    let mut checker = TypeChecker {
        ast,
        resolution,
        tables: TypeTables::default(),
        decl_memo: HashMap::new(),
        errors: Vec::new(),
        return_type: None,
        loop_depth: 0,
    };
    checker.check();
    debug!(
        expressions = checker.tables.static_types.len(),
        bindings = checker.tables.binding_types.len(),
        errors = checker.errors.len(),
        "type check finished"
    );
    (checker.tables, checker.errors)
}

#[derive(Debug, Clone)]
enum Memo {
    InProgress,
    Done(Type),
}

struct TypeChecker<'a> {
    ast: &'a Ast,
    resolution: &'a Resolution,
    tables: TypeTables,
    /// Function signature and top-level initialization memo.
    decl_memo: HashMap<DeclId, Memo>,
    errors: Vec<Diagnostic>,
    /// Return type of the function body being checked; `None` at top level.
    return_type: Option<Type>,
    loop_depth: usize,
}

impl<'a> TypeChecker<'a> {
    fn error(&mut self, msg: impl Into<String>, site: SourceRegion) {
        self.errors.push(Diagnostic::new(msg, site));
    }

    fn nominal(&self, decl_id: DeclId) -> NominalId {
        let name = self.ast.decl(decl_id).name().unwrap_or("");
        NominalId::new(decl_id, name)
    }

    fn expr_site(&self, e: ExprId) -> SourceRegion {
        self.ast.expr(e).site.clone()
    }

    // -----------------------------------------------------------------------
    // Driver
    // -----------------------------------------------------------------------

    fn check(&mut self) {
        // 1. Parentage: which Initialization binds each top-level variable.
        for decl_id in self.ast.decl_ids() {
            if let DeclKind::Init(init) = &self.ast.decl(decl_id).kind {
                let mut bound = Vec::new();
                self.ast.pattern_bindings(init.pattern, &mut bound);
                for b in bound {
                    self.tables.enclosing_initialization.insert(b, decl_id);
                }
            }
        }

        // 2. Nominal type bodies.
        for decl_id in self.ast.decl_ids() {
            match &self.ast.decl(decl_id).kind {
                DeclKind::Struct(s) => {
                    let mut members = Vec::new();
                    for member in &s.members {
                        let ty = self.evaluate_type_expr(member.type_expr);
                        members.push((member.name.clone(), ty));
                    }
                    self.tables.struct_members.insert(decl_id, members);
                }
                DeclKind::Choice(c) => {
                    for (index, alt) in c.alternatives.iter().enumerate() {
                        let payload = alt
                            .payload
                            .map(|type_expr| self.evaluate_type_expr(*type_expr));
                        self.tables
                            .alternative_payloads
                            .insert((decl_id, index), payload);
                    }
                }
                _ => {}
            }
        }

        // 3. Function signatures.
        for decl_id in self.ast.decl_ids() {
            if matches!(self.ast.decl(decl_id).kind, DeclKind::Function(_)) {
                self.function_type(decl_id);
            }
        }

        // 4. Top-level initializations.
        for decl_id in self.ast.decl_ids() {
            if matches!(self.ast.decl(decl_id).kind, DeclKind::Init(_)) {
                self.check_init_decl(decl_id);
            }
        }

        // 5. Function bodies.
        for decl_id in self.ast.decl_ids() {
            if matches!(self.ast.decl(decl_id).kind, DeclKind::Function(_)) {
                self.check_function_body(decl_id);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Memoized per-declaration types
    // -----------------------------------------------------------------------

    /// Signature type of a function declaration, memoized with cycle
    /// detection (e.g. two `auto`-returning functions calling each other).
    fn function_type(&mut self, decl_id: DeclId) -> Type {
        match self.decl_memo.get(&decl_id) {
            Some(Memo::Done(t)) => return t.clone(),
            Some(Memo::InProgress) => {
                let DeclKind::Function(f) = &self.ast.decl(decl_id).kind else {
                    return Type::Error;
                };
                let site = f.name_site.clone();
                self.error("type dependency loop", site);
                return Type::Error;
            }
            None => {}
        }
        self.decl_memo.insert(decl_id, Memo::InProgress);

        let DeclKind::Function(f) = &self.ast.decl(decl_id).kind else {
            return Type::Error;
        };
        let params_fields = f.params.clone();
        let ret_spec = f.ret.clone();
        let body = f.body;
        let name_site = f.name_site.clone();

        let params = params_fields.map(|p| self.pattern_type(*p, None));
        let ret = match ret_spec {
            ReturnForm::Expr(t) => self.evaluate_type_expr(t),
            ReturnForm::Omitted => Type::empty_tuple(),
            ReturnForm::Auto(_) => match body.and_then(|b| self.first_return(b)) {
                Some(value) => self.type_of_expr(value),
                None => {
                    if body.is_none() {
                        self.error(
                            "cannot deduce 'auto' return type without a function body",
                            name_site,
                        );
                        Type::Error
                    } else {
                        Type::empty_tuple()
                    }
                }
            },
        };

        let ty = Type::Function {
            params,
            ret: Box::new(ret),
        };
        self.decl_memo.insert(decl_id, Memo::Done(ty.clone()));
        ty
    }

    fn first_return(&self, stmt_id: StmtId) -> Option<ExprId> {
        match &self.ast.stmt(stmt_id).kind {
            StmtKind::Return(e) => Some(*e),
            StmtKind::Block(stmts) => stmts.iter().find_map(|s| self.first_return(*s)),
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => self
                .first_return(*then_body)
                .or_else(|| else_body.and_then(|e| self.first_return(e))),
            StmtKind::While { body, .. } => self.first_return(*body),
            StmtKind::Match { clauses, .. } => {
                clauses.iter().find_map(|c| self.first_return(c.body))
            }
            _ => None,
        }
    }

    /// Type-check a top-level initialization on demand, memoized so a
    /// global can be referenced before its declaration is reached and so
    /// `auto` chains between globals report a dependency loop.
    fn check_init_decl(&mut self, decl_id: DeclId) {
        match self.decl_memo.get(&decl_id) {
            Some(Memo::Done(_)) => return,
            Some(Memo::InProgress) => {
                let site = self.ast.decl(decl_id).site.clone();
                self.error("type dependency loop", site);
                return;
            }
            None => {}
        }
        self.decl_memo.insert(decl_id, Memo::InProgress);
        let DeclKind::Init(init) = &self.ast.decl(decl_id).kind else {
            return;
        };
        let init = init.clone();
        let site = self.ast.decl(decl_id).site.clone();
        self.check_initialization(&init, site);
        self.decl_memo.insert(decl_id, Memo::Done(Type::empty_tuple()));
    }

    /// Type named by a resolved definition.
    fn type_of_name(&mut self, def: &Def) -> Type {
        match def {
            Def::Function(d) => self.function_type(*d),
            Def::Struct(_) | Def::Choice(_) => Type::TypeT,
            Def::Binding(b) => self.binding_type(*b),
            Def::Alternative { choice, index } => self.alternative_type(*choice, *index),
            Def::Member { owner, index } => self
                .tables
                .struct_members
                .get(owner)
                .and_then(|members| members.get(*index))
                .map(|(_, t)| t.clone())
                .unwrap_or(Type::Error),
        }
    }

    fn binding_type(&mut self, b: BindingId) -> Type {
        if let Some(t) = self.tables.binding_types.get(&b) {
            return t.clone();
        }
        // A declared type stands on its own; only `auto` bindings need
        // their enclosing initialization checked first.
        if let DeclaredType::Expr(t) = &self.ast.binding(b).declared {
            let t = *t;
            let ty = self.evaluate_type_expr(t);
            self.tables.binding_types.insert(b, ty.clone());
            return ty;
        }
        if let Some(init_decl) = self.tables.enclosing_initialization.get(&b).copied() {
            self.check_init_decl(init_decl);
            if let Some(t) = self.tables.binding_types.get(&b) {
                return t.clone();
            }
        }
        Type::Error
    }

    fn alternative_type(&mut self, choice_decl: DeclId, index: usize) -> Type {
        let DeclKind::Choice(c) = &self.ast.decl(choice_decl).kind else {
            return Type::Error;
        };
        let name = c.alternatives[index].name.clone();
        let payload = self
            .tables
            .alternative_payloads
            .get(&(choice_decl, index))
            .cloned()
            .unwrap_or_default();
        Type::Alternative {
            choice: self.nominal(choice_decl),
            index,
            name: name.as_str().into(),
            payload,
        }
    }

    /// Labeled tuple of a struct's member types, the parameters of its
    /// initializer literal.
    fn initializer_parameters(&self, decl_id: DeclId) -> TupleOf<Type> {
        let mut params = TupleOf::new();
        if let Some(members) = self.tables.struct_members.get(&decl_id) {
            for (name, ty) in members {
                params.push(FieldId::Label(name.clone()), ty.clone());
            }
        }
        params
    }

    fn find_alternative(&self, choice_decl: DeclId, name: &str) -> Option<usize> {
        match &self.ast.decl(choice_decl).kind {
            DeclKind::Choice(c) => c.alternatives.iter().position(|a| a.name == name),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Expression typing
    // -----------------------------------------------------------------------

    fn type_of_expr(&mut self, e: ExprId) -> Type {
        if let Some(t) = self.tables.static_types.get(&e) {
            return t.clone();
        }
        let t = self.compute_expr_type(e);
        self.tables.static_types.insert(e, t.clone());
        t
    }

    /// Report `Expected expression of type {want}, not {got}` unless either
    /// side already failed.
    fn expect_type(&mut self, want: &Type, got: &Type, site: SourceRegion) {
        if got != want && !got.is_error() && !want.is_error() {
            self.error(
                format!("Expected expression of type {}, not {}", want, got),
                site,
            );
        }
    }

    fn compute_expr_type(&mut self, e: ExprId) -> Type {
        let kind = self.ast.expr(e).kind.clone();
        match kind {
            ExprKind::Name(_) => match self.resolution.definition.get(&e).cloned() {
                Some(def) => self.type_of_name(&def),
                None => Type::Error,
            },
            ExprKind::IntLit(_) => Type::Int,
            ExprKind::BoolLit(_) => Type::Bool,
            ExprKind::IntType | ExprKind::BoolType | ExprKind::TypeType => Type::TypeT,
            ExprKind::TupleLit(fields) => {
                if let Some(label) = fields.duplicate_label() {
                    let label = label.to_string();
                    let site = self.expr_site(e);
                    self.error(format!("duplicate field label '{}' in tuple", label), site);
                }
                Type::Tuple(fields.map(|f| self.type_of_expr(*f)))
            }
            ExprKind::Unary(UnaryOp::Neg, operand) => {
                let t = self.type_of_expr(operand);
                self.expect_type(&Type::Int, &t, self.expr_site(operand));
                Type::Int
            }
            ExprKind::Unary(UnaryOp::Not, operand) => {
                let t = self.type_of_expr(operand);
                self.expect_type(&Type::Bool, &t, self.expr_site(operand));
                Type::Bool
            }
            ExprKind::Binary(op, lhs, rhs) => {
                use crate::ast::BinaryOp::*;
                let lt = self.type_of_expr(lhs);
                let rt = self.type_of_expr(rhs);
                match op {
                    Add | Sub => {
                        self.expect_type(&Type::Int, &lt, self.expr_site(lhs));
                        self.expect_type(&Type::Int, &rt, self.expr_site(rhs));
                        Type::Int
                    }
                    And | Or => {
                        self.expect_type(&Type::Bool, &lt, self.expr_site(lhs));
                        self.expect_type(&Type::Bool, &rt, self.expr_site(rhs));
                        Type::Bool
                    }
                    Eq => {
                        self.expect_type(&lt, &rt, self.expr_site(rhs));
                        Type::Bool
                    }
                }
            }
            ExprKind::Index { base, offset } => self.index_type(e, base, offset),
            ExprKind::Member { base, member } => self.member_type(base, &member, false),
            ExprKind::Call { callee, args } => self.call_type(e, callee, &args),
            ExprKind::FunctionType { params, ret } => {
                for field in params.iter() {
                    self.metatype_pattern(field.value);
                }
                self.metatype_pattern(ret);
                Type::TypeT
            }
        }
    }

    fn index_type(&mut self, e: ExprId, base: ExprId, offset: ExprId) -> Type {
        let bt = self.type_of_expr(base);
        let ot = self.type_of_expr(offset);
        self.expect_type(&Type::Int, &ot, self.expr_site(offset));
        let Type::Tuple(fields) = &bt else {
            if !bt.is_error() {
                let site = self.expr_site(base);
                self.error(
                    format!("Expected expression of tuple type, not {}", bt),
                    site,
                );
            }
            return Type::Error;
        };
        let Some(n) = self.eval_const_int(offset) else {
            let site = self.expr_site(offset);
            self.error("tuple index must be a compile-time constant", site);
            return Type::Error;
        };
        let id = FieldId::Position(n.max(0) as usize);
        match fields.element(&id) {
            Some(t) if n >= 0 => t.clone(),
            _ => {
                let site = self.expr_site(e);
                self.error(
                    format!("Tuple type {} has no value at position {}", bt, n),
                    site,
                );
                Type::Error
            }
        }
    }

    /// Compile-time integer evaluation for tuple index offsets.
    fn eval_const_int(&self, e: ExprId) -> Option<i64> {
        match &self.ast.expr(e).kind {
            ExprKind::IntLit(n) => Some(*n),
            ExprKind::Unary(UnaryOp::Neg, operand) => {
                self.eval_const_int(*operand).map(|n| -n)
            }
            ExprKind::Binary(crate::ast::BinaryOp::Add, lhs, rhs) => {
                Some(self.eval_const_int(*lhs)? + self.eval_const_int(*rhs)?)
            }
            ExprKind::Binary(crate::ast::BinaryOp::Sub, lhs, rhs) => {
                Some(self.eval_const_int(*lhs)? - self.eval_const_int(*rhs)?)
            }
            _ => None,
        }
    }

    /// `as_callee` distinguishes `Ints.One(…)` from `Ints.One` used as a
    /// value: in callee position an alternative always types as the bare
    /// `Alternative` constructor; as a value a payload-free alternative is
    /// already a value of the choice type.
    fn member_type(&mut self, base: ExprId, member: &str, as_callee: bool) -> Type {
        let bt = self.type_of_expr(base);
        match &bt {
            Type::Tuple(fields) => match fields.element(&FieldId::Label(member.to_string())) {
                Some(t) => t.clone(),
                None => {
                    let site = self.expr_site(base);
                    self.error(format!("tuple type {} has no field '{}'", bt, member), site);
                    Type::Error
                }
            },
            Type::Struct(id) => {
                let members = self.tables.struct_members.get(&id.decl);
                match members.and_then(|m| m.iter().find(|(n, _)| n == member)) {
                    Some((_, t)) => t.clone(),
                    None => {
                        let name = id.name.clone();
                        let site = self.expr_site(base);
                        self.error(
                            format!("struct {} has no member '{}'", name, member),
                            site,
                        );
                        Type::Error
                    }
                }
            }
            Type::TypeT => {
                let ct = self.evaluate_type_expr(base);
                match ct {
                    Type::Choice(id) => match self.find_alternative(id.decl, member) {
                        Some(index) => {
                            let alt = self.alternative_type(id.decl, index);
                            let payload_empty = matches!(
                                &alt,
                                Type::Alternative { payload, .. } if payload.is_empty()
                            );
                            if payload_empty && !as_callee {
                                Type::Choice(id)
                            } else {
                                alt
                            }
                        }
                        None => {
                            let name = id.name.clone();
                            let site = self.expr_site(base);
                            self.error(
                                format!("choice {} has no alternative '{}'", name, member),
                                site,
                            );
                            Type::Error
                        }
                    },
                    Type::Error => Type::Error,
                    other => {
                        let site = self.expr_site(base);
                        self.error(
                            format!("expression of type {} does not have named members", other),
                            site,
                        );
                        Type::Error
                    }
                }
            }
            Type::Error => Type::Error,
            other => {
                let other = other.clone();
                let site = self.expr_site(base);
                self.error(
                    format!("expression of type {} does not have named members", other),
                    site,
                );
                Type::Error
            }
        }
    }

    /// Type of an expression in callee position, recorded in the static
    /// type table for the interpreter.
    fn type_of_callee(&mut self, e: ExprId) -> Type {
        if let Some(t) = self.tables.static_types.get(&e) {
            return t.clone();
        }
        let kind = self.ast.expr(e).kind.clone();
        let t = match kind {
            ExprKind::Member { base, member } => self.member_type(base, &member, true),
            _ => self.compute_expr_type(e),
        };
        self.tables.static_types.insert(e, t.clone());
        t
    }

    fn call_type(&mut self, e: ExprId, callee: ExprId, args: &TupleOf<ExprId>) -> Type {
        if let Some(label) = args.duplicate_label() {
            let label = label.to_string();
            let site = self.expr_site(e);
            self.error(format!("duplicate field label '{}' in tuple", label), site);
        }
        let arg_types = args.map(|a| self.type_of_expr(*a));
        let ct = self.type_of_callee(callee);
        match ct {
            Type::Function { params, ret } => {
                if !tuple_types_equal(&arg_types, &params) {
                    let site = self.expr_site(e);
                    self.error(
                        format!(
                            "argument types {} do not match parameter types {}",
                            Type::Tuple(arg_types),
                            Type::Tuple(params)
                        ),
                        site,
                    );
                }
                *ret
            }
            Type::Alternative {
                choice, payload, ..
            } => {
                if !tuple_types_equal(&arg_types, &payload) {
                    let site = self.expr_site(e);
                    self.error(
                        format!(
                            "argument types {} do not match payload type {}",
                            Type::Tuple(arg_types),
                            Type::Tuple(payload)
                        ),
                        site,
                    );
                }
                Type::Choice(choice)
            }
            Type::TypeT => {
                let v = self.evaluate_type_expr(callee);
                match v {
                    Type::Struct(id) => {
                        let params = self.initializer_parameters(id.decl);
                        if !tuple_types_equal(&arg_types, &params) {
                            let site = self.expr_site(e);
                            self.error(
                                format!(
                                    "argument types {} do not match parameter types {}",
                                    Type::Tuple(arg_types),
                                    Type::Tuple(params)
                                ),
                                site,
                            );
                        }
                        Type::Struct(id)
                    }
                    Type::Error => Type::Error,
                    other => {
                        let site = self.expr_site(callee);
                        self.error(format!("type {} is not callable.", other), site);
                        Type::Error
                    }
                }
            }
            Type::Error => Type::Error,
            other => {
                let site = self.expr_site(callee);
                self.error(format!("value of type {} is not callable.", other), site);
                Type::Error
            }
        }
    }

    // -----------------------------------------------------------------------
    // Compile-time type expression evaluation
    // -----------------------------------------------------------------------

    /// Evaluate a compile-time type expression to the type it denotes.
    fn evaluate_type_expr(&mut self, e: ExprId) -> Type {
        let kind = self.ast.expr(e).kind.clone();
        let t = self.type_of_expr(e);
        if t.is_error() {
            return Type::Error;
        }

        // A tuple of type expressions is itself usable as a type.
        if let ExprKind::TupleLit(fields) = &kind {
            return Type::Tuple(fields.map(|f| self.evaluate_type_expr(*f)));
        }

        if t != Type::TypeT {
            let site = self.expr_site(e);
            self.error(format!("Not a type expression (value has type {})", t), site);
            return Type::Error;
        }

        match kind {
            ExprKind::IntType => Type::Int,
            ExprKind::BoolType => Type::Bool,
            ExprKind::TypeType => Type::TypeT,
            ExprKind::Name(_) => match self.resolution.definition.get(&e) {
                Some(Def::Struct(d)) => Type::Struct(self.nominal(*d)),
                Some(Def::Choice(d)) => Type::Choice(self.nominal(*d)),
                _ => {
                    let site = self.expr_site(e);
                    self.error(
                        "compile-time evaluation of this type expression is not supported",
                        site,
                    );
                    Type::Error
                }
            },
            ExprKind::FunctionType { params, ret } => {
                let params = params.map(|p| self.pattern_as_type(*p));
                let ret = self.pattern_as_type(ret);
                Type::Function {
                    params,
                    ret: Box::new(ret),
                }
            }
            _ => {
                let site = self.expr_site(e);
                self.error(
                    "compile-time evaluation of this type expression is not supported",
                    site,
                );
                Type::Error
            }
        }
    }

    /// A `fnty` parameter or return position inside a type expression must
    /// be a type expression itself; `auto` deduction there is out of scope.
    fn pattern_as_type(&mut self, p: PatternId) -> Type {
        match self.ast.pattern(p).kind.clone() {
            PatternKind::Atom(e) => self.evaluate_type_expr(e),
            PatternKind::Tuple(fields) => {
                Type::Tuple(fields.map(|f| self.pattern_as_type(*f)))
            }
            PatternKind::FunctionType { params, ret } => {
                let params = params.map(|sub| self.pattern_as_type(*sub));
                let ret = self.pattern_as_type(ret);
                Type::Function {
                    params,
                    ret: Box::new(ret),
                }
            }
            _ => {
                let site = self.ast.pattern(p).site.clone();
                self.error("type deduction inside fnty patterns is not implemented", site);
                Type::Error
            }
        }
    }

    // -----------------------------------------------------------------------
    // Pattern typing
    // -----------------------------------------------------------------------

    fn pattern_type(&mut self, p: PatternId, rhs: Option<&Type>) -> Type {
        let kind = self.ast.pattern(p).kind.clone();
        match kind {
            PatternKind::Atom(e) => self.type_of_expr(e),
            PatternKind::Variable(b) => {
                if let Some(t) = self.tables.binding_types.get(&b) {
                    return t.clone();
                }
                let binding = self.ast.binding(b).clone();
                let ty = match binding.declared {
                    DeclaredType::Expr(t) => self.evaluate_type_expr(t),
                    DeclaredType::Auto => match rhs {
                        Some(t) => t.clone(),
                        None => {
                            self.error(
                                "No initializer available to deduce type for auto",
                                binding.site.clone(),
                            );
                            Type::Error
                        }
                    },
                };
                self.tables.binding_types.insert(b, ty.clone());
                ty
            }
            PatternKind::Tuple(fields) => {
                if let Some(label) = fields.duplicate_label() {
                    let label = label.to_string();
                    let site = self.ast.pattern(p).site.clone();
                    self.error(format!("duplicate field label '{}' in tuple", label), site);
                }
                let rhs_fields = match rhs {
                    Some(Type::Tuple(t)) => Some(t.clone()),
                    _ => None,
                };
                let mut out = TupleOf::new();
                for field in fields.iter() {
                    let element = rhs_fields.as_ref().and_then(|t| t.element(&field.id)).cloned();
                    let ty = self.pattern_type(field.value, element.as_ref());
                    out.push(field.id.clone(), ty);
                }
                Type::Tuple(out)
            }
            PatternKind::Call { callee, args } => self.call_pattern_type(p, callee, &args),
            PatternKind::FunctionType { params, ret } => {
                for field in params.iter() {
                    self.metatype_pattern(field.value);
                }
                self.metatype_pattern(ret);
                Type::TypeT
            }
        }
    }

    fn call_pattern_type(
        &mut self,
        p: PatternId,
        callee: ExprId,
        args: &TupleOf<PatternId>,
    ) -> Type {
        let site = self.ast.pattern(p).site.clone();
        let ct = self.type_of_callee(callee);
        match ct {
            Type::Alternative {
                choice, payload, ..
            } => {
                let mut arg_types = TupleOf::new();
                for field in args.iter() {
                    let element = payload.element(&field.id).cloned();
                    let ty = self.pattern_type(field.value, element.as_ref());
                    arg_types.push(field.id.clone(), ty);
                }
                if !tuple_types_equal(&arg_types, &payload) {
                    self.error(
                        format!(
                            "Argument tuple type {} doesn't match alternative payload type {}",
                            Type::Tuple(arg_types),
                            Type::Tuple(payload)
                        ),
                        site,
                    );
                }
                Type::Choice(choice)
            }
            Type::TypeT => {
                let v = self.evaluate_type_expr(callee);
                match v {
                    Type::Struct(id) => {
                        let params = self.initializer_parameters(id.decl);
                        let mut arg_types = TupleOf::new();
                        for field in args.iter() {
                            let element = params.element(&field.id).cloned();
                            let ty = self.pattern_type(field.value, element.as_ref());
                            arg_types.push(field.id.clone(), ty);
                        }
                        if !tuple_types_equal(&arg_types, &params) {
                            self.error(
                                format!(
                                    "Argument tuple type {} doesn't match struct initializer type {}",
                                    Type::Tuple(arg_types),
                                    Type::Tuple(params)
                                ),
                                site,
                            );
                        }
                        Type::Struct(id)
                    }
                    Type::Error => Type::Error,
                    other => {
                        self.error(format!("Called type must be a struct, not '{}'", other), site);
                        Type::Error
                    }
                }
            }
            Type::Error => Type::Error,
            other => {
                self.error(format!("instance of type {} is not callable", other), site);
                Type::Error
            }
        }
    }

    /// Whether a type is `Type` or a tuple of such types; tuples of types
    /// are themselves usable as types.
    fn is_metatype(t: &Type) -> bool {
        match t {
            Type::TypeT => true,
            Type::Tuple(fields) => fields.iter().all(|f| Self::is_metatype(&f.value)),
            _ => false,
        }
    }

    /// A sub-pattern of a `fnty` pattern must match type values.
    fn metatype_pattern(&mut self, p: PatternId) {
        if let PatternKind::Variable(b) = &self.ast.pattern(p).kind {
            if matches!(self.ast.binding(*b).declared, DeclaredType::Auto) {
                let site = self.ast.pattern(p).site.clone();
                self.error("type deduction inside fnty patterns is not implemented", site);
                return;
            }
        }
        let t = self.pattern_type(p, Some(&Type::TypeT));
        if !Self::is_metatype(&t) && !t.is_error() {
            let site = self.ast.pattern(p).site.clone();
            self.error(
                format!(
                    "Pattern in this context must match type values, not {} values",
                    t
                ),
                site,
            );
        }
    }

    // -----------------------------------------------------------------------
    // Statement checking
    // -----------------------------------------------------------------------

    fn check_initialization(&mut self, init: &Initialization, site: SourceRegion) {
        let rhs = self.type_of_expr(init.initializer);
        let lhs = self.pattern_type(init.pattern, Some(&rhs));
        if lhs != rhs && !lhs.is_error() && !rhs.is_error() {
            self.error(
                format!("Pattern type {} does not match initializer type {}", lhs, rhs),
                site,
            );
        }
    }

    fn check_function_body(&mut self, decl_id: DeclId) {
        let DeclKind::Function(f) = &self.ast.decl(decl_id).kind else {
            return;
        };
        let Some(body) = f.body else { return };
        let ret = match self.function_type(decl_id) {
            Type::Function { ret, .. } => *ret,
            _ => Type::Error,
        };
        self.return_type = Some(ret);
        self.loop_depth = 0;
        self.check_stmt(body);
        self.return_type = None;
    }

    fn check_stmt(&mut self, stmt_id: StmtId) {
        let kind = self.ast.stmt(stmt_id).kind.clone();
        let site = self.ast.stmt(stmt_id).site.clone();
        match kind {
            StmtKind::Expr(e) => {
                self.type_of_expr(e);
            }
            StmtKind::Assign { target, source } => {
                if !matches!(
                    self.ast.expr(target).kind,
                    ExprKind::Name(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
                ) {
                    let site = self.expr_site(target);
                    self.error("expression is not assignable", site);
                }
                let tt = self.type_of_expr(target);
                let st = self.type_of_expr(source);
                self.expect_type(&tt, &st, self.expr_site(source));
            }
            StmtKind::Init(init) => {
                self.check_initialization(&init, site);
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let ct = self.type_of_expr(cond);
                self.expect_type(&Type::Bool, &ct, self.expr_site(cond));
                self.check_stmt(then_body);
                if let Some(else_body) = else_body {
                    self.check_stmt(else_body);
                }
            }
            StmtKind::While { cond, body } => {
                let ct = self.type_of_expr(cond);
                self.expect_type(&Type::Bool, &ct, self.expr_site(cond));
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
            }
            StmtKind::Match { subject, clauses } => {
                let st = self.type_of_expr(subject);
                for clause in &clauses {
                    if let Some(pattern) = clause.pattern {
                        let pt = self.pattern_type(pattern, Some(&st));
                        if pt != st && !pt.is_error() && !st.is_error() {
                            self.error(
                                format!(
                                    "Pattern type {} does not match subject type {}",
                                    pt, st
                                ),
                                clause.site.clone(),
                            );
                        }
                    }
                    self.check_stmt(clause.body);
                }
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.error("'break' invalid outside loop body", site);
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.error("'continue' invalid outside loop body", site);
                }
            }
            StmtKind::Return(e) => {
                let t = self.type_of_expr(e);
                if let Some(ret) = self.return_type.clone() {
                    self.expect_type(&ret, &t, self.expr_site(e));
                }
            }
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.check_stmt(s);
                }
            }
        }
    }
}
