/// Arena-owned abstract syntax tree.
///
/// Nodes live in per-category vectors inside `Ast`; references between nodes
/// are copyable index handles (`ExprId`, `PatternId`, `StmtId`, `DeclId`,
/// `BindingId`). Handles are the node identity used as map keys by every
/// later pass. Each node carries a `site` used only for diagnostics.
use std::fmt;

use crate::source::SourceRegion;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(ExprId);
arena_id!(PatternId);
arena_id!(StmtId);
arena_id!(DeclId);
arena_id!(BindingId);

// ---------------------------------------------------------------------------
// Tuples
// ---------------------------------------------------------------------------

/// Identifies a field of a tuple: either a 0-based position or a label.
/// Positional fields come first and carry successive positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldId {
    Position(usize),
    Label(String),
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldId::Position(n) => write!(f, "{}", n),
            FieldId::Label(l) => write!(f, ".{}", l),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TupleField<T> {
    pub id: FieldId,
    pub value: T,
}

/// An ordered sequence of fields keyed by `FieldId`.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleOf<T> {
    pub fields: Vec<TupleField<T>>,
}

impl<T> Default for TupleOf<T> {
    fn default() -> Self {
        TupleOf { fields: Vec::new() }
    }
}

impl<T> TupleOf<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positional(values: Vec<T>) -> Self {
        TupleOf {
            fields: values
                .into_iter()
                .enumerate()
                .map(|(i, value)| TupleField {
                    id: FieldId::Position(i),
                    value,
                })
                .collect(),
        }
    }

    pub fn push(&mut self, id: FieldId, value: T) {
        self.fields.push(TupleField { id, value });
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TupleField<T>> {
        self.fields.iter()
    }

    pub fn element(&self, id: &FieldId) -> Option<&T> {
        self.fields.iter().find(|f| &f.id == id).map(|f| &f.value)
    }

    /// Tuples are congruent iff they have the same set of field ids.
    pub fn congruent_to<U>(&self, other: &TupleOf<U>) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|f| other.fields.iter().any(|g| g.id == f.id))
    }

    /// First label that appears more than once, if any. A tuple is
    /// well-formed iff this returns `None`.
    pub fn duplicate_label(&self) -> Option<&str> {
        for (i, f) in self.fields.iter().enumerate() {
            if let FieldId::Label(l) = &f.id {
                if self.fields[..i]
                    .iter()
                    .any(|g| matches!(&g.id, FieldId::Label(m) if m == l))
                {
                    return Some(l);
                }
            }
        }
        None
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> TupleOf<U> {
        TupleOf {
            fields: self
                .fields
                .iter()
                .map(|field| TupleField {
                    id: field.id.clone(),
                    value: f(&field.value),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Eq,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Eq => "==",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub site: SourceRegion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(String),
    IntLit(i64),
    BoolLit(bool),
    TupleLit(TupleOf<ExprId>),
    Member { base: ExprId, member: String },
    Index { base: ExprId, offset: ExprId },
    Unary(UnaryOp, ExprId),
    Binary(BinaryOp, ExprId, ExprId),
    Call { callee: ExprId, args: TupleOf<ExprId> },
    IntType,
    BoolType,
    TypeType,
    FunctionType { params: TupleOf<PatternId>, ret: PatternId },
}

// ---------------------------------------------------------------------------
// Patterns and bindings
// ---------------------------------------------------------------------------

/// A single `name: T` or `name: auto` binding introduced by a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub declared: DeclaredType,
    pub site: SourceRegion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    Expr(ExprId),
    Auto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub site: SourceRegion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// An expression pattern: matches values equal to the expression's value.
    Atom(ExprId),
    Variable(BindingId),
    Tuple(TupleOf<PatternId>),
    /// Constructor pattern: `Ints.One(n: auto)`, `X(.a = p, .b = q)`.
    Call { callee: ExprId, args: TupleOf<PatternId> },
    FunctionType { params: TupleOf<PatternId>, ret: PatternId },
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Lowered `var p = e;`.
#[derive(Debug, Clone, PartialEq)]
pub struct Initialization {
    pub pattern: PatternId,
    pub initializer: ExprId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    /// `None` for the `default` clause.
    pub pattern: Option<PatternId>,
    pub body: StmtId,
    pub site: SourceRegion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub site: SourceRegion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(ExprId),
    Assign { target: ExprId, source: ExprId },
    Init(Initialization),
    If { cond: ExprId, then_body: StmtId, else_body: Option<StmtId> },
    While { cond: ExprId, body: StmtId },
    Match { subject: ExprId, clauses: Vec<MatchClause> },
    Break,
    Continue,
    Return(ExprId),
    Block(Vec<StmtId>),
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnForm {
    Expr(ExprId),
    Auto(SourceRegion),
    /// No `->` clause; the function returns the empty tuple.
    Omitted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub name_site: SourceRegion,
    pub params: TupleOf<PatternId>,
    pub ret: ReturnForm,
    pub body: Option<StmtId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub type_expr: ExprId,
    pub site: SourceRegion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub name_site: SourceRegion,
    pub members: Vec<StructMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceAlternative {
    pub name: String,
    pub payload: TupleOf<ExprId>,
    pub site: SourceRegion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceDecl {
    pub name: String,
    pub name_site: SourceRegion,
    pub alternatives: Vec<ChoiceAlternative>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub kind: DeclKind,
    pub site: SourceRegion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Function(FunctionDecl),
    Struct(StructDecl),
    Choice(ChoiceDecl),
    Init(Initialization),
}

impl Decl {
    /// Declared name, where the declaration introduces one.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            DeclKind::Function(f) => Some(&f.name),
            DeclKind::Struct(s) => Some(&s.name),
            DeclKind::Choice(c) => Some(&c.name),
            DeclKind::Init(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Ast {
    exprs: Vec<Expr>,
    patterns: Vec<Pattern>,
    stmts: Vec<Stmt>,
    decls: Vec<Decl>,
    bindings: Vec<Binding>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_expr(&mut self, kind: ExprKind, site: SourceRegion) -> ExprId {
        self.exprs.push(Expr { kind, site });
        ExprId(self.exprs.len() as u32 - 1)
    }

    pub fn add_pattern(&mut self, kind: PatternKind, site: SourceRegion) -> PatternId {
        self.patterns.push(Pattern { kind, site });
        PatternId(self.patterns.len() as u32 - 1)
    }

    pub fn add_stmt(&mut self, kind: StmtKind, site: SourceRegion) -> StmtId {
        self.stmts.push(Stmt { kind, site });
        StmtId(self.stmts.len() as u32 - 1)
    }

    pub fn add_decl(&mut self, kind: DeclKind, site: SourceRegion) -> DeclId {
        self.decls.push(Decl { kind, site });
        DeclId(self.decls.len() as u32 - 1)
    }

    pub fn add_binding(&mut self, binding: Binding) -> BindingId {
        self.bindings.push(binding);
        BindingId(self.bindings.len() as u32 - 1)
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn pattern(&self, id: PatternId) -> &Pattern {
        &self.patterns[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.0 as usize]
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.0 as usize]
    }

    /// Top-level declarations in program order.
    pub fn decl_ids(&self) -> impl Iterator<Item = DeclId> {
        (0..self.decls.len() as u32).map(DeclId)
    }

    /// Binding ids introduced by a pattern, in source order.
    pub fn pattern_bindings(&self, id: PatternId, out: &mut Vec<BindingId>) {
        match &self.pattern(id).kind {
            PatternKind::Atom(_) => {}
            PatternKind::Variable(b) => out.push(*b),
            PatternKind::Tuple(fields) => {
                for f in fields.iter() {
                    self.pattern_bindings(f.value, out);
                }
            }
            PatternKind::Call { args, .. } => {
                for f in args.iter() {
                    self.pattern_bindings(f.value, out);
                }
            }
            PatternKind::FunctionType { params, ret } => {
                for f in params.iter() {
                    self.pattern_bindings(f.value, out);
                }
                self.pattern_bindings(*ret, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_tuple_field_ids_start_at_zero() {
        let t = TupleOf::from_positional(vec!["a", "b"]);
        assert_eq!(t.fields[0].id, FieldId::Position(0));
        assert_eq!(t.fields[1].id, FieldId::Position(1));
        assert_eq!(t.element(&FieldId::Position(1)), Some(&"b"));
        assert_eq!(t.element(&FieldId::Position(2)), None);
    }

    #[test]
    fn congruence_requires_equal_field_id_sets() {
        let mut a: TupleOf<i32> = TupleOf::new();
        a.push(FieldId::Position(0), 1);
        a.push(FieldId::Label("x".to_string()), 2);

        let mut b: TupleOf<&str> = TupleOf::new();
        b.push(FieldId::Position(0), "p");
        b.push(FieldId::Label("x".to_string()), "q");
        assert!(a.congruent_to(&b));

        let mut c: TupleOf<&str> = TupleOf::new();
        c.push(FieldId::Position(0), "p");
        c.push(FieldId::Label("y".to_string()), "q");
        assert!(!a.congruent_to(&c));

        let d: TupleOf<&str> = TupleOf::from_positional(vec!["p"]);
        assert!(!a.congruent_to(&d));
    }

    #[test]
    fn duplicate_labels_are_detected() {
        let mut t: TupleOf<i32> = TupleOf::new();
        t.push(FieldId::Label("a".to_string()), 1);
        t.push(FieldId::Label("b".to_string()), 2);
        assert_eq!(t.duplicate_label(), None);
        t.push(FieldId::Label("a".to_string()), 3);
        assert_eq!(t.duplicate_label(), Some("a"));
    }

    #[test]
    fn arena_handles_are_stable() {
        let mut ast = Ast::new();
        let a = ast.add_expr(ExprKind::IntLit(1), SourceRegion::empty());
        let b = ast.add_expr(ExprKind::IntLit(2), SourceRegion::empty());
        assert_ne!(a, b);
        assert_eq!(ast.expr(a).kind, ExprKind::IntLit(1));
        assert_eq!(ast.expr(b).kind, ExprKind::IntLit(2));
    }
}
