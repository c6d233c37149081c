/// Static type representation.
///
/// Nominal types (structs, choices) are referenced by `NominalId` handles
/// into the declaration arena rather than by value; two nominal types are
/// the same type iff they come from the same declaration. A type is itself
/// a runtime value: type-valued expressions produce `Value::Type` whose
/// dynamic type is `TypeT`.
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::ast::{DeclId, FieldId, TupleOf};

/// Handle to a struct or choice declaration. The name rides along for
/// display; identity is the declaration handle alone.
#[derive(Debug, Clone)]
pub struct NominalId {
    pub decl: DeclId,
    pub name: Rc<str>,
}

impl NominalId {
    pub fn new(decl: DeclId, name: &str) -> Self {
        NominalId {
            decl,
            name: Rc::from(name),
        }
    }
}

impl PartialEq for NominalId {
    fn eq(&self, other: &Self) -> bool {
        self.decl == other.decl
    }
}

impl Eq for NominalId {}

impl Hash for NominalId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.decl.hash(state);
    }
}

#[derive(Debug, Clone)]
pub enum Type {
    Int,
    Bool,
    /// The type of types.
    TypeT,
    Tuple(TupleOf<Type>),
    Function {
        params: TupleOf<Type>,
        ret: Box<Type>,
    },
    Struct(NominalId),
    Choice(NominalId),
    /// A choice alternative used as a constructor; `index` is the
    /// discriminant position within the parent choice.
    Alternative {
        choice: NominalId,
        index: usize,
        name: Rc<str>,
        payload: TupleOf<Type>,
    },
    /// Placeholder recorded after a reported diagnostic so checking can
    /// continue.
    Error,
}

/// Tuple types are equal iff they are congruent and agree element-wise;
/// field order never matters.
pub fn tuple_types_equal(a: &TupleOf<Type>, b: &TupleOf<Type>) -> bool {
    a.congruent_to(b)
        && a.iter()
            .all(|f| b.element(&f.id).map(|t| &f.value == t).unwrap_or(false))
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Int, Type::Int) => true,
            (Type::Bool, Type::Bool) => true,
            (Type::TypeT, Type::TypeT) => true,
            (Type::Tuple(a), Type::Tuple(b)) => tuple_types_equal(a, b),
            (
                Type::Function {
                    params: p1,
                    ret: r1,
                },
                Type::Function {
                    params: p2,
                    ret: r2,
                },
            ) => tuple_types_equal(p1, p2) && r1 == r2,
            (Type::Struct(a), Type::Struct(b)) => a == b,
            (Type::Choice(a), Type::Choice(b)) => a == b,
            (
                Type::Alternative {
                    choice: c1,
                    index: i1,
                    payload: p1,
                    ..
                },
                Type::Alternative {
                    choice: c2,
                    index: i2,
                    payload: p2,
                    ..
                },
            ) => c1 == c2 && i1 == i2 && tuple_types_equal(p1, p2),
            (Type::Error, Type::Error) => true,
            _ => false,
        }
    }
}

impl Type {
    pub fn empty_tuple() -> Type {
        Type::Tuple(TupleOf::new())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }
}

fn write_tuple(f: &mut fmt::Formatter<'_>, fields: &TupleOf<Type>) -> fmt::Result {
    write!(f, "(")?;
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        match &field.id {
            FieldId::Position(_) => write!(f, "{}", field.value)?,
            FieldId::Label(l) => write!(f, ".{} = {}", l, field.value)?,
        }
    }
    write!(f, ")")
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Bool => write!(f, "Bool"),
            Type::TypeT => write!(f, "Type"),
            Type::Tuple(fields) => write_tuple(f, fields),
            Type::Function { params, ret } => {
                write!(f, "fnty ")?;
                write_tuple(f, params)?;
                write!(f, " -> {}", ret)
            }
            Type::Struct(id) => write!(f, "{}", id.name),
            Type::Choice(id) => write!(f, "{}", id.name),
            Type::Alternative { choice, name, .. } => write!(f, "{}.{}", choice.name, name),
            Type::Error => write!(f, "<error>"),
        }
    }
}
