/// Runtime values.
///
/// Lives in its own module so the memory store, the interpreter and the
/// type checker's compile-time evaluator can all import it without circular
/// dependencies. Every value knows its dynamic type; the memory store
/// enforces that the dynamic type of a stored value equals the bound type
/// of its address.
use std::fmt;
use std::rc::Rc;

use crate::ast::{DeclId, FieldId, TupleOf};
use crate::types::{NominalId, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    /// A first-class type value; its dynamic type is `TypeT`.
    Type(Type),
    Tuple(TupleOf<Value>),
    Function {
        ty: Type,
        decl: DeclId,
        name: Rc<str>,
    },
    Struct {
        id: NominalId,
        /// Always a `Value::Tuple` holding the member values.
        payload: Box<Value>,
    },
    Choice {
        id: NominalId,
        discriminant: usize,
        alternative: Rc<str>,
        payload: Box<Value>,
    },
    /// A bare alternative reference, only meaningful as a callee.
    Alternative {
        choice: NominalId,
        index: usize,
        name: Rc<str>,
        payload: TupleOf<Type>,
    },
}

impl Value {
    pub fn empty_tuple() -> Value {
        Value::Tuple(TupleOf::new())
    }

    pub fn dynamic_type(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Bool(_) => Type::Bool,
            Value::Type(_) => Type::TypeT,
            Value::Tuple(fields) => Type::Tuple(fields.map(|v| v.dynamic_type())),
            Value::Function { ty, .. } => ty.clone(),
            Value::Struct { id, .. } => Type::Struct(id.clone()),
            Value::Choice { id, .. } => Type::Choice(id.clone()),
            Value::Alternative {
                choice,
                index,
                name,
                payload,
            } => Type::Alternative {
                choice: choice.clone(),
                index: *index,
                name: name.clone(),
                payload: payload.clone(),
            },
        }
    }

    /// Structural equality as defined by the `==` operator: primitives by
    /// value, tuples by congruence plus recursive equality, choice values by
    /// discriminant then payload, types structurally. Any other pair of
    /// values with matching dynamic type is equal (preserving reflexivity);
    /// differing dynamic types are unequal.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.congruent_to(b)
                    && a.iter().all(|f| {
                        b.element(&f.id)
                            .map(|v| f.value.equals(v))
                            .unwrap_or(false)
                    })
            }
            (
                Value::Choice {
                    id: a,
                    discriminant: da,
                    payload: pa,
                    ..
                },
                Value::Choice {
                    id: b,
                    discriminant: db,
                    payload: pb,
                    ..
                },
            ) => a == b && da == db && pa.equals(pb),
            (
                Value::Struct { id: a, payload: pa },
                Value::Struct { id: b, payload: pb },
            ) => a == b && pa.equals(pb),
            _ => self.dynamic_type() == other.dynamic_type(),
        }
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &TupleOf<Value>) -> fmt::Result {
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

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Type(t) => write!(f, "{}", t),
            Value::Tuple(fields) => write_fields(f, fields),
            Value::Function { name, .. } => write!(f, "<fn {}>", name),
            Value::Struct { id, payload } => write!(f, "{}{}", id.name, payload),
            Value::Choice {
                id,
                alternative,
                payload,
                ..
            } => {
                if matches!(payload.as_ref(), Value::Tuple(t) if t.is_empty()) {
                    write!(f, "{}.{}", id.name, alternative)
                } else {
                    write!(f, "{}.{}{}", id.name, alternative, payload)
                }
            }
            Value::Alternative { choice, name, .. } => {
                write!(f, "{}.{}", choice.name, name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DeclId;

    fn choice_val(decl: u32, disc: usize, payload: Value) -> Value {
        Value::Choice {
            id: NominalId::new(DeclId(decl), "Ints"),
            discriminant: disc,
            alternative: Rc::from("One"),
            payload: Box::new(payload),
        }
    }

    #[test]
    fn primitive_equality() {
        assert!(Value::Int(3).equals(&Value::Int(3)));
        assert!(!Value::Int(3).equals(&Value::Int(4)));
        assert!(!Value::Int(1).equals(&Value::Bool(true)));
    }

    #[test]
    fn tuple_equality_requires_congruence() {
        let a = Value::Tuple(TupleOf::from_positional(vec![Value::Int(1), Value::Int(2)]));
        let b = Value::Tuple(TupleOf::from_positional(vec![Value::Int(1), Value::Int(2)]));
        let c = Value::Tuple(TupleOf::from_positional(vec![Value::Int(1)]));
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    #[test]
    fn choice_equality_compares_discriminant_then_payload() {
        let one = choice_val(0, 1, Value::Tuple(TupleOf::from_positional(vec![Value::Int(42)])));
        let same = choice_val(0, 1, Value::Tuple(TupleOf::from_positional(vec![Value::Int(42)])));
        let other_disc = choice_val(0, 0, Value::empty_tuple());
        let other_payload =
            choice_val(0, 1, Value::Tuple(TupleOf::from_positional(vec![Value::Int(7)])));
        assert!(one.equals(&same));
        assert!(!one.equals(&other_disc));
        assert!(!one.equals(&other_payload));
    }

    #[test]
    fn dynamic_type_of_tuple_maps_fields() {
        let v = Value::Tuple(TupleOf::from_positional(vec![Value::Int(1), Value::Bool(true)]));
        assert_eq!(
            v.dynamic_type(),
            Type::Tuple(TupleOf::from_positional(vec![Type::Int, Type::Bool]))
        );
    }
}
