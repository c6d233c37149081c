/// Address-keyed runtime store.
///
/// Every allocation produces a base `Address` bound to a type and starting
/// uninitialized. Addresses support projection: a sub-address naming a
/// tuple field or the payload of a struct/choice value. Projections share
/// the lifetime of their base and are never deallocated on their own.
///
/// Invariants enforced here:
///   - the dynamic type of every stored value equals the bound type of its
///     address;
///   - reads require the read part to be fully initialized;
///   - `initialize` targets uninitialized storage, `write` (assignment)
///     targets initialized storage;
///   - deallocation is base-only.
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{FieldId, TupleOf};
use crate::types::{NominalId, Type};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Part {
    Field(FieldId),
    Payload,
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Part::Field(id) => write!(f, "{}", id),
            Part::Payload => write!(f, "payload"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    slot: usize,
    path: Vec<Part>,
}

impl Address {
    /// Projection to a named part of the value stored here.
    pub fn part(&self, part: Part) -> Address {
        let mut path = self.path.clone();
        path.push(part);
        Address {
            slot: self.slot,
            path,
        }
    }

    pub fn field(&self, id: FieldId) -> Address {
        self.part(Part::Field(id))
    }

    pub fn payload(&self) -> Address {
        self.part(Part::Payload)
    }

    /// Whether this address names a whole allocation rather than a part.
    pub fn is_base(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.slot)?;
        for part in &self.path {
            write!(f, ".{}", part)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("access to dead address {0}")]
    Dead(Address),
    #[error("read of uninitialized memory at {0}")]
    UninitializedRead(Address),
    #[error("projection into uninitialized memory at {0}")]
    ProjectionIntoUninitialized(Address),
    #[error("{0} is already initialized")]
    AlreadyInitialized(Address),
    #[error("assignment to uninitialized memory at {0}")]
    WriteToUninitialized(Address),
    #[error("assignment through immutable address {0}")]
    ImmutableWrite(Address),
    #[error("value of type {found} stored at {address} bound to type {expected}")]
    TypeMismatch {
        address: Address,
        expected: Type,
        found: Type,
    },
    #[error("{address} has no part {part}")]
    NoSuchPart { address: Address, part: Part },
    #[error("cannot deallocate projection {0}")]
    DeallocateProjection(Address),
    #[error("{0} does not hold a choice value")]
    NotAChoice(Address),
}

// ---------------------------------------------------------------------------
// Storage cells
// ---------------------------------------------------------------------------

/// A tree mirroring the shape of the stored value, so that composite values
/// can be initialized part by part.
#[derive(Debug, Clone)]
enum Cell {
    Uninit(Type),
    Leaf(Value),
    Tuple(TupleOf<Cell>),
    Struct {
        id: NominalId,
        payload: Box<Cell>,
    },
    Choice {
        id: NominalId,
        discriminant: usize,
        alternative: Rc<str>,
        payload: Box<Cell>,
    },
}

impl Cell {
    fn bound_type(&self) -> Type {
        match self {
            Cell::Uninit(t) => t.clone(),
            Cell::Leaf(v) => v.dynamic_type(),
            Cell::Tuple(fields) => Type::Tuple(fields.map(|c| c.bound_type())),
            Cell::Struct { id, .. } => Type::Struct(id.clone()),
            Cell::Choice { id, .. } => Type::Choice(id.clone()),
        }
    }

    fn encode(value: Value) -> Cell {
        match value {
            Value::Tuple(fields) => Cell::Tuple(fields.map(|v| Cell::encode(v.clone()))),
            Value::Struct { id, payload } => Cell::Struct {
                id,
                payload: Box::new(Cell::encode(*payload)),
            },
            Value::Choice {
                id,
                discriminant,
                alternative,
                payload,
            } => Cell::Choice {
                id,
                discriminant,
                alternative,
                payload: Box::new(Cell::encode(*payload)),
            },
            leaf => Cell::Leaf(leaf),
        }
    }

    fn decode(&self, at: &Address) -> Result<Value, MemoryError> {
        match self {
            Cell::Uninit(_) => Err(MemoryError::UninitializedRead(at.clone())),
            Cell::Leaf(v) => Ok(v.clone()),
            Cell::Tuple(fields) => {
                let mut out = TupleOf::new();
                for field in fields.iter() {
                    let value = field.value.decode(&at.field(field.id.clone()))?;
                    out.push(field.id.clone(), value);
                }
                Ok(Value::Tuple(out))
            }
            Cell::Struct { id, payload } => Ok(Value::Struct {
                id: id.clone(),
                payload: Box::new(payload.decode(&at.payload())?),
            }),
            Cell::Choice {
                id,
                discriminant,
                alternative,
                payload,
            } => Ok(Value::Choice {
                id: id.clone(),
                discriminant: *discriminant,
                alternative: alternative.clone(),
                payload: Box::new(payload.decode(&at.payload())?),
            }),
        }
    }
}

fn uninit_tuple(types: &TupleOf<Type>) -> Cell {
    Cell::Tuple(types.map(|t| Cell::Uninit(t.clone())))
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
    cell: Cell,
    mutable: bool,
}

#[derive(Debug, Default)]
pub struct Memory {
    slots: Vec<Option<Slot>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, ty: Type) -> Address {
        self.slots.push(Some(Slot {
            cell: Cell::Uninit(ty),
            mutable: true,
        }));
        Address {
            slot: self.slots.len() - 1,
            path: Vec::new(),
        }
    }

    /// Number of live (not yet deallocated) base addresses.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn slot(&self, a: &Address) -> Result<&Slot, MemoryError> {
        self.slots
            .get(a.slot)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| MemoryError::Dead(a.clone()))
    }

    fn slot_mut(&mut self, a: &Address) -> Result<&mut Slot, MemoryError> {
        self.slots
            .get_mut(a.slot)
            .and_then(|s| s.as_mut())
            .ok_or_else(|| MemoryError::Dead(a.clone()))
    }

    fn cell(&self, a: &Address) -> Result<&Cell, MemoryError> {
        let mut cell = &self.slot(a)?.cell;
        let mut walked = Address {
            slot: a.slot,
            path: Vec::new(),
        };
        for part in &a.path {
            cell = Self::child(cell, part, &walked)?;
            walked = walked.part(part.clone());
        }
        Ok(cell)
    }

    fn cell_mut(&mut self, a: &Address) -> Result<&mut Cell, MemoryError> {
        let slot = a.slot;
        let path = a.path.clone();
        let mut cell = &mut self.slot_mut(a)?.cell;
        let mut walked = Address {
            slot,
            path: Vec::new(),
        };
        for part in &path {
            cell = Self::child_mut(cell, part, &walked)?;
            walked = walked.part(part.clone());
        }
        Ok(cell)
    }

    fn child<'c>(cell: &'c Cell, part: &Part, at: &Address) -> Result<&'c Cell, MemoryError> {
        match (cell, part) {
            (Cell::Uninit(_), _) => Err(MemoryError::ProjectionIntoUninitialized(at.clone())),
            (Cell::Tuple(fields), Part::Field(id)) => {
                fields.element(id).ok_or_else(|| MemoryError::NoSuchPart {
                    address: at.clone(),
                    part: part.clone(),
                })
            }
            (Cell::Struct { payload, .. }, Part::Payload)
            | (Cell::Choice { payload, .. }, Part::Payload) => Ok(payload),
            _ => Err(MemoryError::NoSuchPart {
                address: at.clone(),
                part: part.clone(),
            }),
        }
    }

    fn child_mut<'c>(
        cell: &'c mut Cell,
        part: &Part,
        at: &Address,
    ) -> Result<&'c mut Cell, MemoryError> {
        match (cell, part) {
            (Cell::Uninit(_), _) => Err(MemoryError::ProjectionIntoUninitialized(at.clone())),
            (Cell::Tuple(fields), Part::Field(id)) => fields
                .fields
                .iter_mut()
                .find(|f| &f.id == id)
                .map(|f| &mut f.value)
                .ok_or_else(|| MemoryError::NoSuchPart {
                    address: at.clone(),
                    part: part.clone(),
                }),
            (Cell::Struct { payload, .. }, Part::Payload)
            | (Cell::Choice { payload, .. }, Part::Payload) => Ok(payload),
            _ => Err(MemoryError::NoSuchPart {
                address: at.clone(),
                part: part.clone(),
            }),
        }
    }

    /// Bound type of the storage at `a`.
    pub fn type_at(&self, a: &Address) -> Result<Type, MemoryError> {
        Ok(self.cell(a)?.bound_type())
    }

    pub fn is_initialized(&self, a: &Address) -> Result<bool, MemoryError> {
        Ok(!matches!(self.cell(a)?, Cell::Uninit(_)))
    }

    /// Store `value` into uninitialized storage at `a`.
    pub fn initialize(&mut self, a: &Address, value: Value) -> Result<(), MemoryError> {
        let cell = self.cell_mut(a)?;
        let expected = match cell {
            Cell::Uninit(t) => t.clone(),
            _ => return Err(MemoryError::AlreadyInitialized(a.clone())),
        };
        let found = value.dynamic_type();
        if found != expected {
            return Err(MemoryError::TypeMismatch {
                address: a.clone(),
                expected,
                found,
            });
        }
        *cell = Cell::encode(value);
        Ok(())
    }

    /// Expand uninitialized tuple storage into a skeleton of uninitialized
    /// fields so the fields can be initialized through projections.
    pub fn start_tuple(&mut self, a: &Address) -> Result<(), MemoryError> {
        let cell = self.cell_mut(a)?;
        match cell {
            Cell::Uninit(Type::Tuple(types)) => {
                let skeleton = uninit_tuple(&types.clone());
                *cell = skeleton;
                Ok(())
            }
            Cell::Uninit(other) => Err(MemoryError::TypeMismatch {
                address: a.clone(),
                expected: other.clone(),
                found: Type::empty_tuple(),
            }),
            _ => Err(MemoryError::AlreadyInitialized(a.clone())),
        }
    }

    /// Begin a struct value with an uninitialized payload tuple.
    pub fn start_struct(
        &mut self,
        a: &Address,
        id: NominalId,
        payload: &TupleOf<Type>,
    ) -> Result<(), MemoryError> {
        let cell = self.cell_mut(a)?;
        match cell {
            Cell::Uninit(Type::Struct(bound)) if *bound == id => {
                *cell = Cell::Struct {
                    id,
                    payload: Box::new(uninit_tuple(payload)),
                };
                Ok(())
            }
            Cell::Uninit(other) => Err(MemoryError::TypeMismatch {
                address: a.clone(),
                expected: other.clone(),
                found: Type::Struct(id),
            }),
            _ => Err(MemoryError::AlreadyInitialized(a.clone())),
        }
    }

    /// Begin a choice value with a fixed discriminant and an uninitialized
    /// payload tuple.
    pub fn start_choice(
        &mut self,
        a: &Address,
        id: NominalId,
        discriminant: usize,
        alternative: Rc<str>,
        payload: &TupleOf<Type>,
    ) -> Result<(), MemoryError> {
        let cell = self.cell_mut(a)?;
        match cell {
            Cell::Uninit(Type::Choice(bound)) if *bound == id => {
                *cell = Cell::Choice {
                    id,
                    discriminant,
                    alternative,
                    payload: Box::new(uninit_tuple(payload)),
                };
                Ok(())
            }
            Cell::Uninit(other) => Err(MemoryError::TypeMismatch {
                address: a.clone(),
                expected: other.clone(),
                found: Type::Choice(id),
            }),
            _ => Err(MemoryError::AlreadyInitialized(a.clone())),
        }
    }

    /// Assignment: overwrite initialized storage with a value of the same
    /// type.
    pub fn write(&mut self, a: &Address, value: Value) -> Result<(), MemoryError> {
        if !self.slot(a)?.mutable {
            return Err(MemoryError::ImmutableWrite(a.clone()));
        }
        let cell = self.cell_mut(a)?;
        if matches!(cell, Cell::Uninit(_)) {
            return Err(MemoryError::WriteToUninitialized(a.clone()));
        }
        let expected = cell.bound_type();
        let found = value.dynamic_type();
        if found != expected {
            return Err(MemoryError::TypeMismatch {
                address: a.clone(),
                expected,
                found,
            });
        }
        *cell = Cell::encode(value);
        Ok(())
    }

    /// Read the fully-initialized value at `a`.
    pub fn read(&self, a: &Address) -> Result<Value, MemoryError> {
        self.cell(a)?.decode(a)
    }

    pub fn discriminant(&self, a: &Address) -> Result<usize, MemoryError> {
        match self.cell(a)? {
            Cell::Choice { discriminant, .. } => Ok(*discriminant),
            _ => Err(MemoryError::NotAChoice(a.clone())),
        }
    }

    /// Release a base allocation, deinitializing whatever it holds.
    pub fn deallocate(&mut self, a: &Address) -> Result<(), MemoryError> {
        if !a.is_base() {
            return Err(MemoryError::DeallocateProjection(a.clone()));
        }
        let slot = self
            .slots
            .get_mut(a.slot)
            .ok_or_else(|| MemoryError::Dead(a.clone()))?;
        if slot.is_none() {
            return Err(MemoryError::Dead(a.clone()));
        }
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DeclId;

    fn int_pair() -> Type {
        Type::Tuple(TupleOf::from_positional(vec![Type::Int, Type::Int]))
    }

    #[test]
    fn initialize_then_read_round_trips() {
        let mut mem = Memory::new();
        let a = mem.allocate(Type::Int);
        mem.initialize(&a, Value::Int(7)).unwrap();
        assert_eq!(mem.read(&a).unwrap(), Value::Int(7));
    }

    #[test]
    fn read_before_initialize_is_an_error() {
        let mem_err = {
            let mut mem = Memory::new();
            let a = mem.allocate(Type::Int);
            mem.read(&a).unwrap_err()
        };
        assert!(matches!(mem_err, MemoryError::UninitializedRead(_)));
    }

    #[test]
    fn initialize_checks_the_bound_type() {
        let mut mem = Memory::new();
        let a = mem.allocate(Type::Int);
        let err = mem.initialize(&a, Value::Bool(true)).unwrap_err();
        assert!(matches!(err, MemoryError::TypeMismatch { .. }));
    }

    #[test]
    fn double_initialize_is_an_error() {
        let mut mem = Memory::new();
        let a = mem.allocate(Type::Int);
        mem.initialize(&a, Value::Int(1)).unwrap();
        let err = mem.initialize(&a, Value::Int(2)).unwrap_err();
        assert!(matches!(err, MemoryError::AlreadyInitialized(_)));
    }

    #[test]
    fn tuple_fields_initialize_through_projections() {
        let mut mem = Memory::new();
        let a = mem.allocate(int_pair());
        mem.start_tuple(&a).unwrap();
        mem.initialize(&a.field(FieldId::Position(0)), Value::Int(1))
            .unwrap();
        // Partially initialized: whole-tuple read still fails.
        assert!(matches!(
            mem.read(&a),
            Err(MemoryError::UninitializedRead(_))
        ));
        mem.initialize(&a.field(FieldId::Position(1)), Value::Int(2))
            .unwrap();
        assert_eq!(
            mem.read(&a).unwrap(),
            Value::Tuple(TupleOf::from_positional(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(
            mem.read(&a.field(FieldId::Position(1))).unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn assignment_requires_prior_initialization() {
        let mut mem = Memory::new();
        let a = mem.allocate(Type::Int);
        assert!(matches!(
            mem.write(&a, Value::Int(1)),
            Err(MemoryError::WriteToUninitialized(_))
        ));
        mem.initialize(&a, Value::Int(1)).unwrap();
        mem.write(&a, Value::Int(2)).unwrap();
        assert_eq!(mem.read(&a).unwrap(), Value::Int(2));
    }

    #[test]
    fn projections_die_with_their_base() {
        let mut mem = Memory::new();
        let a = mem.allocate(int_pair());
        mem.start_tuple(&a).unwrap();
        mem.initialize(&a.field(FieldId::Position(0)), Value::Int(1))
            .unwrap();
        mem.initialize(&a.field(FieldId::Position(1)), Value::Int(2))
            .unwrap();
        let proj = a.field(FieldId::Position(0));
        mem.deallocate(&a).unwrap();
        assert!(matches!(mem.read(&proj), Err(MemoryError::Dead(_))));
    }

    #[test]
    fn deallocate_rejects_projections_and_double_free() {
        let mut mem = Memory::new();
        let a = mem.allocate(int_pair());
        assert!(matches!(
            mem.deallocate(&a.field(FieldId::Position(0))),
            Err(MemoryError::DeallocateProjection(_))
        ));
        mem.deallocate(&a).unwrap();
        assert!(matches!(mem.deallocate(&a), Err(MemoryError::Dead(_))));
    }

    #[test]
    fn choice_discriminant_is_readable_without_payload() {
        let mut mem = Memory::new();
        let id = NominalId::new(DeclId(0), "Ints");
        let payload = TupleOf::from_positional(vec![Type::Int]);
        let a = mem.allocate(Type::Choice(id.clone()));
        mem.start_choice(&a, id, 1, Rc::from("One"), &payload)
            .unwrap();
        assert_eq!(mem.discriminant(&a).unwrap(), 1);
        // Payload still uninitialized.
        assert!(matches!(
            mem.read(&a),
            Err(MemoryError::UninitializedRead(_))
        ));
        mem.initialize(&a.payload().field(FieldId::Position(0)), Value::Int(42))
            .unwrap();
        assert!(mem.read(&a).is_ok());
    }
}
