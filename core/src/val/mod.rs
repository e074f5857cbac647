mod alloc;
mod array;
mod function;
mod methods;
mod object;
mod string;

use std::{fmt, rc::Rc};

pub use alloc::{BLOCK_SLOTS, Reclaimer, SlotKey, ValuePool};
pub use array::ArrayHandle;
pub use function::{Arity, Closure, FuncHandle, FuncKind, NativeFn};
pub use methods::{NativeMethod, find_method, register_method};
pub use object::{ObjectHandle, PrivCleanup};
pub(crate) use object::{holds_slot, reaches};
pub use string::StrHandle;

use crate::vm::Executable;

/// Discriminant of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Empty,
    Int,
    Float,
    Str,
    Array,
    Object,
    Function,
    Ptr,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Empty => "empty",
            Kind::Int => "integer",
            Kind::Float => "float",
            Kind::Str => "string",
            Kind::Array => "array",
            Kind::Object => "object",
            Kind::Function => "function",
            Kind::Ptr => "internal pointer",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Kind::Int | Kind::Float)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime-only references that never reach user-visible storage.
#[derive(Debug, Clone)]
pub enum InternalPtr {
    /// Function body waiting for `MakeFunction`.
    Exec(Rc<Executable>),
    /// Variable passed by reference to `AddClosure`.
    Slot(SlotKey),
}

/// A dynamically-typed value.
///
/// Scalars are stored inline; aggregates are shared handles, so cloning a
/// `Value` adds a reference rather than copying the aggregate.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Empty,
    Int(i64),
    Float(f64),
    Str(StrHandle),
    Array(ArrayHandle),
    Object(ObjectHandle),
    Function(FuncHandle),
    Ptr(InternalPtr),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Empty => Kind::Empty,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Str(_) => Kind::Str,
            Value::Array(_) => Kind::Array,
            Value::Object(_) => Kind::Object,
            Value::Function(_) => Kind::Function,
            Value::Ptr(_) => Kind::Ptr,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Truth value used by conditional jumps and logical operators.
    ///
    /// Non-zero scalars and non-empty aggregates are true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::Function(_) | Value::Ptr(_) => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer or float, widened to `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn str(s: &str) -> Self {
        Value::Str(StrHandle::new(s))
    }

    /// Identity of the underlying aggregate, if any.
    pub(crate) fn heap_id(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.id()),
            Value::Array(a) => Some(a.id()),
            Value::Object(o) => Some(o.id()),
            Value::Function(f) => Some(f.id()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(_), Value::Array(_))
            | (Value::Object(_), Value::Object(_))
            | (Value::Function(_), Value::Function(_)) => self.heap_id() == other.heap_id(),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<ObjectHandle> for Value {
    fn from(v: ObjectHandle) -> Self {
        Value::Object(v)
    }
}

impl From<ArrayHandle> for Value {
    fn from(v: ArrayHandle) -> Self {
        Value::Array(v)
    }
}

impl From<FuncHandle> for Value {
    fn from(v: FuncHandle) -> Self {
        Value::Function(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("<empty>"),
            Value::Int(i) => {
                let mut buf = itoa::Buffer::new();
                f.write_str(buf.format(*i))
            }
            Value::Float(x) => {
                let mut buf = ryu::Buffer::new();
                f.write_str(buf.format(*x))
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(a) => write!(f, "[array of {} {}]", a.len(), a.elem_kind().map_or("empty", Kind::name)),
            Value::Object(o) => write!(f, "[object with {} members]", o.len()),
            Value::Function(func) => write!(f, "[function {}]", func.name()),
            Value::Ptr(_) => f.write_str("<internal>"),
        }
    }
}

#[cfg(test)]
mod val_test;
