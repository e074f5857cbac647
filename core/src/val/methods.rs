use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::{
    error::{ErrorKind, VmError, VmResult},
    util::fast_map::{FastHashMap, fast_hash_map_new},
    vm::Vm,
};

use super::{Arity, Kind, NativeFn, Value};

/// A built-in method as registered for a value kind.
#[derive(Debug, Clone, Copy)]
pub struct NativeMethod {
    pub name: &'static str,
    pub entry: NativeFn,
    pub arity: Arity,
}

// kind -> method name -> method
static METHOD_REGISTRY: Lazy<DashMap<Kind, FastHashMap<&'static str, NativeMethod>>> = Lazy::new(|| {
    let registry = DashMap::new();
    for (kind, name, entry, arity) in CORE_METHODS {
        insert(&registry, *kind, name, *entry, *arity);
    }
    registry
});

fn insert(
    registry: &DashMap<Kind, FastHashMap<&'static str, NativeMethod>>,
    kind: Kind,
    name: &'static str,
    entry: NativeFn,
    arity: Arity,
) {
    registry
        .entry(kind)
        .or_insert_with(fast_hash_map_new)
        .insert(name, NativeMethod { name, entry, arity });
}

/// Register (or replace) a method for every value of `kind`.
pub fn register_method(kind: Kind, name: &'static str, entry: NativeFn, arity: Arity) {
    insert(&METHOD_REGISTRY, kind, name, entry, arity);
}

pub fn find_method(kind: Kind, name: &str) -> Option<NativeMethod> {
    METHOD_REGISTRY
        .get(&kind)
        .and_then(|methods| methods.get(name).copied())
}

type MethodRow = (Kind, &'static str, NativeFn, Arity);

const CORE_METHODS: &[MethodRow] = &[
    (Kind::Object, "len", object_len, Arity::exact(0)),
    (Kind::Object, "has", object_has, Arity::exact(1)),
    (Kind::Object, "foreach", object_foreach, Arity::exact(1)),
    (Kind::Array, "len", array_len, Arity::exact(0)),
    (Kind::Array, "append", array_append, Arity::exact(1)),
    (Kind::Array, "foreach", array_foreach, Arity::exact(1)),
    (Kind::Str, "len", string_len, Arity::exact(0)),
    (Kind::Str, "append", string_append, Arity::exact(1)),
];

fn wrong_receiver(method: &str, this: &Value) -> VmError {
    VmError::native(format!("{method}() called on {}", this.type_name()))
}

fn object_len(_vm: &mut Vm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    match this {
        Value::Object(o) => Ok(Value::Int(o.len() as i64)),
        other => Err(wrong_receiver("len", other)),
    }
}

fn object_has(_vm: &mut Vm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let Value::Object(o) = this else {
        return Err(wrong_receiver("has", this));
    };
    match &args[0] {
        Value::Str(name) => Ok(Value::from(o.child_key(&name.to_string()).is_some())),
        other => Err(ErrorKind::InvalidOperand {
            op: "has",
            operand: other.type_name(),
        }
        .into()),
    }
}

/// `obj.foreach(fn)` calls `fn(value, name)` for every member in order.
fn object_foreach(vm: &mut Vm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let Value::Object(o) = this else {
        return Err(wrong_receiver("foreach", this));
    };
    let mut n = 0;
    while let Some((name, value)) = o.nth_child(vm.heap(), n) {
        vm.call_value(&args[0], None, &[value, Value::str(&name)])?;
        n += 1;
    }
    Ok(Value::Empty)
}

fn array_len(_vm: &mut Vm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    match this {
        Value::Array(a) => Ok(Value::Int(a.len() as i64)),
        other => Err(wrong_receiver("len", other)),
    }
}

fn array_append(vm: &mut Vm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let Value::Array(a) = this else {
        return Err(wrong_receiver("append", this));
    };
    a.append_value(vm.heap_mut(), args[0].clone())?;
    Ok(Value::Empty)
}

/// `arr.foreach(fn)` calls `fn(elem, index)`.
fn array_foreach(vm: &mut Vm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let Value::Array(a) = this else {
        return Err(wrong_receiver("foreach", this));
    };
    let mut i = 0;
    while (i as usize) < a.len() {
        let elem = a.child_at(vm.heap(), i)?;
        vm.call_value(&args[0], None, &[elem, Value::Int(i)])?;
        i += 1;
    }
    Ok(Value::Empty)
}

fn string_len(_vm: &mut Vm, this: &Value, _args: &[Value]) -> VmResult<Value> {
    match this {
        Value::Str(s) => Ok(Value::Int(s.len() as i64)),
        other => Err(wrong_receiver("len", other)),
    }
}

/// Appends in place, so every alias of the string sees the change.
fn string_append(_vm: &mut Vm, this: &Value, args: &[Value]) -> VmResult<Value> {
    let Value::Str(s) = this else {
        return Err(wrong_receiver("append", this));
    };
    match &args[0] {
        Value::Str(tail) => s.push_handle(tail),
        Value::Int(c) => match u8::try_from(*c) {
            Ok(b) if b != 0 => s.push_byte(b),
            _ => return Err(VmError::native(format!("append(): {c} is not a byte value"))),
        },
        other => {
            return Err(ErrorKind::InvalidOperand {
                op: "append",
                operand: other.type_name(),
            }
            .into());
        }
    }
    Ok(Value::Empty)
}
