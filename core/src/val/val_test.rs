use std::{cell::Cell, rc::Rc};

use super::*;
use crate::{
    error::ErrorKind,
    vm::{Executable, Instruction, Op},
};

fn empty_exec(nparams: u16) -> Rc<Executable> {
    Rc::new(Executable {
        name: "f".into(),
        file: "t.cdy".into(),
        nparams,
        code: vec![Instruction { op: Op::Return, line: 1 }],
        consts: Vec::new(),
    })
}

#[test]
fn fresh_slots_are_empty_with_one_reference() {
    let mut pool = ValuePool::new();
    let a = pool.alloc();
    pool.set(a, Value::Int(9));
    pool.release(a);
    let b = pool.alloc();
    assert_eq!(pool.get(b), Some(&Value::Empty));
    assert_eq!(pool.nref(b), Some(1));
    assert!(!pool.is_linked(b));
}

#[test]
fn stale_keys_do_not_resolve() {
    let mut pool = ValuePool::new();
    let a = pool.alloc();
    pool.release(a);
    let b = pool.alloc();
    assert_ne!(a, b);
    assert!(!pool.contains(a));
    assert_eq!(pool.get(a), None);
    assert_eq!(pool.set(a, Value::Int(1)), None);
    assert!(pool.contains(b));
}

#[test]
fn pool_grows_by_blocks_and_releases_empty_ones() {
    let mut pool = ValuePool::new();
    let keys: Vec<_> = (0..BLOCK_SLOTS + 1).map(|_| pool.alloc()).collect();
    assert_eq!(pool.block_count(), 2);
    assert_eq!(pool.live(), BLOCK_SLOTS + 1);

    // The second block only holds the last slot.
    pool.release(keys[BLOCK_SLOTS]);
    assert_eq!(pool.block_count(), 1);

    for key in &keys[..BLOCK_SLOTS] {
        pool.release(*key);
    }
    assert_eq!(pool.live(), 0);
    // The last block is kept.
    assert_eq!(pool.block_count(), 1);
}

#[test]
fn allocation_is_first_fit() {
    let mut pool = ValuePool::new();
    let keys: Vec<_> = (0..BLOCK_SLOTS * 2).map(|_| pool.alloc()).collect();
    pool.release(keys[3]);
    let reused = pool.alloc();
    assert!(!pool.contains(keys[3]));
    // Lands in the hole in the first block, so filling one more slot needs
    // no new block.
    assert_eq!(pool.block_count(), 2);
    pool.release(reused);
    pool.release(keys[0]);
    assert_eq!(pool.live(), BLOCK_SLOTS * 2 - 2);
}

#[test]
#[should_panic(expected = "stale slot")]
fn releasing_a_stale_key_is_a_bug() {
    let mut pool = ValuePool::new();
    let a = pool.alloc();
    pool.release(a);
    pool.release(a);
}

#[test]
fn retain_and_release_balance() {
    let mut pool = ValuePool::new();
    let a = pool.alloc();
    pool.retain(a);
    assert_eq!(pool.nref(a), Some(2));
    pool.release(a);
    assert!(pool.contains(a));
    pool.release(a);
    assert!(!pool.contains(a));
}

#[test]
fn dropped_aggregates_release_children_once() {
    let mut pool = ValuePool::new();
    let obj = ObjectHandle::new(&pool);
    let arr = ArrayHandle::new(&pool);
    arr.append_value(&mut pool, Value::Int(1)).unwrap();
    arr.append_value(&mut pool, Value::Int(2)).unwrap();
    obj.set_member(&mut pool, "items", Value::Array(arr)).unwrap();
    obj.set_member(&mut pool, "name", Value::str("x")).unwrap();
    assert_eq!(pool.live(), 4);

    drop(obj);
    // Object slots first, then the array they held.
    assert_eq!(pool.collect(), 4);
    assert_eq!(pool.live(), 0);
    assert_eq!(pool.collect(), 0);
}

#[test]
fn shared_aggregate_survives_one_owner() {
    let mut pool = ValuePool::new();
    let inner = ObjectHandle::new(&pool);
    inner.set_member(&mut pool, "v", Value::Int(5)).unwrap();
    let outer = ObjectHandle::new(&pool);
    outer.set_member(&mut pool, "inner", Value::Object(inner.clone())).unwrap();
    assert_eq!(inner.nref(), 2);

    drop(outer);
    pool.collect();
    assert_eq!(inner.nref(), 1);
    assert_eq!(inner.child(&pool, "v"), Some(Value::Int(5)));
}

#[test]
fn array_is_homogeneous() {
    let mut pool = ValuePool::new();
    let arr = ArrayHandle::new(&pool);
    assert_eq!(arr.elem_kind(), None);
    arr.append_value(&mut pool, Value::Int(1)).unwrap();
    assert_eq!(arr.elem_kind(), Some(Kind::Int));

    let live = pool.live();
    let err = arr.append_value(&mut pool, Value::str("no")).unwrap_err();
    assert_eq!(
        err,
        ErrorKind::ArrayType {
            expected: "integer",
            got: "string"
        }
    );
    assert_eq!(arr.len(), 1);
    assert_eq!(pool.live(), live);

    assert!(arr.set_child(&mut pool, 0, Value::Float(1.0)).is_err());
    arr.set_child(&mut pool, 0, Value::Int(7)).unwrap();
    assert_eq!(arr.child_at(&pool, 0), Ok(Value::Int(7)));
}

#[test]
fn array_index_bounds() {
    let mut pool = ValuePool::new();
    let arr = ArrayHandle::new(&pool);
    arr.append_value(&mut pool, Value::Int(1)).unwrap();
    assert_eq!(
        arr.child_at(&pool, 1),
        Err(ErrorKind::IndexOutOfRange { index: 1, len: 1 })
    );
    assert!(arr.child_at(&pool, -1).is_err());
}

#[test]
fn double_ownership_is_rejected_without_mutation() {
    let mut pool = ValuePool::new();
    let a = ArrayHandle::new(&pool);
    let b = ArrayHandle::new(&pool);
    let key = pool.alloc();
    pool.set(key, Value::Int(3));
    a.append(&mut pool, key).unwrap();

    assert_eq!(b.append(&mut pool, key), Err(ErrorKind::AlreadyLinked));
    assert!(b.is_empty());
    assert_eq!(b.elem_kind(), None);

    let obj = ObjectHandle::new(&pool);
    assert_eq!(obj.add_child(&mut pool, key, "x"), Err(ErrorKind::AlreadyLinked));
    assert!(obj.is_empty());
    assert_eq!(a.len(), 1);
}

#[test]
fn cycles_are_rejected() {
    let mut pool = ValuePool::new();
    let a = ObjectHandle::new(&pool);
    let b = ObjectHandle::new(&pool);
    a.set_member(&mut pool, "b", Value::Object(b.clone())).unwrap();
    assert_eq!(
        b.set_member(&mut pool, "a", Value::Object(a.clone())),
        Err(ErrorKind::Cycle)
    );
    assert_eq!(a.set_member(&mut pool, "me", Value::Object(a.clone())), Err(ErrorKind::Cycle));

    let arr = ArrayHandle::new(&pool);
    arr.append_value(&mut pool, Value::Object(a.clone())).unwrap();
    assert_eq!(b.assign(&mut pool, "arr", Value::Array(arr.clone())), Err(ErrorKind::Cycle));
    assert!(b.is_empty());
}

#[test]
fn object_members_replace_in_place() {
    let mut pool = ValuePool::new();
    let obj = ObjectHandle::new(&pool);
    obj.set_member(&mut pool, "a", Value::Int(1)).unwrap();
    obj.set_member(&mut pool, "b", Value::Int(2)).unwrap();
    obj.set_member(&mut pool, "a", Value::str("one")).unwrap();
    assert_eq!(obj.len(), 2);
    assert_eq!(pool.live(), 2);
    let names: Vec<String> = obj.names().iter().map(|n| n.to_string()).collect();
    assert_eq!(names, ["a", "b"]);
    assert_eq!(obj.nth_child(&pool, 0).map(|(_, v)| v), Some(Value::str("one")));
}

#[test]
fn assign_is_typed() {
    let mut pool = ValuePool::new();
    let obj = ObjectHandle::new(&pool);
    obj.assign(&mut pool, "n", Value::Int(1)).unwrap();
    obj.assign(&mut pool, "n", Value::Float(2.5)).unwrap();
    assert_eq!(obj.child(&pool, "n"), Some(Value::Int(2)));
    assert!(matches!(
        obj.assign(&mut pool, "n", Value::str("x")),
        Err(ErrorKind::IncompatibleAssign { .. })
    ));
}

#[test]
fn children_know_their_owner() {
    let mut pool = ValuePool::new();
    let parent = ObjectHandle::new(&pool);
    let child = ObjectHandle::new(&pool);
    let method = FuncHandle::closure(&pool, empty_exec(0));
    parent.set_member(&mut pool, "child", Value::Object(child.clone())).unwrap();
    parent.set_member(&mut pool, "m", Value::Function(method.clone())).unwrap();
    assert_eq!(child.owner().map(|o| o.id()), Some(parent.id()));
    assert_eq!(method.owner().map(|o| o.id()), Some(parent.id()));

    drop(parent);
    pool.collect();
    assert!(child.owner().is_none());
}

#[test]
fn replaced_member_takes_the_new_owner() {
    let mut pool = ValuePool::new();
    let parent = ObjectHandle::new(&pool);
    parent.set_member(&mut pool, "child", Value::Empty).unwrap();
    let child = ObjectHandle::new(&pool);
    parent.assign(&mut pool, "child", Value::Object(child.clone())).unwrap();
    assert_eq!(child.owner().map(|o| o.id()), Some(parent.id()));

    let next = ObjectHandle::new(&pool);
    parent.assign(&mut pool, "child", Value::Object(next.clone())).unwrap();
    assert_eq!(next.owner().map(|o| o.id()), Some(parent.id()));
}

#[test]
fn members_refuse_internal_pointers() {
    let mut pool = ValuePool::new();
    let obj = ObjectHandle::new(&pool);
    let var = pool.alloc();
    let err = obj.set_member(&mut pool, "p", Value::Ptr(InternalPtr::Slot(var))).unwrap_err();
    assert!(matches!(err, ErrorKind::IncompatibleAssign { .. }));
    assert!(obj.is_empty());
    assert_eq!(pool.live(), 1);
}

#[test]
fn closure_holding_a_slot_is_found() {
    let mut pool = ValuePool::new();
    let var = pool.alloc();
    let f = FuncHandle::closure(&pool, empty_exec(0));
    pool.retain(var);
    assert!(f.push_capture(var));
    let obj = ObjectHandle::new(&pool);
    obj.set_member(&mut pool, "m", Value::Function(f.clone())).unwrap();

    assert!(holds_slot(&pool, &Value::Function(f.clone()), var));
    assert!(holds_slot(&pool, &Value::Object(obj.clone()), var));
    assert!(!holds_slot(&pool, &Value::Int(1), var));
    let other = pool.alloc();
    assert!(!holds_slot(&pool, &Value::Object(obj), other));
}

thread_local! {
    static CLEANED: Cell<i64> = const { Cell::new(0) };
}

fn count_cleanup(data: Box<dyn std::any::Any>) {
    if let Ok(n) = data.downcast::<i64>() {
        CLEANED.with(|c| c.set(c.get() + *n));
    }
}

#[test]
fn private_data_cleanup_runs_on_replace_and_drop() {
    let pool = ValuePool::new();
    let obj = ObjectHandle::new(&pool);
    obj.set_priv(Box::new(1i64), Some(count_cleanup));
    assert_eq!(obj.with_priv(|n: &i64| *n), Some(1));
    obj.with_priv_mut(|n: &mut i64| *n = 10);
    obj.set_priv(Box::new(100i64), Some(count_cleanup));
    assert_eq!(CLEANED.with(Cell::get), 10);
    drop(obj);
    assert_eq!(CLEANED.with(Cell::get), 110);
}

#[test]
fn closure_captures_and_defaults() {
    let mut pool = ValuePool::new();
    let f = FuncHandle::closure(&pool, empty_exec(2));
    assert_eq!(f.arity(), Arity::range(0, 2));
    let key = pool.alloc();
    pool.retain(key);
    assert!(f.push_capture(key));
    assert_eq!(f.capture_at(0), Some(key));

    assert!(f.set_default(1, Value::Int(10)));
    assert!(!f.set_default(2, Value::Int(0)));
    assert_eq!(f.default_at(0), None);
    assert_eq!(f.default_at(1), Some(Value::Int(10)));

    drop(f);
    pool.collect();
    assert_eq!(pool.nref(key), Some(1));
}

#[test]
fn strings_are_shared_and_terminated() {
    let s = StrHandle::new("ab");
    let alias = s.clone();
    alias.push_str("cd");
    assert_eq!(s.to_bytes(), b"abcd");
    s.with_terminated(|bytes| assert_eq!(bytes, b"abcd\0"));

    s.push_handle(&alias);
    assert_eq!(s.to_string(), "abcdabcd");
    assert_eq!(s.len(), 8);

    let joined = StrHandle::concat(&s, &StrHandle::new("!"));
    assert_eq!(joined.len(), 9);
    assert_eq!(s.len(), 8);
}

#[test]
fn value_basics() {
    assert!(!Value::Empty.is_truthy());
    assert!(Value::Int(-1).is_truthy());
    assert!(!Value::str("").is_truthy());
    assert_eq!(Value::str("a"), Value::str("a"));
    assert_eq!(Value::Int(3).to_string(), "3");
    assert_eq!(Value::Float(0.5).to_string(), "0.5");

    let pool = ValuePool::new();
    let a = ObjectHandle::new(&pool);
    let b = ObjectHandle::new(&pool);
    assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
    assert_ne!(Value::Object(a), Value::Object(b));
}

#[test]
fn method_registry() {
    assert!(find_method(Kind::Array, "append").is_some());
    assert!(find_method(Kind::Int, "append").is_none());

    fn answer(_vm: &mut crate::vm::Vm, _this: &Value, _args: &[Value]) -> crate::error::VmResult<Value> {
        Ok(Value::Int(42))
    }
    register_method(Kind::Float, "answer", answer, Arity::exact(0));
    let m = find_method(Kind::Float, "answer").unwrap();
    assert_eq!(m.name, "answer");
    assert_eq!(m.arity, Arity::exact(0));
}
