use std::{
    any::Any,
    cell::RefCell,
    rc::{Rc, Weak},
};

use crate::{
    error::{ErrorKind, OpResult},
    util::fast_map::{FastHashSet, fast_hash_set_new},
};

use super::{FuncHandle, Kind, Reclaimer, SlotKey, Value, ValuePool, find_method};

/// Called with the private data when the owning object is destroyed.
pub type PrivCleanup = fn(Box<dyn Any>);

#[derive(Debug)]
struct Child {
    name: Rc<str>,
    key: SlotKey,
}

#[derive(Debug)]
pub(crate) struct ObjectData {
    children: Vec<Child>,
    owner: Weak<RefCell<ObjectData>>,
    priv_data: Option<Box<dyn Any>>,
    priv_cleanup: Option<PrivCleanup>,
    reclaim: Reclaimer,
}

impl Drop for ObjectData {
    fn drop(&mut self) {
        self.reclaim.defer(self.children.drain(..).map(|c| c.key));
        if let (Some(data), Some(cleanup)) = (self.priv_data.take(), self.priv_cleanup) {
            cleanup(data);
        }
    }
}

/// Non-owning back-link to an object.
#[derive(Debug, Clone, Default)]
pub(crate) struct WeakObject(Weak<RefCell<ObjectData>>);

impl WeakObject {
    pub(crate) fn upgrade(&self) -> Option<ObjectHandle> {
        self.0.upgrade().map(ObjectHandle)
    }
}

/// Object: named children kept in insertion order.
#[derive(Debug, Clone)]
pub struct ObjectHandle(Rc<RefCell<ObjectData>>);

impl ObjectHandle {
    pub fn new(pool: &ValuePool) -> Self {
        Self(Rc::new(RefCell::new(ObjectData {
            children: Vec::new(),
            owner: Weak::new(),
            priv_data: None,
            priv_cleanup: None,
            reclaim: pool.reclaimer().clone(),
        })))
    }

    pub fn nref(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Link `key` under `name`, replacing a same-named child.
    ///
    /// Fails without side effects if the slot already belongs to a container
    /// or if its value can reach this object.
    pub fn add_child(&self, pool: &mut ValuePool, key: SlotKey, name: &str) -> OpResult<()> {
        let Some(value) = pool.get(key).cloned() else {
            crate::bug!("add_child with stale slot {key:?}");
        };
        if matches!(value, Value::Ptr(_)) {
            return Err(ErrorKind::IncompatibleAssign {
                to: "member",
                from: value.type_name(),
            });
        }
        if reaches(pool, &value, self.id()) {
            return Err(ErrorKind::Cycle);
        }
        pool.link(key)?;
        self.adopt(&value);
        let replaced = {
            let mut data = self.0.borrow_mut();
            match data.children.iter_mut().find(|c| &*c.name == name) {
                Some(child) => Some(std::mem::replace(&mut child.key, key)),
                None => {
                    data.children.push(Child { name: name.into(), key });
                    None
                }
            }
        };
        if let Some(old) = replaced {
            pool.unlink(old);
            pool.release(old);
        }
        Ok(())
    }

    /// Store `value` under `name` in a fresh slot.
    pub fn set_member(&self, pool: &mut ValuePool, name: &str, value: Value) -> OpResult<()> {
        let key = pool.alloc();
        pool.set(key, value);
        if let Err(err) = self.add_child(pool, key, name) {
            drop(pool.free(key));
            return Err(err);
        }
        Ok(())
    }

    /// Member assignment: typed store into an existing child, otherwise a new
    /// child.
    pub fn assign(&self, pool: &mut ValuePool, name: &str, value: Value) -> OpResult<()> {
        let Some(key) = self.child_key(name) else {
            return self.set_member(pool, name, value);
        };
        if reaches(pool, &value, self.id()) {
            return Err(ErrorKind::Cycle);
        }
        let Some(slot) = pool.get_mut(key) else {
            crate::bug!("member '{name}' points at a freed slot");
        };
        crate::op::mov(slot, &value)?;
        self.adopt(&value);
        Ok(())
    }

    /// Record this object as the owner of a member just stored.
    fn adopt(&self, value: &Value) {
        match value {
            Value::Object(child) => child.0.borrow_mut().owner = Rc::downgrade(&self.0),
            Value::Function(func) => func.set_owner(self),
            _ => {}
        }
    }

    pub fn child_key(&self, name: &str) -> Option<SlotKey> {
        self.0.borrow().children.iter().find(|c| &*c.name == name).map(|c| c.key)
    }

    /// Own member lookup, ignoring built-in methods.
    pub fn child(&self, pool: &ValuePool, name: &str) -> Option<Value> {
        self.child_key(name).and_then(|key| pool.get(key).cloned())
    }

    /// Member lookup falling back to the built-in object methods.
    pub fn child_by_name(&self, pool: &ValuePool, name: &str) -> Option<Value> {
        self.child(pool, name).or_else(|| {
            find_method(Kind::Object, name).map(|m| Value::Function(FuncHandle::from_method(&m)))
        })
    }

    pub fn nth_child(&self, pool: &ValuePool, n: usize) -> Option<(Rc<str>, Value)> {
        let data = self.0.borrow();
        let child = data.children.get(n)?;
        Some((child.name.clone(), pool.get(child.key)?.clone()))
    }

    pub fn names(&self) -> Vec<Rc<str>> {
        self.0.borrow().children.iter().map(|c| c.name.clone()).collect()
    }

    pub(crate) fn child_keys(&self) -> Vec<SlotKey> {
        self.0.borrow().children.iter().map(|c| c.key).collect()
    }

    /// The object this one was last added to, if it is still alive.
    pub fn owner(&self) -> Option<ObjectHandle> {
        self.0.borrow().owner.upgrade().map(ObjectHandle)
    }

    /// Attach host data; any previous data goes through its cleanup hook first.
    pub fn set_priv(&self, data: Box<dyn Any>, cleanup: Option<PrivCleanup>) {
        let prev = {
            let mut inner = self.0.borrow_mut();
            let prev = inner.priv_data.replace(data).zip(inner.priv_cleanup);
            inner.priv_cleanup = cleanup;
            prev
        };
        if let Some((old, hook)) = prev {
            hook(old);
        }
    }

    pub fn with_priv<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let inner = self.0.borrow();
        inner.priv_data.as_ref()?.downcast_ref::<T>().map(f)
    }

    pub fn with_priv_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut inner = self.0.borrow_mut();
        inner.priv_data.as_mut()?.downcast_mut::<T>().map(f)
    }

    pub(crate) fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

/// Whether `target` is reachable from `from` through container children,
/// array elements, closure captures or closure defaults.
pub(crate) fn reaches(pool: &ValuePool, from: &Value, target: usize) -> bool {
    any_reachable(pool, from, |value, _| value.heap_id() == Some(target))
}

/// Whether some container or closure reachable from `from` already holds
/// `key`. Storing `from` into `key` would then close a loop.
pub(crate) fn holds_slot(pool: &ValuePool, from: &Value, key: SlotKey) -> bool {
    any_reachable(pool, from, |_, keys| keys.contains(&key))
}

fn any_reachable(pool: &ValuePool, from: &Value, hit: impl Fn(&Value, &[SlotKey]) -> bool) -> bool {
    let mut seen: FastHashSet<usize> = fast_hash_set_new();
    let mut pending = vec![from.clone()];
    while let Some(value) = pending.pop() {
        let Some(id) = value.heap_id() else { continue };
        if !seen.insert(id) {
            continue;
        }
        let (keys, defaults) = match &value {
            Value::Object(o) => (o.child_keys(), Vec::new()),
            Value::Array(a) => (a.keys(), Vec::new()),
            Value::Function(f) => (f.captures(), f.defaults()),
            _ => (Vec::new(), Vec::new()),
        };
        if hit(&value, &keys) {
            return true;
        }
        pending.extend(keys.into_iter().filter_map(|k| pool.get(k).cloned()));
        pending.extend(defaults);
    }
    false
}
