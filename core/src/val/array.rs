use std::{cell::RefCell, rc::Rc};

use crate::error::{ErrorKind, OpResult};

use super::{Kind, Reclaimer, SlotKey, Value, ValuePool, object::reaches};

#[derive(Debug)]
struct ArrayData {
    elem: Option<Kind>,
    items: Vec<SlotKey>,
    reclaim: Reclaimer,
}

impl Drop for ArrayData {
    fn drop(&mut self) {
        self.reclaim.defer(self.items.drain(..));
    }
}

/// Homogeneous list; the first append fixes the element kind.
#[derive(Debug, Clone)]
pub struct ArrayHandle(Rc<RefCell<ArrayData>>);

impl ArrayHandle {
    pub fn new(pool: &ValuePool) -> Self {
        Self(Rc::new(RefCell::new(ArrayData {
            elem: None,
            items: Vec::new(),
            reclaim: pool.reclaimer().clone(),
        })))
    }

    pub fn nref(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn elem_kind(&self) -> Option<Kind> {
        self.0.borrow().elem
    }

    fn check_kind(&self, got: Kind) -> OpResult<()> {
        match self.elem_kind() {
            Some(expected) if expected != got => Err(ErrorKind::ArrayType {
                expected: expected.name(),
                got: got.name(),
            }),
            _ => Ok(()),
        }
    }

    /// Link an existing slot as the last element.
    ///
    /// Neither the array nor the slot changes on failure.
    pub fn append(&self, pool: &mut ValuePool, key: SlotKey) -> OpResult<()> {
        let Some(value) = pool.get(key).cloned() else {
            crate::bug!("append of stale slot {key:?}");
        };
        if matches!(value, Value::Ptr(_)) {
            return Err(ErrorKind::InvalidOperand {
                op: "append",
                operand: value.type_name(),
            });
        }
        self.check_kind(value.kind())?;
        if pool.is_linked(key) {
            return Err(ErrorKind::AlreadyLinked);
        }
        if reaches(pool, &value, self.id()) {
            return Err(ErrorKind::Cycle);
        }
        pool.link(key)?;
        let mut data = self.0.borrow_mut();
        data.elem.get_or_insert(value.kind());
        data.items.push(key);
        Ok(())
    }

    /// Append `value` in a fresh slot.
    pub fn append_value(&self, pool: &mut ValuePool, value: Value) -> OpResult<()> {
        let key = pool.alloc();
        pool.set(key, value);
        if let Err(err) = self.append(pool, key) {
            drop(pool.free(key));
            return Err(err);
        }
        Ok(())
    }

    pub fn key_at(&self, idx: usize) -> Option<SlotKey> {
        self.0.borrow().items.get(idx).copied()
    }

    fn index(&self, idx: i64) -> OpResult<SlotKey> {
        let len = self.len();
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.key_at(i))
            .ok_or(ErrorKind::IndexOutOfRange { index: idx, len })
    }

    pub fn child_at(&self, pool: &ValuePool, idx: i64) -> OpResult<Value> {
        let key = self.index(idx)?;
        match pool.get(key) {
            Some(v) => Ok(v.clone()),
            None => crate::bug!("array element {idx} points at a freed slot"),
        }
    }

    /// Replace element `idx`; the new value must match the element kind.
    pub fn set_child(&self, pool: &mut ValuePool, idx: i64, value: Value) -> OpResult<()> {
        let key = self.index(idx)?;
        self.check_kind(value.kind())?;
        if reaches(pool, &value, self.id()) {
            return Err(ErrorKind::Cycle);
        }
        drop(pool.set(key, value));
        Ok(())
    }

    pub(crate) fn keys(&self) -> Vec<SlotKey> {
        self.0.borrow().items.clone()
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}
