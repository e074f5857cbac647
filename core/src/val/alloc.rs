//! Slab pool of value slots.
//!
//! Slots live in fixed blocks of [`BLOCK_SLOTS`] entries, each block carrying a
//! 64-bit occupancy map. Allocation is first-fit across blocks; a new block is
//! only created when every block is full, and a block that becomes empty is
//! released unless it is the last one standing.
//!
//! Slots are addressed by [`SlotKey`], which carries a stamp taken from a
//! monotonic counter. A key whose slot has been freed (and maybe handed out
//! again) no longer matches and every lookup through it yields `None`.

use std::{cell::RefCell, mem, rc::Rc};

use tracing::trace;

use crate::error::{ErrorKind, OpResult};

use super::Value;

pub const BLOCK_SLOTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    block: u32,
    index: u8,
    stamp: u64,
}

#[derive(Debug)]
struct Slot {
    value: Value,
    stamp: u64,
    nref: u32,
    linked: bool,
}

impl Slot {
    fn vacant() -> Self {
        Self {
            value: Value::Empty,
            stamp: 0,
            nref: 0,
            linked: false,
        }
    }
}

#[derive(Debug)]
struct Block {
    used: u64,
    slots: Vec<Slot>,
}

impl Block {
    fn new() -> Self {
        Self {
            used: 0,
            slots: (0..BLOCK_SLOTS).map(|_| Slot::vacant()).collect(),
        }
    }

    fn is_full(&self) -> bool {
        self.used == u64::MAX
    }
}

/// Slot keys whose owners have been destroyed and that still need a release.
///
/// Handles push into the queue from `Drop`, where the pool itself is out of
/// reach; [`ValuePool::collect`] drains it.
#[derive(Debug, Clone, Default)]
pub struct Reclaimer(Rc<RefCell<Vec<SlotKey>>>);

impl Reclaimer {
    pub fn defer<I: IntoIterator<Item = SlotKey>>(&self, keys: I) {
        self.0.borrow_mut().extend(keys);
    }

    fn take(&self) -> Vec<SlotKey> {
        mem::take(&mut *self.0.borrow_mut())
    }

    pub fn pending(&self) -> usize {
        self.0.borrow().len()
    }
}

#[derive(Debug, Default)]
pub struct ValuePool {
    blocks: Vec<Option<Block>>,
    next_stamp: u64,
    live: usize,
    reclaim: Reclaimer,
}

impl ValuePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue shared with every handle created against this pool.
    pub fn reclaimer(&self) -> &Reclaimer {
        &self.reclaim
    }

    /// Hand out an empty, unlinked slot with one reference.
    pub fn alloc(&mut self) -> SlotKey {
        let block_idx = match self.blocks.iter().position(|b| b.as_ref().is_some_and(|b| !b.is_full())) {
            Some(idx) => idx,
            None => self.grow(),
        };
        self.next_stamp += 1;
        let stamp = self.next_stamp;
        let Some(block) = self.blocks[block_idx].as_mut() else {
            crate::bug!("block {block_idx} vanished during allocation");
        };
        let index = (!block.used).trailing_zeros() as usize;
        block.used |= 1 << index;
        let slot = &mut block.slots[index];
        slot.value = Value::Empty;
        slot.stamp = stamp;
        slot.nref = 1;
        slot.linked = false;
        self.live += 1;
        SlotKey {
            block: block_idx as u32,
            index: index as u8,
            stamp,
        }
    }

    fn grow(&mut self) -> usize {
        let idx = match self.blocks.iter().position(Option::is_none) {
            Some(hole) => {
                self.blocks[hole] = Some(Block::new());
                hole
            }
            None => {
                self.blocks.push(Some(Block::new()));
                self.blocks.len() - 1
            }
        };
        trace!(target: "candy::heap", block = idx, blocks = self.block_count(), "grew value pool");
        idx
    }

    fn slot(&self, key: SlotKey) -> Option<&Slot> {
        let block = self.blocks.get(key.block as usize)?.as_ref()?;
        let slot = &block.slots[key.index as usize];
        (block.used & (1 << key.index) != 0 && slot.stamp == key.stamp).then_some(slot)
    }

    fn slot_mut(&mut self, key: SlotKey) -> Option<&mut Slot> {
        let block = self.blocks.get_mut(key.block as usize)?.as_mut()?;
        let live = block.used & (1 << key.index) != 0;
        let slot = &mut block.slots[key.index as usize];
        (live && slot.stamp == key.stamp).then_some(slot)
    }

    /// Return a slot to its block regardless of its reference count.
    ///
    /// The slot's value is handed back so the caller decides where it drops.
    pub fn free(&mut self, key: SlotKey) -> Option<Value> {
        let value = mem::take(&mut self.slot_mut(key)?.value);
        let remaining = self.block_count();
        let block_idx = key.block as usize;
        let block = self.blocks[block_idx].as_mut()?;
        block.used &= !(1 << key.index);
        block.slots[key.index as usize].stamp = 0;
        self.live -= 1;
        if block.used == 0 && remaining > 1 {
            self.blocks[block_idx] = None;
            trace!(target: "candy::heap", block = block_idx, "released empty block");
        }
        Some(value)
    }

    pub fn contains(&self, key: SlotKey) -> bool {
        self.slot(key).is_some()
    }

    pub fn get(&self, key: SlotKey) -> Option<&Value> {
        self.slot(key).map(|s| &s.value)
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut Value> {
        self.slot_mut(key).map(|s| &mut s.value)
    }

    /// Overwrite a slot, returning what it held.
    pub fn set(&mut self, key: SlotKey, value: Value) -> Option<Value> {
        self.slot_mut(key).map(|s| mem::replace(&mut s.value, value))
    }

    pub fn nref(&self, key: SlotKey) -> Option<u32> {
        self.slot(key).map(|s| s.nref)
    }

    pub fn retain(&mut self, key: SlotKey) {
        match self.slot_mut(key) {
            Some(slot) => slot.nref += 1,
            None => crate::bug!("retain of stale slot {key:?}"),
        }
    }

    /// Drop one reference, freeing the slot when none remain.
    pub fn release(&mut self, key: SlotKey) {
        let Some(slot) = self.slot_mut(key) else {
            crate::bug!("release of stale slot {key:?}");
        };
        crate::bug_on!(slot.nref == 0, "slot {key:?} has no references left");
        slot.nref -= 1;
        if slot.nref == 0 {
            drop(self.free(key));
        }
    }

    /// Mark a slot as owned by a container.
    pub fn link(&mut self, key: SlotKey) -> OpResult<()> {
        let Some(slot) = self.slot_mut(key) else {
            crate::bug!("link of stale slot {key:?}");
        };
        if slot.linked {
            return Err(ErrorKind::AlreadyLinked);
        }
        slot.linked = true;
        Ok(())
    }

    pub fn unlink(&mut self, key: SlotKey) {
        if let Some(slot) = self.slot_mut(key) {
            slot.linked = false;
        }
    }

    pub fn is_linked(&self, key: SlotKey) -> bool {
        self.slot(key).is_some_and(|s| s.linked)
    }

    /// Release everything destroyed handles left behind.
    ///
    /// Freeing a slot can destroy another aggregate, which queues more keys,
    /// so this loops until the queue stays empty.
    pub fn collect(&mut self) -> usize {
        let mut released = 0;
        loop {
            let batch = self.reclaim.take();
            if batch.is_empty() {
                break;
            }
            for key in batch {
                if self.contains(key) {
                    self.release(key);
                    released += 1;
                }
            }
        }
        if released > 0 {
            trace!(target: "candy::heap", released, live = self.live, "collected deferred slots");
        }
        released
    }

    /// Slots currently handed out.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn block_count(&self) -> usize {
        self.blocks.iter().flatten().count()
    }
}
