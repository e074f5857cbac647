mod call;
mod exec;
mod frame;

use std::rc::Rc;

use tracing::debug;

use crate::{
    error::VmResult,
    val::{Arity, ArrayHandle, FuncHandle, NativeFn, ObjectHandle, Value, ValuePool},
};

use super::{Executable, VmConfig};
use frame::{Frame, FrameBuffers};

/// Interpreter state: value pool, globals and the frame chain.
///
/// A `Vm` is single-threaded (`!Send`); every entry goes through `&mut self`.
pub struct Vm {
    heap: ValuePool,
    globals: ObjectHandle,
    config: VmConfig,
    frames: Vec<Frame>,
    // Operand stack and local buffers recycled by frame index.
    spare: Vec<FrameBuffers>,
    depth: usize,
    halted: Option<Value>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let heap = ValuePool::new();
        let globals = ObjectHandle::new(&heap);
        Self {
            heap,
            globals,
            config,
            frames: Vec::new(),
            spare: Vec::new(),
            depth: 0,
            halted: None,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn heap(&self) -> &ValuePool {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut ValuePool {
        &mut self.heap
    }

    /// The object holding every global; also `this` at top level.
    pub fn globals(&self) -> &ObjectHandle {
        &self.globals
    }

    /// Calls currently in progress, natives included.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn define_global(&mut self, name: &str, value: Value) -> VmResult<()> {
        self.globals.set_member(&mut self.heap, name, value)?;
        Ok(())
    }

    pub fn define_native(&mut self, name: &str, entry: NativeFn, arity: Arity) -> VmResult<()> {
        self.define_global(name, Value::Function(FuncHandle::native(name, entry, arity)))
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.child(&self.heap, name)
    }

    pub fn new_object(&self) -> ObjectHandle {
        ObjectHandle::new(&self.heap)
    }

    pub fn new_array(&self) -> ArrayHandle {
        ArrayHandle::new(&self.heap)
    }

    /// Run a top-level executable to completion.
    ///
    /// On error every frame pushed on the way is unwound and the VM stays
    /// usable.
    pub fn execute(&mut self, exec: &Rc<Executable>) -> VmResult<Value> {
        debug!(target: "candy::vm", %exec, "execute");
        let base = self.frames.len();
        let bufs = self.take_buffers(base);
        let this = Value::Object(self.globals.clone());
        self.frames.push(Frame::new(exec.clone(), None, this, bufs));
        let out = self.run(base);
        if base == 0 {
            self.finish_entry();
        }
        out
    }

    /// Call a function value from the host or from inside a native.
    ///
    /// `this` overrides the function's bound owner. A closure runs in a nested
    /// loop that returns once its frame does.
    pub fn call_value(&mut self, func: &Value, this: Option<&Value>, args: &[Value]) -> VmResult<Value> {
        let base = self.frames.len();
        if base > 0 && self.halted.is_some() {
            // An inner `end` already stopped the program.
            return Ok(Value::Empty);
        }
        let out = match self.invoke(func, this.cloned(), args) {
            Ok(Some(v)) => Ok(v),
            Ok(None) => self.run(base),
            Err(err) => Err(err),
        };
        if base == 0 {
            self.finish_entry();
        }
        out
    }

    /// Free storage released by destroyed aggregates.
    pub fn collect(&mut self) -> usize {
        self.heap.collect()
    }

    fn finish_entry(&mut self) {
        self.halted = None;
        self.heap.collect();
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
