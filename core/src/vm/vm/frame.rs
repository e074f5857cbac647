use std::rc::Rc;

use crate::{
    error::Location,
    val::{FuncHandle, SlotKey, Value},
    vm::Executable,
};

#[derive(Debug, Default)]
pub(super) struct FrameBuffers {
    pub(super) stack: Vec<Value>,
    pub(super) locals: Vec<SlotKey>,
}

/// One activation: parameters occupy the first `nparams` locals.
#[derive(Debug)]
pub(super) struct Frame {
    pub(super) exec: Rc<Executable>,
    pub(super) pc: usize,
    pub(super) stack: Vec<Value>,
    pub(super) locals: Vec<SlotKey>,
    /// `None` for a top-level executable.
    pub(super) func: Option<FuncHandle>,
    pub(super) this: Value,
}

impl Frame {
    pub(super) fn new(exec: Rc<Executable>, func: Option<FuncHandle>, this: Value, bufs: FrameBuffers) -> Self {
        Self {
            exec,
            pc: 0,
            stack: bufs.stack,
            locals: bufs.locals,
            func,
            this,
        }
    }

    pub(super) fn into_buffers(self) -> FrameBuffers {
        FrameBuffers {
            stack: self.stack,
            locals: self.locals,
        }
    }

    /// Line of the instruction most recently fetched.
    pub(super) fn line(&self) -> u32 {
        let idx = self.pc.saturating_sub(1);
        self.exec.code.get(idx).map_or(0, |ins| ins.line)
    }

    pub(super) fn location(&self) -> Location {
        Location {
            file: self.exec.file.to_string(),
            line: self.line(),
        }
    }

    pub(super) fn describe(&self) -> String {
        format!("{} ({}:{})", self.exec.name, self.exec.file, self.line())
    }
}
