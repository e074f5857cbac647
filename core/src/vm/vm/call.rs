use std::{mem, rc::Rc};

use tracing::trace;

use crate::{
    error::{ErrorKind, VmResult},
    val::{FuncHandle, FuncKind, Value},
    vm::Executable,
};

use super::{Frame, FrameBuffers, Vm};

impl Vm {
    /// Start a call.
    ///
    /// Natives run to completion and yield `Some(result)`. Closures get a new
    /// frame and yield `None`; the running loop picks the frame up.
    pub(super) fn invoke(&mut self, callee: &Value, this: Option<Value>, args: &[Value]) -> VmResult<Option<Value>> {
        let Value::Function(func) = callee else {
            return Err(ErrorKind::NotCallable(callee.type_name()).into());
        };
        let arity = func.arity();
        if !arity.accepts(args.len()) {
            return Err(ErrorKind::ArgCount {
                name: func.name().to_string(),
                expected: arity,
                got: args.len(),
            }
            .into());
        }
        if args.len() > self.config.max_args {
            return Err(ErrorKind::ArgLimit(args.len()).into());
        }
        if args.iter().any(|a| matches!(a, Value::Ptr(_))) {
            return Err(ErrorKind::MalformedCode("internal pointer passed as an argument".into()).into());
        }
        if self.depth >= self.config.max_depth {
            return Err(ErrorKind::RecursionLimit(self.config.max_depth).into());
        }
        let this = this.unwrap_or_else(|| self.bound_this(func));
        match func.kind() {
            FuncKind::Native { entry, .. } => {
                self.depth += 1;
                let out = entry(self, &this, args);
                self.depth -= 1;
                out.map(Some)
            }
            FuncKind::Closure(closure) => {
                let exec = closure.exec().clone();
                self.push_call_frame(func, exec, this, args);
                Ok(None)
            }
        }
    }

    fn bound_this(&self, func: &FuncHandle) -> Value {
        Value::Object(func.owner().unwrap_or_else(|| self.globals.clone()))
    }

    /// Bind arguments, then defaults, then empties to fresh parameter slots.
    fn push_call_frame(&mut self, func: &FuncHandle, exec: Rc<Executable>, this: Value, args: &[Value]) {
        let mut bufs = self.take_buffers(self.frames.len());
        for param in 0..exec.nparams as usize {
            let key = self.heap.alloc();
            let value = match args.get(param) {
                Some(arg) => arg.clone(),
                None => func.default_at(param).unwrap_or_default(),
            };
            self.heap.set(key, value);
            bufs.locals.push(key);
        }
        self.depth += 1;
        trace!(target: "candy::vm", func = %exec.name, depth = self.depth, argc = args.len(), "push frame");
        self.frames.push(Frame::new(exec, Some(func.clone()), this, bufs));
    }

    pub(super) fn take_buffers(&mut self, idx: usize) -> FrameBuffers {
        self.spare.get_mut(idx).map(mem::take).unwrap_or_default()
    }

    /// Drop the innermost frame, releasing its locals and recycling buffers.
    pub(super) fn pop_frame(&mut self) {
        let Some(frame) = self.frames.pop() else {
            crate::bug!("pop_frame on an empty frame chain");
        };
        if frame.func.is_some() {
            self.depth -= 1;
        }
        trace!(target: "candy::vm", func = %frame.exec.name, depth = self.depth, "pop frame");
        let mut bufs = frame.into_buffers();
        for key in bufs.locals.drain(..) {
            self.heap.release(key);
        }
        bufs.stack.clear();
        let idx = self.frames.len();
        if self.spare.len() <= idx {
            self.spare.resize_with(idx + 1, FrameBuffers::default);
        }
        self.spare[idx] = bufs;
        self.heap.collect();
    }

    pub(super) fn unwind_to(&mut self, base: usize) {
        while self.frames.len() > base {
            self.pop_frame();
        }
    }
}
