use std::rc::Rc;

use tracing::debug;

use crate::{
    error::{ErrorKind, OpResult, VmError, VmResult},
    op,
    val::{FuncHandle, InternalPtr, SlotKey, StrHandle, Value, find_method, holds_slot, reaches},
    vm::{Executable, Op},
};

use super::{Frame, Vm};

pub(super) enum Flow {
    Next,
    Return(Value),
}

fn malformed(msg: &str) -> ErrorKind {
    ErrorKind::MalformedCode(msg.to_string())
}

impl Vm {
    /// Drive the loop until the frame at index `base` returns.
    pub(super) fn run(&mut self, base: usize) -> VmResult<Value> {
        loop {
            match self.step() {
                Ok(Flow::Next) => {}
                Ok(Flow::Return(v)) => {
                    self.pop_frame();
                    if self.frames.len() <= base {
                        return Ok(v);
                    }
                    if let Err(kind) = self.push(v) {
                        return Err(self.fail(kind.into(), base));
                    }
                }
                Err(err) => return Err(self.fail(err, base)),
            }
            if let Some(v) = self.halted.clone() {
                self.unwind_to(base);
                return Ok(v);
            }
        }
    }

    /// Attach position and backtrace, then unwind back to `base`.
    fn fail(&mut self, mut err: VmError, base: usize) -> VmError {
        if !err.is_located() {
            err.location = self.frames.last().map(Frame::location);
        }
        err.backtrace
            .extend(self.frames[base.min(self.frames.len())..].iter().rev().map(Frame::describe));
        debug!(target: "candy::vm", error = %err.kind, depth = self.depth, "unwinding after script error");
        self.unwind_to(base);
        err
    }

    fn frame(&self) -> &Frame {
        match self.frames.last() {
            Some(f) => f,
            None => crate::bug!("no active frame"),
        }
    }

    fn frame_mut(&mut self) -> &mut Frame {
        match self.frames.last_mut() {
            Some(f) => f,
            None => crate::bug!("no active frame"),
        }
    }

    fn push(&mut self, v: Value) -> OpResult<()> {
        let max = self.config.max_stack;
        let stack = &mut self.frame_mut().stack;
        if stack.len() >= max {
            return Err(ErrorKind::StackOverflow(max));
        }
        stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> OpResult<Value> {
        match self.frame_mut().stack.pop() {
            Some(v) => Ok(v),
            None => Err(malformed("operand stack underflow")),
        }
    }

    fn peek(&self) -> OpResult<&Value> {
        match self.frame().stack.last() {
            Some(v) => Ok(v),
            None => Err(malformed("operand stack underflow")),
        }
    }

    /// The top `n` values, bottom first.
    fn pop_args(&mut self, n: u8) -> OpResult<Vec<Value>> {
        let stack = &mut self.frame_mut().stack;
        match stack.len().checked_sub(n as usize) {
            Some(at) => Ok(stack.split_off(at)),
            None => Err(malformed("operand stack underflow")),
        }
    }

    fn local_key(&self, n: u16) -> OpResult<SlotKey> {
        match self.frame().locals.get(n as usize) {
            Some(key) => Ok(*key),
            None => Err(ErrorKind::MalformedCode(format!("no local #{n}"))),
        }
    }

    fn capture_key(&self, n: u16) -> OpResult<SlotKey> {
        self.frame()
            .func
            .as_ref()
            .and_then(|f| f.capture_at(n as usize))
            .ok_or_else(|| ErrorKind::MalformedCode(format!("no closure variable #{n}")))
    }

    fn slot_value(&self, key: SlotKey) -> Value {
        match self.heap.get(key) {
            Some(v) => v.clone(),
            None => crate::bug!("variable slot {key:?} was freed while in use"),
        }
    }

    /// Typed store into a variable slot. A value that already holds `key`
    /// somewhere in its graph would keep itself alive, so it is refused.
    fn store_slot(&mut self, key: SlotKey, v: &Value) -> OpResult<()> {
        if holds_slot(&self.heap, v, key) {
            return Err(ErrorKind::Cycle);
        }
        match self.heap.get_mut(key) {
            Some(target) => op::mov(target, v),
            None => crate::bug!("variable slot {key:?} was freed while in use"),
        }
    }

    /// The value handed back by `return` or `end`; empty if the stack is.
    fn result_value(&mut self) -> OpResult<Value> {
        match self.frame_mut().stack.pop() {
            Some(Value::Ptr(_)) => Err(malformed("internal pointer returned")),
            Some(v) => Ok(v),
            None => Ok(Value::Empty),
        }
    }

    fn jump(&mut self, target: u32) -> OpResult<()> {
        let frame = self.frame_mut();
        if target as usize > frame.exec.code.len() {
            return Err(ErrorKind::MalformedCode(format!("jump to {target} out of range")));
        }
        frame.pc = target as usize;
        Ok(())
    }

    /// Attribute lookup: object members first, then the per-kind methods.
    fn member(&self, obj: &Value, name: &str) -> OpResult<Value> {
        let found = match obj {
            Value::Object(o) => o.child_by_name(&self.heap, name),
            other => find_method(other.kind(), name).map(|m| Value::Function(FuncHandle::from_method(&m))),
        };
        found.ok_or_else(|| ErrorKind::NoSuchMember {
            kind: obj.type_name(),
            name: name.to_string(),
        })
    }

    fn index(&self, container: &Value, idx: &Value) -> OpResult<Value> {
        match (container, idx) {
            (Value::Array(a), Value::Int(i)) => a.child_at(&self.heap, *i),
            (Value::Object(o), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|n| o.nth_child(&self.heap, n))
                .map(|(_, v)| v)
                .ok_or(ErrorKind::IndexOutOfRange { index: *i, len: o.len() }),
            (Value::Object(_), Value::Str(name)) => self.member(container, &name.to_string()),
            (Value::Str(s), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|n| s.byte_at(n))
                .map(|b| Value::Str(StrHandle::from_bytes(&[b])))
                .ok_or(ErrorKind::IndexOutOfRange { index: *i, len: s.len() }),
            _ => Err(ErrorKind::NotIndexable {
                container: container.type_name(),
                index: idx.type_name(),
            }),
        }
    }

    fn set_index(&mut self, container: &Value, idx: &Value, v: Value) -> OpResult<()> {
        match (container, idx) {
            (Value::Array(a), Value::Int(i)) => a.set_child(&mut self.heap, *i, v),
            (Value::Object(o), Value::Str(name)) => o.assign(&mut self.heap, &name.to_string(), v),
            _ => Err(ErrorKind::NotIndexable {
                container: container.type_name(),
                index: idx.type_name(),
            }),
        }
    }

    fn top_function(&self) -> OpResult<FuncHandle> {
        match self.peek()? {
            Value::Function(f) if !f.is_native() => Ok(f.clone()),
            _ => Err(malformed("expected a script function on the stack")),
        }
    }

    fn step(&mut self) -> VmResult<Flow> {
        let frame = self.frame_mut();
        let Some(ins) = frame.exec.code.get(frame.pc).copied() else {
            // Running off the end returns empty.
            return Ok(Flow::Return(Value::Empty));
        };
        frame.pc += 1;
        let exec: Rc<Executable> = frame.exec.clone();

        match ins.op {
            Op::Nop => {}
            Op::PushConst(k) => {
                let v = exec.constant(k)?.to_value();
                self.push(v)?;
            }
            Op::PushEmpty => self.push(Value::Empty)?,
            Op::Pop => {
                self.pop()?;
            }
            Op::Dup => {
                let v = self.peek()?.clone();
                self.push(v)?;
            }

            Op::DeclareLocal => {
                let key = self.heap.alloc();
                self.frame_mut().locals.push(key);
            }
            Op::LoadLocal(n) => {
                let v = self.slot_value(self.local_key(n)?);
                self.push(v)?;
            }
            Op::StoreLocal(n) => {
                let v = self.pop()?;
                self.store_slot(self.local_key(n)?, &v)?;
            }
            Op::LocalRef(n) => {
                let key = self.local_key(n)?;
                self.push(Value::Ptr(InternalPtr::Slot(key)))?;
            }
            Op::LoadClosure(n) => {
                let v = self.slot_value(self.capture_key(n)?);
                self.push(v)?;
            }
            Op::StoreClosure(n) => {
                let v = self.pop()?;
                self.store_slot(self.capture_key(n)?, &v)?;
            }
            Op::ClosureRef(n) => {
                let key = self.capture_key(n)?;
                self.push(Value::Ptr(InternalPtr::Slot(key)))?;
            }
            Op::LoadGlobal(k) => {
                let name = exec.name_at(k)?;
                let v = self
                    .globals
                    .child(&self.heap, name)
                    .ok_or_else(|| ErrorKind::Undefined(name.to_string()))?;
                self.push(v)?;
            }
            Op::StoreGlobal(k) => {
                let v = self.pop()?;
                let name = exec.name_at(k)?;
                let key = self
                    .globals
                    .child_key(name)
                    .ok_or_else(|| ErrorKind::Undefined(name.to_string()))?;
                self.store_slot(key, &v)?;
            }
            Op::DefineGlobal(k) => {
                let v = self.pop()?;
                self.globals.set_member(&mut self.heap, exec.name_at(k)?, v)?;
            }
            Op::LoadThis => {
                let v = self.frame().this.clone();
                self.push(v)?;
            }

            Op::GetAttr(k) => {
                let obj = self.pop()?;
                let v = self.member(&obj, exec.name_at(k)?)?;
                self.push(v)?;
            }
            Op::SetAttr(k) => {
                let v = self.pop()?;
                let obj = self.pop()?;
                let name = exec.name_at(k)?;
                match &obj {
                    Value::Object(o) => o.assign(&mut self.heap, name, v)?,
                    other => {
                        return Err(ErrorKind::InvalidOperand {
                            op: ".",
                            operand: other.type_name(),
                        }
                        .into());
                    }
                }
            }
            Op::GetIndex => {
                let idx = self.pop()?;
                let container = self.pop()?;
                let v = self.index(&container, &idx)?;
                self.push(v)?;
            }
            Op::SetIndex => {
                let v = self.pop()?;
                let idx = self.pop()?;
                let container = self.pop()?;
                self.set_index(&container, &idx, v)?;
            }

            Op::MakeObject => {
                let obj = self.new_object();
                self.push(Value::Object(obj))?;
            }
            Op::AddChild(k) => {
                let v = self.pop()?;
                let Value::Object(obj) = self.peek()?.clone() else {
                    return Err(malformed("add_child needs an object").into());
                };
                obj.set_member(&mut self.heap, exec.name_at(k)?, v)?;
            }
            Op::MakeArray => {
                let arr = self.new_array();
                self.push(Value::Array(arr))?;
            }
            Op::ArrayAppend => {
                let v = self.pop()?;
                let Value::Array(arr) = self.peek()?.clone() else {
                    return Err(malformed("append needs an array").into());
                };
                arr.append_value(&mut self.heap, v)?;
            }
            Op::MakeFunction => match self.pop()? {
                Value::Ptr(InternalPtr::Exec(body)) => {
                    let f = FuncHandle::closure(&self.heap, body);
                    self.push(Value::Function(f))?;
                }
                _ => return Err(malformed("make_func needs a function body").into()),
            },
            Op::AddDefault(n) => {
                let v = self.pop()?;
                if matches!(v, Value::Ptr(_)) {
                    return Err(malformed("internal pointer used as a default").into());
                }
                let f = self.top_function()?;
                if reaches(&self.heap, &v, f.id()) {
                    return Err(ErrorKind::Cycle.into());
                }
                if !f.set_default(n as usize, v) {
                    return Err(ErrorKind::MalformedCode(format!("no parameter #{n} to default")).into());
                }
            }
            Op::AddClosure => {
                let v = self.pop()?;
                let f = self.top_function()?;
                if f.capture_count() >= self.config.max_closures {
                    return Err(ErrorKind::ClosureLimit(self.config.max_closures).into());
                }
                let key = match v {
                    Value::Ptr(InternalPtr::Slot(key)) => {
                        if reaches(&self.heap, &self.slot_value(key), f.id()) {
                            return Err(ErrorKind::Cycle.into());
                        }
                        self.heap.retain(key);
                        key
                    }
                    Value::Ptr(InternalPtr::Exec(_)) => return Err(malformed("cannot capture a function body").into()),
                    other => {
                        if reaches(&self.heap, &other, f.id()) {
                            return Err(ErrorKind::Cycle.into());
                        }
                        let key = self.heap.alloc();
                        self.heap.set(key, other);
                        key
                    }
                };
                f.push_capture(key);
            }

            Op::Binary(bop) => {
                let r = self.pop()?;
                let l = self.pop()?;
                self.push(op::binary(bop, &l, &r)?)?;
            }
            Op::Unary(uop) => {
                let v = self.pop()?;
                self.push(op::unary(uop, &v)?)?;
            }
            Op::Incr => {
                let mut v = self.pop()?;
                op::incr(&mut v)?;
                self.push(v)?;
            }
            Op::Decr => {
                let mut v = self.pop()?;
                op::decr(&mut v)?;
                self.push(v)?;
            }

            Op::Jump(t) => self.jump(t)?,
            Op::JumpIfFalse(t) => {
                if !self.pop()?.is_truthy() {
                    self.jump(t)?;
                }
            }
            Op::JumpIfTrue(t) => {
                if self.pop()?.is_truthy() {
                    self.jump(t)?;
                }
            }

            Op::Call(argc) => {
                let args = self.pop_args(argc)?;
                let callee = self.pop()?;
                if let Some(v) = self.invoke(&callee, None, &args)? {
                    self.push(v)?;
                }
            }
            Op::CallMethod(argc) => {
                let args = self.pop_args(argc)?;
                let callee = self.pop()?;
                let recv = self.pop()?;
                if let Some(v) = self.invoke(&callee, Some(recv), &args)? {
                    self.push(v)?;
                }
            }
            Op::Return => {
                let v = self.result_value()?;
                return Ok(Flow::Return(v));
            }
            Op::End => {
                let v = self.result_value()?;
                self.halted = Some(v);
            }
        }
        Ok(Flow::Next)
    }
}
