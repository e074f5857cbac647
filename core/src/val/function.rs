use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
};

use crate::{
    error::VmResult,
    vm::{Executable, Vm},
};

use super::{NativeMethod, ObjectHandle, Reclaimer, SlotKey, Value, ValuePool, object::WeakObject};

/// Host function callable from scripts.
///
/// `this` is the receiver for method calls, or the owner the function was
/// bound to; `args` are already evaluated.
pub type NativeFn = fn(vm: &mut Vm, this: &Value, args: &[Value]) -> VmResult<Value>;

/// Accepted argument counts; `max: None` means variadic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exact(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn accepts(&self, argc: usize) -> bool {
        argc >= self.min && self.max.is_none_or(|max| argc <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{max}"),
            Some(max) => write!(f, "{} to {max}", self.min),
            None => write!(f, "at least {}", self.min),
        }
    }
}

/// Script function body plus its captured environment.
#[derive(Debug)]
pub struct Closure {
    exec: Rc<Executable>,
    captures: RefCell<Vec<SlotKey>>,
    defaults: RefCell<Vec<Value>>,
    reclaim: Reclaimer,
}

impl Closure {
    pub fn exec(&self) -> &Rc<Executable> {
        &self.exec
    }
}

impl Drop for Closure {
    fn drop(&mut self) {
        self.reclaim.defer(self.captures.get_mut().drain(..));
    }
}

#[derive(Debug)]
pub enum FuncKind {
    Native { name: Rc<str>, entry: NativeFn, arity: Arity },
    Closure(Closure),
}

#[derive(Debug)]
struct FuncData {
    kind: FuncKind,
    owner: RefCell<WeakObject>,
}

/// Native entry point or script closure.
#[derive(Debug, Clone)]
pub struct FuncHandle(Rc<FuncData>);

impl FuncHandle {
    pub fn native(name: &str, entry: NativeFn, arity: Arity) -> Self {
        Self::wrap(FuncKind::Native {
            name: name.into(),
            entry,
            arity,
        })
    }

    pub(crate) fn from_method(method: &NativeMethod) -> Self {
        Self::native(method.name, method.entry, method.arity)
    }

    /// Fresh closure over `exec` with no captures and no defaults.
    pub fn closure(pool: &ValuePool, exec: Rc<Executable>) -> Self {
        Self::wrap(FuncKind::Closure(Closure {
            exec,
            captures: RefCell::new(Vec::new()),
            defaults: RefCell::new(Vec::new()),
            reclaim: pool.reclaimer().clone(),
        }))
    }

    fn wrap(kind: FuncKind) -> Self {
        Self(Rc::new(FuncData {
            kind,
            owner: RefCell::new(WeakObject::default()),
        }))
    }

    pub fn kind(&self) -> &FuncKind {
        &self.0.kind
    }

    pub fn name(&self) -> Rc<str> {
        match &self.0.kind {
            FuncKind::Native { name, .. } => name.clone(),
            FuncKind::Closure(c) => c.exec.name.clone(),
        }
    }

    pub fn nref(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Closures take anything from zero up to their declared parameters.
    pub fn arity(&self) -> Arity {
        match &self.0.kind {
            FuncKind::Native { arity, .. } => *arity,
            FuncKind::Closure(c) => Arity::range(0, c.exec.nparams as usize),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.0.kind, FuncKind::Native { .. })
    }

    pub fn as_closure(&self) -> Option<&Closure> {
        match &self.0.kind {
            FuncKind::Closure(c) => Some(c),
            FuncKind::Native { .. } => None,
        }
    }

    pub fn owner(&self) -> Option<ObjectHandle> {
        self.0.owner.borrow().upgrade()
    }

    pub fn set_owner(&self, owner: &ObjectHandle) {
        *self.0.owner.borrow_mut() = owner.downgrade();
    }

    /// Captured slots in capture order; empty for natives.
    pub fn captures(&self) -> Vec<SlotKey> {
        self.as_closure().map(|c| c.captures.borrow().clone()).unwrap_or_default()
    }

    pub fn capture_at(&self, idx: usize) -> Option<SlotKey> {
        self.as_closure().and_then(|c| c.captures.borrow().get(idx).copied())
    }

    /// Append a captured slot; the caller has already retained it.
    pub(crate) fn push_capture(&self, key: SlotKey) -> bool {
        match self.as_closure() {
            Some(c) => {
                c.captures.borrow_mut().push(key);
                true
            }
            None => false,
        }
    }

    pub fn capture_count(&self) -> usize {
        self.as_closure().map_or(0, |c| c.captures.borrow().len())
    }

    /// Record the default for parameter `param`.
    pub(crate) fn set_default(&self, param: usize, value: Value) -> bool {
        let Some(c) = self.as_closure() else { return false };
        if param >= c.exec.nparams as usize {
            return false;
        }
        let mut defaults = c.defaults.borrow_mut();
        if defaults.len() <= param {
            defaults.resize(param + 1, Value::Empty);
        }
        defaults[param] = value;
        true
    }

    pub fn default_at(&self, param: usize) -> Option<Value> {
        let c = self.as_closure()?;
        c.defaults.borrow().get(param).filter(|v| !v.is_empty()).cloned()
    }

    pub(crate) fn defaults(&self) -> Vec<Value> {
        self.as_closure().map(|c| c.defaults.borrow().clone()).unwrap_or_default()
    }

    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}
