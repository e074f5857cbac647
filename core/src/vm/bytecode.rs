use std::{fmt, rc::Rc};

use crate::{
    error::{ErrorKind, OpResult},
    op::{BinOp, UnaryOp},
    val::{InternalPtr, Value},
};

/// Operand-stack instructions.
///
/// Stack effects are written `[before] -> [after]` with the top on the right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Nop,
    /// `[] -> [const]`
    PushConst(u16),
    /// `[] -> [empty]`
    PushEmpty,
    /// `[v] -> []`
    Pop,
    /// `[v] -> [v v]`
    Dup,

    /// Append a fresh empty local to the frame.
    DeclareLocal,
    LoadLocal(u16),
    /// `[v] -> []`
    StoreLocal(u16),
    /// `[] -> [&local]`, only consumed by `AddClosure`.
    LocalRef(u16),
    LoadClosure(u16),
    StoreClosure(u16),
    ClosureRef(u16),
    /// Operand is the name constant.
    LoadGlobal(u16),
    StoreGlobal(u16),
    DefineGlobal(u16),
    LoadThis,

    /// `[obj] -> [member]`
    GetAttr(u16),
    /// `[obj v] -> []`
    SetAttr(u16),
    /// `[container index] -> [v]`
    GetIndex,
    /// `[container index v] -> []`
    SetIndex,

    /// `[] -> [obj]`
    MakeObject,
    /// `[obj v] -> [obj]`
    AddChild(u16),
    /// `[] -> [array]`
    MakeArray,
    /// `[array v] -> [array]`
    ArrayAppend,
    /// `[exec] -> [fn]`
    MakeFunction,
    /// `[fn v] -> [fn]`, default for the given parameter.
    AddDefault(u16),
    /// `[fn &slot] -> [fn]` or `[fn v] -> [fn]`
    AddClosure,

    /// `[l r] -> [l op r]`
    Binary(BinOp),
    Unary(UnaryOp),
    Incr,
    Decr,

    /// Absolute instruction index.
    Jump(u32),
    /// Pops the condition.
    JumpIfFalse(u32),
    JumpIfTrue(u32),

    /// `[fn a1..an] -> [ret]`
    Call(u8),
    /// `[recv fn a1..an] -> [ret]`
    CallMethod(u8),
    /// `[v] -> ` caller receives `v` (empty if the stack is empty).
    Return,
    /// Stop the whole program.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Exec(Rc<Executable>),
}

impl Constant {
    /// Materialize for the operand stack; strings get a fresh buffer since
    /// they are mutable.
    pub(crate) fn to_value(&self) -> Value {
        match self {
            Constant::Int(i) => Value::Int(*i),
            Constant::Float(f) => Value::Float(*f),
            Constant::Str(s) => Value::str(s),
            Constant::Exec(e) => Value::Ptr(InternalPtr::Exec(e.clone())),
        }
    }
}

/// An assembled function body. Immutable once built.
#[derive(Debug, Clone)]
pub struct Executable {
    pub name: Rc<str>,
    pub file: Rc<str>,
    pub nparams: u16,
    pub code: Vec<Instruction>,
    pub consts: Vec<Constant>,
}

impl Executable {
    pub fn constant(&self, idx: u16) -> OpResult<&Constant> {
        self.consts
            .get(idx as usize)
            .ok_or_else(|| ErrorKind::MalformedCode(format!("{}: no constant #{idx}", self.name)))
    }

    /// Constant `idx`, which must be a name.
    pub fn name_at(&self, idx: u16) -> OpResult<&str> {
        match self.constant(idx)? {
            Constant::Str(s) => Ok(s),
            _ => Err(ErrorKind::MalformedCode(format!(
                "{}: constant #{idx} is not a name",
                self.name
            ))),
        }
    }
}

impl fmt::Display for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} params, {} instructions, {} constants)",
            self.name,
            self.nparams,
            self.code.len(),
            self.consts.len()
        )
    }
}
